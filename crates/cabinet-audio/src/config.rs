use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::BridgeError;

/// Which backend services the emulated audio client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// No audio output.
    #[default]
    #[serde(rename = "none", alias = "null")]
    Null,
    /// Forward to the external sound client library.
    #[serde(alias = "pipewire")]
    Bridge,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Null => "none",
            BackendKind::Bridge => "bridge",
        }
    }
}

/// Location of the external sound client library and its configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Directory holding the library. Defaults to the host module directory.
    pub library_dir: Option<PathBuf>,
    pub library_name: String,
    /// Passed verbatim to the library's config initialization.
    pub config_path: PathBuf,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            library_dir: None,
            library_name: default_library_name(),
            config_path: PathBuf::from("prop/linux.json"),
        }
    }
}

impl BridgeOptions {
    pub fn with_library_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.library_dir = dir;
        self
    }

    pub fn library_path(&self) -> Result<PathBuf, BridgeError> {
        let dir = match &self.library_dir {
            Some(dir) => dir.clone(),
            None => module_directory()?,
        };
        Ok(dir.join(&self.library_name))
    }
}

fn default_library_name() -> String {
    format!(
        "{}bmsound-wine{}",
        std::env::consts::DLL_PREFIX,
        std::env::consts::DLL_SUFFIX
    )
}

/// Directory of the host executable.
pub fn module_directory() -> std::io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    exe.parent().map(Path::to_path_buf).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} has no parent directory", exe.display()),
        )
    })
}

/// Audio hook settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioHookConfig {
    /// When false the host's audio calls are left untouched.
    pub enabled: bool,
    pub backend: BackendKind,
    pub bridge: BridgeOptions,
}

impl Default for AudioHookConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: BackendKind::default(),
            bridge: BridgeOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} is not a valid audio hook config: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AudioHookConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}
