use std::path::PathBuf;

use thiserror::Error;

use crate::hresult::HResult;

/// Failures reported by a backend through the audio client contract.
///
/// Every variant corresponds to exactly one platform status code so the host
/// sees the same values a real device would produce.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ClientError {
    #[error("format or share mode unsupported")]
    UnsupportedFormat,
    #[error("operation not implemented")]
    NotImplemented,
    #[error("invalid pointer argument")]
    InvalidPointer,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("audio client not initialized")]
    NotInitialized,
    #[error("audio client already initialized")]
    AlreadyInitialized,
    #[error("stream is already running")]
    NotStopped,
    #[error("out of memory")]
    OutOfMemory,
    #[error("event callback requested but no event handle set")]
    EventHandleNotSet,
    #[error("buffer unavailable")]
    BufferError,
}

impl ClientError {
    pub fn hresult(self) -> HResult {
        match self {
            ClientError::UnsupportedFormat => HResult::AUDCLNT_E_UNSUPPORTED_FORMAT,
            ClientError::NotImplemented => HResult::E_NOTIMPL,
            ClientError::InvalidPointer => HResult::E_POINTER,
            ClientError::InvalidArgument => HResult::E_INVALIDARG,
            ClientError::NotInitialized => HResult::AUDCLNT_E_NOT_INITIALIZED,
            ClientError::AlreadyInitialized => HResult::AUDCLNT_E_ALREADY_INITIALIZED,
            ClientError::NotStopped => HResult::AUDCLNT_E_NOT_STOPPED,
            ClientError::OutOfMemory => HResult::E_OUTOFMEMORY,
            ClientError::EventHandleNotSet => HResult::AUDCLNT_E_EVENTHANDLE_NOT_SET,
            ClientError::BufferError => HResult::AUDCLNT_E_BUFFER_ERROR,
        }
    }
}

impl From<ClientError> for HResult {
    fn from(err: ClientError) -> Self {
        err.hresult()
    }
}

/// Failures while loading the external sound client library.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(
        "sound client library not found at {}; check that the file exists and is readable",
        .0.display()
    )]
    MissingLibrary(PathBuf),
    #[error("failed to load sound client library {}: {source}", .path.display())]
    LibraryLoad {
        path: PathBuf,
        #[source]
        source: libloading::Error,
    },
    #[error("sound client library {} does not export `{symbol}`", .path.display())]
    MissingEntryPoint { path: PathBuf, symbol: &'static str },
    #[error("unable to locate the host module directory: {0}")]
    ModuleDirectory(#[from] std::io::Error),
}

impl BridgeError {
    pub(crate) fn missing_entry(path: PathBuf, symbol: &'static str) -> Self {
        BridgeError::MissingEntryPoint { path, symbol }
    }
}
