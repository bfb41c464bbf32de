//! The hosting game's identity as seen by the audio layer.

use tracing::info;

/// Read-only access to the running title's display name.
pub trait GameIdentity: Send + Sync {
    fn title(&self) -> &str;
}

/// A hooked game, with lifecycle logging around attach and detach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    name: String,
}

impl Game {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn pre_attach(&self) {
        info!(game = %self.name, "pre_attach");
    }

    pub fn attach(&self) {
        info!(game = %self.name, "attach");
    }

    pub fn post_attach(&self) {
        info!(game = %self.name, "post_attach");
    }

    pub fn detach(&self) {
        info!(game = %self.name, "detach");
    }
}

impl GameIdentity for Game {
    fn title(&self) -> &str {
        &self.name
    }
}

impl GameIdentity for String {
    fn title(&self) -> &str {
        self
    }
}
