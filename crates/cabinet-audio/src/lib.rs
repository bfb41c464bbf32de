//! Audio device emulation for the Cabinet compatibility shim.
//!
//! The hosting game believes it talks to an exclusive-mode audio client. Every
//! call lands in a [`DummyAudioClient`], which forwards to one of the
//! interchangeable [`AudioBackend`] implementations:
//!
//! - [`NullBackend`] accepts the canonical format and discards audio.
//! - [`BridgeBackend`] forwards to an external sound client library and paces
//!   the host's render loop by signaling its event after each release.

pub mod backend;
pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod fatal;
pub mod format;
pub mod hresult;
pub mod identity;
pub mod null;
pub mod registry;
pub mod stream;

pub use backend::AudioBackend;
pub use bridge::{BridgeBackend, BridgeEntryPoints, BridgeLibrary};
pub use client::{DummyAudioClient, SessionState};
pub use config::{AudioHookConfig, BackendKind, BridgeOptions, ConfigError};
pub use error::{BridgeError, ClientError};
pub use event::{EventHandle, EventId, EventWaiter, ManualResetEvent, RawEvent};
pub use fatal::{fatal, set_fatal_hook, FatalReport};
pub use format::{StreamFormat, WaveFormatEx, WaveFormatExtensible};
pub use hresult::HResult;
pub use identity::{Game, GameIdentity};
pub use null::NullBackend;
pub use registry::{create_backend, BackendContext};
pub use stream::{
    BufferFlags, DevicePeriod, InitializeParams, ReferenceTime, ShareMode, StreamFlags,
};
