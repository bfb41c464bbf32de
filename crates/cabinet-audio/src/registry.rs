use std::sync::Arc;

use crate::backend::AudioBackend;
use crate::bridge::BridgeBackend;
use crate::config::{BackendKind, BridgeOptions};
use crate::format::StreamFormat;
use crate::identity::GameIdentity;
use crate::null::NullBackend;

/// Everything a backend needs at construction.
pub struct BackendContext<'a> {
    pub format: Arc<StreamFormat>,
    pub identity: &'a dyn GameIdentity,
    pub bridge: &'a BridgeOptions,
}

/// Constructs the backend selected by `kind`. A bridge backend whose library
/// cannot be resolved terminates the process.
pub fn create_backend(kind: BackendKind, ctx: &BackendContext<'_>) -> Box<dyn AudioBackend> {
    tracing::info!(backend = kind.as_str(), title = ctx.identity.title(), "creating audio backend");
    match kind {
        BackendKind::Null => Box::new(NullBackend::new(ctx.format.clone())),
        BackendKind::Bridge => Box::new(BridgeBackend::open(
            ctx.bridge,
            ctx.format.clone(),
            ctx.identity.title(),
        )),
    }
}
