//! Unrecoverable failures.
//!
//! Once the host has committed to an audio backend there is no fallback path,
//! so resource failures terminate the process with a diagnostic. Embedders and
//! tests may install a hook that runs first; a hook that unwinds prevents the
//! termination.

use std::fmt;

use parking_lot::{const_rwlock, RwLock};

/// A fatal diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FatalReport {
    pub module: &'static str,
    pub message: String,
}

impl fmt::Display for FatalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.module, self.message)
    }
}

pub type FatalHook = Box<dyn Fn(&FatalReport) + Send + Sync>;

static HOOK: RwLock<Option<FatalHook>> = const_rwlock(None);

/// Installs the hook run before termination, replacing any previous one.
pub fn set_fatal_hook(hook: FatalHook) {
    *HOOK.write() = Some(hook);
}

/// Logs `message` and terminates the process.
pub fn fatal(module: &'static str, message: impl fmt::Display) -> ! {
    let report = FatalReport {
        module,
        message: message.to_string(),
    };
    tracing::error!(module = report.module, "fatal: {}", report.message);
    if let Some(hook) = HOOK.read().as_ref() {
        hook(&report);
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic;

    #[test]
    fn hook_can_intercept_termination() {
        set_fatal_hook(Box::new(|report| panic!("intercepted {report}")));
        let result = panic::catch_unwind(|| fatal("audio::test", "device gone"));
        let payload = result.expect_err("fatal must not return");
        let message = payload
            .downcast_ref::<String>()
            .cloned()
            .unwrap_or_default();
        assert_eq!(message, "intercepted audio::test: device gone");
    }
}
