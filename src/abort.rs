//! Cooperative cancellation, checked at batch boundaries in walks,
//! traversals, and streaming merges rather than on every iteration.

use crate::error::{EventgraphError, Result};

/// Something that can signal "stop at the next checkpoint".
pub trait AbortSignal: Send + Sync {
    /// Returns true once cancellation has been requested.
    fn is_aborted(&self) -> bool;
}

/// The default signal: never aborts. Used wherever a caller doesn't pass
/// one explicitly.
pub struct NeverAbort;

impl AbortSignal for NeverAbort {
    fn is_aborted(&self) -> bool {
        false
    }
}

/// An [`AbortSignal`] backed by an `AtomicBool`, settable from outside the
/// running operation.
#[derive(Default)]
pub struct FlagAbort(std::sync::atomic::AtomicBool);

impl FlagAbort {
    /// A fresh, not-yet-aborted flag.
    pub fn new() -> Self {
        FlagAbort::default()
    }

    /// Requests cancellation.
    pub fn abort(&self) {
        self.0.store(true, std::sync::atomic::Ordering::SeqCst);
    }
}

impl AbortSignal for FlagAbort {
    fn is_aborted(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Returns `Err(EventgraphError::Aborted)` if `signal` has fired.
pub fn check(signal: &dyn AbortSignal) -> Result<()> {
    if signal.is_aborted() {
        Err(EventgraphError::Aborted)
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_abort_trips_after_abort_call() {
        let flag = FlagAbort::new();
        assert!(check(&flag).is_ok());
        flag.abort();
        assert!(check(&flag).is_err());
    }

    #[test]
    fn never_abort_never_trips() {
        assert!(check(&NeverAbort).is_ok());
    }
}
