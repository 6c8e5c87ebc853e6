//! Panic containment for observer and host callbacks.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run `f`, turning a panic into `None` and an error log. `what` names the
/// callback and is only built when a panic is logged.
pub fn isolate<R>(what: impl FnOnce() -> String, f: impl FnOnce() -> R) -> Option<R> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            log::error!("{} panicked: {}", what(), panic_message(payload.as_ref()));
            None
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolate_passes_value() {
        assert_eq!(isolate(|| unreachable!("label built without a panic"), || 3), Some(3));
    }

    #[test]
    fn test_isolate_catches_panic() {
        let result: Option<()> = isolate(|| "boom".to_string(), || panic!("broken observer"));
        assert!(result.is_none());
    }

    #[test]
    fn test_panic_message() {
        let payload = catch_unwind(|| panic!("with {}", "format")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "with format");
    }
}
