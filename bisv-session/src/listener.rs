//! Listener invocation boundary
//!
//! Caller-supplied callbacks run inside the session's control loops. A
//! panicking listener must not take a loop (or the whole session) down
//! with it, so every callback is invoked through [`deliver`], which
//! catches the unwind and logs it.

use std::panic::{AssertUnwindSafe, catch_unwind};

pub(crate) fn deliver<F: FnOnce()>(what: &str, listener: F) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(listener)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        log::error!("{what} listener panicked: {message}");
    }
}
