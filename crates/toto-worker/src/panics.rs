//! Containment of panics raised by task handlers.
//!
//! The default panic hook prints to stderr and the location is lost by the
//! time `catch_unwind` returns. While a handler runs under [`catch`], the
//! process-wide hook installed here records the panic location on the
//! running thread instead, plus a rendered backtrace when asked for, so the
//! worker can put both in its failure log. Panics outside [`catch`] still
//! reach the previous hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

static INSTALL_HOOK: Once = Once::new();

thread_local! {
    static ACTIVE: RefCell<Option<Capture>> = const { RefCell::new(None) };
}

#[derive(Debug)]
struct Capture {
    trace: bool,
    location: Option<String>,
    backtrace: Option<String>,
}

/// A panic caught while running a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CaughtPanic {
    /// Panic payload, when it was a string.
    pub message: String,
    /// `file:line:column` where the panic was raised.
    pub location: Option<String>,
    /// Rendered backtrace, present only when one was requested.
    pub trace: Option<String>,
}

/// Runs `body`, turning a panic into a [`CaughtPanic`].
///
/// With `trace` set a backtrace is captured at the panic site regardless of
/// `RUST_BACKTRACE`.
pub(crate) fn catch<T>(trace: bool, body: impl FnOnce() -> T) -> Result<T, CaughtPanic> {
    install_hook();
    let previous = ACTIVE.replace(Some(Capture {
        trace,
        location: None,
        backtrace: None,
    }));
    let outcome = panic::catch_unwind(AssertUnwindSafe(body));
    let capture = ACTIVE.replace(previous);
    outcome.map_err(|payload| {
        let (location, trace) = capture
            .map(|capture| (capture.location, capture.backtrace))
            .unwrap_or_default();
        CaughtPanic {
            message: panic_message(payload.as_ref()),
            location,
            trace,
        }
    })
}

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            let recorded = ACTIVE.with_borrow_mut(|active| {
                let Some(capture) = active.as_mut() else {
                    return false;
                };
                capture.location = info.location().map(ToString::to_string);
                capture.backtrace = capture
                    .trace
                    .then(|| Backtrace::force_capture().to_string());
                true
            });
            if !recorded {
                previous(info);
            }
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn returns_the_body_value_without_a_panic() {
        assert_eq!(catch(true, || 7), Ok(7));
    }

    #[rstest]
    fn records_message_and_location() {
        let Err(caught) = catch::<()>(false, || panic!("boom {}", 1)) else {
            panic!("expected the panic to be caught");
        };
        assert_eq!(caught.message, "boom 1");
        let location = caught.location.expect("panic location");
        assert!(location.contains("panics.rs"), "unexpected location {location}");
        assert_eq!(caught.trace, None);
    }

    #[rstest]
    fn captures_a_backtrace_only_on_request() {
        let Err(caught) = catch::<()>(true, || panic!("traced")) else {
            panic!("expected the panic to be caught");
        };
        assert!(caught.trace.is_some_and(|trace| !trace.is_empty()));
    }

    #[rstest]
    fn nested_captures_restore_the_outer_one() {
        let outer = catch::<()>(false, || {
            let inner = catch::<()>(false, || panic!("inner"));
            assert!(inner.is_err());
            panic!("outer")
        });
        let Err(caught) = outer else {
            panic!("expected the outer panic to be caught");
        };
        assert_eq!(caught.message, "outer");
        assert!(caught.location.is_some());
    }
}
