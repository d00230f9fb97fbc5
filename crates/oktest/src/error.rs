//! Errors raised by the fixture machinery, and the guard that turns panics
//! escaping user code into ordinary errors.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;
use thiserror::Error;

static INSTALL_PANIC_HOOK: Once = Once::new();

thread_local! {
    static GUARD_DEPTH: Cell<usize> = const { Cell::new(0) };
    static PANIC_LOCATION: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Fixture resolution and release errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FixtureError {
    #[error("fixture '{name}' not found (class: {class}, test: '{test}')")]
    MissingFixture {
        name: String,
        class: String,
        test: String,
    },

    #[error("fixture dependency is looped: {path} (class: {class}, test: '{test}')")]
    LoopedDependency {
        path: String,
        class: String,
        test: String,
    },

    #[error("releaser of '{fixture}' requires '{name}', which was not resolved during setup")]
    UnresolvedReleaseDependency { fixture: String, name: String },

    #[error("argument '{name}' is not a {expected}")]
    TypeMismatch { name: String, expected: &'static str },

    #[error("no argument named '{name}'")]
    UnknownArgument { name: String },
}

/// A panic caught at a boundary into user code
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("panicked: {message}")]
pub struct Panicked {
    pub message: String,
    /// `file:line:column` of the panic, when the hook saw it
    pub location: Option<String>,
}

impl Panicked {
    fn from_payload(payload: Box<dyn Any + Send>, location: Option<String>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        Self { message, location }
    }

    /// Whether the panic came from `assert_eq!`, `assert_ne!` or an
    /// `assert!` without a custom message.
    ///
    /// `assert!(cond, "...")` panics with the custom message alone, which
    /// cannot be told apart from `panic!("...")`; it counts as an error.
    pub fn is_assertion(&self) -> bool {
        self.message.starts_with("assertion failed") || self.message.starts_with("assertion `")
    }
}

/// Replace the panic hook with one that stays quiet while a [`guard`] is
/// active on the current thread. Panics anywhere else go to the hook that
/// was installed before.
fn install_panic_hook() {
    INSTALL_PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if GUARD_DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
            tracing::debug!(location = ?location, "panic in user code");
            PANIC_LOCATION.with(|slot| *slot.borrow_mut() = location);
        }));
    });
}

/// Run user code, converting a panic into a [`Panicked`] error.
///
/// The panic is not printed to stderr; its message and location travel
/// with the error instead.
pub fn guard<T>(f: impl FnOnce() -> anyhow::Result<T>) -> anyhow::Result<T> {
    install_panic_hook();
    GUARD_DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    GUARD_DEPTH.with(|depth| depth.set(depth.get() - 1));

    match result {
        Ok(result) => result,
        Err(payload) => {
            let location = PANIC_LOCATION.with(|slot| slot.borrow_mut().take());
            Err(Panicked::from_payload(payload, location).into())
        }
    }
}
