//! The three error-handler hook slots (fatal-error, error, warning) and
//! the `tracing` bridge that backs them.
//!
//! Installing a handler never alters control flow: these are pure
//! notification sinks. A host application that installs nothing still
//! gets a structured `tracing` event, following the same dual
//! handler-plus-log-event dispatch a SQL query logger would use
//! (`Severity` plays the role a `LevelFilter` plays there).

use std::any::Any;
use std::rc::Rc;

/// Severity of a diagnostic raised during prepare/execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The query has failed; no further prepare/execute will succeed.
    Fatal,
    /// An operation failed but the query may still be usable.
    Error,
    /// A non-fatal condition, e.g. an expression type error collapsed
    /// to `false` inside a filter.
    Warning,
}

/// A user-supplied handler: opaque user data plus a callback invoked
/// with that data, the severity, and the message.
pub type MessageHandler = Rc<dyn Fn(&dyn Any, Severity, &str)>;

/// The three error-handler hook slots, settable independently and at
/// any point in the query's life, each with its own setter callable
/// post-construction.
#[derive(Default, Clone)]
pub struct ErrorHandlers {
    fatal: Option<(Rc<dyn Any>, MessageHandler)>,
    error: Option<(Rc<dyn Any>, MessageHandler)>,
    warning: Option<(Rc<dyn Any>, MessageHandler)>,
}

impl ErrorHandlers {
    pub fn set_fatal_error_handler(&mut self, user_data: Rc<dyn Any>, handler: MessageHandler) {
        self.fatal = Some((user_data, handler));
    }

    pub fn set_error_handler(&mut self, user_data: Rc<dyn Any>, handler: MessageHandler) {
        self.error = Some((user_data, handler));
    }

    pub fn set_warning_handler(&mut self, user_data: Rc<dyn Any>, handler: MessageHandler) {
        self.warning = Some((user_data, handler));
    }

    pub fn fatal(&self, message: &str) {
        self.dispatch(&self.fatal, Severity::Fatal, message);
    }

    pub fn error(&self, message: &str) {
        self.dispatch(&self.error, Severity::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.dispatch(&self.warning, Severity::Warning, message);
    }

    fn dispatch(&self, slot: &Option<(Rc<dyn Any>, MessageHandler)>, severity: Severity, message: &str) {
        if let Some((user_data, handler)) = slot {
            handler(user_data.as_ref(), severity, message);
        }
        match severity {
            Severity::Fatal | Severity::Error => {
                tracing::error!(target: "rasqal_core", severity = ?severity, "{message}")
            }
            Severity::Warning => tracing::warn!(target: "rasqal_core", "{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn unset_handler_does_not_panic() {
        let handlers = ErrorHandlers::default();
        handlers.warning("nothing installed");
    }

    #[test]
    fn installed_handler_is_invoked_with_message() {
        let mut handlers = ErrorHandlers::default();
        let seen: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let seen_for_handler = seen.clone();
        handlers.set_warning_handler(
            Rc::new(()),
            Rc::new(move |_user_data, severity, message| {
                assert_eq!(severity, Severity::Warning);
                seen_for_handler.borrow_mut().push(message.to_string());
            }),
        );
        handlers.warning("type error in filter expression");
        assert_eq!(seen.borrow().len(), 1);
    }
}
