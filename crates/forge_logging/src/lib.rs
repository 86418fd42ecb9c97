#![deny(missing_docs)]
//! Shared logging utilities for the PocForge workspace.
//!
//! This crate provides the `forge_*` logging macros used across the codebase,
//! a thread-scoped run label that prefixes messages emitted by a collection
//! worker, and a minimal test initializer for the global logger.

use std::cell::RefCell;

thread_local! {
    /// Label of the collection run executing on the current thread, if any.
    static RUN_LABEL: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Guard that tags every `forge_*` message on this thread with a run label.
///
/// The previous label is restored when the guard is dropped, so scopes nest.
#[must_use = "the label is cleared as soon as the scope is dropped"]
pub struct RunScope {
    previous: Option<String>,
}

impl RunScope {
    /// Enters a scope labelled `label` on the current thread.
    pub fn enter(label: impl Into<String>) -> Self {
        let previous = RUN_LABEL.with(|cell| cell.borrow_mut().replace(label.into()));
        Self { previous }
    }
}

impl Drop for RunScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        RUN_LABEL.with(|cell| *cell.borrow_mut() = previous);
    }
}

/// Returns the run label of the current thread, if a [`RunScope`] is active.
pub fn current_run() -> Option<String> {
    RUN_LABEL.with(|cell| cell.borrow().clone())
}

#[doc(hidden)]
#[macro_export]
macro_rules! __forge_log {
    ($level:ident, $($arg:tt)*) => {{
        match $crate::current_run() {
            Some(run) => log::$level!("[{}] {}", run, format_args!($($arg)*)),
            None => log::$level!($($arg)*),
        }
    }};
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! forge_trace {
    ($($arg:tt)*) => {{
        $crate::__forge_log!(trace, $($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! forge_info {
    ($($arg:tt)*) => {{
        $crate::__forge_log!(info, $($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! forge_debug {
    ($($arg:tt)*) => {{
        $crate::__forge_log!(debug, $($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! forge_warn {
    ($($arg:tt)*) => {{
        $crate::__forge_log!(warn, $($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! forge_error {
    ($($arg:tt)*) => {{
        $crate::__forge_log!(error, $($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
