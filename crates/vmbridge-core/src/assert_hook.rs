//! Fatal invariant hook.
//!
//! The runtime reports a failed internal check through [`dispatch`]; the
//! installed handler decides whether execution traps. One handler is active
//! per process and installing another replaces it.

use std::borrow::Cow;
use std::fmt;
use std::io::Write as _;
use std::sync::{Arc, RwLock};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssertionReport<'a> {
    pub expression: Cow<'a, str>,
    pub file: Cow<'a, str>,
    pub line: i32,
    pub function: Cow<'a, str>,
}

impl fmt::Display for AssertionReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}): ASSERTION FAILED: {}",
            self.file, self.line, self.expression
        )?;
        if !self.function.is_empty() {
            write!(f, " in {}", self.function)?;
        }
        Ok(())
    }
}

/// Returns true when execution should trap.
pub type AssertHandler = Arc<dyn Fn(&AssertionReport<'_>) -> bool + Send + Sync>;

static HANDLER: RwLock<Option<AssertHandler>> = RwLock::new(None);

pub fn install(handler: AssertHandler) {
    let mut slot = HANDLER.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(handler);
}

pub fn install_standard() {
    install(Arc::new(standard_handler));
}

pub fn is_installed() -> bool {
    HANDLER.read().map(|slot| slot.is_some()).unwrap_or(false)
}

/// Report a failed invariant. Without a handler the runtime's default
/// applies, which is to trap.
pub fn dispatch(report: &AssertionReport<'_>) -> bool {
    let handler = HANDLER
        .read()
        .ok()
        .and_then(|slot| slot.as_ref().map(Arc::clone));
    match handler {
        Some(handler) => handler(report),
        None => true,
    }
}

/// Prints the report to stderr and always traps.
pub fn standard_handler(report: &AssertionReport<'_>) -> bool {
    let mut stderr = std::io::stderr().lock();
    let _ = writeln!(stderr, "{report}");
    let _ = stderr.flush();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn report() -> AssertionReport<'static> {
        AssertionReport {
            expression: "n >= 0".into(),
            file: "lvm.cpp".into(),
            line: 42,
            function: "execute".into(),
        }
    }

    #[test]
    fn report_formats_all_four_fields() {
        assert_eq!(
            report().to_string(),
            "lvm.cpp(42): ASSERTION FAILED: n >= 0 in execute"
        );
        let mut anon = report();
        anon.function = "".into();
        assert_eq!(anon.to_string(), "lvm.cpp(42): ASSERTION FAILED: n >= 0");
    }

    #[test]
    fn installing_again_replaces_previous_handler() {
        static FIRST: AtomicUsize = AtomicUsize::new(0);
        static SECOND: AtomicUsize = AtomicUsize::new(0);

        install(Arc::new(|_: &AssertionReport<'_>| {
            FIRST.fetch_add(1, Ordering::SeqCst);
            true
        }));
        install(Arc::new(|_: &AssertionReport<'_>| {
            SECOND.fetch_add(1, Ordering::SeqCst);
            false
        }));

        assert!(!dispatch(&report()));
        assert_eq!(FIRST.load(Ordering::SeqCst), 0);
        assert_eq!(SECOND.load(Ordering::SeqCst), 1);
        assert!(is_installed());

        install_standard();
        assert!(dispatch(&report()));
        assert_eq!(SECOND.load(Ordering::SeqCst), 1);
    }
}
