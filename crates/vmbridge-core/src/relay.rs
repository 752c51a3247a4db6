//! Exception relay.
//!
//! Engine code reports failures as `Result<_, Failure>`. The host's own
//! unwinding mechanism is only involved at the outermost boundary, through an
//! [`UnwindHost`]:
//!
//! - native targets use Rust unwinding ([`NativeUnwind`]);
//! - targets without native unwinding (wasm32) hand a [`TryCatchContext`] to
//!   the host, which calls back into [`TryCatchContext::run_trying`] and, if
//!   the host caught something, [`TryCatchContext::run_catching`].
//!
//! A caught failure terminates the guarded operation. There is no resumption.

use std::panic::{self, AssertUnwindSafe};

use crate::failure::Failure;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayState {
    /// The host has not entered the guarded operation yet.
    Pending,
    Running,
    /// The guarded operation returned without failing.
    Completed,
    /// A failure reached the catching continuation.
    Handled,
}

pub trait UnwindHost {
    /// Run `ctx.run_trying(self)`; if a failure is thrown out of it, pass the
    /// failure to `ctx.run_catching`.
    fn try_catch(&self, ctx: &mut TryCatchContext<'_>);

    /// Hand `failure` to the host's failure mechanism. Never returns.
    fn throw(&self, failure: Failure) -> !;
}

/// Rust unwinding. `throw` uses `resume_unwind`, so relayed failures do not
/// go through the panic hook.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeUnwind;

impl UnwindHost for NativeUnwind {
    fn try_catch(&self, ctx: &mut TryCatchContext<'_>) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| ctx.run_trying(self)));
        if let Err(payload) = result {
            ctx.run_catching(Failure::from_panic_payload(payload));
        }
    }

    fn throw(&self, failure: Failure) -> ! {
        panic::resume_unwind(Box::new(failure))
    }
}

type Trying<'a> = Box<dyn FnOnce() -> Result<(), Failure> + 'a>;
type Catching<'a> = Box<dyn FnOnce(Failure) + 'a>;

/// The operation that may fail, paired with what to do with its failure.
/// Valid for a single relay invocation.
pub struct TryCatchContext<'a> {
    trying: Option<Trying<'a>>,
    catching: Option<Catching<'a>>,
    state: RelayState,
}

impl<'a> TryCatchContext<'a> {
    pub fn new<T, C>(trying: T, catching: C) -> Self
    where
        T: FnOnce() -> Result<(), Failure> + 'a,
        C: FnOnce(Failure) + 'a,
    {
        Self {
            trying: Some(Box::new(trying)),
            catching: Some(Box::new(catching)),
            state: RelayState::Pending,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn run_trying<H: UnwindHost + ?Sized>(&mut self, host: &H) {
        let Some(trying) = self.trying.take() else {
            tracing::warn!("guarded operation entered twice; ignoring");
            return;
        };
        self.state = RelayState::Running;
        match trying() {
            Ok(()) => self.state = RelayState::Completed,
            Err(failure) => {
                tracing::debug!(kind = %failure.kind(), "guarded operation failed");
                host.throw(failure)
            }
        }
    }

    pub fn run_catching(&mut self, failure: Failure) {
        let Some(catching) = self.catching.take() else {
            tracing::warn!(%failure, "failure caught twice; dropping the second one");
            return;
        };
        self.trying = None;
        self.state = RelayState::Handled;
        catching(failure);
    }
}

/// Run `trying` under `host`. A failure raised inside it is delivered to
/// `catching` exactly once and ends the operation.
pub fn run_guarded<'a, H, T, C>(host: &H, trying: T, catching: C) -> RelayState
where
    H: UnwindHost + ?Sized,
    T: FnOnce() -> Result<(), Failure> + 'a,
    C: FnOnce(Failure) + 'a,
{
    let mut ctx = TryCatchContext::new(trying, catching);
    host.try_catch(&mut ctx);
    ctx.state()
}

/// [`run_guarded`] folded back into a plain `Result`.
pub fn guard<H, R, F>(host: &H, trying: F) -> Result<R, Failure>
where
    H: UnwindHost + ?Sized,
    F: FnOnce() -> Result<R, Failure>,
{
    let mut value = None;
    let mut caught = None;
    run_guarded(
        host,
        || {
            value = Some(trying()?);
            Ok(())
        },
        |failure| caught = Some(failure),
    );
    match (value, caught) {
        (_, Some(failure)) => Err(failure),
        (Some(value), None) => Ok(value),
        (None, None) => Err(Failure::runtime("guarded operation was never entered")),
    }
}

/// Raise `failure` from bridge code the host called into, so the host's own
/// failure handling sees it.
pub fn raise<H: UnwindHost + ?Sized>(host: &H, failure: Failure) -> ! {
    tracing::debug!(kind = %failure.kind(), "raising failure to host");
    host.throw(failure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;
    use std::cell::Cell;

    #[test]
    fn completed_operation_never_reaches_catching() {
        let caught = Cell::new(0);
        let state = run_guarded(&NativeUnwind, || Ok(()), |_| caught.set(caught.get() + 1));
        assert_eq!(state, RelayState::Completed);
        assert_eq!(caught.get(), 0);
    }

    #[test]
    fn raise_from_nested_call_is_caught() {
        fn deep(n: u32) -> Result<(), Failure> {
            if n == 0 {
                raise(&NativeUnwind, Failure::runtime("deep failure"));
            }
            deep(n - 1)
        }

        let got = guard(&NativeUnwind, || deep(8));
        assert_eq!(got, Err(Failure::runtime("deep failure")));
    }

    #[test]
    fn foreign_panics_become_panic_failures() {
        let got: Result<(), Failure> = guard(&NativeUnwind, || panic!("engine bug"));
        let failure = got.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Panic);
        assert_eq!(failure.message(), "engine bug");
    }

    #[test]
    fn second_catch_is_ignored() {
        let caught = Cell::new(0);
        let mut ctx = TryCatchContext::new(|| Ok(()), |_| caught.set(caught.get() + 1));
        ctx.run_catching(Failure::runtime("first"));
        ctx.run_catching(Failure::runtime("second"));
        assert_eq!(caught.get(), 1);
        assert_eq!(ctx.state(), RelayState::Handled);
    }

    #[test]
    fn catching_disables_trying() {
        let ran = Cell::new(false);
        let mut ctx = TryCatchContext::new(
            || {
                ran.set(true);
                Ok(())
            },
            |_| {},
        );
        ctx.run_catching(Failure::runtime("early"));
        ctx.run_trying(&NativeUnwind);
        assert!(!ran.get());
        assert_eq!(ctx.state(), RelayState::Handled);
    }
}
