//! Passthroughs to runtime entry points that act on a live execution context.

use crate::failure::Failure;

/// The runtime's live call/interpreter state, as far as the bridge needs it.
pub trait ExecutionContext {
    /// Index of the first free stack slot.
    fn stack_top(&self) -> usize;

    /// Make room for `n` more slots above the top, growing the stack if
    /// needed. Fails once the runtime's hard ceiling would be exceeded.
    fn grow_stack(&mut self, n: usize) -> Result<(), Failure>;

    /// Raise the soft stack limit to at least `limit`. Never lowers it.
    fn raise_stack_limit(&mut self, limit: usize);

    /// Whether frame `level` (0 = innermost) runs native code. `None` when
    /// there is no such frame.
    fn frame_is_native(&self, level: usize) -> Option<bool>;
}

/// Guarantee `n` more usable slots. Non-positive requests are no-ops; a
/// runtime failure is returned untouched.
pub fn ensure_stack_capacity<C>(ctx: &mut C, n: i32) -> Result<(), Failure>
where
    C: ExecutionContext + ?Sized,
{
    match usize::try_from(n) {
        Ok(0) | Err(_) => Ok(()),
        Ok(n) => ctx.grow_stack(n),
    }
}

/// Raise the soft limit to the current top plus `n`.
pub fn expand_stack_limit<C>(ctx: &mut C, n: i32)
where
    C: ExecutionContext + ?Sized,
{
    let n = usize::try_from(n).unwrap_or(0);
    let limit = ctx.stack_top().saturating_add(n);
    ctx.raise_stack_limit(limit);
}

pub fn is_native_frame<C>(ctx: &C, level: i32) -> bool
where
    C: ExecutionContext + ?Sized,
{
    let Ok(level) = usize::try_from(level) else {
        return false;
    };
    ctx.frame_is_native(level).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;

    struct Fixed {
        top: usize,
        limit: usize,
        grown: Vec<usize>,
        frames: Vec<bool>,
    }

    impl ExecutionContext for Fixed {
        fn stack_top(&self) -> usize {
            self.top
        }

        fn grow_stack(&mut self, n: usize) -> Result<(), Failure> {
            if n > 100 {
                return Err(Failure::stack_overflow(n));
            }
            self.grown.push(n);
            Ok(())
        }

        fn raise_stack_limit(&mut self, limit: usize) {
            self.limit = self.limit.max(limit);
        }

        fn frame_is_native(&self, level: usize) -> Option<bool> {
            self.frames.get(level).copied()
        }
    }

    fn fixed() -> Fixed {
        Fixed {
            top: 5,
            limit: 10,
            grown: Vec::new(),
            frames: vec![true, false],
        }
    }

    #[test]
    fn non_positive_requests_do_not_reach_the_runtime() {
        let mut ctx = fixed();
        ensure_stack_capacity(&mut ctx, 0).unwrap();
        ensure_stack_capacity(&mut ctx, -3).unwrap();
        ensure_stack_capacity(&mut ctx, 7).unwrap();
        assert_eq!(ctx.grown, vec![7]);
    }

    #[test]
    fn overflow_is_propagated() {
        let mut ctx = fixed();
        let err = ensure_stack_capacity(&mut ctx, 1_000).unwrap_err();
        assert_eq!(err.kind(), FailureKind::StackOverflow);
    }

    #[test]
    fn limit_is_anchored_at_top() {
        let mut ctx = fixed();
        expand_stack_limit(&mut ctx, 20);
        assert_eq!(ctx.limit, 25);
        expand_stack_limit(&mut ctx, -4);
        assert_eq!(ctx.limit, 25);
    }

    #[test]
    fn invalid_levels_are_not_native() {
        let ctx = fixed();
        assert!(is_native_frame(&ctx, 0));
        assert!(!is_native_frame(&ctx, 1));
        assert!(!is_native_frame(&ctx, 2));
        assert!(!is_native_frame(&ctx, -1));
    }
}
