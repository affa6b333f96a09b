//! Tracks the trace context the current thread is executing in.
//!
//! The tracer pushes a context when a scope is entered and the returned guard
//! pops it on drop, so context-less accessors (`baggage::get`, `baggage::set`)
//! can resolve against whatever trace the thread is currently serving.
use crate::context::TraceContext;
use std::cell::RefCell;
use std::marker::PhantomData;

thread_local! {
    static CURRENT: RefCell<Vec<TraceContext>> = const { RefCell::new(Vec::new()) };
}

/// A guard that removes its context from the current-context stack when
/// dropped.
#[derive(Debug)]
pub struct CurrentGuard {
    // Scopes nest per thread; the guard must be dropped where it was created.
    _not_send: PhantomData<*mut ()>,
}

/// Returns the context the current thread is executing in, if any.
pub fn current() -> Option<TraceContext> {
    CURRENT.with(|stack| stack.borrow().last().cloned())
}

/// Makes `context` current for the lifetime of the returned guard.
///
/// Scopes nest: the previous context becomes current again when the guard is
/// dropped.
#[must_use = "dropping the guard immediately restores the previous context"]
pub fn set_current(context: TraceContext) -> CurrentGuard {
    CURRENT.with(|stack| stack.borrow_mut().push(context));
    CurrentGuard {
        _not_send: PhantomData,
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let _ = CURRENT.try_with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(span_id: u64) -> TraceContext {
        TraceContext::builder().trace_id(1).span_id(span_id).build()
    }

    #[test]
    fn scopes_nest() {
        assert!(current().is_none());
        let outer = set_current(context(1));
        assert_eq!(current().map(|c| c.span_id()), Some(1));
        {
            let _inner = set_current(context(2));
            assert_eq!(current().map(|c| c.span_id()), Some(2));
        }
        assert_eq!(current().map(|c| c.span_id()), Some(1));
        drop(outer);
        assert!(current().is_none());
    }
}
