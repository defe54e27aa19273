//! Per-thread default context stack
//!
//! Pushing a context makes it the calling thread's default and acquires
//! it; popping releases it. Pushes and pops must nest.

use std::cell::RefCell;

use mainctx_core::kcritical;

use crate::context::MainContext;

thread_local! {
    static DEFAULT_STACK: RefCell<Vec<MainContext>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn push_thread_default(context: &MainContext) {
    if !context.acquire() {
        kcritical!(
            "push_thread_default: context {:?} is owned by another thread",
            context.id()
        );
        return;
    }
    DEFAULT_STACK.with(|stack| stack.borrow_mut().push(context.clone()));
}

pub(crate) fn pop_thread_default(context: &MainContext) {
    let popped = DEFAULT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        match stack.last() {
            Some(top) if MainContext::ptr_eq(top, context) => stack.pop(),
            _ => None,
        }
    });
    match popped {
        Some(popped) => popped.release(),
        None => kcritical!(
            "pop_thread_default: context {:?} is not the thread default",
            context.id()
        ),
    }
}

pub(crate) fn thread_default() -> Option<MainContext> {
    DEFAULT_STACK.with(|stack| stack.borrow().last().cloned())
}

pub(crate) fn ref_thread_default() -> MainContext {
    thread_default().unwrap_or_else(|| MainContext::default_context().clone())
}

/// Depth of the calling thread's default stack
pub fn thread_default_depth() -> usize {
    DEFAULT_STACK.with(|stack| stack.borrow().len())
}
