//! Per-thread resolution stack.
//!
//! Every item resolution pushes a frame for as long as it runs. The stack
//! feeds the "Resolution stack" line of not-found errors and bounds the
//! resolution depth.

use std::cell::RefCell;

thread_local! {
    static STACK: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
}

/// Guard for one frame; popped on drop, also when unwinding.
pub(crate) struct Frame {
    _private: (),
}

impl Frame {
    pub fn enter(name: &str) -> Self {
        STACK.with(|stack| stack.borrow_mut().push(name.to_string()));
        Frame { _private: () }
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Current depth of nested resolutions on this thread.
pub(crate) fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

/// Names on the stack, outermost first.
pub(crate) fn snapshot() -> Vec<String> {
    STACK.with(|stack| stack.borrow().clone())
}
