//! Host releases queued out of the interpreter.
//!
//! The interpreter finalizes user data and function closures while it
//! collects garbage, and a host drop callback may call straight back into
//! the boundary. Objects whose drop reaches the host are therefore parked
//! here and dropped by [`run_pending`], which every entry point runs before
//! returning.

use std::any::Any;
use std::cell::RefCell;

thread_local! {
    static PENDING: RefCell<Vec<Box<dyn Any>>> = const { RefCell::new(Vec::new()) };
}

/// Queue `object` to be dropped at the end of the current entry point.
///
/// During thread teardown the queue is gone and `object` drops at once.
pub(crate) fn defer(object: Box<dyn Any>) {
    let _ = PENDING.try_with(|pending| pending.borrow_mut().push(object));
}

/// Drop everything queued, including objects queued by those drops.
pub(crate) fn run_pending() {
    loop {
        let batch = PENDING
            .try_with(|pending| std::mem::take(&mut *pending.borrow_mut()))
            .unwrap_or_default();
        if batch.is_empty() {
            return;
        }
        tracing::trace!(count = batch.len(), "running deferred host drops");
        drop(batch);
    }
}
