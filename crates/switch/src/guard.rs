//! Per-thread dispatch state.
//!
//! A thread inside a dispatch never reconfigures and never takes the dispatch
//! gate a second time. [`NsContext`](crate::NsContext) carries the depth
//! explicitly for nested calls; this counter covers callbacks that re-enter
//! through a top-level entry point instead.
//!
//! Sources that cannot write an error number into their arguments (loaded
//! modules only see a raw pointer) record it with [`set_errno`]; the caller
//! collects it with [`take_errno`] once the dispatch returns.

use std::cell::Cell;
use std::marker::PhantomData;

thread_local! {
	static DEPTH: Cell<usize> = const { Cell::new(0) };
	static ERRNO: Cell<i32> = const { Cell::new(0) };
}

/// Marks the current thread as inside a dispatch until dropped.
pub(crate) struct DispatchScope {
	_not_send: PhantomData<*const ()>,
}

impl DispatchScope {
	pub(crate) fn enter() -> Self {
		DEPTH.with(|depth| depth.set(depth.get() + 1));
		Self { _not_send: PhantomData }
	}
}

impl Drop for DispatchScope {
	fn drop(&mut self) {
		DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
	}
}

/// Number of dispatch calls the current thread is inside.
pub fn depth() -> usize {
	DEPTH.with(Cell::get)
}

/// Returns true while the current thread is inside any dispatch call.
pub fn in_dispatch() -> bool {
	depth() > 0
}

/// Records `errno` as the error number of the current call on this thread.
/// Zero is ignored so a later source cannot clear an earlier report.
pub fn set_errno(errno: i32) {
	if errno != 0 {
		ERRNO.with(|slot| slot.set(errno));
	}
}

/// Returns and clears the last error number recorded on this thread.
pub fn take_errno() -> i32 {
	ERRNO.with(|slot| slot.replace(0))
}
