//! Callback bridge.
//!
//! The host never hands a closure across the boundary. It registers a pair
//! of function pointers and an integer handle that keys the closure in its
//! own table; native code calls `callback(payload, handle)` synchronously
//! and calls `drop(handle)` exactly once when it no longer needs the
//! registration. Drops are delivered through the [`deferred`] queue, so
//! they reach the host before the entry point returns but never from inside
//! the interpreter's collector.
//!
//! [`deferred`]: crate::deferred

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;

use crate::deferred::defer;

/// Invoked with a per-call payload record and the registration handle.
pub type GluCallbackFn = extern "C" fn(payload: *mut c_void, handle: usize);

/// Invoked once with the registration handle when native code lets go.
pub type GluDropFn = extern "C" fn(handle: usize);

/// A host callback registration.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct GluCallback {
    pub callback: Option<GluCallbackFn>,
    pub drop: Option<GluDropFn>,
    pub handle: usize,
}

impl fmt::Debug for GluCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GluCallback")
            .field("handle", &self.handle)
            .field("callback", &self.callback.is_some())
            .field("drop", &self.drop.is_some())
            .finish()
    }
}

/// A host handle and the callback that releases it. Dropping this calls
/// `drop(handle)`, if set.
pub(crate) struct HostRelease {
    drop: Option<GluDropFn>,
    handle: usize,
}

impl HostRelease {
    pub(crate) fn new(drop: Option<GluDropFn>, handle: usize) -> Self {
        HostRelease { drop, handle }
    }

    /// Hand the release to the deferred queue.
    pub(crate) fn defer(self) {
        defer(Box::new(self));
    }
}

impl Drop for HostRelease {
    fn drop(&mut self) {
        tracing::trace!(handle = self.handle, "host handle released");
        if let Some(drop_fn) = self.drop {
            drop_fn(self.handle);
        }
    }
}

/// Native-side owner of a registration whose callback receives a `P`.
///
/// Not `Clone`: the drop callback is queued when the guard is dropped, so
/// it runs once.
pub(crate) struct CallbackGuard<P> {
    callback: Option<GluCallbackFn>,
    handle: usize,
    release: Option<HostRelease>,
    payload: PhantomData<fn(&mut P)>,
}

impl<P> CallbackGuard<P> {
    pub(crate) fn new(registration: GluCallback) -> Self {
        tracing::trace!(handle = registration.handle, "callback registered");
        CallbackGuard {
            callback: registration.callback,
            handle: registration.handle,
            release: Some(HostRelease::new(registration.drop, registration.handle)),
            payload: PhantomData,
        }
    }

    /// Call the host synchronously with `payload`. Returns `false` when the
    /// registration has no callback, in which case the payload is untouched.
    pub(crate) fn invoke(&self, payload: &mut P) -> bool {
        match self.callback {
            Some(callback) => {
                callback(std::ptr::from_mut(payload).cast(), self.handle);
                true
            }
            None => false,
        }
    }
}

impl<P> Drop for CallbackGuard<P> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release.defer();
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
