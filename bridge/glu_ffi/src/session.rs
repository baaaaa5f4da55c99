//! Interpreter sessions.
//!
//! A session owns one Luau state with the standard libraries installed.
//! Its compiler options apply to chunks loaded without explicit ones, and
//! its memory ceiling counts bytes allocated above what the fresh state
//! used. Objects created through it refer to the state weakly: after
//! `glu_session_free` they stay safe to free.

use mlua::{Compiler, Lua, Table};

use crate::catch_panic;
use crate::deferred;
use crate::handle::{borrow, into_handle, release};
use crate::result::{guarded, Envelope, GluNoneResult};

/// Compiler options record as laid out at the boundary.
///
/// Levels outside their supported range are clamped when used:
/// optimization 0-2, debug 0-2, type info 0-1, coverage 0-2.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GluCompilerOptions {
    pub optimization_level: u8,
    pub debug_level: u8,
    pub type_info_level: u8,
    pub coverage_level: u8,
}

impl Default for GluCompilerOptions {
    fn default() -> Self {
        GluCompilerOptions {
            optimization_level: 1,
            debug_level: 1,
            type_info_level: 0,
            coverage_level: 0,
        }
    }
}

impl GluCompilerOptions {
    pub(crate) fn clamped(self) -> Self {
        GluCompilerOptions {
            optimization_level: self.optimization_level.min(2),
            debug_level: self.debug_level.min(2),
            type_info_level: self.type_info_level.min(1),
            coverage_level: self.coverage_level.min(2),
        }
    }

    pub(crate) fn compiler(self) -> Compiler {
        let opts = self.clamped();
        if opts != self {
            tracing::warn!(requested = ?self, used = ?opts, "compiler options clamped");
        }
        Compiler::new()
            .set_optimization_level(opts.optimization_level)
            .set_debug_level(opts.debug_level)
            .set_type_info_level(opts.type_info_level)
            .set_coverage_level(opts.coverage_level)
    }
}

pub struct GluSession {
    lua: Lua,
    /// Bytes the state used when it was created.
    baseline: usize,
}

impl GluSession {
    fn open() -> GluSession {
        let lua = Lua::new();
        let baseline = lua.used_memory();
        GluSession { lua, baseline }
    }

    /// A second view of the same state, lent to host callbacks.
    pub(crate) fn view(lua: &Lua, baseline: usize) -> GluSession {
        GluSession {
            lua: lua.clone(),
            baseline,
        }
    }

    pub(crate) fn lua(&self) -> &Lua {
        &self.lua
    }

    pub(crate) fn baseline(&self) -> usize {
        self.baseline
    }

    fn usage(&self) -> usize {
        self.lua.used_memory().saturating_sub(self.baseline)
    }

    fn set_memory_limit(&self, limit: usize) -> mlua::Result<()> {
        let absolute = match limit {
            0 => 0,
            n => self.baseline.saturating_add(n),
        };
        self.lua.set_memory_limit(absolute).map(drop)
    }
}

/// Create a session with the standard libraries installed. Null on failure.
#[no_mangle]
pub extern "C" fn glu_session_new() -> *mut GluSession {
    catch_panic(
        "glu_session_new",
        |_| std::ptr::null_mut(),
        || {
            let session = GluSession::open();
            tracing::debug!(baseline = session.baseline, "session created");
            into_handle(session)
        },
    )
}

/// Set the options used by chunks loaded without their own.
#[no_mangle]
pub extern "C" fn glu_session_set_compiler_options(
    session: *const GluSession,
    opts: GluCompilerOptions,
) {
    if let Some(session) = borrow(session) {
        session.lua.set_compiler(opts.compiler());
    }
}

/// Set the memory ceiling in bytes above the fresh session's footprint;
/// `0` removes it.
///
/// A ceiling below current usage is accepted: live objects are untouched
/// and new allocations fail until usage drops.
#[no_mangle]
pub extern "C" fn glu_session_set_memory_limit(
    session: *const GluSession,
    limit: usize,
) -> GluNoneResult {
    guarded("glu_session_set_memory_limit", || {
        let Some(session) = borrow(session) else {
            return GluNoneResult::null("session");
        };
        tracing::debug!(limit, "memory ceiling set");
        GluNoneResult::from_result(session.set_memory_limit(limit))
    })
}

/// Bytes currently charged against the ceiling.
#[no_mangle]
pub extern "C" fn glu_session_memory_usage(session: *const GluSession) -> usize {
    borrow(session).map_or(0, GluSession::usage)
}

/// Run a full garbage collection. Host drops for anything collected have
/// run when this returns.
#[no_mangle]
pub extern "C" fn glu_session_collect_garbage(session: *const GluSession) -> GluNoneResult {
    guarded("glu_session_collect_garbage", || {
        let Some(session) = borrow(session) else {
            return GluNoneResult::null("session");
        };
        GluNoneResult::from_result(session.lua.gc_collect())
    })
}

/// A new reference to the global table, or null.
#[no_mangle]
pub extern "C" fn glu_session_globals(session: *const GluSession) -> *mut Table {
    borrow(session).map_or(std::ptr::null_mut(), |s| into_handle(s.lua.globals()))
}

/// Destroy a session created by [`glu_session_new`]. Every remaining host
/// drop has run when this returns.
///
/// Never pass the session view a callback receives.
#[no_mangle]
pub extern "C" fn glu_session_free(session: *mut GluSession) {
    if session.is_null() {
        return;
    }
    tracing::debug!("session freed");
    catch_panic("glu_session_free", drop, || release(session));
    deferred::run_pending();
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "tests use unwrap/expect to panic on unexpected state"
)]
