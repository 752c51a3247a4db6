//! Exception relay for targets without native unwinding.
//!
//! The embedder provides `env.try_catch` and `env.throw`. `try_catch(ctx)`
//! must call [`vmbridge_try_impl`] with `ctx` and, if a throw escapes it,
//! [`vmbridge_catch_impl`] with the same `ctx` and the thrown pointer.
//! A throw unwinds through `vmbridge_try_impl`, so both it and the imports
//! use the `C-unwind` ABI.

use std::ffi::{c_char, c_void};

use vmbridge_core::{Failure, TryCatchContext, UnwindHost};

/// A relayed failure, owned by whoever holds the pointer.
#[repr(C)]
pub struct vmbridge_failure {
    _private: [u8; 0],
}

#[cfg_attr(target_arch = "wasm32", link(wasm_import_module = "env"))]
extern "C-unwind" {
    #[link_name = "try_catch"]
    fn host_try_catch(ctx: *mut c_void);
    #[link_name = "throw"]
    fn host_throw(failure: *mut vmbridge_failure) -> !;
}

pub struct WasmHost;

impl UnwindHost for WasmHost {
    fn try_catch(&self, ctx: &mut TryCatchContext<'_>) {
        let ctx = (ctx as *mut TryCatchContext<'_>).cast::<c_void>();
        unsafe { host_try_catch(ctx) }
    }

    fn throw(&self, failure: Failure) -> ! {
        let failure = Box::into_raw(Box::new(failure)).cast::<vmbridge_failure>();
        unsafe { host_throw(failure) }
    }
}

#[no_mangle]
pub extern "C-unwind" fn vmbridge_try_impl(ctx: *mut c_void) {
    let Some(ctx) = (unsafe { ctx.cast::<TryCatchContext<'_>>().as_mut() }) else {
        return;
    };
    ctx.run_trying(&WasmHost);
}

/// Takes ownership of `failure`. A null pointer stands for something the
/// host caught that did not come from the bridge.
#[no_mangle]
pub extern "C" fn vmbridge_catch_impl(ctx: *mut c_void, failure: *mut vmbridge_failure) {
    let failure = if failure.is_null() {
        Failure::runtime("foreign exception")
    } else {
        *unsafe { Box::from_raw(failure.cast::<Failure>()) }
    };
    let Some(ctx) = (unsafe { ctx.cast::<TryCatchContext<'_>>().as_mut() }) else {
        tracing::warn!(%failure, "caught failure has no relay context; dropped");
        return;
    };
    ctx.run_catching(failure);
}

/// Borrow the message of a thrown failure. Not NUL-terminated; the length is
/// written to `out_len`.
#[no_mangle]
pub extern "C" fn vmbridge_failure_message(
    failure: *const vmbridge_failure,
    out_len: *mut usize,
) -> *const c_char {
    let message = unsafe { failure.cast::<Failure>().as_ref() }.map_or("", Failure::message);
    if !out_len.is_null() {
        unsafe { *out_len = message.len() };
    }
    message.as_ptr().cast()
}

/// Free a thrown failure the host decided not to pass to
/// [`vmbridge_catch_impl`].
#[no_mangle]
pub extern "C" fn vmbridge_failure_release(failure: *mut vmbridge_failure) {
    if !failure.is_null() {
        drop(unsafe { Box::from_raw(failure.cast::<Failure>()) });
    }
}
