#![allow(non_camel_case_types)]
#![allow(clippy::missing_safety_doc)]

use std::borrow::Cow;
use std::ffi::{c_char, c_int, c_void, CStr, CString};
use std::ptr::NonNull;
use std::sync::RwLock;

use vmbridge_contracts::{VM_CHECKSTACK_ERRMEM, VM_CHECKSTACK_OK, VM_ISNATIVE_INVALID_LEVEL};
use vmbridge_core::assert_hook;
use vmbridge_core::{
    ensure_stack_capacity, expand_stack_limit, is_native_frame, raise, resolve_bridge_config,
    AssertionReport, BridgeContext, ExecutionContext, Failure, FlagDef, FlagKind, FlagSnapshot,
};

#[cfg(any(target_arch = "wasm32", test))]
mod wasm;

/// Opaque interpreter state owned by the runtime.
#[repr(C)]
pub struct vm_state {
    _private: [u8; 0],
}

/// One row of the runtime's flag table.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct vm_flag_def {
    pub name: *const c_char,
    pub kind: c_int, // 0 = bool, 1 = int
    pub value: c_int,
}

/// Returns non-zero when the runtime should trap.
pub type vm_assert_handler = unsafe extern "C" fn(
    expression: *const c_char,
    file: *const c_char,
    line: c_int,
    function: *const c_char,
) -> c_int;

/// Flag enumeration handed to the host. `names[i]` has kind `kinds[i]`.
/// Released with [`vmbridge_freeflags`].
#[repr(C)]
#[derive(Copy, Clone)]
pub struct vmbridge_flag_group {
    pub names: *mut *mut c_char,
    pub kinds: *mut c_int,
    pub size: usize,
}

extern "C" {
    fn vm_flag_defs(len: *mut usize) -> *const vm_flag_def;
    fn vm_set_assert_handler(handler: Option<vm_assert_handler>);
    fn vm_checkstack(state: *mut vm_state, n: c_int) -> c_int;
    fn vm_stacktop(state: *mut vm_state) -> c_int;
    fn vm_expandstacklimit(state: *mut vm_state, limit: c_int);
    fn vm_isnative(state: *mut vm_state, level: c_int) -> c_int;
}

// -------------------------
// Process context
// -------------------------

enum ContextSlot {
    Unbuilt,
    Ready(BridgeContext),
    /// Init failed; stays failed until `vmbridge_shutdown`.
    Failed,
}

static CONTEXT: RwLock<ContextSlot> = RwLock::new(ContextSlot::Unbuilt);

unsafe fn runtime_flag_defs() -> Vec<FlagDef> {
    let mut len = 0usize;
    let ptr = vm_flag_defs(&mut len);
    if ptr.is_null() || len == 0 {
        return Vec::new();
    }
    let mut defs = Vec::with_capacity(len);
    for (i, def) in std::slice::from_raw_parts(ptr, len).iter().enumerate() {
        if def.name.is_null() {
            tracing::warn!(index = i, "runtime flag table row has no name; skipped");
            continue;
        }
        let name = CStr::from_ptr(def.name).to_bytes();
        match FlagKind::from_tag(def.kind) {
            Some(FlagKind::Bool) => defs.push(FlagDef::bool(name, def.value != 0)),
            Some(FlagKind::Int) => defs.push(FlagDef::int(name, def.value)),
            None => tracing::warn!(
                name = %String::from_utf8_lossy(name),
                tag = def.kind,
                "unknown flag kind tag; skipped"
            ),
        }
    }
    defs
}

fn build_context() -> anyhow::Result<BridgeContext> {
    let defs = unsafe { runtime_flag_defs() };
    let config = resolve_bridge_config()?;
    BridgeContext::new(defs, config)
}

fn write_context<R>(f: impl FnOnce(&mut BridgeContext) -> R) -> Option<R> {
    let mut slot = CONTEXT.write().unwrap_or_else(|e| e.into_inner());
    if matches!(*slot, ContextSlot::Unbuilt) {
        *slot = match build_context() {
            Ok(ctx) => ContextSlot::Ready(ctx),
            Err(err) => {
                tracing::error!("vmbridge init failed: {err:#}");
                ContextSlot::Failed
            }
        };
    }
    match &mut *slot {
        ContextSlot::Ready(ctx) => Some(f(ctx)),
        ContextSlot::Unbuilt | ContextSlot::Failed => None,
    }
}

fn read_context<R>(f: impl FnOnce(&BridgeContext) -> R) -> Option<R> {
    {
        let slot = CONTEXT.read().unwrap_or_else(|e| e.into_inner());
        match &*slot {
            ContextSlot::Ready(ctx) => return Some(f(ctx)),
            ContextSlot::Failed => return None,
            ContextSlot::Unbuilt => {}
        }
    }
    write_context(|ctx| f(ctx))
}

/// Build the flag registry from the runtime's table and apply the configured
/// preset. Returns 1 on success. Other entry points initialize lazily, so
/// calling this is only needed to surface configuration errors early.
///
/// Outside strict mode a bad preset is logged and skipped. A failed init is
/// not retried until [`vmbridge_shutdown`].
#[no_mangle]
pub extern "C" fn vmbridge_init() -> c_int {
    std::panic::catch_unwind(|| c_int::from(write_context(|_| ()).is_some())).unwrap_or(0)
}

/// Drop the process context. The next call rebuilds it.
#[no_mangle]
pub extern "C" fn vmbridge_shutdown() {
    let mut slot = CONTEXT.write().unwrap_or_else(|e| e.into_inner());
    *slot = ContextSlot::Unbuilt;
}

// -------------------------
// Flags
// -------------------------

unsafe fn name_bytes<'a>(name: *const c_char, len: usize) -> &'a [u8] {
    if name.is_null() || len == 0 {
        return &[];
    }
    std::slice::from_raw_parts(name.cast::<u8>(), len)
}

#[no_mangle]
pub extern "C" fn vmbridge_setflag_bool(
    name: *const c_char,
    name_len: usize,
    value: bool,
) -> bool {
    std::panic::catch_unwind(|| unsafe {
        let name = name_bytes(name, name_len);
        write_context(|ctx| ctx.registry_mut().set(name, value)).unwrap_or(false)
    })
    .unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn vmbridge_setflag_int(
    name: *const c_char,
    name_len: usize,
    value: c_int,
) -> bool {
    std::panic::catch_unwind(|| unsafe {
        let name = name_bytes(name, name_len);
        write_context(|ctx| ctx.registry_mut().set(name, value)).unwrap_or(false)
    })
    .unwrap_or(false)
}

/// Writes the value to `out` and returns true when a bool flag named `name`
/// exists. `out` is untouched on a miss.
#[no_mangle]
pub extern "C" fn vmbridge_getflag_bool(
    name: *const c_char,
    name_len: usize,
    out: *mut bool,
) -> bool {
    std::panic::catch_unwind(|| unsafe {
        let name = name_bytes(name, name_len);
        let Some(value) = read_context(|ctx| ctx.registry().get::<bool>(name)).flatten() else {
            return false;
        };
        if !out.is_null() {
            *out = value;
        }
        true
    })
    .unwrap_or(false)
}

#[no_mangle]
pub extern "C" fn vmbridge_getflag_int(
    name: *const c_char,
    name_len: usize,
    out: *mut c_int,
) -> bool {
    std::panic::catch_unwind(|| unsafe {
        let name = name_bytes(name, name_len);
        let Some(value) = read_context(|ctx| ctx.registry().get::<i32>(name)).flatten() else {
            return false;
        };
        if !out.is_null() {
            *out = value;
        }
        true
    })
    .unwrap_or(false)
}

/// Restore every flag to its table default with the configured preset on top.
#[no_mangle]
pub extern "C" fn vmbridge_resetflags() {
    let _ = std::panic::catch_unwind(|| write_context(BridgeContext::reset_flags));
}

impl vmbridge_flag_group {
    const EMPTY: vmbridge_flag_group = vmbridge_flag_group {
        names: std::ptr::null_mut(),
        kinds: std::ptr::null_mut(),
        size: 0,
    };

    fn from_snapshot(snapshot: FlagSnapshot) -> Self {
        if snapshot.is_empty() {
            return Self::EMPTY;
        }
        let mut names = Vec::with_capacity(snapshot.len());
        let mut kinds = Vec::with_capacity(snapshot.len());
        for entry in snapshot.into_entries() {
            // Registered names never contain NUL.
            let Ok(name) = CString::new(entry.name) else {
                continue;
            };
            names.push(name.into_raw());
            kinds.push(entry.kind.tag());
        }
        let size = names.len();
        vmbridge_flag_group {
            names: Box::into_raw(names.into_boxed_slice()).cast::<*mut c_char>(),
            kinds: Box::into_raw(kinds.into_boxed_slice()).cast::<c_int>(),
            size,
        }
    }

    unsafe fn release(self) {
        if self.size == 0 {
            return;
        }
        if !self.names.is_null() {
            let names = Box::from_raw(std::ptr::slice_from_raw_parts_mut(self.names, self.size));
            for &name in names.iter() {
                if !name.is_null() {
                    drop(CString::from_raw(name));
                }
            }
        }
        if !self.kinds.is_null() {
            drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                self.kinds, self.size,
            )));
        }
    }
}

/// Snapshot every registered flag: all bool flags, then all int flags, each
/// in ascending byte order of name. The caller owns the result and releases
/// it with [`vmbridge_freeflags`].
#[no_mangle]
pub extern "C" fn vmbridge_getflags() -> vmbridge_flag_group {
    std::panic::catch_unwind(|| {
        read_context(|ctx| ctx.registry().snapshot())
            .map(vmbridge_flag_group::from_snapshot)
            .unwrap_or(vmbridge_flag_group::EMPTY)
    })
    .unwrap_or(vmbridge_flag_group::EMPTY)
}

#[no_mangle]
pub extern "C" fn vmbridge_freeflags(group: vmbridge_flag_group) {
    let _ = std::panic::catch_unwind(|| unsafe { group.release() });
}

/// The same enumeration as [`vmbridge_getflags`] as a NUL-terminated JSON
/// report (`schema_version` and `flags`). Null when the context is
/// unavailable. Released with [`vmbridge_free_report`].
#[no_mangle]
pub extern "C" fn vmbridge_flags_report() -> *mut c_char {
    std::panic::catch_unwind(|| {
        let Some(report) = read_context(|ctx| ctx.registry().snapshot().to_report_json()) else {
            return std::ptr::null_mut();
        };
        CString::new(report.to_string())
            .map(CString::into_raw)
            .unwrap_or(std::ptr::null_mut())
    })
    .unwrap_or(std::ptr::null_mut())
}

#[no_mangle]
pub extern "C" fn vmbridge_free_report(report: *mut c_char) {
    if report.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(report) });
}

/// Release a buffer the runtime allocated with `malloc`.
#[no_mangle]
pub extern "C" fn vmbridge_free(ptr: *mut c_void) {
    if ptr.is_null() {
        return;
    }
    unsafe { libc::free(ptr) }
}

// -------------------------
// Assertion hook
// -------------------------

unsafe fn c_str_lossy<'a>(ptr: *const c_char, missing: &'static str) -> Cow<'a, str> {
    if ptr.is_null() {
        Cow::Borrowed(missing)
    } else {
        CStr::from_ptr(ptr).to_string_lossy()
    }
}

unsafe extern "C" fn assert_trampoline(
    expression: *const c_char,
    file: *const c_char,
    line: c_int,
    function: *const c_char,
) -> c_int {
    let report = AssertionReport {
        expression: c_str_lossy(expression, "?"),
        file: c_str_lossy(file, "?"),
        line,
        function: c_str_lossy(function, ""),
    };
    // A handler that panics still traps.
    std::panic::catch_unwind(|| assert_hook::dispatch(&report))
        .map(c_int::from)
        .unwrap_or(1)
}

/// Install the standard handler (print the report to stderr, then trap) and
/// route the runtime's assertion callback to it. Safe to call repeatedly.
#[no_mangle]
pub extern "C" fn vmbridge_register_assertion_handler() {
    assert_hook::install_standard();
    unsafe { vm_set_assert_handler(Some(assert_trampoline as vm_assert_handler)) };
}

// -------------------------
// Runtime passthroughs
// -------------------------

struct RawState(NonNull<vm_state>);

impl ExecutionContext for RawState {
    fn stack_top(&self) -> usize {
        usize::try_from(unsafe { vm_stacktop(self.0.as_ptr()) }).unwrap_or(0)
    }

    fn grow_stack(&mut self, n: usize) -> Result<(), Failure> {
        let Ok(slots) = c_int::try_from(n) else {
            return Err(Failure::stack_overflow(n));
        };
        match unsafe { vm_checkstack(self.0.as_ptr(), slots) } {
            VM_CHECKSTACK_OK => Ok(()),
            VM_CHECKSTACK_ERRMEM => Err(Failure::memory("not enough memory")),
            _ => Err(Failure::stack_overflow(n)),
        }
    }

    fn raise_stack_limit(&mut self, limit: usize) {
        let limit = c_int::try_from(limit).unwrap_or(c_int::MAX);
        unsafe { vm_expandstacklimit(self.0.as_ptr(), limit) }
    }

    fn frame_is_native(&self, level: usize) -> Option<bool> {
        let level = c_int::try_from(level).ok()?;
        match unsafe { vm_isnative(self.0.as_ptr(), level) } {
            VM_ISNATIVE_INVALID_LEVEL => None,
            0 => Some(false),
            _ => Some(true),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn host() -> vmbridge_core::NativeUnwind {
    vmbridge_core::NativeUnwind
}

#[cfg(target_arch = "wasm32")]
fn host() -> wasm::WasmHost {
    wasm::WasmHost
}

/// Make room for `n` more stack slots. When the runtime cannot grow the
/// stack the failure is raised through the host and this call does not
/// return normally.
#[no_mangle]
pub extern "C-unwind" fn vmbridge_checkstack(state: *mut vm_state, n: c_int) {
    let Some(state) = NonNull::new(state) else {
        return;
    };
    if let Err(failure) = ensure_stack_capacity(&mut RawState(state), n) {
        raise(&host(), failure)
    }
}

/// Raise the stack limit to at least the current top plus `n` slots.
#[no_mangle]
pub extern "C" fn vmbridge_expandstacklimit(state: *mut vm_state, n: c_int) {
    let Some(state) = NonNull::new(state) else {
        return;
    };
    expand_stack_limit(&mut RawState(state), n);
}

/// 1 when the frame `level` levels up the call stack is a native function,
/// 0 for script frames and invalid levels.
#[no_mangle]
pub extern "C" fn vmbridge_isnative(state: *mut vm_state, level: c_int) -> c_int {
    let Some(state) = NonNull::new(state) else {
        return 0;
    };
    c_int::from(is_native_frame(&RawState(state), level))
}
