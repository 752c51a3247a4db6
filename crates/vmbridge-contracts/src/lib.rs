//! Shared, ABI-pinned identifiers.
//!
//! These constants are the single source of truth for tag values, result codes
//! and environment variables that cross the host boundary. Changing any of them
//! is an ABI break.

pub const FLAG_KIND_BOOL: i32 = 0;
pub const FLAG_KIND_INT: i32 = 1;

pub const FLAG_REPORT_SCHEMA_VERSION: &str = "vmbridge.flags.report@0.1.0";
pub const FLAG_PRESET_SCHEMA_VERSION: &str = "vmbridge.flags.preset@0.1.0";

pub const ENV_FLAGS: &str = "VMBRIDGE_FLAGS";
pub const ENV_FLAGS_FILE: &str = "VMBRIDGE_FLAGS_FILE";
pub const ENV_STRICT_FLAGS: &str = "VMBRIDGE_STRICT_FLAGS";

/// `vm_isnative` result for a level with no frame.
pub const VM_ISNATIVE_INVALID_LEVEL: i32 = -1;
/// `vm_checkstack` result when the stack is within bounds.
pub const VM_CHECKSTACK_OK: i32 = 0;
/// `vm_checkstack` result when growing the stack ran out of memory. Any other
/// non-zero result is a stack overflow.
pub const VM_CHECKSTACK_ERRMEM: i32 = 2;
