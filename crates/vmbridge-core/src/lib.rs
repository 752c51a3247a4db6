//! Safe core of the VM bridge.
//!
//! This crate holds everything the flat C ABI in `vmbridge-native` forwards
//! to:
//! - the typed flag registry and its snapshots,
//! - flag presets read from the environment,
//! - the fatal invariant hook,
//! - the exception relay,
//! - passthroughs acting on a runtime execution context.

pub mod assert_hook;
pub mod config;
mod context;
mod exec;
mod failure;
mod flags;
pub mod preset;
pub mod relay;
mod snapshot;

pub use assert_hook::{AssertHandler, AssertionReport};
pub use config::{resolve_bridge_config, BridgeConfig};
pub use context::BridgeContext;
pub use exec::{ensure_stack_capacity, expand_stack_limit, is_native_frame, ExecutionContext};
pub use failure::{Failure, FailureKind};
pub use flags::{FlagDef, FlagKind, FlagKindParseError, FlagRegistry, FlagValue, RegistryError};
pub use preset::{FlagPreset, PresetError, PresetReport};
pub use relay::{guard, raise, run_guarded, NativeUnwind, RelayState, TryCatchContext, UnwindHost};
pub use snapshot::{FlagEntry, FlagSnapshot};
