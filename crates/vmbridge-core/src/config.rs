use std::path::PathBuf;

use anyhow::Context;
use vmbridge_contracts::{ENV_FLAGS, ENV_FLAGS_FILE, ENV_STRICT_FLAGS};

use crate::preset::FlagPreset;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    pub preset: FlagPreset,
    /// Unknown preset names and unreadable presets fail context init instead
    /// of being skipped.
    pub strict_flags: bool,
}

fn parse_bool_env(name: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Ok(false),
        other => anyhow::bail!(
            "invalid environment variable {name}={other:?} (expected one of: 1, 0, true, false, yes, no)"
        ),
    }
}

fn read_flags_env() -> Option<String> {
    std::env::var(ENV_FLAGS).ok()
}

fn read_flags_file_env() -> Option<PathBuf> {
    std::env::var_os(ENV_FLAGS_FILE)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn read_strict_flags_env() -> Option<String> {
    std::env::var(ENV_STRICT_FLAGS).ok()
}

fn resolve_preset(
    env_flags: Option<&str>,
    env_flags_file: Option<PathBuf>,
) -> anyhow::Result<FlagPreset> {
    let mut preset = match env_flags_file {
        Some(path) => FlagPreset::load_file(&path)
            .with_context(|| format!("invalid environment variable {ENV_FLAGS_FILE}"))?,
        None => FlagPreset::default(),
    };
    if let Some(spec) = env_flags {
        let inline = FlagPreset::parse_spec(spec)
            .with_context(|| format!("invalid environment variable {ENV_FLAGS}={spec:?}"))?;
        preset.merge(inline);
    }
    Ok(preset)
}

fn resolve_bridge_config_with_env(
    env_flags: Option<&str>,
    env_flags_file: Option<PathBuf>,
    env_strict_flags: Option<&str>,
) -> anyhow::Result<BridgeConfig> {
    let strict_flags = match env_strict_flags.map(|raw| parse_bool_env(ENV_STRICT_FLAGS, raw)) {
        None => false,
        Some(Ok(strict)) => strict,
        Some(Err(err)) => {
            tracing::error!("{err:#}; strict flag checking stays off");
            false
        }
    };
    let preset = match resolve_preset(env_flags, env_flags_file) {
        Ok(preset) => preset,
        Err(err) if strict_flags => return Err(err),
        Err(err) => {
            tracing::error!("flag preset ignored, runtime defaults apply: {err:#}");
            FlagPreset::default()
        }
    };
    Ok(BridgeConfig {
        preset,
        strict_flags,
    })
}

/// Read `VMBRIDGE_FLAGS_FILE`, `VMBRIDGE_FLAGS` and `VMBRIDGE_STRICT_FLAGS`.
///
/// Only fails in strict mode. Otherwise an unusable preset is logged and
/// dropped so the registry still comes up with the runtime's defaults.
pub fn resolve_bridge_config() -> anyhow::Result<BridgeConfig> {
    let env_flags = read_flags_env();
    let env_flags_file = read_flags_file_env();
    let env_strict_flags = read_strict_flags_env();
    resolve_bridge_config_with_env(
        env_flags.as_deref(),
        env_flags_file,
        env_strict_flags.as_deref(),
    )
}
