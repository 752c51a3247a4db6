use anyhow::{Context, Result};

use crate::config::BridgeConfig;
use crate::flags::{FlagDef, FlagRegistry};

/// Process-wide bridge state: the flag registry built from the runtime's
/// table, with the configured preset applied.
#[derive(Debug, Clone)]
pub struct BridgeContext {
    registry: FlagRegistry,
    config: BridgeConfig,
}

impl BridgeContext {
    pub fn new<I>(defs: I, config: BridgeConfig) -> Result<Self>
    where
        I: IntoIterator<Item = FlagDef>,
    {
        let registry = FlagRegistry::from_defs(defs).context("build flag registry")?;
        let mut ctx = BridgeContext { registry, config };
        ctx.apply_preset()?;
        tracing::debug!(flags = ctx.registry.len(), "bridge context ready");
        Ok(ctx)
    }

    fn apply_preset(&mut self) -> Result<()> {
        if self.config.preset.is_empty() {
            return Ok(());
        }
        let report = self.config.preset.apply(&mut self.registry);
        if report.unknown.is_empty() {
            return Ok(());
        }
        if self.config.strict_flags {
            let names: Vec<String> = report
                .unknown
                .iter()
                .map(|(kind, name)| format!("{kind}:{name}"))
                .collect();
            anyhow::bail!("flag preset names unknown flags: {}", names.join(", "));
        }
        for (kind, name) in &report.unknown {
            tracing::warn!(
                %kind,
                name = name.as_str(),
                "flag preset names an unknown flag; skipped"
            );
        }
        Ok(())
    }

    pub fn registry(&self) -> &FlagRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FlagRegistry {
        &mut self.registry
    }

    /// Put every flag back to its startup value: the table default with the
    /// configured preset on top.
    pub fn reset_flags(&mut self) {
        self.registry.reset_to_defaults();
        self.config.preset.apply(&mut self.registry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::FlagPreset;

    fn defs() -> Vec<FlagDef> {
        vec![FlagDef::bool("FeatureA", false), FlagDef::int("Threshold", 10)]
    }

    #[test]
    fn preset_is_applied_at_init_and_on_reset() {
        let config = BridgeConfig {
            preset: FlagPreset::parse_spec("Threshold=64").unwrap(),
            strict_flags: false,
        };
        let mut ctx = BridgeContext::new(defs(), config).unwrap();
        assert_eq!(ctx.registry().get::<i32>(b"Threshold"), Some(64));

        assert!(ctx.registry_mut().set(b"Threshold", 1i32));
        assert!(ctx.registry_mut().set(b"FeatureA", true));
        ctx.reset_flags();
        assert_eq!(ctx.registry().get::<i32>(b"Threshold"), Some(64));
        assert_eq!(ctx.registry().get::<bool>(b"FeatureA"), Some(false));
    }

    #[test]
    fn strict_mode_rejects_unknown_preset_names() {
        let config = BridgeConfig {
            preset: FlagPreset::parse_spec("Nope=true").unwrap(),
            strict_flags: true,
        };
        let err = BridgeContext::new(defs(), config).unwrap_err();
        assert!(format!("{err:#}").contains("bool:Nope"), "{err:#}");

        let lenient = BridgeConfig {
            preset: FlagPreset::parse_spec("Nope=true").unwrap(),
            strict_flags: false,
        };
        let ctx = BridgeContext::new(defs(), lenient).unwrap();
        assert_eq!(ctx.registry().len(), 2);
    }

    #[test]
    fn bad_table_fails_init() {
        let err = BridgeContext::new(
            vec![FlagDef::int("Threshold", 1), FlagDef::int("Threshold", 2)],
            BridgeConfig::default(),
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("registered twice"), "{err:#}");
    }
}
