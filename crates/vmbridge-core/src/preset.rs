//! Flag presets: values applied on top of the runtime's defaults when the
//! bridge context is built.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use vmbridge_contracts::FLAG_PRESET_SCHEMA_VERSION;

use crate::flags::{FlagKind, FlagRegistry};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlagPreset {
    #[serde(default)]
    pub schema_version: Option<String>,
    #[serde(default, rename = "bool")]
    pub bools: BTreeMap<String, bool>,
    #[serde(default, rename = "int")]
    pub ints: BTreeMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresetError {
    MissingValue(String),
    EmptyName(String),
    BadValue { name: String, value: String },
}

impl fmt::Display for PresetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PresetError::MissingValue(entry) => {
                write!(f, "flag entry {entry:?} is not of the form name=value")
            }
            PresetError::EmptyName(entry) => write!(f, "flag entry {entry:?} has an empty name"),
            PresetError::BadValue { name, value } => write!(
                f,
                "flag {name:?} has value {value:?} (expected true, false, or a 32-bit integer)"
            ),
        }
    }
}

impl std::error::Error for PresetError {}

/// Names a preset mentioned that the registry does not know.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresetReport {
    pub applied: usize,
    pub unknown: Vec<(FlagKind, String)>,
}

impl FlagPreset {
    /// Parse `name=value` entries separated by `;` or `,`. `true`/`false`
    /// target bool flags, decimal integers target int flags.
    pub fn parse_spec(spec: &str) -> Result<Self, PresetError> {
        let mut preset = FlagPreset::default();
        for entry in spec.split([';', ',']) {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }
            let Some((name, value)) = entry.split_once('=') else {
                return Err(PresetError::MissingValue(entry.to_string()));
            };
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() {
                return Err(PresetError::EmptyName(entry.to_string()));
            }
            match value {
                "true" => {
                    preset.bools.insert(name.to_string(), true);
                }
                "false" => {
                    preset.bools.insert(name.to_string(), false);
                }
                _ => {
                    let v = value.parse::<i32>().map_err(|_| PresetError::BadValue {
                        name: name.to_string(),
                        value: value.to_string(),
                    })?;
                    preset.ints.insert(name.to_string(), v);
                }
            }
        }
        Ok(preset)
    }

    pub fn from_json_str(txt: &str) -> Result<Self> {
        let preset: FlagPreset = serde_json::from_str(txt).context("parse flag preset JSON")?;
        if let Some(version) = &preset.schema_version {
            if version != FLAG_PRESET_SCHEMA_VERSION {
                anyhow::bail!(
                    "unsupported flag preset schema_version {version:?} (expected {FLAG_PRESET_SCHEMA_VERSION:?})"
                );
            }
        }
        Ok(preset)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("read flag preset: {}", path.display()))?;
        Self::from_json_str(&txt).with_context(|| format!("load flag preset: {}", path.display()))
    }

    pub fn is_empty(&self) -> bool {
        self.bools.is_empty() && self.ints.is_empty()
    }

    /// Entries in `other` win over entries already present.
    pub fn merge(&mut self, other: FlagPreset) {
        self.bools.extend(other.bools);
        self.ints.extend(other.ints);
    }

    pub fn apply(&self, reg: &mut FlagRegistry) -> PresetReport {
        let mut report = PresetReport::default();
        for (name, value) in &self.bools {
            if reg.set(name.as_bytes(), *value) {
                report.applied += 1;
            } else {
                report.unknown.push((FlagKind::Bool, name.clone()));
            }
        }
        for (name, value) in &self.ints {
            if reg.set(name.as_bytes(), *value) {
                report.applied += 1;
            } else {
                report.unknown.push((FlagKind::Int, name.clone()));
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::FlagDef;

    #[test]
    fn parse_spec_infers_kind_from_value() {
        let preset =
            FlagPreset::parse_spec(" FeatureA=true; Threshold = -4 ,Other=false;;").unwrap();
        assert_eq!(preset.bools.get("FeatureA"), Some(&true));
        assert_eq!(preset.bools.get("Other"), Some(&false));
        assert_eq!(preset.ints.get("Threshold"), Some(&-4));
    }

    #[test]
    fn parse_spec_rejects_malformed_entries() {
        assert_eq!(
            FlagPreset::parse_spec("FeatureA").unwrap_err(),
            PresetError::MissingValue("FeatureA".to_string())
        );
        assert_eq!(
            FlagPreset::parse_spec("=1").unwrap_err(),
            PresetError::EmptyName("=1".to_string())
        );
        assert!(matches!(
            FlagPreset::parse_spec("A=yes"),
            Err(PresetError::BadValue { .. })
        ));
        assert!(matches!(
            FlagPreset::parse_spec("A=99999999999"),
            Err(PresetError::BadValue { .. })
        ));
    }

    #[test]
    fn json_preset_checks_schema_version() {
        let ok = FlagPreset::from_json_str(&format!(
            r#"{{"schema_version": "{FLAG_PRESET_SCHEMA_VERSION}", "bool": {{"FeatureA": true}}, "int": {{"Threshold": 3}}}}"#
        ))
        .unwrap();
        assert_eq!(ok.ints.get("Threshold"), Some(&3));

        let err = FlagPreset::from_json_str(r#"{"schema_version": "nope@9"}"#).unwrap_err();
        assert!(format!("{err:#}").contains("unsupported"), "{err:#}");

        assert!(FlagPreset::from_json_str(r#"{"float": {}}"#).is_err());
    }

    #[test]
    fn apply_reports_unknown_names_and_keeps_kinds_apart() {
        let mut reg = FlagRegistry::from_defs([
            FlagDef::bool("FeatureA", false),
            FlagDef::int("Threshold", 10),
        ])
        .unwrap();
        let preset = FlagPreset::parse_spec("FeatureA=true;Threshold=20;Missing=1;Threshold=false")
            .unwrap();
        let report = preset.apply(&mut reg);
        assert_eq!(report.applied, 2);
        assert_eq!(
            report.unknown,
            vec![
                (FlagKind::Bool, "Threshold".to_string()),
                (FlagKind::Int, "Missing".to_string()),
            ]
        );
        assert_eq!(reg.get::<bool>(b"FeatureA"), Some(true));
        assert_eq!(reg.get::<i32>(b"Threshold"), Some(20));
    }

    #[test]
    fn merge_prefers_later_entries() {
        let mut base = FlagPreset::parse_spec("A=1;B=true").unwrap();
        base.merge(FlagPreset::parse_spec("A=2").unwrap());
        assert_eq!(base.ints.get("A"), Some(&2));
        assert_eq!(base.bools.get("B"), Some(&true));
    }
}
