use serde::Serialize;
use vmbridge_contracts::FLAG_REPORT_SCHEMA_VERSION;

use crate::flags::{lossy, FlagKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlagEntry {
    #[serde(serialize_with = "serialize_name")]
    pub name: Vec<u8>,
    #[serde(serialize_with = "serialize_kind")]
    pub kind: FlagKind,
}

impl FlagEntry {
    /// The name for display; invalid UTF-8 shows as U+FFFD.
    pub fn name_lossy(&self) -> std::borrow::Cow<'_, str> {
        lossy(&self.name)
    }
}

fn serialize_name<S: serde::Serializer>(name: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&lossy(name))
}

fn serialize_kind<S: serde::Serializer>(kind: &FlagKind, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(kind.as_str())
}

/// Caller-owned copy of the registry's (name, kind) pairs.
///
/// Holds its own strings, so later registry writes never show through.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlagSnapshot {
    entries: Vec<FlagEntry>,
}

#[derive(Serialize)]
struct FlagReport<'a> {
    schema_version: &'static str,
    flags: &'a [FlagEntry],
}

impl FlagSnapshot {
    pub(crate) fn new(entries: Vec<FlagEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FlagEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FlagEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<FlagEntry> {
        self.entries
    }

    pub fn to_report_json(&self) -> serde_json::Value {
        serde_json::to_value(FlagReport {
            schema_version: FLAG_REPORT_SCHEMA_VERSION,
            flags: &self.entries,
        })
        .unwrap_or(serde_json::Value::Null)
    }
}

impl<'a> IntoIterator for &'a FlagSnapshot {
    type Item = &'a FlagEntry;
    type IntoIter = std::slice::Iter<'a, FlagEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flags::{FlagDef, FlagRegistry};
    use serde_json::json;

    #[test]
    fn snapshot_orders_bools_then_ints_by_name() {
        let reg = FlagRegistry::from_defs([
            FlagDef::int("Zeta", 1),
            FlagDef::bool("Beta", false),
            FlagDef::int("Alpha", 2),
            FlagDef::bool("Alpha", true),
        ])
        .unwrap();
        let snap = reg.snapshot();
        let names: Vec<(&[u8], FlagKind)> =
            snap.iter().map(|e| (e.name.as_slice(), e.kind)).collect();
        assert_eq!(
            names,
            vec![
                (&b"Alpha"[..], FlagKind::Bool),
                (&b"Beta"[..], FlagKind::Bool),
                (&b"Alpha"[..], FlagKind::Int),
                (&b"Zeta"[..], FlagKind::Int),
            ]
        );
    }

    #[test]
    fn report_json_is_stable() {
        let reg = FlagRegistry::from_defs([
            FlagDef::bool("FeatureA", false),
            FlagDef::int("Threshold", 10),
            FlagDef::bool(vec![b'x', 0xff], true),
        ])
        .unwrap();
        assert_eq!(
            reg.snapshot().to_report_json(),
            json!({
                "schema_version": FLAG_REPORT_SCHEMA_VERSION,
                "flags": [
                    {"name": "FeatureA", "kind": "bool"},
                    {"name": "x\u{fffd}", "kind": "bool"},
                    {"name": "Threshold", "kind": "int"}
                ]
            })
        );
    }
}
