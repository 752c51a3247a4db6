use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use vmbridge_contracts::{FLAG_KIND_BOOL, FLAG_KIND_INT};

use crate::snapshot::{FlagEntry, FlagSnapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FlagKind {
    Bool,
    Int,
}

impl FlagKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FlagKind::Bool => "bool",
            FlagKind::Int => "int",
        }
    }

    pub fn tag(self) -> i32 {
        match self {
            FlagKind::Bool => FLAG_KIND_BOOL,
            FlagKind::Int => FLAG_KIND_INT,
        }
    }

    pub fn from_tag(tag: i32) -> Option<Self> {
        match tag {
            FLAG_KIND_BOOL => Some(FlagKind::Bool),
            FLAG_KIND_INT => Some(FlagKind::Int),
            _ => None,
        }
    }
}

impl fmt::Display for FlagKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct FlagKindParseError {
    value: String,
}

impl fmt::Display for FlagKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid flag kind {:?} (expected one of: bool, int)",
            self.value
        )
    }
}

impl std::error::Error for FlagKindParseError {}

impl FromStr for FlagKind {
    type Err = FlagKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "bool" => Ok(FlagKind::Bool),
            "int" => Ok(FlagKind::Int),
            other => Err(FlagKindParseError {
                value: other.to_string(),
            }),
        }
    }
}

/// One row of the runtime's fixed flag table. Names are raw bytes; they are
/// usually ASCII but nothing requires it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlagDef {
    Bool { name: Vec<u8>, default: bool },
    Int { name: Vec<u8>, default: i32 },
}

impl FlagDef {
    pub fn bool(name: impl Into<Vec<u8>>, default: bool) -> Self {
        FlagDef::Bool {
            name: name.into(),
            default,
        }
    }

    pub fn int(name: impl Into<Vec<u8>>, default: i32) -> Self {
        FlagDef::Int {
            name: name.into(),
            default,
        }
    }

    pub fn name(&self) -> &[u8] {
        match self {
            FlagDef::Bool { name, .. } | FlagDef::Int { name, .. } => name,
        }
    }

    pub fn kind(&self) -> FlagKind {
        match self {
            FlagDef::Bool { .. } => FlagKind::Bool,
            FlagDef::Int { .. } => FlagKind::Int,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    EmptyName(FlagKind),
    InvalidName { kind: FlagKind, name: String },
    Duplicate { kind: FlagKind, name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::EmptyName(kind) => write!(f, "{kind} flag registered with empty name"),
            RegistryError::InvalidName { kind, name } => {
                write!(f, "{kind} flag name {name:?} contains a NUL byte")
            }
            RegistryError::Duplicate { kind, name } => {
                write!(f, "{kind} flag {name:?} registered twice")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for bool {}
    impl Sealed for i32 {}
}

/// Value types a flag can hold. Each selects its own map, so lookups never
/// cross kinds.
pub trait FlagValue: sealed::Sealed + Copy + fmt::Debug {
    const KIND: FlagKind;

    #[doc(hidden)]
    fn values(reg: &FlagRegistry) -> &BTreeMap<Vec<u8>, Self>;
    #[doc(hidden)]
    fn values_mut(reg: &mut FlagRegistry) -> &mut BTreeMap<Vec<u8>, Self>;
}

impl FlagValue for bool {
    const KIND: FlagKind = FlagKind::Bool;

    fn values(reg: &FlagRegistry) -> &BTreeMap<Vec<u8>, Self> {
        &reg.bools
    }

    fn values_mut(reg: &mut FlagRegistry) -> &mut BTreeMap<Vec<u8>, Self> {
        &mut reg.bools
    }
}

impl FlagValue for i32 {
    const KIND: FlagKind = FlagKind::Int;

    fn values(reg: &FlagRegistry) -> &BTreeMap<Vec<u8>, Self> {
        &reg.ints
    }

    fn values_mut(reg: &mut FlagRegistry) -> &mut BTreeMap<Vec<u8>, Self> {
        &mut reg.ints
    }
}

/// Typed runtime tuning flags, one ordered map per kind.
///
/// The set of names is fixed when the registry is built. Accessors only read
/// or overwrite existing entries.
#[derive(Debug, Clone, Default)]
pub struct FlagRegistry {
    bools: BTreeMap<Vec<u8>, bool>,
    ints: BTreeMap<Vec<u8>, i32>,
    defaults: Vec<FlagDef>,
}

impl FlagRegistry {
    pub fn from_defs<I>(defs: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = FlagDef>,
    {
        let mut reg = FlagRegistry::default();
        for def in defs {
            let kind = def.kind();
            let name = def.name();
            if name.is_empty() {
                return Err(RegistryError::EmptyName(kind));
            }
            if name.contains(&0) {
                return Err(RegistryError::InvalidName {
                    kind,
                    name: lossy(name).into_owned(),
                });
            }
            let fresh = match &def {
                FlagDef::Bool { name, default } => {
                    reg.bools.insert(name.clone(), *default).is_none()
                }
                FlagDef::Int { name, default } => reg.ints.insert(name.clone(), *default).is_none(),
            };
            if !fresh {
                return Err(RegistryError::Duplicate {
                    kind,
                    name: lossy(name).into_owned(),
                });
            }
            reg.defaults.push(def);
        }
        Ok(reg)
    }

    pub fn len(&self) -> usize {
        self.bools.len() + self.ints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count(&self, kind: FlagKind) -> usize {
        match kind {
            FlagKind::Bool => self.bools.len(),
            FlagKind::Int => self.ints.len(),
        }
    }

    pub fn get<T: FlagValue>(&self, name: &[u8]) -> Option<T> {
        T::values(self).get(name).copied()
    }

    /// Overwrite an existing flag. Returns false, touching nothing, when no
    /// flag of kind `T` has this exact name.
    pub fn set<T: FlagValue>(&mut self, name: &[u8], value: T) -> bool {
        match T::values_mut(self).get_mut(name) {
            Some(slot) => {
                let kind = T::KIND;
                tracing::debug!(%kind, name = %lossy(name), ?value, "flag set");
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn reset_to_defaults(&mut self) {
        for def in &self.defaults {
            match def {
                FlagDef::Bool { name, default } => {
                    self.bools.insert(name.clone(), *default);
                }
                FlagDef::Int { name, default } => {
                    self.ints.insert(name.clone(), *default);
                }
            }
        }
    }

    /// Booleans first, then integers; each kind in ascending byte order of
    /// name.
    pub fn snapshot(&self) -> FlagSnapshot {
        let bools = self.bools.keys().map(|name| FlagEntry {
            name: name.clone(),
            kind: FlagKind::Bool,
        });
        let ints = self.ints.keys().map(|name| FlagEntry {
            name: name.clone(),
            kind: FlagKind::Int,
        });
        FlagSnapshot::new(bools.chain(ints).collect())
    }
}

pub(crate) fn lossy(name: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(name)
}
