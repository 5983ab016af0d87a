// NETEXP: Perturbation-Driven Multipath Experiments in Emulated Network Topologies
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! Experiment parameters: a schema of defaults per experiment type, overridden by the experiment
//! parameter file.
//!
//! Every key an experiment reads is declared in a schema of [`ParamSpec`] entries. The declared
//! type of a key is the type of its default. Overrides arrive as raw strings and are coerced to the
//! declared type once, when the schema is registered. Reads never coerce: asking for an integer
//! key as a string (or vice versa) is an error.

use std::{
    collections::{BTreeMap, HashMap},
    fmt,
    path::Path,
};

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParameterError {
    #[error("Parameter `{0}` has neither a default nor an override")]
    MissingKey(String),
    #[error("Parameter `{key}` expects a value of type {expected}, but got `{value}`")]
    InvalidValue {
        key: String,
        value: String,
        expected: ParamType,
    },
    #[error("Parameter `{key}` has type {found}, but was read as {requested}")]
    TypeMismatch {
        key: String,
        found: ParamType,
        requested: ParamType,
    },
    #[error("Cannot parse line {line} of the parameter file: `{content}`")]
    Parse { line: usize, content: String },
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum ParamType {
    #[strum(serialize = "string")]
    Str,
    #[strum(serialize = "integer")]
    Int,
}

/// A resolved parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(u64),
}

impl ParamValue {
    pub fn ty(&self) -> ParamType {
        match self {
            Self::Str(_) => ParamType::Str,
            Self::Int(_) => ParamType::Int,
        }
    }

    /// Coerce a raw configuration string into a value of the given type.
    fn coerce(key: &str, raw: &str, ty: ParamType) -> Result<Self, ParameterError> {
        match ty {
            ParamType::Str => Ok(Self::Str(raw.to_string())),
            ParamType::Int => raw
                .trim()
                .parse()
                .map(Self::Int)
                .map_err(|_| ParameterError::InvalidValue {
                    key: key.to_string(),
                    value: raw.to_string(),
                    expected: ty,
                }),
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => f.write_str(s),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// Default value of a parameter, as it appears in a static schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    Str(&'static str),
    Int(u64),
}

impl ParamDefault {
    pub fn ty(&self) -> ParamType {
        match self {
            Self::Str(_) => ParamType::Str,
            Self::Int(_) => ParamType::Int,
        }
    }

    fn value(&self) -> ParamValue {
        match self {
            Self::Str(s) => ParamValue::Str(s.to_string()),
            Self::Int(i) => ParamValue::Int(*i),
        }
    }
}

/// One schema entry: a key together with its default (which also fixes its type).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub key: &'static str,
    pub default: ParamDefault,
}

impl ParamSpec {
    pub const fn str(key: &'static str, default: &'static str) -> Self {
        Self {
            key,
            default: ParamDefault::Str(default),
        }
    }

    pub const fn int(key: &'static str, default: u64) -> Self {
        Self {
            key,
            default: ParamDefault::Int(default),
        }
    }
}

/// Raw overrides read from the experiment parameter file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides(HashMap<String, String>);

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the overrides from a parameter file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ParameterError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse `key:value` lines. Empty lines and lines starting with `#` are skipped. The first
    /// `:` separates the key from the value. Later lines replace earlier ones with the same key.
    pub fn parse(content: &str) -> Result<Self, ParameterError> {
        let mut overrides = Self::new();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(ParameterError::Parse {
                    line: i + 1,
                    content: line.to_string(),
                });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ParameterError::Parse {
                    line: i + 1,
                    content: line.to_string(),
                });
            }
            overrides.insert(key, value.trim());
        }
        Ok(overrides)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Parameters of one experiment: registered defaults plus the typed overrides.
#[derive(Debug, Clone, Default)]
pub struct ParameterStore {
    defaults: HashMap<String, ParamValue>,
    overrides: HashMap<String, ParamValue>,
}

impl ParameterStore {
    /// Create a store with the given overrides and no registered defaults. Until a key is
    /// registered, its override is kept as a string.
    pub fn new(overrides: &Overrides) -> Self {
        Self {
            defaults: HashMap::new(),
            overrides: overrides
                .0
                .iter()
                .map(|(k, v)| (k.clone(), ParamValue::Str(v.clone())))
                .collect(),
        }
    }

    /// Merge the defaults of a schema. The first registration of a key determines its default
    /// and type; later registrations of the same key are ignored. Overrides of newly registered
    /// keys are coerced to the declared type.
    pub fn register_defaults(&mut self, schema: &[ParamSpec]) -> Result<(), ParameterError> {
        for spec in schema {
            if self.defaults.contains_key(spec.key) {
                log::trace!("Parameter {} is already registered, keep the first one", spec.key);
                continue;
            }
            let coerced = match self.overrides.get(spec.key) {
                Some(ParamValue::Str(raw)) => {
                    Some(ParamValue::coerce(spec.key, raw, spec.default.ty())?)
                }
                _ => None,
            };
            if let Some(value) = coerced {
                self.overrides.insert(spec.key.to_string(), value);
            }
            self.defaults.insert(spec.key.to_string(), spec.default.value());
        }
        Ok(())
    }

    /// Read a parameter: the override if present, otherwise the registered default.
    pub fn get(&self, key: &str) -> Result<&ParamValue, ParameterError> {
        self.overrides
            .get(key)
            .or_else(|| self.defaults.get(key))
            .ok_or_else(|| ParameterError::MissingKey(key.to_string()))
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ParameterError> {
        match self.get(key)? {
            ParamValue::Str(s) => Ok(s),
            v => Err(ParameterError::TypeMismatch {
                key: key.to_string(),
                found: v.ty(),
                requested: ParamType::Str,
            }),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<u64, ParameterError> {
        match self.get(key)? {
            ParamValue::Int(i) => Ok(*i),
            v => Err(ParameterError::TypeMismatch {
                key: key.to_string(),
                found: v.ty(),
                requested: ParamType::Int,
            }),
        }
    }

    /// Whether the key was overridden by the configuration.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Keys that were overridden, but never declared by any registered schema.
    pub fn undeclared(&self) -> impl Iterator<Item = &str> {
        self.overrides
            .keys()
            .filter(|k| !self.defaults.contains_key(*k))
            .map(String::as_str)
    }

    /// All currently readable parameters, sorted by key.
    pub fn resolved(&self) -> BTreeMap<&str, &ParamValue> {
        self.defaults
            .iter()
            .chain(self.overrides.iter())
            .map(|(k, v)| (k.as_str(), v))
            .collect()
    }
}

/// Resolve a schema against a set of overrides.
pub fn resolve(
    schema: &[ParamSpec],
    overrides: &Overrides,
) -> Result<ParameterStore, ParameterError> {
    let mut store = ParameterStore::new(overrides);
    store.register_defaults(schema)?;
    for key in store.undeclared() {
        log::debug!("Parameter {key} is not used by this experiment");
    }
    Ok(store)
}

#[cfg(test)]
mod test {
    use super::*;

    const SCHEMA: &[ParamSpec] = &[
        ParamSpec::str("failover", "on"),
        ParamSpec::int("interval", 5),
        ParamSpec::str("goodputFile", "none"),
    ];

    #[test]
    fn test_default_and_override() {
        let mut overrides = Overrides::new();
        overrides.insert("goodputFile", "/tmp/goodput");
        let store = resolve(SCHEMA, &overrides).unwrap();

        assert_eq!(store.get_str("failover").unwrap(), "on");
        assert_eq!(store.get_int("interval").unwrap(), 5);
        assert_eq!(store.get_str("goodputFile").unwrap(), "/tmp/goodput");
        assert!(store.is_overridden("goodputFile"));
        assert!(!store.is_overridden("failover"));
    }

    #[test]
    fn test_int_override_is_coerced_once() {
        let overrides = Overrides::parse("interval: 10\n").unwrap();
        let store = resolve(SCHEMA, &overrides).unwrap();
        assert_eq!(store.get("interval").unwrap(), &ParamValue::Int(10));
        assert!(matches!(
            store.get_str("interval"),
            Err(ParameterError::TypeMismatch {
                found: ParamType::Int,
                requested: ParamType::Str,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_int_override() {
        let overrides = Overrides::parse("interval:five").unwrap();
        assert!(matches!(
            resolve(SCHEMA, &overrides),
            Err(ParameterError::InvalidValue { expected: ParamType::Int, .. })
        ));
    }

    #[test]
    fn test_missing_key() {
        let store = resolve(SCHEMA, &Overrides::new()).unwrap();
        assert!(matches!(
            store.get("perturbationType"),
            Err(ParameterError::MissingKey(k)) if k == "perturbationType"
        ));
    }

    #[test]
    fn test_first_registration_wins() {
        let mut store = ParameterStore::new(&Overrides::new());
        store.register_defaults(&[ParamSpec::int("pingCount", 5)]).unwrap();
        store
            .register_defaults(&[ParamSpec::str("pingCount", "ten")])
            .unwrap();
        assert_eq!(store.get_int("pingCount").unwrap(), 5);
    }

    #[test]
    fn test_undeclared_override_is_a_string() {
        let overrides = Overrides::parse("xpType:tcpls\ninterval:3").unwrap();
        let store = resolve(SCHEMA, &overrides).unwrap();
        assert_eq!(store.get_str("xpType").unwrap(), "tcpls");
        assert_eq!(store.undeclared().collect::<Vec<_>>(), vec!["xpType"]);
    }

    #[test]
    fn test_parse_file_format() {
        let content = "# comment\n\nxpType:tcpls\n  interval : 7 \ngoodputFile:/tmp/a:b\ninterval:8\n";
        let overrides = Overrides::parse(content).unwrap();
        assert_eq!(overrides.len(), 3);
        assert_eq!(overrides.get("xpType"), Some("tcpls"));
        assert_eq!(overrides.get("interval"), Some("8"));
        assert_eq!(overrides.get("goodputFile"), Some("/tmp/a:b"));

        assert!(matches!(
            Overrides::parse("xpType:tcpls\nbroken line"),
            Err(ParameterError::Parse { line: 2, .. })
        ));
        assert!(matches!(
            Overrides::parse(":value"),
            Err(ParameterError::Parse { line: 1, .. })
        ));
    }
}
