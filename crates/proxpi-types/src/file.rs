use std::collections::HashMap;

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// A tri-state attribute value as used by `yanked` and `core-metadata` in the
/// simple-repository protocol: the attribute may be absent, present as a bare
/// boolean marker, or carry a concrete value.
///
/// Replaces the dynamic "is it a bool or a dict or a string" coercion of the
/// source protocol with an explicit, matchable type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaValue<T> {
    Absent,
    Bare,
    WithValue(T),
}

impl<T> MetaValue<T> {
    pub fn is_present(&self) -> bool {
        !matches!(self, MetaValue::Absent)
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, MetaValue::Absent)
    }

    pub fn as_value(&self) -> Option<&T> {
        match self {
            MetaValue::WithValue(v) => Some(v),
            _ => None,
        }
    }
}

impl<T> Default for MetaValue<T> {
    fn default() -> Self {
        MetaValue::Absent
    }
}

// Serialized as `null` (absent), `true` (bare marker), or the inner value --
// unambiguous, unlike the untagged-enum derive which can't tell two unit
// variants apart.
impl<T: Serialize> Serialize for MetaValue<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetaValue::Absent => serializer.serialize_none(),
            MetaValue::Bare => serializer.serialize_bool(true),
            MetaValue::WithValue(v) => v.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for MetaValue<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Null => MetaValue::Absent,
            // The simple-repository JSON API uses an explicit `false` for
            // "not yanked", same meaning as the field being absent.
            serde_json::Value::Bool(false) => MetaValue::Absent,
            serde_json::Value::Bool(true) => MetaValue::Bare,
            other => {
                let inner = serde_json::from_value(other).map_err(D::Error::custom)?;
                MetaValue::WithValue(inner)
            }
        })
    }
}

/// A single downloadable artifact belonging to a project, as listed by an
/// upstream simple-repository index.
///
/// Files are immutable once produced by a parser: a project's file list is
/// never mutated in place, only replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    /// File name, unique within its owning project.
    #[serde(rename = "filename")]
    pub name: String,
    /// Absolute upstream URL this file was served from.
    pub url: Url,
    /// Algorithm -> hex digest, e.g. `{"sha256": "abc123..."}`.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub hashes: HashMap<String, String>,
    /// PEP 440 version specifier constraining the interpreter version.
    #[serde(default, rename = "requires-python", skip_serializing_if = "Option::is_none")]
    pub requires_python: Option<String>,
    /// Yanked marker: absent, bare-true, or a reason string (possibly empty).
    #[serde(default, skip_serializing_if = "MetaValue::is_absent")]
    pub yanked: MetaValue<String>,
    /// Core metadata marker: absent, bare-true, or a hash map of the same
    /// shape as `hashes` describing the metadata file's own digests.
    /// `dist-info-metadata` is accepted as a legacy parse-time alias and
    /// never surfaces as a separate field.
    #[serde(
        default,
        rename = "core-metadata",
        skip_serializing_if = "MetaValue::is_absent"
    )]
    pub core_metadata: MetaValue<HashMap<String, String>>,
}

impl File {
    pub fn new(name: impl Into<String>, url: Url) -> Self {
        Self {
            name: name.into(),
            url,
            hashes: HashMap::new(),
            requires_python: None,
            yanked: MetaValue::Absent,
            core_metadata: MetaValue::Absent,
        }
    }
}
