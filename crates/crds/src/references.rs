//! Kubernetes object references shared by the metal CRDs
//!
//! Mirrors the core/v1 `LocalObjectReference`, `TypedLocalObjectReference` and
//! meta/v1 `LabelSelector` shapes, with schemas so they can be embedded in
//! `CustomResource` specs.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reference to an object in the same namespace, by name only.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    /// Name of the referenced object
    #[serde(default)]
    pub name: String,
}

impl LocalObjectReference {
    /// Create a reference to `name`
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// An empty name means the reference is not set yet
    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}

/// Kubernetes `TypedLocalObjectReference`
///
/// - `apiGroup`: API group of the referenced resource (absent for the core group)
/// - `kind`: kind of the referenced resource (e.g. "GlobalInClusterIPPool")
/// - `name`: name of the referenced resource
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TypedLocalObjectReference {
    /// API group of the referenced resource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,

    /// Kind of the referenced resource
    pub kind: String,

    /// Name of the referenced resource
    pub name: String,
}

impl TypedLocalObjectReference {
    /// Create a new reference with apiGroup, kind, and name
    pub fn new(api_group: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_group: Some(api_group.into()),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Label selector restricted to `matchLabels`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Labels a selected object must carry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub match_labels: BTreeMap<String, String>,
}
