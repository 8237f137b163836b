//! Raw model definition types matching the JSON definition files.

use serde::{Deserialize, Serialize};

/// Cardinality and direction of an association.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Nature {
    OneWay,
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Nature {
    /// The relation field holds at most one identifier.
    pub fn is_singular(self) -> bool {
        matches!(self, Nature::OneWay | Nature::OneToOne | Nature::ManyToOne)
    }

    pub fn is_plural(self) -> bool {
        !self.is_singular()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PkTypeConfig {
    #[default]
    Int,
    Text,
    Uuid,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AttributeRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub name: String,
    #[serde(flatten)]
    pub rule: AttributeRule,
}

/// One relation field. Exactly one of `model` (singular) or `collection` (plural) is set.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AssociationDefinition {
    pub alias: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub collection: Option<String>,
    /// Inverse field on the target model.
    #[serde(default)]
    pub via: Option<String>,
    /// Explicit nature; inferred from `model`/`collection`/`via` when absent.
    #[serde(default)]
    pub nature: Option<Nature>,
    #[serde(default)]
    pub required: bool,
}

impl AssociationDefinition {
    pub fn target(&self) -> Option<&str> {
        self.model.as_deref().or(self.collection.as_deref())
    }

    pub fn declares_singular(&self) -> bool {
        self.model.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDefinition {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub primary_key_type: PkTypeConfig,
    #[serde(default)]
    pub attributes: Vec<AttributeDefinition>,
    #[serde(default)]
    pub associations: Vec<AssociationDefinition>,
}

fn default_primary_key() -> String {
    "id".into()
}
