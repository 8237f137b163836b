//! Resolve model definitions into runtime models, or load them from a directory of JSON files.

use crate::config::resolved::{Association, Attribute, Model, PkType};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;

/// Build resolved models from definitions (validates first).
pub fn resolve(definitions: &[ModelDefinition]) -> Result<Vec<Model>, ConfigError> {
    validate(definitions)?;
    let by_name: HashMap<&str, &ModelDefinition> =
        definitions.iter().map(|d| (d.name.as_str(), d)).collect();

    let mut models = Vec::with_capacity(definitions.len());
    for def in definitions {
        let associations = def
            .associations
            .iter()
            .map(|assoc| {
                // validate() guarantees the target exists.
                let target = assoc.target().unwrap_or_default();
                let nature = assoc
                    .nature
                    .unwrap_or_else(|| infer_nature(assoc, by_name.get(target).copied()));
                Association {
                    alias: assoc.alias.clone(),
                    nature,
                    target: target.to_string(),
                    via: assoc.via.clone(),
                    required: assoc.required,
                }
            })
            .collect();

        let mut attributes = Vec::with_capacity(def.attributes.len());
        for attr in &def.attributes {
            let pattern = attr
                .rule
                .pattern
                .as_deref()
                .map(regex::Regex::new)
                .transpose()
                .map_err(|source| ConfigError::InvalidPattern {
                    model: def.name.clone(),
                    attribute: attr.name.clone(),
                    source,
                })?;
            attributes.push(Attribute {
                name: attr.name.clone(),
                rule: attr.rule.clone(),
                pattern,
            });
        }

        models.push(Model {
            name: def.name.clone(),
            primary_key: def.primary_key.clone(),
            pk_type: match def.primary_key_type {
                PkTypeConfig::Int => PkType::Int,
                PkTypeConfig::Text => PkType::Text,
                PkTypeConfig::Uuid => PkType::Uuid,
            },
            attributes,
            associations,
        });
    }
    Ok(models)
}

fn infer_nature(assoc: &AssociationDefinition, target: Option<&ModelDefinition>) -> Nature {
    let inverse = assoc.via.as_deref().and_then(|via| {
        target.and_then(|t| t.associations.iter().find(|a| a.alias == via))
    });
    match (assoc.declares_singular(), inverse.map(AssociationDefinition::declares_singular)) {
        (true, None) => Nature::OneWay,
        (true, Some(true)) => Nature::OneToOne,
        (true, Some(false)) => Nature::ManyToOne,
        (false, Some(true)) => Nature::OneToMany,
        (false, _) => Nature::ManyToMany,
    }
}

/// Load every `*.json` file in `dir` (sorted by file name). A file holds one definition or an array of them.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<Vec<ModelDefinition>, ConfigError> {
    let dir = dir.as_ref();
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.display(), e)))?;

    let mut paths = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ConfigError::Load(e.to_string()))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        tracing::debug!(path = %path.display(), "loading model definitions");
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        let parsed = match value {
            serde_json::Value::Array(_) => serde_json::from_value::<Vec<ModelDefinition>>(value),
            other => serde_json::from_value::<ModelDefinition>(other).map(|d| vec![d]),
        }
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
        out.extend(parsed);
    }
    Ok(out)
}
