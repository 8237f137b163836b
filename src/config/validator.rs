//! Definition validation: referential integrity between models and associations.

use crate::config::{AssociationDefinition, ModelDefinition};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(definitions: &[ModelDefinition]) -> Result<(), ConfigError> {
    if definitions.is_empty() {
        return Err(ConfigError::Validation("at least one model definition required".into()));
    }

    let mut by_name: HashMap<&str, &ModelDefinition> = HashMap::new();
    for def in definitions {
        if by_name.insert(def.name.as_str(), def).is_some() {
            return Err(ConfigError::DuplicateModel(def.name.clone()));
        }
    }

    for def in definitions {
        if def.primary_key.is_empty() {
            return Err(ConfigError::Validation(format!("model {} has an empty primary key", def.name)));
        }
        let mut aliases = HashSet::new();
        for assoc in &def.associations {
            if !aliases.insert(assoc.alias.as_str()) || assoc.alias == def.primary_key {
                return Err(ConfigError::DuplicateAlias {
                    model: def.name.clone(),
                    alias: assoc.alias.clone(),
                });
            }
            validate_association(def, assoc, &by_name)?;
        }
        for attr in &def.attributes {
            if let Some(pattern) = &attr.rule.pattern {
                regex::Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    model: def.name.clone(),
                    attribute: attr.name.clone(),
                    source,
                })?;
            }
        }
    }

    Ok(())
}

fn validate_association(
    def: &ModelDefinition,
    assoc: &AssociationDefinition,
    by_name: &HashMap<&str, &ModelDefinition>,
) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAssociation {
        model: def.name.clone(),
        alias: assoc.alias.clone(),
        reason: reason.to_string(),
    };

    let target_name = match (&assoc.model, &assoc.collection) {
        (Some(m), None) => m.as_str(),
        (None, Some(c)) => c.as_str(),
        _ => return Err(invalid("exactly one of 'model' or 'collection' is required")),
    };
    let target = by_name
        .get(target_name)
        .ok_or_else(|| ConfigError::MissingReference {
            kind: "model",
            id: target_name.to_string(),
        })?;

    if let Some(nature) = assoc.nature {
        if nature.is_singular() != assoc.declares_singular() {
            return Err(invalid("nature does not match 'model'/'collection'"));
        }
    }

    if let Some(via) = &assoc.via {
        let inverse = target
            .associations
            .iter()
            .find(|a| &a.alias == via)
            .ok_or_else(|| invalid(&format!("via '{}' is not an association on {}", via, target.name)))?;
        if inverse.target() != Some(def.name.as_str()) {
            return Err(invalid(&format!("{}.{} does not point back to {}", target.name, via, def.name)));
        }
    }

    Ok(())
}
