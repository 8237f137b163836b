//! Attribute validation from model rules.

use crate::config::{Attribute, Model};
use crate::error::BlueprintError;
use crate::store::Record;
use serde_json::Value;

pub struct AttributeValidator;

impl AttributeValidator {
    /// Validate a full payload. All required attributes must be present and non-null.
    pub fn validate(values: &Record, model: &Model) -> Result<(), BlueprintError> {
        for attr in &model.attributes {
            let val = values.get(&attr.name);
            if attr.rule.required == Some(true) && val.map_or(true, Value::is_null) {
                return Err(BlueprintError::Validation(format!("{} is required", attr.name)));
            }
            if let Some(v) = val {
                validate_field(attr, v)?;
            }
        }
        Ok(())
    }

    /// Validate only the fields present in `values` (for updates). A required attribute may not be set to null.
    pub fn validate_partial(values: &Record, model: &Model) -> Result<(), BlueprintError> {
        for (name, v) in values {
            if let Some(attr) = model.attribute(name) {
                if attr.rule.required == Some(true) && v.is_null() {
                    return Err(BlueprintError::Validation(format!("{} is required", name)));
                }
                validate_field(attr, v)?;
            }
        }
        Ok(())
    }
}

fn validate_field(attr: &Attribute, v: &Value) -> Result<(), BlueprintError> {
    if v.is_null() {
        return Ok(());
    }
    let name = attr.name.as_str();
    let rule = &attr.rule;
    if let Some(format) = &rule.format {
        validate_format(name, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(BlueprintError::Validation(format!("{} must be at most {} characters", name, max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(BlueprintError::Validation(format!("{} must be at least {} characters", name, min)));
            }
        }
        if let Some(re) = &attr.pattern {
            if !re.is_match(s) {
                return Err(BlueprintError::Validation(format!("{} does not match required pattern", name)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(BlueprintError::Validation(format!(
                "{} must be one of: {:?}",
                name,
                allowed.iter().take(5).collect::<Vec<_>>()
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum {
            if n < min {
                return Err(BlueprintError::Validation(format!("{} must be at least {}", name, min)));
            }
        }
        if let Some(max) = rule.maximum {
            if n > max {
                return Err(BlueprintError::Validation(format!("{} must be at most {}", name, max)));
            }
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(name: &str, v: &Value, format: &str) -> Result<(), BlueprintError> {
    let Some(s) = v.as_str() else {
        return Ok(());
    };
    match format.to_lowercase().as_str() {
        "email" => {
            let valid = s
                .split_once('@')
                .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
            if !valid {
                return Err(BlueprintError::Validation(format!("{} must be a valid email", name)));
            }
        }
        "uuid" => {
            if uuid::Uuid::parse_str(s).is_err() {
                return Err(BlueprintError::Validation(format!("{} must be a valid UUID", name)));
            }
        }
        other => tracing::debug!(format = other, "unknown attribute format, not checked"),
    }
    Ok(())
}
