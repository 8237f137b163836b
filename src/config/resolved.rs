//! Resolved model: definitions validated and flattened for runtime use.

use crate::config::{AttributeRule, Nature};
use crate::error::BlueprintError;
use regex::Regex;
use serde_json::Value;

/// Primary key type for coercing identifiers that arrive as route strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PkType {
    Int,
    Text,
    Uuid,
}

impl PkType {
    pub fn coerce(self, id: &Value) -> Result<Value, BlueprintError> {
        Ok(match (self, id) {
            (PkType::Int, Value::Number(n)) if n.is_i64() || n.is_u64() => id.clone(),
            (PkType::Int, Value::String(s)) => {
                let n: i64 = s
                    .trim()
                    .parse()
                    .map_err(|_| BlueprintError::InvalidParameter(format!("invalid id '{}'", s)))?;
                Value::Number(n.into())
            }
            (PkType::Uuid, Value::String(s)) => {
                let u = uuid::Uuid::parse_str(s)
                    .map_err(|_| BlueprintError::InvalidParameter(format!("invalid uuid '{}'", s)))?;
                Value::String(u.to_string())
            }
            (PkType::Text, Value::String(_)) => id.clone(),
            (PkType::Text, Value::Number(n)) => Value::String(n.to_string()),
            _ => {
                return Err(BlueprintError::InvalidParameter(format!(
                    "invalid id {}",
                    id
                )))
            }
        })
    }
}

#[derive(Clone, Debug)]
pub struct Attribute {
    pub name: String,
    pub rule: AttributeRule,
    /// Compiled `rule.pattern`.
    pub pattern: Option<Regex>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Association {
    pub alias: String,
    pub nature: Nature,
    /// Target model name.
    pub target: String,
    /// Inverse field on the target model.
    pub via: Option<String>,
    pub required: bool,
}

#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    pub primary_key: String,
    pub pk_type: PkType,
    pub attributes: Vec<Attribute>,
    /// In declaration order.
    pub associations: Vec<Association>,
}

impl Model {
    pub fn association(&self, alias: &str) -> Option<&Association> {
        self.associations.iter().find(|a| a.alias == alias)
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerces_route_strings_to_pk_type() {
        assert_eq!(PkType::Int.coerce(&json!("42")).unwrap(), json!(42));
        assert_eq!(PkType::Int.coerce(&json!(42)).unwrap(), json!(42));
        assert_eq!(PkType::Text.coerce(&json!(7)).unwrap(), json!("7"));
        assert!(matches!(
            PkType::Int.coerce(&json!("abc")),
            Err(BlueprintError::InvalidParameter(_))
        ));
        assert!(PkType::Uuid.coerce(&json!("not-a-uuid")).is_err());
        let u = uuid::Uuid::new_v4().to_string();
        assert_eq!(PkType::Uuid.coerce(&json!(u.clone())).unwrap(), json!(u));
    }
}
