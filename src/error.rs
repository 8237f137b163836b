//! Typed errors and status mapping.

use serde_json::Value;
use thiserror::Error;

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;
pub const STATUS_INTERNAL: u16 = 500;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("duplicate model: {0}")]
    DuplicateModel(String),
    #[error("duplicate alias '{alias}' on model {model}")]
    DuplicateAlias { model: String, alias: String },
    #[error("invalid association {model}.{alias}: {reason}")]
    InvalidAssociation {
        model: String,
        alias: String,
        reason: String,
    },
    #[error("invalid pattern for {model}.{attribute}: {source}")]
    InvalidPattern {
        model: String,
        attribute: String,
        #[source]
        source: regex::Error,
    },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Failures reported by a [`Store`](crate::store::Store) implementation.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("backend: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum BlueprintError {
    #[error("model resolution: {0}")]
    ModelResolution(String),
    #[error("missing route option: {0}")]
    MissingRouteOption(String),
    #[error("missing primary key: {0}")]
    MissingPrimaryKey(String),
    #[error("missing child identifier: {0}")]
    MissingChildIdentifier(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("store: {0}")]
    InternalStore(#[from] StoreError),
    /// The primary write committed but relation cleanup did not finish.
    #[error("integrity maintenance failed after commit: {source}")]
    IntegrityDegraded {
        committed: Value,
        #[source]
        source: Box<BlueprintError>,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BlueprintError {
    pub fn status(&self) -> u16 {
        match self {
            BlueprintError::MissingPrimaryKey(_)
            | BlueprintError::MissingChildIdentifier(_)
            | BlueprintError::InvalidParameter(_)
            | BlueprintError::Validation(_) => STATUS_BAD_REQUEST,
            BlueprintError::NotFound(_) => STATUS_NOT_FOUND,
            BlueprintError::ModelResolution(_)
            | BlueprintError::MissingRouteOption(_)
            | BlueprintError::InternalStore(_)
            | BlueprintError::IntegrityDegraded { .. }
            | BlueprintError::Config(_) => STATUS_INTERNAL,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            BlueprintError::ModelResolution(_) => "model_resolution",
            BlueprintError::MissingRouteOption(_) => "missing_route_option",
            BlueprintError::MissingPrimaryKey(_) => "missing_primary_key",
            BlueprintError::MissingChildIdentifier(_) => "missing_child_identifier",
            BlueprintError::InvalidParameter(_) => "invalid_parameter",
            BlueprintError::Validation(_) => "validation_error",
            BlueprintError::NotFound(_) => "not_found",
            BlueprintError::InternalStore(_) => "store_error",
            BlueprintError::IntegrityDegraded { .. } => "integrity_degraded",
            BlueprintError::Config(_) => "config_error",
        }
    }

    /// Error envelope a routing layer can serialize as-is.
    pub fn to_body(&self) -> Value {
        let details = match self {
            BlueprintError::IntegrityDegraded { committed, .. } => Some(committed.clone()),
            _ => None,
        };
        serde_json::json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
                "details": details
            }
        })
    }
}
