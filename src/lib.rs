//! Blueprint SDK: generic find/create/update/destroy/add/remove actions over configured models,
//! keeping bidirectional relation pointers consistent on every write.

pub mod config;
pub mod context;
pub mod error;
pub mod params;
pub mod registry;
pub mod service;
pub mod store;

pub use config::{load_from_dir, resolve, BlueprintConfig, Model, ModelDefinition, Nature};
pub use context::{Pagination, RequestContext, RouteOptions};
pub use error::{BlueprintError, ConfigError, StoreError};
pub use registry::{ModelHandle, ModelRegistry};
pub use service::{AttributeValidator, Blueprint, UnitOfWork};
pub use store::{MemoryStore, Record, Store};
