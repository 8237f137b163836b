//! Runtime settings consumed by the parameter resolver.

use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: u64 = 30;
pub const DEFAULT_POPULATE_LIMIT: u64 = 30;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintConfig {
    /// Page size when the caller gives no `limit`.
    #[serde(default = "default_limit")]
    pub default_limit: u64,
    /// Populate every association unless the caller passes an allow-list.
    #[serde(default = "default_true")]
    pub populate: bool,
    /// Cap on records attached per populated plural association.
    #[serde(default = "default_populate_limit")]
    pub populate_limit: u64,
}

fn default_limit() -> u64 {
    DEFAULT_LIMIT
}

fn default_populate_limit() -> u64 {
    DEFAULT_POPULATE_LIMIT
}

fn default_true() -> bool {
    true
}

impl Default for BlueprintConfig {
    fn default() -> Self {
        BlueprintConfig {
            default_limit: DEFAULT_LIMIT,
            populate: true,
            populate_limit: DEFAULT_POPULATE_LIMIT,
        }
    }
}

impl BlueprintConfig {
    /// Read `BLUEPRINT_DEFAULT_LIMIT`, `BLUEPRINT_POPULATE`, `BLUEPRINT_POPULATE_LIMIT` (after loading `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = BlueprintConfig::default();
        BlueprintConfig {
            default_limit: parse_or("BLUEPRINT_DEFAULT_LIMIT", lookup("BLUEPRINT_DEFAULT_LIMIT"), defaults.default_limit),
            populate: parse_or("BLUEPRINT_POPULATE", lookup("BLUEPRINT_POPULATE"), defaults.populate),
            populate_limit: parse_or(
                "BLUEPRINT_POPULATE_LIMIT",
                lookup("BLUEPRINT_POPULATE_LIMIT"),
                defaults.populate_limit,
            ),
        }
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(s) => s.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("{}: cannot parse '{}', using default", key, s);
            default
        }),
    }
}
