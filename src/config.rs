//! Container configuration.
//!
//! Values come from three places, lowest priority first: [`Default`],
//! environment variables ([`ContainerConfig::from_env`]) and, with the
//! `config` feature, JSON documents ([`ContainerConfig::from_json_str`]).

use std::env;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::container::MAX_DEPTH;

/// Prefix of the environment variables read by [`ContainerConfig::from_env`].
pub const ENV_PREFIX: &str = "FERROUS_SERVICES";

/// Settings for a [`Container`](crate::Container).
///
/// # Examples
///
/// ```rust
/// use ferrous_services::{Container, ContainerConfig};
///
/// let config = ContainerConfig {
///     max_depth: 64,
///     eager_singletons: true,
/// };
/// let container = Container::with_config(config);
/// assert_eq!(container.config().max_depth, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct ContainerConfig {
    /// Deepest dependency chain a single resolve may walk.
    pub max_depth: usize,
    /// Instantiate every singleton right after [`Container::discover`](crate::Container::discover).
    pub eager_singletons: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            max_depth: MAX_DEPTH,
            eager_singletons: false,
        }
    }
}

impl ContainerConfig {
    /// Defaults overridden by `FERROUS_SERVICES_MAX_DEPTH` and
    /// `FERROUS_SERVICES_EAGER_SINGLETONS`.
    ///
    /// Values that fail to parse are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable prefix.
    pub fn from_env_with_prefix(prefix: &str) -> Self {
        let mut config = Self::default();
        let prefix = prefix.to_uppercase();

        if let Some(depth) = read_var(&prefix, "MAX_DEPTH", |v| v.parse::<usize>().ok()) {
            config.max_depth = depth;
        }
        if let Some(eager) = read_var(&prefix, "EAGER_SINGLETONS", parse_bool) {
            config.eager_singletons = eager;
        }

        config
    }

    /// Parses a JSON document; missing fields keep their defaults.
    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

fn read_var<T>(prefix: &str, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let name = format!("{}_{}", prefix, key);
    let raw = env::var(&name).ok()?;
    let parsed = parse(raw.trim());
    if parsed.is_none() {
        tracing::warn!(variable = %name, value = %raw, "Ignoring unparseable configuration value");
    }
    parsed
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
