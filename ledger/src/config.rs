//! # Ledger Configuration & Constants
//!
//! Every magic number the host ledger relies on lives here, together with
//! [`HostConfig`], the small runtime configuration a [`crate::host::Host`]
//! is constructed from.
//!
//! `HostConfig` can be built three ways: `Default`, from a JSON document
//! ([`HostConfig::from_json`]), or from `SWAP_*` environment variables
//! ([`HostConfig::from_env`]). Unset variables fall back to the defaults.

use serde::{Deserialize, Serialize};

use crate::error::HostError;
use crate::logging::LogFormat;

// ---------------------------------------------------------------------------
// Native Currency
// ---------------------------------------------------------------------------

/// Ticker of the host's native currency.
pub const NATIVE_SYMBOL: &str = "ETH";

// ---------------------------------------------------------------------------
// Addresses
// ---------------------------------------------------------------------------

/// Prefix used when rendering and parsing addresses.
pub const ADDRESS_PREFIX: &str = "0x";

/// Domain separator for label-derived addresses.
pub const LABEL_ADDRESS_DOMAIN: &[u8] = b"swap-ledger/label/v1\x00";

/// Domain separator for contract addresses. Must differ from the label
/// domain so a label can never collide with a deployment.
pub const CONTRACT_ADDRESS_DOMAIN: &[u8] = b"swap-ledger/contract/v1\x00";

// ---------------------------------------------------------------------------
// Event Topics
// ---------------------------------------------------------------------------

/// Topic of token transfer records.
pub const TOPIC_TRANSFER: &str = "Transfer";

/// Topic of token approval records.
pub const TOPIC_APPROVAL: &str = "Approval";

// ---------------------------------------------------------------------------
// Networks
// ---------------------------------------------------------------------------

/// Network name used when nothing else is configured.
pub const DEFAULT_NETWORK: &str = "devnet";

/// Default `tracing` filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ---------------------------------------------------------------------------
// HostConfig
// ---------------------------------------------------------------------------

/// Runtime configuration of a [`crate::host::Host`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Free-form network name. Shows up in logs only.
    pub network: String,
    /// When `false`, token ledgers keep no `Transfer` / `Approval` records.
    /// Contract events are recorded regardless.
    pub record_token_events: bool,
    /// Default `tracing` filter when `RUST_LOG` is unset.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            record_token_events: true,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl HostConfig {
    /// Parses a JSON document. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, HostError> {
        serde_json::from_str(json).map_err(|e| HostError::Config(e.to_string()))
    }

    /// Reads `SWAP_NETWORK`, `SWAP_RECORD_TOKEN_EVENTS`, `SWAP_LOG_LEVEL` and
    /// `SWAP_LOG_FORMAT` from the process environment.
    pub fn from_env() -> Result<Self, HostError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but with an injectable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, HostError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(network) = lookup("SWAP_NETWORK") {
            config.network = network;
        }
        if let Some(flag) = lookup("SWAP_RECORD_TOKEN_EVENTS") {
            config.record_token_events = match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(HostError::Config(format!(
                        "SWAP_RECORD_TOKEN_EVENTS: expected a boolean, got '{}'",
                        other
                    )))
                }
            };
        }
        if let Some(level) = lookup("SWAP_LOG_LEVEL") {
            config.log_level = level;
        }
        if let Some(format) = lookup("SWAP_LOG_FORMAT") {
            config.log_format = LogFormat::from_str_lossy(&format);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn address_domains_are_distinct() {
        assert_ne!(LABEL_ADDRESS_DOMAIN, CONTRACT_ADDRESS_DOMAIN);
    }

    #[test]
    fn default_config_records_token_events() {
        let config = HostConfig::default();
        assert!(config.record_token_events);
        assert_eq!(config.network, "devnet");
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = HostConfig::from_json(r#"{ "network": "testnet" }"#).unwrap();
        assert_eq!(config.network, "testnet");
        assert!(config.record_token_events);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = HostConfig::from_json("{ network: ").unwrap_err();
        assert!(matches!(err, HostError::Config(_)));
    }

    #[test]
    fn env_lookup_overrides_defaults() {
        let vars: HashMap<&str, &str> = [
            ("SWAP_NETWORK", "mainnet"),
            ("SWAP_RECORD_TOKEN_EVENTS", "off"),
            ("SWAP_LOG_FORMAT", "JSON"),
        ]
        .into_iter()
        .collect();

        let config = HostConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.network, "mainnet");
        assert!(!config.record_token_events);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn env_lookup_rejects_garbage_boolean() {
        let result = HostConfig::from_lookup(|k| {
            (k == "SWAP_RECORD_TOKEN_EVENTS").then(|| "maybe".to_string())
        });
        assert!(matches!(result, Err(HostError::Config(_))));
    }

    #[test]
    fn from_env_reads_the_process_environment() {
        // Only this test touches these variables.
        std::env::set_var("SWAP_NETWORK", "env-net");
        std::env::set_var("SWAP_RECORD_TOKEN_EVENTS", "no");
        let config = HostConfig::from_env();
        std::env::remove_var("SWAP_NETWORK");
        std::env::remove_var("SWAP_RECORD_TOKEN_EVENTS");

        let config = config.unwrap();
        assert_eq!(config.network, "env-net");
        assert!(!config.record_token_events);
    }
}
