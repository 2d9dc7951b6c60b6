//! Configuration module for the testnet tool

use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::depth::Side;
use crate::error::{Result, ToolError};
use crate::exchange::Credentials;

/// Binance network to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Network {
    /// Real money
    Production,
    /// Binance Vision spot testnet
    #[value(alias = "testnet")]
    SpotTestnet,
}

impl Network {
    pub fn rest_endpoint(&self) -> &'static str {
        match self {
            Network::Production => "https://api.binance.com",
            Network::SpotTestnet => "https://testnet.binance.vision",
        }
    }

    pub fn ws_endpoint(&self) -> &'static str {
        match self {
            Network::Production => "wss://stream.binance.com:9443/ws",
            Network::SpotTestnet => "wss://stream.testnet.binance.vision/ws",
        }
    }
}

impl FromStr for Network {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "production" => Ok(Network::Production),
            "spot-testnet" | "testnet" => Ok(Network::SpotTestnet),
            other => Err(ToolError::ConfigError(format!(
                "Unknown network {other:?}, expected production or spot-testnet"
            ))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Production => f.write_str("production"),
            Network::SpotTestnet => f.write_str("spot-testnet"),
        }
    }
}

/// Connection configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub network: Network,

    /// REST API base URL
    pub rest_endpoint: String,

    /// WebSocket base URL for user data streams
    pub ws_endpoint: String,

    pub credentials: Option<Credentials>,

    /// Signed request validity window
    pub recv_window_ms: u64,

    pub request_timeout_secs: u64,
}

impl Config {
    /// Load configuration from command line values, the environment and an optional env file
    ///
    /// Command line values win over the process environment, which wins over
    /// the env file.
    pub fn load(
        network: Option<Network>,
        api_key: Option<String>,
        api_secret: Option<String>,
        config_file: Option<&Path>,
    ) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file_vars = match config_file {
            Some(path) => {
                let vars = read_env_file(path)?;
                tracing::info!(path = %path.display(), "Loaded environment from config file");
                vars
            }
            None => HashMap::new(),
        };

        Self::from_lookup(network, api_key, api_secret, |name| {
            env::var(name).ok().or_else(|| file_vars.get(name).cloned())
        })
    }

    /// Resolve configuration with an explicit variable lookup
    pub fn from_lookup<F>(
        network: Option<Network>,
        api_key: Option<String>,
        api_secret: Option<String>,
        lookup: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let network = match network {
            Some(network) => network,
            None => lookup("BINANCE_NETWORK")
                .map(|n| n.parse())
                .transpose()?
                .unwrap_or(Network::SpotTestnet),
        };

        let api_key = api_key.or_else(|| lookup("BINANCE_API_KEY"));
        let api_secret = api_secret.or_else(|| lookup("BINANCE_API_SECRET"));
        let credentials = match (api_key, api_secret) {
            (Some(api_key), Some(api_secret)) => Some(Credentials {
                api_key,
                api_secret,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ToolError::ConfigError(
                    "API key given without BINANCE_API_SECRET".to_string(),
                ))
            }
            (None, Some(_)) => {
                return Err(ToolError::ConfigError(
                    "API secret given without BINANCE_API_KEY".to_string(),
                ))
            }
        };

        Ok(Self {
            network,
            rest_endpoint: lookup("BINANCE_REST_ENDPOINT")
                .unwrap_or_else(|| network.rest_endpoint().to_string()),
            ws_endpoint: lookup("BINANCE_WS_ENDPOINT")
                .unwrap_or_else(|| network.ws_endpoint().to_string()),
            credentials,
            recv_window_ms: lookup("BINANCE_RECV_WINDOW_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(5000),
            request_timeout_secs: lookup("BINANCE_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        })
    }
}

fn read_env_file(path: &Path) -> Result<HashMap<String, String>> {
    let iter = dotenvy::from_path_iter(path)
        .map_err(|e| ToolError::ConfigError(format!("{}: {}", path.display(), e)))?;
    iter.map(|item| item.map_err(|e| ToolError::ConfigError(format!("{}: {}", path.display(), e))))
        .collect()
}

const SCENARIO_ENV_PREFIX: &str = "EXPIRY";

/// Settings of the expiry scenario
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioSettings {
    /// Trading pair, e.g. BTCUSDT
    pub market: String,

    /// Book side whose liquidity is measured and taken
    pub side: Side,

    /// Size of the resting seed order, in base asset
    #[serde(with = "rust_decimal::serde::str")]
    pub seed_quantity: Decimal,

    /// Smallest total liquidity, in quote asset, worth testing against
    #[serde(with = "rust_decimal::serde::str")]
    pub min_liquidity: Decimal,

    /// Levels requested per depth snapshot
    pub depth_limit: u16,

    /// How long to wait for the correlated push notification
    pub notification_timeout_secs: u64,

    /// Cancel the seed order once the scenario is over
    pub cancel_seed: bool,
}

impl ScenarioSettings {
    /// Load defaults, overridden by `EXPIRY_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::with_prefix(SCENARIO_ENV_PREFIX))
    }

    /// Defaults overridden by whatever `env` yields
    fn from_env(env: config::Environment) -> Result<Self> {
        let settings = config::Config::builder()
            .set_default("market", "BTCUSDT")?
            .set_default("side", "ask")?
            .set_default("seed_quantity", "0.005")?
            .set_default("min_liquidity", "10")?
            .set_default("depth_limit", 100_i64)?
            .set_default("notification_timeout_secs", 10_i64)?
            .set_default("cancel_seed", true)?
            .add_source(env)
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Write;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_to_testnet_without_credentials() {
        let config = Config::from_lookup(None, None, None, no_env).unwrap();
        assert_eq!(config.network, Network::SpotTestnet);
        assert_eq!(config.rest_endpoint, "https://testnet.binance.vision");
        assert_eq!(config.ws_endpoint, "wss://stream.testnet.binance.vision/ws");
        assert!(config.credentials.is_none());
        assert_eq!(config.recv_window_ms, 5000);
    }

    #[test]
    fn test_command_line_wins_over_environment() {
        let env: HashMap<&str, &str> = [
            ("BINANCE_NETWORK", "spot-testnet"),
            ("BINANCE_API_KEY", "env-key"),
            ("BINANCE_API_SECRET", "env-secret"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(
            Some(Network::Production),
            Some("cli-key".to_string()),
            None,
            |name| env.get(name).map(|v| v.to_string()),
        )
        .unwrap();

        assert_eq!(config.network, Network::Production);
        assert_eq!(config.rest_endpoint, "https://api.binance.com");
        let credentials = config.credentials.unwrap();
        assert_eq!(credentials.api_key, "cli-key");
        assert_eq!(credentials.api_secret, "env-secret");
    }

    #[test]
    fn test_half_credentials_are_rejected() {
        let result = Config::from_lookup(None, Some("key".to_string()), None, no_env);
        assert!(matches!(result, Err(ToolError::ConfigError(_))));
    }

    #[test]
    fn test_unknown_network_is_rejected() {
        let result = Config::from_lookup(None, None, None, |name| {
            (name == "BINANCE_NETWORK").then(|| "mainnet".to_string())
        });
        assert!(result.is_err());
        assert_eq!("production".parse::<Network>().unwrap(), Network::Production);
    }

    #[test]
    fn test_reads_env_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "BINANCE_API_KEY=file-key").unwrap();
        writeln!(file, "BINANCE_API_SECRET=file-secret").unwrap();
        writeln!(file, "BINANCE_NETWORK=production").unwrap();

        let vars = read_env_file(file.path()).unwrap();
        let config = Config::from_lookup(None, None, None, |name| vars.get(name).cloned()).unwrap();
        assert_eq!(config.network, Network::Production);
        assert_eq!(config.credentials.unwrap().api_key, "file-key");
    }

    #[test]
    fn test_missing_env_file_is_a_config_error() {
        let result = read_env_file(Path::new("/nonexistent/testnet.env"));
        assert!(matches!(result, Err(ToolError::ConfigError(_))));
    }

    fn scenario_env(vars: &[(&str, &str)]) -> config::Environment {
        let vars = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::with_prefix(SCENARIO_ENV_PREFIX).source(Some(vars))
    }

    #[test]
    fn test_scenario_defaults() {
        let settings = ScenarioSettings::from_env(scenario_env(&[])).unwrap();
        assert_eq!(settings.market, "BTCUSDT");
        assert_eq!(settings.side, Side::Ask);
        assert_eq!(settings.seed_quantity, dec!(0.005));
        assert_eq!(settings.min_liquidity, dec!(10));
        assert_eq!(settings.depth_limit, 100);
        assert_eq!(settings.notification_timeout_secs, 10);
        assert!(settings.cancel_seed);
    }

    #[test]
    fn test_scenario_environment_overrides() {
        let settings = ScenarioSettings::from_env(scenario_env(&[
            ("EXPIRY_MARKET", "ETHUSDT"),
            ("EXPIRY_SIDE", "bid"),
            ("EXPIRY_SEED_QUANTITY", "0.01"),
            ("EXPIRY_CANCEL_SEED", "false"),
            ("BINANCE_NETWORK", "production"),
        ]))
        .unwrap();
        assert_eq!(settings.market, "ETHUSDT");
        assert_eq!(settings.side, Side::Bid);
        assert_eq!(settings.seed_quantity, dec!(0.01));
        assert!(!settings.cancel_seed);
        assert_eq!(settings.depth_limit, 100);
    }

    #[test]
    fn test_scenario_rejects_unknown_side() {
        let result = ScenarioSettings::from_env(scenario_env(&[("EXPIRY_SIDE", "middle")]));
        assert!(matches!(result, Err(ToolError::ConfigError(_))));
    }
}
