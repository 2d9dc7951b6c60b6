//! Binance Testnet Tool
//!
//! Command line tool for poking at the Binance spot testnet: inspect depth,
//! move the market, watch the user data stream and run the expiring IOC
//! order scenario.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use owo_colors::{OwoColorize, Stream};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, sync::watch};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use binance_testnet_tool::console::{self, print_colorful_json};
use binance_testnet_tool::parser::OrderSide;
use binance_testnet_tool::{
    fetch_summary, BinanceClient, Config, ExchangeApi, ExpiryScenario, Network, Notification,
    OrderRequest, ScenarioSettings, Side, ToolError, UserEventSource, UserStreamManager,
};

/// Transport crates that drown out our own output at debug level
const QUIET_CRATES: &str =
    "hyper=warn,reqwest=warn,rustls=warn,tungstenite=warn,tokio_tungstenite=warn";

/// Binance Spot Testnet command line tool
#[derive(Parser, Debug)]
#[command(name = "binance-testnet-tool")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Binance API key
    #[arg(long, global = true, env = "BINANCE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Binance API secret
    #[arg(long, global = true, env = "BINANCE_API_SECRET", hide_env_values = true)]
    api_secret: Option<String>,

    /// Network to talk to
    #[arg(long, global = true, value_enum, env = "BINANCE_NETWORK")]
    network: Option<Network>,

    /// Log level or tracing filter directive
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Read environment variables from this env file
    #[arg(long, global = true)]
    config_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ping the REST API
    Ping,

    /// List available markets
    Markets {
        /// Only markets quoted in this asset
        #[arg(long)]
        quote: Option<String>,
    },

    /// Show the trading rules of one market
    SymbolInfo { market: String },

    /// Show non-zero account balances
    Balances,

    /// Show open orders
    Orders {
        #[arg(long)]
        market: Option<String>,
    },

    /// Cancel every open order on a market
    CancelAll {
        #[arg(long)]
        market: String,
    },

    /// Summarize one side of the order book
    Depth {
        #[arg(long, default_value = "BTCUSDT")]
        market: String,

        #[arg(long, value_enum, default_value_t = Side::Ask)]
        side: Side,

        /// Levels to request per side
        #[arg(long, default_value_t = 100)]
        limit: u16,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Make a market order to move the market
    MarketOrder {
        #[arg(long)]
        market: String,

        #[arg(long, value_enum)]
        side: OrderSide,

        /// Base asset quantity
        #[arg(long)]
        quantity: Decimal,
    },

    /// Print user data stream events until Ctrl-C
    Stream,

    /// Place an oversized IOC order and check that it expires
    TestExpiry(TestExpiryArgs),
}

#[derive(Args, Debug)]
struct TestExpiryArgs {
    #[arg(long)]
    market: Option<String>,

    /// Side of the book to seed and consume
    #[arg(long, value_enum)]
    side: Option<Side>,

    /// Size of the seed limit order in base asset
    #[arg(long)]
    seed_quantity: Option<Decimal>,

    /// Minimum quote asset liquidity required on the side
    #[arg(long)]
    min_liquidity: Option<Decimal>,

    /// How long to wait for the user stream notification
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Leave the seed order on the book afterwards
    #[arg(long)]
    keep_seed: bool,

    /// Allow running against the production network
    #[arg(long)]
    allow_production: bool,
}

impl TestExpiryArgs {
    fn apply(&self, settings: &mut ScenarioSettings) {
        if let Some(market) = &self.market {
            settings.market = market.to_uppercase();
        }
        if let Some(side) = self.side {
            settings.side = side;
        }
        if let Some(quantity) = self.seed_quantity {
            settings.seed_quantity = quantity;
        }
        if let Some(floor) = self.min_liquidity {
            settings.min_liquidity = floor;
        }
        if let Some(secs) = self.timeout_secs {
            settings.notification_timeout_secs = secs;
        }
        if self.keep_seed {
            settings.cancel_seed = false;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Clap reads credentials from the environment, so .env goes first
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.json_logs);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{} {:#}",
                "Error:".if_supports_color(Stream::Stderr, |t| t.red()),
                e
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", level, QUIET_CRATES)));

    let (json_layer, plain_layer) = if json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(plain_layer)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(
        cli.network,
        cli.api_key,
        cli.api_secret,
        cli.config_file.as_deref(),
    )
    .context("Failed to load configuration")?;
    info!(
        network = %config.network,
        rest_endpoint = %config.rest_endpoint,
        "Configuration loaded"
    );

    let request_timeout = Duration::from_secs(config.request_timeout_secs);
    let client = Arc::new(BinanceClient::new(
        &config.rest_endpoint,
        config.credentials.clone(),
        config.recv_window_ms,
        request_timeout,
    )?);
    let api: Arc<dyn ExchangeApi> = client.clone();

    match cli.command {
        Command::Ping => {
            api.ping().await?;
            println!("Pong from {}", config.rest_endpoint);
        }
        Command::Markets { quote } => {
            let mut symbols = api.get_exchange_info().await?;
            if let Some(quote) = quote {
                let quote = quote.to_uppercase();
                symbols.retain(|s| s.quote_asset == quote);
            }
            symbols.sort_by(|a, b| a.symbol.cmp(&b.symbol));
            println!("{}", console::markets_table(&symbols));
        }
        Command::SymbolInfo { market } => {
            let info = api.get_symbol_info(&market.to_uppercase()).await?;
            print_colorful_json(&serde_json::to_value(&info)?);
        }
        Command::Balances => {
            let account = api.get_account().await?;
            println!("{}", console::balances_table(&account.balances));
        }
        Command::Orders { market } => {
            let orders = api.get_open_orders(market.map(|m| m.to_uppercase())).await?;
            if orders.is_empty() {
                println!("No open orders");
            } else {
                println!("{}", console::orders_table(&orders));
            }
        }
        Command::CancelAll { market } => {
            let cancelled = api.cancel_open_orders(&market.to_uppercase()).await?;
            println!("Cancelled {} orders", cancelled.len());
            if !cancelled.is_empty() {
                println!("{}", console::orders_table(&cancelled));
            }
        }
        Command::Depth {
            market,
            side,
            limit,
            json,
        } => {
            let summary = fetch_summary(api.as_ref(), &market.to_uppercase(), side, limit).await?;
            if json {
                print_colorful_json(&serde_json::to_value(&summary)?);
            } else {
                for line in console::depth_lines(&summary) {
                    println!("{}", line);
                }
            }
        }
        Command::MarketOrder {
            market,
            side,
            quantity,
        } => {
            if config.network == Network::Production {
                warn!("Sending a market order to the production network");
            }
            let request = OrderRequest::market(&market.to_uppercase(), side, quantity);
            let order = api.create_order(&request).await?;
            print_colorful_json(&serde_json::to_value(&order)?);
        }
        Command::Stream => {
            let source = UserStreamManager::new(api.clone(), &config.ws_endpoint)
                .with_request_timeout(request_timeout);
            stream_events(&source).await?;
        }
        Command::TestExpiry(args) => {
            if config.network == Network::Production && !args.allow_production {
                bail!("Refusing to place test orders on production without --allow-production");
            }
            if !client.has_credentials() {
                return Err(ToolError::MissingCredentials.into());
            }

            let mut settings =
                ScenarioSettings::load().context("Failed to load scenario settings")?;
            args.apply(&mut settings);
            info!(
                market = %settings.market,
                side = %settings.side,
                seed_quantity = %settings.seed_quantity,
                "Starting expiry scenario"
            );

            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            tokio::spawn(async move {
                if signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, releasing orders and stream before exit");
                    let _ = shutdown_tx.send(true);
                }
            });

            let source = UserStreamManager::new(api.clone(), &config.ws_endpoint)
                .with_request_timeout(request_timeout);
            let report = ExpiryScenario::new(api.as_ref(), &source, settings)
                .with_shutdown(shutdown_rx)
                .run()
                .await?;

            for line in console::expiry_lines(&report) {
                println!("{}", line);
            }
            if let Notification::Observed(reports) = &report.notification {
                for execution in reports {
                    print_colorful_json(&serde_json::to_value(execution)?);
                }
            }
        }
    }

    Ok(())
}

async fn stream_events(source: &dyn UserEventSource) -> anyhow::Result<()> {
    let mut subscription = source.subscribe().await?;
    info!("Connected - stream running - do some orders in another terminal");

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = subscription.recv() => match event {
                Some(event) => {
                    info!(event_type = %event.event_type(), "Received event");
                    print_colorful_json(&event.to_json());
                }
                None => {
                    warn!("User data stream ended");
                    break;
                }
            }
        }
    }

    subscription.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_parses_expiry_overrides() {
        let cli = Cli::try_parse_from([
            "binance-testnet-tool",
            "--network",
            "spot-testnet",
            "test-expiry",
            "--market",
            "ethusdt",
            "--side",
            "bid",
            "--seed-quantity",
            "0.1",
            "--keep-seed",
        ])
        .unwrap();
        assert_eq!(cli.network, Some(Network::SpotTestnet));

        let Command::TestExpiry(args) = cli.command else {
            panic!("expected test-expiry");
        };
        let mut settings = ScenarioSettings {
            market: "BTCUSDT".to_string(),
            side: Side::Ask,
            seed_quantity: dec!(0.005),
            min_liquidity: dec!(10),
            depth_limit: 100,
            notification_timeout_secs: 10,
            cancel_seed: true,
        };
        args.apply(&mut settings);

        assert_eq!(settings.market, "ETHUSDT");
        assert_eq!(settings.side, Side::Bid);
        assert_eq!(settings.seed_quantity, dec!(0.1));
        assert_eq!(settings.notification_timeout_secs, 10);
        assert!(!settings.cancel_seed);
        assert!(!args.allow_production);
    }

    #[test]
    fn test_cli_rejects_unknown_network() {
        let result = Cli::try_parse_from(["binance-testnet-tool", "--network", "mainnet", "ping"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_market_order_arguments() {
        let cli = Cli::try_parse_from([
            "binance-testnet-tool",
            "market-order",
            "--market",
            "BTCUSDT",
            "--side",
            "buy",
            "--quantity",
            "0.01",
        ])
        .unwrap();
        match cli.command {
            Command::MarketOrder { side, quantity, .. } => {
                assert_eq!(side, OrderSide::Buy);
                assert_eq!(quantity, dec!(0.01));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
