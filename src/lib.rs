//! Binance Testnet Tool - Library
//!
//! Order book depth inspection and scripted order scenarios against the
//! Binance spot exchange, aimed at the spot testnet.

pub mod config;
pub mod console;
pub mod depth;
pub mod error;
pub mod exchange;
pub mod parser;
pub mod quantize;
pub mod scenario;
pub mod websocket;

pub use config::{Config, Network, ScenarioSettings};
pub use depth::{fetch_summary, summarize, AssetPair, DepthSummary, Side};
pub use error::{Result, ToolError};
pub use exchange::{BinanceClient, Credentials, ExchangeApi, OrderRequest};
pub use parser::{OrderBookSnapshot, PriceLevel, UserEvent};
pub use scenario::{ExpiryReport, ExpiryScenario, Notification};
pub use websocket::{Subscription, UserEventSource, UserStreamManager};
