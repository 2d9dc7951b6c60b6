//! Depth module
//!
//! Summarizes one side of an order book snapshot.

mod summary;

pub use summary::{fetch_summary, summarize, DepthSummary};

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parser::OrderSide;

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Ask,
    Bid,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Ask => "ask",
            Side::Bid => "bid",
        }
    }

    /// Order side that takes liquidity from this side of the book
    pub fn taker(&self) -> OrderSide {
        match self {
            Side::Ask => OrderSide::Buy,
            Side::Bid => OrderSide::Sell,
        }
    }

    /// Order side that rests on this side of the book
    pub fn maker(&self) -> OrderSide {
        match self {
            Side::Ask => OrderSide::Sell,
            Side::Bid => OrderSide::Buy,
        }
    }

    /// Human name of a market order consuming this side
    pub fn market_order_name(&self) -> &'static str {
        match self {
            Side::Ask => "market buy",
            Side::Bid => "market sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Base and quote asset of a trading pair
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetPair {
    pub base: String,
    pub quote: String,
}

impl AssetPair {
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_string(),
            quote: quote.to_string(),
        }
    }
}
