//! Depth summary calculation

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{AssetPair, Side};
use crate::error::{Result, ToolError};
use crate::exchange::ExchangeApi;
use crate::parser::PriceLevel;

/// Aggregated view of one side of the order book
///
/// When `empty` is set the price fields are zero and carry no meaning;
/// read them through [`DepthSummary::top_of_book`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthSummary {
    pub side: Side,

    /// Best price on this side
    pub top_price: Decimal,

    /// Quantity resting at the best price
    pub top_quantity: Decimal,

    /// Sum of all level quantities
    pub cumulative_quantity: Decimal,

    /// Sum of price * quantity over all levels, in quote asset
    pub total_liquidity: Decimal,

    /// Volume weighted average price
    pub average_price: Decimal,

    pub empty: bool,
    pub assets: AssetPair,
    pub market_order_name: String,
}

impl DepthSummary {
    fn empty(side: Side, assets: &AssetPair) -> Self {
        Self {
            side,
            top_price: Decimal::ZERO,
            top_quantity: Decimal::ZERO,
            cumulative_quantity: Decimal::ZERO,
            total_liquidity: Decimal::ZERO,
            average_price: Decimal::ZERO,
            empty: true,
            assets: assets.clone(),
            market_order_name: side.market_order_name().to_string(),
        }
    }

    /// Best price and its quantity, `None` for an empty side
    pub fn top_of_book(&self) -> Option<(Decimal, Decimal)> {
        if self.empty {
            None
        } else {
            Some((self.top_price, self.top_quantity))
        }
    }

    /// Volume weighted average price, `None` for an empty side
    pub fn vwap(&self) -> Option<Decimal> {
        if self.empty {
            None
        } else {
            Some(self.average_price)
        }
    }
}

/// Summarize one side of an order book
///
/// Levels are sorted here, best price first, since snapshot ordering is not
/// guaranteed. Levels with zero quantity carry no liquidity and are skipped.
/// Totals that do not fit a `Decimal` are an error, not a panic.
pub fn summarize(levels: &[PriceLevel], side: Side, assets: &AssetPair) -> Result<DepthSummary> {
    let mut sorted: Vec<PriceLevel> = levels
        .iter()
        .filter(|level| level.quantity > Decimal::ZERO)
        .copied()
        .collect();

    match side {
        Side::Ask => sorted.sort_by(|a, b| a.price.cmp(&b.price)),
        Side::Bid => sorted.sort_by(|a, b| b.price.cmp(&a.price)),
    }

    let Some(top) = sorted.first() else {
        return Ok(DepthSummary::empty(side, assets));
    };

    let mut cumulative_quantity = Decimal::ZERO;
    let mut total_liquidity = Decimal::ZERO;
    for level in &sorted {
        let overflow = || {
            ToolError::Overflow(format!(
                "{} side level {} x {}",
                side, level.price, level.quantity
            ))
        };
        let notional = level.price.checked_mul(level.quantity).ok_or_else(overflow)?;
        cumulative_quantity = cumulative_quantity
            .checked_add(level.quantity)
            .ok_or_else(overflow)?;
        total_liquidity = total_liquidity.checked_add(notional).ok_or_else(overflow)?;
    }

    let average_price = total_liquidity
        .checked_div(cumulative_quantity)
        .ok_or_else(|| ToolError::Overflow(format!("{} side average price", side)))?;

    Ok(DepthSummary {
        side,
        top_price: top.price,
        top_quantity: top.quantity,
        cumulative_quantity,
        total_liquidity,
        average_price,
        empty: false,
        assets: assets.clone(),
        market_order_name: side.market_order_name().to_string(),
    })
}

/// Fetch a fresh snapshot and summarize the requested side
pub async fn fetch_summary(
    api: &dyn ExchangeApi,
    symbol: &str,
    side: Side,
    limit: u16,
) -> Result<DepthSummary> {
    let info = api.get_symbol_info(symbol).await?;
    let assets = AssetPair::new(&info.base_asset, &info.quote_asset);
    let snapshot = api.get_order_book(symbol, limit).await?;

    let levels = match side {
        Side::Ask => &snapshot.asks,
        Side::Bid => &snapshot.bids,
    };

    let summary = summarize(levels, side, &assets)?;
    tracing::debug!(
        symbol = %symbol,
        side = %side,
        levels = levels.len(),
        cumulative = %summary.cumulative_quantity,
        "Depth summarized"
    );
    Ok(summary)
}
