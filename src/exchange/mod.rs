//! Exchange module
//!
//! The [`ExchangeApi`] trait is the seam between the commands and the
//! exchange. [`BinanceClient`] implements it over the REST API.

mod client;
pub mod signing;

pub use client::{BinanceClient, Credentials};

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::Result;
use crate::parser::{
    AccountInfo, Order, OrderBookSnapshot, OrderSide, OrderType, SymbolInfo, TimeInForce,
};
use crate::quantize::to_wire;

/// Spot REST API operations used by the tool
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    /// Test connectivity
    async fn ping(&self) -> Result<()>;

    /// Order book snapshot with at most `limit` levels per side
    async fn get_order_book(&self, symbol: &str, limit: u16) -> Result<OrderBookSnapshot>;

    /// Base/quote assets and trading filters of one symbol
    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo>;

    /// All symbols listed on the exchange
    async fn get_exchange_info(&self) -> Result<Vec<SymbolInfo>>;

    async fn create_order(&self, order: &OrderRequest) -> Result<Order>;

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<Order>;

    /// Cancel every open order on a symbol
    async fn cancel_open_orders(&self, symbol: &str) -> Result<Vec<Order>>;

    /// Open orders, for all symbols when `symbol` is `None`
    async fn get_open_orders(&self, symbol: Option<String>) -> Result<Vec<Order>>;

    async fn get_account(&self) -> Result<AccountInfo>;

    /// Create a user data stream listen key
    async fn start_user_stream(&self) -> Result<String>;

    async fn keepalive_user_stream(&self, listen_key: &str) -> Result<()>;

    async fn close_user_stream(&self, listen_key: &str) -> Result<()>;
}

/// Order submission parameters
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub time_in_force: Option<TimeInForce>,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(
        symbol: &str,
        side: OrderSide,
        time_in_force: TimeInForce,
        price: Decimal,
        quantity: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            time_in_force: Some(time_in_force),
            price: Some(price),
            quantity,
            client_order_id: None,
        }
    }

    pub fn market(symbol: &str, side: OrderSide, quantity: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            time_in_force: None,
            price: None,
            quantity,
            client_order_id: None,
        }
    }

    /// Tag the order with a client assigned correlation id
    pub fn with_client_order_id(mut self, client_order_id: impl Into<String>) -> Self {
        self.client_order_id = Some(client_order_id.into());
        self
    }

    /// Query parameters, decimals quantized to the wire format
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("symbol", self.symbol.clone()),
            ("side", self.side.as_str().to_string()),
            ("type", self.order_type.as_str().to_string()),
        ];
        if let Some(tif) = self.time_in_force {
            params.push(("timeInForce", tif.as_str().to_string()));
        }
        params.push(("quantity", to_wire(self.quantity)));
        if let Some(price) = self.price {
            params.push(("price", to_wire(price)));
        }
        if let Some(id) = &self.client_order_id {
            params.push(("newClientOrderId", id.clone()));
        }
        params.push(("newOrderRespType", "FULL".to_string()));
        params
    }
}

/// Fresh client order id, 32 characters matching Binance's id pattern
pub fn new_client_order_id() -> String {
    Uuid::new_v4().simple().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_limit_order_params() {
        let order = OrderRequest::limit(
            "BTCUSDT",
            OrderSide::Sell,
            TimeInForce::Gtc,
            dec!(26000.1),
            dec!(0.005),
        )
        .with_client_order_id("abc");

        let params = order.to_params();
        assert_eq!(
            params,
            vec![
                ("symbol", "BTCUSDT".to_string()),
                ("side", "SELL".to_string()),
                ("type", "LIMIT".to_string()),
                ("timeInForce", "GTC".to_string()),
                ("quantity", "0.00500000".to_string()),
                ("price", "26000.10000000".to_string()),
                ("newClientOrderId", "abc".to_string()),
                ("newOrderRespType", "FULL".to_string()),
            ]
        );
    }

    #[test]
    fn test_market_order_has_no_price_or_tif() {
        let params = OrderRequest::market("ETHBTC", OrderSide::Buy, dec!(1.5)).to_params();
        assert!(params.iter().all(|(k, _)| *k != "price" && *k != "timeInForce"));
        assert!(params.contains(&("quantity", "1.50000000".to_string())));
    }

    #[test]
    fn test_client_order_ids_are_unique_and_valid() {
        let a = new_client_order_id();
        let b = new_client_order_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
