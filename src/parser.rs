//! Parser module for Binance REST responses and user data stream messages
//!
//! Every response is decoded into a typed record at the boundary. Prices and
//! quantities arrive as decimal text and are parsed straight into `Decimal`.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Price level (price, quantity pair)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub quantity: Decimal,
}

impl PriceLevel {
    pub fn new(price: Decimal, quantity: Decimal) -> Self {
        Self { price, quantity }
    }
}

/// Order book snapshot from REST API
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBookSnapshot {
    /// Last update ID
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: u64,

    /// Bids
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub bids: Vec<PriceLevel>,

    /// Asks
    #[serde(deserialize_with = "deserialize_price_levels")]
    pub asks: Vec<PriceLevel>,
}

/// Trading filter attached to a symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filterType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SymbolFilter {
    #[serde(rename_all = "camelCase")]
    PriceFilter {
        #[serde(with = "rust_decimal::serde::str")]
        min_price: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        max_price: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        tick_size: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    LotSize {
        #[serde(with = "rust_decimal::serde::str")]
        min_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        max_qty: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        step_size: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    MinNotional {
        #[serde(with = "rust_decimal::serde::str")]
        min_notional: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    Notional {
        #[serde(with = "rust_decimal::serde::str")]
        min_notional: Decimal,
    },
    #[serde(other)]
    Other,
}

/// Symbol metadata from `exchangeInfo`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SymbolInfo {
    pub symbol: String,
    pub status: String,
    pub base_asset: String,
    pub quote_asset: String,
    #[serde(default)]
    pub filters: Vec<SymbolFilter>,
}

impl SymbolInfo {
    /// Minimum price increment, zero values are treated as "no filter"
    pub fn tick_size(&self) -> Option<Decimal> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::PriceFilter { tick_size, .. } if !tick_size.is_zero() => Some(*tick_size),
            _ => None,
        })
    }

    /// Minimum quantity increment
    pub fn step_size(&self) -> Option<Decimal> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::LotSize { step_size, .. } if !step_size.is_zero() => Some(*step_size),
            _ => None,
        })
    }

    /// Smallest order notional the exchange accepts, if any
    pub fn min_notional(&self) -> Option<Decimal> {
        self.filters.iter().find_map(|f| match f {
            SymbolFilter::MinNotional { min_notional }
            | SymbolFilter::Notional { min_notional } => Some(*min_notional),
            _ => None,
        })
    }
}

/// `exchangeInfo` response
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    pub symbols: Vec<SymbolInfo>,
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Limit,
    Market,
    StopLoss,
    StopLossLimit,
    TakeProfit,
    TakeProfitLimit,
    LimitMaker,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Market => "MARKET",
            OrderType::StopLoss => "STOP_LOSS",
            OrderType::StopLossLimit => "STOP_LOSS_LIMIT",
            OrderType::TakeProfit => "TAKE_PROFIT",
            OrderType::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
            OrderType::LimitMaker => "LIMIT_MAKER",
        }
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good till cancelled
    Gtc,
    /// Immediate or cancel
    Ioc,
    /// Fill or kill
    Fok,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        }
    }
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order status as reported by the exchange
///
/// Unrecognised statuses are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    ExpiredInMatch,
    Other(String),
}

impl OrderStatus {
    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::PendingCancel => "PENDING_CANCEL",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Expired => "EXPIRED",
            OrderStatus::ExpiredInMatch => "EXPIRED_IN_MATCH",
            OrderStatus::Other(s) => s,
        }
    }

    /// The order will not change any more
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
                | OrderStatus::ExpiredInMatch
        )
    }
}

impl From<String> for OrderStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "NEW" => OrderStatus::New,
            "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
            "FILLED" => OrderStatus::Filled,
            "CANCELED" => OrderStatus::Canceled,
            "PENDING_CANCEL" => OrderStatus::PendingCancel,
            "REJECTED" => OrderStatus::Rejected,
            "EXPIRED" => OrderStatus::Expired,
            "EXPIRED_IN_MATCH" => OrderStatus::ExpiredInMatch,
            _ => OrderStatus::Other(s),
        }
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Single trade that filled (part of) an order
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fill {
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub qty: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub commission: Decimal,
    pub commission_asset: String,
}

/// Order as returned by order placement, cancellation and listing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub symbol: String,
    pub order_id: u64,
    pub client_order_id: String,

    /// Set on cancel responses, where `client_order_id` is the cancel request id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_client_order_id: Option<String>,

    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,

    /// Requested quantity
    #[serde(with = "rust_decimal::serde::str")]
    pub orig_qty: Decimal,

    #[serde(with = "rust_decimal::serde::str")]
    pub executed_qty: Decimal,

    /// Binance spells it with a double "m"
    #[serde(rename = "cummulativeQuoteQty", with = "rust_decimal::serde::str")]
    pub cumulative_quote_qty: Decimal,

    pub status: OrderStatus,
    pub time_in_force: TimeInForce,

    #[serde(rename = "type")]
    pub order_type: OrderType,

    pub side: OrderSide,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transact_time: Option<u64>,

    /// Creation time, only present on order listings
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<u64>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fills: Vec<Fill>,
}

/// Asset balance on the account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub free: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub locked: Decimal,
}

impl Balance {
    pub fn total(&self) -> Decimal {
        self.free + self.locked
    }
}

/// `account` response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    #[serde(default)]
    pub can_trade: bool,
    pub balances: Vec<Balance>,
}

/// `userDataStream` response
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenKey {
    pub listen_key: String,
}

/// Error body Binance returns with non-2xx responses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    pub code: i64,
    pub msg: String,
}

/// Order lifecycle update from the user data stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    #[serde(rename = "E")]
    pub event_time: u64,

    #[serde(rename = "s")]
    pub symbol: String,

    /// Client assigned order id, the only key that ties this event to a request
    #[serde(rename = "c")]
    pub client_order_id: String,

    #[serde(rename = "S")]
    pub side: OrderSide,

    #[serde(rename = "o")]
    pub order_type: OrderType,

    #[serde(rename = "f")]
    pub time_in_force: TimeInForce,

    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    pub quantity: Decimal,

    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    pub price: Decimal,

    /// NEW, TRADE, CANCELED, EXPIRED, ...
    #[serde(rename = "x")]
    pub execution_type: String,

    #[serde(rename = "X")]
    pub order_status: OrderStatus,

    #[serde(rename = "r", default)]
    pub reject_reason: String,

    #[serde(rename = "i")]
    pub order_id: u64,

    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub last_executed_qty: Decimal,

    #[serde(rename = "z", with = "rust_decimal::serde::str")]
    pub cumulative_filled_qty: Decimal,

    #[serde(rename = "L", with = "rust_decimal::serde::str")]
    pub last_executed_price: Decimal,

    #[serde(rename = "T")]
    pub transaction_time: u64,
}

/// Balance entry inside `outboundAccountPosition`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionBalance {
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "f", with = "rust_decimal::serde::str")]
    pub free: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    pub locked: Decimal,
}

/// Account balances changed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPosition {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "u")]
    pub last_update_time: u64,
    #[serde(rename = "B")]
    pub balances: Vec<PositionBalance>,
}

/// Deposit, withdrawal or transfer changed a balance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceUpdate {
    #[serde(rename = "E")]
    pub event_time: u64,
    #[serde(rename = "a")]
    pub asset: String,
    #[serde(rename = "d", with = "rust_decimal::serde::str")]
    pub delta: Decimal,
    #[serde(rename = "T")]
    pub clear_time: u64,
}

/// Combined stream message wrapper
#[derive(Debug, Clone, Deserialize)]
pub struct StreamMessage {
    /// Stream name
    pub stream: String,

    /// Data payload
    pub data: Value,
}

/// Parsed user data stream message
#[derive(Debug, Clone)]
pub enum UserEvent {
    ExecutionReport(ExecutionReport),
    AccountPosition(AccountPosition),
    BalanceUpdate(BalanceUpdate),
    Unknown { event_type: String, raw: Value },
}

impl UserEvent {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(raw)?;

        // Combined streams wrap the payload
        if value.get("stream").is_some() && value.get("data").is_some() {
            let wrapped: StreamMessage = serde_json::from_value(value)?;
            return Self::from_value(wrapped.data);
        }

        Self::from_value(value)
    }

    /// Decode an already parsed JSON payload, dispatching on the `e` tag
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let event_type = value
            .get("e")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match event_type.as_str() {
            "executionReport" => Ok(UserEvent::ExecutionReport(serde_json::from_value(value)?)),
            "outboundAccountPosition" => {
                Ok(UserEvent::AccountPosition(serde_json::from_value(value)?))
            }
            "balanceUpdate" => Ok(UserEvent::BalanceUpdate(serde_json::from_value(value)?)),
            _ => Ok(UserEvent::Unknown {
                event_type,
                raw: value,
            }),
        }
    }

    pub fn event_type(&self) -> &str {
        match self {
            UserEvent::ExecutionReport(_) => "executionReport",
            UserEvent::AccountPosition(_) => "outboundAccountPosition",
            UserEvent::BalanceUpdate(_) => "balanceUpdate",
            UserEvent::Unknown { event_type, .. } => event_type,
        }
    }

    /// Client order id embedded in order lifecycle events
    pub fn client_order_id(&self) -> Option<&str> {
        match self {
            UserEvent::ExecutionReport(report) => Some(&report.client_order_id),
            _ => None,
        }
    }

    /// JSON form for printing
    pub fn to_json(&self) -> Value {
        let typed = match self {
            UserEvent::ExecutionReport(e) => serde_json::to_value(e),
            UserEvent::AccountPosition(e) => serde_json::to_value(e),
            UserEvent::BalanceUpdate(e) => serde_json::to_value(e),
            UserEvent::Unknown { raw, .. } => return raw.clone(),
        };
        match typed {
            Ok(Value::Object(mut map)) => {
                map.insert("e".to_string(), Value::String(self.event_type().to_string()));
                Value::Object(map)
            }
            Ok(other) => other,
            Err(e) => Value::String(e.to_string()),
        }
    }
}

/// Custom deserializer for price levels from array of string pairs
fn deserialize_price_levels<'de, D>(deserializer: D) -> Result<Vec<PriceLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Vec<Vec<String>> = Deserialize::deserialize(deserializer)?;
    raw.into_iter()
        .map(|pair| {
            if pair.len() != 2 {
                return Err(serde::de::Error::custom("Invalid price level format"));
            }
            Ok(PriceLevel {
                price: Decimal::from_str(&pair[0]).map_err(serde::de::Error::custom)?,
                quantity: Decimal::from_str(&pair[1]).map_err(serde::de::Error::custom)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_snapshot() {
        let raw = r#"{
            "lastUpdateId": 1027024,
            "bids": [["4.00000000", "431.00000000"]],
            "asks": [["4.00000200", "12.00000000"], ["4.00000100", "3.50000000"]]
        }"#;

        let snapshot: OrderBookSnapshot = serde_json::from_str(raw).unwrap();
        assert_eq!(snapshot.last_update_id, 1027024);
        assert_eq!(snapshot.bids, vec![PriceLevel::new(dec!(4), dec!(431))]);
        assert_eq!(snapshot.asks.len(), 2);
        assert_eq!(snapshot.asks[1].price, dec!(4.000001));
    }

    #[test]
    fn test_parse_snapshot_rejects_malformed_level() {
        let raw = r#"{"lastUpdateId": 1, "bids": [["4.0"]], "asks": []}"#;
        assert!(serde_json::from_str::<OrderBookSnapshot>(raw).is_err());
    }

    #[test]
    fn test_parse_symbol_filters() {
        let raw = r#"{
            "symbol": "BTCUSDT",
            "status": "TRADING",
            "baseAsset": "BTC",
            "quoteAsset": "USDT",
            "filters": [
                {"filterType": "PRICE_FILTER", "minPrice": "0.01000000",
                    "maxPrice": "1000000.00000000", "tickSize": "0.01000000"},
                {"filterType": "LOT_SIZE", "minQty": "0.00001000",
                    "maxQty": "9000.00000000", "stepSize": "0.00001000"},
                {"filterType": "ICEBERG_PARTS", "limit": 10},
                {"filterType": "NOTIONAL", "minNotional": "5.00000000",
                    "applyMinToMarket": true, "maxNotional": "9000000.00000000"}
            ]
        }"#;

        let info: SymbolInfo = serde_json::from_str(raw).unwrap();
        assert_eq!(info.base_asset, "BTC");
        assert_eq!(info.quote_asset, "USDT");
        assert_eq!(info.tick_size(), Some(dec!(0.01)));
        assert_eq!(info.step_size(), Some(dec!(0.00001)));
        assert_eq!(info.min_notional(), Some(dec!(5)));
        assert_eq!(info.filters[2], SymbolFilter::Other);
    }

    #[test]
    fn test_parse_ioc_order_response() {
        let raw = r#"{
            "symbol": "BTCUSDT",
            "orderId": 28,
            "orderListId": -1,
            "clientOrderId": "6gCrw2kRUAF9CvJDGP16IP",
            "transactTime": 1507725176595,
            "price": "26000.00000000",
            "origQty": "10.00000000",
            "executedQty": "0.00500000",
            "cummulativeQuoteQty": "130.00000000",
            "status": "EXPIRED",
            "timeInForce": "IOC",
            "type": "LIMIT",
            "side": "BUY",
            "fills": [
                {"price": "26000.00000000", "qty": "0.00500000", "commission": "0.00000000",
                    "commissionAsset": "BTC", "tradeId": 56}
            ]
        }"#;

        let order: Order = serde_json::from_str(raw).unwrap();
        assert_eq!(order.status, OrderStatus::Expired);
        assert!(order.status.is_terminal());
        assert_eq!(order.time_in_force, TimeInForce::Ioc);
        assert_eq!(order.order_type, OrderType::Limit);
        assert_eq!(order.side, OrderSide::Buy);
        assert_eq!(order.executed_qty, dec!(0.005));
        assert_eq!(order.cumulative_quote_qty, dec!(130));
        assert_eq!(order.fills.len(), 1);
    }

    #[test]
    fn test_unknown_status_is_kept_verbatim() {
        let status: OrderStatus = serde_json::from_str(r#""PENDING_NEW""#).unwrap();
        assert_eq!(status, OrderStatus::Other("PENDING_NEW".to_string()));
        assert_eq!(status.to_string(), "PENDING_NEW");
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_parse_execution_report() {
        let raw = r#"{
            "e": "executionReport", "E": 1499405658658, "s": "ETHBTC",
            "c": "mUvoqJxFIILMdfAW5iGSOW", "S": "BUY", "o": "LIMIT", "f": "GTC",
            "q": "1.00000000", "p": "0.10264410", "P": "0.00000000", "F": "0.00000000",
            "g": -1, "C": "", "x": "NEW", "X": "NEW", "r": "NONE", "i": 4293153,
            "l": "0.00000000", "z": "0.00000000", "L": "0.00000000", "n": "0",
            "N": null, "T": 1499405658657, "t": -1, "I": 8641984, "w": true,
            "m": false, "M": false, "O": 1499405658657, "Z": "0.00000000",
            "Y": "0.00000000", "Q": "0.00000000"
        }"#;

        let event = UserEvent::parse(raw).unwrap();
        assert_eq!(event.event_type(), "executionReport");
        assert_eq!(event.client_order_id(), Some("mUvoqJxFIILMdfAW5iGSOW"));
        if let UserEvent::ExecutionReport(report) = event {
            assert_eq!(report.order_status, OrderStatus::New);
            assert_eq!(report.price, dec!(0.1026441));
            assert_eq!(report.order_id, 4293153);
        } else {
            panic!("Expected ExecutionReport");
        }
    }

    #[test]
    fn test_execution_report_without_client_id_is_an_error() {
        let raw = r#"{
            "e": "executionReport", "E": 1, "s": "ETHBTC", "S": "BUY", "o": "LIMIT",
            "f": "GTC", "q": "1", "p": "1", "x": "NEW", "X": "NEW", "i": 1,
            "l": "0", "z": "0", "L": "0", "T": 1
        }"#;
        assert!(UserEvent::parse(raw).is_err());
    }

    #[test]
    fn test_parse_account_position_and_unknown() {
        let raw = r#"{"e": "outboundAccountPosition", "E": 1564034571105, "u": 1564034571073,
            "B": [{"a": "ETH", "f": "10000.000000", "l": "0.000000"}]}"#;
        let event = UserEvent::parse(raw).unwrap();
        assert!(matches!(
            event,
            UserEvent::AccountPosition(ref p) if p.balances[0].free == dec!(10000)
        ));
        assert_eq!(event.client_order_id(), None);

        let event = UserEvent::parse(r#"{"e": "listenKeyExpired", "E": 1576653824250}"#).unwrap();
        assert_eq!(event.event_type(), "listenKeyExpired");
        assert_eq!(event.client_order_id(), None);
    }

    #[test]
    fn test_parse_wrapped_stream_message() {
        let raw = r#"{"stream": "abc", "data": {"e": "balanceUpdate", "E": 1573200697110,
            "a": "BTC", "d": "100.00000000", "T": 1573200697068}}"#;
        let event = UserEvent::parse(raw).unwrap();
        assert!(matches!(event, UserEvent::BalanceUpdate(ref b) if b.delta == dec!(100)));
        assert_eq!(event.to_json()["e"], "balanceUpdate");
    }
}
