//! REST client for the Binance spot API
//!
//! Handles request signing, error decoding and request/response dumps.

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::signing::sign_query;
use super::{ExchangeApi, OrderRequest};
use crate::error::{Result, ToolError};
use crate::parser::{
    AccountInfo, ApiErrorBody, ExchangeInfo, ListenKey, Order, OrderBookSnapshot, SymbolInfo,
};

/// API key pair
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// How a request authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Security {
    /// No key needed
    Public,
    /// `X-MBX-APIKEY` header only
    ApiKey,
    /// API key header plus HMAC signature over the query
    Signed,
}

/// Binance spot REST client
pub struct BinanceClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    recv_window_ms: u64,
}

impl BinanceClient {
    /// Create a new REST client
    pub fn new(
        base_url: &str,
        credentials: Option<Credentials>,
        recv_window_ms: u64,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_some()
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.credentials.as_ref().ok_or(ToolError::MissingCredentials)
    }

    fn timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    /// Build the final query string, appending timestamp and signature for signed calls
    fn build_query(&self, params: &[(&str, String)], security: Security) -> Result<String> {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));

        if security == Security::Signed {
            let credentials = self.credentials()?;
            serializer.append_pair("recvWindow", &self.recv_window_ms.to_string());
            serializer.append_pair("timestamp", &Self::timestamp_ms().to_string());
            let query = serializer.finish();
            let signature = sign_query(&query, &credentials.api_secret);
            return Ok(format!("{}&signature={}", query, signature));
        }

        Ok(serializer.finish())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        security: Security,
    ) -> Result<T> {
        let query = self.build_query(params, security)?;
        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };

        let mut builder = self.client.request(method.clone(), &url);
        if security != Security::Public {
            builder = builder.header("X-MBX-APIKEY", &self.credentials()?.api_key);
        }

        debug!(method = %method, path = %path, ?params, "Sending request");

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(method = %method, path = %path, status = status.as_u16(), "Received response");
        trace!(body = %body, "Response body");

        if !status.is_success() {
            let err = match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => err,
                Err(_) => ApiErrorBody {
                    code: -1,
                    msg: body.clone(),
                },
            };
            return Err(ToolError::Api {
                status: status.as_u16(),
                code: err.code,
                msg: err.msg,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl ExchangeApi for BinanceClient {
    async fn ping(&self) -> Result<()> {
        let _: Value = self
            .request(Method::GET, "/api/v3/ping", &[], Security::Public)
            .await?;
        Ok(())
    }

    async fn get_order_book(&self, symbol: &str, limit: u16) -> Result<OrderBookSnapshot> {
        self.request(
            Method::GET,
            "/api/v3/depth",
            &[("symbol", symbol.to_string()), ("limit", limit.to_string())],
            Security::Public,
        )
        .await
    }

    async fn get_symbol_info(&self, symbol: &str) -> Result<SymbolInfo> {
        let info: ExchangeInfo = self
            .request(
                Method::GET,
                "/api/v3/exchangeInfo",
                &[("symbol", symbol.to_string())],
                Security::Public,
            )
            .await?;
        info.symbols
            .into_iter()
            .find(|s| s.symbol == symbol)
            .ok_or_else(|| ToolError::UnknownSymbol(symbol.to_string()))
    }

    async fn get_exchange_info(&self) -> Result<Vec<SymbolInfo>> {
        let info: ExchangeInfo = self
            .request(Method::GET, "/api/v3/exchangeInfo", &[], Security::Public)
            .await?;
        Ok(info.symbols)
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<Order> {
        self.request(
            Method::POST,
            "/api/v3/order",
            &order.to_params(),
            Security::Signed,
        )
        .await
    }

    async fn cancel_order(&self, symbol: &str, client_order_id: &str) -> Result<Order> {
        self.request(
            Method::DELETE,
            "/api/v3/order",
            &[
                ("symbol", symbol.to_string()),
                ("origClientOrderId", client_order_id.to_string()),
            ],
            Security::Signed,
        )
        .await
    }

    async fn cancel_open_orders(&self, symbol: &str) -> Result<Vec<Order>> {
        let raw: Vec<Value> = self
            .request(
                Method::DELETE,
                "/api/v3/openOrders",
                &[("symbol", symbol.to_string())],
                Security::Signed,
            )
            .await?;

        // Order lists (OCO) come back in the same array with a different shape
        let mut orders = Vec::with_capacity(raw.len());
        for entry in raw {
            if entry.get("orderId").is_none() {
                warn!(entry = %entry, "Skipping cancelled order list");
                continue;
            }
            orders.push(serde_json::from_value(entry)?);
        }
        Ok(orders)
    }

    async fn get_open_orders(&self, symbol: Option<String>) -> Result<Vec<Order>> {
        let params: Vec<(&str, String)> = symbol.into_iter().map(|s| ("symbol", s)).collect();
        self.request(Method::GET, "/api/v3/openOrders", &params, Security::Signed)
            .await
    }

    async fn get_account(&self) -> Result<AccountInfo> {
        self.request(Method::GET, "/api/v3/account", &[], Security::Signed)
            .await
    }

    async fn start_user_stream(&self) -> Result<String> {
        let key: ListenKey = self
            .request(Method::POST, "/api/v3/userDataStream", &[], Security::ApiKey)
            .await?;
        Ok(key.listen_key)
    }

    async fn keepalive_user_stream(&self, listen_key: &str) -> Result<()> {
        let _: Value = self
            .request(
                Method::PUT,
                "/api/v3/userDataStream",
                &[("listenKey", listen_key.to_string())],
                Security::ApiKey,
            )
            .await?;
        Ok(())
    }

    async fn close_user_stream(&self, listen_key: &str) -> Result<()> {
        let _: Value = self
            .request(
                Method::DELETE,
                "/api/v3/userDataStream",
                &[("listenKey", listen_key.to_string())],
                Security::ApiKey,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(credentials: Option<Credentials>) -> BinanceClient {
        BinanceClient::new(
            "https://testnet.binance.vision/",
            credentials,
            5000,
            Duration::from_secs(10),
        )
        .unwrap()
    }

    fn credentials() -> Credentials {
        Credentials {
            api_key: "key".to_string(),
            api_secret: "secret".to_string(),
        }
    }

    #[test]
    fn test_public_query_is_plain() {
        let params = [
            ("symbol", "BTCUSDT".to_string()),
            ("limit", "100".to_string()),
        ];
        let query = client(None)
            .build_query(&params, Security::Public)
            .unwrap();
        assert_eq!(query, "symbol=BTCUSDT&limit=100");
    }

    #[test]
    fn test_signed_query_appends_signature_last() {
        let query = client(Some(credentials()))
            .build_query(&[("symbol", "BTCUSDT".to_string())], Security::Signed)
            .unwrap();

        let (unsigned, signature) = query.rsplit_once("&signature=").unwrap();
        assert!(unsigned.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        assert_eq!(signature, sign_query(unsigned, "secret"));
    }

    #[test]
    fn test_signed_query_requires_credentials() {
        let result = client(None).build_query(&[], Security::Signed);
        assert!(matches!(result, Err(ToolError::MissingCredentials)));
    }

    #[test]
    fn test_credentials_are_redacted_in_debug() {
        let printed = format!("{:?}", credentials());
        assert!(!printed.contains("secret\""));
        assert!(printed.contains("<redacted>"));
    }
}
