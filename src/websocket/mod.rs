//! WebSocket module for the Binance user data stream

mod client;
mod manager;
mod subscription;

pub use client::WebSocketClient;
pub use manager::UserStreamManager;
pub use subscription::{Subscription, UserEventSource, DEFAULT_CLOSE_TIMEOUT};
