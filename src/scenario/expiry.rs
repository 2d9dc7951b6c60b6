//! Expiring limit order scenario
//!
//! Seeds a known amount of liquidity, then sends an immediate-or-cancel order
//! larger than the whole visible side so it partially fills and expires. The
//! push notification for the test order is matched by its client order id.
//!
//! A shutdown signal interrupts the run at the next await point. Orders and
//! the user stream that were already set up are still released.

use rust_decimal::Decimal;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ScenarioStep;
use crate::config::ScenarioSettings;
use crate::depth::{summarize, AssetPair, DepthSummary, Side};
use crate::error::{Result, ToolError};
use crate::exchange::{new_client_order_id, ExchangeApi, OrderRequest};
use crate::parser::{ExecutionReport, Order, OrderStatus, SymbolInfo, TimeInForce, UserEvent};
use crate::quantize::{ceil_to_step, floor_to_step, wire_unit};
use crate::websocket::{Subscription, UserEventSource};

/// What the user data stream said about the test order
#[derive(Debug, Clone)]
pub enum Notification {
    /// Execution reports carrying the test order's client id, in arrival order
    Observed(Vec<ExecutionReport>),
    /// Nothing correlated arrived before the timeout
    NotObserved { waited: Duration },
}

/// Outcome of a completed expiry scenario
#[derive(Debug, Clone)]
pub struct ExpiryReport {
    pub initial: DepthSummary,
    pub seeded: DepthSummary,
    pub seed_order: Order,
    pub test_order: Order,
    pub notification: Notification,
}

/// An event belongs to an order only if it carries that order's client id
pub fn is_relevant(event: &UserEvent, client_order_id: &str) -> bool {
    event.client_order_id() == Some(client_order_id)
}

/// Drives one run of the expiry scenario
pub struct ExpiryScenario<'a> {
    api: &'a dyn ExchangeApi,
    events: &'a dyn UserEventSource,
    settings: ScenarioSettings,
    shutdown: Option<watch::Receiver<bool>>,
}

impl<'a> ExpiryScenario<'a> {
    pub fn new(
        api: &'a dyn ExchangeApi,
        events: &'a dyn UserEventSource,
        settings: ScenarioSettings,
    ) -> Self {
        Self {
            api,
            events,
            settings,
            shutdown: None,
        }
    }

    /// Stop early once `shutdown` turns true
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub async fn run(&self) -> Result<ExpiryReport> {
        let market = &self.settings.market;
        let side = self.settings.side;

        let (symbol, assets, initial) = self.interruptible(self.survey()).await?;
        let Some((top_price, top_quantity)) = initial.top_of_book() else {
            return Err(ToolError::Precondition(format!(
                "There are no {} orders in the {} order book to test against",
                side, market
            )));
        };

        info!(
            market = %market,
            side = %side,
            top_price = %top_price,
            top_quantity = %top_quantity,
            cumulative = %initial.cumulative_quantity,
            liquidity = %initial.total_liquidity,
            "Initial depth"
        );

        let seed_order = self.place_seed(&symbol, top_price).await?;

        let outcome = self.run_seeded(&symbol, &assets).await;

        if self.settings.cancel_seed {
            self.cancel_seed(&seed_order.symbol, &seed_order.client_order_id)
                .await;
        }

        let (seeded, test_order, notification) = outcome?;
        Ok(ExpiryReport {
            initial,
            seeded,
            seed_order,
            test_order,
            notification,
        })
    }

    /// Race `work` against the shutdown signal
    async fn interruptible<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::select! {
            biased;
            _ = interrupted(self.shutdown.clone()) => {
                warn!("Shutdown requested, abandoning the scenario");
                Err(ToolError::Interrupted)
            }
            outcome = work => outcome,
        }
    }

    async fn survey(&self) -> Result<(SymbolInfo, AssetPair, DepthSummary)> {
        let symbol = self
            .api
            .get_symbol_info(&self.settings.market)
            .await
            .map_err(ToolError::during(ScenarioStep::ReadSymbol))?;
        let assets = AssetPair::new(&symbol.base_asset, &symbol.quote_asset);
        let initial = self.read_depth(&assets, ScenarioStep::ReadDepth).await?;
        Ok((symbol, assets, initial))
    }

    async fn read_depth(&self, assets: &AssetPair, step: ScenarioStep) -> Result<DepthSummary> {
        let snapshot = self
            .api
            .get_order_book(&self.settings.market, self.settings.depth_limit)
            .await
            .map_err(ToolError::during(step))?;
        let levels = match self.settings.side {
            Side::Ask => &snapshot.asks,
            Side::Bid => &snapshot.bids,
        };
        summarize(levels, self.settings.side, assets).map_err(ToolError::during(step))
    }

    /// Rest a small GTC order one tick inside the top of book
    async fn place_seed(&self, symbol: &SymbolInfo, top_price: Decimal) -> Result<Order> {
        let side = self.settings.side;
        let tick = symbol.tick_size().unwrap_or_else(wire_unit);
        let price = match side {
            Side::Ask => top_price - tick,
            Side::Bid => top_price + tick,
        };
        let price = floor_to_step(price, tick);
        if price <= Decimal::ZERO {
            return Err(ToolError::Precondition(format!(
                "Top {} price {} leaves no room for a seed order",
                side, top_price
            )));
        }

        let step = symbol.step_size().unwrap_or_else(wire_unit);
        let quantity = ceil_to_step(self.settings.seed_quantity, step);

        let client_order_id = new_client_order_id();
        let request = OrderRequest::limit(
            &self.settings.market,
            side.maker(),
            TimeInForce::Gtc,
            price,
            quantity,
        )
        .with_client_order_id(client_order_id.clone());

        info!(
            side = %request.side,
            price = %price,
            quantity = %quantity,
            "Creating seed limit order"
        );

        let placed = self
            .interruptible(async {
                self.api
                    .create_order(&request)
                    .await
                    .map_err(ToolError::during(ScenarioStep::PlaceSeedOrder))
            })
            .await;
        let order = match placed {
            Ok(order) => order,
            Err(ToolError::Interrupted) => {
                // The request may already have reached the exchange
                if self.settings.cancel_seed {
                    self.cancel_seed(&self.settings.market, &client_order_id)
                        .await;
                }
                return Err(ToolError::Interrupted);
            }
            Err(e) => return Err(e),
        };

        if order.status != OrderStatus::New {
            if self.settings.cancel_seed && !order.status.is_terminal() {
                self.cancel_seed(&order.symbol, &order.client_order_id)
                    .await;
            }
            return Err(ToolError::Precondition(format!(
                "Seed order {} reported {} instead of NEW, the market moved",
                order.client_order_id, order.status
            )));
        }

        Ok(order)
    }

    /// Re-read depth, then submit and correlate the oversized test order
    async fn run_seeded(
        &self,
        symbol: &SymbolInfo,
        assets: &AssetPair,
    ) -> Result<(DepthSummary, Order, Notification)> {
        let seeded = self
            .interruptible(self.read_depth(assets, ScenarioStep::ReadSeededDepth))
            .await?;
        let Some((top_price, _)) = seeded.top_of_book() else {
            return Err(ToolError::Precondition(format!(
                "The {} side emptied after seeding",
                self.settings.side
            )));
        };

        let floor = self
            .settings
            .min_liquidity
            .max(symbol.min_notional().unwrap_or(Decimal::ZERO));
        if seeded.total_liquidity < floor {
            return Err(ToolError::Precondition(format!(
                "Insufficient liquidity: {} {} on the {} side, need at least {}",
                seeded.total_liquidity, assets.quote, self.settings.side, floor
            )));
        }

        let step = symbol.step_size().unwrap_or_else(wire_unit);
        let quantity = oversized_quantity(seeded.cumulative_quantity, step);

        let mut subscription = self
            .events
            .subscribe()
            .await
            .map_err(ToolError::during(ScenarioStep::Subscribe))?;

        let outcome = self
            .interruptible(self.submit_and_correlate(&mut subscription, top_price, quantity))
            .await;

        subscription.close().await;

        let (test_order, notification) = outcome?;
        Ok((seeded, test_order, notification))
    }

    async fn submit_and_correlate(
        &self,
        subscription: &mut Subscription,
        price: Decimal,
        quantity: Decimal,
    ) -> Result<(Order, Notification)> {
        let client_order_id = new_client_order_id();
        let request = OrderRequest::limit(
            &self.settings.market,
            self.settings.side.taker(),
            TimeInForce::Ioc,
            price,
            quantity,
        )
        .with_client_order_id(client_order_id.clone());

        info!(
            client_order_id = %client_order_id,
            side = %request.side,
            price = %price,
            quantity = %quantity,
            "Creating immediate-or-cancel test order"
        );

        let order = self
            .api
            .create_order(&request)
            .await
            .map_err(ToolError::during(ScenarioStep::PlaceTestOrder))?;

        check_expired(&order)?;

        let wait = Duration::from_secs(self.settings.notification_timeout_secs);
        let notification = correlate(subscription, &client_order_id, wait).await;
        Ok((order, notification))
    }

    async fn cancel_seed(&self, symbol: &str, client_order_id: &str) {
        match self.api.cancel_order(symbol, client_order_id).await {
            Ok(cancelled) => info!(status = %cancelled.status, "Seed order cancelled"),
            Err(e) => {
                let e = ToolError::during(ScenarioStep::CancelSeedOrder)(e);
                warn!(error = %e, "Seed order left as is");
            }
        }
    }
}

/// Resolves once the signal turns true, never if there is none
async fn interrupted(shutdown: Option<watch::Receiver<bool>>) {
    if let Some(mut shutdown) = shutdown {
        let signalled = shutdown.wait_for(|stop| *stop).await.is_ok();
        if signalled {
            return;
        }
    }
    std::future::pending::<()>().await
}

/// Quantity strictly above `cumulative`, on the lot step grid
fn oversized_quantity(cumulative: Decimal, step: Decimal) -> Decimal {
    ceil_to_step(cumulative + step, step)
}

fn check_expired(order: &Order) -> Result<()> {
    if order.status != OrderStatus::Expired {
        return Err(ToolError::Postcondition {
            expected: format!("test order {} to be EXPIRED", order.client_order_id),
            actual: order.status.to_string(),
        });
    }
    if order.executed_qty >= order.orig_qty {
        return Err(ToolError::Postcondition {
            expected: format!("executed quantity below {}", order.orig_qty),
            actual: order.executed_qty.to_string(),
        });
    }
    if order.executed_qty.is_zero() {
        warn!("Test order expired without any fill");
    }
    info!(
        executed = %order.executed_qty,
        requested = %order.orig_qty,
        "Test order expired as expected"
    );
    Ok(())
}

/// Collect execution reports for `client_order_id` until a terminal one or the deadline
async fn correlate(
    subscription: &mut Subscription,
    client_order_id: &str,
    wait: Duration,
) -> Notification {
    let deadline = Instant::now() + wait;
    let mut reports = Vec::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        let Some(event) = subscription.next_event(remaining).await else {
            break;
        };
        if !is_relevant(&event, client_order_id) {
            debug!(event_type = %event.event_type(), "Ignoring unrelated user event");
            continue;
        }
        if let UserEvent::ExecutionReport(report) = event {
            info!(
                execution_type = %report.execution_type,
                status = %report.order_status,
                filled = %report.cumulative_filled_qty,
                "Received event executionReport"
            );
            let terminal = report.order_status.is_terminal();
            reports.push(report);
            if terminal {
                break;
            }
        }
    }

    if reports.is_empty() {
        warn!(
            client_order_id = %client_order_id,
            waited_secs = wait.as_secs(),
            "No user stream notification observed for the test order"
        );
        Notification::NotObserved { waited: wait }
    } else {
        Notification::Observed(reports)
    }
}
