//! Checkout coordinator.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use common::{Clock, OrderId, ProductId, ReservationId, deadline};
use domain::{
    CatalogError, CatalogSnapshot, FailureReason, Order, OrderLine, OrderRepository, OrderState,
    RepositoryError,
};
use inventory::{InventoryError, ReservationStore};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::config::CheckoutConfig;
use crate::error::{CheckoutError, Result};
use crate::request::{CheckoutLine, CheckoutRequest};
use crate::services::payment::{PaymentGateway, PaymentOutcome};

struct InFlight {
    token: u64,
    cancel: watch::Sender<bool>,
}

/// Live checkouts, keyed by order id.
#[derive(Default)]
struct InFlightRegistry {
    entries: Mutex<HashMap<OrderId, InFlight>>,
    next_token: AtomicU64,
}

impl InFlightRegistry {
    fn register(&self, order_id: OrderId) -> Result<InFlightGuard<'_>> {
        let mut entries = self.entries.lock();
        if entries.contains_key(&order_id) {
            return Err(CheckoutError::CheckoutInProgress(order_id));
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let (cancel, cancelled) = watch::channel(false);
        entries.insert(order_id, InFlight { token, cancel });

        Ok(InFlightGuard {
            registry: self,
            order_id,
            token,
            cancelled,
        })
    }

    fn contains(&self, order_id: OrderId) -> bool {
        self.entries.lock().contains_key(&order_id)
    }

    fn request_cancel(&self, order_id: OrderId) -> bool {
        match self.entries.lock().get(&order_id) {
            Some(entry) => {
                entry.cancel.send_replace(true);
                true
            }
            None => false,
        }
    }

    fn remove(&self, order_id: OrderId, token: u64) {
        let mut entries = self.entries.lock();
        if entries.get(&order_id).is_some_and(|entry| entry.token == token) {
            entries.remove(&order_id);
        }
    }
}

/// Registration of one running checkout; unregisters on drop.
struct InFlightGuard<'a> {
    registry: &'a InFlightRegistry,
    order_id: OrderId,
    token: u64,
    cancelled: watch::Receiver<bool>,
}

impl InFlightGuard<'_> {
    /// Unregisters and reports whether a cancel arrived first.
    fn finish(&self) -> bool {
        self.registry.remove(self.order_id, self.token);
        *self.cancelled.borrow()
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.order_id, self.token);
    }
}

/// Resolves once a cancel has been requested.
async fn cancel_requested(mut cancelled: watch::Receiver<bool>) {
    loop {
        if *cancelled.borrow_and_update() {
            return;
        }
        if cancelled.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// How the payment step ended.
enum PaymentStep {
    Outcome(PaymentOutcome),
    Cancelled,
}

/// Runs the checkout protocol.
///
/// Reservations are taken in ascending product order, payment is authorized
/// under a timeout, and every reservation is then either committed or
/// released. The coordinator owns all compensation; the stores below it
/// never undo their own work.
pub struct OrderCoordinator<R, C, O, P>
where
    R: ReservationStore,
    C: CatalogSnapshot,
    O: OrderRepository,
    P: PaymentGateway,
{
    reservations: R,
    catalog: C,
    orders: O,
    payment: P,
    clock: Arc<dyn Clock>,
    config: CheckoutConfig,
    in_flight: InFlightRegistry,
}

impl<R, C, O, P> OrderCoordinator<R, C, O, P>
where
    R: ReservationStore,
    C: CatalogSnapshot,
    O: OrderRepository,
    P: PaymentGateway,
{
    /// Creates a new checkout coordinator.
    pub fn new(
        reservations: R,
        catalog: C,
        orders: O,
        payment: P,
        clock: impl Clock + 'static,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            reservations,
            catalog,
            orders,
            payment,
            clock: Arc::new(clock),
            config,
            in_flight: InFlightRegistry::default(),
        }
    }

    /// Returns the checkout configuration.
    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Checks out a set of products.
    ///
    /// Returns the Confirmed order, or the reason checkout failed. Every
    /// failure after stock was reserved leaves the order recorded as Failed
    /// or Cancelled with no Held reservations behind it.
    #[tracing::instrument(skip(self, request), fields(order_id = tracing::field::Empty))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<Order> {
        metrics::counter!("checkout_attempts_total").increment(1);
        let started = std::time::Instant::now();

        let order_id = request.order_id.unwrap_or_default();
        tracing::Span::current().record("order_id", tracing::field::display(order_id));

        let result = self.run_checkout(order_id, &request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(order) => {
                metrics::counter!("checkout_confirmed_total").increment(1);
                tracing::info!(total = %order.total_amount, "checkout confirmed");
            }
            Err(e) => {
                metrics::counter!("checkout_failed_total", "reason" => e.kind()).increment(1);
                tracing::info!(reason = e.kind(), "checkout failed");
            }
        }

        result
    }

    async fn run_checkout(&self, order_id: OrderId, request: &CheckoutRequest) -> Result<Order> {
        let guard = self.in_flight.register(order_id)?;

        if let Some(existing) = self.orders.get(order_id).await? {
            return Self::replay(existing);
        }

        let lines = self.price_lines(request.normalized_lines()?).await?;
        Order::total_of(&lines).map_err(|e| CheckoutError::InvalidRequest(e.to_string()))?;
        let reservation_ids = self.reserve_all(order_id, &lines).await?;

        let order = match Order::pending(order_id, lines, reservation_ids.clone(), self.clock.now())
        {
            Ok(order) => order,
            Err(e) => {
                self.release_all(&reservation_ids).await;
                return Err(CheckoutError::InvalidRequest(e.to_string()));
            }
        };
        if let Err(e) = self.orders.insert(&order).await {
            self.release_all(&order.reservation_ids).await;
            return Err(match e {
                RepositoryError::AlreadyExists(order_id) => {
                    CheckoutError::CheckoutInProgress(order_id)
                }
                e => e.into(),
            });
        }

        let step = self.authorize(&order, &guard).await;
        // A cancel that lands before this point still wins.
        let step = if guard.finish() {
            PaymentStep::Cancelled
        } else {
            step
        };

        match step {
            PaymentStep::Outcome(PaymentOutcome::Approved) => self.commit_all(order).await,
            PaymentStep::Outcome(PaymentOutcome::Declined) => {
                self.abort(order, FailureReason::PaymentDeclined).await
            }
            PaymentStep::Outcome(PaymentOutcome::Timeout) => {
                self.abort(order, FailureReason::PaymentTimeout).await
            }
            PaymentStep::Cancelled => self.abort(order, FailureReason::Cancelled).await,
        }
    }

    /// Answers a retried request from the stored order.
    fn replay(order: Order) -> Result<Order> {
        tracing::debug!(state = %order.state, "replaying stored checkout");
        match order.state {
            OrderState::Confirmed => Ok(order),
            OrderState::Pending => Err(CheckoutError::CheckoutInProgress(order.order_id)),
            state => match &order.failure {
                Some(reason) => Err(CheckoutError::from_failure(order.order_id, reason)),
                None => Err(CheckoutError::Persistence(format!(
                    "order {} is {state} without a failure reason",
                    order.order_id
                ))),
            },
        }
    }

    /// Freezes catalog prices into order lines.
    async fn price_lines(&self, lines: Vec<CheckoutLine>) -> Result<Vec<OrderLine>> {
        let mut priced = Vec::with_capacity(lines.len());
        for line in lines {
            let entry = match self.catalog.lookup(&line.product_id).await {
                Ok(entry) if entry.is_active => entry,
                Ok(_) | Err(CatalogError::NotFound(_)) => {
                    return Err(CheckoutError::ProductUnavailable(line.product_id));
                }
                Err(e) => return Err(CheckoutError::Persistence(e.to_string())),
            };

            priced.push(OrderLine {
                product_id: line.product_id,
                quantity: line.quantity,
                unit_price: entry.price,
                snapshot_version: entry.snapshot_version,
            });
        }
        Ok(priced)
    }

    /// Reserves every line, undoing earlier reservations if one fails.
    async fn reserve_all(
        &self,
        order_id: OrderId,
        lines: &[OrderLine],
    ) -> Result<Vec<ReservationId>> {
        let mut acquired = Vec::with_capacity(lines.len());

        for line in lines {
            let error = match self
                .reservations
                .reserve(&line.product_id, line.quantity, self.config.checkout_window)
                .await
            {
                Ok(reservation) => {
                    acquired.push(reservation.reservation_id);
                    continue;
                }
                Err(e) => e,
            };

            self.release_all(&acquired).await;

            return Err(match error {
                InventoryError::InsufficientStock { product_id, .. } => {
                    self.record_rejection(order_id, lines, product_id).await?
                }
                InventoryError::ProductNotFound(product_id) => {
                    CheckoutError::ProductUnavailable(product_id)
                }
                e => CheckoutError::Persistence(e.to_string()),
            });
        }

        Ok(acquired)
    }

    /// Stores an order that could not get its stock.
    async fn record_rejection(
        &self,
        order_id: OrderId,
        lines: &[OrderLine],
        product_id: ProductId,
    ) -> Result<CheckoutError> {
        let reason = FailureReason::InsufficientStock {
            product_id: product_id.clone(),
        };
        let order = Order::rejected(order_id, lines.to_vec(), reason, self.clock.now())
            .map_err(|e| CheckoutError::InvalidRequest(e.to_string()))?;
        self.orders.insert(&order).await?;

        Ok(CheckoutError::InsufficientStock {
            order_id,
            product_id,
        })
    }

    async fn authorize(&self, order: &Order, guard: &InFlightGuard<'_>) -> PaymentStep {
        let payment = tokio::time::timeout(
            self.config.payment_timeout,
            self.payment.authorize(order.order_id, order.total_amount),
        );

        tokio::select! {
            biased;
            _ = cancel_requested(guard.cancelled.clone()) => PaymentStep::Cancelled,
            outcome = payment => match outcome {
                Ok(outcome) => PaymentStep::Outcome(outcome),
                Err(_) => {
                    tracing::warn!(
                        timeout_ms = self.config.payment_timeout.as_millis() as u64,
                        "payment authorization timed out"
                    );
                    PaymentStep::Outcome(PaymentOutcome::Timeout)
                }
            },
        }
    }

    /// Commits every reservation after an approved payment.
    async fn commit_all(&self, mut order: Order) -> Result<Order> {
        let reservation_ids = order.reservation_ids.clone();
        let mut committed = Vec::with_capacity(reservation_ids.len());

        for (index, &reservation_id) in reservation_ids.iter().enumerate() {
            let error = match self.reservations.commit(reservation_id).await {
                Ok(_) => {
                    committed.push(reservation_id);
                    continue;
                }
                Err(e) => e,
            };

            let rest = &reservation_ids[index + 1..];
            let expired = matches!(error, InventoryError::ReservationExpired(_));
            if !expired && committed.is_empty() {
                // Storage fault: leave the order Pending for reconciliation.
                tracing::warn!(%reservation_id, error = %error, "commit failed");
                return Err(CheckoutError::Persistence(error.to_string()));
            }

            // The failed commit restored nothing. Releasing the hold here
            // races the sweep, and only one of them returns the stock.
            self.release_all(&[reservation_id]).await;
            self.release_all(rest).await;

            let (reason, err) = if committed.is_empty() {
                (
                    FailureReason::ReservationExpired,
                    CheckoutError::ReservationExpired(order.order_id),
                )
            } else {
                metrics::counter!("checkout_partial_commit_faults_total").increment(1);
                tracing::error!(
                    committed = committed.len(),
                    failed = %reservation_id,
                    error = %error,
                    "partial commit fault"
                );
                (
                    FailureReason::PartialCommitFault {
                        committed,
                        failed: reservation_id,
                    },
                    CheckoutError::PartialCommitFault(order.order_id),
                )
            };

            self.transition(&mut order, |order, now| order.fail(reason, now))
                .await?;
            return Err(err);
        }

        self.transition(&mut order, |order, now| order.confirm(now))
            .await?;
        Ok(order)
    }

    /// Releases everything the order holds and records why it ended.
    async fn abort(&self, mut order: Order, reason: FailureReason) -> Result<Order> {
        self.release_all(&order.reservation_ids).await;

        let err = CheckoutError::from_failure(order.order_id, &reason);
        if reason == FailureReason::Cancelled {
            self.transition(&mut order, |order, now| order.cancel(now))
                .await?;
        } else {
            self.transition(&mut order, |order, now| order.fail(reason, now))
                .await?;
        }
        Err(err)
    }

    /// Applies a state change and persists it with a version check.
    async fn transition<F>(&self, order: &mut Order, change: F) -> Result<()>
    where
        F: FnOnce(&mut Order, DateTime<Utc>) -> std::result::Result<(), domain::OrderError>,
    {
        let expected = order.version;
        change(order, self.clock.now()).map_err(|e| CheckoutError::Persistence(e.to_string()))?;
        self.orders.update(order, expected).await?;
        Ok(())
    }

    /// Compensating release, earliest reservation first.
    ///
    /// Reservations that already left Held are skipped; any other failure is
    /// logged and left to the expiry sweep.
    async fn release_all(&self, reservation_ids: &[ReservationId]) {
        for &reservation_id in reservation_ids {
            match self.reservations.release(reservation_id).await {
                Ok(_) => {}
                Err(InventoryError::InvalidState { actual, .. }) => {
                    tracing::debug!(%reservation_id, %actual, "reservation already settled");
                }
                Err(e) => {
                    tracing::warn!(%reservation_id, error = %e, "compensating release failed");
                }
            }
        }
    }

    /// Requests cancellation of an in-flight checkout.
    ///
    /// The running checkout releases its reservations and records the order
    /// as Cancelled, unless payment has already returned. An order that has
    /// already finished is never cancellable, even while a retry of it is
    /// being replayed.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, order_id: OrderId) -> Result<()> {
        if let Some(order) = self.orders.get(order_id).await? {
            if order.state.is_terminal() {
                return Err(Self::not_cancellable(&order));
            }
        }

        if !self.in_flight.request_cancel(order_id) {
            return match self.orders.get(order_id).await? {
                None => Err(CheckoutError::OrderNotFound(order_id)),
                Some(order) => Err(Self::not_cancellable(&order)),
            };
        }

        // The checkout we signalled may have been a replay of an order that
        // finished in the meantime.
        if let Some(order) = self.orders.get(order_id).await? {
            if matches!(order.state, OrderState::Confirmed | OrderState::Failed) {
                return Err(Self::not_cancellable(&order));
            }
        }

        tracing::info!("cancellation requested");
        Ok(())
    }

    fn not_cancellable(order: &Order) -> CheckoutError {
        CheckoutError::NotCancellable {
            order_id: order.order_id,
            state: order.state,
        }
    }

    /// Fails Pending orders left behind by an interrupted checkout.
    ///
    /// An order qualifies when no checkout for it is running and it is older
    /// than the checkout window plus the payment timeout. Returns the ids of
    /// the orders that were reconciled.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_abandoned(&self, now: DateTime<Utc>) -> Result<Vec<OrderId>> {
        let abandon_after = self.config.abandon_after();
        let mut reconciled = Vec::new();

        for mut order in self.orders.list_pending().await? {
            if self.in_flight.contains(order.order_id)
                || deadline(order.created_at, abandon_after) > now
            {
                continue;
            }

            self.release_all(&order.reservation_ids).await;

            let expected = order.version;
            if let Err(e) = order.fail(FailureReason::Abandoned, now) {
                tracing::warn!(order_id = %order.order_id, error = %e, "cannot reconcile order");
                continue;
            }
            match self.orders.update(&order, expected).await {
                Ok(()) => reconciled.push(order.order_id),
                Err(RepositoryError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(order_id = %order.order_id, "order changed during reconciliation");
                }
                Err(e) => return Err(e.into()),
            }
        }

        if !reconciled.is_empty() {
            tracing::warn!(count = reconciled.len(), "reconciled abandoned orders");
        }
        Ok(reconciled)
    }

    /// Reads an order.
    pub async fn order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }
}
