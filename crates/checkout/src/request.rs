//! Checkout request and its validation.

use std::collections::BTreeMap;

use common::{OrderId, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// One requested product and quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

impl CheckoutLine {
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A request to buy a set of products.
///
/// `order_id` is optional; when the client supplies one, retries of the same
/// request are idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub order_id: Option<OrderId>,
    pub lines: Vec<CheckoutLine>,
}

impl CheckoutRequest {
    /// Creates a request with a fresh order id.
    pub fn new(lines: Vec<CheckoutLine>) -> Self {
        Self {
            order_id: None,
            lines,
        }
    }

    /// Pins the order id, making retries idempotent.
    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    /// Validates the lines and merges duplicates.
    ///
    /// The result is sorted by product id, which is the order reservations
    /// are acquired in.
    pub fn normalized_lines(&self) -> Result<Vec<CheckoutLine>> {
        if self.lines.is_empty() {
            return Err(CheckoutError::InvalidRequest(
                "at least one line is required".to_string(),
            ));
        }

        let mut merged: BTreeMap<&ProductId, u32> = BTreeMap::new();
        for line in &self.lines {
            if line.product_id.is_blank() {
                return Err(CheckoutError::InvalidRequest(
                    "product id must not be empty".to_string(),
                ));
            }
            if line.quantity == 0 {
                return Err(CheckoutError::InvalidRequest(format!(
                    "quantity for {} must be greater than 0",
                    line.product_id
                )));
            }

            let total = merged.entry(&line.product_id).or_insert(0);
            *total = total.checked_add(line.quantity).ok_or_else(|| {
                CheckoutError::InvalidRequest(format!("quantity for {} overflows", line.product_id))
            })?;
        }

        Ok(merged
            .into_iter()
            .map(|(product_id, quantity)| CheckoutLine {
                product_id: product_id.clone(),
                quantity,
            })
            .collect())
    }
}
