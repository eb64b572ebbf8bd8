use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{Money, ProductId};
use parking_lot::RwLock;

use super::{CatalogAdmin, CatalogEntry, CatalogError, CatalogResult, CatalogSnapshot, validate_price};

/// In-memory catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    entries: Arc<RwLock<HashMap<ProductId, CatalogEntry>>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of products in the catalog.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if the catalog holds no products.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl CatalogSnapshot for InMemoryCatalog {
    async fn lookup(&self, product_id: &ProductId) -> CatalogResult<CatalogEntry> {
        self.entries
            .read()
            .get(product_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(product_id.clone()))
    }
}

#[async_trait]
impl CatalogAdmin for InMemoryCatalog {
    async fn upsert(
        &self,
        product_id: &ProductId,
        price: Money,
        is_active: bool,
    ) -> CatalogResult<CatalogEntry> {
        validate_price(product_id, price)?;

        let mut entries = self.entries.write();
        let snapshot_version = entries
            .get(product_id)
            .map_or(1, |entry| entry.snapshot_version + 1);
        let entry = CatalogEntry {
            product_id: product_id.clone(),
            price,
            is_active,
            snapshot_version,
        };
        entries.insert(product_id.clone(), entry.clone());
        Ok(entry)
    }

    async fn update(
        &self,
        product_id: &ProductId,
        price: Option<Money>,
        is_active: Option<bool>,
    ) -> CatalogResult<CatalogEntry> {
        if let Some(price) = price {
            validate_price(product_id, price)?;
        }

        let mut entries = self.entries.write();
        let entry = entries
            .get_mut(product_id)
            .ok_or_else(|| CatalogError::NotFound(product_id.clone()))?;
        if let Some(price) = price {
            entry.price = price;
        }
        if let Some(is_active) = is_active {
            entry.is_active = is_active;
        }
        entry.snapshot_version += 1;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_unknown_product() {
        let catalog = InMemoryCatalog::new();
        let err = catalog.lookup(&ProductId::new("SKU-404")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_bumps_snapshot_version() {
        let catalog = InMemoryCatalog::new();
        let sku = ProductId::new("SKU-001");

        let first = catalog.upsert(&sku, Money::from_cents(1000), true).await.unwrap();
        assert_eq!(first.snapshot_version, 1);

        let second = catalog.upsert(&sku, Money::from_cents(1200), false).await.unwrap();
        assert_eq!(second.snapshot_version, 2);

        let current = catalog.lookup(&sku).await.unwrap();
        assert_eq!(current.price, Money::from_cents(1200));
        assert!(!current.is_active);
        assert_eq!(catalog.len(), 1);
    }

    #[tokio::test]
    async fn test_negative_price_is_rejected() {
        let catalog = InMemoryCatalog::new();
        let err = catalog
            .upsert(&ProductId::new("SKU-001"), Money::from_cents(-1), true)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPrice { .. }));
        assert!(catalog.is_empty());
    }

    #[tokio::test]
    async fn test_update_changes_only_given_fields() {
        let catalog = InMemoryCatalog::new();
        let sku = ProductId::new("SKU-001");
        catalog.upsert(&sku, Money::from_cents(1000), true).await.unwrap();

        let updated = catalog.update(&sku, None, Some(false)).await.unwrap();
        assert_eq!(updated.price, Money::from_cents(1000));
        assert!(!updated.is_active);
        assert_eq!(updated.snapshot_version, 2);

        let err = catalog
            .update(&ProductId::new("SKU-404"), Some(Money::from_cents(1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let err = catalog
            .update(&sku, Some(Money::from_cents(-1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidPrice { .. }));
        assert_eq!(catalog.lookup(&sku).await.unwrap().snapshot_version, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_partial_updates_keep_both_fields() {
        let catalog = InMemoryCatalog::new();
        let sku = ProductId::new("SKU-001");
        catalog.upsert(&sku, Money::from_cents(1000), true).await.unwrap();

        for round in 0..50 {
            let price = Money::from_cents(2000 + round);
            let active = round % 2 == 0;

            let reprice = {
                let catalog = catalog.clone();
                let sku = sku.clone();
                tokio::spawn(async move { catalog.update(&sku, Some(price), None).await })
            };
            let toggle = {
                let catalog = catalog.clone();
                let sku = sku.clone();
                tokio::spawn(async move { catalog.update(&sku, None, Some(active)).await })
            };
            reprice.await.unwrap().unwrap();
            toggle.await.unwrap().unwrap();

            let current = catalog.lookup(&sku).await.unwrap();
            assert_eq!(current.price, price);
            assert_eq!(current.is_active, active);
        }
        assert_eq!(catalog.lookup(&sku).await.unwrap().snapshot_version, 101);
    }
}
