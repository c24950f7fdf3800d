//! Retail record fixtures.
//!
//! Builders for the records a till produces, shaped the way the business
//! layer stores them.

use serde_json::{json, Value};
use std::sync::Arc;
use tillsync_engine::{LoopbackServer, Record};
use tillsync_server::SyncServer;

/// A product category.
pub fn category(id: &str, name: &str) -> Record {
    Record::new(id).with_field("name", json!(name))
}

/// A product, optionally filed under a category.
pub fn product(id: &str, name: &str, price_cents: u64) -> Record {
    Record::new(id)
        .with_field("_id", json!(id))
        .with_field("name", json!(name))
        .with_field("priceCents", json!(price_cents))
}

/// A product filed under `category_id`.
pub fn product_in(id: &str, name: &str, price_cents: u64, category_id: &str) -> Record {
    product(id, name, price_cents).with_field("categoryId", json!(category_id))
}

/// A customer.
pub fn customer(id: &str, name: &str) -> Record {
    Record::new(id)
        .with_field("name", json!(name))
        .with_field("email", json!(format!("{}@example.com", id)))
}

/// Order lines as `(product id, quantity)`.
pub fn lines(items: &[(&str, u32)]) -> Value {
    Value::Array(
        items
            .iter()
            .map(|(product_id, qty)| json!({"productId": product_id, "qty": qty}))
            .collect(),
    )
}

/// An order for `customer_id`.
pub fn order(id: &str, customer_id: &str, items: &[(&str, u32)]) -> Record {
    Record::new(id)
        .with_field("customerId", json!(customer_id))
        .with_field("items", lines(items))
}

/// A till transaction settling `order_id`.
pub fn transaction(id: &str, order_id: &str, total_cents: u64) -> Record {
    Record::new(id)
        .with_field("orderId", json!(order_id))
        .with_field("totalCents", json!(total_cents))
        .with_field("kind", json!("sale"))
}

/// A refund of `transaction_id`.
pub fn refund(id: &str, transaction_id: &str, amount_cents: u64) -> Record {
    Record::new(id)
        .with_field("transactionId", json!(transaction_id))
        .with_field("amountCents", json!(amount_cents))
        .with_field("kind", json!("refund"))
}

/// A received stock batch.
pub fn product_batch(id: &str, product_id: &str, quantity: u32) -> Record {
    Record::new(id)
        .with_field("productId", json!(product_id))
        .with_field("quantity", json!(quantity))
}

/// A stock correction against a batch.
pub fn stock_adjustment(id: &str, product_id: &str, batch_id: &str, delta: i32) -> Record {
    Record::new(id)
        .with_field("productId", json!(product_id))
        .with_field("batchId", json!(batch_id))
        .with_field("delta", json!(delta))
}

/// Returns `record` as already accepted under `remote_id`.
pub fn synced(mut record: Record, remote_id: &str) -> Record {
    record.mark_synced(remote_id.to_string());
    record
}

/// Returns `record` as a tombstone awaiting confirmation.
pub fn tombstone(mut record: Record) -> Record {
    record.mark_deleted();
    record
}

/// Exposes a shared [`SyncServer`] to the engine's loopback client.
#[derive(Clone)]
pub struct ServerHandle(pub Arc<SyncServer>);

impl LoopbackServer for ServerHandle {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, String> {
        self.0.handle_json(path, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tillsync_server::ServerConfig;

    #[test]
    fn order_lines_reference_products() {
        let record = order("o1", "c1", &[("p1", 2), ("p2", 1)]);
        assert_eq!(record.field_str("customerId"), Some("c1"));
        assert_eq!(record.fields["items"][1]["productId"], json!("p2"));
        assert!(record.needs_sync());
    }

    #[test]
    fn synced_and_tombstone_helpers() {
        let record = synced(customer("c1", "Ada"), "C-1");
        assert!(record.is_synced);
        assert_eq!(record.remote_id.as_deref(), Some("C-1"));

        let gone = tombstone(record);
        assert!(gone.is_deleted);
        assert!(!gone.is_synced);
    }

    #[test]
    fn server_handle_routes_json() {
        let handle = ServerHandle(Arc::new(SyncServer::new(ServerConfig::default())));
        let reply = handle
            .handle_post(
                "/sync/customers",
                br#"{"sellerContext":"s1","items":[{"id":"c1","entityType":"customers"}]}"#,
            )
            .unwrap();
        assert!(String::from_utf8(reply).unwrap().contains("\"c1\""));
    }
}
