//! Descriptors of the standard point-of-sale dataset.

use crate::descriptor::EntityDescriptor;

/// Product categories.
pub const CATEGORIES: &str = "categories";
/// Catalogue products.
pub const PRODUCTS: &str = "products";
/// Customers.
pub const CUSTOMERS: &str = "customers";
/// Customer orders.
pub const ORDERS: &str = "orders";
/// Till transactions.
pub const TRANSACTIONS: &str = "transactions";
/// Refunds of earlier transactions.
pub const REFUNDS: &str = "refunds";
/// Received stock batches.
pub const PRODUCT_BATCHES: &str = "productBatches";
/// Manual stock corrections.
pub const STOCK_ADJUSTMENTS: &str = "stockAdjustments";
/// Supplier purchase orders.
pub const PURCHASE_ORDERS: &str = "purchaseOrders";
/// Shop settings.
pub const SETTINGS: &str = "settings";

/// Returns the POS entity types in dependency order.
///
/// Refunds travel with transactions and stock records share the inventory
/// endpoint. Every type strips the `_id` placeholder the backend assigns
/// itself.
pub fn catalogue() -> Vec<EntityDescriptor> {
    vec![
        EntityDescriptor::new(CATEGORIES, "categories")
            .strip("_id")
            .foreign_key("parentId", CATEGORIES),
        EntityDescriptor::new(PRODUCTS, "products")
            .strip("_id")
            .foreign_key("categoryId", CATEGORIES),
        EntityDescriptor::new(CUSTOMERS, "customers").strip("_id"),
        EntityDescriptor::new(ORDERS, "orders")
            .strip("_id")
            .foreign_key("customerId", CUSTOMERS)
            .foreign_key("items[].productId", PRODUCTS),
        EntityDescriptor::new(TRANSACTIONS, "transactions")
            .strip("_id")
            .foreign_key("orderId", ORDERS)
            .foreign_key("customerId", CUSTOMERS)
            .foreign_key("items[].productId", PRODUCTS),
        EntityDescriptor::new(REFUNDS, "transactions")
            .strip("_id")
            .foreign_key("transactionId", TRANSACTIONS)
            .foreign_key("items[].productId", PRODUCTS),
        EntityDescriptor::new(PRODUCT_BATCHES, "inventory")
            .strip("_id")
            .foreign_key("productId", PRODUCTS),
        EntityDescriptor::new(STOCK_ADJUSTMENTS, "inventory")
            .strip("_id")
            .foreign_key("productId", PRODUCTS)
            .foreign_key("batchId", PRODUCT_BATCHES),
        EntityDescriptor::new(PURCHASE_ORDERS, "purchase-orders")
            .strip("_id")
            .foreign_key("items[].productId", PRODUCTS),
        EntityDescriptor::new(SETTINGS, "settings").strip("_id"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grouper::{group_by_endpoint, validate_order};

    #[test]
    fn catalogue_is_valid_and_grouped() {
        let descriptors = catalogue();
        let groups = group_by_endpoint(&descriptors);
        validate_order(&descriptors, &groups).unwrap();

        let endpoints: Vec<&str> = groups.iter().map(|g| g.endpoint.as_str()).collect();
        assert_eq!(
            endpoints,
            vec![
                "categories",
                "products",
                "customers",
                "orders",
                "transactions",
                "inventory",
                "purchase-orders",
                "settings"
            ]
        );
        assert_eq!(groups[4].members.len(), 2);
        assert_eq!(groups[5].members.len(), 2);
    }
}
