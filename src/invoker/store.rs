//! In-Memory Store Operations
//!
//! In-process implementation of the store-backed operations the order
//! workflow invokes: stock checks, stock updates, order creation and stock
//! seeding. Stands in for the independently deployed functions of the
//! original system so the engine runs end-to-end without external services.
//!
//! Every invocation is recorded by operation name, which tests use to assert
//! which operations actually ran.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::{InvokeError, InvokeFuture, OperationCode, TaskInvoker};

/// Operation name: verify stock for one item.
pub const CHECK_STOCK: &str = "check-stock";

/// Operation name: decrement stock for one item.
pub const UPDATE_STOCK: &str = "update-stock";

/// Operation name: persist an order.
pub const CREATE_ORDER: &str = "create-order";

/// Operation name: seed or replenish stock for one item.
pub const CREATE_STORE_ITEM: &str = "create-store-item";

#[derive(Debug, Default)]
struct StoreInner {
    /// Stock quantity by sku
    stock: HashMap<String, u64>,
    /// Accepted orders, in creation order
    orders: Vec<Value>,
    /// Operation names, in invocation order
    invocations: Vec<String>,
}

/// In-memory stock ledger and order store implementing [`TaskInvoker`].
///
/// `check-stock` rejects with `Conflict` when the requested quantity exceeds
/// stock and `NotFound` for unknown skus; on success the output reports
/// `inStock: true`. This is what lets a stock-check Map fail fast on an
/// unavailable item.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
    order_counter: AtomicU64,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds stock for a sku, replacing any existing quantity.
    pub async fn seed(&self, sku: impl Into<String>, quantity: u64) {
        let mut inner = self.inner.lock().await;
        inner.stock.insert(sku.into(), quantity);
    }

    /// Returns the current stock quantity for a sku.
    pub async fn stock_of(&self, sku: &str) -> Option<u64> {
        let inner = self.inner.lock().await;
        inner.stock.get(sku).copied()
    }

    /// Returns all accepted orders in creation order.
    pub async fn orders(&self) -> Vec<Value> {
        let inner = self.inner.lock().await;
        inner.orders.clone()
    }

    /// Returns the operation names invoked so far, in order.
    pub async fn invocations(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.invocations.clone()
    }

    async fn check_stock(&self, input: Value) -> Result<Value, InvokeError> {
        let (sku, quantity) = parse_item(&input)?;
        let inner = self.inner.lock().await;

        let available = *inner.stock.get(&sku).ok_or_else(|| InvokeError::Operation {
            code: OperationCode::NotFound,
            message: format!("unknown item '{}'", sku),
        })?;

        if available < quantity {
            return Err(InvokeError::Operation {
                code: OperationCode::Conflict,
                message: format!(
                    "item '{}' is not in stock ({} requested, {} available)",
                    sku, quantity, available
                ),
            });
        }

        Ok(json!({ "item": input["item"], "inStock": true }))
    }

    async fn update_stock(&self, input: Value) -> Result<Value, InvokeError> {
        let (sku, quantity) = parse_item(&input)?;
        let mut inner = self.inner.lock().await;

        let available = inner
            .stock
            .get_mut(&sku)
            .ok_or_else(|| InvokeError::Operation {
                code: OperationCode::NotFound,
                message: format!("unknown item '{}'", sku),
            })?;

        if *available < quantity {
            return Err(InvokeError::Operation {
                code: OperationCode::Conflict,
                message: format!(
                    "cannot remove {} of '{}' ({} available)",
                    quantity, sku, available
                ),
            });
        }

        *available -= quantity;
        let new_quantity = *available;

        Ok(json!({ "item": input["item"], "newQuantity": new_quantity }))
    }

    async fn create_order(&self, input: Value) -> Result<Value, InvokeError> {
        let order = input
            .get("order")
            .and_then(Value::as_array)
            .ok_or_else(|| InvokeError::Operation {
                code: OperationCode::ValidationError,
                message: "input must carry an 'order' list".to_string(),
            })?;

        if order.is_empty() {
            return Err(InvokeError::Operation {
                code: OperationCode::ValidationError,
                message: "order has no line items".to_string(),
            });
        }

        let sequence = self.order_counter.fetch_add(1, Ordering::Relaxed) + 1;
        let order_id = format!("order-{:06}", sequence);

        let mut inner = self.inner.lock().await;
        inner.orders.push(json!({
            "orderId": order_id,
            "order": order,
        }));

        Ok(json!({ "orderId": order_id }))
    }

    async fn create_store_item(&self, input: Value) -> Result<Value, InvokeError> {
        let (sku, quantity) = parse_item(&input)?;
        let mut inner = self.inner.lock().await;
        inner.stock.insert(sku, quantity);
        Ok(json!({ "item": input["item"] }))
    }
}

/// Extracts `{item: {sku, qty}}` from an operation input.
fn parse_item(input: &Value) -> Result<(String, u64), InvokeError> {
    let item = input.get("item").ok_or_else(|| InvokeError::Operation {
        code: OperationCode::ValidationError,
        message: "input must carry an 'item'".to_string(),
    })?;

    let sku = item
        .get("sku")
        .and_then(Value::as_str)
        .ok_or_else(|| InvokeError::Operation {
            code: OperationCode::ValidationError,
            message: "item must carry a string 'sku'".to_string(),
        })?;

    let quantity = item
        .get("qty")
        .and_then(Value::as_u64)
        .ok_or_else(|| InvokeError::Operation {
            code: OperationCode::ValidationError,
            message: "item must carry a non-negative 'qty'".to_string(),
        })?;

    Ok((sku.to_string(), quantity))
}

impl TaskInvoker for InMemoryStore {
    fn invoke<'a>(&'a self, operation: &'a str, input: Value) -> InvokeFuture<'a> {
        Box::pin(async move {
            debug!("Store operation '{}' invoked", operation);
            {
                let mut inner = self.inner.lock().await;
                inner.invocations.push(operation.to_string());
            }

            match operation {
                CHECK_STOCK => self.check_stock(input).await,
                UPDATE_STOCK => self.update_stock(input).await,
                CREATE_ORDER => self.create_order(input).await,
                CREATE_STORE_ITEM => self.create_store_item(input).await,
                other => Err(InvokeError::Operation {
                    code: OperationCode::NotFound,
                    message: format!("unknown operation '{}'", other),
                }),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(sku: &str, qty: u64) -> Value {
        json!({ "item": { "sku": sku, "qty": qty } })
    }

    #[tokio::test]
    async fn test_check_stock_available() {
        let store = InMemoryStore::new();
        store.seed("A", 5).await;

        let output = store.invoke(CHECK_STOCK, item("A", 2)).await.unwrap();
        assert_eq!(output["inStock"], json!(true));
        assert_eq!(output["item"]["sku"], json!("A"));
    }

    #[tokio::test]
    async fn test_check_stock_insufficient_is_conflict() {
        let store = InMemoryStore::new();
        store.seed("A", 1).await;

        let err = store.invoke(CHECK_STOCK, item("A", 2)).await.unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Operation {
                code: OperationCode::Conflict,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_check_stock_unknown_sku() {
        let store = InMemoryStore::new();
        let err = store.invoke(CHECK_STOCK, item("ghost", 1)).await.unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Operation {
                code: OperationCode::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_update_stock_decrements() {
        let store = InMemoryStore::new();
        store.seed("A", 5).await;

        let output = store.invoke(UPDATE_STOCK, item("A", 2)).await.unwrap();
        assert_eq!(output["newQuantity"], json!(3));
        assert_eq!(store.stock_of("A").await, Some(3));
    }

    #[tokio::test]
    async fn test_update_stock_cannot_go_negative() {
        let store = InMemoryStore::new();
        store.seed("A", 1).await;

        let err = store.invoke(UPDATE_STOCK, item("A", 2)).await.unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Operation {
                code: OperationCode::Conflict,
                ..
            }
        ));
        assert_eq!(store.stock_of("A").await, Some(1));
    }

    #[tokio::test]
    async fn test_create_order_assigns_sequential_ids() {
        let store = InMemoryStore::new();
        let order = json!({ "order": [{ "sku": "A", "qty": 1 }] });

        let first = store.invoke(CREATE_ORDER, order.clone()).await.unwrap();
        let second = store.invoke(CREATE_ORDER, order).await.unwrap();

        assert_eq!(first["orderId"], json!("order-000001"));
        assert_eq!(second["orderId"], json!("order-000002"));
        assert_eq!(store.orders().await.len(), 2);
    }

    #[tokio::test]
    async fn test_create_order_rejects_empty() {
        let store = InMemoryStore::new();
        let err = store
            .invoke(CREATE_ORDER, json!({ "order": [] }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Operation {
                code: OperationCode::ValidationError,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_create_store_item_seeds_stock() {
        let store = InMemoryStore::new();
        store
            .invoke(CREATE_STORE_ITEM, item("B", 10))
            .await
            .unwrap();
        assert_eq!(store.stock_of("B").await, Some(10));
    }

    #[tokio::test]
    async fn test_unknown_operation() {
        let store = InMemoryStore::new();
        let err = store.invoke("teleport", json!({})).await.unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Operation {
                code: OperationCode::NotFound,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_invocations_recorded_in_order() {
        let store = InMemoryStore::new();
        store.seed("A", 5).await;

        store.invoke(CHECK_STOCK, item("A", 1)).await.unwrap();
        store.invoke(UPDATE_STOCK, item("A", 1)).await.unwrap();

        assert_eq!(store.invocations().await, vec![CHECK_STOCK, UPDATE_STOCK]);
    }

    #[tokio::test]
    async fn test_malformed_input_is_validation_error() {
        let store = InMemoryStore::new();
        let err = store
            .invoke(CHECK_STOCK, json!({ "item": { "sku": 42 } }))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            InvokeError::Operation {
                code: OperationCode::ValidationError,
                ..
            }
        ));
    }
}
