use log::debug;
use sqlx::{sqlite::SqliteRow, FromRow, QueryBuilder, Row, SqliteConnection};

use crate::{
    db_types::{Customer, LineItem, NewOrder, Order, OrderStatus, OrderUpdate, PaymentMethod, ProviderOrderId, TransactionId},
    traits::OrderStoreError,
};

/// Orders are stored with the `items` and `customer` columns as JSON text, so the row mapping is
/// done by hand rather than derived.
impl FromRow<'_, SqliteRow> for Order {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        let items: String = row.try_get("items")?;
        let items: Vec<LineItem> = serde_json::from_str(&items)
            .map_err(|e| sqlx::Error::ColumnDecode { index: "items".to_string(), source: Box::new(e) })?;
        let customer: Option<String> = row.try_get("customer")?;
        let customer: Option<Customer> = customer
            .map(|c| serde_json::from_str(&c))
            .transpose()
            .map_err(|e| sqlx::Error::ColumnDecode { index: "customer".to_string(), source: Box::new(e) })?;
        let status = OrderStatus::from(row.try_get::<String, _>("status")?);
        let payment_method = PaymentMethod::from(row.try_get::<String, _>("payment_method")?);
        Ok(Order {
            transaction_id: row.try_get("transaction_id")?,
            provider_order_id: row.try_get("provider_order_id")?,
            status,
            amount: row.try_get("amount")?,
            currency: row.try_get("currency")?,
            merchant_id: row.try_get("merchant_id")?,
            payment_method,
            items,
            customer,
            receipt_url: row.try_get("receipt_url")?,
            receipt_number: row.try_get("receipt_number")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Inserts a new order record, returning the stored row. A second insert for the same transaction
/// id fails with [`OrderStoreError::AlreadyExists`] so that callers can treat replays as
/// idempotent rather than as data corruption.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, OrderStoreError> {
    let items = serde_json::to_string(&order.items)
        .map_err(|e| OrderStoreError::DatabaseError(format!("Could not serialize line items. {e}")))?;
    let customer = order
        .customer
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| OrderStoreError::DatabaseError(format!("Could not serialize customer. {e}")))?;
    let result = sqlx::query_as(
        r#"INSERT INTO orders (
            transaction_id, provider_order_id, status, amount, currency,
            merchant_id, payment_method, items, customer, receipt_url, receipt_number
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING *"#,
    )
    .bind(order.transaction_id.clone())
    .bind(order.provider_order_id.clone())
    .bind(order.status.to_string())
    .bind(order.amount)
    .bind(order.currency.clone())
    .bind(order.merchant_id.clone())
    .bind(order.payment_method.to_string())
    .bind(items)
    .bind(customer)
    .bind(order.receipt_url.clone())
    .bind(order.receipt_number.clone())
    .fetch_one(conn)
    .await;
    match result {
        Ok(order) => {
            debug!("📝️ Order for transaction [{}] recorded", order_id(&order));
            Ok(order)
        },
        Err(sqlx::Error::Database(de)) if de.is_unique_violation() => {
            Err(OrderStoreError::AlreadyExists(order.transaction_id))
        },
        Err(e) => Err(e.into()),
    }
}

fn order_id(order: &Order) -> &str {
    order.transaction_id.as_str()
}

pub async fn fetch_order_by_transaction_id(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderStoreError> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE transaction_id = $1")
        .bind(id.clone())
        .fetch_optional(conn)
        .await?;
    Ok(order)
}

/// Webhook events only carry the provider's order id, so this is the lookup the reconciliation
/// path uses. Oldest record first, in case the id has (anomalously) been attached to more than
/// one order.
pub async fn fetch_orders_by_provider_order_id(
    id: &ProviderOrderId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, OrderStoreError> {
    let orders = sqlx::query_as("SELECT * FROM orders WHERE provider_order_id = $1 ORDER BY created_at ASC")
        .bind(id.clone())
        .fetch_all(conn)
        .await?;
    Ok(orders)
}

/// Applies a partial merge to an order record, stamping `updated_at`. Absent fields are left
/// untouched. Returns `None` if no record exists for the transaction id.
pub async fn update_order(
    id: &TransactionId,
    update: OrderUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, OrderStoreError> {
    if update.is_empty() {
        return fetch_order_by_transaction_id(id, conn).await;
    }
    let mut builder = QueryBuilder::new("UPDATE orders SET updated_at = CURRENT_TIMESTAMP");
    if let Some(status) = update.new_status {
        builder.push(", status = ").push_bind(status.to_string());
    }
    if let Some(provider_order_id) = update.new_provider_order_id {
        builder.push(", provider_order_id = ").push_bind(provider_order_id);
    }
    if let Some(receipt_url) = update.new_receipt_url {
        builder.push(", receipt_url = ").push_bind(receipt_url);
    }
    if let Some(receipt_number) = update.new_receipt_number {
        builder.push(", receipt_number = ").push_bind(receipt_number);
    }
    builder.push(" WHERE transaction_id = ").push_bind(id.clone()).push(" RETURNING *");
    let order = builder.build_query_as::<Order>().fetch_optional(conn).await?;
    if let Some(order) = &order {
        debug!("📝️ Order for transaction [{}] updated. Status is {}", order_id(order), order.status);
    }
    Ok(order)
}

pub async fn delete_order_by_transaction_id(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<bool, OrderStoreError> {
    let result = sqlx::query("DELETE FROM orders WHERE transaction_id = $1").bind(id.clone()).execute(conn).await?;
    Ok(result.rows_affected() > 0)
}
