use log::debug;
use sqlx::SqlitePool;

use crate::{
    db_types::{NewOrder, Order, OrderUpdate, ProviderOrderId, TransactionId},
    sqlite::db::{self, orders},
    traits::{OrderStore, OrderStoreError},
};

/// The SQLite-backed order repository.
#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl std::fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDatabase").field("url", &self.url).finish()
    }
}

impl SqliteDatabase {
    /// Connect to the database at `BP_DATABASE_URL` (or the default path).
    pub async fn new(max_connections: u32) -> Result<Self, OrderStoreError> {
        let url = db::db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, OrderStoreError> {
        let pool = db::new_pool(url, max_connections).await?;
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), OrderStoreError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| OrderStoreError::DatabaseError(format!("Migration error. {e}")))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl OrderStore for SqliteDatabase {
    async fn create_order(&self, order: NewOrder) -> Result<Order, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn update_order(&self, id: &TransactionId, update: OrderUpdate) -> Result<Order, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::update_order(id, update, &mut conn).await?.ok_or_else(|| OrderStoreError::NotFound(id.clone()))
    }

    async fn fetch_order(&self, id: &TransactionId) -> Result<Option<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_transaction_id(id, &mut conn).await
    }

    async fn fetch_orders_by_provider_order_id(&self, id: &ProviderOrderId) -> Result<Vec<Order>, OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_orders_by_provider_order_id(id, &mut conn).await
    }

    async fn delete_order(&self, id: &TransactionId) -> Result<(), OrderStoreError> {
        let mut conn = self.pool.acquire().await?;
        let deleted = orders::delete_order_by_transaction_id(id, &mut conn).await?;
        if deleted {
            debug!("🪛️ Order for transaction [{id}] deleted");
        }
        Ok(())
    }
}
