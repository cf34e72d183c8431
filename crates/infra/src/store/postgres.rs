//! Postgres-backed checkout store.
//!
//! One checkout transaction covers the idempotency lookup, the conditional
//! stock decrements, and the order insert; commit makes all of it visible
//! together. The decrement is a single conditioned `UPDATE … WHERE stock >=
//! quantity` evaluated inside the database — new stock is never computed in
//! the application from a previously read value, so concurrent checkouts
//! serialize at the row and cannot oversell.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `DomainError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | DomainError | Scenario |
//! |------------|----------------------|-------------|----------|
//! | Database (unique violation) | `23505` | `Transient` | Idempotency key committed by a racing checkout; a retry replays the committed result |
//! | Database (query canceled) | `57014` | `Transient` | Statement timeout; nothing committed, safe to retry |
//! | Database (serialization/deadlock) | `40001`, `40P01` | `Transient` | Transaction-level conflict; safe to retry |
//! | Database (other) | Any other | `Unknown` | Constraint or schema trouble; logged, surfaced generically |
//! | PoolTimedOut / PoolClosed / Io | N/A | `Transient` | Connection trouble; safe to retry |
//! | Other | N/A | `Unknown` | Unexpected driver errors |

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use checkout_catalog::{CatalogAccessor, Product};
use checkout_core::{BuyerId, DomainError, DomainResult, IdempotencyKey, Money, OrderId, ProductId};
use checkout_engine::{CheckoutStore, CheckoutTx, CommittedCheckout, StockDemand};
use checkout_orders::{Order, OrderLineItem, OrderStatus};

use crate::config::CheckoutConfig;

/// Production checkout store over a SQLx connection pool.
///
/// Thread-safe: the pool is `Send + Sync`; every checkout gets its own
/// transaction.
#[derive(Debug, Clone)]
pub struct PostgresCheckoutStore {
    pool: Arc<PgPool>,
    statement_timeout: Duration,
}

impl PostgresCheckoutStore {
    pub fn new(pool: PgPool, statement_timeout: Duration) -> Self {
        Self {
            pool: Arc::new(pool),
            statement_timeout,
        }
    }

    /// Connect using the given configuration.
    pub async fn connect(config: &CheckoutConfig) -> DomainResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, config.statement_timeout))
    }

    /// Create the checkout tables if they do not exist.
    pub async fn ensure_schema(&self) -> DomainResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }

    /// Seed or replace a catalog product. Maintenance path, not checkout.
    #[instrument(skip(self, product), fields(product_id = %product.id_typed()), err)]
    pub async fn upsert_product(&self, product: &Product) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO products (product_id, name, unit_price_cents, stock, revision, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (product_id)
            DO UPDATE SET
                name = EXCLUDED.name,
                unit_price_cents = EXCLUDED.unit_price_cents,
                stock = EXCLUDED.stock,
                revision = products.revision + 1,
                updated_at = NOW()
            "#,
        )
        .bind(product.id_typed().as_uuid())
        .bind(product.name())
        .bind(product.unit_price().cents())
        .bind(product.stock())
        .bind(product.revision() as i64)
        .bind(product.created_at())
        .bind(product.updated_at())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("upsert_product", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(buyer_id = %buyer), err)]
    pub async fn register_buyer(&self, buyer: BuyerId) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO buyers (buyer_id, created_at)
            VALUES ($1, NOW())
            ON CONFLICT (buyer_id) DO NOTHING
            "#,
        )
        .bind(buyer.as_uuid())
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("register_buyer", e))?;
        Ok(())
    }
}

/// One open Postgres transaction for a checkout.
pub struct PostgresCheckoutTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CheckoutTx for PostgresCheckoutTx {
    async fn committed_checkout(
        &mut self,
        buyer: BuyerId,
        key: &IdempotencyKey,
    ) -> DomainResult<Option<CommittedCheckout>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, order_number
            FROM checkout_keys
            WHERE buyer_id = $1 AND idempotency_key = $2
            "#,
        )
        .bind(buyer.as_uuid())
        .bind(key.as_str())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("committed_checkout", e))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let order_id: Uuid = row
                    .try_get("order_id")
                    .map_err(|e| DomainError::unknown(format!("checkout_keys row: {e}")))?;
                let order_number: String = row
                    .try_get("order_number")
                    .map_err(|e| DomainError::unknown(format!("checkout_keys row: {e}")))?;
                Ok(Some(CommittedCheckout {
                    order_id: OrderId::from_uuid(order_id),
                    order_number,
                }))
            }
        }
    }

    async fn load_products(&mut self, ids: &[ProductId]) -> DomainResult<Vec<Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, unit_price_cents, stock, revision, created_at, updated_at
            FROM products
            WHERE product_id = ANY($1)
            "#,
        )
        .bind(&uuids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("load_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    async fn reserve_and_decrement(&mut self, demands: &[StockDemand]) -> DomainResult<()> {
        // Demands arrive sorted ascending by product id; touching rows in
        // that order gives all concurrent checkouts the same lock order.
        for demand in demands {
            let quantity = i64::from(demand.quantity);
            let result = sqlx::query(
                r#"
                UPDATE products
                SET stock = stock - $2,
                    revision = revision + 1,
                    updated_at = NOW()
                WHERE product_id = $1 AND stock >= $2
                "#,
            )
            .bind(demand.product_id.as_uuid())
            .bind(quantity)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("reserve_and_decrement", e))?;

            if result.rows_affected() == 0 {
                // Same transaction, same attempt: this read cannot be stale
                // relative to the failed conditional update above.
                let available: Option<i64> =
                    sqlx::query("SELECT stock FROM products WHERE product_id = $1")
                        .bind(demand.product_id.as_uuid())
                        .fetch_optional(&mut *self.tx)
                        .await
                        .map_err(|e| map_sqlx_error("reserve_and_decrement", e))?
                        .map(|row| row.try_get("stock"))
                        .transpose()
                        .map_err(|e| DomainError::unknown(format!("products row: {e}")))?;

                return match available {
                    None => Err(DomainError::ProductNotFound(demand.product_id)),
                    Some(available) => Err(DomainError::InsufficientStock {
                        product_id: demand.product_id,
                        requested: demand.quantity,
                        available,
                    }),
                };
            }
        }
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order, key: &IdempotencyKey) -> DomainResult<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (order_id, order_number, buyer_id, subtotal_cents, shipping_cents, total_cents, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id_typed().as_uuid())
        .bind(order.order_number())
        .bind(order.buyer_id().as_uuid())
        .bind(order.subtotal().cents())
        .bind(order.shipping_cost().cents())
        .bind(order.total().cents())
        .bind(order.status().as_str())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for (idx, line) in order.line_items().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, line_no, product_id, quantity, unit_price_cents, subtotal_cents)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(order.id_typed().as_uuid())
            .bind((idx + 1) as i32)
            .bind(line.product_id.as_uuid())
            .bind(i64::from(line.quantity))
            .bind(line.unit_price.cents())
            .bind(line.subtotal.cents())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("insert_order", e))?;
        }

        sqlx::query(
            r#"
            INSERT INTO checkout_keys (buyer_id, idempotency_key, order_id, order_number, created_at)
            VALUES ($1, $2, $3, $4, NOW())
            "#,
        )
        .bind(order.buyer_id().as_uuid())
        .bind(key.as_str())
        .bind(order.id_typed().as_uuid())
        .bind(order.order_number())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        Ok(())
    }

    async fn commit(self) -> DomainResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit", e))
    }

    async fn rollback(self) -> DomainResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl CheckoutStore for PostgresCheckoutStore {
    type Tx = PostgresCheckoutTx;

    #[instrument(skip(self), err)]
    async fn begin(&self) -> DomainResult<Self::Tx> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        // Bounds the only blocking operation in a checkout; exceeding it
        // aborts the transaction as a retryable failure.
        let timeout_ms = self.statement_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        Ok(PostgresCheckoutTx { tx })
    }

    #[instrument(skip(self), fields(buyer_id = %buyer), err)]
    async fn buyer_exists(&self, buyer: BuyerId) -> DomainResult<bool> {
        let row = sqlx::query("SELECT 1 FROM buyers WHERE buyer_id = $1")
            .bind(buyer.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("buyer_exists", e))?;
        Ok(row.is_some())
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn restock(&self, product_id: ProductId, quantity: u32) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("restock quantity must be positive"));
        }
        let result = sqlx::query(
            r#"
            UPDATE products
            SET stock = stock + $2,
                revision = revision + 1,
                updated_at = NOW()
            WHERE product_id = $1
            "#,
        )
        .bind(product_id.as_uuid())
        .bind(i64::from(quantity))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("restock", e))?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ProductNotFound(product_id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(order_id = %id), err)]
    async fn find_order(&self, id: OrderId) -> DomainResult<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT order_id, buyer_id, subtotal_cents, shipping_cents, total_cents, status, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_order", e))?;

        let Some(row) = row else { return Ok(None) };

        let items = sqlx::query(
            r#"
            SELECT product_id, quantity, unit_price_cents, subtotal_cents
            FROM order_items
            WHERE order_id = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_order", e))?;

        let line_items = items
            .iter()
            .map(line_item_from_row)
            .collect::<DomainResult<Vec<_>>>()?;

        Ok(Some(order_from_row(&row, line_items)?))
    }

    #[instrument(skip(self), fields(buyer_id = %buyer), err)]
    async fn orders_for_buyer(&self, buyer: BuyerId) -> DomainResult<Vec<Order>> {
        let order_rows = sqlx::query(
            r#"
            SELECT order_id, buyer_id, subtotal_cents, shipping_cents, total_cents, status, created_at, updated_at
            FROM orders
            WHERE buyer_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(buyer.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("orders_for_buyer", e))?;

        let ids: Vec<Uuid> = order_rows
            .iter()
            .map(|row| row.try_get("order_id"))
            .collect::<Result<_, _>>()
            .map_err(|e| DomainError::unknown(format!("orders row: {e}")))?;

        let item_rows = sqlx::query(
            r#"
            SELECT order_id, product_id, quantity, unit_price_cents, subtotal_cents
            FROM order_items
            WHERE order_id = ANY($1)
            ORDER BY order_id, line_no ASC
            "#,
        )
        .bind(&ids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("orders_for_buyer", e))?;

        let mut items_by_order: std::collections::HashMap<Uuid, Vec<OrderLineItem>> =
            std::collections::HashMap::new();
        for row in &item_rows {
            let order_id: Uuid = row
                .try_get("order_id")
                .map_err(|e| DomainError::unknown(format!("order_items row: {e}")))?;
            items_by_order
                .entry(order_id)
                .or_default()
                .push(line_item_from_row(row)?);
        }

        order_rows
            .iter()
            .map(|row| {
                let order_id: Uuid = row
                    .try_get("order_id")
                    .map_err(|e| DomainError::unknown(format!("orders row: {e}")))?;
                let line_items = items_by_order.remove(&order_id).unwrap_or_default();
                order_from_row(row, line_items)
            })
            .collect()
    }
}

#[async_trait]
impl CatalogAccessor for PostgresCheckoutStore {
    async fn product(&self, id: ProductId) -> DomainResult<Option<Product>> {
        let row = sqlx::query(
            r#"
            SELECT product_id, name, unit_price_cents, stock, revision, created_at, updated_at
            FROM products
            WHERE product_id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    async fn products(&self, ids: &[ProductId]) -> DomainResult<Vec<Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT product_id, name, unit_price_cents, stock, revision, created_at, updated_at
            FROM products
            WHERE product_id = ANY($1)
            "#,
        )
        .bind(&uuids)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("products", e))?;

        rows.iter().map(product_from_row).collect()
    }
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS products (
        product_id UUID PRIMARY KEY,
        name TEXT NOT NULL,
        unit_price_cents BIGINT NOT NULL CHECK (unit_price_cents >= 0),
        stock BIGINT NOT NULL CHECK (stock >= 0),
        revision BIGINT NOT NULL DEFAULT 0,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS buyers (
        buyer_id UUID PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS orders (
        order_id UUID PRIMARY KEY,
        order_number TEXT NOT NULL,
        buyer_id UUID NOT NULL REFERENCES buyers (buyer_id),
        subtotal_cents BIGINT NOT NULL,
        shipping_cents BIGINT NOT NULL,
        total_cents BIGINT NOT NULL,
        status TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_orders_buyer ON orders (buyer_id, created_at)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS order_items (
        order_id UUID NOT NULL REFERENCES orders (order_id) ON DELETE CASCADE,
        line_no INTEGER NOT NULL,
        product_id UUID NOT NULL REFERENCES products (product_id),
        quantity BIGINT NOT NULL CHECK (quantity > 0),
        unit_price_cents BIGINT NOT NULL,
        subtotal_cents BIGINT NOT NULL,
        PRIMARY KEY (order_id, line_no)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS checkout_keys (
        buyer_id UUID NOT NULL REFERENCES buyers (buyer_id),
        idempotency_key TEXT NOT NULL,
        order_id UUID NOT NULL REFERENCES orders (order_id) ON DELETE CASCADE,
        order_number TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (buyer_id, idempotency_key)
    )
    "#,
];

fn product_from_row(row: &sqlx::postgres::PgRow) -> DomainResult<Product> {
    let read = |e: sqlx::Error| DomainError::unknown(format!("products row: {e}"));
    let product_id: Uuid = row.try_get("product_id").map_err(read)?;
    let name: String = row.try_get("name").map_err(read)?;
    let unit_price_cents: i64 = row.try_get("unit_price_cents").map_err(read)?;
    let stock: i64 = row.try_get("stock").map_err(read)?;
    let revision: i64 = row.try_get("revision").map_err(read)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(read)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(read)?;

    Ok(Product::rehydrate(
        ProductId::from_uuid(product_id),
        name,
        Money::from_cents(unit_price_cents),
        stock,
        u64::try_from(revision).unwrap_or(0),
        created_at,
        updated_at,
    ))
}

fn line_item_from_row(row: &sqlx::postgres::PgRow) -> DomainResult<OrderLineItem> {
    let read = |e: sqlx::Error| DomainError::unknown(format!("order_items row: {e}"));
    let product_id: Uuid = row.try_get("product_id").map_err(read)?;
    let quantity: i64 = row.try_get("quantity").map_err(read)?;
    let unit_price_cents: i64 = row.try_get("unit_price_cents").map_err(read)?;
    let subtotal_cents: i64 = row.try_get("subtotal_cents").map_err(read)?;

    Ok(OrderLineItem {
        product_id: ProductId::from_uuid(product_id),
        quantity: u32::try_from(quantity)
            .map_err(|_| DomainError::unknown("order_items row: quantity out of range"))?,
        unit_price: Money::from_cents(unit_price_cents),
        subtotal: Money::from_cents(subtotal_cents),
    })
}

fn order_from_row(
    row: &sqlx::postgres::PgRow,
    line_items: Vec<OrderLineItem>,
) -> DomainResult<Order> {
    let read = |e: sqlx::Error| DomainError::unknown(format!("orders row: {e}"));
    let order_id: Uuid = row.try_get("order_id").map_err(read)?;
    let buyer_id: Uuid = row.try_get("buyer_id").map_err(read)?;
    let subtotal_cents: i64 = row.try_get("subtotal_cents").map_err(read)?;
    let shipping_cents: i64 = row.try_get("shipping_cents").map_err(read)?;
    let total_cents: i64 = row.try_get("total_cents").map_err(read)?;
    let status: String = row.try_get("status").map_err(read)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(read)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(read)?;

    Ok(Order::rehydrate(
        OrderId::from_uuid(order_id),
        BuyerId::from_uuid(buyer_id),
        line_items,
        Money::from_cents(subtotal_cents),
        Money::from_cents(shipping_cents),
        Money::from_cents(total_cents),
        OrderStatus::parse(&status)?,
        created_at,
        updated_at,
    ))
}

fn map_sqlx_error(operation: &str, e: sqlx::Error) -> DomainError {
    match &e {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => {
                DomainError::transient(format!("{operation}: concurrent commit on unique key"))
            }
            Some("57014") | Some("40001") | Some("40P01") => {
                DomainError::transient(format!("{operation}: {db}"))
            }
            _ => DomainError::unknown(format!("{operation}: {db}")),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DomainError::transient(format!("{operation}: {e}"))
        }
        _ => DomainError::unknown(format!("{operation}: {e}")),
    }
}
