use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use std::time::Duration;

use super::OrderStore;
use crate::error::{ConnectionError, PersistenceError};
use crate::models::{Delivery, Item, Order, Payment};

// ============================================================================
// Postgres Order Store
// ============================================================================
//
// The aggregate is spread over four tables keyed by order_uid:
//   orders (header) 1 - 1 delivery
//                   1 - 1 payment
//                   1 - n items
//
// Writes: one transaction upserts header, delivery and payment, then replaces
// the item set (delete + insert). Any failure rolls the whole thing back, and
// replaying the same aggregate leaves the same rows behind.
//
// Reads: one REPEATABLE READ, READ ONLY transaction so the four selects see
// the same committed snapshot. Missing delivery/payment rows read as zero
// values; only a missing header means "not found".
//
// ============================================================================

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Arbitrary key serialising concurrent schema bootstrap across instances.
const SCHEMA_LOCK_KEY: i64 = 0x6f72_6465_7273;

#[derive(Clone, Debug)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "myuser".to_string(),
            password: "mypassword".to_string(),
            database: "mydb".to_string(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Header row of the `orders` table.
#[derive(Debug, FromRow)]
struct OrderRow {
    order_uid: String,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i32,
    date_created: DateTime<Utc>,
    oof_shard: String,
}

impl OrderRow {
    fn into_order(self, delivery: Delivery, payment: Payment, items: Vec<Item>) -> Order {
        Order {
            order_uid: self.order_uid,
            track_number: self.track_number,
            entry: self.entry,
            delivery,
            payment,
            items,
            locale: self.locale,
            internal_signature: self.internal_signature,
            customer_id: self.customer_id,
            delivery_service: self.delivery_service,
            shardkey: self.shardkey,
            sm_id: self.sm_id,
            date_created: self.date_created,
            oof_shard: self.oof_shard,
        }
    }
}

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    /// Open a pool and check the database answers. The password is never logged.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, ConnectionError> {
        tracing::info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Connecting to Postgres..."
        );

        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(ConnectionError::Store)?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(ConnectionError::Store)?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the four tables if they are missing. Safe to run from several
    /// instances at once.
    pub async fn ensure_schema(&self) -> Result<(), PersistenceError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(SCHEMA_LOCK_KEY)
            .execute(&mut *tx)
            .await?;

        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&mut *tx)
            .await
            .map_err(|e| PersistenceError::Schema(e.to_string()))?;

        tx.commit().await?;
        tracing::info!("Order schema ready");
        Ok(())
    }

    async fn upsert_header(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                track_number       = EXCLUDED.track_number,
                entry              = EXCLUDED.entry,
                locale             = EXCLUDED.locale,
                internal_signature = EXCLUDED.internal_signature,
                customer_id        = EXCLUDED.customer_id,
                delivery_service   = EXCLUDED.delivery_service,
                shardkey           = EXCLUDED.shardkey,
                sm_id              = EXCLUDED.sm_id,
                date_created       = EXCLUDED.date_created,
                oof_shard          = EXCLUDED.oof_shard"#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_delivery(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        let delivery = &order.delivery;
        sqlx::query(
            r#"INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO UPDATE SET
                name    = EXCLUDED.name,
                phone   = EXCLUDED.phone,
                zip     = EXCLUDED.zip,
                city    = EXCLUDED.city,
                address = EXCLUDED.address,
                region  = EXCLUDED.region,
                email   = EXCLUDED.email"#,
        )
        .bind(&order.order_uid)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn upsert_payment(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        let payment = &order.payment;
        sqlx::query(
            r#"INSERT INTO payment (
                order_uid, transaction, request_id, currency, provider,
                amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                transaction   = EXCLUDED.transaction,
                request_id    = EXCLUDED.request_id,
                currency      = EXCLUDED.currency,
                provider      = EXCLUDED.provider,
                amount        = EXCLUDED.amount,
                payment_dt    = EXCLUDED.payment_dt,
                bank          = EXCLUDED.bank,
                delivery_cost = EXCLUDED.delivery_cost,
                goods_total   = EXCLUDED.goods_total,
                custom_fee    = EXCLUDED.custom_fee"#,
        )
        .bind(&order.order_uid)
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn replace_items(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut **tx)
            .await?;

        for item in &order.items {
            sqlx::query(
                r#"INSERT INTO items (
                    order_uid, chrt_id, track_number, price, rid, name,
                    sale, size, total_price, nm_id, brand, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"#,
            )
            .bind(&order.order_uid)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        tracing::debug!(
            order_uid = %order.order_uid,
            items = order.items.len(),
            "Saving order"
        );

        // Dropping `tx` on any early return rolls the transaction back.
        let mut tx = self.pool.begin().await?;
        Self::upsert_header(&mut tx, order).await?;
        Self::upsert_delivery(&mut tx, order).await?;
        Self::upsert_payment(&mut tx, order).await?;
        Self::replace_items(&mut tx, order).await?;
        tx.commit().await?;

        Ok(())
    }

    async fn get_order(&self, order_uid: &str) -> Result<Option<Order>, PersistenceError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await?;

        let header = sqlx::query_as::<_, OrderRow>(
            r#"SELECT order_uid, track_number, entry, locale, internal_signature,
                      customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
               FROM orders
               WHERE order_uid = $1"#,
        )
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let delivery = sqlx::query_as::<_, Delivery>(
            "SELECT name, phone, zip, city, address, region, email FROM delivery WHERE order_uid = $1",
        )
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or_default();

        let payment = sqlx::query_as::<_, Payment>(
            r#"SELECT transaction, request_id, currency, provider, amount,
                      payment_dt, bank, delivery_cost, goods_total, custom_fee
               FROM payment
               WHERE order_uid = $1"#,
        )
        .bind(order_uid)
        .fetch_optional(&mut *tx)
        .await?
        .unwrap_or_default();

        let items = sqlx::query_as::<_, Item>(
            r#"SELECT chrt_id, track_number, price, rid, name, sale,
                      size, total_price, nm_id, brand, status
               FROM items
               WHERE order_uid = $1
               ORDER BY id"#,
        )
        .bind(order_uid)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Some(header.into_order(delivery, payment, items)))
    }

    async fn get_all_orders(&self) -> Result<Vec<Order>, PersistenceError> {
        let uids: Vec<String> = sqlx::query_scalar("SELECT order_uid FROM orders ORDER BY order_uid")
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!(count = uids.len(), "Loading all stored orders");

        let mut orders = Vec::with_capacity(uids.len());
        for uid in uids {
            // A header can only disappear if someone deletes it behind our back.
            if let Some(order) = self.get_order(&uid).await? {
                orders.push(order);
            }
        }
        Ok(orders)
    }
}
