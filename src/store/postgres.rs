use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use crate::domain::order::{Delivery, Item, Order, Payment};

use super::{OrderRepository, StoreError};

// ============================================================================
// Postgres Order Repository
// ============================================================================
//
// Four tables joined by order_uid: orders, delivery (1:1), payment (1:1),
// items (1:N). `save` writes all four inside one transaction; dropping the
// transaction on any early return rolls the whole write back.
//
// ============================================================================

const SELECT_ORDER_COLUMNS: &str = "
    SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
           o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
           d.name, d.phone, d.zip, d.city, d.address, d.region, d.email,
           p.transaction, p.request_id, p.currency, p.provider, p.amount,
           p.payment_dt, p.bank, p.delivery_cost, p.goods_total, p.custom_fee
    FROM orders o
    JOIN delivery d ON o.order_uid = d.order_uid
    JOIN payment p ON o.order_uid = p.order_uid";

const SELECT_ITEM_COLUMNS: &str = "
    SELECT order_uid, chrt_id, track_number, price, rid, name,
           sale, size, total_price, nm_id, brand, status
    FROM items";

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        tracing::debug!(order_id = %order.order_uid, "Attempting to save order");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::new("begin transaction", e))?;

        sqlx::query(
            "INSERT INTO orders (order_uid, track_number, entry, locale, internal_signature,
                                 customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (order_uid) DO UPDATE SET
                 track_number = EXCLUDED.track_number,
                 entry = EXCLUDED.entry,
                 locale = EXCLUDED.locale,
                 internal_signature = EXCLUDED.internal_signature,
                 customer_id = EXCLUDED.customer_id,
                 delivery_service = EXCLUDED.delivery_service,
                 shardkey = EXCLUDED.shardkey,
                 sm_id = EXCLUDED.sm_id,
                 date_created = EXCLUDED.date_created,
                 oof_shard = EXCLUDED.oof_shard",
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
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::new("insert order info", e))?;

        let delivery = &order.delivery;
        sqlx::query(
            "INSERT INTO delivery (order_uid, name, phone, zip, city, address, region, email)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (order_uid) DO UPDATE SET
                 name = EXCLUDED.name,
                 phone = EXCLUDED.phone,
                 zip = EXCLUDED.zip,
                 city = EXCLUDED.city,
                 address = EXCLUDED.address,
                 region = EXCLUDED.region,
                 email = EXCLUDED.email",
        )
        .bind(&order.order_uid)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::new("insert delivery info", e))?;

        let payment = &order.payment;
        sqlx::query(
            "INSERT INTO payment (order_uid, transaction, request_id, currency, provider, amount,
                                  payment_dt, bank, delivery_cost, goods_total, custom_fee)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (order_uid) DO UPDATE SET
                 transaction = EXCLUDED.transaction,
                 request_id = EXCLUDED.request_id,
                 currency = EXCLUDED.currency,
                 provider = EXCLUDED.provider,
                 amount = EXCLUDED.amount,
                 payment_dt = EXCLUDED.payment_dt,
                 bank = EXCLUDED.bank,
                 delivery_cost = EXCLUDED.delivery_cost,
                 goods_total = EXCLUDED.goods_total,
                 custom_fee = EXCLUDED.custom_fee",
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
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::new("insert payment info", e))?;

        // Items are replaced, never merged.
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(&order.order_uid)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::new("clear previous items", e))?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO items (order_uid, chrt_id, track_number, price, rid, name,
                                    sale, size, total_price, nm_id, brand, status)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
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
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                tracing::error!(order_id = %order.order_uid, chrt_id = item.chrt_id, "Failed to insert item");
                StoreError::new("insert item", e)
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::new("commit transaction", e))?;

        tracing::info!(
            order_id = %order.order_uid,
            item_count = order.items.len(),
            "Saved order"
        );
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query(&format!("{} WHERE o.order_uid = $1", SELECT_ORDER_COLUMNS))
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::new("get order", e))?;

        let Some(row) = row else {
            tracing::debug!(order_id = %order_uid, "Order not found in store");
            return Ok(None);
        };

        let mut order = order_from_row(&row).map_err(|e| StoreError::new("decode order", e))?;

        let item_rows = sqlx::query(&format!("{} WHERE order_uid = $1 ORDER BY id", SELECT_ITEM_COLUMNS))
            .bind(order_uid)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::new("query items", e))?;

        for row in &item_rows {
            order
                .items
                .push(item_from_row(row).map_err(|e| StoreError::new("decode item", e))?);
        }

        Ok(Some(order))
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query(&format!("{} ORDER BY o.date_created, o.order_uid", SELECT_ORDER_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::new("query all orders", e))?;

        let mut orders = rows
            .iter()
            .map(order_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StoreError::new("decode order", e))?;

        // One pass over items, then attach by key.
        let item_rows = sqlx::query(&format!("{} ORDER BY id", SELECT_ITEM_COLUMNS))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::new("query items", e))?;

        let mut items_by_order: HashMap<String, Vec<Item>> = HashMap::new();
        for row in &item_rows {
            let order_uid: String = row
                .try_get("order_uid")
                .map_err(|e| StoreError::new("decode item", e))?;
            let item = item_from_row(row).map_err(|e| StoreError::new("decode item", e))?;
            items_by_order.entry(order_uid).or_default().push(item);
        }

        for order in &mut orders {
            order.items = items_by_order.remove(&order.order_uid).unwrap_or_default();
        }

        tracing::debug!(count = orders.len(), "Loaded all orders from store");
        Ok(orders)
    }
}

fn order_from_row(row: &PgRow) -> Result<Order, sqlx::Error> {
    Ok(Order {
        order_uid: row.try_get("order_uid")?,
        track_number: row.try_get("track_number")?,
        entry: row.try_get("entry")?,
        delivery: Delivery {
            name: row.try_get("name")?,
            phone: row.try_get("phone")?,
            zip: row.try_get("zip")?,
            city: row.try_get("city")?,
            address: row.try_get("address")?,
            region: row.try_get("region")?,
            email: row.try_get("email")?,
        },
        payment: Payment {
            transaction: row.try_get("transaction")?,
            request_id: row.try_get("request_id")?,
            currency: row.try_get("currency")?,
            provider: row.try_get("provider")?,
            amount: row.try_get("amount")?,
            payment_dt: row.try_get("payment_dt")?,
            bank: row.try_get("bank")?,
            delivery_cost: row.try_get("delivery_cost")?,
            goods_total: row.try_get("goods_total")?,
            custom_fee: row.try_get("custom_fee")?,
        },
        items: Vec::new(),
        locale: row.try_get("locale")?,
        internal_signature: row.try_get("internal_signature")?,
        customer_id: row.try_get("customer_id")?,
        delivery_service: row.try_get("delivery_service")?,
        shardkey: row.try_get("shardkey")?,
        sm_id: row.try_get("sm_id")?,
        date_created: row.try_get("date_created")?,
        oof_shard: row.try_get("oof_shard")?,
    })
}

fn item_from_row(row: &PgRow) -> Result<Item, sqlx::Error> {
    Ok(Item {
        chrt_id: row.try_get("chrt_id")?,
        track_number: row.try_get("track_number")?,
        price: row.try_get("price")?,
        rid: row.try_get("rid")?,
        name: row.try_get("name")?,
        sale: row.try_get("sale")?,
        size: row.try_get("size")?,
        total_price: row.try_get("total_price")?,
        nm_id: row.try_get("nm_id")?,
        brand: row.try_get("brand")?,
        status: row.try_get("status")?,
    })
}

// Query behaviour needs a live Postgres; the pipeline tests exercise the
// repository contract through the in-memory fake in `crate::testing`.
