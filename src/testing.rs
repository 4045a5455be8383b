//! In-memory fakes shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dashmap::DashMap;

use crate::domain::order::{Delivery, Item, Order, Payment};
use crate::store::{OrderRepository, StoreError};

/// A valid order with one item priced 100 and a delivery cost of 20.
pub fn sample_order(order_uid: &str) -> Order {
    Order {
        order_uid: order_uid.to_string(),
        track_number: "WBILMTESTTRACK".into(),
        entry: "WBIL".into(),
        delivery: Delivery {
            name: "Test Testov".into(),
            phone: "+9720000000".into(),
            zip: "2639809".into(),
            city: "Kiryat Mozkin".into(),
            address: "Ploshad Mira 15".into(),
            region: "Kraiot".into(),
            email: "test@gmail.com".into(),
        },
        payment: Payment {
            transaction: order_uid.to_string(),
            request_id: String::new(),
            currency: "USD".into(),
            provider: "wbpay".into(),
            amount: 120,
            payment_dt: 1_637_907_727,
            bank: "alpha".into(),
            delivery_cost: 20,
            goods_total: 100,
            custom_fee: 0,
        },
        items: vec![Item {
            chrt_id: 9_934_930,
            track_number: "WBILMTESTTRACK".into(),
            price: 100,
            rid: "ab4219087a764ae0btest".into(),
            name: "Mascaras".into(),
            sale: 0,
            size: "0".into(),
            total_price: 100,
            nm_id: 2_389_212,
            brand: "Vivienne Sabo".into(),
            status: 202,
        }],
        locale: "en".into(),
        internal_signature: String::new(),
        customer_id: "test".into(),
        delivery_service: "meest".into(),
        shardkey: "9".into(),
        sm_id: 99,
        date_created: Utc.with_ymd_and_hms(2021, 11, 26, 6, 22, 19).unwrap(),
        oof_shard: "1".into(),
    }
}

/// Repository fake with call counters, an outage switch and an optional
/// artificial latency on `save`.
#[derive(Default)]
pub struct MemoryOrderStore {
    orders: DashMap<String, Order>,
    unavailable: AtomicBool,
    save_delay_ms: AtomicUsize,
    save_calls: AtomicUsize,
    get_by_id_calls: AtomicUsize,
    get_all_calls: AtomicUsize,
}

impl MemoryOrderStore {
    pub fn insert(&self, order: Order) {
        self.orders.insert(order.order_uid.clone(), order);
    }

    pub fn remove(&self, order_uid: &str) {
        self.orders.remove(order_uid);
    }

    pub fn contains(&self, order_uid: &str) -> bool {
        self.orders.contains_key(order_uid)
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_save_delay(&self, delay: Duration) {
        self.save_delay_ms.store(delay.as_millis() as usize, Ordering::SeqCst);
    }

    pub fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }

    pub fn get_by_id_calls(&self) -> usize {
        self.get_by_id_calls.load(Ordering::SeqCst)
    }

    pub fn get_all_calls(&self) -> usize {
        self.get_all_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self, action: &'static str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::new(action, sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for MemoryOrderStore {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        self.save_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.save_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        self.check_available("begin transaction")?;
        self.insert(order.clone());
        Ok(())
    }

    async fn get_by_id(&self, order_uid: &str) -> Result<Option<Order>, StoreError> {
        self.get_by_id_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available("get order")?;
        Ok(self.orders.get(order_uid).map(|entry| entry.value().clone()))
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        self.get_all_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available("query all orders")?;
        Ok(self.orders.iter().map(|entry| entry.value().clone()).collect())
    }
}
