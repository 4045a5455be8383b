use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

// ============================================================================
// Order Aggregate
// ============================================================================
//
// One order owns exactly one Delivery and one Payment and an ordered list of
// Items. Field names follow the JSON payload published on the order topic.
//
// ============================================================================

#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Order {
    #[validate(length(min = 1))]
    pub order_uid: String,
    #[validate(length(min = 1))]
    pub track_number: String,
    #[validate(length(min = 1))]
    pub entry: String,
    #[validate(nested)]
    pub delivery: Delivery,
    #[validate(nested)]
    pub payment: Payment,
    #[validate(length(min = 1), nested)]
    pub items: Vec<Item>,
    pub locale: String,
    pub internal_signature: String,
    #[validate(length(min = 1))]
    pub customer_id: String,
    #[validate(length(min = 1))]
    pub delivery_service: String,
    pub shardkey: String,
    #[validate(range(min = 0))]
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Delivery {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub phone: String,
    pub zip: String,
    #[validate(length(min = 1))]
    pub city: String,
    #[validate(length(min = 1))]
    pub address: String,
    pub region: String,
    #[validate(email)]
    pub email: String,
}

/// Monetary fields are integer amounts in the currency's minor unit.
#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Payment {
    #[validate(length(min = 1))]
    pub transaction: String,
    pub request_id: String,
    #[validate(length(min = 3, max = 3))]
    pub currency: String,
    #[validate(length(min = 1))]
    pub provider: String,
    #[validate(range(min = 0))]
    pub amount: i64,
    /// Unix seconds.
    #[validate(range(min = 0))]
    pub payment_dt: i64,
    pub bank: String,
    #[validate(range(min = 0))]
    pub delivery_cost: i64,
    #[validate(range(min = 0))]
    pub goods_total: i64,
    #[validate(range(min = 0))]
    pub custom_fee: i64,
}

#[derive(Serialize, Deserialize, Validate, Clone, Debug, PartialEq)]
pub struct Item {
    #[validate(range(min = 0))]
    pub chrt_id: i64,
    #[validate(length(min = 1))]
    pub track_number: String,
    #[validate(range(min = 0))]
    pub price: i64,
    #[validate(length(min = 1))]
    pub rid: String,
    #[validate(length(min = 1))]
    pub name: String,
    /// Discount percentage.
    #[validate(range(min = 0, max = 100))]
    pub sale: i32,
    pub size: String,
    #[validate(range(min = 0))]
    pub total_price: i64,
    #[validate(range(min = 0))]
    pub nm_id: i64,
    pub brand: String,
    #[validate(range(min = 0, max = 599))]
    pub status: i32,
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{
        "order_uid": "b563feb7b2b84b6test",
        "track_number": "WBILMTESTTRACK",
        "entry": "WBIL",
        "delivery": {
            "name": "Test Testov",
            "phone": "+9720000000",
            "zip": "2639809",
            "city": "Kiryat Mozkin",
            "address": "Ploshad Mira 15",
            "region": "Kraiot",
            "email": "test@gmail.com"
        },
        "payment": {
            "transaction": "b563feb7b2b84b6test",
            "request_id": "",
            "currency": "USD",
            "provider": "wbpay",
            "amount": 1817,
            "payment_dt": 1637907727,
            "bank": "alpha",
            "delivery_cost": 1500,
            "goods_total": 317,
            "custom_fee": 0
        },
        "items": [
            {
                "chrt_id": 9934930,
                "track_number": "WBILMTESTTRACK",
                "price": 453,
                "rid": "ab4219087a764ae0btest",
                "name": "Mascaras",
                "sale": 30,
                "size": "0",
                "total_price": 317,
                "nm_id": 2389212,
                "brand": "Vivienne Sabo",
                "status": 202
            }
        ],
        "locale": "en",
        "internal_signature": "",
        "customer_id": "test",
        "delivery_service": "meest",
        "shardkey": "9",
        "sm_id": 99,
        "date_created": "2021-11-26T06:22:19Z",
        "oof_shard": "1"
    }"#;

    #[test]
    fn test_order_decodes_from_wire_payload() {
        let order: Order = serde_json::from_str(PAYLOAD).unwrap();

        assert_eq!(order.order_uid, "b563feb7b2b84b6test");
        assert_eq!(order.delivery.city, "Kiryat Mozkin");
        assert_eq!(order.payment.delivery_cost, 1500);
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].sale, 30);
        assert_eq!(order.date_created.to_rfc3339(), "2021-11-26T06:22:19+00:00");
    }

    #[test]
    fn test_order_reencodes_with_wire_field_names() {
        let order: Order = serde_json::from_str(PAYLOAD).unwrap();
        let value = serde_json::to_value(&order).unwrap();

        assert_eq!(value["payment"]["goods_total"], 317);
        assert_eq!(value["items"][0]["nm_id"], 2389212);
        assert_eq!(value["shardkey"], "9");
    }

    #[test]
    fn test_missing_sub_record_is_a_decode_error() {
        let mut value: serde_json::Value = serde_json::from_str(PAYLOAD).unwrap();
        value.as_object_mut().unwrap().remove("payment");

        assert!(serde_json::from_value::<Order>(value).is_err());
    }
}
