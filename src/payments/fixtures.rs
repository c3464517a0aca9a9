//! Gateway-shaped webhook payloads and signatures for tests.

use std::collections::HashMap;

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

/// A `Stripe-Signature` header for `payload` signed at `timestamp`.
pub fn sign_payload(secret: &str, payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(format!("{}.{}", timestamp, payload).as_bytes());
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

pub fn event_payload(id: &str, event_type: &str, object: Value, created: i64) -> String {
    json!({
        "id": id,
        "object": "event",
        "api_version": "2023-10-16",
        "created": created,
        "data": { "object": object },
        "livemode": false,
        "pending_webhooks": 1,
        "type": event_type,
    })
    .to_string()
}

fn intent(id: &str, amount: i64, received: i64, status: &str, metadata: &HashMap<String, String>) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "amount": amount,
        "amount_capturable": 0,
        "amount_received": received,
        "capture_method": "automatic",
        "confirmation_method": "automatic",
        "created": 1_700_000_000,
        "currency": "jpy",
        "livemode": false,
        "metadata": metadata,
        "payment_method_types": ["card"],
        "status": status,
    })
}

pub fn payment_intent(id: &str, amount: i64, metadata: &HashMap<String, String>) -> Value {
    intent(id, amount, amount, "succeeded", metadata)
}

pub fn failed_payment_intent(id: &str, amount: i64, message: &str) -> Value {
    let mut object = intent(id, amount, 0, "requires_payment_method", &HashMap::new());
    object["last_payment_error"] = json!({
        "type": "card_error",
        "code": "card_declined",
        "message": message,
    });
    object
}

pub fn account(id: &str, charges_enabled: bool, payouts_enabled: bool) -> Value {
    json!({
        "id": id,
        "object": "account",
        "charges_enabled": charges_enabled,
        "payouts_enabled": payouts_enabled,
    })
}

pub fn charge(id: &str, payment_intent: &str, amount: i64, amount_refunded: i64, refund_id: Option<&str>) -> Value {
    let refunds: Vec<Value> = refund_id
        .map(|refund| {
            json!({
                "id": refund,
                "object": "refund",
                "amount": amount_refunded,
                "created": 1_700_000_000,
                "currency": "jpy",
            })
        })
        .into_iter()
        .collect();

    json!({
        "id": id,
        "object": "charge",
        "amount": amount,
        "amount_captured": amount,
        "amount_refunded": amount_refunded,
        "billing_details": {},
        "captured": true,
        "created": 1_700_000_000,
        "currency": "jpy",
        "disputed": false,
        "livemode": false,
        "metadata": {},
        "paid": true,
        "payment_intent": payment_intent,
        "refunded": amount_refunded >= amount,
        "refunds": {
            "object": "list",
            "data": refunds,
            "has_more": false,
            "url": format!("/v1/charges/{}/refunds", id),
        },
        "status": "succeeded",
    })
}
