//! Inbound gateway events: signature verification over the raw body and
//! decoding into the closed set of events the reconciler acts on.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;
use stripe::{Event, EventObject, EventType, Webhook, WebhookError};

use crate::error::{AppError, Result};

pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Event types the reconciler acts on. Anything else is acknowledged and ignored.
const HANDLED_TYPES: [EventType; 4] = [
    EventType::PaymentIntentSucceeded,
    EventType::PaymentIntentPaymentFailed,
    EventType::AccountUpdated,
    EventType::ChargeRefunded,
];

/// Verifies `Stripe-Signature` headers against the endpoint secret.
pub struct WebhookVerifier {
    secret: String,
}

impl WebhookVerifier {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn construct_event(&self, payload: &[u8], signature: &str) -> Result<WebhookEvent> {
        self.construct_event_at(payload, signature, Utc::now().timestamp())
    }

    /// Same as [`construct_event`](Self::construct_event) with an explicit clock.
    pub fn construct_event_at(&self, payload: &[u8], signature: &str, now: i64) -> Result<WebhookEvent> {
        let payload = std::str::from_utf8(payload).map_err(|_| AppError::InvalidSignature)?;

        match Webhook::construct_event_with_timestamp(payload, signature, &self.secret, now) {
            Ok(event) => Ok(WebhookEvent::typed(event)),
            // The signature and timestamp are checked before the body is parsed.
            Err(WebhookError::BadParse(err)) => WebhookEvent::untyped(payload, err.to_string()),
            Err(WebhookError::BadSignature) => Err(AppError::InvalidSignature),
            Err(err) => {
                tracing::warn!(error = %err, "Webhook signature header rejected");
                Err(AppError::InvalidSignature)
            }
        }
    }
}

#[derive(Debug, Clone)]
enum EventBody {
    Typed(Box<Event>),
    /// Authentic, but the object did not match the gateway's schema.
    Untyped { parse_error: String },
}

/// A verified event. Decoding into a [`GatewayEvent`] happens in
/// [`WebhookEvent::kind`] so an unexpected object is a processing error,
/// not a trust failure.
#[derive(Debug, Clone)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: String,
    body: EventBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    PaymentSucceeded {
        payment_intent_id: String,
        amount: i64,
        metadata: HashMap<String, String>,
    },
    PaymentFailed {
        payment_intent_id: String,
        reason: Option<String>,
    },
    AccountUpdated {
        account_id: String,
        charges_enabled: bool,
        payouts_enabled: bool,
    },
    ChargeRefunded {
        charge_id: String,
        payment_intent_id: Option<String>,
        /// Cumulative amount refunded on the charge so far.
        amount_refunded: i64,
        refund_id: Option<String>,
    },
    Unhandled(String),
}

fn type_name(event_type: EventType) -> String {
    match serde_json::to_value(event_type) {
        Ok(Value::String(name)) => name,
        _ => format!("{:?}", event_type),
    }
}

impl WebhookEvent {
    fn typed(event: Event) -> Self {
        Self {
            id: event.id.to_string(),
            event_type: type_name(event.type_),
            body: EventBody::Typed(Box::new(event)),
        }
    }

    fn untyped(payload: &str, parse_error: String) -> Result<Self> {
        let envelope: Value = serde_json::from_str(payload)
            .map_err(|e| AppError::InvalidInput(format!("Malformed webhook payload: {}", e)))?;
        let field = |name: &str| envelope.get(name).and_then(Value::as_str).map(str::to_string);

        let id = field("id")
            .ok_or_else(|| AppError::InvalidInput("Webhook payload has no event id".to_string()))?;
        let event_type = field("type").unwrap_or_else(|| "unknown".to_string());

        tracing::debug!(event_id = %id, event_type = %event_type, error = %parse_error, "Webhook object not decoded");

        Ok(Self {
            id,
            event_type,
            body: EventBody::Untyped { parse_error },
        })
    }

    fn is_handled_type(&self) -> bool {
        HANDLED_TYPES.iter().any(|t| type_name(*t) == self.event_type)
    }

    pub fn kind(&self) -> Result<GatewayEvent> {
        let event = match &self.body {
            EventBody::Typed(event) => event,
            EventBody::Untyped { parse_error } if self.is_handled_type() => {
                return Err(AppError::InvalidInput(format!(
                    "Unexpected {} object: {}",
                    self.event_type, parse_error
                )));
            }
            EventBody::Untyped { .. } => return Ok(GatewayEvent::Unhandled(self.event_type.clone())),
        };

        let decoded = match (event.type_, &event.data.object) {
            (EventType::PaymentIntentSucceeded, EventObject::PaymentIntent(intent)) => {
                GatewayEvent::PaymentSucceeded {
                    payment_intent_id: intent.id.to_string(),
                    amount: if intent.amount_received > 0 {
                        intent.amount_received
                    } else {
                        intent.amount
                    },
                    metadata: intent.metadata.clone(),
                }
            }
            (EventType::PaymentIntentPaymentFailed, EventObject::PaymentIntent(intent)) => {
                GatewayEvent::PaymentFailed {
                    payment_intent_id: intent.id.to_string(),
                    reason: intent
                        .last_payment_error
                        .as_ref()
                        .and_then(|e| e.message.clone().or_else(|| e.decline_code.clone())),
                }
            }
            (EventType::AccountUpdated, EventObject::Account(account)) => GatewayEvent::AccountUpdated {
                account_id: account.id.to_string(),
                charges_enabled: account.charges_enabled.unwrap_or(false),
                payouts_enabled: account.payouts_enabled.unwrap_or(false),
            },
            (EventType::ChargeRefunded, EventObject::Charge(charge)) => GatewayEvent::ChargeRefunded {
                charge_id: charge.id.to_string(),
                payment_intent_id: charge.payment_intent.as_ref().map(|intent| intent.id().to_string()),
                amount_refunded: charge.amount_refunded,
                refund_id: charge
                    .refunds
                    .as_ref()
                    .and_then(|refunds| refunds.data.first())
                    .map(|refund| refund.id.to_string()),
            },
            (event_type, _) if HANDLED_TYPES.contains(&event_type) => {
                return Err(AppError::InvalidInput(format!(
                    "Unexpected object for {}",
                    self.event_type
                )));
            }
            _ => GatewayEvent::Unhandled(self.event_type.clone()),
        };

        Ok(decoded)
    }
}
