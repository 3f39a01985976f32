//! Data model definitions for customer storage.
//!
//! This module defines the document representation shared by the store, the
//! converter and the FFI ports. The key decision is [`FieldValue`]: instead of
//! probing values at runtime for a "convert to date" capability, instants are
//! tagged at the type level and everything else is carried opaquely, so the
//! converter can visit a document generically without knowing the customer
//! schema.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Wire name of the user-entered calendar date field.
pub const FIELD_DATE: &str = "date";
/// Wire name of the purchase flag whose changes drive the statistics counter.
pub const FIELD_MADE_A_PURCHASE: &str = "madeAPurchase";
/// Wire name of the store-assigned creation instant.
pub const FIELD_CREATED_AT: &str = "createdAt";
/// Wire name of the store-assigned last-update instant.
pub const FIELD_UPDATED_AT: &str = "updatedAt";

/// One field of an in-memory customer document.
///
/// Scalars map one-to-one onto their JSON counterparts; arrays and objects
/// pass through untouched as [`FieldValue::Json`]. [`FieldValue::Instant`] is
/// the only variant the date converter acts on.
///
/// # Examples
///
/// ```rust
/// use customer_store_core::customer_model::FieldValue;
/// use serde_json::json;
///
/// let name = FieldValue::from_json(&json!("Ada"));
/// assert_eq!(name, FieldValue::Text("Ada".to_string()));
///
/// let nested = FieldValue::from_json(&json!({"city": "Berlin"}));
/// assert_eq!(nested.to_json(), json!({"city": "Berlin"}));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    /// A timezone-independent point in time.
    Instant(DateTime<Utc>),
    /// Arrays, objects and numbers outside the i64/f64 range, carried opaquely.
    Json(JsonValue),
}

impl FieldValue {
    /// Map a plain JSON value into a field value. No instant detection
    /// happens here; that is the inbound converter's job.
    pub fn from_json(value: &JsonValue) -> Self {
        match value {
            JsonValue::Null => FieldValue::Null,
            JsonValue::Bool(b) => FieldValue::Boolean(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Integer(i)
                } else if n.is_f64() {
                    FieldValue::Float(n.as_f64().unwrap_or(0.0))
                } else {
                    FieldValue::Json(JsonValue::Number(n.clone()))
                }
            }
            JsonValue::String(s) => FieldValue::Text(s.clone()),
            other => FieldValue::Json(other.clone()),
        }
    }

    /// Map back to plain JSON. Instants render as RFC 3339 text, the form the
    /// UI consumes; the converter encodes them differently for storage.
    pub fn to_json(&self) -> JsonValue {
        match self {
            FieldValue::Null => JsonValue::Null,
            FieldValue::Boolean(b) => JsonValue::Bool(*b),
            FieldValue::Integer(i) => JsonValue::from(*i),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            FieldValue::Text(s) => JsonValue::String(s.clone()),
            FieldValue::Instant(dt) => {
                JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
            }
            FieldValue::Json(v) => v.clone(),
        }
    }

    /// The boolean payload, if this field holds one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The instant payload, if this field holds one.
    pub fn as_instant(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Instant(dt) => Some(*dt),
            _ => None,
        }
    }
}

/// An in-memory customer document: field name to tagged value. The schema is
/// open; the store only interprets `date`, `madeAPurchase` and the two
/// store-assigned instants.
pub type CustomerDocument = BTreeMap<String, FieldValue>;

/// Incoming `saveCustomer` port payload: an optional id plus an arbitrary
/// field map. The `date` and `madeAPurchase` fields are required and
/// validated before any database call.
#[derive(Debug, Deserialize)]
pub struct SaveCustomerRequest {
    /// Absent for not-yet-created records; the store assigns one.
    pub id: Option<String>,
    /// Everything else the UI sent, passed through opaquely.
    #[serde(flatten)]
    pub fields: serde_json::Map<String, JsonValue>,
}

/// The shared aggregate document, stored under `meta/statistics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Count of all customer documents ever created.
    pub total: u64,
    /// Count of customer documents whose flag is currently true. Kept in
    /// sync incrementally, inside the same transaction as every customer
    /// write.
    pub made_a_purchase: u64,
}

impl Statistics {
    pub fn zero() -> Self {
        Statistics {
            total: 0,
            made_a_purchase: 0,
        }
    }

    /// Apply the signed flag delta computed by the update path.
    pub fn apply_purchase_delta(&mut self, delta: i64) {
        if delta >= 0 {
            self.made_a_purchase = self.made_a_purchase.saturating_add(delta as u64);
        } else {
            self.made_a_purchase = self.made_a_purchase.saturating_sub(delta.unsigned_abs());
        }
    }
}

/// The `{"message": ...}` payload carried inside success and error envelopes
/// on the save path.
#[derive(Debug, Serialize, Deserialize)]
pub struct PortMessage {
    pub message: String,
}

/// Render a stored document for the UI: `id` first, instants as RFC 3339
/// text, everything else as plain JSON.
pub fn customer_to_port_json(id: &str, document: &CustomerDocument) -> JsonValue {
    let mut obj = serde_json::Map::new();
    obj.insert("id".to_string(), JsonValue::String(id.to_string()));
    for (key, value) in document {
        obj.insert(key.clone(), value.to_json());
    }
    JsonValue::Object(obj)
}
