//! Bidirectional date conversion applied on every document read and write.
//!
//! Stored documents encode instants as `{"seconds": i64, "nanos": u32}`; in
//! memory they are [`FieldValue::Instant`] values. The two transforms here
//! are pure, visit top-level fields only, and leave every non-instant field
//! untouched, so `inbound(outbound(d)) == d` for any document.

use chrono::{DateTime, Utc};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::customer_model::{CustomerDocument, FieldValue};

const TS_SECONDS: &str = "seconds";
const TS_NANOS: &str = "nanos";

/// Encode an instant into the store's timestamp representation.
fn encode_instant(instant: DateTime<Utc>) -> JsonValue {
    let mut obj = JsonMap::new();
    obj.insert(TS_SECONDS.to_string(), JsonValue::from(instant.timestamp()));
    obj.insert(
        TS_NANOS.to_string(),
        JsonValue::from(instant.timestamp_subsec_nanos()),
    );
    JsonValue::Object(obj)
}

/// Decode the timestamp representation back into an instant. Anything that
/// does not have exactly the `{seconds, nanos}` shape is not a timestamp.
fn decode_instant(value: &JsonValue) -> Option<DateTime<Utc>> {
    let obj = value.as_object()?;
    if obj.len() != 2 {
        return None;
    }
    let seconds = obj.get(TS_SECONDS)?.as_i64()?;
    let nanos = u32::try_from(obj.get(TS_NANOS)?.as_u64()?).ok()?;
    DateTime::from_timestamp(seconds, nanos)
}

/// Read transform: hydrate a raw stored document. Every field carrying the
/// timestamp shape becomes an instant; all other fields pass through.
pub fn inbound(stored: &JsonMap<String, JsonValue>) -> CustomerDocument {
    stored
        .iter()
        .map(|(key, value)| {
            let field = match decode_instant(value) {
                Some(instant) => FieldValue::Instant(instant),
                None => FieldValue::from_json(value),
            };
            (key.clone(), field)
        })
        .collect()
}

/// Write transform: produce the raw document to store. Every instant field
/// becomes the timestamp encoding; all other fields pass through.
pub fn outbound(document: &CustomerDocument) -> JsonMap<String, JsonValue> {
    document
        .iter()
        .map(|(key, value)| {
            let raw = match value {
                FieldValue::Instant(instant) => encode_instant(*instant),
                other => other.to_json(),
            };
            (key.clone(), raw)
        })
        .collect()
}
