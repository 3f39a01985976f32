//! Store state and the customer upsert transaction.
//!
//! [`AppStoreState`] owns the redb database with two tables: `customers`
//! (id to converted document JSON) and `meta` (the shared `statistics`
//! aggregate). Every mutation adjusts the statistics inside the same write
//! transaction that writes the customer document; redb serializes writers
//! and commits atomically, so the counter can never drift from the flags
//! actually stored.

use std::os::raw::c_char;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use serde_json::{Map as JsonMap, Value as JsonValue};
use uuid::Uuid;

use crate::app_response::AppResponse;
use crate::customer_model::{
    CustomerDocument, FieldValue, Statistics, FIELD_CREATED_AT, FIELD_DATE, FIELD_MADE_A_PURCHASE,
    FIELD_UPDATED_AT,
};
use crate::document_converter;

const CUSTOMERS: TableDefinition<&str, &str> = TableDefinition::new("customers");
const META: TableDefinition<&str, &str> = TableDefinition::new("meta");
const STATISTICS_KEY: &str = "statistics";

/// Callback invoked with a serialized list envelope on every list change.
pub type CustomerListCallback = extern "C" fn(*const c_char);

pub struct AppStoreState {
    pub db: Database,
    path: String,
    subscribers: Mutex<Vec<(u64, CustomerListCallback)>>,
    next_subscription: AtomicU64,
}

fn purchase_flag(document: &CustomerDocument) -> bool {
    document
        .get(FIELD_MADE_A_PURCHASE)
        .and_then(FieldValue::as_bool)
        .unwrap_or(false)
}

fn parse_stored_document(raw: &str) -> Result<JsonMap<String, JsonValue>, AppResponse> {
    let value: JsonValue = serde_json::from_str(raw)?;
    match value {
        JsonValue::Object(map) => Ok(map),
        _ => Err(AppResponse::DatabaseError(
            "Stored customer is not a JSON object".to_string(),
        )),
    }
}

impl AppStoreState {
    /// Open or create the database file and seed the statistics document.
    pub fn init(path: String) -> Result<Self, AppResponse> {
        let db = Database::create(&path)?;

        let txn = db.begin_write()?;
        {
            // Opening the table creates it on first run.
            let _customers = txn.open_table(CUSTOMERS)?;
            let mut meta = txn.open_table(META)?;
            let seeded = meta.get(STATISTICS_KEY)?.is_some();
            if !seeded {
                let zero = serde_json::to_string(&Statistics::zero())?;
                meta.insert(STATISTICS_KEY, zero.as_str())?;
            }
        }
        txn.commit()?;

        Ok(Self {
            db,
            path,
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Create or update one customer. An absent or empty id means create.
    pub fn upsert_customer(
        &self,
        id: Option<&str>,
        document: CustomerDocument,
    ) -> Result<String, AppResponse> {
        match id {
            Some(id) if !id.is_empty() => self.update_customer(id, document),
            _ => self.create_customer(document),
        }
    }

    /// Insert a new customer document and bump the aggregate counters, all
    /// inside one committed transaction.
    pub fn create_customer(&self, mut document: CustomerDocument) -> Result<String, AppResponse> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        document.insert(FIELD_CREATED_AT.to_string(), FieldValue::Instant(now));
        document.insert(FIELD_UPDATED_AT.to_string(), FieldValue::Instant(now));

        let made_a_purchase = purchase_flag(&document);
        let raw = JsonValue::Object(document_converter::outbound(&document));
        let encoded = serde_json::to_string(&raw)?;

        let txn = self.db.begin_write()?;
        {
            let mut customers = txn.open_table(CUSTOMERS)?;
            customers.insert(id.as_str(), encoded.as_str())?;

            let mut meta = txn.open_table(META)?;
            let mut stats: Statistics = match meta.get(STATISTICS_KEY)? {
                Some(guard) => serde_json::from_str(guard.value())?,
                None => Statistics::zero(),
            };
            stats.total = stats.total.saturating_add(1);
            if made_a_purchase {
                stats.made_a_purchase = stats.made_a_purchase.saturating_add(1);
            }
            let updated = serde_json::to_string(&stats)?;
            meta.insert(STATISTICS_KEY, updated.as_str())?;
        }
        txn.commit()?;

        Ok(id)
    }

    /// Merge the supplied fields over an existing customer document and
    /// apply the purchase-flag delta to the aggregate counter. Fails with
    /// NotFound, before any write, if the id does not exist; the read of the
    /// stored flag is what makes the delta correct, not an optimization.
    pub fn update_customer(
        &self,
        id: &str,
        document: CustomerDocument,
    ) -> Result<String, AppResponse> {
        let now = Utc::now();

        let txn = self.db.begin_write()?;
        {
            let mut customers = txn.open_table(CUSTOMERS)?;
            let stored = match customers.get(id)? {
                Some(guard) => parse_stored_document(guard.value())?,
                // Dropping the transaction without commit aborts it.
                None => {
                    return Err(AppResponse::NotFound("Customer does not exist.".to_string()))
                }
            };

            let mut merged = document_converter::inbound(&stored);
            let previous_flag = purchase_flag(&merged);
            for (key, value) in document {
                merged.insert(key, value);
            }
            merged.insert(FIELD_UPDATED_AT.to_string(), FieldValue::Instant(now));
            let current_flag = purchase_flag(&merged);

            let raw = JsonValue::Object(document_converter::outbound(&merged));
            let encoded = serde_json::to_string(&raw)?;
            customers.insert(id, encoded.as_str())?;

            let delta = match (previous_flag, current_flag) {
                (false, true) => 1,
                (true, false) => -1,
                _ => 0,
            };
            if delta != 0 {
                let mut meta = txn.open_table(META)?;
                let mut stats: Statistics = match meta.get(STATISTICS_KEY)? {
                    Some(guard) => serde_json::from_str(guard.value())?,
                    None => Statistics::zero(),
                };
                stats.apply_purchase_delta(delta);
                let updated = serde_json::to_string(&stats)?;
                meta.insert(STATISTICS_KEY, updated.as_str())?;
            }
        }
        txn.commit()?;

        Ok(id.to_string())
    }

    /// Fetch one hydrated customer document.
    pub fn get_customer(&self, id: &str) -> Result<Option<CustomerDocument>, AppResponse> {
        let txn = self.db.begin_read()?;
        let customers = txn.open_table(CUSTOMERS)?;
        match customers.get(id)? {
            Some(guard) => {
                let stored = parse_stored_document(guard.value())?;
                Ok(Some(document_converter::inbound(&stored)))
            }
            None => Ok(None),
        }
    }

    /// All customers, hydrated and ordered by their `date` instant (id as a
    /// tiebreaker so the order is stable).
    pub fn list_customers(&self) -> Result<Vec<(String, CustomerDocument)>, AppResponse> {
        let txn = self.db.begin_read()?;
        let customers = txn.open_table(CUSTOMERS)?;

        let mut entries = Vec::new();
        for item in customers.iter()? {
            let (key, value) = item?;
            let stored = parse_stored_document(value.value())?;
            entries.push((key.value().to_string(), document_converter::inbound(&stored)));
        }

        entries.sort_by(|a, b| {
            let date_a = a.1.get(FIELD_DATE).and_then(FieldValue::as_instant);
            let date_b = b.1.get(FIELD_DATE).and_then(FieldValue::as_instant);
            date_a.cmp(&date_b).then_with(|| a.0.cmp(&b.0))
        });

        Ok(entries)
    }

    /// The current aggregate document.
    pub fn statistics(&self) -> Result<Statistics, AppResponse> {
        let txn = self.db.begin_read()?;
        let meta = txn.open_table(META)?;
        match meta.get(STATISTICS_KEY)? {
            Some(guard) => Ok(serde_json::from_str(guard.value())?),
            None => Ok(Statistics::zero()),
        }
    }

    /// Register a live-list subscriber; returns its subscription id.
    pub fn add_subscriber(&self, callback: CustomerListCallback) -> Result<u64, AppResponse> {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        let mut subscribers = self.subscribers.lock().map_err(|_| {
            AppResponse::DatabaseError("Subscriber registry lock poisoned".to_string())
        })?;
        subscribers.push((id, callback));
        Ok(id)
    }

    /// Drop one subscriber. Returns whether the id was registered.
    pub fn remove_subscriber(&self, subscription_id: u64) -> Result<bool, AppResponse> {
        let mut subscribers = self.subscribers.lock().map_err(|_| {
            AppResponse::DatabaseError("Subscriber registry lock poisoned".to_string())
        })?;
        let before = subscribers.len();
        subscribers.retain(|(id, _)| *id != subscription_id);
        Ok(subscribers.len() != before)
    }

    /// Snapshot of the registered callbacks, taken outside any transaction.
    pub fn subscriber_callbacks(&self) -> Result<Vec<CustomerListCallback>, AppResponse> {
        let subscribers = self.subscribers.lock().map_err(|_| {
            AppResponse::DatabaseError("Subscriber registry lock poisoned".to_string())
        })?;
        Ok(subscribers.iter().map(|(_, cb)| *cb).collect())
    }
}
