//! # Customer Store Core
//!
//! An embedded customer record store designed for FFI (Foreign Function
//! Interface) integration with declarative UI frontends. The UI talks to the
//! store through C-compatible port functions; the store normalizes date
//! fields, persists documents to a redb-backed transactional database, keeps
//! a denormalized statistics counter consistent, and replies with JSON
//! response envelopes.
//!
//! ## Features
//!
//! - **redb-based storage**: ACID write transactions with a single
//!   serialized writer, so the statistics counter can never drift
//! - **Schema-open documents**: arbitrary customer fields pass through
//!   untouched; only date-valued fields are converted
//! - **Date normalization**: user-entered calendar dates are anchored to the
//!   caller's UTC offset and stored as absolute instants
//! - **Live list queries**: subscribers receive the ordered customer list on
//!   every change
//! - **Safe error handling**: no `unwrap()` calls in production code
//!
//! ## Quick Start
//!
//! ```no_run
//! use customer_store_core::{create_store, save_customer};
//! use std::ffi::CString;
//!
//! // Open the store
//! let name = CString::new("my_customers").unwrap();
//! let store = create_store(name.as_ptr());
//!
//! // Save a customer; the reply is a JSON envelope with the assigned id
//! let payload =
//!     CString::new(r#"{"date":"2024-03-01","madeAPurchase":true,"name":"Ada"}"#).unwrap();
//! let reply = save_customer(store, payload.as_ptr());
//! ```
//!
//! ## FFI Functions
//!
//! This library exposes C-compatible functions for cross-language
//! integration:
//!
//! - [`create_store`] / [`create_store_from_env`] - Open a store instance
//! - [`save_customer`] - Create or update one customer record
//! - [`load_customer`] - Retrieve one customer by id
//! - [`load_customer_list`] - Retrieve all customers ordered by date
//! - [`subscribe_customer_list`] / [`unsubscribe_customer_list`] - Live
//!   ordered-list query
//! - [`load_statistics`] - Retrieve the aggregate counters
//! - [`close_store`] - Explicit instance cleanup
//! - [`free_response_string`] - Release a returned response string

pub mod app_response;
pub mod customer_model;
pub mod date_sanitizer;
pub mod document_converter;
pub mod store_config;
pub mod store_state;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;

use log::{info, warn};
use serde_json::Value as JsonValue;

use crate::app_response::AppResponse;
use crate::customer_model::{
    customer_to_port_json, CustomerDocument, FieldValue, PortMessage, SaveCustomerRequest,
    FIELD_DATE, FIELD_MADE_A_PURCHASE,
};
use crate::store_config::StoreConfig;
use crate::store_state::{AppStoreState, CustomerListCallback};

/// Opens (or creates) a customer store with the specified name.
///
/// The database is a single file named `<name>.redb` in the working
/// directory. Opening also seeds the statistics document on first run.
///
/// # Parameters
///
/// * `name` - A null-terminated C string containing the store name
///
/// # Returns
///
/// Returns a pointer to the [`AppStoreState`] instance on success, or a null
/// pointer on failure. The caller is responsible for managing the returned
/// pointer's lifetime and must release it with [`close_store`].
///
/// # Safety
///
/// This function is unsafe because it:
/// - Dereferences a raw pointer without validation
/// - Returns a raw pointer that must be properly managed
/// - Requires the input string to be valid UTF-8
///
/// # Errors
///
/// Returns null pointer if:
/// - Input name pointer is null
/// - Input string contains invalid UTF-8
/// - Database initialization fails
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn create_store(name: *const c_char) -> *mut AppStoreState {
    if name.is_null() {
        warn!("Null name pointer passed to create_store");
        return std::ptr::null_mut();
    }

    let name_str = match unsafe { CStr::from_ptr(name).to_str() } {
        Ok(s) => s,
        Err(e) => {
            warn!("Invalid UTF-8 in name parameter: {e}");
            return std::ptr::null_mut();
        }
    };

    let path = format!("{name_str}.redb");
    info!("Opening customer store at: {}", path);

    match AppStoreState::init(path.clone()) {
        Ok(state) => {
            info!("✅ Customer store ready");
            Box::into_raw(Box::new(state))
        }
        Err(e) => {
            warn!("❌ Failed to open customer store: {e}");
            warn!("Attempted path: {path}");
            std::ptr::null_mut()
        }
    }
}

/// Opens the customer store described by the `CUSTOMER_STORE_*` environment
/// variables.
///
/// The configuration is loaded once per process and is immutable afterwards;
/// see [`StoreConfig`]. `CUSTOMER_STORE_PROJECT_ID` is required,
/// `CUSTOMER_STORE_DATABASE_URL` overrides the derived on-disk path.
///
/// # Returns
///
/// Returns a pointer to the [`AppStoreState`] instance, or null when the
/// configuration is incomplete or the database cannot be opened.
#[no_mangle]
pub extern "C" fn create_store_from_env() -> *mut AppStoreState {
    let config = match StoreConfig::global() {
        Ok(c) => c,
        Err(e) => {
            warn!("❌ Store configuration incomplete: {e}");
            return std::ptr::null_mut();
        }
    };

    let path = config.database_path();
    info!(
        "Opening customer store for project '{}' at: {}",
        config.project_id, path
    );

    match AppStoreState::init(path.clone()) {
        Ok(state) => {
            info!("✅ Customer store ready");
            Box::into_raw(Box::new(state))
        }
        Err(e) => {
            warn!("❌ Failed to open customer store: {e}");
            warn!("Attempted path: {path}");
            std::ptr::null_mut()
        }
    }
}

/// Creates or updates one customer record.
///
/// The request carries an optional `id` plus an arbitrary field map. Without
/// an id a new document is inserted with store-assigned creation and update
/// instants, and the statistics counters are bumped in the same transaction.
/// With an id the existing document is merged and the purchase-flag delta is
/// applied to the counter; a missing id fails with NotFound and writes
/// nothing.
///
/// The `date` field is parsed against the caller's current UTC offset before
/// any database call; `madeAPurchase` must be a boolean.
///
/// # Parameters
///
/// * `state` - Pointer to the store state instance
/// * `json_ptr` - Null-terminated C string with the request JSON
///
/// # Returns
///
/// Returns a JSON-formatted C string containing the operation result: on
/// success the payload is `{"message": "<id>"}` with the assigned or
/// existing id. The returned string must be freed with
/// [`free_response_string`].
///
/// # Safety
///
/// This function is unsafe because it dereferences raw pointers.
/// Both parameters must be valid pointers to their respective types.
///
/// # JSON Format
///
/// Expected request structure:
/// ```json
/// {
///   "id": "optional_existing_id",
///   "date": "2024-03-01",
///   "madeAPurchase": true
/// }
/// ```
/// plus any number of additional fields, which pass through opaquely.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn save_customer(state: *mut AppStoreState, json_ptr: *const c_char) -> *const c_char {
    let state = match unsafe { state.as_ref() } {
        Some(s) => s,
        None => {
            let error = AppResponse::BadRequest("Null state pointer".to_string());
            return response_to_c_string(&error);
        }
    };

    let json_str = match c_ptr_to_string(json_ptr, "JSON") {
        Ok(response) => response,
        Err(err) => return err,
    };

    let request: SaveCustomerRequest = match serde_json::from_str(&json_str) {
        Ok(r) => r,
        Err(e) => {
            let error = AppResponse::SerializationError(format!("Invalid JSON: {e}"));
            return response_to_c_string(&error);
        }
    };

    let offset_minutes = date_sanitizer::local_utc_offset_minutes();
    let document = match sanitized_document(&request.fields, offset_minutes) {
        Ok(d) => d,
        Err(e) => return response_to_c_string(&e),
    };

    match state.upsert_customer(request.id.as_deref(), document) {
        Ok(id) => {
            emit_customer_list(state);
            let payload = PortMessage { message: id };
            match serde_json::to_string(&payload) {
                Ok(json) => {
                    let success = AppResponse::Ok(json);
                    response_to_c_string(&success)
                }
                Err(e) => {
                    let error = AppResponse::SerializationError(format!(
                        "Failed to serialize result: {e}"
                    ));
                    response_to_c_string(&error)
                }
            }
        }
        Err(e) => response_to_c_string(&e),
    }
}

/// Retrieves one customer record by its id.
///
/// # Parameters
///
/// * `state` - Pointer to the store state instance
/// * `id` - Null-terminated C string containing the customer id
///
/// # Returns
///
/// Returns a JSON-formatted C string. On success the payload is the hydrated
/// document with `id` included and every instant re-serialized as RFC 3339
/// text. A missing id yields the NotFound envelope with message
/// `Customer does not exist.`
///
/// # Safety
///
/// Both parameters must be valid pointers. The id string must be valid
/// UTF-8.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn load_customer(state: *mut AppStoreState, id: *const c_char) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to load_customer".to_string());
        return response_to_c_string(&error);
    }

    if id.is_null() {
        let error = AppResponse::BadRequest("Null id pointer passed to load_customer".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { &*state };

    let id_str = match c_ptr_to_string(id, "id") {
        Ok(json) => json,
        Err(error_ptr) => return error_ptr,
    };

    match state.get_customer(&id_str) {
        Ok(Some(document)) => {
            let hydrated = customer_to_port_json(&id_str, &document);
            match serde_json::to_string(&hydrated) {
                Ok(json) => {
                    let success = AppResponse::Ok(json);
                    response_to_c_string(&success)
                }
                Err(e) => {
                    let error = AppResponse::SerializationError(format!(
                        "Error serializing customer: {e:?}"
                    ));
                    response_to_c_string(&error)
                }
            }
        }
        Ok(None) => {
            let error = AppResponse::NotFound("Customer does not exist.".to_string());
            response_to_c_string(&error)
        }
        Err(e) => response_to_c_string(&e),
    }
}

/// Retrieves all customer records, ordered by their `date` field.
///
/// This is the one-shot variant of the list query; use
/// [`subscribe_customer_list`] for the live variant.
///
/// # Parameters
///
/// * `state` - Pointer to the store state instance
///
/// # Returns
///
/// Returns a JSON-formatted C string whose success payload is the array of
/// hydrated customer documents.
///
/// # Safety
///
/// The state parameter must be a valid pointer to an [`AppStoreState`]
/// instance.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn load_customer_list(state: *mut AppStoreState) -> *const c_char {
    if state.is_null() {
        let error =
            AppResponse::BadRequest("Null state pointer passed to load_customer_list".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { &*state };
    let envelope = customer_list_envelope(state);
    response_to_c_string(&envelope)
}

/// Subscribes a callback to the live customer list.
///
/// The callback receives the serialized list envelope immediately and again
/// after every successful save. The pointer handed to the callback is only
/// valid for the duration of the call; subscribers must copy what they need.
///
/// # Parameters
///
/// * `state` - Pointer to the store state instance
/// * `callback` - Function receiving a null-terminated JSON envelope
///
/// # Returns
///
/// Returns a JSON-formatted C string; the success payload is
/// `{"message": "<subscription id>"}` for use with
/// [`unsubscribe_customer_list`].
///
/// # Safety
///
/// The state parameter must be a valid pointer and the callback must remain
/// callable until it is unsubscribed or the store is closed.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn subscribe_customer_list(
    state: *mut AppStoreState,
    callback: Option<CustomerListCallback>,
) -> *const c_char {
    let state = match unsafe { state.as_ref() } {
        Some(s) => s,
        None => {
            let error = AppResponse::BadRequest(
                "Null state pointer passed to subscribe_customer_list".to_string(),
            );
            return response_to_c_string(&error);
        }
    };

    let callback = match callback {
        Some(cb) => cb,
        None => {
            let error = AppResponse::BadRequest(
                "Null callback pointer passed to subscribe_customer_list".to_string(),
            );
            return response_to_c_string(&error);
        }
    };

    match state.add_subscriber(callback) {
        Ok(subscription_id) => {
            // Initial snapshot goes straight to the new subscriber.
            let envelope = customer_list_envelope(state);
            send_to_callback(callback, &envelope);

            let payload = PortMessage {
                message: subscription_id.to_string(),
            };
            match serde_json::to_string(&payload) {
                Ok(json) => response_to_c_string(&AppResponse::Ok(json)),
                Err(e) => {
                    let error = AppResponse::SerializationError(format!(
                        "Failed to serialize result: {e}"
                    ));
                    response_to_c_string(&error)
                }
            }
        }
        Err(e) => response_to_c_string(&e),
    }
}

/// Cancels one live-list subscription.
///
/// # Returns
///
/// Returns the Ok envelope when the subscription existed, NotFound
/// otherwise.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn unsubscribe_customer_list(
    state: *mut AppStoreState,
    subscription_id: u64,
) -> *const c_char {
    let state = match unsafe { state.as_ref() } {
        Some(s) => s,
        None => {
            let error = AppResponse::BadRequest(
                "Null state pointer passed to unsubscribe_customer_list".to_string(),
            );
            return response_to_c_string(&error);
        }
    };

    match state.remove_subscriber(subscription_id) {
        Ok(true) => {
            let success = AppResponse::Ok("Subscription removed".to_string());
            response_to_c_string(&success)
        }
        Ok(false) => {
            let error =
                AppResponse::NotFound(format!("No subscription with id: {subscription_id}"));
            response_to_c_string(&error)
        }
        Err(e) => response_to_c_string(&e),
    }
}

/// Retrieves the aggregate statistics document.
///
/// # Returns
///
/// Returns a JSON-formatted C string whose success payload carries `total`
/// and `madeAPurchase`.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn load_statistics(state: *mut AppStoreState) -> *const c_char {
    if state.is_null() {
        let error =
            AppResponse::BadRequest("Null state pointer passed to load_statistics".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { &*state };

    match state.statistics() {
        Ok(stats) => match serde_json::to_string(&stats) {
            Ok(json) => {
                let success = AppResponse::Ok(json);
                response_to_c_string(&success)
            }
            Err(e) => {
                let error =
                    AppResponse::SerializationError(format!("Error serializing statistics: {e:?}"));
                response_to_c_string(&error)
            }
        },
        Err(e) => response_to_c_string(&e),
    }
}

/// Closes the store and releases the instance.
///
/// The pointer must not be used after this call. Registered subscribers are
/// dropped with the instance.
///
/// # Safety
///
/// The state parameter must be a pointer previously returned by
/// [`create_store`] or [`create_store_from_env`], and must not be passed to
/// any other function afterwards.
#[no_mangle]
#[allow(clippy::not_unsafe_ptr_arg_deref)]
pub extern "C" fn close_store(state: *mut AppStoreState) -> *const c_char {
    if state.is_null() {
        let error = AppResponse::BadRequest("Null state pointer passed to close_store".to_string());
        return response_to_c_string(&error);
    }

    let state = unsafe { Box::from_raw(state) };
    info!("Closing customer store at: {}", state.path());
    drop(state);

    let success = AppResponse::Ok("Store closed successfully".to_string());
    response_to_c_string(&success)
}

/// Releases a response string previously returned by any port function.
///
/// Passing null is a no-op.
#[no_mangle]
pub extern "C" fn free_response_string(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    drop(unsafe { CString::from_raw(ptr) });
}

/// Validate and sanitize an incoming field map into a customer document.
///
/// `date` must be a string in the UI's calendar format and is replaced with
/// the parsed absolute instant; `madeAPurchase` must be a boolean. All other
/// fields pass through opaquely. Runs before any database call.
fn sanitized_document(
    fields: &serde_json::Map<String, JsonValue>,
    utc_offset_minutes: i32,
) -> Result<CustomerDocument, AppResponse> {
    let date_str = fields
        .get(FIELD_DATE)
        .and_then(JsonValue::as_str)
        .ok_or_else(|| {
            AppResponse::ValidationError(
                "The date field is required and must be a string".to_string(),
            )
        })?;
    let instant = date_sanitizer::sanitize_date(date_str, utc_offset_minutes)?;

    if fields
        .get(FIELD_MADE_A_PURCHASE)
        .and_then(JsonValue::as_bool)
        .is_none()
    {
        return Err(AppResponse::ValidationError(
            "The madeAPurchase field is required and must be a boolean".to_string(),
        ));
    }

    let mut document = CustomerDocument::new();
    for (key, value) in fields {
        if key == FIELD_DATE {
            continue;
        }
        document.insert(key.clone(), FieldValue::from_json(value));
    }
    document.insert(FIELD_DATE.to_string(), FieldValue::Instant(instant));
    Ok(document)
}

/// Build the list envelope: the ordered customer array on success, the
/// failure envelope otherwise.
fn customer_list_envelope(state: &AppStoreState) -> AppResponse {
    match state.list_customers() {
        Ok(list) => {
            let items: Vec<JsonValue> = list
                .iter()
                .map(|(id, document)| customer_to_port_json(id, document))
                .collect();
            match serde_json::to_string(&items) {
                Ok(json) => AppResponse::Ok(json),
                Err(e) => AppResponse::from(e),
            }
        }
        Err(e) => e,
    }
}

/// Push one envelope to one subscriber. The C string lives only for the
/// duration of the call.
fn send_to_callback(callback: CustomerListCallback, envelope: &AppResponse) {
    let json = match serde_json::to_string(envelope) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize list envelope: {e}");
            return;
        }
    };

    match CString::new(json) {
        Ok(c_str) => callback(c_str.as_ptr()),
        Err(e) => warn!("List envelope contained an interior nul byte: {e}"),
    }
}

/// Notify every registered subscriber with a fresh list snapshot. Runs after
/// the mutating transaction has committed.
fn emit_customer_list(state: &AppStoreState) {
    let callbacks = match state.subscriber_callbacks() {
        Ok(callbacks) => callbacks,
        Err(e) => {
            warn!("Could not notify subscribers: {e}");
            return;
        }
    };
    if callbacks.is_empty() {
        return;
    }

    let envelope = customer_list_envelope(state);
    for callback in callbacks {
        send_to_callback(callback, &envelope);
    }
}

/// Converts an [`AppResponse`] to a C-compatible string.
///
/// This internal helper function serializes the response to JSON format
/// and converts it to a C string that can be returned to FFI callers.
///
/// # Safety
///
/// Returns a null pointer if serialization or C string creation fails. The
/// caller frees the result with [`free_response_string`].
fn response_to_c_string(response: &AppResponse) -> *const c_char {
    let json = match serde_json::to_string(response) {
        Ok(j) => j,
        Err(e) => {
            warn!("Error serializing response: {e}");
            return std::ptr::null();
        }
    };

    match CString::new(json) {
        Ok(c_str) => c_str.into_raw(),
        Err(e) => {
            warn!("Error creating CString: {e}");
            std::ptr::null()
        }
    }
}

/// Converts a C string pointer to a Rust String with comprehensive error
/// handling.
///
/// # Parameters
///
/// * `ptr` - Pointer to the C string
/// * `field_name` - Name of the field for descriptive error messages
///
/// # Returns
///
/// * `Ok(String)` - If conversion was successful
/// * `Err(*const c_char)` - Pointer to error message in C format if
///   conversion failed
///
/// # Safety
///
/// This function safely handles null pointers and invalid UTF-8 sequences.
fn c_ptr_to_string(ptr: *const c_char, field_name: &str) -> Result<String, *const c_char> {
    if ptr.is_null() {
        let error = AppResponse::BadRequest(format!("Null {field_name} pointer"));
        return Err(response_to_c_string(&error));
    }

    match unsafe { CStr::from_ptr(ptr).to_str() } {
        Ok(s) => Ok(s.to_string()),
        Err(e) => {
            let error = AppResponse::BadRequest(format!("Invalid UTF-8 in {field_name}: {e}"));
            Err(response_to_c_string(&error))
        }
    }
}
