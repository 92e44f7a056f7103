//! Order normalization.
//!
//! The search and completion endpoints disagree on field naming (camelCase
//! vs snake_case) and on nesting (fields live at the top level, under
//! `data`, or under `orders[0].data`). Every canonical field therefore has
//! an ordered list of dotted paths, tried in sequence against each source
//! payload. The first usable value wins.
//!
//! # Path syntax
//!
//! A path is a list of segments joined by `.`. Object keys are matched
//! literally; a numeric segment indexes into an array. `orders.0.data.status`
//! reads `value["orders"][0]["data"]["status"]`. A `null` anywhere along the
//! path counts as absent.
//!
//! # Source order
//!
//! For a [`MergedOrder`], identity fields (order number, date, location,
//! driver, service notes) are looked up in the search payload first and the
//! completion payload second. Proof-of-service fields (status, technician
//! notes, images, signature, tracking URL) are looked up in the completion
//! payload first.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | location name, driver name | `"N/A"` |
//! | optional text fields | `None` |
//! | `service_date` | the time of extraction |
//! | `id` | record id, else order number, else `order-<hash>` |
//!
//! Extraction never mutates or consumes its input and performs no I/O.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{
    CanonicalOrder, CompletionRecord, Driver, Location, MergedOrder, QcStatus, SearchRecord,
};

/// Placeholder for names that could not be found.
pub const NOT_AVAILABLE: &str = "N/A";

const ORDER_NO: &[&str] = &[
    "orderNo",
    "order_no",
    "orderNumber",
    "order_number",
    "data.orderNo",
    "data.order_no",
    "orders.0.data.orderNo",
    "orders.0.data.order_no",
    "orders.0.orderNo",
];
const RECORD_ID: &[&str] = &["id", "_id", "data.id", "orders.0.data.id"];
const SERVICE_DATE: &[&str] = &[
    "date",
    "serviceDate",
    "service_date",
    "data.date",
    "data.serviceDate",
    "data.service_date",
    "orders.0.data.date",
];
const SERVICE_NOTES: &[&str] = &[
    "notes",
    "serviceNotes",
    "service_notes",
    "data.notes",
    "data.serviceNotes",
    "orders.0.data.notes",
];
const TECH_NOTES: &[&str] = &[
    "form.note",
    "techNotes",
    "tech_notes",
    "data.form.note",
    "orders.0.data.form.note",
];
const LOCATION: &[&str] = &[
    "location",
    "customer",
    "data.location",
    "data.customer",
    "orders.0.data.location",
];
const LOCATION_NAME: &[&str] = &[
    "name",
    "locationName",
    "location_name",
    "companyName",
    "company_name",
];
const CUSTOMER_NAME: &[&str] = &[
    "customerName",
    "customer_name",
    "data.customerName",
    "data.customer_name",
];
const ADDRESS: &[&str] = &["address", "address1", "addressLine1", "address_line_1", "street"];
const CITY: &[&str] = &["city"];
const STATE: &[&str] = &["state", "province"];
const ZIP: &[&str] = &["zip", "zipCode", "zip_code", "postalCode", "postal_code"];
const DRIVER: &[&str] = &[
    "driver",
    "assignedDriver",
    "assigned_driver",
    "data.driver",
    "data.assignedDriver",
    "orders.0.data.driver",
];
const DRIVER_ID: &[&str] = &["id", "_id", "driverId", "driver_id"];
const DRIVER_NAME: &[&str] = &["name", "displayName", "display_name", "fullName"];
const FLAT_DRIVER_ID: &[&str] = &["driverId", "driver_id", "data.driverId"];
const FLAT_DRIVER_NAME: &[&str] = &["driverName", "driver_name", "data.driverName"];
const IMAGES: &[&str] = &[
    "form.images",
    "images",
    "data.form.images",
    "data.images",
    "orders.0.data.form.images",
];
const IMAGE_FLAG: &[&str] = &[
    "hasImages",
    "has_images",
    "data.hasImages",
    "data.form.hasImages",
    "orders.0.data.form.hasImages",
];
const BARCODES: &[&str] = &[
    "form.barcodes",
    "barcodes",
    "data.form.barcodes",
    "data.barcodes",
    "orders.0.data.form.barcodes",
];
const SIGNATURE: &[&str] = &[
    "form.signature",
    "signature",
    "signatureUrl",
    "signature_url",
    "data.form.signature",
    "orders.0.data.form.signature",
];
const TRACKING_URL: &[&str] = &[
    "trackingUrl",
    "tracking_url",
    "data.trackingUrl",
    "data.tracking_url",
    "orders.0.data.tracking_url",
];
const STATUS: &[&str] = &["status", "data.status", "orders.0.data.status"];
const START_TIME: &[&str] = &[
    "startTime.localTime",
    "start_time.local_time",
    "startTime",
    "start_time",
    "data.startTime.localTime",
    "data.start_time.local_time",
    "data.startTime",
    "data.start_time",
    "orders.0.data.startTime.localTime",
];
const END_TIME: &[&str] = &[
    "endTime.localTime",
    "end_time.local_time",
    "endTime",
    "end_time",
    "data.endTime.localTime",
    "data.end_time.local_time",
    "data.endTime",
    "data.end_time",
    "orders.0.data.endTime.localTime",
];
const COMPLETION_DATA: &[&str] = &["data", "orders.0.data"];

// ═══════════════════════════════════════════════════════════════════════
// Path lookup
// ═══════════════════════════════════════════════════════════════════════

/// Resolve a dotted path against a JSON value. `null` counts as absent.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// First value present under any of `paths`, tried in order.
pub fn first_present<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(value, path))
}

/// Scalar value as non-empty trimmed text. Objects, arrays, and booleans
/// are not text.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => trimmed(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn trimmed(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn first_text(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(value, path).and_then(as_text))
}

fn text_in(sources: &[&Value], paths: &[&str]) -> Option<String> {
    sources.iter().find_map(|source| first_text(source, paths))
}

fn object_in<'a>(sources: &[&'a Value], paths: &[&str]) -> Option<&'a Value> {
    sources.iter().copied().find_map(|source| first_present(source, paths))
}

// ═══════════════════════════════════════════════════════════════════════
// Field accessors shared with other stages
// ═══════════════════════════════════════════════════════════════════════

/// Order number of a raw payload from either endpoint.
pub fn order_number(payload: &Value) -> Option<String> {
    first_text(payload, ORDER_NO)
}

/// Lowercased completion status of a raw payload.
pub fn completion_status(payload: &Value) -> Option<String> {
    first_text(payload, STATUS).map(|s| s.to_ascii_lowercase())
}

/// The `data` section of a completion payload.
pub fn completion_data(payload: &Value) -> Option<&Value> {
    first_present(payload, COMPLETION_DATA)
}

/// Completion start time as the provider sent it.
pub fn start_time(payload: &Value) -> Option<String> {
    first_text(payload, START_TIME)
}

/// Completion end time as the provider sent it.
pub fn end_time(payload: &Value) -> Option<String> {
    first_text(payload, END_TIME)
}

// ═══════════════════════════════════════════════════════════════════════
// Canonical extraction
// ═══════════════════════════════════════════════════════════════════════

/// The two raw shapes the normalizer accepts.
#[derive(Debug, Clone, Copy)]
pub enum RawOrder<'a> {
    Search(&'a SearchRecord),
    Merged(&'a MergedOrder),
}

impl<'a> From<&'a SearchRecord> for RawOrder<'a> {
    fn from(record: &'a SearchRecord) -> Self {
        RawOrder::Search(record)
    }
}

impl<'a> From<&'a MergedOrder> for RawOrder<'a> {
    fn from(order: &'a MergedOrder) -> Self {
        RawOrder::Merged(order)
    }
}

impl<'a> RawOrder<'a> {
    fn search(&self) -> &'a Value {
        match *self {
            RawOrder::Search(record) => &record.payload,
            RawOrder::Merged(order) => &order.search.payload,
        }
    }

    fn completion(&self) -> Option<&'a CompletionRecord> {
        match *self {
            RawOrder::Search(_) => None,
            RawOrder::Merged(order) => order.completion.as_ref(),
        }
    }

    /// Sources for identity fields: search first.
    fn identity_sources(&self) -> Vec<&'a Value> {
        let mut sources = vec![self.search()];
        if let Some(completion) = self.completion() {
            sources.push(&completion.payload);
        }
        sources
    }

    /// Sources for proof-of-service fields: completion first.
    fn service_sources(&self) -> Vec<&'a Value> {
        let mut sources = Vec::with_capacity(2);
        if let Some(completion) = self.completion() {
            sources.push(&completion.payload);
        }
        sources.push(self.search());
        sources
    }

    fn completion_status(&self) -> Option<String> {
        match self {
            RawOrder::Search(record) => completion_status(&record.payload),
            RawOrder::Merged(order) => order.completion_status.clone().or_else(|| {
                order
                    .completion
                    .as_ref()
                    .and_then(|c| completion_status(&c.payload))
            }),
        }
    }
}

/// Normalize a raw order, using the current time for a missing service date.
pub fn extract_canonical<'a>(raw: impl Into<RawOrder<'a>>) -> CanonicalOrder {
    extract_canonical_at(raw, Utc::now())
}

/// Normalize a raw order with an explicit fallback time for missing dates.
pub fn extract_canonical_at<'a>(raw: impl Into<RawOrder<'a>>, now: DateTime<Utc>) -> CanonicalOrder {
    let raw = raw.into();
    let identity = raw.identity_sources();
    let service = raw.service_sources();

    let order_no = text_in(&identity, ORDER_NO);
    let id = first_text(raw.search(), RECORD_ID)
        .or_else(|| order_no.clone())
        .unwrap_or_else(|| synthetic_id(raw.search()));

    let service_date = identity
        .iter()
        .find_map(|source| {
            SERVICE_DATE
                .iter()
                .find_map(|path| lookup(source, path).and_then(parse_timestamp))
        })
        .unwrap_or(now);

    let service_notes = first_text(raw.search(), SERVICE_NOTES);
    let tech_notes = raw
        .completion()
        .and_then(|c| first_text(&c.payload, TECH_NOTES))
        .or_else(|| first_text(raw.search(), &["techNotes", "tech_notes"]));
    let notes = match (&service_notes, &tech_notes) {
        (Some(service), Some(tech)) => Some(format!("{}\n{}", service, tech)),
        (Some(only), None) | (None, Some(only)) => Some(only.clone()),
        (None, None) => None,
    };

    let completion_status = raw.completion_status();

    CanonicalOrder {
        id,
        order_no,
        status: QcStatus::from_completion(completion_status.as_deref()),
        service_date,
        service_notes,
        tech_notes,
        notes,
        location: extract_location(&identity),
        driver: extract_driver(&identity),
        has_images: has_images(&service),
        signature_url: extract_signature(&service),
        tracking_url: text_in(&service, TRACKING_URL),
        completion_status,
        raw_search: raw.search().clone(),
        raw_completion: raw.completion().map(|c| c.payload.clone()),
    }
}

fn extract_location(sources: &[&Value]) -> Location {
    let customer_name = text_in(sources, CUSTOMER_NAME);
    match object_in(sources, LOCATION) {
        Some(Value::String(address)) => Location {
            name: customer_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            address: trimmed(address),
            city: None,
            state: None,
            zip: None,
        },
        Some(location) => Location {
            name: first_text(location, LOCATION_NAME)
                .or(customer_name)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            address: first_text(location, ADDRESS),
            city: first_text(location, CITY),
            state: first_text(location, STATE),
            zip: first_text(location, ZIP),
        },
        None => Location {
            name: customer_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
            address: text_in(sources, ADDRESS),
            city: text_in(sources, CITY),
            state: text_in(sources, STATE),
            zip: text_in(sources, ZIP),
        },
    }
}

fn extract_driver(sources: &[&Value]) -> Driver {
    let flat_id = text_in(sources, FLAT_DRIVER_ID);
    let flat_name = text_in(sources, FLAT_DRIVER_NAME);
    match object_in(sources, DRIVER) {
        Some(Value::String(name)) => Driver {
            id: flat_id,
            name: trimmed(name)
                .or(flat_name)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        },
        Some(driver) => Driver {
            id: first_text(driver, DRIVER_ID).or(flat_id),
            name: first_text(driver, DRIVER_NAME)
                .or(flat_name)
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        },
        None => Driver {
            id: flat_id,
            name: flat_name.unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        },
    }
}

fn extract_signature(sources: &[&Value]) -> Option<String> {
    sources.iter().find_map(|source| {
        SIGNATURE.iter().find_map(|path| {
            let signature = lookup(source, path)?;
            match signature {
                Value::Object(_) => first_text(signature, &["url", "uri", "src"]),
                other => as_text(other),
            }
        })
    })
}

fn non_empty_images(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::String(s) => !s.trim().is_empty(),
        _ => false,
    }
}

/// True when any source carries a non-empty image list, an explicit image
/// flag, or a barcode entry with images of its own.
fn has_images(sources: &[&Value]) -> bool {
    sources.iter().any(|source| {
        let listed = IMAGES
            .iter()
            .any(|path| lookup(source, path).is_some_and(non_empty_images));
        let flagged = IMAGE_FLAG
            .iter()
            .any(|path| lookup(source, path).and_then(Value::as_bool) == Some(true));
        let scanned = BARCODES.iter().any(|path| match lookup(source, path) {
            Some(Value::Array(entries)) => entries.iter().any(barcode_has_images),
            Some(Value::Object(entries)) => entries.values().any(barcode_has_images),
            _ => false,
        });
        listed || flagged || scanned
    })
}

fn barcode_has_images(entry: &Value) -> bool {
    lookup(entry, "images").is_some_and(non_empty_images)
}

/// Parse the timestamp shapes the provider is known to send: RFC 3339,
/// plain dates, naive date-times, and epoch seconds or milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }
            ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.and_utc())
        }
        Value::Number(n) => {
            let raw = n.as_i64()?;
            // Anything past 1e12 is milliseconds.
            if raw.abs() >= 1_000_000_000_000 {
                Utc.timestamp_millis_opt(raw).single()
            } else {
                Utc.timestamp_opt(raw, 0).single()
            }
        }
        _ => None,
    }
}

fn synthetic_id(payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("order-{}", &digest[..12])
}
