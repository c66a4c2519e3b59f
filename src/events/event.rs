//! # Event
//!
//! The payload entity moved through the queue. An event's `name` is fixed at
//! construction; `metadata`, `error` and `failed_at` are bookkeeping fields
//! rewritten only by the queue and the worker pool during retry and failure
//! transitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::constants::{metadata, record};
use crate::error::{EventBusError, Result};
use crate::utils::serde::{deserialize_null_default, value_as_count};

/// Arbitrary key/value map carried by an event
pub type Payload = Map<String, Value>;

/// A named, payload-bearing event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    name: String,

    data: Payload,

    #[serde(default, deserialize_with = "deserialize_null_default")]
    metadata: Payload,

    #[serde(default)]
    error: Option<String>,

    #[serde(default)]
    created_at: Option<DateTime<Utc>>,

    #[serde(default)]
    failed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    job_id: Option<String>,

    /// Raw payload this event was claimed as, set by the queue on pop
    #[serde(skip)]
    receipt: Option<String>,
}

impl Event {
    /// Create a new event stamped with the current time.
    ///
    /// `data` is normally a JSON object. `null` becomes an empty payload and any
    /// other value is stored under the `"value"` key.
    pub fn new(name: impl Into<String>, data: impl Into<Value>) -> Self {
        let data = match data.into() {
            Value::Object(map) => map,
            Value::Null => Payload::new(),
            other => {
                let mut map = Payload::new();
                map.insert("value".to_string(), other);
                map
            }
        };

        Self {
            name: name.into(),
            data,
            metadata: Payload::new(),
            error: None,
            created_at: Some(Utc::now()),
            failed_at: None,
            job_id: None,
            receipt: None,
        }
    }

    /// Attach caller metadata
    pub fn with_metadata(mut self, metadata: Payload) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach a correlation handle
    pub fn with_job_id(mut self, job_id: impl Into<String>) -> Self {
        self.job_id = Some(job_id.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Payload {
        &self.data
    }

    pub fn metadata(&self) -> &Payload {
        &self.metadata
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failed_at
    }

    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref()
    }

    /// Number of delivery retries recorded in `metadata["retries"]` (0 if absent)
    pub fn retries(&self) -> u32 {
        self.metadata
            .get(metadata::RETRIES)
            .and_then(value_as_count)
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0)
    }

    pub(crate) fn set_retries(&mut self, retries: u32) {
        self.metadata
            .insert(metadata::RETRIES.to_string(), Value::from(retries));
    }

    pub(crate) fn mark_failed(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.error = Some(error.into());
        self.failed_at = Some(at);
    }

    pub(crate) fn assign_job_id(&mut self, job_id: impl Into<String>) {
        self.job_id = Some(job_id.into());
    }

    /// Raw payload the queue claimed this event as, if it came from `pop_batch`
    pub fn receipt(&self) -> Option<&str> {
        self.receipt.as_deref()
    }

    pub(crate) fn set_receipt(&mut self, receipt: String) {
        self.receipt = Some(receipt);
    }

    /// Copy of this event without its receipt, for re-enqueueing
    pub(crate) fn detached(&self) -> Self {
        let mut copy = self.clone();
        copy.receipt = None;
        copy
    }

    /// Flat record form; timestamps are RFC 3339 strings or `null`
    pub fn to_record(&self) -> Payload {
        let mut map = Payload::new();
        map.insert(record::NAME.to_string(), Value::from(self.name.clone()));
        map.insert(record::DATA.to_string(), Value::Object(self.data.clone()));
        map.insert(
            record::METADATA.to_string(),
            Value::Object(self.metadata.clone()),
        );
        map.insert(
            record::ERROR.to_string(),
            self.error.clone().map(Value::from).unwrap_or(Value::Null),
        );
        map.insert(
            record::CREATED_AT.to_string(),
            timestamp_value(self.created_at),
        );
        map.insert(record::FAILED_AT.to_string(), timestamp_value(self.failed_at));
        if let Some(job_id) = &self.job_id {
            map.insert(record::JOB_ID.to_string(), Value::from(job_id.clone()));
        }
        map
    }

    /// Rebuild an event from its record form
    pub fn from_record(map: &Payload) -> Result<Self> {
        match map.get(record::NAME) {
            Some(Value::String(name)) if !name.is_empty() => {}
            Some(Value::String(_)) => {
                return Err(EventBusError::serialization("event name is empty"));
            }
            Some(_) => {
                return Err(EventBusError::serialization("event name is not a string"));
            }
            None => return Err(EventBusError::serialization("missing field 'name'")),
        }

        match map.get(record::DATA) {
            Some(Value::Object(_)) => {}
            Some(_) => {
                return Err(EventBusError::serialization(
                    "field 'data' is not an object",
                ));
            }
            None => return Err(EventBusError::serialization("missing field 'data'")),
        }

        if let Some(value) = map.get(record::METADATA) {
            if !(value.is_object() || value.is_null()) {
                return Err(EventBusError::serialization(
                    "field 'metadata' is not an object",
                ));
            }
        }

        serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
            EventBusError::serialization(format!("malformed event record: {e}"))
        })
    }

    /// JSON string form stored in the broker
    pub fn to_payload(&self) -> Result<String> {
        serde_json::to_string(&Value::Object(self.to_record())).map_err(Into::into)
    }

    /// Parse a JSON string produced by [`Event::to_payload`] or another producer
    pub fn from_payload(payload: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(payload)? {
            Value::Object(map) => Self::from_record(&map),
            _ => Err(EventBusError::serialization(
                "event payload is not a JSON object",
            )),
        }
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.data == other.data
            && self.metadata == other.metadata
            && self.error == other.error
            && self.created_at == other.created_at
            && self.failed_at == other.failed_at
            && self.job_id == other.job_id
    }
}

fn timestamp_value(ts: Option<DateTime<Utc>>) -> Value {
    ts.map(|t| Value::from(t.to_rfc3339()))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_event_defaults() {
        let event = Event::new("user.created", json!({"id": "1"}));
        assert_eq!(event.name(), "user.created");
        assert_eq!(event.data().get("id"), Some(&json!("1")));
        assert!(event.metadata().is_empty());
        assert!(event.error().is_none());
        assert!(event.created_at().is_some());
        assert!(event.failed_at().is_none());
        assert_eq!(event.retries(), 0);
    }

    #[test]
    fn test_non_object_data_is_wrapped() {
        let event = Event::new("counter.tick", 5);
        assert_eq!(event.data().get("value"), Some(&json!(5)));

        let event = Event::new("counter.reset", Value::Null);
        assert!(event.data().is_empty());
    }

    #[test]
    fn test_record_round_trip_preserves_every_field() {
        let mut event = Event::new("order.shipped", json!({"order": 42, "items": ["a", "b"]}))
            .with_job_id("job-7");
        event.set_retries(2);
        event.mark_failed("carrier rejected", Utc::now());

        let restored = Event::from_record(&event.to_record()).unwrap();
        assert_eq!(restored, event);
        assert_eq!(restored.retries(), 2);
        assert_eq!(restored.error(), Some("carrier rejected"));
        assert_eq!(restored.failed_at(), event.failed_at());
    }

    #[test]
    fn test_record_round_trip_with_absent_timestamps() {
        let mut record = Event::new("x", json!({})).to_record();
        record.insert("created_at".to_string(), Value::Null);

        let restored = Event::from_record(&record).unwrap();
        assert!(restored.created_at().is_none());
        assert!(restored.failed_at().is_none());
        assert_eq!(restored.to_record(), record);
    }

    #[test]
    fn test_record_shape() {
        let record = Event::new("user.created", json!({"id": "1"})).to_record();
        assert_eq!(record["name"], json!("user.created"));
        assert_eq!(record["error"], Value::Null);
        assert_eq!(record["failed_at"], Value::Null);
        assert!(record["created_at"].is_string());
        assert!(!record.contains_key("job_id"));
    }

    #[test]
    fn test_from_record_rejects_missing_name_or_data() {
        let mut record = Event::new("a.b", json!({})).to_record();
        record.remove("name");
        assert!(matches!(
            Event::from_record(&record),
            Err(EventBusError::Serialization { .. })
        ));

        let mut record = Event::new("a.b", json!({})).to_record();
        record.remove("data");
        assert!(matches!(
            Event::from_record(&record),
            Err(EventBusError::Serialization { .. })
        ));

        let mut record = Event::new("a.b", json!({})).to_record();
        record.insert("name".to_string(), json!(""));
        assert!(Event::from_record(&record).is_err());
    }

    #[test]
    fn test_from_record_rejects_malformed_timestamp() {
        let mut record = Event::new("a.b", json!({})).to_record();
        record.insert("created_at".to_string(), json!("yesterday-ish"));
        assert!(matches!(
            Event::from_record(&record),
            Err(EventBusError::Serialization { .. })
        ));
    }

    #[test]
    fn test_null_metadata_accepted() {
        let mut record = Event::new("a.b", json!({})).to_record();
        record.insert("metadata".to_string(), Value::Null);
        let restored = Event::from_record(&record).unwrap();
        assert!(restored.metadata().is_empty());
    }

    #[test]
    fn test_from_payload_rejects_garbage() {
        assert!(Event::from_payload("not json").is_err());
        assert!(Event::from_payload("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_retries_read_leniently() {
        let mut meta = Payload::new();
        meta.insert("retries".to_string(), json!("2"));
        let event = Event::new("a.b", json!({})).with_metadata(meta);
        assert_eq!(event.retries(), 2);
    }

    #[test]
    fn test_receipt_not_part_of_equality() {
        let event = Event::new("a.b", json!({}));
        let mut claimed = event.clone();
        claimed.set_receipt("raw".to_string());
        assert_eq!(event, claimed);
        assert!(claimed.detached().receipt().is_none());
    }
}
