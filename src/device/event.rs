//! Typed device-event records used to capture and replay transport calls for
//! emulation. Grounded on `fu-device-event.c`.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use sha1::{Digest, Sha1};

#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    I64(i64),
    Str(String),
    Bytes(Vec<u8>),
}

/// Hashes `id` down to an 8-hex-char, `#`-prefixed short key. This is a
/// deliberate non-cryptographic shortener, not a security boundary — do not
/// swap it for a "stronger" primitive, it would just break replay lookup.
pub fn build_id(id: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(id.as_bytes());
    let digest = hasher.finalize();
    format!("#{:02x}{:02x}{:02x}{:02x}", digest[0], digest[1], digest[2], digest[3])
}

#[derive(Debug, Clone)]
pub struct DeviceEvent {
    /// compressed (`#xxxxxxxx`) or raw id, depending on how it was constructed
    pub id: String,
    pairs: IndexMap<String, EventValue>,
}

impl DeviceEvent {
    /// Creates a new event with a compressed id hashed from `key`.
    pub fn new(key: &str) -> Self { DeviceEvent { id: build_id(key), pairs: IndexMap::new() } }

    /// Creates a new event keeping the raw id, uncompressed.
    pub fn new_raw(id: &str) -> Self {
        DeviceEvent { id: id.to_string(), pairs: IndexMap::new() }
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.pairs.insert(key.to_string(), EventValue::Str(value.to_string()));
    }

    pub fn set_i64(&mut self, key: &str, value: i64) {
        self.pairs.insert(key.to_string(), EventValue::I64(value));
    }

    pub fn set_bytes(&mut self, key: &str, value: &[u8]) {
        self.pairs.insert(key.to_string(), EventValue::Bytes(value.to_vec()));
    }

    pub fn set_data(&mut self, value: &[u8]) { self.set_bytes("Data", value); }

    pub fn get_str(&self, key: &str) -> Result<String> {
        match self.pairs.get(key) {
            Some(EventValue::Str(s)) => Ok(s.clone()),
            Some(_) => Err(Error::invalid_data(format!("event key '{}' is not a string", key))),
            None => Err(Error::not_found(format!("event key '{}' not found", key))),
        }
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        match self.pairs.get(key) {
            Some(EventValue::I64(v)) => Ok(*v),
            Some(_) => Err(Error::invalid_data(format!("event key '{}' is not an integer", key))),
            None => Err(Error::not_found(format!("event key '{}' not found", key))),
        }
    }

    pub fn get_bytes(&self, key: &str) -> Result<Vec<u8>> {
        match self.pairs.get(key) {
            Some(EventValue::Bytes(v)) => Ok(v.clone()),
            Some(_) => Err(Error::invalid_data(format!("event key '{}' is not bytes", key))),
            None => Err(Error::not_found(format!("event key '{}' not found", key))),
        }
    }

    pub fn get_data(&self) -> Result<Vec<u8>> { self.get_bytes("Data") }

    pub fn codec_to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        map.insert("Id".to_string(), serde_json::Value::String(self.id.clone()));
        for (key, value) in &self.pairs {
            let json_value = match value {
                EventValue::I64(v) => serde_json::Value::Number((*v).into()),
                EventValue::Str(s) => serde_json::Value::String(s.clone()),
                EventValue::Bytes(b) => serde_json::Value::String(base64::encode(b)),
            };
            map.insert(key.clone(), json_value);
        }
        serde_json::Value::Object(map)
    }

    pub fn codec_from_json(value: &serde_json::Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::invalid_data("event JSON is not an object"))?;
        let id = obj
            .get("Id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::invalid_data("event JSON missing 'Id'"))?
            .to_string();
        let mut pairs = IndexMap::new();
        for (key, value) in obj {
            if key == "Id" {
                continue;
            }
            let ev = match value {
                serde_json::Value::Number(n) => {
                    EventValue::I64(n.as_i64().ok_or_else(|| {
                        Error::invalid_data(format!("'{}' is not an i64", key))
                    })?)
                }
                serde_json::Value::String(s) => EventValue::Str(s.clone()),
                _ => return Err(Error::invalid_data(format!("unsupported JSON type for '{}'", key))),
            };
            pairs.insert(key.clone(), ev);
        }
        Ok(DeviceEvent { id, pairs })
    }
}

/// A device's recorded/replayed event log. When `strict_order` is set (the
/// `STRICT_EMULATION_ORDER` context flag), `load_event` must be called in
/// exactly the order events were recorded; otherwise lookup is by id,
/// skipping over earlier entries freely.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<DeviceEvent>,
    cursor: usize,
    pub strict_order: bool,
}

impl EventLog {
    pub fn new() -> Self { EventLog::default() }

    pub fn record(&mut self, event: DeviceEvent) { self.events.push(event); }

    /// Looks up (and consumes, for strict-order mode) the event with the
    /// given raw key, hashing it the same way `record` would have.
    pub fn load_event(&mut self, key: &str) -> Result<&DeviceEvent> {
        let id = build_id(key);
        if self.strict_order {
            if self.cursor >= self.events.len() || self.events[self.cursor].id != id {
                return Err(Error::not_found(format!(
                    "expected event '{}' out of strict order",
                    id
                )));
            }
            let idx = self.cursor;
            self.cursor += 1;
            return Ok(&self.events[idx]);
        }

        let found = self.events[self.cursor..].iter().position(|e| e.id == id);
        match found {
            Some(offset) => {
                let idx = self.cursor + offset;
                self.cursor = idx + 1;
                Ok(&self.events[idx])
            }
            None => Err(Error::not_found(format!("event '{}' not found", id))),
        }
    }

    pub fn len(&self) -> usize { self.events.len() }
    pub fn is_empty(&self) -> bool { self.events.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_json_matches_spec_example() {
        let mut event = DeviceEvent::new("foo:bar:baz");
        event.set_str("Name", "Richard");
        event.set_i64("Age", 123);
        event.set_bytes("Blob", b"hello\0");
        event.set_data(b"");
        let json = event.codec_to_json();
        assert_eq!(json["Id"], "#f9f98a90");
        assert_eq!(json["Name"], "Richard");
        assert_eq!(json["Age"], 123);
        assert_eq!(json["Blob"], "aGVsbG8A");
        assert_eq!(json["Data"], "");
    }

    #[test]
    fn json_round_trip_is_idempotent() {
        let mut event = DeviceEvent::new("round:trip");
        event.set_str("Name", "Richard");
        event.set_i64("Age", 123);
        let json1 = event.codec_to_json();
        let parsed = DeviceEvent::codec_from_json(&json1).unwrap();
        let json2 = parsed.codec_to_json();
        assert_eq!(json1, json2);
    }

    #[test]
    fn mismatched_type_read_is_invalid_data() {
        let mut event = DeviceEvent::new("k");
        event.set_str("Name", "Richard");
        assert_eq!(event.get_i64("Name").unwrap_err().kind(), crate::error::ErrorKind::InvalidData);
    }

    #[test]
    fn strict_order_replay_rejects_out_of_order_lookup() {
        let mut log = EventLog::new();
        log.record(DeviceEvent::new("e1"));
        log.record(DeviceEvent::new("e2"));
        log.record(DeviceEvent::new("e3"));
        log.record(DeviceEvent::new("e4"));
        log.record(DeviceEvent::new("e5"));

        // non-strict: may skip ahead to e2
        assert!(log.load_event("e2").is_ok());

        log.strict_order = true;
        assert!(log.load_event("m5").is_err());
    }
}
