//! Recovers a typed trigger from an envelope's generic data map.
//!
//! Keys that match no known field are ignored, so newer producers can add
//! fields without breaking older consumers. A recognised field with the wrong
//! shape is still an error. Proto names and JSON names are both accepted.

use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::proto_json;
use crate::trigger::{MistTrigger, TriggerPayload};

/// Free-form fields whose inner keys belong to the producer.
const OPAQUE_FIELDS: [&str; 2] = ["capabilities", "limits"];

pub fn decode_trigger(data: &Map<String, Value>) -> Result<MistTrigger, DecodeError> {
    let mut fields = proto_json::normalize_names(data.clone(), &OPAQUE_FIELDS)
        .map_err(DecodeError::DuplicateField)?;

    let present: Vec<&'static str> = TriggerPayload::KEYS
        .iter()
        .copied()
        .filter(|key| fields.get(*key).is_some_and(|v| !v.is_null()))
        .collect();

    if present.len() > 1 {
        return Err(DecodeError::AmbiguousPayload(present.join(", ")));
    }

    let payload = match present.first() {
        Some(&key) => {
            let value = fields.remove(key).unwrap_or(Value::Null);
            let mut tagged = Map::with_capacity(1);
            tagged.insert(key.to_string(), value);
            let payload = serde_json::from_value::<TriggerPayload>(Value::Object(tagged))
                .map_err(|source| DecodeError::Payload { key, source })?;
            Some(payload)
        }
        None => None,
    };

    for key in TriggerPayload::KEYS {
        fields.remove(key);
    }

    let mut trigger: MistTrigger =
        serde_json::from_value(Value::Object(fields)).map_err(DecodeError::Envelope)?;
    trigger.payload = payload;
    Ok(trigger)
}

/// Returns the decoded payload's kind, or `"none"`.
pub fn payload_kind(trigger: &MistTrigger) -> &'static str {
    trigger.payload.as_ref().map_or("none", TriggerPayload::kind)
}
