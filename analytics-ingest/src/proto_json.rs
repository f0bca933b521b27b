//! Serde helpers for payloads that were rendered with protobuf JSON conventions.
//!
//! 64-bit integers arrive as decimal strings, while smaller producers sometimes
//! send them as plain numbers. Enums arrive by name, but numeric values are
//! accepted too. Field names may be either the proto name (`stream_id`) or the
//! JSON name (`streamId`); [`normalize_names`] folds them onto the latter.

use std::borrow::Cow;
use std::fmt;

use serde::de::{self, Deserializer, Unexpected, Visitor};
use serde::Serializer;
use serde_json::{Map, Value};

/// JSON name of a proto field: `stream_id` becomes `streamId`.
pub fn json_name(proto_name: &str) -> Cow<'_, str> {
    if !proto_name.contains('_') {
        return Cow::Borrowed(proto_name);
    }
    let mut out = String::with_capacity(proto_name.len());
    let mut upper = false;
    for c in proto_name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Rewrites every object key to its JSON name and drops explicit nulls, which
/// protobuf JSON treats as unset. Values under an `opaque` key are kept as
/// they are. Returns the field name when both spellings of it are present.
pub fn normalize_names(
    map: Map<String, Value>,
    opaque: &[&str],
) -> Result<Map<String, Value>, String> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let name = json_name(&key).into_owned();
        let value = if opaque.contains(&name.as_str()) {
            value
        } else {
            normalize_value(value, opaque)?
        };
        if out.contains_key(&name) {
            return Err(name);
        }
        out.insert(name, value);
    }
    Ok(out)
}

fn normalize_value(value: Value, opaque: &[&str]) -> Result<Value, String> {
    match value {
        Value::Object(map) => normalize_names(map, opaque).map(Value::Object),
        Value::Array(items) => items
            .into_iter()
            .map(|item| normalize_value(item, opaque))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

#[derive(Clone, Copy)]
struct U64Visitor;

impl<'de> Visitor<'de> for U64Visitor {
    type Value = u64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an unsigned integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<u64, E> {
        Ok(v)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<u64, E> {
        u64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<u64, E> {
        if v.is_finite() && v >= 0.0 && v.fract() == 0.0 && v <= u64::MAX as f64 {
            Ok(v as u64)
        } else {
            Err(E::invalid_value(Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<u64, E> {
        v.trim()
            .parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

#[derive(Clone, Copy)]
struct I64Visitor;

impl<'de> Visitor<'de> for I64Visitor {
    type Value = i64;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a signed integer or a decimal string")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<i64, E> {
        Ok(v)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<i64, E> {
        i64::try_from(v).map_err(|_| E::invalid_value(Unexpected::Unsigned(v), &self))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<i64, E> {
        if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v <= i64::MAX as f64 {
            Ok(v as i64)
        } else {
            Err(E::invalid_value(Unexpected::Float(v), &self))
        }
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<i64, E> {
        v.trim()
            .parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

struct Optional<V>(V);

impl<'de, V> Visitor<'de> for Optional<V>
where
    V: Visitor<'de> + Copy,
{
    type Value = Option<V::Value>;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.0.expecting(f)?;
        f.write_str(" or null")
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(None)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        d.deserialize_any(self.0).map(Some)
    }
}

/// `#[serde(with = "proto_json::uint64")]`
pub mod uint64 {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
        d.deserialize_any(U64Visitor)
    }

    pub fn serialize<S: Serializer>(v: &u64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(*v)
    }
}

pub mod int64 {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<i64, D::Error> {
        d.deserialize_any(I64Visitor)
    }

    pub fn serialize<S: Serializer>(v: &i64, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(*v)
    }
}

pub mod opt_uint64 {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u64>, D::Error> {
        d.deserialize_option(Optional(U64Visitor))
    }

    pub fn serialize<S: Serializer>(v: &Option<u64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => s.serialize_some(v),
            None => s.serialize_none(),
        }
    }
}

pub mod opt_int64 {
    use super::*;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        d.deserialize_option(Optional(I64Visitor))
    }

    pub fn serialize<S: Serializer>(v: &Option<i64>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(v) => s.serialize_some(v),
            None => s.serialize_none(),
        }
    }
}

pub mod vec_uint64 {
    use serde::de::SeqAccess;
    use serde::ser::SerializeSeq;

    use super::*;

    struct SeqVisitor;

    impl<'de> Visitor<'de> for SeqVisitor {
        type Value = Vec<u64>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a list of unsigned integers")
        }

        fn visit_unit<E: de::Error>(self) -> Result<Vec<u64>, E> {
            Ok(Vec::new())
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u64>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(v) = seq.next_element::<Lenient>()? {
                out.push(v.0);
            }
            Ok(out)
        }
    }

    struct Lenient(u64);

    impl<'de> serde::Deserialize<'de> for Lenient {
        fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
            d.deserialize_any(U64Visitor).map(Lenient)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u64>, D::Error> {
        d.deserialize_any(SeqVisitor)
    }

    pub fn serialize<S: Serializer>(v: &[u64], s: S) -> Result<S::Ok, S::Error> {
        let mut seq = s.serialize_seq(Some(v.len()))?;
        for item in v {
            seq.serialize_element(item)?;
        }
        seq.end()
    }
}

/// Declares a protobuf enum that reads either its wire name or its number,
/// and writes its wire name. Unknown numbers fall back to the zero variant.
macro_rules! proto_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $zero:ident = 0 => $zero_wire:literal,
            $($variant:ident = $num:literal => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        $vis enum $name {
            #[default]
            $zero,
            $($variant),+
        }

        impl $name {
            pub fn wire_name(self) -> &'static str {
                match self {
                    Self::$zero => $zero_wire,
                    $(Self::$variant => $wire),+
                }
            }

            pub fn from_wire_name(name: &str) -> Option<Self> {
                match name {
                    $zero_wire => Some(Self::$zero),
                    $($wire => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn from_number(n: i64) -> Self {
                match n {
                    $($num => Self::$variant,)+
                    _ => Self::$zero,
                }
            }
        }

        impl ::serde::Serialize for $name {
            fn serialize<S: ::serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
                s.serialize_str(self.wire_name())
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D: ::serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
                struct EnumVisitor;

                impl<'de> ::serde::de::Visitor<'de> for EnumVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                        f.write_str(concat!("a ", stringify!($name), " name or number"))
                    }

                    fn visit_str<E: ::serde::de::Error>(self, v: &str) -> Result<$name, E> {
                        $name::from_wire_name(v)
                            .ok_or_else(|| E::unknown_variant(v, &[$zero_wire, $($wire),+]))
                    }

                    fn visit_i64<E: ::serde::de::Error>(self, v: i64) -> Result<$name, E> {
                        Ok($name::from_number(v))
                    }

                    fn visit_u64<E: ::serde::de::Error>(self, v: u64) -> Result<$name, E> {
                        Ok(i64::try_from(v).map($name::from_number).unwrap_or_default())
                    }

                    fn visit_unit<E: ::serde::de::Error>(self) -> Result<$name, E> {
                        Ok($name::default())
                    }
                }

                d.deserialize_any(EnumVisitor)
            }
        }
    };
}

pub(crate) use proto_enum;

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Deserialize, Debug, Default)]
    #[serde(default)]
    struct Sample {
        #[serde(with = "uint64")]
        big: u64,
        #[serde(with = "opt_int64")]
        maybe: Option<i64>,
        #[serde(with = "vec_uint64")]
        hashes: Vec<u64>,
    }

    proto_enum! {
        enum Stage {
            Unspecified = 0 => "STAGE_UNSPECIFIED",
            Done = 4 => "STAGE_DONE",
        }
    }

    #[test]
    fn reads_strings_and_numbers() {
        let s: Sample = serde_json::from_value(json!({
            "big": "18446744073709551615",
            "maybe": 0,
            "hashes": ["1", 2]
        }))
        .unwrap();
        assert_eq!(s.big, u64::MAX);
        assert_eq!(s.maybe, Some(0));
        assert_eq!(s.hashes, vec![1, 2]);
    }

    #[test]
    fn missing_optional_stays_absent() {
        let s: Sample = serde_json::from_value(json!({ "maybe": null })).unwrap();
        assert_eq!(s.maybe, None);
        assert_eq!(s.big, 0);
    }

    #[test]
    fn rejects_negative_unsigned() {
        let res: Result<Sample, _> = serde_json::from_value(json!({ "big": -1 }));
        assert!(res.is_err());
    }

    #[test]
    fn json_names_from_proto_names() {
        assert_eq!(json_name("stream_id"), "streamId");
        assert_eq!(json_name("h3_index"), "h3Index");
        assert_eq!(json_name("s3_url"), "s3Url");
        assert_eq!(json_name("streamId"), "streamId");
        assert_eq!(json_name("status"), "status");
    }

    #[test]
    fn normalizes_nested_names_and_drops_nulls() {
        let Value::Object(map) = json!({
            "node_id": "edge-1",
            "tenant_id": null,
            "stream_buffer": {
                "tracks": [{ "track_type": "video", "frames_max": 48 }],
                "buffer_state": null
            },
            "node_lifecycle_update": {
                "capabilities": { "raw_key": true }
            }
        }) else {
            unreachable!()
        };

        let normalized = normalize_names(map, &["capabilities"]).unwrap();

        assert_eq!(
            Value::Object(normalized),
            json!({
                "nodeId": "edge-1",
                "streamBuffer": {
                    "tracks": [{ "trackType": "video", "framesMax": 48 }]
                },
                "nodeLifecycleUpdate": {
                    "capabilities": { "raw_key": true }
                }
            })
        );
    }

    #[test]
    fn both_spellings_of_one_field_conflict() {
        let Value::Object(map) = json!({ "stream_id": "a", "streamId": "b" }) else {
            unreachable!()
        };
        assert_eq!(normalize_names(map, &[]).unwrap_err(), "streamId");
    }

    #[test]
    fn enums_by_name_or_number() {
        let by_name: Stage = serde_json::from_value(json!("STAGE_DONE")).unwrap();
        let by_number: Stage = serde_json::from_value(json!(4)).unwrap();
        let unknown: Stage = serde_json::from_value(json!(99)).unwrap();
        assert_eq!(by_name, Stage::Done);
        assert_eq!(by_number, Stage::Done);
        assert_eq!(unknown, Stage::Unspecified);
        assert_eq!(serde_json::to_value(Stage::Done).unwrap(), json!("STAGE_DONE"));
        assert!(serde_json::from_value::<Stage>(json!("STAGE_NOPE")).is_err());
    }
}
