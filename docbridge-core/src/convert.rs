//! The type bridge between legacy values and BSON.
//!
//! Every value that crosses the boundary passes through [`from_legacy`] on the
//! way to the store and [`to_legacy`] on the way back. Containers are walked
//! recursively. The array-or-document decision for a [`LegacyArray`] is made
//! exactly once per container, from its keys:
//!
//! - keys `0..n-1` in order (and the empty container) produce a BSON array;
//! - anything else produces a BSON document.
//!
//! A [`LegacyObject`] always produces a BSON document.
//!
//! Coming back, documents are framed according to a [`Framing`]. The default
//! [`Framing::Associative`] yields associative arrays (so a document that was
//! empty comes back as an empty array and converts to `[]` next time);
//! [`Framing::Objects`] yields [`LegacyObject`]s and preserves document
//! identity.

use bson::{
    Binary, Bson, DateTime, Document, JavaScriptCodeWithScope, Regex, Timestamp,
    de::deserialize_from_bson, raw::CString, ser::serialize_to_bson, spec::BinarySubtype,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{BridgeError, BridgeResult},
    legacy::{
        LegacyArray, LegacyBinary, LegacyCode, LegacyDate, LegacyKey, LegacyObject, LegacyObjectId,
        LegacyRegex, LegacyTimestamp, LegacyValue,
    },
};

/// How BSON documents are framed when converted back to legacy values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Framing {
    /// Documents become [`LegacyArray`]s keyed by field name.
    #[default]
    Associative,
    /// Documents become [`LegacyObject`]s.
    Objects,
}

/// Converts a legacy value into BSON.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidValue`] if a regex pattern or flag string
/// contains a NUL byte, which BSON cannot encode.
pub fn from_legacy(value: &LegacyValue) -> BridgeResult<Bson> {
    Ok(match value {
        LegacyValue::ObjectId(id) => Bson::ObjectId(id.id()),
        LegacyValue::Binary(binary) => Bson::Binary(Binary {
            subtype: BinarySubtype::from(binary.subtype),
            bytes: binary.bytes.clone(),
        }),
        LegacyValue::Regex(regex) => Bson::RegularExpression(regex_to_bson(regex)?),
        LegacyValue::Date(date) => Bson::DateTime(DateTime::from_millis(date.to_millis())),
        LegacyValue::Timestamp(ts) => Bson::Timestamp(Timestamp {
            time: ts.sec,
            increment: ts.inc,
        }),
        LegacyValue::Code(code) if code.scope.is_empty() => Bson::JavaScriptCode(code.code.clone()),
        LegacyValue::Code(code) => Bson::JavaScriptCodeWithScope(JavaScriptCodeWithScope {
            code: code.code.clone(),
            scope: array_to_document(&code.scope)?,
        }),
        LegacyValue::Int32(value) => Bson::Int32(value.0),
        LegacyValue::Int64(value) => Bson::Int64(value.0),
        LegacyValue::MinKey => Bson::MinKey,
        LegacyValue::MaxKey => Bson::MaxKey,
        LegacyValue::Modern(bson) => bson.clone(),
        LegacyValue::Null => Bson::Null,
        LegacyValue::Bool(b) => Bson::Boolean(*b),
        LegacyValue::Int(i) => match i32::try_from(*i) {
            Ok(small) => Bson::Int32(small),
            Err(_) => Bson::Int64(*i),
        },
        LegacyValue::Float(f) => Bson::Double(*f),
        LegacyValue::String(s) => Bson::String(s.clone()),
        LegacyValue::Array(array) if array.is_list() => Bson::Array(
            array
                .values()
                .map(from_legacy)
                .collect::<BridgeResult<Vec<_>>>()?,
        ),
        LegacyValue::Array(array) => Bson::Document(array_to_document(array)?),
        LegacyValue::Object(object) => Bson::Document(object_to_document(object)?),
    })
}

/// Converts BSON into a legacy value using [`Framing::Associative`].
pub fn to_legacy(value: &Bson) -> LegacyValue {
    to_legacy_with(value, Framing::Associative)
}

/// Converts BSON into a legacy value, framing documents as requested.
pub fn to_legacy_with(value: &Bson, framing: Framing) -> LegacyValue {
    match value {
        Bson::ObjectId(id) => LegacyValue::ObjectId(LegacyObjectId::from(*id)),
        Bson::Binary(binary) => LegacyValue::Binary(LegacyBinary::new(
            binary.bytes.clone(),
            u8::from(binary.subtype),
        )),
        Bson::RegularExpression(regex) => LegacyValue::Regex(LegacyRegex::new(
            regex.pattern.as_str(),
            regex.options.as_str(),
        )),
        Bson::DateTime(datetime) => LegacyValue::Date(LegacyDate::from_millis(datetime.timestamp_millis())),
        Bson::Timestamp(ts) => LegacyValue::Timestamp(LegacyTimestamp::new(ts.time, ts.increment)),
        Bson::JavaScriptCode(code) => LegacyValue::Code(LegacyCode::new(code.clone())),
        Bson::JavaScriptCodeWithScope(code) => LegacyValue::Code(LegacyCode::with_scope(
            code.code.clone(),
            document_to_array(&code.scope, framing),
        )),
        Bson::MinKey => LegacyValue::MinKey,
        Bson::MaxKey => LegacyValue::MaxKey,
        Bson::Null => LegacyValue::Null,
        Bson::Boolean(b) => LegacyValue::Bool(*b),
        Bson::Int32(i) => LegacyValue::Int(i64::from(*i)),
        Bson::Int64(i) => LegacyValue::Int(*i),
        Bson::Double(f) => LegacyValue::Float(*f),
        Bson::String(s) => LegacyValue::String(s.clone()),
        Bson::Array(values) => LegacyValue::list(values.iter().map(|v| to_legacy_with(v, framing))),
        Bson::Document(doc) => match framing {
            Framing::Associative => LegacyValue::Array(document_to_array(doc, framing)),
            Framing::Objects => LegacyValue::Object(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), to_legacy_with(v, framing)))
                    .collect(),
            ),
        },
        other => LegacyValue::Modern(other.clone()),
    }
}

/// Converts a top-level query, command or insert payload into a BSON document.
///
/// Unlike [`from_legacy`], a list-shaped array is still forced into a document
/// (keys become `"0"`, `"1"`, ..), and `Null` is accepted as the empty document.
///
/// # Errors
///
/// Returns [`BridgeError::InvalidValue`] for scalars, which have no document form.
pub fn document_from_legacy(value: &LegacyValue) -> BridgeResult<Document> {
    match value {
        LegacyValue::Null => Ok(Document::new()),
        LegacyValue::Array(array) => array_to_document(array),
        LegacyValue::Object(object) => object_to_document(object),
        LegacyValue::Modern(Bson::Null) => Ok(Document::new()),
        LegacyValue::Modern(Bson::Document(doc)) => Ok(doc.clone()),
        LegacyValue::Modern(Bson::Array(values)) => Ok(values
            .iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect()),
        other => Err(BridgeError::InvalidValue(format!(
            "expected a document, got {}",
            other.type_name()
        ))),
    }
}

/// Converts a field selection into a projection document.
///
/// A non-empty list of field names becomes `{name: true, ..}`. Any other
/// container is converted as-is, and `Null` or an empty container means "no
/// restriction" (the empty document).
///
/// # Errors
///
/// Returns [`BridgeError::FieldName`] if a list entry is not a string.
pub fn convert_projection(fields: &LegacyValue) -> BridgeResult<Document> {
    match fields {
        LegacyValue::Array(array) if array.is_list() => {
            let mut projection = Document::new();

            for field in array.values() {
                match field.as_str() {
                    Some(name) => {
                        projection.insert(name, true);
                    }
                    None => {
                        return Err(BridgeError::FieldName(
                            "field names must be strings".to_string(),
                        ));
                    }
                }
            }

            Ok(projection)
        }
        other => document_from_legacy(other),
    }
}

/// Serializes any serde value into a legacy value, framing structs as objects.
pub fn legacy_from_serialize<T: Serialize + ?Sized>(value: &T) -> BridgeResult<LegacyValue> {
    Ok(to_legacy_with(&serialize_to_bson(value)?, Framing::Objects))
}

/// Deserializes a legacy value into any serde type.
pub fn deserialize_legacy<T: DeserializeOwned>(value: &LegacyValue) -> BridgeResult<T> {
    Ok(deserialize_from_bson(from_legacy(value)?)?)
}

fn array_to_document(array: &LegacyArray) -> BridgeResult<Document> {
    array
        .iter()
        .map(|(key, value)| Ok((key.to_string(), from_legacy(value)?)))
        .collect()
}

fn object_to_document(object: &LegacyObject) -> BridgeResult<Document> {
    object
        .iter()
        .map(|(name, value)| Ok((name.to_string(), from_legacy(value)?)))
        .collect()
}

fn document_to_array(doc: &Document, framing: Framing) -> LegacyArray {
    doc.iter()
        .map(|(k, v)| (LegacyKey::parse(k), to_legacy_with(v, framing)))
        .collect()
}

fn regex_to_bson(regex: &LegacyRegex) -> BridgeResult<Regex> {
    let cstring = |s: &str| {
        CString::try_from(s)
            .map_err(|e| BridgeError::InvalidValue(format!("invalid regex {regex}: {e}")))
    };

    Ok(Regex {
        pattern: cstring(&regex.pattern)?,
        options: cstring(&regex.flags)?,
    })
}
