//! The legacy value model.
//!
//! Legacy values are built from two dynamic containers and a fixed set of
//! scalar wrapper types:
//!
//! - [`LegacyArray`] is an ordered associative container. Its keys are either
//!   integers or names, and whether it is "list shaped" is only decided when it
//!   crosses the bridge (see [`LegacyArray::is_list`]).
//! - [`LegacyObject`] is a structured property bag. It always becomes a BSON
//!   document, whatever its property names look like.
//! - The wrapper types ([`LegacyObjectId`], [`LegacyBinary`], [`LegacyRegex`],
//!   [`LegacyDate`], [`LegacyTimestamp`], [`LegacyCode`], [`LegacyInt32`],
//!   [`LegacyInt64`]) each carry the minimum needed to rebuild their BSON
//!   counterpart.
//!
//! # Example
//!
//! ```ignore
//! use docbridge::legacy::{LegacyArray, LegacyValue};
//!
//! let list: LegacyArray = vec![LegacyValue::from("a"), LegacyValue::from("b")]
//!     .into_iter()
//!     .collect();
//! assert!(list.is_list());
//! ```

use bson::{Bson, Uuid, oid::ObjectId};
use chrono::{DateTime, TimeZone, Utc};
use std::{
    fmt,
    str::FromStr,
    sync::{
        OnceLock,
        atomic::{AtomicU32, Ordering},
    },
};

use crate::error::{BridgeError, BridgeResult};

/// A key of a [`LegacyArray`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LegacyKey {
    Index(i64),
    Name(String),
}

impl LegacyKey {
    /// Normalizes a string key the way legacy associative arrays do: canonical
    /// decimal integers (`"0"`, `"42"`, `"-3"`) become [`LegacyKey::Index`],
    /// everything else (`"01"`, `"-0"`, `"+1"`, `"a"`) stays a name.
    pub fn parse(key: &str) -> Self {
        if is_canonical_integer(key) {
            if let Ok(index) = key.parse::<i64>() {
                return LegacyKey::Index(index);
            }
        }

        LegacyKey::Name(key.to_string())
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            LegacyKey::Index(index) => Some(*index),
            LegacyKey::Name(_) => None,
        }
    }
}

fn is_canonical_integer(key: &str) -> bool {
    let digits = key.strip_prefix('-').unwrap_or(key);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return false;
    }

    // "-0" is a name in legacy arrays
    !(key.starts_with('-') && digits == "0")
}

impl fmt::Display for LegacyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LegacyKey::Index(index) => write!(f, "{index}"),
            LegacyKey::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for LegacyKey {
    fn from(index: i64) -> Self {
        LegacyKey::Index(index)
    }
}

impl From<i32> for LegacyKey {
    fn from(index: i32) -> Self {
        LegacyKey::Index(i64::from(index))
    }
}

impl From<&str> for LegacyKey {
    fn from(key: &str) -> Self {
        LegacyKey::parse(key)
    }
}

impl From<String> for LegacyKey {
    fn from(key: String) -> Self {
        LegacyKey::parse(&key)
    }
}

/// An ordered associative container with integer or string keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyArray {
    entries: Vec<(LegacyKey, LegacyValue)>,
}

impl LegacyArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends a value under the next free integer key (one past the largest
    /// integer key so far, or `0`).
    pub fn push(&mut self, value: impl Into<LegacyValue>) {
        let next = self
            .entries
            .iter()
            .filter_map(|(key, _)| key.as_index())
            .max()
            .map_or(0, |max| max.saturating_add(1));

        self.entries.push((LegacyKey::Index(next), value.into()));
    }

    /// Sets `key` to `value`. An existing key keeps its position.
    pub fn insert(&mut self, key: impl Into<LegacyKey>, value: impl Into<LegacyValue>) {
        let key = key.into();
        let value = value.into();

        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<LegacyKey>, value: impl Into<LegacyValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: impl Into<LegacyKey>) -> Option<&LegacyValue> {
        let key = key.into();

        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: impl Into<LegacyKey>) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: impl Into<LegacyKey>) -> Option<LegacyValue> {
        let key = key.into();
        let position = self.entries.iter().position(|(k, _)| *k == key)?;

        Some(self.entries.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LegacyKey, &LegacyValue)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &LegacyKey> {
        self.entries.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &LegacyValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Returns `true` when the keys are exactly `0, 1, .., n-1` in order.
    ///
    /// The empty container is always list shaped.
    pub fn is_list(&self) -> bool {
        if self.entries.is_empty() {
            return true;
        }

        self.entries
            .iter()
            .enumerate()
            .all(|(position, (key, _))| {
                matches!(key, LegacyKey::Index(index) if *index >= 0 && *index as usize == position)
            })
    }
}

impl FromIterator<LegacyValue> for LegacyArray {
    fn from_iter<I: IntoIterator<Item = LegacyValue>>(iter: I) -> Self {
        let mut array = LegacyArray::new();
        for value in iter {
            array.push(value);
        }
        array
    }
}

impl<K: Into<LegacyKey>> FromIterator<(K, LegacyValue)> for LegacyArray {
    fn from_iter<I: IntoIterator<Item = (K, LegacyValue)>>(iter: I) -> Self {
        let mut array = LegacyArray::new();
        for (key, value) in iter {
            array.insert(key, value);
        }
        array
    }
}

impl IntoIterator for LegacyArray {
    type Item = (LegacyKey, LegacyValue);
    type IntoIter = std::vec::IntoIter<(LegacyKey, LegacyValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A structured object with named properties in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyObject {
    properties: Vec<(String, LegacyValue)>,
}

impl LegacyObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<LegacyValue>) {
        let name = name.into();
        let value = value.into();

        match self.properties.iter_mut().find(|(n, _)| *n == name) {
            Some(property) => property.1 = value,
            None => self.properties.push((name, value)),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<LegacyValue>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&LegacyValue> {
        self.properties
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LegacyValue)> {
        self.properties.iter().map(|(n, v)| (n.as_str(), v))
    }
}

impl<K: Into<String>> FromIterator<(K, LegacyValue)> for LegacyObject {
    fn from_iter<I: IntoIterator<Item = (K, LegacyValue)>>(iter: I) -> Self {
        let mut object = LegacyObject::new();
        for (name, value) in iter {
            object.set(name, value);
        }
        object
    }
}

/// A 12-byte object identifier that is generated on first use.
#[derive(Debug, Default)]
pub struct LegacyObjectId {
    id: OnceLock<ObjectId>,
}

impl LegacyObjectId {
    /// Creates an identifier whose value is generated lazily.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a 24 character hex string.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidValue`] if `hex` is not a valid object id.
    pub fn from_hex(hex: &str) -> BridgeResult<Self> {
        ObjectId::parse_str(hex)
            .map(Self::from)
            .map_err(|e| BridgeError::InvalidValue(format!("invalid object id '{hex}': {e}")))
    }

    /// Returns the identifier, generating it if needed.
    pub fn id(&self) -> ObjectId {
        *self.id.get_or_init(ObjectId::new)
    }

    pub fn to_hex(&self) -> String {
        self.id().to_hex()
    }
}

impl From<ObjectId> for LegacyObjectId {
    fn from(id: ObjectId) -> Self {
        Self { id: OnceLock::from(id) }
    }
}

impl Clone for LegacyObjectId {
    fn clone(&self) -> Self {
        Self::from(self.id())
    }
}

impl PartialEq for LegacyObjectId {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl fmt::Display for LegacyObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Binary payload with its subtype byte.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyBinary {
    pub bytes: Vec<u8>,
    pub subtype: u8,
}

impl LegacyBinary {
    pub const GENERIC: u8 = 0x00;
    pub const FUNCTION: u8 = 0x01;
    pub const BYTE_ARRAY: u8 = 0x02;
    pub const UUID_OLD: u8 = 0x03;
    pub const UUID: u8 = 0x04;
    pub const MD5: u8 = 0x05;
    pub const CUSTOM: u8 = 0x80;

    pub fn new(bytes: impl Into<Vec<u8>>, subtype: u8) -> Self {
        Self {
            bytes: bytes.into(),
            subtype,
        }
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self::new(uuid.bytes().to_vec(), Self::UUID)
    }
}

/// A regular expression as a pattern plus flag string.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyRegex {
    pub pattern: String,
    pub flags: String,
}

impl LegacyRegex {
    pub fn new(pattern: impl Into<String>, flags: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }

    /// Parses a delimited literal such as `/^acme/i`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidValue`] if the literal is not delimited by `/`.
    pub fn parse(literal: &str) -> BridgeResult<Self> {
        let invalid = || BridgeError::InvalidValue(format!("invalid regex literal: {literal}"));

        let body = literal.strip_prefix('/').ok_or_else(invalid)?;
        let end = body.rfind('/').ok_or_else(invalid)?;

        Ok(Self::new(&body[..end], &body[end + 1..]))
    }
}

impl fmt::Display for LegacyRegex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.pattern, self.flags)
    }
}

/// A point in time with millisecond precision, stored as seconds and microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LegacyDate {
    sec: i64,
    usec: i64,
}

impl LegacyDate {
    /// Creates a date. Microseconds are normalized into `0..1_000_000` and
    /// truncated to whole milliseconds.
    pub fn new(sec: i64, usec: i64) -> Self {
        let sec = sec.saturating_add(usec.div_euclid(1_000_000));
        let usec = usec.rem_euclid(1_000_000);

        Self {
            sec,
            usec: usec - usec % 1_000,
        }
    }

    pub fn now() -> Self {
        Self::from_millis(Utc::now().timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self {
            sec: millis.div_euclid(1_000),
            usec: millis.rem_euclid(1_000) * 1_000,
        }
    }

    pub fn sec(&self) -> i64 {
        self.sec
    }

    pub fn usec(&self) -> i64 {
        self.usec
    }

    pub fn to_millis(&self) -> i64 {
        self.sec
            .saturating_mul(1_000)
            .saturating_add(self.usec / 1_000)
    }

    /// Converts to a chrono timestamp, or `None` when out of chrono's range.
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.to_millis()).single()
    }
}

impl From<DateTime<Utc>> for LegacyDate {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self::from_millis(datetime.timestamp_millis())
    }
}

/// Source of the increment part of generated timestamps.
pub trait IncrementCounter: Send + Sync {
    /// Returns the next increment. Successive calls must never repeat a value
    /// until the counter is reset.
    fn next_increment(&self) -> u32;
}

/// An in-process monotonic counter for [`LegacyTimestamp::generate`].
///
/// Each owner (typically one per client) holds its own counter; there is no
/// global instance.
#[derive(Debug)]
pub struct MonotonicCounter {
    next: AtomicU32,
}

impl MonotonicCounter {
    /// Creates a counter whose first increment is `1`.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    pub fn reset(&self) {
        self.next.store(1, Ordering::SeqCst);
    }
}

impl Default for MonotonicCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementCounter for MonotonicCounter {
    fn next_increment(&self) -> u32 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// A replication timestamp: seconds plus an ordinal within that second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct LegacyTimestamp {
    pub sec: u32,
    pub inc: u32,
}

impl LegacyTimestamp {
    pub fn new(sec: u32, inc: u32) -> Self {
        Self { sec, inc }
    }

    /// Builds a timestamp for the current second, drawing the increment from `counter`.
    pub fn generate(counter: &dyn IncrementCounter) -> Self {
        let sec = u32::try_from(Utc::now().timestamp()).unwrap_or(u32::MAX);

        Self::new(sec, counter.next_increment())
    }
}

/// JavaScript source with an optional scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyCode {
    pub code: String,
    pub scope: LegacyArray,
}

impl LegacyCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            scope: LegacyArray::new(),
        }
    }

    pub fn with_scope(code: impl Into<String>, scope: LegacyArray) -> Self {
        Self {
            code: code.into(),
            scope,
        }
    }
}

/// An explicitly 32-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyInt32(pub i32);

/// An explicitly 64-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyInt64(pub i64);

impl FromStr for LegacyInt32 {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(LegacyInt32)
            .map_err(|e| BridgeError::InvalidValue(format!("invalid 32-bit integer '{s}': {e}")))
    }
}

impl FromStr for LegacyInt64 {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(LegacyInt64)
            .map_err(|e| BridgeError::InvalidValue(format!("invalid 64-bit integer '{s}': {e}")))
    }
}

impl fmt::Display for LegacyInt32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LegacyInt64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value on the legacy side of the bridge.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LegacyValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(LegacyArray),
    Object(LegacyObject),
    ObjectId(LegacyObjectId),
    Binary(LegacyBinary),
    Regex(LegacyRegex),
    Date(LegacyDate),
    Timestamp(LegacyTimestamp),
    Code(LegacyCode),
    Int32(LegacyInt32),
    Int64(LegacyInt64),
    MinKey,
    MaxKey,
    /// A value that is already in the modern model and passes through untouched.
    Modern(Bson),
}

impl LegacyValue {
    /// Builds a list-shaped array from values.
    pub fn list(values: impl IntoIterator<Item = LegacyValue>) -> Self {
        LegacyValue::Array(values.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, LegacyValue::Null | LegacyValue::Modern(Bson::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            LegacyValue::String(s) => Some(s),
            LegacyValue::Modern(Bson::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            LegacyValue::Bool(b) => Some(*b),
            LegacyValue::Modern(Bson::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Returns the value as an integer if it is any integer flavour.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            LegacyValue::Int(i) => Some(*i),
            LegacyValue::Int32(LegacyInt32(i)) => Some(i64::from(*i)),
            LegacyValue::Int64(LegacyInt64(i)) => Some(*i),
            LegacyValue::Modern(Bson::Int32(i)) => Some(i64::from(*i)),
            LegacyValue::Modern(Bson::Int64(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&LegacyArray> {
        match self {
            LegacyValue::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&LegacyObject> {
        match self {
            LegacyValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Looks up a named member of an array, object or modern document.
    pub fn member(&self, name: &str) -> Option<LegacyValue> {
        match self {
            LegacyValue::Array(array) => array.get(name).cloned(),
            LegacyValue::Object(object) => object.get(name).cloned(),
            LegacyValue::Modern(Bson::Document(doc)) => doc.get(name).cloned().map(LegacyValue::Modern),
            _ => None,
        }
    }

    /// Returns `true` for values that describe a document (containers and modern documents).
    pub fn is_document_like(&self) -> bool {
        matches!(
            self,
            LegacyValue::Array(_) | LegacyValue::Object(_) | LegacyValue::Modern(Bson::Document(_))
        )
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            LegacyValue::Null => "null",
            LegacyValue::Bool(_) => "boolean",
            LegacyValue::Int(_) => "integer",
            LegacyValue::Float(_) => "float",
            LegacyValue::String(_) => "string",
            LegacyValue::Array(_) => "array",
            LegacyValue::Object(_) => "object",
            LegacyValue::ObjectId(_) => "MongoId",
            LegacyValue::Binary(_) => "MongoBinData",
            LegacyValue::Regex(_) => "MongoRegex",
            LegacyValue::Date(_) => "MongoDate",
            LegacyValue::Timestamp(_) => "MongoTimestamp",
            LegacyValue::Code(_) => "MongoCode",
            LegacyValue::Int32(_) => "MongoInt32",
            LegacyValue::Int64(_) => "MongoInt64",
            LegacyValue::MinKey => "MongoMinKey",
            LegacyValue::MaxKey => "MongoMaxKey",
            LegacyValue::Modern(_) => "bson",
        }
    }
}

impl From<bool> for LegacyValue {
    fn from(value: bool) -> Self {
        LegacyValue::Bool(value)
    }
}

impl From<i32> for LegacyValue {
    fn from(value: i32) -> Self {
        LegacyValue::Int(i64::from(value))
    }
}

impl From<i64> for LegacyValue {
    fn from(value: i64) -> Self {
        LegacyValue::Int(value)
    }
}

impl From<f64> for LegacyValue {
    fn from(value: f64) -> Self {
        LegacyValue::Float(value)
    }
}

impl From<&str> for LegacyValue {
    fn from(value: &str) -> Self {
        LegacyValue::String(value.to_string())
    }
}

impl From<String> for LegacyValue {
    fn from(value: String) -> Self {
        LegacyValue::String(value)
    }
}

impl From<LegacyArray> for LegacyValue {
    fn from(value: LegacyArray) -> Self {
        LegacyValue::Array(value)
    }
}

impl From<LegacyObject> for LegacyValue {
    fn from(value: LegacyObject) -> Self {
        LegacyValue::Object(value)
    }
}

impl From<LegacyObjectId> for LegacyValue {
    fn from(value: LegacyObjectId) -> Self {
        LegacyValue::ObjectId(value)
    }
}

impl From<LegacyBinary> for LegacyValue {
    fn from(value: LegacyBinary) -> Self {
        LegacyValue::Binary(value)
    }
}

impl From<LegacyRegex> for LegacyValue {
    fn from(value: LegacyRegex) -> Self {
        LegacyValue::Regex(value)
    }
}

impl From<LegacyDate> for LegacyValue {
    fn from(value: LegacyDate) -> Self {
        LegacyValue::Date(value)
    }
}

impl From<LegacyTimestamp> for LegacyValue {
    fn from(value: LegacyTimestamp) -> Self {
        LegacyValue::Timestamp(value)
    }
}

impl From<LegacyCode> for LegacyValue {
    fn from(value: LegacyCode) -> Self {
        LegacyValue::Code(value)
    }
}

impl From<LegacyInt32> for LegacyValue {
    fn from(value: LegacyInt32) -> Self {
        LegacyValue::Int32(value)
    }
}

impl From<LegacyInt64> for LegacyValue {
    fn from(value: LegacyInt64) -> Self {
        LegacyValue::Int64(value)
    }
}

impl<T: Into<LegacyValue>> From<Vec<T>> for LegacyValue {
    fn from(values: Vec<T>) -> Self {
        LegacyValue::list(values.into_iter().map(Into::into))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_string_keys_normalize_to_indexes() {
        assert_eq!(LegacyKey::parse("0"), LegacyKey::Index(0));
        assert_eq!(LegacyKey::parse("17"), LegacyKey::Index(17));
        assert_eq!(LegacyKey::parse("-3"), LegacyKey::Index(-3));
        assert_eq!(LegacyKey::parse("01"), LegacyKey::Name("01".into()));
        assert_eq!(LegacyKey::parse("-0"), LegacyKey::Name("-0".into()));
        assert_eq!(LegacyKey::parse("+1"), LegacyKey::Name("+1".into()));
        assert_eq!(LegacyKey::parse(""), LegacyKey::Name("".into()));
        assert_eq!(LegacyKey::parse("99999999999999999999"), LegacyKey::Name("99999999999999999999".into()));
    }

    #[test]
    fn push_uses_next_integer_key() {
        let mut array = LegacyArray::new()
            .with("name", "x")
            .with(5, 1);
        array.push("tail");

        let keys = array.keys().cloned().collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec![LegacyKey::Name("name".into()), LegacyKey::Index(5), LegacyKey::Index(6)]
        );
    }

    #[test]
    fn insert_replaces_in_place() {
        let mut array: LegacyArray = vec![LegacyValue::from("a"), LegacyValue::from("b")]
            .into_iter()
            .collect();
        array.insert("0", "z");

        assert_eq!(array.get(0), Some(&LegacyValue::from("z")));
        assert!(array.is_list());
    }

    #[test]
    fn list_detection_requires_ordered_dense_keys() {
        assert!(LegacyArray::new().is_list());
        assert!(LegacyArray::new().with(0, "a").with(1, "b").is_list());
        assert!(!LegacyArray::new().with(1, "a").with(0, "b").is_list());
        assert!(!LegacyArray::new().with(0, "a").with(2, "b").is_list());
        assert!(!LegacyArray::new().with("x", 1).is_list());
        assert!(!LegacyArray::new().with(-1, 1).is_list());
    }

    #[test]
    fn lazy_object_id_is_stable_and_shared_by_clones() {
        let id = LegacyObjectId::new();
        let copy = id.clone();

        assert_eq!(id.to_hex(), copy.to_hex());
        assert_eq!(id.to_hex().len(), 24);
        assert_ne!(LegacyObjectId::new(), LegacyObjectId::new());
    }

    #[test]
    fn object_id_from_hex_validates() {
        assert!(LegacyObjectId::from_hex("507f1f77bcf86cd799439011").is_ok());
        assert!(matches!(
            LegacyObjectId::from_hex("nope"),
            Err(BridgeError::InvalidValue(_))
        ));
    }

    #[test]
    fn regex_literal_parsing() {
        let regex = LegacyRegex::parse("/^ac/me$/im").unwrap();
        assert_eq!(regex.pattern, "^ac/me$");
        assert_eq!(regex.flags, "im");
        assert_eq!(regex.to_string(), "/^ac/me$/im");

        assert!(LegacyRegex::parse("^acme").is_err());
        assert!(LegacyRegex::parse("/").is_err());
    }

    #[test]
    fn date_truncates_to_milliseconds() {
        let date = LegacyDate::new(10, 123_456);
        assert_eq!(date.usec(), 123_000);
        assert_eq!(date.to_millis(), 10_123);

        let before_epoch = LegacyDate::from_millis(-1);
        assert_eq!(before_epoch.sec(), -1);
        assert_eq!(before_epoch.usec(), 999_000);
        assert_eq!(before_epoch.to_millis(), -1);

        assert_eq!(LegacyDate::new(1, 1_500_000), LegacyDate::new(2, 500_000));
    }

    #[test]
    fn timestamps_draw_from_injected_counter() {
        let counter = MonotonicCounter::starting_at(7);

        let first = LegacyTimestamp::generate(&counter);
        let second = LegacyTimestamp::generate(&counter);
        assert_eq!(first.inc, 7);
        assert_eq!(second.inc, 8);

        counter.reset();
        assert_eq!(LegacyTimestamp::generate(&counter).inc, 1);
    }

    #[test]
    fn integer_wrappers_parse_decimal_strings() {
        assert_eq!("42".parse::<LegacyInt32>().unwrap(), LegacyInt32(42));
        assert_eq!("-9000000000".parse::<LegacyInt64>().unwrap(), LegacyInt64(-9_000_000_000));
        assert!("9000000000".parse::<LegacyInt32>().is_err());
        assert_eq!(LegacyInt64(12).to_string(), "12");
    }

    #[test]
    fn member_lookup_spans_containers() {
        let array = LegacyValue::Array(LegacyArray::new().with("q", 1));
        let object = LegacyValue::Object(LegacyObject::new().with("q", 2));

        assert_eq!(array.member("q"), Some(LegacyValue::Int(1)));
        assert_eq!(object.member("q"), Some(LegacyValue::Int(2)));
        assert_eq!(LegacyValue::Int(3).member("q"), None);
    }
}
