//! Read preference and write concern normalization.
//!
//! Legacy callers describe a read preference as a mode string plus an array of
//! tag sets, and a write concern as a `w` value plus a timeout. This module
//! turns those loose shapes into [`ReadPreference`] and [`WriteConcern`] and
//! renders them back.
//!
//! Bad input is never fatal here. The `normalize_*` functions return a
//! [`ParamWarning`], and the `update` helpers log it and keep the previous
//! state, so a rejected setting reads as "ignored" rather than "failed".

use bson::{Bson, Document, doc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::warn;

use crate::{
    convert::{document_from_legacy, from_legacy, to_legacy},
    error::ParamWarning,
    legacy::{LegacyArray, LegacyValue},
};

/// Server selection mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreferenceMode {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

impl ReadPreferenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadPreferenceMode::Primary => "primary",
            ReadPreferenceMode::PrimaryPreferred => "primaryPreferred",
            ReadPreferenceMode::Secondary => "secondary",
            ReadPreferenceMode::SecondaryPreferred => "secondaryPreferred",
            ReadPreferenceMode::Nearest => "nearest",
        }
    }
}

impl FromStr for ReadPreferenceMode {
    type Err = ParamWarning;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            ReadPreferenceMode::Primary,
            ReadPreferenceMode::PrimaryPreferred,
            ReadPreferenceMode::Secondary,
            ReadPreferenceMode::SecondaryPreferred,
            ReadPreferenceMode::Nearest,
        ]
        .into_iter()
        .find(|mode| mode.as_str() == s)
        .ok_or_else(|| ParamWarning::UnknownReadPreferenceMode(s.to_string()))
    }
}

impl fmt::Display for ReadPreferenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized read preference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReadPreference {
    pub mode: ReadPreferenceMode,
    #[serde(default)]
    pub tag_sets: Vec<Document>,
}

impl ReadPreference {
    pub fn primary() -> Self {
        Self::default()
    }

    pub fn new(mode: ReadPreferenceMode) -> Self {
        Self {
            mode,
            tag_sets: Vec::new(),
        }
    }

    /// Whether reads may be served by a secondary (the legacy "slave okay" flag).
    pub fn slave_okay(&self) -> bool {
        self.mode != ReadPreferenceMode::Primary
    }

    /// Applies the legacy slave-okay toggle.
    ///
    /// `true` selects `secondaryPreferred` and keeps tag sets; `false` selects
    /// `primary` and clears them.
    pub fn set_slave_okay(&mut self, ok: bool) {
        if ok {
            self.mode = ReadPreferenceMode::SecondaryPreferred;
        } else {
            self.mode = ReadPreferenceMode::Primary;
            self.tag_sets.clear();
        }
    }

    /// Applies a legacy `(mode, tag sets)` pair. On rejection the warning is
    /// logged, the current state is kept and `false` is returned.
    pub fn update(&mut self, mode: &str, tag_sets: &LegacyValue) -> bool {
        match normalize_read_preference(mode, tag_sets) {
            Ok(normalized) => {
                *self = normalized;
                true
            }
            Err(warning) => {
                warn!(%warning, mode, "ignoring read preference");
                false
            }
        }
    }

    /// Renders the legacy `{type, tagsets}` shape.
    pub fn to_legacy(&self) -> LegacyValue {
        let tag_sets = self
            .tag_sets
            .iter()
            .map(|tags| to_legacy(&Bson::Document(tags.clone())))
            .collect::<LegacyArray>();

        let mut legacy = LegacyArray::new().with("type", self.mode.as_str());
        if !tag_sets.is_empty() {
            legacy.insert("tagsets", tag_sets);
        }

        LegacyValue::Array(legacy)
    }

    /// Renders the `$readPreference` document understood by servers.
    pub fn to_document(&self) -> Document {
        let mut document = doc! { "mode": self.mode.as_str() };
        if !self.tag_sets.is_empty() {
            document.insert(
                "tags",
                self.tag_sets
                    .iter()
                    .cloned()
                    .map(Bson::Document)
                    .collect::<Vec<_>>(),
            );
        }
        document
    }
}

/// Normalizes a legacy read preference.
///
/// `tag_sets` may be `Null` or a list of tag documents.
///
/// # Errors
///
/// Returns a [`ParamWarning`] for an unknown mode, for malformed tag sets and
/// for `primary` combined with a non-empty tag set list.
pub fn normalize_read_preference(
    mode: &str,
    tag_sets: &LegacyValue,
) -> Result<ReadPreference, ParamWarning> {
    let mode = mode.parse::<ReadPreferenceMode>()?;

    let tag_sets = match tag_sets {
        LegacyValue::Null => Vec::new(),
        LegacyValue::Array(sets) => sets
            .values()
            .map(|set| {
                if !set.is_document_like() {
                    return Err(ParamWarning::InvalidTagSet(format!(
                        "expected a tag document, got {}",
                        set.type_name()
                    )));
                }
                document_from_legacy(set).map_err(|e| ParamWarning::InvalidTagSet(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(ParamWarning::InvalidTagSet(format!(
                "expected an array of tag sets, got {}",
                other.type_name()
            )));
        }
    };

    if mode == ReadPreferenceMode::Primary && !tag_sets.is_empty() {
        return Err(ParamWarning::TagsWithPrimary);
    }

    Ok(ReadPreference { mode, tag_sets })
}

/// The `w` component of a write concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Acknowledgment {
    /// Number of nodes that must acknowledge (`0` is unacknowledged).
    Nodes(u32),
    /// A named mode such as `"majority"` or a custom tag set name.
    Tag(String),
}

impl Acknowledgment {
    pub fn majority() -> Self {
        Acknowledgment::Tag("majority".to_string())
    }

    pub fn to_bson(&self) -> Bson {
        match self {
            Acknowledgment::Nodes(n) => Bson::Int64(i64::from(*n)),
            Acknowledgment::Tag(tag) => Bson::String(tag.clone()),
        }
    }
}

impl Default for Acknowledgment {
    fn default() -> Self {
        Acknowledgment::Nodes(1)
    }
}

/// A normalized write concern.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
    pub w: Acknowledgment,
    /// Replication timeout in milliseconds; `0` waits forever.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl WriteConcern {
    pub fn new(w: Acknowledgment, timeout_ms: u64) -> Self {
        Self { w, timeout_ms }
    }

    /// Applies a legacy `(w, timeout)` pair, keeping the current state on rejection.
    pub fn update(&mut self, w: &LegacyValue, timeout_ms: i64) -> bool {
        match normalize_write_concern(w, timeout_ms) {
            Ok(normalized) => {
                *self = normalized;
                true
            }
            Err(warning) => {
                warn!(%warning, "ignoring write concern");
                false
            }
        }
    }

    /// Renders the legacy `{w, wtimeout}` shape.
    pub fn to_legacy(&self) -> LegacyValue {
        LegacyValue::Array(
            LegacyArray::new()
                .with("w", to_legacy(&self.w.to_bson()))
                .with("wtimeout", self.timeout_ms as i64),
        )
    }

    pub fn to_document(&self) -> Document {
        let mut document = doc! { "w": self.w.to_bson() };
        if self.timeout_ms > 0 {
            document.insert("wtimeout", self.timeout_ms as i64);
        }
        document
    }
}

/// Normalizes a legacy write concern.
///
/// Booleans are coerced to `0`/`1` and a negative timeout is clamped to `0`.
///
/// # Errors
///
/// Returns [`ParamWarning::InvalidW`] when `w` is not a string, a non-negative
/// integer or a boolean.
pub fn normalize_write_concern(w: &LegacyValue, timeout_ms: i64) -> Result<WriteConcern, ParamWarning> {
    let invalid = || ParamWarning::InvalidW(from_legacy(w).unwrap_or(Bson::Null));

    let w = match w {
        LegacyValue::Bool(b) | LegacyValue::Modern(Bson::Boolean(b)) => Acknowledgment::Nodes(u32::from(*b)),
        LegacyValue::String(tag) | LegacyValue::Modern(Bson::String(tag)) => Acknowledgment::Tag(tag.clone()),
        other => match other.as_i64() {
            Some(n) => Acknowledgment::Nodes(u32::try_from(n).map_err(|_| invalid())?),
            None => return Err(invalid()),
        },
    };

    Ok(WriteConcern {
        w,
        timeout_ms: timeout_ms.max(0) as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> LegacyValue {
        LegacyValue::Array(
            pairs
                .iter()
                .map(|(k, v)| (*k, LegacyValue::from(*v)))
                .collect(),
        )
    }

    #[test]
    fn read_preference_modes_parse_exactly() {
        assert_eq!("nearest".parse::<ReadPreferenceMode>().unwrap(), ReadPreferenceMode::Nearest);
        assert_eq!(
            "secondaryPreferred".parse::<ReadPreferenceMode>().unwrap(),
            ReadPreferenceMode::SecondaryPreferred
        );
        assert!("fastest".parse::<ReadPreferenceMode>().is_err());
        assert_eq!(
            "PRIMARY".parse::<ReadPreferenceMode>(),
            Err(ParamWarning::UnknownReadPreferenceMode("PRIMARY".to_string()))
        );
    }

    #[test]
    fn misspelled_modes_leave_the_preference_alone() {
        let mut pref = ReadPreference::new(ReadPreferenceMode::Nearest);

        assert!(!pref.update("SECONDARY", &LegacyValue::Null));
        assert_eq!(pref.mode, ReadPreferenceMode::Nearest);
    }

    #[test]
    fn normalizes_mode_with_tag_sets() {
        let sets = LegacyValue::list(vec![tags(&[("dc", "east")]), tags(&[])]);
        let pref = normalize_read_preference("secondary", &sets).unwrap();

        assert_eq!(pref.mode, ReadPreferenceMode::Secondary);
        assert_eq!(pref.tag_sets, vec![doc! { "dc": "east" }, Document::new()]);
        assert!(pref.slave_okay());
    }

    #[test]
    fn rejects_primary_with_tags() {
        let sets = LegacyValue::list(vec![tags(&[("dc", "east")])]);
        assert_eq!(
            normalize_read_preference("primary", &sets),
            Err(ParamWarning::TagsWithPrimary)
        );
    }

    #[test]
    fn rejects_primary_with_an_empty_tag_set() {
        let sets = LegacyValue::list(vec![tags(&[])]);
        assert_eq!(
            normalize_read_preference("primary", &sets),
            Err(ParamWarning::TagsWithPrimary)
        );
        assert_eq!(
            normalize_read_preference("primary", &LegacyValue::list(vec![])).unwrap(),
            ReadPreference::primary()
        );
    }

    #[test]
    fn rejects_scalar_tag_sets() {
        let sets = LegacyValue::list(vec![LegacyValue::Int(1)]);
        assert!(matches!(
            normalize_read_preference("nearest", &sets),
            Err(ParamWarning::InvalidTagSet(_))
        ));
    }

    #[test]
    fn update_keeps_previous_state_on_rejection() {
        let mut pref = ReadPreference::new(ReadPreferenceMode::Nearest);

        assert!(!pref.update("bogus", &LegacyValue::Null));
        assert_eq!(pref.mode, ReadPreferenceMode::Nearest);

        assert!(pref.update("secondary", &LegacyValue::Null));
        assert_eq!(pref.mode, ReadPreferenceMode::Secondary);
    }

    #[test]
    fn slave_okay_is_a_projection_of_the_mode() {
        let mut pref = ReadPreference::primary();
        assert!(!pref.slave_okay());

        pref.set_slave_okay(true);
        assert_eq!(pref.mode, ReadPreferenceMode::SecondaryPreferred);

        pref.tag_sets.push(doc! { "dc": "east" });
        pref.set_slave_okay(false);
        assert_eq!(pref, ReadPreference::primary());
    }

    #[test]
    fn read_preference_legacy_shape() {
        let pref = normalize_read_preference(
            "nearest",
            &LegacyValue::list(vec![tags(&[("dc", "east")])]),
        )
        .unwrap();

        let legacy = pref.to_legacy();
        assert_eq!(legacy.member("type"), Some(LegacyValue::from("nearest")));
        assert!(legacy.member("tagsets").is_some());
        assert_eq!(
            pref.to_document(),
            doc! { "mode": "nearest", "tags": [{ "dc": "east" }] }
        );
    }

    #[test]
    fn write_concern_coerces_booleans_and_clamps_timeout() {
        let wc = normalize_write_concern(&LegacyValue::Bool(true), -5).unwrap();
        assert_eq!(wc, WriteConcern::new(Acknowledgment::Nodes(1), 0));

        let wc = normalize_write_concern(&LegacyValue::Bool(false), 100).unwrap();
        assert_eq!(wc, WriteConcern::new(Acknowledgment::Nodes(0), 100));
    }

    #[test]
    fn write_concern_accepts_tags_and_counts() {
        assert_eq!(
            normalize_write_concern(&"majority".into(), 0).unwrap().w,
            Acknowledgment::majority()
        );
        assert_eq!(
            normalize_write_concern(&LegacyValue::Int(3), 0).unwrap().w,
            Acknowledgment::Nodes(3)
        );
    }

    #[test]
    fn write_concern_rejects_other_types() {
        assert!(normalize_write_concern(&LegacyValue::Float(1.5), 0).is_err());
        assert!(normalize_write_concern(&LegacyValue::Int(-1), 0).is_err());
        assert!(normalize_write_concern(&LegacyValue::list(vec![]), 0).is_err());
    }

    #[test]
    fn write_concern_update_keeps_previous_state() {
        let mut wc = WriteConcern::new(Acknowledgment::majority(), 10);
        assert!(!wc.update(&LegacyValue::Float(2.0), 0));
        assert_eq!(wc, WriteConcern::new(Acknowledgment::majority(), 10));
    }

    #[test]
    fn write_concern_document() {
        assert_eq!(
            WriteConcern::new(Acknowledgment::majority(), 250).to_document(),
            doc! { "w": "majority", "wtimeout": 250_i64 }
        );
        assert_eq!(WriteConcern::default().to_document(), doc! { "w": 1_i64 });
    }
}
