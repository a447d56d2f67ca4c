//! Connection-level defaults for cursors and batches.
//!
//! A [`BridgeConfig`] is usually loaded once, from JSON or from a BSON
//! document, and handed to [`BridgeStore::with_config`](crate::store::BridgeStore::with_config).
//! Its read preference and write concern go through the same normalization as
//! legacy parameters, but here a rejected value is a hard
//! [`BridgeError::Configuration`] error.
//!
//! ```ignore
//! let config = BridgeConfig::from_json_str(r#"{
//!     "read_preference": { "mode": "secondaryPreferred", "tag_sets": [{ "dc": "east" }] },
//!     "write_concern": { "w": "majority", "wtimeout": 1000 },
//!     "batch_size": 100
//! }"#)?;
//! ```

use bson::{Bson, Document, de::deserialize_from_bson};
use serde::{Deserialize, Serialize};

use crate::{
    convert::to_legacy,
    error::{BridgeError, BridgeResult},
    params::{ReadPreference, WriteConcern, normalize_read_preference, normalize_write_concern},
};

/// Defaults applied to every cursor and batch created through a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BridgeConfig {
    pub read_preference: ReadPreference,
    pub write_concern: WriteConcern,
    /// `0` leaves the batch size to the driver.
    pub batch_size: i32,
    pub ordered: bool,
    /// `0` means no server side time limit.
    pub max_time_ms: i64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            read_preference: ReadPreference::primary(),
            write_concern: WriteConcern::default(),
            batch_size: 0,
            ordered: true,
            max_time_ms: 0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawReadPreference {
    mode: String,
    #[serde(default)]
    tag_sets: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct RawWriteConcern {
    w: Bson,
    #[serde(default, alias = "timeout_ms")]
    wtimeout: i64,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    read_preference: Option<RawReadPreference>,
    write_concern: Option<RawWriteConcern>,
    batch_size: Option<i32>,
    ordered: Option<bool>,
    max_time_ms: Option<i64>,
}

impl BridgeConfig {
    /// Parses a JSON configuration. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] for malformed JSON and
    /// [`BridgeError::Configuration`] for values the normalizer rejects.
    pub fn from_json_str(json: &str) -> BridgeResult<Self> {
        let raw: RawConfig = serde_json::from_str(json)?;
        Self::from_raw(raw)
    }

    /// Reads a configuration from a BSON document, with the same keys as the
    /// JSON form.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Serialization`] for documents of the wrong shape
    /// and [`BridgeError::Configuration`] for values the normalizer rejects.
    pub fn from_document(document: &Document) -> BridgeResult<Self> {
        let raw: RawConfig = deserialize_from_bson(Bson::Document(document.clone()))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawConfig) -> BridgeResult<Self> {
        let defaults = Self::default();

        let read_preference = match raw.read_preference {
            Some(rp) => {
                let tag_sets = to_legacy(&Bson::Array(rp.tag_sets.into_iter().map(Bson::Document).collect()));
                normalize_read_preference(&rp.mode, &tag_sets)
                    .map_err(|warning| BridgeError::Configuration(warning.to_string()))?
            }
            None => defaults.read_preference,
        };

        let write_concern = match raw.write_concern {
            Some(wc) => normalize_write_concern(&to_legacy(&wc.w), wc.wtimeout)
                .map_err(|warning| BridgeError::Configuration(warning.to_string()))?,
            None => defaults.write_concern,
        };

        let batch_size = raw.batch_size.unwrap_or(defaults.batch_size);
        let max_time_ms = raw.max_time_ms.unwrap_or(defaults.max_time_ms);
        if max_time_ms < 0 {
            return Err(BridgeError::Configuration(format!(
                "max_time_ms must not be negative, got {max_time_ms}"
            )));
        }

        Ok(Self {
            read_preference,
            write_concern,
            batch_size,
            ordered: raw.ordered.unwrap_or(defaults.ordered),
            max_time_ms,
        })
    }
}
