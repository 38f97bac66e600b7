//! Query-string encoding for option records.
//!
//! Each options type enumerates its own fields through [`QueryParams`],
//! naming the query key and the emission rule for every field. Empty
//! strings, `false`, non-positive numbers and empty maps are omitted.

use std::collections::BTreeMap;

use crate::error::BuildError;

/// An options record that can be encoded as query parameters.
pub trait QueryParams {
    /// Write every populated field into `query`.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::QueryEncoding` if a field cannot be encoded.
    fn encode_query(&self, query: &mut QueryEncoder) -> Result<(), BuildError>;
}

/// Accumulates query parameters, sorted by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryEncoder {
    pairs: BTreeMap<&'static str, String>,
}

impl QueryEncoder {
    /// Emit `key=1` when `value` is true.
    pub fn flag(&mut self, key: &'static str, value: bool) -> &mut Self {
        if value {
            self.pairs.insert(key, String::from("1"));
        }
        self
    }

    /// Emit the decimal value when it is positive.
    pub fn number(&mut self, key: &'static str, value: i64) -> &mut Self {
        if value > 0 {
            self.pairs.insert(key, value.to_string());
        }
        self
    }

    /// Emit the value when it is non-empty.
    pub fn text(&mut self, key: &'static str, value: &str) -> &mut Self {
        if !value.is_empty() {
            self.pairs.insert(key, String::from(value));
        }
        self
    }

    /// Emit the JSON encoding of a map when it has entries.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::QueryEncoding` if the map cannot be serialised.
    pub fn json_map(
        &mut self,
        key: &'static str,
        value: &BTreeMap<String, String>,
    ) -> Result<&mut Self, BuildError> {
        if !value.is_empty() {
            let json = serde_json::to_string(value).map_err(|error| BuildError::QueryEncoding {
                message: format!("{key}: {error}"),
            })?;
            self.pairs.insert(key, json);
        }
        Ok(self)
    }

    /// Returns true when no parameter has been emitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Render the form-urlencoded query string, without a leading `?`.
    ///
    /// # Errors
    ///
    /// Returns `BuildError::QueryEncoding` if encoding fails.
    pub fn finish(&self) -> Result<String, BuildError> {
        serde_urlencoded::to_string(&self.pairs).map_err(|error| BuildError::QueryEncoding {
            message: error.to_string(),
        })
    }
}

/// Encode an options record as a query string.
///
/// # Errors
///
/// Returns `BuildError::QueryEncoding` if a field cannot be encoded.
pub fn query_string<P: QueryParams + ?Sized>(params: &P) -> Result<String, BuildError> {
    let mut encoder = QueryEncoder::default();
    params.encode_query(&mut encoder)?;
    encoder.finish()
}

/// Append an encoded query to `path`, omitting the `?` for an empty query.
#[must_use]
pub fn with_query(path: &str, query: &str) -> String {
    if query.is_empty() {
        String::from(path)
    } else {
        format!("{path}?{query}")
    }
}
