//! Open key/value configuration passed to codecs.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use crate::error::EncodeError;

/// Codec configuration.
///
/// Keys are codec-specific; a codec reads the keys it knows and ignores the
/// rest. A known key holding a value of the wrong type is reported by the
/// codec as [`EncodeError::UnsupportedOption`].
///
/// ```rust
/// use emodel::codec::CodecOptions;
///
/// let options = CodecOptions::new().with("indent", 2).with("encoding", "utf-8");
/// assert_eq!(options.get("indent"), Some(&serde_json::json!(2)));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodecOptions {
    entries: BTreeMap<String, JsonValue>,
}

impl CodecOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&JsonValue> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JsonValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn bool_option(&self, key: &str) -> Result<Option<bool>, EncodeError> {
        self.typed(key, JsonValue::as_bool)
    }

    pub(crate) fn u64_option(&self, key: &str) -> Result<Option<u64>, EncodeError> {
        self.typed(key, JsonValue::as_u64)
    }

    pub(crate) fn i64_option(&self, key: &str) -> Result<Option<i64>, EncodeError> {
        self.typed(key, JsonValue::as_i64)
    }

    pub(crate) fn str_option(&self, key: &str) -> Result<Option<&str>, EncodeError> {
        self.typed(key, JsonValue::as_str)
    }

    fn typed<'a, T>(
        &'a self,
        key: &str,
        convert: impl Fn(&'a JsonValue) -> Option<T>,
    ) -> Result<Option<T>, EncodeError> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => convert(value)
                .map(Some)
                .ok_or_else(|| unsupported(key, value)),
        }
    }
}

pub(crate) fn unsupported(key: &str, value: &JsonValue) -> EncodeError {
    EncodeError::UnsupportedOption {
        key: key.to_string(),
        value: value.to_string(),
    }
}

impl<K: Into<String>, V: Into<JsonValue>> FromIterator<(K, V)> for CodecOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut options = Self::new();
        for (key, value) in iter {
            options.set(key, value);
        }
        options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let options = CodecOptions::new()
            .with("compress", true)
            .with("indent", 4)
            .with("level", -1)
            .with("encoding", "utf-8");

        assert_eq!(options.bool_option("compress"), Ok(Some(true)));
        assert_eq!(options.u64_option("indent"), Ok(Some(4)));
        assert_eq!(options.i64_option("level"), Ok(Some(-1)));
        assert_eq!(options.str_option("encoding"), Ok(Some("utf-8")));
        assert_eq!(options.bool_option("missing"), Ok(None));
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let options = CodecOptions::new().with("indent", "wide");
        assert_eq!(
            options.u64_option("indent"),
            Err(EncodeError::UnsupportedOption {
                key: "indent".to_string(),
                value: "\"wide\"".to_string(),
            })
        );
    }

    #[test]
    fn test_from_iter() {
        let options: CodecOptions = [("a", 1), ("b", 2)].into_iter().collect();
        assert_eq!(options.iter().count(), 2);
        assert!(!options.is_empty());
    }
}
