//! Resource locators.

use std::fmt;

/// A resource locator such as `file:///data/model.emb` or `models/a.json`.
///
/// Only the parts needed for codec selection are interpreted: the protocol
/// (URI scheme) and the file extension of the last path segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Uri {
    raw: String,
}

impl Uri {
    pub fn parse(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// The scheme before `:`, e.g. `"file"` for `file:///a.emb`.
    ///
    /// Single-letter schemes are treated as Windows drive letters, not protocols.
    pub fn protocol(&self) -> Option<&str> {
        let (scheme, _) = self.raw.split_once(':')?;
        let mut chars = scheme.chars();
        let first = chars.next()?;
        let valid = scheme.len() > 1
            && first.is_ascii_alphabetic()
            && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        valid.then_some(scheme)
    }

    /// The path part: everything after the scheme, without query or fragment.
    pub fn path(&self) -> &str {
        let rest = match self.protocol() {
            Some(scheme) => &self.raw[scheme.len() + 1..],
            None => self.raw.as_str(),
        };
        let end = rest.find(['?', '#']).unwrap_or(rest.len());
        &rest[..end]
    }

    /// The extension of the last path segment, e.g. `"emb"` for `dir/a.emb`.
    ///
    /// Hidden-file names such as `.config` have no extension.
    pub fn extension(&self) -> Option<&str> {
        let path = self.path();
        let segment = path.rsplit(['/', '\\']).next().unwrap_or(path);
        match segment.rfind('.') {
            Some(dot) if dot > 0 && dot + 1 < segment.len() => Some(&segment[dot + 1..]),
            _ => None,
        }
    }
}

impl From<&str> for Uri {
    fn from(raw: &str) -> Self {
        Uri::parse(raw)
    }
}

impl From<String> for Uri {
    fn from(raw: String) -> Self {
        Uri::parse(raw)
    }
}

impl From<&Uri> for Uri {
    fn from(uri: &Uri) -> Self {
        uri.clone()
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol() {
        assert_eq!(Uri::parse("foo://bar").protocol(), Some("foo"));
        assert_eq!(Uri::parse("emb:model").protocol(), Some("emb"));
        assert_eq!(Uri::parse("C:\\models\\a.emb").protocol(), None);
        assert_eq!(Uri::parse("models/a.emb").protocol(), None);
        assert_eq!(Uri::parse("1x://a").protocol(), None);
    }

    #[test]
    fn test_extension() {
        assert_eq!(Uri::parse("file:///data/model.emb").extension(), Some("emb"));
        assert_eq!(Uri::parse("a/b.tar.embz?v=2#top").extension(), Some("embz"));
        assert_eq!(Uri::parse("C:\\models\\a.json").extension(), Some("json"));
        assert_eq!(Uri::parse("foo://bar").extension(), None);
        assert_eq!(Uri::parse("dir.d/file").extension(), None);
        assert_eq!(Uri::parse(".config").extension(), None);
        assert_eq!(Uri::parse("trailing.").extension(), None);
    }

    #[test]
    fn test_path() {
        assert_eq!(Uri::parse("http://host/a.json?x=1").path(), "//host/a.json");
        assert_eq!(Uri::parse("plain.emb").path(), "plain.emb");
    }
}
