use std::fmt;

/// Identifies mergeable updates that may be folded together: (kind, key)
///
/// Example: MergeKey { kind: "HtmlCacheUpdate".to_string(), key: "page:42".to_string() }
/// matches any other pending HtmlCacheUpdate for page 42 in the same bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MergeKey {
    /// Update kind (`DeferrableUpdate::kind`)
    pub kind: String,

    /// Kind-specific key (`MergeableUpdate::merge_key`)
    pub key: String,
}

impl MergeKey {
    pub fn new(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for MergeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.key)
    }
}
