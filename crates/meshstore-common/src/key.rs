use std::fmt;

/// The flat addressing form used by cache and vector-search backends:
/// `mesh:{sessionId}:{key}`. No escaping is performed — callers are
/// responsible for avoiding `:` collisions in their keys.
#[derive(Debug, Clone, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct CompositeKey(String);

impl CompositeKey {
    pub fn new(session_id: &str, key: &str) -> Self {
        Self(format_key(session_id, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `mesh:{sessionId}:{key}`, bit-exact. No escaping, no validation.
pub fn format_key(session_id: &str, key: &str) -> String {
    format!("mesh:{session_id}:{key}")
}

/// The universal embedding-detection predicate: the key contains the
/// literal substring `"embedding"`, case-insensitive.
pub fn is_embedding_key(key: &str) -> bool {
    key.to_lowercase().contains("embedding")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_key_is_bit_exact() {
        assert_eq!(format_key("alpha", "note"), "mesh:alpha:note");
    }

    #[test]
    fn composite_key_matches_format_key() {
        let ck = CompositeKey::new("alpha", "note");
        assert_eq!(ck.as_str(), "mesh:alpha:note");
    }

    #[test]
    fn embedding_detection_is_case_insensitive() {
        assert!(is_embedding_key("doc1_embedding"));
        assert!(is_embedding_key("USER_EMBEDDING"));
        assert!(is_embedding_key("EmBeDdInG"));
        assert!(!is_embedding_key("note"));
    }
}
