use meshstore_common::format_key;

/// Formats the flat `mesh:{sessionId}:{key}` address used by backends that
/// have no native notion of a session/key pair (cache, vector DB, HTTP
/// providers). Re-exported at the crate boundary so store implementations
/// share one formatting point.
pub fn composite_key(session_id: &str, key: &str) -> String {
    format_key(session_id, key)
}

/// Case-insensitive check for whether a key names an embedding field.
pub fn is_embedding_key(key: &str) -> bool {
    meshstore_common::is_embedding_key(key)
}

/// Attempts to parse `value` as a JSON array of floats. Returns `None` on any
/// parse failure or on a non-array JSON value — callers treat this as "no
/// embedding", logging at `warn` rather than failing the surrounding save.
pub fn parse_embedding(value: &str) -> Option<Vec<f32>> {
    let parsed: serde_json::Value = serde_json::from_str(value).ok()?;
    let array = parsed.as_array()?;
    array
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_embedding_accepts_float_array() {
        let v = parse_embedding("[0.1, 0.2, 0.3]").expect("should parse");
        assert_eq!(v, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn parse_embedding_rejects_non_array() {
        assert!(parse_embedding("\"hello\"").is_none());
        assert!(parse_embedding("42").is_none());
    }

    #[test]
    fn parse_embedding_rejects_malformed_json() {
        assert!(parse_embedding("[0.1, 0.2").is_none());
    }

    #[test]
    fn parse_embedding_rejects_mixed_types() {
        assert!(parse_embedding("[0.1, \"oops\", 0.3]").is_none());
    }
}
