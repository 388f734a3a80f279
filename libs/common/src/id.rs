use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = marks_common::id::prefixed_ulid("bm");
/// assert!(id.starts_with("bm_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Returns true when `id` has the shape `<prefix>_<ulid>`.
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('_'))
        .is_some_and(|ulid| Ulid::from_string(ulid).is_ok())
}

/// Marker trait for types that represent a prefixed ID.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate() -> String {
        prefixed_ulid(Self::PREFIX)
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const BOOKMARK: &str = "bm";
    pub const GATEWAY_SESSION: &str = "gw";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid("bm");
        assert!(id.starts_with("bm_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 3 + 26);
    }

    #[test]
    fn test_uniqueness() {
        let a = prefixed_ulid("bm");
        let b = prefixed_ulid("bm");
        assert_ne!(a, b);
    }

    #[test]
    fn test_has_prefix() {
        let id = prefixed_ulid(prefix::BOOKMARK);
        assert!(has_prefix(&id, prefix::BOOKMARK));
        assert!(!has_prefix(&id, prefix::GATEWAY_SESSION));
        assert!(!has_prefix("bm_not-a-ulid", prefix::BOOKMARK));
        assert!(!has_prefix("bm", prefix::BOOKMARK));
    }
}
