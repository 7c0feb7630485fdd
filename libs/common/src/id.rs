use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = chatter_common::id::prefixed_ulid("conn");
/// assert!(id.starts_with("conn_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string())
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const CHAT: &str = "chat";
    pub const MESSAGE: &str = "msg";
    pub const CONNECTION: &str = "conn";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_ulid_format() {
        let id = prefixed_ulid(prefix::CONNECTION);
        assert!(id.starts_with("conn_"));
        // ULID is 26 chars, plus prefix + underscore
        assert_eq!(id.len(), 5 + 26);
    }

    #[test]
    fn test_uniqueness() {
        let a = prefixed_ulid("usr");
        let b = prefixed_ulid("usr");
        assert_ne!(a, b);
    }

    #[test]
    fn test_ids_sort_by_creation_time() {
        let first = prefixed_ulid(prefix::MESSAGE);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = prefixed_ulid(prefix::MESSAGE);
        assert!(first < second);
    }
}
