use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9_]{1,15}$").unwrap_or_else(|e| panic!("invalid username regex: {e}"))
    })
}

/// Handle that passed format validation; the only way to reach the network
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Username(String);

impl Username {
    /// Returns `None` unless `raw` matches `[a-zA-Z0-9_]{1,15}`
    pub fn parse(raw: &str) -> Option<Self> {
        if username_pattern().is_match(raw) {
            Some(Self(raw.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Username {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier returned by identity resolution
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_usernames() {
        for name in ["a", "alice", "Bob_99", "_", "abcdefghijklmno"] {
            let username = Username::parse(name).unwrap();
            assert_eq!(username.as_str(), name);
            assert_eq!(username.to_string(), name);
        }
    }

    #[test]
    fn test_invalid_usernames() {
        for name in [
            "",
            "abcdefghijklmnop", // 16 characters
            "alice smith",
            "@alice",
            "alice-smith",
            "al.ice",
            "ålice",
            "alice\n",
        ] {
            assert!(Username::parse(name).is_none(), "{name:?} should be rejected");
        }
    }
}
