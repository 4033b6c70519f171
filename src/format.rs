//! Syntactic filter applied before any network activity.
//!
//! The pattern is deliberately coarse: unrestricted `._%+-` in the local
//! part, any dotted label sequence in the domain, two-letter TLD minimum.
//! It is a cheap gate, not an RFC 5322 grammar; keep its laxity as-is,
//! downstream behaviour on edge-case inputs depends on it.

use std::sync::LazyLock;

use regex::Regex;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("static pattern must compile")
});

/// Returns true iff `email` matches the fixed surface pattern.
pub fn is_valid_format(email: &str) -> bool {
    EMAIL_PATTERN.is_match(email)
}
