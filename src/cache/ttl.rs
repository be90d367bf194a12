//! Smart TTL Policy
//!
//! Scales a base TTL by key namespace: session data is short-lived, static
//! configuration long-lived, education content in between.

use std::time::Duration;

use super::MAX_TTL;

/// Key namespace classes recognised by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNamespace {
    /// Per-session or per-user data (privacy sensitive)
    Session,
    /// Static configuration, low churn
    Static,
    /// Education content catalog
    Content,
    /// Anything else
    Other,
}

impl KeyNamespace {
    /// TTL multiplier for this namespace
    pub fn multiplier(&self) -> f64 {
        match self {
            KeyNamespace::Session => 0.5,
            KeyNamespace::Static => 24.0,
            KeyNamespace::Content => 6.0,
            KeyNamespace::Other => 1.0,
        }
    }
}

impl std::fmt::Display for KeyNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyNamespace::Session => write!(f, "session"),
            KeyNamespace::Static => write!(f, "static"),
            KeyNamespace::Content => write!(f, "content"),
            KeyNamespace::Other => write!(f, "other"),
        }
    }
}

/// Namespace-aware TTL policy
#[derive(Debug, Clone)]
pub struct SmartTtlPolicy {
    session_segments: Vec<String>,
    static_segments: Vec<String>,
    content_segments: Vec<String>,
}

impl Default for SmartTtlPolicy {
    fn default() -> Self {
        Self {
            session_segments: vec!["session".into(), "user".into(), "student".into()],
            static_segments: vec!["static".into(), "config".into()],
            content_segments: vec!["exercise".into(), "content".into(), "curriculum".into()],
        }
    }
}

impl SmartTtlPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a key; any `:`-separated segment may name the namespace.
    /// Session wins over static, static over content.
    pub fn classify(&self, key: &str) -> KeyNamespace {
        let has = |names: &[String]| key.split(':').any(|seg| names.iter().any(|n| n == seg));

        if has(&self.session_segments) {
            KeyNamespace::Session
        } else if has(&self.static_segments) {
            KeyNamespace::Static
        } else if has(&self.content_segments) {
            KeyNamespace::Content
        } else {
            KeyNamespace::Other
        }
    }

    /// Scale `base` for `key`, saturating at [`MAX_TTL`]
    pub fn calculate_ttl(&self, key: &str, base: Duration) -> Duration {
        let scaled = base.as_secs_f64() * self.classify(key).multiplier();
        Duration::try_from_secs_f64(scaled).map_or(MAX_TTL, |ttl| ttl.min(MAX_TTL))
    }
}

// =============================================================================
// Tests
// =============================================================================
