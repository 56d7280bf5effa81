//! PII detection over response payloads
//!
//! A coarse heuristic: the raw response text is searched for sentinel
//! field-name tokens. Matching is case-sensitive, so `"Email"` does not
//! match the `email` token.

/// Sentinel tokens used when none are configured
pub const DEFAULT_PII_TOKENS: &[&str] = &["email", "mobile", "firstname", "lastname"];

/// Decides whether a response payload carries personally identifiable data
pub trait PiiDetector: Send + Sync {
    fn contains_pii(&self, text: &str) -> bool;
}

impl<F> PiiDetector for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn contains_pii(&self, text: &str) -> bool {
        self(text)
    }
}

/// Substring search for a fixed token set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentinelPiiDetector {
    tokens: Vec<String>,
}

impl SentinelPiiDetector {
    /// Build a detector from `tokens`. Empty tokens are dropped, since they
    /// would match every payload.
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tokens = tokens
            .into_iter()
            .map(Into::into)
            .filter(|t: &String| !t.is_empty())
            .collect();
        Self { tokens }
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

impl Default for SentinelPiiDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PII_TOKENS.iter().copied())
    }
}

impl PiiDetector for SentinelPiiDetector {
    fn contains_pii(&self, text: &str) -> bool {
        self.tokens
            .iter()
            .any(|token| text.contains(token.as_str()))
    }
}
