use std::{cmp::min, collections::HashMap, time::Duration};

use mediavault_core::DownloadOptions;

/// Request header map.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Headers {
    inner: HashMap<String, String>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl From<HashMap<String, String>> for Headers {
    fn from(map: HashMap<String, String>) -> Self {
        Self { inner: map }
    }
}

/// Exponential backoff schedule, derived from [`DownloadOptions`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub page_delay: Duration,
}

impl From<&DownloadOptions> for RetryPolicy {
    fn from(opts: &DownloadOptions) -> Self {
        Self {
            max_retries: opts.max_retries,
            base_delay: opts.base_delay,
            max_delay: opts.max_delay,
            page_delay: opts.page_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DownloadOptions::default())
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (1-based):
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let exponential = self.base_delay * 2_u32.saturating_pow(attempt.saturating_sub(1));
        min(exponential, self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            page_delay: Duration::from_secs(1),
        }
    }

    #[rstest]
    #[case(0, Duration::ZERO)]
    #[case(1, Duration::from_millis(100))]
    #[case(2, Duration::from_millis(200))]
    #[case(3, Duration::from_millis(400))]
    #[case(4, Duration::from_millis(800))]
    #[case(10, Duration::from_secs(5))]
    #[case(30, Duration::from_secs(5))]
    fn exponential_backoff_schedule(#[case] attempt: u32, #[case] expected: Duration) {
        assert_eq!(policy().delay_for_attempt(attempt), expected);
    }

    #[test]
    fn policy_mirrors_download_options() {
        let opts = DownloadOptions::default();
        let policy = RetryPolicy::from(&opts);
        assert_eq!(policy.max_retries, opts.max_retries);
        assert_eq!(policy.base_delay, opts.base_delay);
        assert_eq!(policy.page_delay, opts.page_delay);
    }

    #[test]
    fn headers_insert_and_get() {
        let mut headers = Headers::new();
        headers.insert("User-Agent", "mediavault");
        assert_eq!(headers.get("User-Agent"), Some("mediavault"));
        assert_eq!(headers.get("Cookie"), None);
        assert!(!headers.is_empty());
    }
}
