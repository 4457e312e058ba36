use std::time::{Duration, Instant};

use dashmap::DashMap;
use rand::Rng;

struct OtpEntry {
    code: String,
    expires_at: Instant,
}

/// In-memory store for emailed one-time codes (account verification and
/// password resets), keyed by email. One live code per address; issuing a
/// new code replaces the old one. Codes do not survive a restart.
pub struct OtpStore {
    codes: DashMap<String, OtpEntry>,
    ttl: Duration,
}

impl OtpStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            codes: DashMap::new(),
            ttl,
        }
    }

    /// Generates a six-digit code for `email` and remembers it until the
    /// TTL runs out or it is consumed.
    pub fn issue(&self, email: &str) -> String {
        let code = rand::rng().random_range(100_000..=999_999).to_string();
        self.codes.insert(
            email.to_owned(),
            OtpEntry {
                code: code.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        code
    }

    /// Checks `code` against the live entry for `email`. A match removes
    /// the entry, so each code works at most once. A mismatch leaves the
    /// entry in place for further attempts.
    pub fn consume(&self, email: &str, code: &str) -> bool {
        let now = Instant::now();
        let matched = self
            .codes
            .remove_if(email, |_, entry| entry.expires_at > now && entry.code == code)
            .is_some();
        if !matched {
            self.codes.remove_if(email, |_, entry| entry.expires_at <= now);
        }
        matched
    }
}
