use serde::{Deserialize, Serialize};

/// Per-pager counters. Each session owns its own instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagerMetrics {
    pub requests_sent: u64,
    pub retries: u64,
    pub pages_fetched: u64,
    pub entries_received: u64,
    pub reply_cursors_opened: u64,
    pub failures: u64,
}

impl PagerMetrics {
    pub fn record_requests(&mut self, attempts: usize) {
        let attempts = attempts as u64;
        self.requests_sent = self.requests_sent.saturating_add(attempts);
        self.retries = self.retries.saturating_add(attempts.saturating_sub(1));
    }

    pub fn record_page(&mut self, entries: usize) {
        self.pages_fetched = self.pages_fetched.saturating_add(1);
        self.entries_received = self.entries_received.saturating_add(entries as u64);
    }

    pub fn record_reply_cursor(&mut self) {
        self.reply_cursors_opened = self.reply_cursors_opened.saturating_add(1);
    }

    pub fn record_failure(&mut self) {
        self.failures = self.failures.saturating_add(1);
    }
}
