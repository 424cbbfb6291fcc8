// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Tunable parameters for the sync coordinator and network monitor.

use std::time::Duration;

use roam_core::DEFAULT_QUOTA_BYTES;

/// Configuration for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Replay attempts before a queued mutation is dropped. There is no
    /// backoff between passes; a failed operation simply waits for the
    /// next one.
    pub max_retries: u32,
    /// Quiet window after a reconnect before the triggered sync pass runs,
    /// so online/offline flapping collapses into a single pass.
    pub debounce: Duration,
    /// Fallback timer driving periodic sync passes while online.
    pub poll_interval: Duration,
    /// Collection fetches younger than this are served from cache.
    pub refresh_ttl: Duration,
    /// Local storage quota surfaced through `storage_info`.
    pub storage_quota_bytes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            max_retries: 3,
            debounce: Duration::from_secs(1),
            poll_interval: Duration::from_secs(30),
            refresh_ttl: Duration::from_secs(60),
            storage_quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }
}

impl SyncConfig {
    /// Overrides the retry ceiling.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Overrides the reconnect debounce window.
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Overrides the periodic sync interval.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Overrides the smart-refresh freshness window.
    pub fn with_refresh_ttl(mut self, refresh_ttl: Duration) -> Self {
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Overrides the local storage quota.
    pub fn with_storage_quota(mut self, bytes: u64) -> Self {
        self.storage_quota_bytes = bytes;
        self
    }
}
