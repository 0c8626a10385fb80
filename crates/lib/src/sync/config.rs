//! Runtime settings for [`SyncHub`](super::SyncHub).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings shared by every publication and mirror created from one hub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Upper bound on a single broker operation (fetch, post, broadcast).
    #[serde(with = "duration_ms", rename = "call_timeout_ms")]
    pub call_timeout: Duration,
    /// Fetches a resync tries before giving up until the next trigger. Zero
    /// is treated as one.
    pub max_resync_attempts: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            max_resync_attempts: 3,
        }
    }
}

impl HubConfig {
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Values below one are raised to one.
    pub fn with_max_resync_attempts(mut self, attempts: u32) -> Self {
        self.max_resync_attempts = attempts.max(1);
        self
    }

    /// Fetch attempts per resync, never fewer than one.
    pub fn resync_attempts(&self) -> u32 {
        self.max_resync_attempts.max(1)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
