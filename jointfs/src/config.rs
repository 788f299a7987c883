//! Process-wide timeout settings shared by all joints.

use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Timeout settings applied by every joint in the process.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Timeout for establishing a TCP connection to FTP/SFTP services.
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: Duration,

    /// How long an idle joint stays in its cache before eviction,
    /// counted from the moment it was returned.
    #[serde(default = "default_disk_cache_expire")]
    pub disk_cache_expire: Duration,
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_disk_cache_expire() -> Duration {
    Duration::from_secs(120)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dial_timeout: default_dial_timeout(),
            disk_cache_expire: default_disk_cache_expire(),
        }
    }
}

impl Config {
    /// Set the connection dial timeout.
    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }

    /// Set the idle-joint expiration period.
    pub fn with_disk_cache_expire(mut self, expire: Duration) -> Self {
        self.disk_cache_expire = expire;
        self
    }
}

static CONFIG: RwLock<Config> = RwLock::new(Config {
    dial_timeout: Duration::from_secs(5),
    disk_cache_expire: Duration::from_secs(120),
});

/// Snapshot of the current process-wide configuration.
pub fn get() -> Config {
    CONFIG.read().clone()
}

/// Replace the process-wide configuration. Joints created afterwards
/// pick up the new values; live connections are unaffected.
pub fn set(cfg: Config) {
    *CONFIG.write() = cfg;
}
