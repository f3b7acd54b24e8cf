use serde::{Deserialize, Serialize};

use crate::error::{QidbError, QidbResult};

/// Scheduler ticks per real-time second.
pub const TICKS_PER_SECOND: u32 = 20;

/// Seconds between progress reports while the save queue is draining.
pub const SAVE_DELAY_SECONDS: u32 = 6;

/// Largest number of slots a single entry may hold.
pub const MAX_ENTRY_ITEMS: usize = 1024;

/// Longest full key (`namespace:identifier`) the structure store accepts.
pub const MAX_KEY_LENGTH: usize = 30;

pub const DEFAULT_CACHE_SIZE: usize = 50;
pub const DEFAULT_SAVE_RATE: usize = 1;

/// Substring no namespace may contain, compared case-insensitively.
const RESERVED_NAMESPACE: &str = "qidb";

/// Which operations emit a log line.
///
/// Lifecycle events and clears are logged by default; everything else is
/// opt-in.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemDatabaseLogSettings {
    pub start_up: bool,
    pub save: bool,
    pub load: bool,
    pub set: bool,
    pub get: bool,
    pub has: bool,
    pub delete: bool,
    pub clear: bool,
    pub values: bool,
    pub keys: bool,
}

impl Default for ItemDatabaseLogSettings {
    fn default() -> Self {
        Self {
            start_up: true,
            save: false,
            load: false,
            set: false,
            get: false,
            has: false,
            delete: false,
            clear: true,
            values: false,
            keys: false,
        }
    }
}

impl ItemDatabaseLogSettings {
    /// Log every operation.
    pub fn all() -> Self {
        Self {
            start_up: true,
            save: true,
            load: true,
            set: true,
            get: true,
            has: true,
            delete: true,
            clear: true,
            values: true,
            keys: true,
        }
    }

    /// Log nothing.
    pub fn none() -> Self {
        Self {
            start_up: false,
            save: false,
            load: false,
            set: false,
            get: false,
            has: false,
            delete: false,
            clear: false,
            values: false,
            keys: false,
        }
    }
}

/// Configuration for a [`QuickItemDatabase`](crate::QuickItemDatabase).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemDatabaseConfig {
    /// Prefix of every key this store owns. `[A-Za-z0-9_]+`, without `qidb`.
    pub namespace: String,
    /// Entries kept in the quick-access cache after each tick.
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    /// Queued entries written out per tick.
    #[serde(default = "default_save_rate")]
    pub save_rate: usize,
    #[serde(default)]
    pub logs: ItemDatabaseLogSettings,
}

fn default_cache_size() -> usize {
    DEFAULT_CACHE_SIZE
}

fn default_save_rate() -> usize {
    DEFAULT_SAVE_RATE
}

impl ItemDatabaseConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            cache_size: DEFAULT_CACHE_SIZE,
            save_rate: DEFAULT_SAVE_RATE,
            logs: ItemDatabaseLogSettings::default(),
        }
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_save_rate(mut self, save_rate: usize) -> Self {
        self.save_rate = save_rate;
        self
    }

    pub fn with_logs(mut self, logs: ItemDatabaseLogSettings) -> Self {
        self.logs = logs;
        self
    }

    /// Check the namespace and the save rate.
    pub fn validate(&self) -> QidbResult<()> {
        validate_namespace(&self.namespace)?;
        if self.save_rate == 0 {
            return Err(QidbError::Configuration {
                namespace: self.namespace.clone(),
                reason: "save rate must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Validate a namespace: non-empty, ASCII alphanumerics and `_` only, and
/// not containing the reserved word in any case.
pub fn validate_namespace(namespace: &str) -> QidbResult<()> {
    let valid = !namespace.is_empty()
        && namespace
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(QidbError::Configuration {
            namespace: namespace.to_string(),
            reason: "accepted characters: A-Z a-z 0-9 _".into(),
        });
    }
    if namespace.to_ascii_lowercase().contains(RESERVED_NAMESPACE) {
        return Err(QidbError::Configuration {
            namespace: namespace.to_string(),
            reason: format!("uses the reserved {RESERVED_NAMESPACE:?} namespace"),
        });
    }
    Ok(())
}
