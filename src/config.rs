use crate::error::ConfigError;
use std::path::PathBuf;
use std::time::Duration;

const DAY: u64 = 24 * 3600;

/// RFC 5011 timing and trust point configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AutotrustConfig {
    /// Time a new key must stay in ADDPEND before it can become VALID
    pub add_holddown: Duration,

    /// Time a REVOKED key is kept before REMOVED, and REMOVED before deletion
    pub del_holddown: Duration,

    /// Time a MISSING key is kept before REMOVED (zero keeps it forever)
    pub keep_missing: Duration,

    /// Successful probes a key must be seen in while in ADDPEND
    pub pending_count_threshold: u8,

    /// Upper bound on the regular probe interval (RFC 5011 section 2.3)
    pub max_query_interval: Duration,

    /// Upper bound on the retry interval after a failed probe
    pub max_retry_time: Duration,

    /// Lower bound on both probe intervals
    pub min_probe_interval: Duration,

    /// Trust point files to load at startup
    pub anchor_files: Vec<PathBuf>,
}

impl Default for AutotrustConfig {
    fn default() -> Self {
        Self {
            add_holddown: Duration::from_secs(30 * DAY),
            del_holddown: Duration::from_secs(30 * DAY),
            keep_missing: Duration::from_secs(366 * DAY),
            pending_count_threshold: 2,
            max_query_interval: Duration::from_secs(15 * DAY),
            max_retry_time: Duration::from_secs(DAY),
            min_probe_interval: Duration::from_secs(3600),
            anchor_files: vec![],
        }
    }
}

impl AutotrustConfig {
    /// Create a config from environment variables
    /// Returns Err if a variable is present but invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup("ANCHORKEEPER_ADD_HOLDDOWN") {
            config.add_holddown = parse_secs(&value)
                .ok_or_else(|| ConfigError::InvalidHoldDown(value.clone()))?;
        }

        if let Some(value) = lookup("ANCHORKEEPER_DEL_HOLDDOWN") {
            config.del_holddown = parse_secs(&value)
                .ok_or_else(|| ConfigError::InvalidHoldDown(value.clone()))?;
        }

        if let Some(value) = lookup("ANCHORKEEPER_KEEP_MISSING") {
            config.keep_missing = parse_secs(&value)
                .ok_or_else(|| ConfigError::InvalidHoldDown(value.clone()))?;
        }

        if let Some(value) = lookup("ANCHORKEEPER_PENDING_COUNT") {
            config.pending_count_threshold = value
                .trim()
                .parse::<u8>()
                .map_err(|_| ConfigError::InvalidPendingCount(value.clone()))?;
        }

        if let Some(value) = lookup("ANCHORKEEPER_MAX_QUERY_INTERVAL") {
            config.max_query_interval = parse_secs(&value)
                .ok_or_else(|| ConfigError::InvalidInterval(value.clone()))?;
        }

        if let Some(value) = lookup("ANCHORKEEPER_MAX_RETRY_TIME") {
            config.max_retry_time = parse_secs(&value)
                .ok_or_else(|| ConfigError::InvalidInterval(value.clone()))?;
        }

        if let Some(value) = lookup("ANCHORKEEPER_MIN_PROBE_INTERVAL") {
            config.min_probe_interval = parse_secs(&value)
                .ok_or_else(|| ConfigError::InvalidInterval(value.clone()))?;
        }

        if let Some(value) = lookup("ANCHORKEEPER_ANCHOR_FILES") {
            config.anchor_files = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect();
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pending_count_threshold == 0 {
            return Err(ConfigError::InvalidPendingCount(
                "Pending count must be at least 1".to_string(),
            ));
        }

        if self.min_probe_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "Minimum probe interval must be greater than 0".to_string(),
            ));
        }

        if self.max_query_interval < self.min_probe_interval
            || self.max_retry_time < self.min_probe_interval
        {
            return Err(ConfigError::InvalidInterval(format!(
                "Maximum intervals must not be below the minimum of {}s",
                self.min_probe_interval.as_secs()
            )));
        }

        if self.max_retry_time > self.max_query_interval {
            return Err(ConfigError::InvalidInterval(
                "Retry time must not exceed the query interval".to_string(),
            ));
        }

        Ok(())
    }

    pub(crate) fn add_holddown_secs(&self) -> i64 {
        duration_secs(self.add_holddown)
    }

    pub(crate) fn del_holddown_secs(&self) -> i64 {
        duration_secs(self.del_holddown)
    }

    pub(crate) fn keep_missing_secs(&self) -> i64 {
        duration_secs(self.keep_missing)
    }
}

fn duration_secs(d: Duration) -> i64 {
    i64::try_from(d.as_secs()).unwrap_or(i64::MAX)
}

/// Parse a number of seconds, optionally suffixed with s, m, h or d
fn parse_secs(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = match s.char_indices().last()? {
        (i, c) if c.is_ascii_alphabetic() => (&s[..i], c.to_ascii_lowercase()),
        _ => (s, 's'),
    };
    let value = digits.parse::<u64>().ok()?;
    let factor = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => DAY,
        _ => return None,
    };
    value.checked_mul(factor).map(Duration::from_secs)
}
