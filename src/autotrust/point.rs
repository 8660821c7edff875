use std::path::{Path, PathBuf};

use super::key::{KeyRecord, KeyState};
use crate::config::AutotrustConfig;
use crate::dnssec::{Dnskey, canonical_name};

/// Autonomous trust anchor state for one zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPoint {
    /// Zone apex, lowercase and fully qualified
    pub zone: String,
    /// Persistence file, exclusively owned by this point
    pub file: PathBuf,
    /// Tracked keys; order carries no meaning
    pub keys: Vec<KeyRecord>,
    pub last_queried: i64,
    pub last_success: i64,
    pub next_probe_time: i64,
    /// Seconds between probes after success
    pub query_interval: u32,
    /// Seconds between probes after failure
    pub retry_time: u32,
    /// Consecutive failed probes
    pub query_failed: u8,
}

impl TrustPoint {
    /// A point that has never been probed; it is due immediately.
    pub fn new(zone: &str, file: impl Into<PathBuf>, config: &AutotrustConfig) -> Self {
        Self {
            zone: canonical_name(zone),
            file: file.into(),
            keys: Vec::new(),
            last_queried: 0,
            last_success: 0,
            next_probe_time: 0,
            // Placeholders until the first verified probe derives both from
            // its RRSIG: query at the retry cap, retry at the probe floor.
            query_interval: clamp_u32(config.max_retry_time.as_secs()),
            retry_time: clamp_u32(config.min_probe_interval.as_secs()),
            query_failed: 0,
        }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Add a key that is trusted out of band, e.g. when seeding a new file.
    pub fn add_trusted_key(&mut self, key: Dnskey, now: i64) {
        match self.find_key_mut(&key) {
            Some(record) => record.set_state(KeyState::Valid, now),
            None => self.keys.push(KeyRecord::trusted(key, now)),
        }
    }

    pub fn find_key(&self, key: &Dnskey) -> Option<&KeyRecord> {
        self.keys.iter().find(|record| record.key.same_key(key))
    }

    pub fn find_key_mut(&mut self, key: &Dnskey) -> Option<&mut KeyRecord> {
        self.keys.iter_mut().find(|record| record.key.same_key(key))
    }

    /// Keys that currently anchor validation for this zone
    pub fn trusted_keys(&self) -> Vec<Dnskey> {
        self.keys
            .iter()
            .filter(|record| record.is_trusted())
            .map(|record| record.key.clone())
            .collect()
    }

    pub fn has_trusted_keys(&self) -> bool {
        self.keys.iter().any(KeyRecord::is_trusted)
    }

    pub fn count_in_state(&self, state: KeyState) -> usize {
        self.keys.iter().filter(|record| record.state == state).count()
    }

    /// Reset per-probe observation flags before applying a new RRset.
    pub(crate) fn clear_fetched(&mut self) {
        for record in &mut self.keys {
            record.fetched = false;
        }
    }
}

pub(crate) fn clamp_u32(secs: u64) -> u32 {
    u32::try_from(secs).unwrap_or(u32::MAX)
}
