use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::codec;
use super::engine::{self, ProbeContext, ProbeOutcome};
use super::point::TrustPoint;
use super::scheduler::{ProbeHandle, ProbeScheduler};
use crate::config::AutotrustConfig;
use crate::dnssec::{Dnskey, DnskeyRrset, KeySetVerifier, canonical_name};
use crate::error::{AutotrustError, Result};

/// Outcome of loading the configured trust point files
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: Vec<ProbeHandle>,
    /// Files that exist but have no autonomous state yet
    pub empty: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, AutotrustError)>,
}

/// All trust points under RFC 5011 management, plus the probe schedule.
///
/// Points live in an arena keyed by the handle the scheduler issued for
/// them. Each point sits behind its own lock so that one probe per point
/// runs at a time while different points can be probed concurrently.
/// Lock order is point before schedule, never the reverse.
pub struct AutotrustAnchors {
    config: AutotrustConfig,
    points: RwLock<HashMap<ProbeHandle, Arc<Mutex<TrustPoint>>>>,
    schedule: Mutex<ProbeScheduler>,
}

impl AutotrustAnchors {
    pub fn new(config: AutotrustConfig) -> Self {
        Self {
            config,
            points: RwLock::new(HashMap::new()),
            schedule: Mutex::new(ProbeScheduler::new()),
        }
    }

    pub fn config(&self) -> &AutotrustConfig {
        &self.config
    }

    /// Load every file listed in the configuration.
    pub fn load_configured(&self) -> LoadReport {
        let mut report = LoadReport::default();
        for path in &self.config.anchor_files {
            match self.read_file(path) {
                Ok(Some(handle)) => report.loaded.push(handle),
                Ok(None) => report.empty.push(path.clone()),
                Err(e) => {
                    error!("autotrust: not managing {}: {}", path.display(), e);
                    report.failed.push((path.clone(), e));
                }
            }
        }
        report
    }

    /// Read a trust point file and put the point under management.
    ///
    /// A missing file yields `Ok(None)`. A file that parses but trusts no
    /// key is refused rather than managed with zero anchors.
    pub fn read_file(&self, path: &Path) -> Result<Option<ProbeHandle>> {
        let Some(point) = codec::read_point(path, &self.config)? else {
            info!("autotrust: {} has no state yet", path.display());
            return Ok(None);
        };

        if !point.has_trusted_keys() {
            return Err(AutotrustError::NoTrustedKeys {
                zone: point.zone,
                path: path.to_path_buf(),
            });
        }

        let handle = self.add_point(point)?;
        Ok(Some(handle))
    }

    /// Put an in-memory point under management.
    pub fn add_point(&self, point: TrustPoint) -> Result<ProbeHandle> {
        let mut points = self.points.write();
        for existing in points.values() {
            let existing = existing.lock();
            if existing.zone == point.zone {
                return Err(AutotrustError::DuplicateTrustPoint(point.zone));
            }
            if existing.file == point.file {
                return Err(AutotrustError::DuplicateTrustPoint(
                    point.file.display().to_string(),
                ));
            }
        }

        let handle = self
            .schedule
            .lock()
            .insert(&point.zone, point.next_probe_time);
        info!(
            "autotrust: managing {} from {} ({} keys), handle {}",
            point.zone,
            point.file.display(),
            point.keys.len(),
            handle
        );
        points.insert(handle, Arc::new(Mutex::new(point)));
        Ok(handle)
    }

    /// Persist the current state of a point.
    pub fn write_file(&self, handle: ProbeHandle) -> Result<()> {
        let point = self.get(handle)?;
        let point = point.lock();
        codec::write_point(&point)
    }

    /// Stop managing a point and return its last state.
    pub fn remove_point(&self, handle: ProbeHandle) -> Option<TrustPoint> {
        let removed = self.points.write().remove(&handle)?;
        self.schedule.lock().remove(handle);
        let point = removed.lock().clone();
        info!("autotrust: no longer managing {}", point.zone);
        Some(point)
    }

    /// Points due for a probe at `now`.
    ///
    /// Each returned point is provisionally rescheduled one minimum probe
    /// interval ahead, so a probe that never reports back is retried.
    pub fn due_points(&self, now: i64) -> Vec<ProbeHandle> {
        let lease = i64::try_from(self.config.min_probe_interval.as_secs()).unwrap_or(i64::MAX);
        let mut schedule = self.schedule.lock();
        let due: Vec<ProbeHandle> = schedule
            .iter()
            .take_while(|(_, when)| *when <= now)
            .map(|(handle, _)| handle)
            .collect();

        for handle in &due {
            schedule.reschedule(*handle, now.saturating_add(lease));
        }
        due
    }

    /// Time of the earliest scheduled probe
    pub fn next_probe_time(&self) -> Option<i64> {
        self.schedule.lock().peek().map(|(_, when)| when)
    }

    pub fn is_scheduled(&self, handle: ProbeHandle) -> bool {
        self.schedule.lock().contains(handle)
    }

    /// Apply a probe result to a point, persist it and reschedule it.
    ///
    /// Returns `Ok(false)` when the zone has no trust anchor left; the
    /// point is then taken off the schedule but kept, so lookups for the
    /// zone find no trusted keys instead of no trust point. A failed
    /// write is returned as an error after the point was rescheduled.
    pub fn process_prime(
        &self,
        verifier: &dyn KeySetVerifier,
        handle: ProbeHandle,
        rrset: Option<&DnskeyRrset>,
        now: i64,
    ) -> Result<bool> {
        let point = self.get(handle)?;
        let mut point = point.lock();

        let ctx = ProbeContext {
            verifier,
            config: &self.config,
            now,
        };
        let outcome = engine::process_prime(&ctx, &mut point, rrset);

        {
            let mut schedule = self.schedule.lock();
            if outcome == ProbeOutcome::AllRevoked {
                schedule.remove(handle);
            } else {
                schedule.reschedule(handle, point.next_probe_time);
            }
        }

        let written = codec::write_point(&point);

        if !outcome.anchors_remain() {
            error!(
                "autotrust: trust point {} lost all anchors, stopped probing; re-provision it",
                point.zone
            );
        }
        written?;
        Ok(outcome.anchors_remain())
    }

    /// Keys that currently anchor validation of `zone`.
    ///
    /// Empty for a zone whose anchors were all revoked; `None` for a zone
    /// that is not managed.
    pub fn trusted_keys(&self, zone: &str) -> Option<Vec<Dnskey>> {
        let zone = canonical_name(zone);
        let points = self.points.read();
        points
            .values()
            .map(|p| p.lock())
            .find(|p| p.zone == zone)
            .map(|p| p.trusted_keys())
    }

    pub fn handle_for_zone(&self, zone: &str) -> Option<ProbeHandle> {
        let zone = canonical_name(zone);
        self.points
            .read()
            .iter()
            .find(|(_, p)| p.lock().zone == zone)
            .map(|(handle, _)| *handle)
    }

    /// Snapshot of a point's state
    pub fn point(&self, handle: ProbeHandle) -> Option<TrustPoint> {
        self.points.read().get(&handle).map(|p| p.lock().clone())
    }

    pub fn zone_of(&self, handle: ProbeHandle) -> Option<String> {
        self.points.read().get(&handle).map(|p| p.lock().zone.clone())
    }

    pub fn len(&self) -> usize {
        self.points.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.read().is_empty()
    }

    /// Log every trust point with its timers and keys.
    pub fn debug_print(&self) {
        let points = self.points.read();
        let mut handles: Vec<_> = points.keys().copied().collect();
        handles.sort();

        info!("autotrust: {} trust points", handles.len());
        for handle in handles {
            let point = points[&handle].lock();
            info!(
                "trust point {} file {} scheduled {}",
                point.zone,
                point.file.display(),
                self.is_scheduled(handle)
            );
            info!(
                "  last_queried {} last_success {} next_probe_time {}",
                point.last_queried, point.last_success, point.next_probe_time
            );
            info!(
                "  query_interval {}s retry_time {}s query_failed {}",
                point.query_interval, point.retry_time, point.query_failed
            );
            if point.keys.is_empty() {
                warn!("  no keys");
            }
            for record in &point.keys {
                info!(
                    "  key {} {} pending_count {} fetched {} revoked {} lastchange {}",
                    record.key_tag(),
                    record.state,
                    record.pending_count,
                    record.fetched,
                    record.revoked,
                    record.last_change
                );
            }
        }
    }

    fn get(&self, handle: ProbeHandle) -> Result<Arc<Mutex<TrustPoint>>> {
        let point = self.points.read().get(&handle).cloned();
        point.ok_or_else(|| {
            debug!("autotrust: lookup of unknown handle {}", handle);
            AutotrustError::UnknownTrustPoint(handle.as_u64())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autotrust::KeyState;
    use crate::dnssec::{DnsSecError, Rrsig, constants};

    const T0: i64 = 1_700_000_000;

    /// Accepts the first RRSIG of any RRset
    struct TrustAll;

    impl KeySetVerifier for TrustAll {
        fn verify_with_key<'a>(
            &self,
            rrset: &'a DnskeyRrset,
            _: &Dnskey,
            _: i64,
        ) -> crate::dnssec::errors::Result<&'a Rrsig> {
            rrset.signatures.first().ok_or(DnsSecError::NoRrsig)
        }
    }

    struct TrustNone;

    impl KeySetVerifier for TrustNone {
        fn verify_with_key<'a>(
            &self,
            _: &'a DnskeyRrset,
            _: &Dnskey,
            _: i64,
        ) -> crate::dnssec::errors::Result<&'a Rrsig> {
            Err(DnsSecError::SignatureVerificationFailed)
        }
    }

    fn key(zone: &str, byte: u8) -> Dnskey {
        Dnskey::new(zone, 3600, 257, 15, vec![byte; 32])
    }

    /// DNSKEY RRset with a placeholder RRSIG by its first key
    fn signed(zone: &str, keys: Vec<Dnskey>) -> DnskeyRrset {
        let sig = Rrsig {
            type_covered: constants::TYPE_DNSKEY,
            algorithm: keys[0].algorithm,
            labels: 1,
            original_ttl: 3600,
            expiration: (T0 + 30 * 86400) as u32,
            inception: (T0 - 86400) as u32,
            key_tag: keys[0].key_tag(),
            signer_name: zone.to_string(),
            signature: vec![0; 64],
        };
        DnskeyRrset::new(zone, 3600, keys, vec![sig])
    }

    fn seeded(dir: &Path, zone: &str, next_probe: i64) -> TrustPoint {
        let mut point = TrustPoint::new(zone, dir.join(format!("{}key", zone)), &AutotrustConfig::default());
        point.add_trusted_key(key(zone, 1), T0 - 86400);
        point.next_probe_time = next_probe;
        point
    }

    #[test]
    fn test_duplicate_zone_or_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = AutotrustAnchors::new(AutotrustConfig::default());
        anchors.add_point(seeded(dir.path(), "example.", T0)).unwrap();

        assert!(matches!(
            anchors.add_point(seeded(dir.path(), "example.", T0)),
            Err(AutotrustError::DuplicateTrustPoint(_))
        ));

        let mut same_file = seeded(dir.path(), "other.", T0);
        same_file.file = dir.path().join("example.key");
        assert!(anchors.add_point(same_file).is_err());
        assert_eq!(anchors.len(), 1);
    }

    #[test]
    fn test_due_points_are_leased() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = AutotrustAnchors::new(AutotrustConfig::default());
        let a = anchors.add_point(seeded(dir.path(), "a.", T0)).unwrap();
        let b = anchors.add_point(seeded(dir.path(), "b.", T0 + 10)).unwrap();
        anchors.add_point(seeded(dir.path(), "c.", T0 + 7200)).unwrap();

        assert_eq!(anchors.due_points(T0 + 10), vec![a, b]);
        // Leased a minimum probe interval ahead
        assert!(anchors.due_points(T0 + 20).is_empty());
        assert_eq!(anchors.next_probe_time(), Some(T0 + 3610));
    }

    #[test]
    fn test_process_prime_persists_and_reschedules() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = AutotrustAnchors::new(AutotrustConfig::default());
        let handle = anchors.add_point(seeded(dir.path(), "example.", T0)).unwrap();
        let set = signed("example.", vec![key("example.", 1)]);

        assert!(anchors.process_prime(&TrustAll, handle, Some(&set), T0).unwrap());

        let point = anchors.point(handle).unwrap();
        assert_eq!(point.last_success, T0);
        assert_eq!(anchors.next_probe_time(), Some(point.next_probe_time));

        let on_disk = codec::read_point(&point.file, anchors.config()).unwrap().unwrap();
        assert_eq!(on_disk, point);
    }

    #[test]
    fn test_failed_probe_keeps_point_scheduled() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = AutotrustAnchors::new(AutotrustConfig::default());
        let handle = anchors.add_point(seeded(dir.path(), "example.", T0)).unwrap();
        let set = signed("example.", vec![key("example.", 1)]);

        assert!(anchors.process_prime(&TrustNone, handle, Some(&set), T0).unwrap());
        assert!(anchors.process_prime(&TrustNone, handle, None, T0 + 60).unwrap());

        let point = anchors.point(handle).unwrap();
        assert_eq!(point.query_failed, 2);
        assert!(anchors.is_scheduled(handle));
        assert_eq!(anchors.next_probe_time(), Some(T0 + 60 + i64::from(point.retry_time)));
    }

    #[test]
    fn test_exhausted_point_leaves_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = AutotrustAnchors::new(AutotrustConfig::default());
        let handle = anchors.add_point(seeded(dir.path(), "example.", T0)).unwrap();
        let set = signed("example.", vec![key("example.", 1).with_revoke_bit()]);

        assert!(!anchors.process_prime(&TrustAll, handle, Some(&set), T0).unwrap());
        assert!(!anchors.is_scheduled(handle));
        assert_eq!(anchors.trusted_keys("example."), Some(vec![]));
        assert_eq!(anchors.point(handle).unwrap().keys[0].state, KeyState::Revoked);

        // The revoked state reached disk and is refused on reload
        let reloaded = AutotrustAnchors::new(AutotrustConfig::default());
        let path = anchors.point(handle).unwrap().file;
        assert!(matches!(
            reloaded.read_file(&path),
            Err(AutotrustError::NoTrustedKeys { .. })
        ));
    }

    #[test]
    fn test_unknown_handle() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = AutotrustAnchors::new(AutotrustConfig::default());
        let handle = anchors.add_point(seeded(dir.path(), "example.", T0)).unwrap();
        assert!(anchors.remove_point(handle).is_some());

        assert!(matches!(
            anchors.process_prime(&TrustAll, handle, None, T0),
            Err(AutotrustError::UnknownTrustPoint(_))
        ));
        assert!(anchors.write_file(handle).is_err());
        assert!(anchors.next_probe_time().is_none());
    }

    #[test]
    fn test_lookup_by_zone() {
        let dir = tempfile::tempdir().unwrap();
        let anchors = AutotrustAnchors::new(AutotrustConfig::default());
        let handle = anchors.add_point(seeded(dir.path(), "example.", T0)).unwrap();

        assert_eq!(anchors.handle_for_zone("Example"), Some(handle));
        assert_eq!(anchors.trusted_keys("example.").unwrap().len(), 1);
        assert!(anchors.trusted_keys("unmanaged.").is_none());
        anchors.debug_print();
    }
}
