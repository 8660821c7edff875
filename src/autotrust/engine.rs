use tracing::{debug, error, info, warn};

use super::key::{KeyRecord, KeyState};
use super::point::{TrustPoint, clamp_u32};
use crate::config::AutotrustConfig;
use crate::dnssec::{DnskeyRrset, KeySetVerifier, Rrsig};

/// Everything a probe needs besides the trust point itself.
pub struct ProbeContext<'a> {
    pub verifier: &'a dyn KeySetVerifier,
    pub config: &'a AutotrustConfig,
    /// Unix time of the probe
    pub now: i64,
}

/// Result of applying one probe to a trust point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// A verified DNSKEY set was applied
    Updated,
    /// The probe produced no DNSKEY set
    NoKeySet,
    /// The DNSKEY set did not verify against the current anchors
    Bogus,
    /// Every anchor of the zone is now revoked or removed
    AllRevoked,
}

impl ProbeOutcome {
    /// False once the zone has no usable trust anchor left.
    pub fn anchors_remain(self) -> bool {
        self != ProbeOutcome::AllRevoked
    }
}

/// Apply one probe result to `point`.
///
/// `rrset` is the DNSKEY set as received, not yet validated; `None` means
/// the query itself failed. All key transitions for the probe happen in
/// this call, and the point's timers are left ready for rescheduling.
pub fn process_prime(
    ctx: &ProbeContext<'_>,
    point: &mut TrustPoint,
    rrset: Option<&DnskeyRrset>,
) -> ProbeOutcome {
    point.last_queried = ctx.now;

    let Some(rrset) = rrset else {
        warn!("autotrust: no DNSKEY RRset for {}", point.zone);
        probe_failed(ctx, point);
        return ProbeOutcome::NoKeySet;
    };

    if rrset.owner != point.zone {
        warn!(
            "autotrust: DNSKEY RRset owner {} does not match trust point {}",
            rrset.owner, point.zone
        );
        probe_failed(ctx, point);
        return ProbeOutcome::Bogus;
    }

    // A self-signed revocation stands on its own, so it is applied before
    // the RRset is checked against the remaining anchors.
    apply_revocations(ctx, point, rrset);
    if !point.has_trusted_keys() {
        error!("autotrust: all trust anchors for {} are revoked", point.zone);
        point.next_probe_time = ctx.now.saturating_add(i64::from(point.retry_time));
        return ProbeOutcome::AllRevoked;
    }

    let trusted = point.trusted_keys();
    let sig = match ctx.verifier.verify_with_any(rrset, &trusted, ctx.now) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("autotrust: DNSKEY RRset for {} did not verify: {}", point.zone, e);
            probe_failed(ctx, point);
            return ProbeOutcome::Bogus;
        }
    };

    point.last_success = ctx.now;
    point.query_failed = 0;

    record_sightings(ctx, point, rrset);
    let went_missing = apply_state_table(ctx, point);
    remove_expired(ctx, point);
    set_probe_times(ctx, point, sig);

    let wait = if went_missing {
        point.retry_time
    } else {
        point.query_interval
    };
    point.next_probe_time = ctx.now.saturating_add(i64::from(wait));
    debug!(
        "autotrust: {} probed, next probe in {}s",
        point.zone, wait
    );

    if point.has_trusted_keys() {
        ProbeOutcome::Updated
    } else {
        error!("autotrust: no trust anchors left for {}", point.zone);
        ProbeOutcome::AllRevoked
    }
}

fn probe_failed(ctx: &ProbeContext<'_>, point: &mut TrustPoint) {
    point.query_failed = point.query_failed.saturating_add(1);
    point.next_probe_time = ctx.now.saturating_add(i64::from(point.retry_time));
    debug!(
        "autotrust: probe for {} failed ({} in a row), retry in {}s",
        point.zone, point.query_failed, point.retry_time
    );
}

fn transition(zone: &str, record: &mut KeyRecord, state: KeyState, now: i64) {
    if record.state == state {
        return;
    }
    info!(
        "autotrust: {} key {} {} -> {}",
        zone,
        record.key_tag(),
        record.state,
        state
    );
    record.set_state(state, now);
}

/// Mark keys whose REVOKE bit is proven by their own signature.
fn apply_revocations(ctx: &ProbeContext<'_>, point: &mut TrustPoint, rrset: &DnskeyRrset) {
    for key in rrset.keys.iter().filter(|k| k.is_revoked() && k.is_anchor_candidate()) {
        let zone = point.zone.clone();
        let Some(record) = point.find_key_mut(key) else {
            debug!("autotrust: ignoring revoked key {} not tracked for {}", key.key_tag(), zone);
            continue;
        };
        if matches!(record.state, KeyState::Revoked | KeyState::Removed) {
            record.fetched = true;
            continue;
        }

        if let Err(e) = ctx.verifier.verify_with_key(rrset, key, ctx.now) {
            warn!(
                "autotrust: REVOKE bit on {} key {} is not self-signed, ignored: {}",
                zone,
                key.key_tag(),
                e
            );
            continue;
        }

        record.key = key.clone();
        record.revoked = true;
        record.fetched = true;
        record.pending_count = 0;
        let next = if record.state.is_trusted() {
            KeyState::Revoked
        } else {
            KeyState::Removed
        };
        transition(&zone, record, next, ctx.now);
    }
}

/// Note which keys the verified RRset contains and start tracking new ones.
fn record_sightings(ctx: &ProbeContext<'_>, point: &mut TrustPoint, rrset: &DnskeyRrset) {
    point.clear_fetched();

    for key in rrset.keys.iter().filter(|k| k.is_anchor_candidate()) {
        if let Some(record) = point.find_key_mut(key) {
            // A revoked form only counts once its revocation was verified
            if key.is_revoked() && !record.revoked {
                continue;
            }
            record.fetched = true;
            if !record.revoked {
                record.key.ttl = key.ttl;
            }
            continue;
        }
        if key.is_revoked() {
            continue;
        }

        info!("autotrust: new key {} seen for {}", key.key_tag(), point.zone);
        let mut record = KeyRecord::new(key.clone(), ctx.now);
        record.fetched = true;
        point.keys.push(record);
    }
}

/// Run the RFC 5011 state table over every key. Returns true when a
/// VALID key went MISSING.
fn apply_state_table(ctx: &ProbeContext<'_>, point: &mut TrustPoint) -> bool {
    let now = ctx.now;
    let config = ctx.config;
    let zone = point.zone.clone();

    for record in point.keys.iter_mut() {
        match record.state {
            KeyState::Start => {
                if record.fetched && !record.revoked {
                    record.pending_count = 1;
                    transition(&zone, record, KeyState::AddPend, now);
                } else {
                    transition(&zone, record, KeyState::Removed, now);
                }
            }
            KeyState::AddPend => {
                if !record.fetched {
                    record.pending_count = 0;
                    transition(&zone, record, KeyState::Removed, now);
                    continue;
                }
                record.pending_count = record.pending_count.saturating_add(1);
                if record.pending_count >= config.pending_count_threshold
                    && record.age(now) >= config.add_holddown_secs()
                {
                    record.pending_count = 0;
                    transition(&zone, record, KeyState::Valid, now);
                }
            }
            KeyState::Missing => {
                if record.fetched {
                    transition(&zone, record, KeyState::Valid, now);
                } else if config.keep_missing_secs() > 0
                    && record.age(now) >= config.keep_missing_secs()
                {
                    transition(&zone, record, KeyState::Removed, now);
                }
            }
            KeyState::Revoked => {
                if record.age(now) >= config.del_holddown_secs() {
                    transition(&zone, record, KeyState::Removed, now);
                }
            }
            KeyState::Valid | KeyState::Removed => {}
        }
    }

    // Absent VALID keys go MISSING only while another key stays VALID.
    let staying_valid = point
        .keys
        .iter()
        .filter(|r| r.state == KeyState::Valid && r.fetched)
        .count();
    let absent = point
        .keys
        .iter()
        .filter(|r| r.state == KeyState::Valid && !r.fetched)
        .count();

    if absent == 0 {
        return false;
    }
    if staying_valid == 0 {
        warn!(
            "autotrust: {} of {} VALID keys absent for {}, keeping them VALID",
            absent, absent, zone
        );
        return false;
    }

    for record in point
        .keys
        .iter_mut()
        .filter(|r| r.state == KeyState::Valid && !r.fetched)
    {
        transition(&zone, record, KeyState::Missing, now);
    }
    true
}

/// Forget REMOVED keys once the removal hold-down has passed.
fn remove_expired(ctx: &ProbeContext<'_>, point: &mut TrustPoint) {
    let hold = ctx.config.del_holddown_secs();
    let zone = &point.zone;
    point.keys.retain(|record| {
        let expired = record.state == KeyState::Removed && record.age(ctx.now) >= hold;
        if expired {
            debug!("autotrust: deleting removed key {} of {}", record.key_tag(), zone);
        }
        !expired
    });
}

/// Derive the probe intervals from the RRSIG that validated the RRset
/// (RFC 5011 section 2.3).
fn set_probe_times(ctx: &ProbeContext<'_>, point: &mut TrustPoint, sig: &Rrsig) {
    let config = ctx.config;
    let ttl = u64::from(sig.original_ttl);
    let sig_remaining = u64::try_from(i64::from(sig.expiration) - ctx.now).unwrap_or(0);

    let floor = config.min_probe_interval.as_secs();
    let query = config
        .max_query_interval
        .as_secs()
        .min(ttl / 2)
        .min(sig_remaining / 2)
        .max(floor);
    let retry = config
        .max_retry_time
        .as_secs()
        .min(ttl / 10)
        .min(sig_remaining / 10)
        .max(floor);

    point.query_interval = clamp_u32(query);
    point.retry_time = clamp_u32(retry);
}
