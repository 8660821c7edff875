//! Shared helpers for the trust anchor integration tests: deterministic
//! Ed25519 keys and real RRSIGs over DNSKEY RRsets.

#![allow(dead_code)] // Not every test file uses every helper

use anchorkeeper::autotrust::codec;
use anchorkeeper::dnssec::{Dnskey, DnskeyRrset, Rrsig, constants, label_count};
use anchorkeeper::{AutotrustConfig, TrustPoint};
use ring::signature::{Ed25519KeyPair, KeyPair};
use std::path::Path;

pub const DAY: i64 = 86400;

/// Start of every simulated timeline
pub const T0: i64 = 1_700_000_000;

/// A signing key for a zone
pub struct TestKey {
    seed: u8,
    pair: Ed25519KeyPair,
    pub dnskey: Dnskey,
}

impl TestKey {
    /// Deterministic KSK derived from `seed`
    pub fn ksk(zone: &str, seed: u8) -> Self {
        let pair = Ed25519KeyPair::from_seed_unchecked(&[seed; 32]).unwrap();
        let dnskey = Dnskey::new(zone, 172800, 257, 15, pair.public_key().as_ref().to_vec());
        Self { seed, pair, dnskey }
    }

    /// The same key material with the REVOKE bit set
    pub fn revoked(&self) -> Self {
        Self {
            seed: self.seed,
            pair: Ed25519KeyPair::from_seed_unchecked(&[self.seed; 32]).unwrap(),
            dnskey: self.dnskey.with_revoke_bit(),
        }
    }

    pub fn key_tag(&self) -> u16 {
        self.dnskey.key_tag()
    }
}

/// Build the DNSKEY RRset holding `keys`, signed by each of `signers`
/// with signatures valid for a week around `now`.
pub fn signed_rrset(zone: &str, keys: &[&Dnskey], signers: &[&TestKey], now: i64) -> DnskeyRrset {
    let mut rrset = DnskeyRrset::new(zone, 172800, keys.iter().map(|k| (*k).clone()).collect(), vec![]);

    for signer in signers {
        let mut sig = Rrsig {
            type_covered: constants::TYPE_DNSKEY,
            algorithm: signer.dnskey.algorithm,
            labels: label_count(&rrset.owner),
            original_ttl: rrset.ttl,
            expiration: (now + 7 * DAY) as u32,
            inception: (now - DAY) as u32,
            key_tag: signer.key_tag(),
            signer_name: rrset.owner.clone(),
            signature: Vec::new(),
        };
        sig.signature = signer.pair.sign(&rrset.signed_data(&sig)).as_ref().to_vec();
        rrset.signatures.push(sig);
    }
    rrset
}

/// Write a freshly provisioned trust anchor file trusting `keys`.
pub fn provision(path: &Path, zone: &str, keys: &[&Dnskey], now: i64) -> TrustPoint {
    let mut point = TrustPoint::new(zone, path, &AutotrustConfig::default());
    for key in keys {
        point.add_trusted_key((*key).clone(), now);
    }
    codec::write_point(&point).unwrap();
    point
}
