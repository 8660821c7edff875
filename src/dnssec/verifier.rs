use tracing::{debug, trace};

use super::errors::{DnsSecError, Result};
use super::{DnsSecAlgorithm, Dnskey, DnskeyRrset, Rrsig, constants};

/// Signature checking capability handed to the trust anchor engine.
///
/// The engine never touches cryptography itself; it only asks whether a
/// given key signs a DNSKEY RRset at a given time, and which RRSIG does.
pub trait KeySetVerifier: Send + Sync {
    /// Returns the first RRSIG in `rrset` made by `key` that is currently
    /// valid and verifies.
    fn verify_with_key<'a>(&self, rrset: &'a DnskeyRrset, key: &Dnskey, now: i64) -> Result<&'a Rrsig>;

    /// Returns the RRSIG of the first key in `trusted` that signs the RRset.
    fn verify_with_any<'a>(&self, rrset: &'a DnskeyRrset, trusted: &[Dnskey], now: i64) -> Result<&'a Rrsig> {
        let mut last_err = DnsSecError::NoRrsig;
        for key in trusted {
            match self.verify_with_key(rrset, key, now) {
                Ok(sig) => return Ok(sig),
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }
}

/// `ring` backed verifier for DNSKEY RRsets
#[derive(Debug, Default, Clone)]
pub struct RingVerifier;

impl RingVerifier {
    pub fn new() -> Self {
        Self
    }

    fn check_validity(&self, sig: &Rrsig, now: i64) -> Result<()> {
        if now < i64::from(sig.inception) {
            return Err(DnsSecError::SignatureNotYetValid);
        }
        if now > i64::from(sig.expiration) {
            return Err(DnsSecError::SignatureExpired);
        }
        Ok(())
    }

    fn verify_one(&self, rrset: &DnskeyRrset, key: &Dnskey, sig: &Rrsig, now: i64) -> Result<()> {
        self.check_validity(sig, now)?;

        let algorithm = DnsSecAlgorithm::from_u8(sig.algorithm)
            .ok_or(DnsSecError::UnsupportedAlgorithm(sig.algorithm))?;
        let signed_data = rrset.signed_data(sig);

        algorithm.verify(&key.public_key, &signed_data, &sig.signature)
    }
}

impl KeySetVerifier for RingVerifier {
    fn verify_with_key<'a>(&self, rrset: &'a DnskeyRrset, key: &Dnskey, now: i64) -> Result<&'a Rrsig> {
        let key_tag = key.key_tag();
        let mut last_err = DnsSecError::NoRrsig;

        for sig in rrset.signatures.iter().filter(|sig| {
            sig.type_covered == constants::TYPE_DNSKEY
                && sig.key_tag == key_tag
                && sig.algorithm == key.algorithm
                && sig.signer_name.eq_ignore_ascii_case(&rrset.owner)
        }) {
            match self.verify_one(rrset, key, sig, now) {
                Ok(()) => {
                    debug!("DNSKEY RRset for {} verified by key {}", rrset.owner, key_tag);
                    return Ok(sig);
                }
                Err(e) => {
                    trace!("RRSIG by key {} over {} rejected: {}", key_tag, rrset.owner, e);
                    last_err = e;
                }
            }
        }

        Err(last_err)
    }
}
