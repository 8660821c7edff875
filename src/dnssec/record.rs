use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

use super::errors::{DnsSecError, Result};
use super::{DnsSecAlgorithm, calculate_key_tag, constants};

/// A DNSKEY resource record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dnskey {
    /// Owner name, lowercase and fully qualified
    pub owner: String,
    pub ttl: u32,
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

impl Dnskey {
    pub fn new(owner: &str, ttl: u32, flags: u16, algorithm: u8, public_key: Vec<u8>) -> Self {
        Self {
            owner: canonical_name(owner),
            ttl,
            flags,
            protocol: 3,
            algorithm,
            public_key,
        }
    }

    /// RDATA in wire format
    pub fn rdata(&self) -> Vec<u8> {
        let mut rdata = Vec::with_capacity(4 + self.public_key.len());
        rdata.extend_from_slice(&self.flags.to_be_bytes());
        rdata.push(self.protocol);
        rdata.push(self.algorithm);
        rdata.extend_from_slice(&self.public_key);
        rdata
    }

    pub fn key_tag(&self) -> u16 {
        calculate_key_tag(&self.rdata())
    }

    pub fn is_zone_key(&self) -> bool {
        self.flags & constants::FLAG_ZONE_KEY != 0
    }

    /// Secure entry point, i.e. a key signing key
    pub fn is_sep(&self) -> bool {
        self.flags & constants::FLAG_SEP != 0
    }

    pub fn is_revoked(&self) -> bool {
        self.flags & constants::FLAG_REVOKE != 0
    }

    /// Only zone keys with the SEP bit are tracked as trust anchors.
    pub fn is_anchor_candidate(&self) -> bool {
        self.is_zone_key() && self.is_sep() && self.protocol == 3
    }

    /// Same key material, ignoring the REVOKE bit and TTL.
    pub fn same_key(&self, other: &Dnskey) -> bool {
        self.owner == other.owner
            && self.flags & !constants::FLAG_REVOKE == other.flags & !constants::FLAG_REVOKE
            && self.protocol == other.protocol
            && self.algorithm == other.algorithm
            && self.public_key == other.public_key
    }

    pub fn with_revoke_bit(&self) -> Dnskey {
        Dnskey {
            flags: self.flags | constants::FLAG_REVOKE,
            ..self.clone()
        }
    }

    pub fn key_size(&self) -> usize {
        DnsSecAlgorithm::from_u8(self.algorithm)
            .map(|alg| alg.key_size(&self.public_key))
            .unwrap_or(self.public_key.len() * 8)
    }

    /// Parse a presentation-format line such as
    /// `. 172800 IN DNSKEY 257 3 8 AwEAAa...`. Trailing `;` comments are
    /// not accepted here; callers strip them first.
    pub fn parse(text: &str) -> Result<Self> {
        let malformed = || DnsSecError::MalformedRecord(text.trim().to_string());
        let mut fields = text.split_whitespace();

        let owner = fields.next().ok_or_else(malformed)?;
        let mut token = fields.next().ok_or_else(malformed)?;

        // TTL and class are both optional and may come in either order
        let mut ttl = 0u32;
        for _ in 0..2 {
            if let Ok(value) = token.parse::<u32>() {
                ttl = value;
                token = fields.next().ok_or_else(malformed)?;
            } else if token.eq_ignore_ascii_case("IN") {
                token = fields.next().ok_or_else(malformed)?;
            }
        }
        if !token.eq_ignore_ascii_case("DNSKEY") {
            return Err(malformed());
        }

        let flags = fields.next().and_then(|f| f.parse::<u16>().ok()).ok_or_else(malformed)?;
        let protocol = fields.next().and_then(|f| f.parse::<u8>().ok()).ok_or_else(malformed)?;
        let algorithm = fields.next().and_then(|f| f.parse::<u8>().ok()).ok_or_else(malformed)?;

        // Base64 may be split over several whitespace separated chunks
        let encoded: String = fields.collect();
        if encoded.is_empty() {
            return Err(malformed());
        }
        let public_key = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| DnsSecError::InvalidPublicKey)?;

        validate_name(owner)?;
        Ok(Self {
            owner: canonical_name(owner),
            ttl,
            flags,
            protocol,
            algorithm,
            public_key,
        })
    }
}

impl fmt::Display for Dnskey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\tIN\tDNSKEY\t{} {} {} {}",
            self.owner,
            self.ttl,
            self.flags,
            self.protocol,
            self.algorithm,
            STANDARD.encode(&self.public_key)
        )
    }
}

/// An RRSIG covering a DNSKEY RRset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rrsig {
    pub type_covered: u16,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub expiration: u32,
    pub inception: u32,
    pub key_tag: u16,
    pub signer_name: String,
    pub signature: Vec<u8>,
}

impl Rrsig {
    /// RRSIG RDATA without the signature field (RFC 4034 section 3.1.8.1)
    pub fn rdata_without_signature(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(18 + self.signer_name.len() + 2);
        data.extend_from_slice(&self.type_covered.to_be_bytes());
        data.push(self.algorithm);
        data.push(self.labels);
        data.extend_from_slice(&self.original_ttl.to_be_bytes());
        data.extend_from_slice(&self.expiration.to_be_bytes());
        data.extend_from_slice(&self.inception.to_be_bytes());
        data.extend_from_slice(&self.key_tag.to_be_bytes());
        data.extend_from_slice(&name_to_wire(&self.signer_name));
        data
    }
}

/// A DNSKEY RRset as returned by a probe, with the signatures over it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnskeyRrset {
    pub owner: String,
    pub ttl: u32,
    pub keys: Vec<Dnskey>,
    pub signatures: Vec<Rrsig>,
}

impl DnskeyRrset {
    pub fn new(owner: &str, ttl: u32, keys: Vec<Dnskey>, signatures: Vec<Rrsig>) -> Self {
        Self {
            owner: canonical_name(owner),
            ttl,
            keys,
            signatures,
        }
    }

    /// Canonical signed data for `sig` over this RRset (RFC 4034 section 3.1.8.1)
    pub fn signed_data(&self, sig: &Rrsig) -> Vec<u8> {
        let mut data = sig.rdata_without_signature();
        let owner = name_to_wire(&self.owner);

        let mut rdatas: Vec<Vec<u8>> = self.keys.iter().map(Dnskey::rdata).collect();
        rdatas.sort();
        rdatas.dedup();

        for rdata in rdatas {
            data.extend_from_slice(&owner);
            data.extend_from_slice(&constants::TYPE_DNSKEY.to_be_bytes());
            data.extend_from_slice(&constants::CLASS_IN.to_be_bytes());
            data.extend_from_slice(&sig.original_ttl.to_be_bytes());
            data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            data.extend_from_slice(&rdata);
        }
        data
    }

}

/// Lowercase, fully qualified form of a domain name
pub fn canonical_name(name: &str) -> String {
    let lower = name.trim().to_ascii_lowercase();
    if lower.is_empty() || lower == "." {
        ".".to_string()
    } else if lower.ends_with('.') {
        lower
    } else {
        format!("{}.", lower)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let canonical = canonical_name(name);
    if canonical == "." {
        return Ok(());
    }
    let body = &canonical[..canonical.len() - 1];
    if canonical.len() > 255 || body.split('.').any(|l| l.is_empty() || l.len() > 63) {
        return Err(DnsSecError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Number of labels, not counting the root
pub fn label_count(name: &str) -> u8 {
    let canonical = canonical_name(name);
    if canonical == "." {
        0
    } else {
        canonical.trim_end_matches('.').split('.').count() as u8
    }
}

/// Uncompressed, lowercase wire format of a name
pub fn name_to_wire(name: &str) -> Vec<u8> {
    let canonical = canonical_name(name);
    let mut wire = Vec::with_capacity(canonical.len() + 1);
    for label in canonical.split('.').filter(|l| !l.is_empty()) {
        wire.push(label.len() as u8);
        wire.extend_from_slice(label.as_bytes());
    }
    wire.push(0);
    wire
}
