use ring::signature::{self, RsaParameters, RsaPublicKeyComponents, UnparsedPublicKey};
use std::fmt;

use super::errors::{DnsSecError, Result};

/// DNSSEC signing algorithms relevant to trust anchor keys (RFC 8624)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DnsSecAlgorithm {
    RsaMd5 = 1,
    Dsa = 3,
    /// RSA/SHA-1 (RFC 3110)
    RsaSha1 = 5,
    DsaNsec3Sha1 = 6,
    /// RSASHA1-NSEC3-SHA1 (RFC 5155)
    RsaSha1Nsec3Sha1 = 7,
    /// RSA/SHA-256 (RFC 5702)
    RsaSha256 = 8,
    /// RSA/SHA-512 (RFC 5702)
    RsaSha512 = 10,
    EccGost = 12,
    /// ECDSA Curve P-256 with SHA-256 (RFC 6605)
    EcdsaP256Sha256 = 13,
    /// ECDSA Curve P-384 with SHA-384 (RFC 6605)
    EcdsaP384Sha384 = 14,
    /// Ed25519 (RFC 8080)
    Ed25519 = 15,
    Ed448 = 16,
}

impl DnsSecAlgorithm {
    /// Create from algorithm number
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::RsaMd5),
            3 => Some(Self::Dsa),
            5 => Some(Self::RsaSha1),
            6 => Some(Self::DsaNsec3Sha1),
            7 => Some(Self::RsaSha1Nsec3Sha1),
            8 => Some(Self::RsaSha256),
            10 => Some(Self::RsaSha512),
            12 => Some(Self::EccGost),
            13 => Some(Self::EcdsaP256Sha256),
            14 => Some(Self::EcdsaP384Sha384),
            15 => Some(Self::Ed25519),
            16 => Some(Self::Ed448),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if signatures made with this algorithm can be verified
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            Self::RsaSha1
                | Self::RsaSha1Nsec3Sha1
                | Self::RsaSha256
                | Self::RsaSha512
                | Self::EcdsaP256Sha256
                | Self::EcdsaP384Sha384
                | Self::Ed25519
        )
    }

    fn is_rsa(&self) -> bool {
        matches!(
            self,
            Self::RsaMd5 | Self::RsaSha1 | Self::RsaSha1Nsec3Sha1 | Self::RsaSha256 | Self::RsaSha512
        )
    }

    fn rsa_parameters(&self) -> Option<&'static RsaParameters> {
        match self {
            Self::RsaSha1 | Self::RsaSha1Nsec3Sha1 => {
                Some(&signature::RSA_PKCS1_1024_8192_SHA1_FOR_LEGACY_USE_ONLY)
            }
            Self::RsaSha256 => Some(&signature::RSA_PKCS1_1024_8192_SHA256_FOR_LEGACY_USE_ONLY),
            Self::RsaSha512 => Some(&signature::RSA_PKCS1_1024_8192_SHA512_FOR_LEGACY_USE_ONLY),
            _ => None,
        }
    }

    /// Verify `sig` over `message` with a DNSKEY public key field.
    pub fn verify(&self, public_key: &[u8], message: &[u8], sig: &[u8]) -> Result<()> {
        if !self.is_supported() {
            return Err(DnsSecError::UnsupportedAlgorithm(self.to_u8()));
        }

        let verified = if let Some(params) = self.rsa_parameters() {
            let (e, n) = rsa_exponent_modulus(public_key)?;
            RsaPublicKeyComponents { n, e }.verify(params, message, sig)
        } else {
            match self {
                Self::EcdsaP256Sha256 | Self::EcdsaP384Sha384 => {
                    let alg = if *self == Self::EcdsaP256Sha256 {
                        &signature::ECDSA_P256_SHA256_FIXED
                    } else {
                        &signature::ECDSA_P384_SHA384_FIXED
                    };
                    // ring wants the uncompressed point marker
                    let mut point = Vec::with_capacity(public_key.len() + 1);
                    point.push(0x04);
                    point.extend_from_slice(public_key);
                    UnparsedPublicKey::new(alg, point).verify(message, sig)
                }
                Self::Ed25519 => {
                    UnparsedPublicKey::new(&signature::ED25519, public_key).verify(message, sig)
                }
                _ => return Err(DnsSecError::UnsupportedAlgorithm(self.to_u8())),
            }
        };

        verified.map_err(|_| DnsSecError::SignatureVerificationFailed)
    }

    /// Key size in bits, as shown in trust anchor file comments
    pub fn key_size(&self, public_key: &[u8]) -> usize {
        if self.is_rsa() {
            return rsa_exponent_modulus(public_key)
                .map(|(_, n)| n.len() * 8)
                .unwrap_or(0);
        }
        match self {
            Self::EcdsaP256Sha256 | Self::Ed25519 => 256,
            Self::EcdsaP384Sha384 => 384,
            Self::Ed448 => 456,
            _ => public_key.len() * 8,
        }
    }
}

/// Split an RFC 3110 RSA public key into exponent and modulus.
fn rsa_exponent_modulus(public_key: &[u8]) -> Result<(&[u8], &[u8])> {
    let (exp_len, rest) = match public_key {
        [0, hi, lo, rest @ ..] => (u16::from_be_bytes([*hi, *lo]) as usize, rest),
        [len, rest @ ..] if *len != 0 => (*len as usize, rest),
        _ => return Err(DnsSecError::InvalidPublicKey),
    };
    if exp_len == 0 || rest.len() <= exp_len {
        return Err(DnsSecError::InvalidPublicKey);
    }
    Ok(rest.split_at(exp_len))
}

impl fmt::Display for DnsSecAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RsaMd5 => write!(f, "RSAMD5"),
            Self::Dsa => write!(f, "DSA"),
            Self::RsaSha1 => write!(f, "RSASHA1"),
            Self::DsaNsec3Sha1 => write!(f, "DSA-NSEC3-SHA1"),
            Self::RsaSha1Nsec3Sha1 => write!(f, "RSASHA1-NSEC3-SHA1"),
            Self::RsaSha256 => write!(f, "RSASHA256"),
            Self::RsaSha512 => write!(f, "RSASHA512"),
            Self::EccGost => write!(f, "ECC-GOST"),
            Self::EcdsaP256Sha256 => write!(f, "ECDSAP256SHA256"),
            Self::EcdsaP384Sha384 => write!(f, "ECDSAP384SHA384"),
            Self::Ed25519 => write!(f, "ED25519"),
            Self::Ed448 => write!(f, "ED448"),
        }
    }
}
