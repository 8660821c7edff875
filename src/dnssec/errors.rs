use thiserror::Error;

/// DNSSEC record and signature errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DnsSecError {
    /// No RRSIG made by the key covers the DNSKEY RRset
    #[error("No RRSIG record found for RRset")]
    NoRrsig,
    #[error("DNSSEC signature has expired")]
    SignatureExpired,
    #[error("DNSSEC signature is not yet valid")]
    SignatureNotYetValid,
    #[error("Unsupported DNSSEC algorithm: {0}")]
    UnsupportedAlgorithm(u8),
    #[error("DNSSEC signature verification failed")]
    SignatureVerificationFailed,
    #[error("Invalid DNSKEY public key format")]
    InvalidPublicKey,
    #[error("Invalid domain name: {0}")]
    InvalidName(String),
    /// Presentation-format record could not be parsed
    #[error("Malformed DNSKEY record: {0}")]
    MalformedRecord(String),
}

pub type Result<T> = std::result::Result<T, DnsSecError>;
