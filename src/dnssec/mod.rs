pub mod algorithm;
pub mod errors;
pub mod key_tag;
pub mod record;
pub mod verifier;

pub use algorithm::DnsSecAlgorithm;
pub use errors::DnsSecError;
pub use key_tag::calculate_key_tag;
pub use record::{Dnskey, DnskeyRrset, Rrsig, canonical_name, label_count, name_to_wire};
pub use verifier::{KeySetVerifier, RingVerifier};

/// DNSSEC constants
pub mod constants {
    /// DNSKEY RR type (RFC 4034)
    pub const TYPE_DNSKEY: u16 = 48;

    pub const CLASS_IN: u16 = 1;

    /// Zone Key flag
    pub const FLAG_ZONE_KEY: u16 = 0x0100;

    /// REVOKE flag (RFC 5011 section 3)
    pub const FLAG_REVOKE: u16 = 0x0080;

    /// Secure Entry Point flag
    pub const FLAG_SEP: u16 = 0x0001;
}
