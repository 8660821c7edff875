use std::fmt;
use std::str::FromStr;

use crate::dnssec::Dnskey;

/// RFC 5011 key states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyState {
    Start = 0,
    AddPend = 1,
    Valid = 2,
    Missing = 3,
    Revoked = 4,
    Removed = 5,
}

impl KeyState {
    /// Create from the numeric state stored in trust anchor files
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Start),
            1 => Some(Self::AddPend),
            2 => Some(Self::Valid),
            3 => Some(Self::Missing),
            4 => Some(Self::Revoked),
            5 => Some(Self::Removed),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Keys in these states anchor validation of the DNSKEY RRset.
    pub fn is_trusted(self) -> bool {
        matches!(self, Self::Valid | Self::Missing)
    }

    pub fn token(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::AddPend => "ADDPEND",
            Self::Valid => "VALID",
            Self::Missing => "MISSING",
            Self::Revoked => "REVOKED",
            Self::Removed => "REMOVED",
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for KeyState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "START" => Ok(Self::Start),
            "ADDPEND" => Ok(Self::AddPend),
            "VALID" => Ok(Self::Valid),
            "MISSING" => Ok(Self::Missing),
            "REVOKED" => Ok(Self::Revoked),
            "REMOVED" => Ok(Self::Removed),
            other => Err(format!("unknown key state: {}", other)),
        }
    }
}

/// One tracked key of a trust point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRecord {
    /// The DNSKEY as last seen; carries the REVOKE bit once revoked
    pub key: Dnskey,
    /// Unix time of the last state change
    pub last_change: i64,
    pub state: KeyState,
    /// Successful probes this key was seen in while pending
    pub pending_count: u8,
    /// Seen in the most recent successful probe
    pub fetched: bool,
    /// Seen with a verified REVOKE bit
    pub revoked: bool,
}

impl KeyRecord {
    pub fn new(key: Dnskey, now: i64) -> Self {
        Self {
            key,
            last_change: now,
            state: KeyState::Start,
            pending_count: 0,
            fetched: false,
            revoked: false,
        }
    }

    /// A record for a key that is already a configured anchor.
    pub fn trusted(key: Dnskey, now: i64) -> Self {
        Self {
            state: KeyState::Valid,
            ..Self::new(key, now)
        }
    }

    pub fn key_tag(&self) -> u16 {
        self.key.key_tag()
    }

    /// Seconds spent in the current state
    pub fn age(&self, now: i64) -> i64 {
        now.saturating_sub(self.last_change)
    }

    /// Holds the DNSKEY for validation purposes.
    pub fn is_trusted(&self) -> bool {
        self.state.is_trusted() && !self.revoked
    }

    pub(crate) fn set_state(&mut self, state: KeyState, now: i64) {
        if self.state != state {
            self.state = state;
            self.last_change = now;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_numbers_round_trip() {
        for n in 0..=5u8 {
            let state = KeyState::from_u8(n).unwrap();
            assert_eq!(state.to_u8(), n);
            assert_eq!(state.token().parse::<KeyState>(), Ok(state));
        }
        assert_eq!(KeyState::from_u8(6), None);
        assert!("PENDING".parse::<KeyState>().is_err());
    }

    #[test]
    fn test_trusted_states() {
        assert!(KeyState::Valid.is_trusted());
        assert!(KeyState::Missing.is_trusted());
        assert!(!KeyState::AddPend.is_trusted());
        assert!(!KeyState::Revoked.is_trusted());
    }

    #[test]
    fn test_set_state_only_touches_timestamp_on_change() {
        let key = Dnskey::new("example.", 3600, 257, 15, vec![1; 32]);
        let mut record = KeyRecord::trusted(key, 100);

        record.set_state(KeyState::Valid, 200);
        assert_eq!(record.last_change, 100);

        record.set_state(KeyState::Missing, 300);
        assert_eq!(record.last_change, 300);
        assert_eq!(record.age(400), 100);
        assert!(record.is_trusted());
    }
}
