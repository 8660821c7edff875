//! RFC 5011 automated updates of DNSSEC trust anchors.
//!
//! Each managed zone is a [`TrustPoint`] persisted in its own file. A probe
//! fetches the zone's DNSKEY RRset, [`engine::process_prime`] applies it to
//! the point, and [`AutotrustAnchors`] writes the result back and schedules
//! the next probe.

pub mod anchors;
pub mod codec;
pub mod engine;
pub mod key;
pub mod point;
pub mod scheduler;

pub use anchors::{AutotrustAnchors, LoadReport};
pub use engine::{ProbeContext, ProbeOutcome, process_prime};
pub use key::{KeyRecord, KeyState};
pub use point::TrustPoint;
pub use scheduler::{ProbeHandle, ProbeScheduler};
