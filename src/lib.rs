pub mod autotrust;
pub mod config;
pub mod dnssec;
pub mod error;
pub mod probe;

pub use autotrust::{AutotrustAnchors, KeyState, ProbeHandle, TrustPoint};
pub use config::AutotrustConfig;
pub use error::{AutotrustError, ConfigError};
pub use probe::{DnskeyProber, ProbeLoop};
