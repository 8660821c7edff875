use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::autotrust::{AutotrustAnchors, ProbeHandle};
use crate::dnssec::{DnskeyRrset, KeySetVerifier};
use crate::error::{AutotrustError, Result};

/// Source of DNSKEY RRsets for trust point zones.
///
/// Implementations do the actual DNS lookup. Returning `None` counts as a
/// failed probe; the returned RRset is validated by the caller.
#[async_trait]
pub trait DnskeyProber: Send + Sync {
    async fn probe(&self, zone: &str) -> Option<DnskeyRrset>;
}

/// Unix time source
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Result of probing one trust point
#[derive(Debug)]
pub struct ProbeReport {
    pub handle: ProbeHandle,
    pub zone: String,
    /// `Ok(false)` when the zone lost its last trust anchor
    pub result: Result<bool>,
}

/// Drives the probes of all managed trust points.
pub struct ProbeLoop {
    anchors: Arc<AutotrustAnchors>,
    prober: Arc<dyn DnskeyProber>,
    verifier: Arc<dyn KeySetVerifier>,
    clock: Clock,
    max_sleep: Duration,
}

impl ProbeLoop {
    pub fn new(
        anchors: Arc<AutotrustAnchors>,
        prober: Arc<dyn DnskeyProber>,
        verifier: Arc<dyn KeySetVerifier>,
    ) -> Self {
        Self {
            anchors,
            prober,
            verifier,
            clock: Arc::new(|| chrono::Utc::now().timestamp()),
            max_sleep: Duration::from_secs(3600),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Upper bound on one sleep between passes
    pub fn with_max_sleep(mut self, max_sleep: Duration) -> Self {
        self.max_sleep = max_sleep;
        self
    }

    /// Probe every point that is due now, concurrently.
    pub async fn run_once(&self) -> Vec<ProbeReport> {
        let due = self.anchors.due_points((self.clock)());
        if due.is_empty() {
            return Vec::new();
        }
        debug!("autotrust: {} trust points due", due.len());

        let mut tasks = JoinSet::new();
        for handle in due {
            let Some(zone) = self.anchors.zone_of(handle) else {
                continue;
            };
            let anchors = self.anchors.clone();
            let prober = self.prober.clone();
            let verifier = self.verifier.clone();
            let clock = self.clock.clone();

            tasks.spawn(async move {
                let rrset = prober.probe(&zone).await;
                let now = clock();
                // Applying the result fsyncs the trust anchor file
                let result = tokio::task::spawn_blocking(move || {
                    anchors.process_prime(verifier.as_ref(), handle, rrset.as_ref(), now)
                })
                .await
                .unwrap_or_else(|e| Err(AutotrustError::ProbeTask(e.to_string())));
                ProbeReport {
                    handle,
                    zone,
                    result,
                }
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => {
                    match &report.result {
                        Ok(true) => {}
                        Ok(false) => error!(
                            "autotrust: {} has no trust anchors left, validation for it will fail",
                            report.zone
                        ),
                        Err(e) => warn!("autotrust: probe of {} not saved: {}", report.zone, e),
                    }
                    reports.push(report);
                }
                Err(e) => error!("autotrust: probe task panicked: {}", e),
            }
        }
        reports
    }

    /// Probe trust points as they come due until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("autotrust: probing {} trust points", self.anchors.len());

        loop {
            self.run_once().await;
            let wait = self.time_to_next_probe();
            debug!("autotrust: sleeping {:?}", wait);

            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("autotrust: probe loop received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    fn time_to_next_probe(&self) -> Duration {
        match self.anchors.next_probe_time() {
            Some(when) => {
                let secs = u64::try_from(when - (self.clock)()).unwrap_or(0);
                Duration::from_secs(secs.max(1)).min(self.max_sleep)
            }
            None => self.max_sleep,
        }
    }
}
