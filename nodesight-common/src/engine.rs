//! Scrape-cycle execution.
//!
//! One cycle runs every enabled probe once, isolates their failures from each
//! other, and turns the outcome into an ordered sample stream:
//!
//! ```text
//! probe A samples, A success, A duration,
//! probe B samples, B success, B duration,
//! ...
//! cycle summary
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinError;
use tokio::time::Instant;
use tracing::{debug, error, warn};

use crate::descriptor::{MetricDescriptor, NAMESPACE, Sample, build_fq_name};
use crate::probe::ProbeError;
use crate::registry::ProbeInstance;

/// Default overall deadline for one cycle.
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Label carrying the probe name on the meta-metrics.
const PROBE_LABEL: &str = "collector";

/// How probes within one cycle are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Every probe on its own blocking worker, bounded by the cycle timeout.
    #[default]
    Parallel,
    /// One probe after the other, bounded by the cycle timeout.
    Sequential,
}

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub mode: ExecutionMode,
    /// Per-probe bound in parallel mode. `None` leaves only the cycle bound.
    pub probe_timeout: Option<Duration>,
    /// Overall bound of a cycle in either mode.
    pub cycle_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Parallel,
            probe_timeout: None,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
        }
    }
}

/// Outcome of one probe in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeResult {
    pub probe: String,
    pub success: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Everything one cycle produced.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Substantive samples, meta-metrics and the cycle summary, in emission order.
    pub samples: Vec<Sample>,
    /// One entry per enabled probe, in registration order.
    pub results: Vec<ScrapeResult>,
    /// The cycle hit its overall deadline.
    pub timed_out: bool,
}

impl CycleReport {
    pub fn result(&self, probe: &str) -> Option<&ScrapeResult> {
        self.results.iter().find(|r| r.probe == probe)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ScrapeResult> {
        self.results.iter().filter(|r| !r.success)
    }

    pub fn succeeded_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }
}

/// Raw outcome of running a probe, before it is turned into samples.
struct ProbeOutcome {
    result: Result<Vec<Sample>, ProbeError>,
    duration: Duration,
    /// False when the cycle ended before the probe was started.
    ran: bool,
}

impl ProbeOutcome {
    fn failed(error: ProbeError, duration: Duration) -> Self {
        Self {
            result: Err(error),
            duration,
            ran: true,
        }
    }

    fn not_started(error: ProbeError) -> Self {
        Self {
            result: Err(error),
            duration: Duration::ZERO,
            ran: false,
        }
    }

    fn from_join(joined: Result<ProbeOutcome, JoinError>, started: Instant) -> Self {
        joined.unwrap_or_else(|e| Self::failed(ProbeError::Aborted(e.to_string()), started.elapsed()))
    }
}

/// Runs scrape cycles over a fixed set of probe instances.
pub struct Engine {
    instances: Vec<ProbeInstance>,
    config: EngineConfig,
    success_desc: Arc<MetricDescriptor>,
    duration_desc: Arc<MetricDescriptor>,
    summary_desc: Arc<MetricDescriptor>,
    cycle_lock: AsyncMutex<()>,
}

impl Engine {
    pub fn new(instances: Vec<ProbeInstance>, config: EngineConfig) -> Self {
        Self {
            instances,
            config,
            success_desc: MetricDescriptor::gauge(
                build_fq_name(NAMESPACE, "scrape", "collector_success"),
                "Whether a collector succeeded.",
                [PROBE_LABEL],
            ),
            duration_desc: MetricDescriptor::gauge(
                build_fq_name(NAMESPACE, "scrape", "collector_duration_seconds"),
                "Duration of a collector scrape.",
                [PROBE_LABEL],
            ),
            summary_desc: MetricDescriptor::gauge(
                build_fq_name(NAMESPACE, "scrape", "collectors_scraped"),
                "Number of collectors run in the last scrape.",
                Vec::<String>::new(),
            ),
            cycle_lock: AsyncMutex::new(()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn probe_names(&self) -> impl Iterator<Item = &str> {
        self.instances.iter().map(ProbeInstance::name)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Run one scrape cycle.
    ///
    /// Never fails as a whole: probe errors become `success=0` meta-metrics
    /// and hitting the cycle deadline sets [`CycleReport::timed_out`] in
    /// either mode. Concurrent callers are queued so cycles never overlap.
    pub async fn run_cycle(&self) -> CycleReport {
        let _guard = self.cycle_lock.lock().await;
        let started = Instant::now();

        let (outcomes, timed_out) = match self.config.mode {
            ExecutionMode::Parallel => self.run_parallel().await,
            ExecutionMode::Sequential => self.run_sequential().await,
        };

        let report = self.assemble(outcomes, timed_out);

        debug!(
            probes = report.results.len(),
            failed = report.failed().count(),
            timed_out,
            duration_ms = started.elapsed().as_millis() as u64,
            "Scrape cycle finished"
        );

        report
    }

    async fn run_parallel(&self) -> (Vec<ProbeOutcome>, bool) {
        let started = Instant::now();
        let cycle_limit = self.config.cycle_timeout;
        let cycle_deadline = started + cycle_limit;

        let handles: Vec<_> = self
            .instances
            .iter()
            .map(|instance| {
                let instance = instance.clone();
                tokio::task::spawn_blocking(move || execute(&instance))
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut timed_out = false;

        for (instance, handle) in self.instances.iter().zip(handles) {
            // The earlier of the probe's own deadline and the cycle deadline.
            let (deadline, limit) = match self.config.probe_timeout {
                Some(limit) if limit < cycle_limit => (started + limit, limit),
                _ => (cycle_deadline, cycle_limit),
            };

            // A task that already finished is returned even once the deadline has passed.
            let outcome = match tokio::time::timeout_at(deadline, handle).await {
                Ok(joined) => ProbeOutcome::from_join(joined, started),
                Err(_) => {
                    if deadline == cycle_deadline && !timed_out {
                        timed_out = true;
                        error!(
                            probe = instance.name(),
                            timeout_ms = cycle_limit.as_millis() as u64,
                            "Scrape cycle exceeded its deadline, abandoning unfinished probes"
                        );
                    }
                    ProbeOutcome::failed(ProbeError::Timeout(limit), started.elapsed())
                }
            };
            outcomes.push(outcome);
        }

        (outcomes, timed_out)
    }

    async fn run_sequential(&self) -> (Vec<ProbeOutcome>, bool) {
        let limit = self.config.cycle_timeout;
        let deadline = Instant::now() + limit;
        let mut outcomes = Vec::with_capacity(self.instances.len());
        let mut timed_out = false;

        for instance in &self.instances {
            if timed_out {
                outcomes.push(ProbeOutcome::not_started(ProbeError::Timeout(limit)));
                continue;
            }

            let started = Instant::now();
            let owned = instance.clone();
            let handle = tokio::task::spawn_blocking(move || execute(&owned));

            match tokio::time::timeout_at(deadline, handle).await {
                Ok(joined) => outcomes.push(ProbeOutcome::from_join(joined, started)),
                Err(_) => {
                    timed_out = true;
                    error!(
                        probe = instance.name(),
                        timeout_ms = limit.as_millis() as u64,
                        "Scrape cycle exceeded its deadline, abandoning remaining probes"
                    );
                    outcomes.push(ProbeOutcome::failed(ProbeError::Timeout(limit), started.elapsed()));
                }
            }
        }

        (outcomes, timed_out)
    }

    fn assemble(&self, outcomes: Vec<ProbeOutcome>, timed_out: bool) -> CycleReport {
        let mut report = CycleReport {
            timed_out,
            ..CycleReport::default()
        };
        let mut scraped = 0usize;

        for (instance, outcome) in self.instances.iter().zip(outcomes) {
            let name = instance.name();
            let seconds = outcome.duration.as_secs_f64();
            if outcome.ran {
                scraped += 1;
            }

            let error = match outcome.result {
                Ok(samples) => {
                    debug!(probe = name, samples = samples.len(), duration_seconds = seconds, "Probe succeeded");
                    report.samples.extend(samples);
                    None
                }
                Err(e) => {
                    error!(probe = name, duration_seconds = seconds, error = %e, "Probe failed");
                    Some(e.to_string())
                }
            };

            let success = error.is_none();
            report
                .samples
                .push(self.success_desc.observe(if success { 1.0 } else { 0.0 }, &[name]));
            report.samples.push(self.duration_desc.observe(seconds, &[name]));
            report.results.push(ScrapeResult {
                probe: name.to_string(),
                success,
                duration: outcome.duration,
                error,
            });
        }

        report
            .samples
            .push(self.summary_desc.observe(scraped as f64, &[] as &[&str]));

        report
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("probes", &self.probe_names().collect::<Vec<_>>())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Run one update on the calling (blocking) thread, buffering its samples.
fn execute(instance: &ProbeInstance) -> ProbeOutcome {
    let started = std::time::Instant::now();

    let result = match instance.probe().try_lock() {
        Some(mut probe) => {
            let mut samples = Vec::new();
            probe.update(&mut samples).map(|()| samples)
        }
        None => {
            warn!(probe = instance.name(), "Probe is still busy with an earlier update");
            Err(ProbeError::Busy)
        }
    };

    ProbeOutcome {
        result,
        duration: started.elapsed(),
        ran: true,
    }
}
