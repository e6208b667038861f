//! Probe registry - ordered collection of environment checks.
//!
//! The registry owns every probe and guarantees the diagnostic contract:
//! probes run in registration order, a fault in one probe becomes a Failed
//! outcome instead of aborting the pass, and no probe is skipped because an
//! earlier one failed.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::error::MedicError;
use crate::probe::{Outcome, Probe, ProbeContext};
use crate::report::{Report, ReportEntry};

/// Cooperative cancellation, consulted between probe and remediation runs
/// (never mid-invocation; the underlying external calls are not preemptible).
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Ordered registry of probes.
pub struct ProbeRegistry {
    probes: Vec<Box<dyn Probe>>,
    index: HashMap<String, usize>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self {
            probes: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a probe. Fails without modifying the registry when the
    /// identifier is already taken.
    pub fn register(&mut self, probe: Box<dyn Probe>) -> Result<(), MedicError> {
        let id = probe.id().to_string();
        if self.index.contains_key(&id) {
            return Err(MedicError::DuplicateIdentifier(id));
        }
        self.index.insert(id, self.probes.len());
        self.probes.push(probe);
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Probes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Probe> {
        self.probes.iter().map(|p| p.as_ref())
    }

    /// Run every probe in registration order. Faults and panics become
    /// Failed outcomes; cancellation stops the pass between probes and the
    /// outcomes collected so far are still returned.
    pub fn run_all(&self, ctx: &ProbeContext, cancel: &CancelFlag) -> Report {
        self.run_probes(self.probes.iter().map(|p| p.as_ref()), ctx, cancel)
    }

    /// Run only the probes named in `ids`, in registration order. Unknown
    /// ids are ignored; callers validate membership up front.
    pub fn run_selected(&self, ids: &[String], ctx: &ProbeContext, cancel: &CancelFlag) -> Report {
        let selected = self
            .probes
            .iter()
            .map(|p| p.as_ref())
            .filter(|p| ids.iter().any(|id| id.as_str() == p.id()));
        self.run_probes(selected, ctx, cancel)
    }

    fn run_probes<'a>(
        &'a self,
        probes: impl Iterator<Item = &'a dyn Probe>,
        ctx: &ProbeContext,
        cancel: &CancelFlag,
    ) -> Report {
        let mut report = Report::new();

        for probe in probes {
            if cancel.is_cancelled() {
                warn!("diagnostic pass cancelled; reporting partial results");
                break;
            }

            let started = Instant::now();
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| probe.run(ctx))) {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(err)) => {
                    warn!("probe '{}' failed: {}", probe.id(), err);
                    Outcome::from_error(&err)
                }
                Err(_) => {
                    warn!("probe '{}' panicked", probe.id());
                    Outcome::failed(format!("Probe '{}' panicked", probe.id()))
                }
            };

            debug!("probe '{}' -> {}", probe.id(), outcome.status);
            report.push(ReportEntry {
                probe_id: probe.id().to_string(),
                description: probe.description().to_string(),
                outcome,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        report
    }
}

impl Default for ProbeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStatus;
    use crate::test_support::{test_settings, FakeCaps, StaticProbe};

    #[test]
    fn test_register_and_contains() {
        let mut registry = ProbeRegistry::new();
        registry
            .register(Box::new(StaticProbe::ok("alpha")))
            .unwrap();
        assert!(registry.contains("alpha"));
        assert!(!registry.contains("beta"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_is_atomic() {
        let mut registry = ProbeRegistry::new();
        registry
            .register(Box::new(StaticProbe::ok("alpha")))
            .unwrap();

        let err = registry
            .register(Box::new(StaticProbe::failing("alpha")))
            .unwrap_err();
        assert_eq!(err.kind(), "duplicate-identifier");

        // Unchanged after the failed attempt
        assert_eq!(registry.len(), 1);
        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let report = registry.run_all(
            &ProbeContext::new(caps.as_set(), &settings),
            &CancelFlag::new(),
        );
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].outcome.status, ProbeStatus::Ok);
    }

    #[test]
    fn test_run_all_never_drops_a_probe() {
        let mut registry = ProbeRegistry::new();
        registry
            .register(Box::new(StaticProbe::ok("first")))
            .unwrap();
        registry
            .register(Box::new(StaticProbe::erroring("second")))
            .unwrap();
        registry
            .register(Box::new(StaticProbe::panicking("third")))
            .unwrap();
        registry
            .register(Box::new(StaticProbe::warning("fourth")))
            .unwrap();

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let report = registry.run_all(
            &ProbeContext::new(caps.as_set(), &settings),
            &CancelFlag::new(),
        );

        // Registration order, nothing dropped
        assert_eq!(report.entries.len(), 4);
        let ids: Vec<&str> = report.entries.iter().map(|e| e.probe_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second", "third", "fourth"]);

        assert_eq!(report.entries[1].outcome.status, ProbeStatus::Failed);
        assert_eq!(report.entries[2].outcome.status, ProbeStatus::Failed);
        assert!(report.entries[2].outcome.message.contains("panicked"));
    }

    #[test]
    fn test_timeout_fault_is_classified() {
        let mut registry = ProbeRegistry::new();
        registry
            .register(Box::new(StaticProbe::timing_out("slow")))
            .unwrap();

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let report = registry.run_all(
            &ProbeContext::new(caps.as_set(), &settings),
            &CancelFlag::new(),
        );

        let entry = &report.entries[0];
        assert_eq!(entry.outcome.status, ProbeStatus::Failed);
        assert_eq!(entry.outcome.detail.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_cancellation_keeps_partial_results() {
        let mut registry = ProbeRegistry::new();
        registry
            .register(Box::new(StaticProbe::ok("first")))
            .unwrap();
        registry
            .register(Box::new(StaticProbe::ok("second")))
            .unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let report = registry.run_all(&ProbeContext::new(caps.as_set(), &settings), &cancel);
        assert!(report.entries.is_empty());
    }

    #[test]
    fn test_run_selected_keeps_registration_order() {
        let mut registry = ProbeRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(Box::new(StaticProbe::ok(id))).unwrap();
        }

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let report = registry.run_selected(
            &["c".to_string(), "a".to_string()],
            &ProbeContext::new(caps.as_set(), &settings),
            &CancelFlag::new(),
        );

        let ids: Vec<&str> = report.entries.iter().map(|e| e.probe_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }
}
