//! Orchestrator - drives diagnose and fix sessions.
//!
//! A session walks a fixed set of phases: Idle → Diagnosing → Reporting for
//! a diagnostic pass, and Idle → SelectingFix → ConfirmingDestructive →
//! Applying → Reporting for a fix batch. Destructive remediations go
//! through an injected `confirm` callback, so the destructive path stays
//! deterministic under test. Remediations apply strictly in caller
//! selection order; one failure never blocks the rest of the batch.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use crate::probe::ProbeContext;
use crate::registry::{CancelFlag, ProbeRegistry};
use crate::remedy::{FixResult, Remediation, RemediationCatalog};
use crate::report::{FixEntry, FixReport, Report};
use crate::error::MedicError;

/// Session phase, tracked for tracing output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Diagnosing,
    Reporting,
    SelectingFix,
    ConfirmingDestructive,
    Applying,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Diagnosing => write!(f, "diagnosing"),
            Phase::Reporting => write!(f, "reporting"),
            Phase::SelectingFix => write!(f, "selecting-fix"),
            Phase::ConfirmingDestructive => write!(f, "confirming-destructive"),
            Phase::Applying => write!(f, "applying"),
        }
    }
}

/// Confirmation callback for destructive remediations. Returning `false`
/// drops that remediation from the selection without aborting the others.
pub type ConfirmFn<'a> = dyn Fn(&dyn Remediation) -> bool + 'a;

/// Drives probes and remediations for one transient session.
pub struct Orchestrator<'a> {
    registry: &'a ProbeRegistry,
    catalog: &'a RemediationCatalog,
    ctx: ProbeContext<'a>,
    cancel: CancelFlag,
    phase: Phase,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        registry: &'a ProbeRegistry,
        catalog: &'a RemediationCatalog,
        ctx: ProbeContext<'a>,
    ) -> Self {
        Self {
            registry,
            catalog,
            ctx,
            cancel: CancelFlag::new(),
            phase: Phase::Idle,
        }
    }

    /// Handle for cancelling the session between probe/remediation runs.
    pub fn cancel_handle(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn enter(&mut self, phase: Phase) {
        debug!("session phase: {} -> {}", self.phase, phase);
        self.phase = phase;
    }

    /// Run every registered probe and return the report.
    pub fn diagnose(&mut self) -> Report {
        self.enter(Phase::Diagnosing);
        let report = self.registry.run_all(&self.ctx, &self.cancel);
        self.enter(Phase::Reporting);
        info!(
            "diagnostic pass complete: {} probes, overall {}",
            report.entries.len(),
            report.overall()
        );
        self.enter(Phase::Idle);
        report
    }

    /// Apply the named remediations in the given order. Fails early only on
    /// an unknown identifier; everything after selection is captured
    /// per-remediation.
    pub fn fix(
        &mut self,
        ids: &[String],
        confirm: &ConfirmFn,
    ) -> Result<FixReport, MedicError> {
        let catalog = self.catalog;
        let registry = self.registry;

        self.enter(Phase::SelectingFix);
        let mut selected: Vec<&dyn Remediation> = Vec::with_capacity(ids.len());
        for id in ids {
            selected.push(catalog.get(id)?);
        }

        self.enter(Phase::ConfirmingDestructive);
        let mut declined = Vec::new();
        selected.retain(|r| {
            if r.is_destructive() && !confirm(*r) {
                info!("confirmation declined for '{}'", r.id());
                declined.push(r.id().to_string());
                return false;
            }
            true
        });

        // Before/after only covers probes the confirmed selection addresses.
        let related = related_probe_ids(&selected);
        let before = registry.run_selected(&related, &self.ctx, &self.cancel);

        self.enter(Phase::Applying);
        let mut attempted = Vec::new();
        for remediation in selected {
            if self.cancel.is_cancelled() {
                warn!("fix batch cancelled; reporting partial results");
                break;
            }
            attempted.push(self.apply_one(remediation));
        }

        self.enter(Phase::Reporting);
        let recheck: Vec<String> = attempted
            .iter()
            .filter_map(|e| catalog.get(&e.remediation_id).ok())
            .flat_map(|r| r.related_probe_ids().iter().map(|s| s.to_string()))
            .collect();
        let after = registry.run_selected(&recheck, &self.ctx, &self.cancel);

        self.enter(Phase::Idle);
        Ok(FixReport {
            attempted,
            declined,
            before,
            after,
        })
    }

    /// Apply every registered remediation in catalog order.
    pub fn fix_all(&mut self, confirm: &ConfirmFn) -> Result<FixReport, MedicError> {
        let ids = self.catalog.ids();
        self.fix(&ids, confirm)
    }

    fn apply_one(&self, remediation: &dyn Remediation) -> FixEntry {
        let id = remediation.id().to_string();
        let description = remediation.description().to_string();

        // Privilege is checked before apply() so an under-privileged session
        // never reaches the side-effecting action.
        if remediation.requires_elevated_privilege() && !self.ctx.caps.privilege.is_elevated() {
            warn!("'{}' requires elevated privilege; not attempted", id);
            return FixEntry {
                remediation_id: id.clone(),
                description,
                result: FixResult::from_error(&MedicError::InsufficientPrivilege(format!(
                    "'{id}' must run elevated"
                ))),
            };
        }

        info!("applying remediation '{}'", id);
        let result = match panic::catch_unwind(AssertUnwindSafe(|| remediation.apply(&self.ctx))) {
            Ok(Ok(message)) => FixResult::ok(message),
            Ok(Err(err)) => {
                warn!("remediation '{}' failed: {}", id, err);
                FixResult::from_error(&err)
            }
            Err(_) => {
                warn!("remediation '{}' panicked", id);
                FixResult {
                    success: false,
                    message: format!("Remediation '{id}' panicked"),
                    error_kind: Some("panic".to_string()),
                }
            }
        };

        FixEntry {
            remediation_id: id,
            description,
            result,
        }
    }
}

/// Union of related probe ids across a selection, first-mention order,
/// deduplicated.
fn related_probe_ids(selection: &[&dyn Remediation]) -> Vec<String> {
    let mut ids: Vec<String> = Vec::new();
    for remediation in selection {
        for probe_id in remediation.related_probe_ids() {
            if !ids.iter().any(|i| i.as_str() == *probe_id) {
                ids.push(probe_id.to_string());
            }
        }
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStatus;
    use crate::test_support::{test_settings, FakeCaps, StaticProbe, StaticRemedy};

    fn registry_with(ids: &[&str]) -> ProbeRegistry {
        let mut registry = ProbeRegistry::new();
        for id in ids {
            registry.register(Box::new(StaticProbe::ok(id))).unwrap();
        }
        registry
    }

    #[test]
    fn test_diagnose_reports_every_probe() {
        let registry = registry_with(&["a", "b", "c"]);
        let catalog = RemediationCatalog::new();
        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let ctx = ProbeContext::new(caps.as_set(), &settings);

        let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
        let report = orchestrator.diagnose();
        assert_eq!(report.entries.len(), 3);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_unknown_remediation_fails_selection() {
        let registry = registry_with(&["a"]);
        let catalog = RemediationCatalog::new();
        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let ctx = ProbeContext::new(caps.as_set(), &settings);

        let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
        let err = orchestrator
            .fix(&["ghost".to_string()], &|_| true)
            .unwrap_err();
        assert_eq!(err.kind(), "unknown-remediation");
    }

    #[test]
    fn test_privilege_checked_before_side_effects() {
        let registry = registry_with(&["svc"]);
        let mut catalog = RemediationCatalog::new();
        let remedy = StaticRemedy::new("elevated-fix", &["svc"]).elevated();
        let applied = remedy.applied.clone();
        catalog.register(&registry, Box::new(remedy)).unwrap();

        let caps = FakeCaps::healthy();
        caps.elevated.set(false);
        let settings = test_settings();
        let ctx = ProbeContext::new(caps.as_set(), &settings);

        let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
        let report = orchestrator
            .fix(&["elevated-fix".to_string()], &|_| true)
            .unwrap();

        assert_eq!(report.exit_code(), 3);
        assert!(!report.attempted[0].result.success);
        assert_eq!(
            report.attempted[0].result.error_kind.as_deref(),
            Some("insufficient-privilege")
        );
        // apply() never ran
        assert_eq!(*applied.borrow(), 0);
    }

    #[test]
    fn test_declined_confirmation_skips_only_that_remediation() {
        let registry = registry_with(&["svc"]);
        let mut catalog = RemediationCatalog::new();

        let destructive = StaticRemedy::new("wipe", &["svc"]).destructive();
        let wiped = destructive.applied.clone();
        let benign = StaticRemedy::new("tune", &["svc"]);
        let tuned = benign.applied.clone();

        catalog.register(&registry, Box::new(destructive)).unwrap();
        catalog.register(&registry, Box::new(benign)).unwrap();

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let ctx = ProbeContext::new(caps.as_set(), &settings);

        let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
        let report = orchestrator
            .fix(&["wipe".to_string(), "tune".to_string()], &|r| {
                !r.is_destructive()
            })
            .unwrap();

        assert_eq!(report.declined, vec!["wipe".to_string()]);
        assert_eq!(report.attempted.len(), 1);
        assert_eq!(report.attempted[0].remediation_id, "tune");
        assert_eq!(*wiped.borrow(), 0);
        assert_eq!(*tuned.borrow(), 1);
        assert_eq!(report.exit_code(), 0);
    }

    #[test]
    fn test_partial_failure_continues_batch() {
        let registry = registry_with(&["svc"]);
        let mut catalog = RemediationCatalog::new();
        catalog
            .register(&registry, Box::new(StaticRemedy::new("good", &["svc"])))
            .unwrap();
        catalog
            .register(
                &registry,
                Box::new(StaticRemedy::new("bad", &["svc"]).failing()),
            )
            .unwrap();
        catalog
            .register(&registry, Box::new(StaticRemedy::new("late", &["svc"])))
            .unwrap();

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let ctx = ProbeContext::new(caps.as_set(), &settings);

        let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
        let report = orchestrator.fix_all(&|_| true).unwrap();

        assert_eq!(report.attempted.len(), 3);
        assert!(report.attempted[0].result.success);
        assert!(!report.attempted[1].result.success);
        assert!(report.attempted[2].result.success);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_selection_order_is_preserved() {
        let registry = registry_with(&["svc"]);
        let mut catalog = RemediationCatalog::new();
        for id in ["one", "two"] {
            catalog
                .register(&registry, Box::new(StaticRemedy::new(id, &["svc"])))
                .unwrap();
        }

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let ctx = ProbeContext::new(caps.as_set(), &settings);

        let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
        // Caller order, not catalog order
        let report = orchestrator
            .fix(&["two".to_string(), "one".to_string()], &|_| true)
            .unwrap();
        let order: Vec<&str> = report
            .attempted
            .iter()
            .map(|e| e.remediation_id.as_str())
            .collect();
        assert_eq!(order, vec!["two", "one"]);
    }

    #[test]
    fn test_before_and_after_cover_related_probes() {
        let registry = registry_with(&["svc", "other"]);
        let mut catalog = RemediationCatalog::new();
        catalog
            .register(&registry, Box::new(StaticRemedy::new("fix", &["svc"])))
            .unwrap();

        let caps = FakeCaps::healthy();
        let settings = test_settings();
        let ctx = ProbeContext::new(caps.as_set(), &settings);

        let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
        let report = orchestrator.fix(&["fix".to_string()], &|_| true).unwrap();

        assert_eq!(report.before.entries.len(), 1);
        assert_eq!(report.before.entries[0].probe_id, "svc");
        assert_eq!(report.after.entries.len(), 1);
        assert_eq!(report.after.entries[0].probe_id, "svc");
        assert_eq!(report.after.entries[0].outcome.status, ProbeStatus::Ok);
    }
}
