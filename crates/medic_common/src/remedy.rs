//! Remediation model and catalog.
//!
//! A remediation is a named corrective action with a declared privilege
//! requirement and declared destructiveness. The catalog validates at
//! registration time that every probe a remediation claims to address
//! actually exists, so a dangling reference is a startup error instead of
//! a surprise at fix time.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::MedicError;
use crate::probe::ProbeContext;
use crate::registry::ProbeRegistry;

/// Outcome of applying one remediation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixResult {
    pub success: bool,
    pub message: String,
    /// Short fault classification when the remediation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl FixResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_kind: None,
        }
    }

    pub fn from_error(err: &MedicError) -> Self {
        Self {
            success: false,
            message: err.to_string(),
            error_kind: Some(err.kind().to_string()),
        }
    }
}

/// A named corrective action.
pub trait Remediation {
    /// Unique identifier, stable across runs.
    fn id(&self) -> &str;

    fn description(&self) -> &str;

    /// Does applying this remediation require euid 0?
    fn requires_elevated_privilege(&self) -> bool {
        false
    }

    /// Destructive remediations need explicit confirmation before they run.
    fn is_destructive(&self) -> bool {
        false
    }

    /// Probes this remediation addresses. Every entry must name a probe
    /// registered in the probe registry the catalog was built against.
    fn related_probe_ids(&self) -> &[&str];

    /// Perform the corrective action. Returns a success message; faults
    /// bubble up as `Err` and are captured per-remediation by the
    /// orchestrator, never aborting the rest of the batch.
    fn apply(&self, ctx: &ProbeContext) -> Result<String, MedicError>;
}

/// Ordered catalog of remediations, validated against a probe registry.
pub struct RemediationCatalog {
    items: Vec<Box<dyn Remediation>>,
    index: HashMap<String, usize>,
}

impl RemediationCatalog {
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a remediation. Fails on identifier collision or when a
    /// related probe id is unknown to `registry`; either way the catalog
    /// is left unchanged.
    pub fn register(
        &mut self,
        registry: &ProbeRegistry,
        remediation: Box<dyn Remediation>,
    ) -> Result<(), MedicError> {
        let id = remediation.id().to_string();
        if self.index.contains_key(&id) {
            return Err(MedicError::DuplicateIdentifier(id));
        }
        for probe_id in remediation.related_probe_ids() {
            if !registry.contains(probe_id) {
                return Err(MedicError::DanglingProbeReference {
                    remediation: id,
                    probe: probe_id.to_string(),
                });
            }
        }
        self.index.insert(id, self.items.len());
        self.items.push(remediation);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&dyn Remediation, MedicError> {
        self.index
            .get(id)
            .map(|&i| self.items[i].as_ref())
            .ok_or_else(|| MedicError::UnknownRemediation(id.to_string()))
    }

    /// Remediations in registration order.
    pub fn list(&self) -> impl Iterator<Item = &dyn Remediation> {
        self.items.iter().map(|r| r.as_ref())
    }

    /// Identifiers in registration order.
    pub fn ids(&self) -> Vec<String> {
        self.items.iter().map(|r| r.id().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for RemediationCatalog {
    fn default() -> Self {
        Self::new()
    }
}
