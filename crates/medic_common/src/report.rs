//! Diagnostic and fix reports, terminal rendering, exit-code folding.

use chrono::{DateTime, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::probe::{Outcome, ProbeStatus};
use crate::remedy::FixResult;

/// One probe's contribution to a diagnostic pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReportEntry {
    pub probe_id: String,
    pub description: String,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

/// Ordered probe outcomes from one diagnostic pass. Transient; rendered and
/// discarded, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
}

impl Report {
    pub fn new() -> Self {
        Self {
            generated_at: Utc::now(),
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: ReportEntry) {
        self.entries.push(entry);
    }

    pub fn get(&self, probe_id: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.probe_id == probe_id)
    }

    /// Worst status across all entries. An empty report is Ok.
    pub fn overall(&self) -> ProbeStatus {
        self.entries
            .iter()
            .map(|e| e.outcome.status)
            .max_by_key(|s| s.severity())
            .unwrap_or(ProbeStatus::Ok)
    }

    /// 0 all Ok, 1 any Warning, 2 any Failed.
    pub fn exit_code(&self) -> i32 {
        match self.overall() {
            ProbeStatus::Ok => 0,
            ProbeStatus::Warning => 1,
            ProbeStatus::Failed => 2,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", "━".repeat(56).cyan()));
        out.push_str(&format!("{}\n", "  ENVIRONMENT DIAGNOSTICS".bold().cyan()));
        out.push_str(&format!("{}\n", "━".repeat(56).cyan()));

        for entry in &self.entries {
            out.push_str(&format!(
                "{} {:<18} {}",
                status_glyph(entry.outcome.status),
                entry.probe_id,
                entry.outcome.message
            ));
            if let Some(metric) = entry.outcome.metric {
                out.push_str(&format!(" ({metric:.0})"));
            }
            out.push_str(&format!("  {}\n", format!("{}ms", entry.duration_ms).dimmed()));
        }

        let overall = self.overall();
        out.push_str(&format!(
            "\nOverall: {}\n",
            colored_status(overall)
        ));
        out
    }
}

impl Default for Report {
    fn default() -> Self {
        Self::new()
    }
}

fn status_glyph(status: ProbeStatus) -> String {
    match status {
        ProbeStatus::Ok => "✓".green().to_string(),
        ProbeStatus::Warning => "⚠".yellow().to_string(),
        ProbeStatus::Failed => "✗".red().to_string(),
    }
}

fn colored_status(status: ProbeStatus) -> String {
    match status {
        ProbeStatus::Ok => "ok".green().bold().to_string(),
        ProbeStatus::Warning => "warning".yellow().bold().to_string(),
        ProbeStatus::Failed => "failed".red().bold().to_string(),
    }
}

/// One remediation attempt inside a fix batch.
#[derive(Debug, Clone, Serialize)]
pub struct FixEntry {
    pub remediation_id: String,
    pub description: String,
    pub result: FixResult,
}

/// Outcome of a fix batch: every attempt, every declined confirmation, and
/// before/after outcomes for the probes the attempted remediations address.
#[derive(Debug, Clone, Serialize)]
pub struct FixReport {
    pub attempted: Vec<FixEntry>,
    /// Destructive remediations the caller declined to confirm.
    pub declined: Vec<String>,
    pub before: Report,
    pub after: Report,
}

impl FixReport {
    /// 0 all succeeded, 1 any failed, 3 privilege was insufficient for any.
    pub fn exit_code(&self) -> i32 {
        if self
            .attempted
            .iter()
            .any(|e| e.result.error_kind.as_deref() == Some("insufficient-privilege"))
        {
            return 3;
        }
        if self.attempted.iter().any(|e| !e.result.success) {
            return 1;
        }
        0
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("{}\n", "━".repeat(56).cyan()));
        out.push_str(&format!("{}\n", "  FIX RESULTS".bold().cyan()));
        out.push_str(&format!("{}\n", "━".repeat(56).cyan()));

        for entry in &self.attempted {
            let glyph = if entry.result.success {
                "✓".green().to_string()
            } else {
                "✗".red().to_string()
            };
            out.push_str(&format!(
                "{} {:<22} {}\n",
                glyph, entry.remediation_id, entry.result.message
            ));
        }
        for id in &self.declined {
            out.push_str(&format!(
                "{} {:<22} declined, no changes made\n",
                "-".dimmed(),
                id
            ));
        }

        if !self.after.entries.is_empty() {
            out.push_str("\nRe-checked probes:\n");
            for entry in &self.after.entries {
                let arrow = match self.before.get(&entry.probe_id) {
                    Some(prev) => format!(
                        "{} → {}",
                        colored_status(prev.outcome.status),
                        colored_status(entry.outcome.status)
                    ),
                    None => colored_status(entry.outcome.status),
                };
                out.push_str(&format!("  {:<18} {}\n", entry.probe_id, arrow));
            }
        }
        out
    }
}
