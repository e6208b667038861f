//! Command implementations.
//!
//! Each command returns the process exit code; faults that make a command
//! impossible to run at all (bad settings, inconsistent registry) bubble up
//! as errors and exit 1.

use std::io::{self, Write};

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use serde_json::json;

use medic_common::caps::system::SystemCaps;
use medic_common::caps::CapSet;
use medic_common::config::MedicConfig;
use medic_common::orchestrator::Orchestrator;
use medic_common::probe::ProbeContext;
use medic_common::probes::default_probes;
use medic_common::registry::ProbeRegistry;
use medic_common::remedies::default_remedies;
use medic_common::remedy::{Remediation, RemediationCatalog};

/// Build the probe registry and remediation catalog. An inconsistent
/// registration (duplicate id, dangling probe reference) is fatal here,
/// before any probe or remediation runs.
pub fn build_registry() -> Result<(ProbeRegistry, RemediationCatalog)> {
    let mut registry = ProbeRegistry::new();
    for probe in default_probes() {
        registry
            .register(probe)
            .context("probe registry construction failed")?;
    }

    let mut catalog = RemediationCatalog::new();
    for remedy in default_remedies() {
        catalog
            .register(&registry, remedy)
            .context("remediation catalog construction failed")?;
    }

    Ok((registry, catalog))
}

fn cap_set(caps: &SystemCaps) -> CapSet<'_> {
    CapSet {
        processes: caps,
        services: caps,
        net: caps,
        stats: caps,
        privilege: caps,
    }
}

/// `medicctl diagnose`
pub fn run_diagnose(settings: &MedicConfig, json: bool) -> Result<i32> {
    let (registry, catalog) = build_registry()?;
    let caps = SystemCaps::new();
    let ctx = ProbeContext::new(cap_set(&caps), settings);

    let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
    let report = orchestrator.diagnose();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(report.exit_code())
}

/// `medicctl fix <id>... | --all`
pub fn run_fix(settings: &MedicConfig, ids: &[String], all: bool, assume_yes: bool) -> Result<i32> {
    let (registry, catalog) = build_registry()?;
    let caps = SystemCaps::new();
    let ctx = ProbeContext::new(cap_set(&caps), settings);

    let confirm = move |r: &dyn Remediation| -> bool {
        if assume_yes {
            return true;
        }
        confirm_destructive(r)
    };

    let mut orchestrator = Orchestrator::new(&registry, &catalog, ctx);
    let report = if all {
        orchestrator.fix_all(&confirm)?
    } else {
        orchestrator.fix(ids, &confirm)?
    };

    print!("{}", report.render());
    Ok(report.exit_code())
}

/// Prompt for a destructive remediation. Returns true only on an explicit
/// "y"/"yes".
fn confirm_destructive(remediation: &dyn Remediation) -> bool {
    println!(
        "\n{} {}",
        "⚠".yellow().bold(),
        remediation.description().bold()
    );
    println!("  This action is destructive ({}).", remediation.id());
    print!("  Proceed? [y/N] ");
    if io::stdout().flush().is_err() {
        return false;
    }

    let mut input = String::new();
    if io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    let input = input.trim();
    input.eq_ignore_ascii_case("y") || input.eq_ignore_ascii_case("yes")
}

/// `medicctl list`
pub fn run_list(json: bool) -> Result<i32> {
    let (registry, catalog) = build_registry()?;

    if json {
        let payload = json!({
            "probes": registry
                .iter()
                .map(|p| json!({ "id": p.id(), "description": p.description() }))
                .collect::<Vec<_>>(),
            "remediations": catalog
                .list()
                .map(|r| json!({
                    "id": r.id(),
                    "description": r.description(),
                    "requires_elevated_privilege": r.requires_elevated_privilege(),
                    "destructive": r.is_destructive(),
                    "related_probes": r.related_probe_ids(),
                }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(0);
    }

    println!("{}", "Probes:".bold());
    for probe in registry.iter() {
        println!("  {:<18} {}", probe.id().cyan(), probe.description());
    }

    println!("\n{}", "Remediations:".bold());
    for remedy in catalog.list() {
        let mut flags = Vec::new();
        if remedy.requires_elevated_privilege() {
            flags.push("elevated".red().to_string());
        }
        if remedy.is_destructive() {
            flags.push("destructive".yellow().to_string());
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!(
            "  {:<22} {}{}",
            remedy.id().cyan(),
            remedy.description(),
            flags
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_registry_is_consistent() {
        let (registry, catalog) = build_registry().unwrap();
        assert!(!registry.is_empty());
        assert!(!catalog.is_empty());

        // Every catalog reference resolves
        for remedy in catalog.list() {
            for probe_id in remedy.related_probe_ids() {
                assert!(registry.contains(probe_id), "dangling: {probe_id}");
            }
        }
    }

    #[test]
    fn test_list_json_exit_code() {
        assert_eq!(run_list(true).unwrap(), 0);
    }
}
