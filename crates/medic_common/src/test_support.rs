//! Shared fakes for unit tests. Compiled only under `cfg(test)`.

use std::cell::{Cell, RefCell};
use std::net::{IpAddr, Ipv4Addr};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use crate::caps::{
    CapSet, DiskCounters, HostStats, MemoryCounters, NetProbe, PrivilegeCheck, ProcessInfo,
    ProcessQuery, ServiceControl, ServiceState,
};
use crate::config::MedicConfig;
use crate::error::MedicError;
use crate::probe::{Outcome, Probe, ProbeContext};
use crate::remedy::Remediation;

/// Settings for tests: defaults with a short call timeout.
pub fn test_settings() -> MedicConfig {
    MedicConfig {
        call_timeout_secs: 1,
        ..MedicConfig::default()
    }
}

/// Fully scripted capability set with interior mutability so tests can
/// flip host state mid-scenario.
pub struct FakeCaps {
    pub service: Cell<ServiceState>,
    pub procs: RefCell<Vec<ProcessInfo>>,
    pub killed: RefCell<Vec<u32>>,
    pub restarts: Cell<u32>,
    pub restart_fails: Cell<bool>,
    pub elevated: Cell<bool>,
    pub memory: Cell<MemoryCounters>,
    pub disk: Cell<DiskCounters>,
    pub dns_ok: Cell<bool>,
    pub net_ok: Cell<bool>,
}

impl FakeCaps {
    /// A host with nothing wrong.
    pub fn healthy() -> Self {
        Self {
            service: Cell::new(ServiceState::Active),
            procs: RefCell::new(Vec::new()),
            killed: RefCell::new(Vec::new()),
            restarts: Cell::new(0),
            restart_fails: Cell::new(false),
            elevated: Cell::new(true),
            memory: Cell::new(MemoryCounters {
                total_mb: 8192,
                available_mb: 4096,
            }),
            disk: Cell::new(DiskCounters {
                total_bytes: 100 * 1024 * 1024 * 1024,
                available_bytes: 60 * 1024 * 1024 * 1024,
            }),
            dns_ok: Cell::new(true),
            net_ok: Cell::new(true),
        }
    }

    pub fn as_set(&self) -> CapSet<'_> {
        CapSet {
            processes: self,
            services: self,
            net: self,
            stats: self,
            privilege: self,
        }
    }
}

impl ProcessQuery for FakeCaps {
    fn processes(&self) -> Result<Vec<ProcessInfo>, MedicError> {
        Ok(self.procs.borrow().clone())
    }

    fn terminate(&self, pid: u32) -> Result<(), MedicError> {
        self.killed.borrow_mut().push(pid);
        self.procs.borrow_mut().retain(|p| p.pid != pid);
        Ok(())
    }
}

impl ServiceControl for FakeCaps {
    fn state(&self, _unit: &str, _timeout: Duration) -> Result<ServiceState, MedicError> {
        Ok(self.service.get())
    }

    fn start(&self, _unit: &str, _timeout: Duration) -> Result<(), MedicError> {
        self.service.set(ServiceState::Active);
        Ok(())
    }

    fn stop(&self, _unit: &str, _timeout: Duration) -> Result<(), MedicError> {
        self.service.set(ServiceState::Inactive);
        Ok(())
    }

    fn restart(&self, unit: &str, _timeout: Duration) -> Result<(), MedicError> {
        if self.restart_fails.get() {
            return Err(MedicError::ExternalCallFailed(format!(
                "systemctl restart {unit}: exit 1"
            )));
        }
        self.restarts.set(self.restarts.get() + 1);
        self.service.set(ServiceState::Active);
        // Restarting the runtime repairs its resolver path in these scenarios.
        self.dns_ok.set(true);
        Ok(())
    }
}

impl NetProbe for FakeCaps {
    fn resolve(&self, host: &str, _timeout: Duration) -> Result<Vec<IpAddr>, MedicError> {
        if self.dns_ok.get() {
            Ok(vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))])
        } else {
            Err(MedicError::ExternalCallFailed(format!(
                "name lookup for '{host}' failed (exit 2)"
            )))
        }
    }

    fn tcp_connect(
        &self,
        _host: &str,
        _port: u16,
        timeout: Duration,
    ) -> Result<Duration, MedicError> {
        if self.net_ok.get() {
            Ok(Duration::from_millis(4))
        } else {
            Err(MedicError::Timeout(timeout.as_millis() as u64))
        }
    }
}

impl HostStats for FakeCaps {
    fn memory(&self) -> Result<MemoryCounters, MedicError> {
        Ok(self.memory.get())
    }

    fn disk(&self, _path: &Path) -> Result<DiskCounters, MedicError> {
        Ok(self.disk.get())
    }
}

impl PrivilegeCheck for FakeCaps {
    fn is_elevated(&self) -> bool {
        self.elevated.get()
    }
}

enum ProbeMode {
    Ok,
    Warning,
    Failing,
    Erroring,
    Panicking,
    TimingOut,
}

/// Probe with a scripted outcome.
pub struct StaticProbe {
    id: String,
    mode: ProbeMode,
}

impl StaticProbe {
    pub fn ok(id: &str) -> Self {
        Self {
            id: id.to_string(),
            mode: ProbeMode::Ok,
        }
    }

    pub fn warning(id: &str) -> Self {
        Self {
            id: id.to_string(),
            mode: ProbeMode::Warning,
        }
    }

    pub fn failing(id: &str) -> Self {
        Self {
            id: id.to_string(),
            mode: ProbeMode::Failing,
        }
    }

    pub fn erroring(id: &str) -> Self {
        Self {
            id: id.to_string(),
            mode: ProbeMode::Erroring,
        }
    }

    pub fn panicking(id: &str) -> Self {
        Self {
            id: id.to_string(),
            mode: ProbeMode::Panicking,
        }
    }

    pub fn timing_out(id: &str) -> Self {
        Self {
            id: id.to_string(),
            mode: ProbeMode::TimingOut,
        }
    }
}

impl Probe for StaticProbe {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "scripted test probe"
    }

    fn run(&self, _ctx: &ProbeContext) -> Result<Outcome, MedicError> {
        match self.mode {
            ProbeMode::Ok => Ok(Outcome::ok("all good")),
            ProbeMode::Warning => Ok(Outcome::warning("borderline")),
            ProbeMode::Failing => Ok(Outcome::failed("check failed")),
            ProbeMode::Erroring => Err(MedicError::ExternalCallFailed("scripted fault".into())),
            ProbeMode::Panicking => panic!("scripted panic"),
            ProbeMode::TimingOut => Err(MedicError::Timeout(1000)),
        }
    }
}

/// Remediation with scripted behavior and an apply counter, so tests can
/// verify whether side effects were attempted.
pub struct StaticRemedy {
    id: String,
    related: Vec<&'static str>,
    elevated: bool,
    destructive: bool,
    fails: bool,
    pub applied: Rc<RefCell<u32>>,
}

impl StaticRemedy {
    pub fn new(id: &str, related: &[&'static str]) -> Self {
        Self {
            id: id.to_string(),
            related: related.to_vec(),
            elevated: false,
            destructive: false,
            fails: false,
            applied: Rc::new(RefCell::new(0)),
        }
    }

    pub fn elevated(mut self) -> Self {
        self.elevated = true;
        self
    }

    pub fn destructive(mut self) -> Self {
        self.destructive = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fails = true;
        self
    }
}

impl Remediation for StaticRemedy {
    fn id(&self) -> &str {
        &self.id
    }

    fn description(&self) -> &str {
        "scripted test remediation"
    }

    fn requires_elevated_privilege(&self) -> bool {
        self.elevated
    }

    fn is_destructive(&self) -> bool {
        self.destructive
    }

    fn related_probe_ids(&self) -> &[&str] {
        &self.related
    }

    fn apply(&self, _ctx: &ProbeContext) -> Result<String, MedicError> {
        if self.fails {
            return Err(MedicError::ExternalCallFailed("scripted failure".into()));
        }
        *self.applied.borrow_mut() += 1;
        Ok("applied".to_string())
    }
}
