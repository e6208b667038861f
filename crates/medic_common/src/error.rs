//! Error types for medic.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedicError {
    #[error("Duplicate identifier: '{0}'")]
    DuplicateIdentifier(String),

    #[error("Remediation '{remediation}' references unknown probe '{probe}'")]
    DanglingProbeReference { remediation: String, probe: String },

    #[error("Unknown remediation: '{0}'")]
    UnknownRemediation(String),

    #[error("Insufficient privilege: {0}")]
    InsufficientPrivilege(String),

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("External call failed: {0}")]
    ExternalCallFailed(String),

    #[error("Config write failed: {0}")]
    ConfigWriteFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MedicError {
    /// Stable short name for report details and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            MedicError::DuplicateIdentifier(_) => "duplicate-identifier",
            MedicError::DanglingProbeReference { .. } => "dangling-probe-reference",
            MedicError::UnknownRemediation(_) => "unknown-remediation",
            MedicError::InsufficientPrivilege(_) => "insufficient-privilege",
            MedicError::Timeout(_) => "timeout",
            MedicError::ExternalCallFailed(_) => "external-call-failed",
            MedicError::ConfigWriteFailed(_) => "config-write-failed",
            MedicError::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_stable() {
        assert_eq!(MedicError::Timeout(500).kind(), "timeout");
        assert_eq!(
            MedicError::InsufficientPrivilege("restart service".to_string()).kind(),
            "insufficient-privilege"
        );
    }

    #[test]
    fn test_display_carries_detail() {
        let err = MedicError::DanglingProbeReference {
            remediation: "restart-service".to_string(),
            probe: "no-such-probe".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("restart-service"));
        assert!(msg.contains("no-such-probe"));
    }
}
