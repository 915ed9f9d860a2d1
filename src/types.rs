use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What happens to the rest of the run when a task fails.
///
/// - `Fatal`: the run is aborted; nothing after this task executes.
/// - `Degraded`: the failure is recorded and independent tasks keep going.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Fatal,
    Degraded,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Fatal
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fatal" => Ok(FailurePolicy::Fatal),
            "degraded" => Ok(FailurePolicy::Degraded),
            other => Err(format!(
                "invalid failure policy: {other} (expected \"fatal\" or \"degraded\")"
            )),
        }
    }
}

/// Phase of a task's lifecycle, as written to the run log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Probe,
    Apply,
    Verify,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Probe => "probe",
            Phase::Apply => "apply",
            Phase::Verify => "verify",
        };
        f.write_str(s)
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "probe" => Ok(Phase::Probe),
            "apply" => Ok(Phase::Apply),
            "verify" => Ok(Phase::Verify),
            other => Err(format!("invalid phase: {other}")),
        }
    }
}

/// System package manager available on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Dnf,
    Pacman,
    Brew,
}

impl PackageManager {
    /// Binary whose presence on `PATH` identifies this package manager.
    pub fn marker_binary(self) -> &'static str {
        match self {
            PackageManager::Apt => "apt-get",
            PackageManager::Dnf => "dnf",
            PackageManager::Pacman => "pacman",
            PackageManager::Brew => "brew",
        }
    }

    /// Detection order when several are installed.
    pub const ALL: [PackageManager; 4] = [
        PackageManager::Apt,
        PackageManager::Dnf,
        PackageManager::Pacman,
        PackageManager::Brew,
    ];
}

/// Login shell of the target user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Bash,
    Zsh,
    Fish,
    Other,
}

impl ShellKind {
    /// Classify a shell path such as `/usr/bin/zsh`.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        match name {
            "bash" => ShellKind::Bash,
            "zsh" => ShellKind::Zsh,
            "fish" => ShellKind::Fish,
            _ => ShellKind::Other,
        }
    }
}
