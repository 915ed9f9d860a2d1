// src/exec/target.rs

//! Identity of the machine being provisioned.

use std::path::PathBuf;

use tracing::debug;

use crate::fs::{find_on_path, FileSystem};
use crate::types::{PackageManager, ShellKind};

/// What the running target looks like: OS, package manager, login shell
/// and the executable search path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub os: String,
    pub package_manager: Option<PackageManager>,
    pub shell: Option<ShellKind>,
    pub path_dirs: Vec<PathBuf>,
}

impl TargetInfo {
    /// Detect the target from the process environment (`PATH`, `SHELL`).
    pub fn detect(fs: &dyn FileSystem) -> Self {
        let path_var = std::env::var("PATH").ok();
        let shell_var = std::env::var("SHELL").ok();
        let info = Self::from_env_values(
            fs,
            std::env::consts::OS,
            path_var.as_deref(),
            shell_var.as_deref(),
        );
        debug!(?info, "detected target");
        info
    }

    /// Build target info from explicit environment values.
    pub fn from_env_values(
        fs: &dyn FileSystem,
        os: &str,
        path_var: Option<&str>,
        shell_var: Option<&str>,
    ) -> Self {
        let path_dirs: Vec<PathBuf> = path_var
            .map(|p| {
                p.split(':')
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default();

        let package_manager = PackageManager::ALL
            .into_iter()
            .find(|pm| find_on_path(fs, &path_dirs, pm.marker_binary()).is_some());

        let shell = shell_var
            .filter(|s| !s.is_empty())
            .map(ShellKind::from_path);

        Self {
            os: os.to_string(),
            package_manager,
            shell,
            path_dirs,
        }
    }
}
