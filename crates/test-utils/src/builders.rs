#![allow(dead_code)]

use std::path::PathBuf;

use converge::config::{ConfigFile, ConfigSection, ProbeConfig, RawConfigFile, TaskConfig};
use converge::exec::TargetInfo;
use converge::task::TargetFilter;
use converge::types::{FailurePolicy, PackageManager, ShellKind};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                config: ConfigSection::default(),
                task: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, task: TaskConfig) -> Self {
        self.config.task.push(task);
        self
    }

    pub fn continue_on_error(mut self, val: bool) -> Self {
        self.config.config.continue_on_error = val;
        self
    }

    pub fn default_timeout(mut self, val: &str) -> Self {
        self.config.config.default_timeout = Some(val.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`. Defaults to a `command` probe of `true`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            task: TaskConfig {
                name: name.to_string(),
                description: None,
                probe: ProbeConfig::Command {
                    cmd: "true".to_string(),
                },
                apply: vec![format!("echo {name}")],
                after: vec![],
                policy: FailurePolicy::Fatal,
                verify: true,
                timeout: None,
                retries: 0,
                retry_delay: None,
                confirm: None,
                only_on: TargetFilter::default(),
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn probe(mut self, probe: ProbeConfig) -> Self {
        self.task.probe = probe;
        self
    }

    pub fn apply(mut self, cmd: &str) -> Self {
        self.task.apply = vec![cmd.to_string()];
        self
    }

    pub fn then(mut self, cmd: &str) -> Self {
        self.task.apply.push(cmd.to_string());
        self
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.task.policy = policy;
        self
    }

    pub fn verify(mut self, val: bool) -> Self {
        self.task.verify = val;
        self
    }

    pub fn timeout(mut self, val: &str) -> Self {
        self.task.timeout = Some(val.to_string());
        self
    }

    pub fn retries(mut self, n: u32, delay: &str) -> Self {
        self.task.retries = n;
        self.task.retry_delay = Some(delay.to_string());
        self
    }

    pub fn confirm(mut self, prompt: &str) -> Self {
        self.task.confirm = Some(prompt.to_string());
        self
    }

    pub fn only_on_package_manager(mut self, pm: PackageManager) -> Self {
        self.task.only_on.package_manager.push(pm);
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// A Linux target with the given identity and `/usr/bin` on `PATH`.
pub fn target(package_manager: Option<PackageManager>, shell: Option<ShellKind>) -> TargetInfo {
    TargetInfo {
        os: "linux".to_string(),
        package_manager,
        shell,
        path_dirs: vec![PathBuf::from("/usr/local/bin"), PathBuf::from("/usr/bin")],
    }
}
