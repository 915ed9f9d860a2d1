#![cfg(unix)]

mod common;
use crate::common::{init_tracing, with_timeout};

use std::fs;
use std::time::Duration;

use clap::Parser;

use converge::cli::CliArgs;
use converge::config::default_config_path;
use converge::engine::runlog::read_events;
use converge::engine::{EXIT_ABORTED, EXIT_DEGRADED, EXIT_SUCCESS};
use converge::exec::{CommandError, CommandRunner, CommandSpec, ShellCommandRunner};
use converge::types::Phase;

#[tokio::test]
async fn captures_exit_code_and_output() {
    init_tracing();
    let runner = ShellCommandRunner;

    let out = with_timeout(runner.run(&CommandSpec::new("sh", "echo hello; echo oops >&2; exit 3")))
        .await
        .unwrap();
    assert_eq!(out.code, Some(3));
    assert!(!out.success());
    assert_eq!(out.stdout.trim(), "hello");
    assert_eq!(out.stderr.trim(), "oops");

    let out = with_timeout(runner.run(&CommandSpec::new("sh", "true")))
        .await
        .unwrap();
    assert!(out.success());
}

#[tokio::test]
async fn missing_command_exits_127() {
    init_tracing();
    let out = with_timeout(
        ShellCommandRunner.run(&CommandSpec::new("sh", "definitely-not-a-real-binary-xyz")),
    )
    .await
    .unwrap();
    assert_eq!(out.code, Some(127));
}

#[tokio::test]
async fn slow_command_is_killed_on_timeout() {
    init_tracing();
    let spec = CommandSpec::new("sh", "sleep 30").with_timeout(Some(Duration::from_millis(100)));

    let err = with_timeout(ShellCommandRunner.run(&spec)).await.unwrap_err();
    assert!(matches!(err, CommandError::TimedOut { .. }));
}

#[tokio::test]
async fn missing_shell_fails_to_spawn() {
    init_tracing();
    let spec = CommandSpec::new("/nonexistent/shell", "true");
    let err = with_timeout(ShellCommandRunner.run(&spec)).await.unwrap_err();
    assert!(matches!(err, CommandError::Spawn { .. }));
}

#[tokio::test]
async fn commands_run_in_their_own_process_group() {
    init_tracing();
    let spec = CommandSpec::new(
        "sh",
        "echo $(ps -o pgid= -p $$) $(ps -o pgid= -p $PPID) $$",
    );

    let out = with_timeout(ShellCommandRunner.run(&spec)).await.unwrap();
    assert!(out.success(), "stderr: {}", out.stderr);
    let ids: Vec<&str> = out.stdout.split_whitespace().collect();
    assert_eq!(ids.len(), 3, "stdout: {}", out.stdout);
    let (child_group, parent_group, child_pid) = (ids[0], ids[1], ids[2]);

    assert_ne!(child_group, parent_group);
    assert_eq!(child_group, child_pid, "the command leads its own group");
}

fn write_catalog(dir: &std::path::Path, body: &str) -> String {
    let path = dir.join("Converge.toml");
    fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn end_to_end_converges_then_skips() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().display().to_string();
    let config = write_catalog(
        dir.path(),
        &format!(
            r#"
[config]
log_path = "{root}/state/run.log"

[[task]]
name = "workspace"
probe = {{ kind = "directory", path = "{root}/ws" }}
apply = ["mkdir -p {root}/ws"]

[[task]]
name = "rc"
after = ["workspace"]
probe = {{ kind = "file_contains", path = "{root}/ws/rc", text = "managed" }}
apply = ["echo '# managed' >> {root}/ws/rc"]
"#
        ),
    );

    let args = CliArgs::try_parse_from(["converge", "--config", &config]).unwrap();
    let code = with_timeout(converge::run(args.clone())).await.unwrap();
    assert_eq!(code, EXIT_SUCCESS);
    assert!(dir.path().join("ws/rc").is_file());

    let code = with_timeout(converge::run(args)).await.unwrap();
    assert_eq!(code, EXIT_SUCCESS);

    let events = read_events(&dir.path().join("state/run.log")).unwrap();
    let second_run: Vec<_> = events[events.len() - 2..].iter().collect();
    assert!(second_run
        .iter()
        .all(|e| e.phase == Phase::Probe && e.outcome == "skipped"));
    // One content line: the apply did not run twice.
    let rc = fs::read_to_string(dir.path().join("ws/rc")).unwrap();
    assert_eq!(rc.matches("managed").count(), 1);
}

#[tokio::test]
async fn end_to_end_exit_codes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().display().to_string();
    let config = write_catalog(
        dir.path(),
        &format!(
            r#"
[[task]]
name = "broken"
policy = "degraded"
probe = {{ kind = "file", path = "{root}/never" }}
apply = ["exit 1"]

[[task]]
name = "fine"
probe = {{ kind = "file", path = "{root}/fine" }}
apply = ["touch {root}/fine"]
"#
        ),
    );

    let args = CliArgs::try_parse_from(["converge", "--config", &config]).unwrap();
    assert_eq!(with_timeout(converge::run(args)).await.unwrap(), EXIT_DEGRADED);
    assert!(dir.path().join("fine").exists());

    // Dry run on a fresh file: nothing is touched.
    let args = CliArgs::try_parse_from([
        "converge",
        "--config",
        &config,
        "--dry-run",
        "--only",
        "broken",
    ])
    .unwrap();
    assert_eq!(with_timeout(converge::run(args)).await.unwrap(), EXIT_SUCCESS);
    assert!(!dir.path().join("never").exists());

    let fatal = write_catalog(
        dir.path(),
        &format!(
            r#"
[[task]]
name = "broken"
probe = {{ kind = "file", path = "{root}/never" }}
apply = ["exit 1"]

[[task]]
name = "later"
probe = {{ kind = "file", path = "{root}/later" }}
apply = ["touch {root}/later"]
"#
        ),
    );
    let args = CliArgs::try_parse_from(["converge", "--config", &fatal]).unwrap();
    assert_eq!(with_timeout(converge::run(args)).await.unwrap(), EXIT_ABORTED);
    assert!(!dir.path().join("later").exists());
}

#[tokio::test]
async fn cycle_fails_before_any_command_runs() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().display().to_string();
    let config = write_catalog(
        dir.path(),
        &format!(
            r#"
[[task]]
name = "a"
after = ["b"]
probe = {{ kind = "file", path = "{root}/a" }}
apply = ["touch {root}/a"]

[[task]]
name = "b"
after = ["a"]
probe = {{ kind = "file", path = "{root}/b" }}
apply = ["touch {root}/b"]
"#
        ),
    );

    let args = CliArgs::try_parse_from(["converge", "--config", &config]).unwrap();
    let err = with_timeout(converge::run(args)).await.unwrap_err();
    assert!(err.is_configuration_error());
    assert!(!dir.path().join("a").exists());
    assert!(!dir.path().join("b").exists());
}

#[test]
fn cli_parses_every_flag() {
    let args = CliArgs::try_parse_from([
        "converge",
        "--config",
        "catalog.toml",
        "--dry-run",
        "--only",
        "git,zsh",
        "--continue-on-error",
        "--log-path",
        "/tmp/run.log",
        "--log-level",
        "debug",
        "-y",
        "--task-timeout",
        "90s",
    ])
    .unwrap();

    assert_eq!(args.config, "catalog.toml");
    assert!(args.dry_run);
    assert_eq!(args.only, vec!["git", "zsh"]);
    assert!(args.continue_on_error);
    assert_eq!(args.log_path.as_deref(), Some(std::path::Path::new("/tmp/run.log")));
    assert!(args.log_level.is_some());
    assert!(args.yes);
    assert_eq!(args.task_timeout, Some(Duration::from_secs(90)));

    assert!(CliArgs::try_parse_from(["converge", "--task-timeout", "soon"]).is_err());

    let defaults = CliArgs::try_parse_from(["converge"]).unwrap();
    assert_eq!(std::path::PathBuf::from(&defaults.config), default_config_path());
    assert!(defaults.only.is_empty());
    assert!(!defaults.yes);
}
