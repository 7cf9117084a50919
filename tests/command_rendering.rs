// tests/command_rendering.rs

use std::process::Command;

use procpool::command::{render_core, ProcessConfig, RenderMode};
use procpool::errors::ProcpoolError;
use procpool::process::ProcessHandle;
use procpool_test_utils::executor_in;
use proptest::prelude::*;
use tempfile::TempDir;

fn handle(dir: &TempDir, config: ProcessConfig) -> ProcessHandle {
    ProcessHandle::new(executor_in(dir.path()), config)
}

#[test]
fn render_is_stable_until_config_changes() {
    let dir = TempDir::new().unwrap();
    let mut config = ProcessConfig::new("echo");
    config.add_argument("one");
    let mut h = handle(&dir, config);

    let first = h.command_line(RenderMode::Foreground).unwrap();
    let second = h.command_line(RenderMode::Foreground).unwrap();
    assert_eq!(first, second);

    h.config_mut().add_argument("two");
    let third = h.command_line(RenderMode::Foreground).unwrap();
    assert_ne!(first, third);
    assert!(third.ends_with("echo one two"), "got {third}");
}

#[test]
fn background_render_keeps_its_run_files() {
    let dir = TempDir::new().unwrap();
    let mut h = handle(&dir, ProcessConfig::new("sleep"));
    h.config_mut().add_argument("1");

    let a = h.command_line(RenderMode::Background).unwrap();
    let b = h.command_line(RenderMode::Background).unwrap();
    assert_eq!(a, b);

    let files = h.run_files().cloned().unwrap();
    assert!(a.starts_with("nohup sh -c "), "got {a}");
    assert!(a.contains(&files.pid.display().to_string()));
    assert!(a.contains(&files.log.display().to_string()));
    assert!(a.contains(&files.exit.display().to_string()));

    // Changing the config re-renders but keeps the allocated files.
    h.config_mut().set_timeout(5);
    let c = h.command_line(RenderMode::Background).unwrap();
    assert_ne!(a, c);
    assert!(c.contains(&files.pid.display().to_string()));
}

#[test]
fn empty_command_is_rejected() {
    let config = ProcessConfig::default();
    assert!(matches!(render_core(&config), Err(ProcpoolError::NoCommand)));
}

#[test]
fn unresolved_placeholder_is_reported() {
    let mut config = ProcessConfig::new("echo");
    config.add_argument("$HOST$");
    match render_core(&config) {
        Err(ProcpoolError::UnresolvedVariable(name)) => assert_eq!(name, "HOST"),
        other => panic!("expected UnresolvedVariable, got {other:?}"),
    }

    config.set_variable("HOST", "db1");
    assert!(render_core(&config).unwrap().ends_with("echo db1"));
}

#[test]
fn pipe_targets_are_rendered_without_wrappers() {
    let mut target = ProcessConfig::new("wc");
    target.add_argument("-l").set_timeout(0);

    let mut config = ProcessConfig::new("ls");
    config.set_timeout(0).set_pipe_to(Some(target));
    assert_eq!(render_core(&config).unwrap(), "ls | wc -l");
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Quoted arguments reach the program unchanged.
    #[test]
    fn arguments_survive_the_shell(args in proptest::collection::vec("[ -#%-~]{0,16}", 1..4)) {
        let mut config = ProcessConfig::new("printf");
        config.set_timeout(0).add_argument("%s\\n").add_arguments(args.iter().cloned());

        let line = render_core(&config).unwrap();
        prop_assert_eq!(&line, &render_core(&config).unwrap());

        let output = Command::new("sh").arg("-c").arg(&line).output().unwrap();
        prop_assert!(output.status.success());
        let printed: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .split('\n')
            .map(str::to_string)
            .collect();
        prop_assert_eq!(&printed[..args.len()], &args[..]);
    }
}
