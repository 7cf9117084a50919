// tests/process_execution.rs

use std::time::Duration;

use procpool::command::ProcessConfig;
use procpool::errors::{ProbableCause, ProcpoolError};
use procpool::process::{ExecutionMode, ExecutionResult, ProcessHandle, ProcessState};
use procpool_test_utils::{executor_in, init_tracing, with_timeout};
use tempfile::TempDir;

fn shell(script: &str) -> ProcessConfig {
    let mut config = ProcessConfig::new("sh");
    config.add_argument("-c").add_argument(script);
    config
}

#[tokio::test]
async fn sync_run_returns_stdout_lines() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = ProcessConfig::new("echo");
    config.add_arguments(["hello", "world"]);
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    let result = with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap();

    assert_eq!(result, ExecutionResult::Output(vec!["hello world".to_string()]));
    assert_eq!(h.state(), ProcessState::Succeeded);
    assert_eq!(h.exit_code(), Some(0));
    assert!(h.has_executed());
    assert!(!h.is_executing());
    assert!(h.execution_time(true).is_ok());
}

#[tokio::test]
async fn exit_one_fails_with_unknown_cause() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut h = ProcessHandle::new(executor_in(dir.path()), shell("echo oops >&2; exit 1"));

    let err = with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap_err();

    let failure = err.failure().expect("ProcessFailed");
    assert_eq!(failure.exit_code, 1);
    assert_eq!(failure.probable_cause, ProbableCause::Unknown);
    assert_eq!(failure.stderr, vec!["oops".to_string()]);
    assert_eq!(failure.arguments, vec!["-c", "echo oops >&2; exit 1"]);
    assert_eq!(h.state(), ProcessState::Failed);
}

#[tokio::test]
async fn exit_124_is_attributed_to_timeout() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut h = ProcessHandle::new(executor_in(dir.path()), shell("exit 124"));

    let err = with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap_err();

    assert_eq!(err.failure().unwrap().probable_cause, ProbableCause::Timeout);
    assert_eq!(h.state(), ProcessState::TimedOut);
}

#[tokio::test]
async fn timeout_limit_stops_slow_commands() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = ProcessConfig::new("sleep");
    config.add_argument("5").set_timeout(1);
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    let err = with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap_err();

    let failure = err.failure().unwrap();
    assert_eq!(failure.exit_code, 124);
    assert_eq!(failure.timeout_seconds, 1);
    assert!(failure.elapsed < Duration::from_secs(4));
}

#[tokio::test]
async fn accepted_exit_codes_count_as_success() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = shell("exit 3");
    config.add_accepted_exit_code(3);
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    let result = with_timeout(h.execute(ExecutionMode::NoReturn)).await.unwrap();
    assert_eq!(result, ExecutionResult::Completed);
    assert_eq!(h.exit_code(), Some(3));
    assert_eq!(h.state(), ProcessState::Succeeded);
}

#[tokio::test]
async fn environment_reaches_the_command() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = shell("echo \"$GREETING\"");
    config.set_environment_variable("GREETING", "hi there");
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    let result = with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap();
    assert_eq!(result, ExecutionResult::Output(vec!["hi there".to_string()]));
}

#[tokio::test]
async fn working_directory_is_applied() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let mut config = ProcessConfig::new("pwd");
    config.set_working_directory(work.path());
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    let ExecutionResult::Output(lines) = with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap()
    else {
        panic!("expected output");
    };
    let expected = work.path().canonicalize().unwrap();
    let actual = std::path::Path::new(&lines[0]).canonicalize().unwrap();
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn registered_foreground_run_reports_its_pid() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = ProcessConfig::new("true");
    config.set_register_run_file(true);
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap();

    assert!(h.pid().is_some());
    let files = h.run_files().unwrap();
    assert!(!files.pid.exists(), "run file should be consumed");
}

#[tokio::test]
async fn missing_command_is_not_found() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut h = ProcessHandle::new(
        executor_in(dir.path()),
        ProcessConfig::new("procpool-no-such-command"),
    );

    let err = with_timeout(h.execute(ExecutionMode::Sync)).await.unwrap_err();
    assert!(matches!(err, ProcpoolError::CommandNotFound(name) if name == "procpool-no-such-command"));
    assert_eq!(h.state(), ProcessState::NotStarted);
}

#[tokio::test]
async fn background_run_records_output_and_exit_status() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut h = ProcessHandle::new(executor_in(dir.path()), shell("echo started; exit 7"));

    let result = with_timeout(h.execute(ExecutionMode::Background)).await.unwrap();
    let ExecutionResult::Background { pid } = result else {
        panic!("expected background result, got {result:?}");
    };
    assert_eq!(h.pid(), Some(pid));
    assert!(h.is_executing());
    assert!(matches!(h.execution_time(true), Err(ProcpoolError::StillRunning)));
    assert!(matches!(
        h.execute(ExecutionMode::Background).await,
        Err(ProcpoolError::StillRunning)
    ));

    let files = h.run_files().cloned().unwrap();
    with_timeout(async {
        while !files.exit.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    // Give the worker a moment to finish writing.
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(h.mark_terminated(), ProcessState::Failed);
    assert_eq!(h.exit_code(), Some(7));
    assert_eq!(h.output().unwrap(), vec!["started".to_string()]);
    assert!(h.execution_time(true).is_ok());
}

#[tokio::test]
async fn killed_background_worker_ends_as_killed() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = ProcessConfig::new("sleep");
    config.add_argument("30");
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    with_timeout(h.execute(ExecutionMode::Background)).await.unwrap();
    assert!(h.kill(15).unwrap());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.mark_terminated(), ProcessState::Killed);
    assert_eq!(h.exit_code(), Some(128 + 15));
    assert!(h.has_executed());
}

#[tokio::test]
async fn execution_time_before_start_is_an_error() {
    let dir = TempDir::new().unwrap();
    let h = ProcessHandle::new(executor_in(dir.path()), ProcessConfig::new("true"));
    assert!(matches!(h.execution_time(false), Err(ProcpoolError::NotStarted)));
    assert!(!h.has_executed());
}

#[tokio::test]
async fn failing_launcher_is_a_launch_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let executor = executor_in(dir.path());
    // Nowhere to write the pid file, so the launcher shell itself fails.
    std::fs::remove_dir_all(executor.registry().dir()).unwrap();

    let mut config = ProcessConfig::new("sleep");
    config.add_argument("1");
    let mut h = ProcessHandle::new(executor, config);

    match with_timeout(h.execute(ExecutionMode::Background)).await {
        Err(ProcpoolError::Launch { line, exit_code, output }) => {
            assert!(line.starts_with("nohup sh -c"), "{line}");
            assert_ne!(exit_code, Some(0));
            assert!(!output.is_empty());
        }
        other => panic!("expected Launch, got {other:?}"),
    }
    assert_eq!(h.state(), ProcessState::Failed);
    assert!(h.pid().is_none());
}

#[tokio::test]
async fn worker_gone_without_exit_file_or_signal_has_failed() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut config = ProcessConfig::new("sleep");
    config.add_argument("30");
    let mut h = ProcessHandle::new(executor_in(dir.path()), config);

    with_timeout(h.execute(ExecutionMode::Background)).await.unwrap();
    let pgid = h.process_group().unwrap();
    // Killed behind the handle's back: no exit file, no recorded signal.
    procpool::os::Kill::system().kill_group(pgid, 9).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(h.mark_terminated(), ProcessState::Failed);
    assert_eq!(h.exit_code(), None);
}
