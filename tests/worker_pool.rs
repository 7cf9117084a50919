// tests/worker_pool.rs

use std::sync::Arc;
use std::time::{Duration, Instant};

use procpool::command::ProcessConfig;
use procpool::errors::ProcpoolError;
use procpool::os::{Kill, PsProcessTable};
use procpool::pool::{PoolSettings, PoolState, WorkerPool};
use procpool::process::ProcessState;
use procpool_test_utils::fakes::FakeProcessTable;
use procpool_test_utils::{executor_in, init_tracing, with_timeout};
use tempfile::TempDir;

fn settings(min: usize, max: usize, wait_for_finish: bool) -> PoolSettings {
    PoolSettings {
        min_workers: min,
        max_workers: max,
        cycle_sleep: Duration::from_millis(10),
        wait_sleep: Duration::from_millis(20),
        wait_for_finish,
    }
}

fn values<I: IntoIterator<Item = V>, V: Into<toml::Value>>(items: I) -> Vec<toml::Value> {
    items.into_iter().map(Into::into).collect()
}

fn pool(dir: &TempDir, template: ProcessConfig, settings: PoolSettings) -> WorkerPool {
    WorkerPool::new(executor_in(dir.path()), Arc::new(PsProcessTable), template)
        .with_settings(settings)
        .unwrap()
}

fn sleeper(seconds: &str) -> ProcessConfig {
    let mut config = ProcessConfig::new("sleep");
    config.add_argument(seconds);
    config
}

#[test]
fn key_and_values_are_validated() {
    let dir = TempDir::new().unwrap();
    let mut p = pool(&dir, ProcessConfig::new("echo"), PoolSettings::default());

    assert!(p.set_key_and_values(":OK-1", &values([1, 2])).is_ok());
    assert_eq!(p.queued(), 2);

    assert!(matches!(
        p.set_key_and_values("bad key", &values([1])),
        Err(ProcpoolError::InvalidKey(_))
    ));

    let nested = vec![toml::Value::Array(vec!["array-not-scalar".into()])];
    assert!(matches!(
        p.set_key_and_values(":OK", &nested),
        Err(ProcpoolError::InvalidValue(_))
    ));

    // Failed calls leave the previous queue alone.
    assert_eq!(p.key(), Some(":OK-1"));
    assert_eq!(p.queued(), 2);
}

#[test]
fn invalid_worker_limits_are_rejected() {
    let dir = TempDir::new().unwrap();
    let base = WorkerPool::new(
        executor_in(dir.path()),
        Arc::new(PsProcessTable),
        ProcessConfig::new("true"),
    );
    assert!(matches!(
        base.with_settings(settings(3, 2, true)),
        Err(ProcpoolError::ConfigError(_))
    ));
}

#[tokio::test]
async fn every_value_runs_once_and_pool_drains() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut template = ProcessConfig::new("echo");
    template.add_argument("$VALUE$");
    let mut p = pool(&dir, template, settings(0, 3, true));
    p.set_key_and_values(":VALUE", &values(["a", "b", "c"])).unwrap();

    with_timeout(p.start()).await.unwrap();

    assert_eq!(p.state(), PoolState::Stopped);
    assert_eq!(p.workers_executed(), 3);
    assert_eq!(p.current().await, 0);

    let mut outputs: Vec<String> = p
        .finished()
        .iter()
        .flat_map(|h| h.output().unwrap())
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec!["a", "b", "c"]);
    assert!(p
        .finished()
        .iter()
        .all(|h| h.state() == ProcessState::Succeeded));
}

#[tokio::test]
async fn quotes_in_values_stay_inside_the_argument() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut template = ProcessConfig::new("echo");
    template.add_argument("$VALUE$");
    let mut p = pool(&dir, template, settings(0, 2, true));
    p.set_key_and_values(":VALUE", &values(["O'Brien", "x'; echo INJECTED; '"]))
        .unwrap();

    with_timeout(p.start()).await.unwrap();

    assert_eq!(p.workers_executed(), 2);
    let mut outputs: Vec<String> = p
        .finished()
        .iter()
        .flat_map(|h| h.output().unwrap())
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec!["O'Brien", "x'; echo INJECTED; '"]);
    assert!(p
        .finished()
        .iter()
        .all(|h| h.state() == ProcessState::Succeeded));
}

#[tokio::test]
async fn key_reaches_every_pipe_stage() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut grep = ProcessConfig::new("grep");
    grep.add_argument("$VALUE$");
    let mut template = ProcessConfig::new("echo");
    template.add_argument("$VALUE$").set_pipe_to(Some(grep));
    let mut p = pool(&dir, template, settings(0, 2, true));
    p.set_key_and_values(":VALUE", &values(["a", "b"])).unwrap();

    with_timeout(p.start()).await.unwrap();

    assert_eq!(p.failed_launches(), 0);
    assert_eq!(p.workers_executed(), 2);
    let mut outputs: Vec<String> = p
        .finished()
        .iter()
        .flat_map(|h| h.output().unwrap())
        .collect();
    outputs.sort();
    assert_eq!(outputs, vec!["a", "b"]);
}

#[tokio::test]
async fn concurrency_never_exceeds_max_workers() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut p = pool(&dir, sleeper("0.3"), settings(0, 2, true));
    p.set_key_and_values(":N", &values([1, 2, 3, 4, 5])).unwrap();

    with_timeout(p.start()).await.unwrap();

    assert_eq!(p.workers_executed(), 5);
    assert!(p.peak_workers() <= 2, "peak was {}", p.peak_workers());
    assert_eq!(p.peak_workers(), 2);
    assert_eq!(p.finished().len(), 5);
}

#[tokio::test]
async fn min_workers_launch_without_pausing() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut s = settings(3, 3, true);
    s.cycle_sleep = Duration::from_secs(5);
    let mut p = pool(&dir, ProcessConfig::new("true"), s);
    p.set_key_and_values(":N", &values([1, 2, 3])).unwrap();

    let started = Instant::now();
    with_timeout(p.start()).await.unwrap();

    assert_eq!(p.workers_executed(), 3);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn finished_workers_are_pruned() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut p = pool(&dir, ProcessConfig::new("true"), settings(0, 4, false));
    p.set_key_and_values(":N", &values([1, 2])).unwrap();

    with_timeout(p.start()).await.unwrap();
    assert_eq!(p.workers_executed(), 2);

    with_timeout(async {
        while p.current().await > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert_eq!(p.finished().len(), 2);
}

#[tokio::test]
async fn recycled_pid_counts_as_finished() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::over(Arc::new(PsProcessTable));
    let mut p = WorkerPool::new(
        executor_in(dir.path()),
        Arc::new(table.clone()),
        sleeper("5"),
    )
    .with_settings(settings(0, 4, false))
    .unwrap();
    p.set_key_and_values(":N", &values([1])).unwrap();

    with_timeout(p.start()).await.unwrap();
    let tracked = p.active_pids();
    assert_eq!(tracked.len(), 1, "real worker is alive and matches");
    let pid = tracked[0];
    let worker = p.worker(pid).unwrap();
    let script = worker.launched_script().unwrap().to_string();
    let pgid = worker.process_group().unwrap();

    table.insert(pid, "S", &format!("/bin/sh -c {script}"));
    assert_eq!(p.current().await, 1);

    table.insert(pid, "S", "python3 unrelated.py");
    assert_eq!(p.current().await, 0, "different invocation means the pid was reused");
    assert_eq!(p.finished().len(), 1);

    Kill::system().kill_group(pgid, 9).unwrap();
}

#[tokio::test]
async fn worker_still_showing_launcher_is_kept() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::over(Arc::new(PsProcessTable));
    let mut p = WorkerPool::new(
        executor_in(dir.path()),
        Arc::new(table.clone()),
        sleeper("5"),
    )
    .with_settings(settings(0, 4, false))
    .unwrap();
    p.set_key_and_values(":N", &values([1])).unwrap();

    with_timeout(p.start()).await.unwrap();
    let pid = p.active_pids()[0];
    let worker = p.worker(pid).unwrap();
    let launcher = worker.launcher().unwrap().to_string();
    let pgid = worker.process_group().unwrap();

    // Forked but not yet exec'd: the row is the launcher shell's.
    table.insert(pid, "S", &format!("sh -c {launcher}"));
    assert_eq!(p.current().await, 1);

    Kill::system().kill_group(pgid, 9).unwrap();
}

#[tokio::test]
async fn zombie_workers_are_pruned() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let table = FakeProcessTable::over(Arc::new(PsProcessTable));
    let mut p = WorkerPool::new(
        executor_in(dir.path()),
        Arc::new(table.clone()),
        sleeper("5"),
    )
    .with_settings(settings(0, 4, false))
    .unwrap();
    p.set_key_and_values(":N", &values([1])).unwrap();

    with_timeout(p.start()).await.unwrap();
    let pid = p.active_pids()[0];
    let worker = p.worker(pid).unwrap();
    let script = worker.launched_script().unwrap().to_string();
    let pgid = worker.process_group().unwrap();

    table.insert(pid, "Z", &format!("sh -c {script}"));
    assert_eq!(p.clean_workers().await, 1);

    Kill::system().kill_group(pgid, 9).unwrap();
}

#[tokio::test]
async fn stop_signals_workers_and_keeps_tracking_them() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut p = pool(&dir, sleeper("30"), settings(0, 4, false));
    p.set_key_and_values(":N", &values([1, 2])).unwrap();

    with_timeout(p.start()).await.unwrap();
    assert_eq!(p.active_pids().len(), 2);

    assert_eq!(p.stop(), 2);
    assert_eq!(p.state(), PoolState::Stopped);
    assert_eq!(p.active_pids().len(), 2, "stop does not forget workers");

    with_timeout(async {
        while p.current().await > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    assert!(p
        .finished()
        .iter()
        .all(|h| h.state() == ProcessState::Killed));
}

#[tokio::test]
async fn launch_failures_do_not_abort_the_pool() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let mut p = pool(
        &dir,
        ProcessConfig::new("procpool-no-such-command"),
        settings(0, 2, true),
    );
    p.set_key_and_values(":N", &values([1, 2, 3])).unwrap();

    with_timeout(p.start()).await.unwrap();

    assert_eq!(p.workers_executed(), 0);
    assert_eq!(p.failed_launches(), 3);
    assert_eq!(p.queued(), 0);
}

#[tokio::test]
async fn template_without_command_aborts() {
    let dir = TempDir::new().unwrap();
    let mut p = pool(&dir, ProcessConfig::default(), settings(0, 2, true));
    p.set_key_and_values(":N", &values([1])).unwrap();
    assert!(matches!(p.start().await, Err(ProcpoolError::NoCommand)));
}
