//! End-to-end tests for the copy manager.
//!
//! Each test drives a real `CopyManager` against a temp root directory and a
//! small shell script standing in for the transfer tool.
#![cfg(unix)]

use carcopy_ids::ContentId;
use carcopy_worker::{CopyConfig, CopyError, CopyManager, ShutdownCause, ShutdownToken};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};

struct TestEnv {
    _temp: TempDir,
    root: PathBuf,
    work: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = temp.path().join("cars");
        let work = temp.path().join("work");
        fs::create_dir_all(&root).unwrap();
        fs::create_dir_all(&work).unwrap();
        Self {
            _temp: temp,
            root,
            work,
        }
    }

    /// Write `<cid of seed>.car` into `batch` with the given mtime.
    fn add_car(&self, batch: &str, seed: &str, unix_secs: i64) -> PathBuf {
        let name = format!("{}.car", ContentId::for_bytes(seed.as_bytes()));
        self.add_file(batch, &name, unix_secs)
    }

    fn add_file(&self, batch: &str, name: &str, unix_secs: i64) -> PathBuf {
        let dir = self.root.join(batch);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, b"car data").unwrap();
        set_file_mtime(&path, FileTime::from_unix_time(unix_secs, 0)).unwrap();
        path
    }

    fn script(&self, body: &str) -> PathBuf {
        let path = self.work.join("copy.sh");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn log_path(&self) -> PathBuf {
        self.work.join("invocations.log")
    }

    fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Script that records how many copies are running when it starts.
    fn concurrency_script(&self) -> PathBuf {
        let running_dir = self.work.join("running");
        fs::create_dir_all(&running_dir).unwrap();
        self.script(&format!(
            "marker='{dir}'/$$\n\
             touch \"$marker\"\n\
             ls '{dir}' | wc -l >> '{log}'\n\
             sleep 0.2\n\
             rm -f \"$marker\" \"$1\"",
            dir = running_dir.display(),
            log = self.log_path().display(),
        ))
    }

    fn observed_concurrency(&self) -> Vec<usize> {
        self.invocations()
            .iter()
            .map(|line| line.trim().parse().unwrap())
            .collect()
    }

    fn config(&self, script: PathBuf, parallel: usize) -> CopyConfig {
        CopyConfig::new(&self.root, script)
            .with_parallel(parallel)
            .with_intervals(
                Duration::from_millis(20),
                Duration::from_millis(20),
                Duration::from_millis(30),
            )
    }
}

fn start(
    config: CopyConfig,
) -> (Arc<CopyManager>, ShutdownToken, JoinHandle<CopyError>) {
    let manager = Arc::new(CopyManager::new(config).expect("valid config"));
    let shutdown = ShutdownToken::new();
    let handle = {
        let manager = Arc::clone(&manager);
        let shutdown = shutdown.clone();
        tokio::spawn(async move { manager.run(&shutdown).await })
    };
    (manager, shutdown, handle)
}

async fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + limit;
    while !cond() {
        assert!(Instant::now() < deadline, "condition not met within {:?}", limit);
        sleep(Duration::from_millis(10)).await;
    }
}

async fn stop(shutdown: &ShutdownToken, handle: JoinHandle<CopyError>) -> CopyError {
    shutdown.cancel(ShutdownCause::Requested("test finished".to_string()));
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("run did not return promptly after cancellation")
        .expect("run task panicked")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_copies_and_removes_all_files() {
    let env = TestEnv::new();
    let files: Vec<PathBuf> = (0..5)
        .map(|i| env.add_car("batch1", &format!("piece{}", i), 1_000 + i))
        .collect();
    let script = env.script(&format!("echo \"$1\" >> '{}'\nrm -f \"$1\"", env.log_path().display()));

    let (manager, shutdown, handle) = start(env.config(script, 2));
    wait_until(Duration::from_secs(10), || {
        manager.metrics().jobs_succeeded == 5
    })
    .await;

    for file in &files {
        assert!(!file.exists(), "{} should be removed", file.display());
    }
    assert_eq!(env.invocations().len(), 5);

    let err = stop(&shutdown, handle).await;
    assert!(err.is_cancelled());
    assert_eq!(manager.running_job_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_parallel() {
    let env = TestEnv::new();
    for i in 0..8 {
        env.add_car(&format!("batch{}", i % 2), &format!("load{}", i), 1_000 + i);
    }
    let script = env.concurrency_script();

    let (manager, shutdown, handle) = start(env.config(script, 3));
    wait_until(Duration::from_secs(20), || {
        manager.metrics().jobs_succeeded == 8
    })
    .await;
    stop(&shutdown, handle).await;

    let observed = env.observed_concurrency();
    assert_eq!(observed.len(), 8);
    assert!(observed.iter().all(|&n| n <= 3), "observed {:?}", observed);

    let metrics = manager.metrics();
    assert!(metrics.peak_scripts_running <= 3);
    assert!(metrics.peak_scripts_running >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_limit_holds_as_files_arrive() {
    let env = TestEnv::new();
    for i in 0..3 {
        env.add_car("batch0", &format!("first{}", i), 1_000 + i);
    }
    let script = env.concurrency_script();

    let (manager, shutdown, handle) = start(env.config(script, 2));
    wait_until(Duration::from_secs(5), || manager.metrics().scripts_running >= 1).await;

    // New files in the batch being worked on and in a fresh batch.
    env.add_car("batch0", "late0", 500);
    env.add_car("batch1", "late1", 2_000);
    sleep(Duration::from_millis(100)).await;
    env.add_car("batch1", "late2", 3_000);
    env.add_car("batch2", "late3", 100);
    sleep(Duration::from_millis(100)).await;
    env.add_car("batch3", "late4", 4_000);

    wait_until(Duration::from_secs(20), || {
        manager.metrics().jobs_succeeded == 8
    })
    .await;
    stop(&shutdown, handle).await;

    let observed = env.observed_concurrency();
    assert_eq!(observed.len(), 8);
    assert!(observed.iter().all(|&n| n <= 2), "observed {:?}", observed);
    assert!(manager.metrics().peak_scripts_running <= 2);
    assert_eq!(manager.metrics().jobs_failed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oldest_first_with_single_slot() {
    let env = TestEnv::new();
    let newer = env.add_car("batch", "bafy222", 2_000);
    let older = env.add_car("batch", "bafy111", 1_000);
    let script = env.script(&format!(
        "echo \"$1\" >> '{}'\nsleep 0.1\nrm -f \"$1\"",
        env.log_path().display()
    ));

    let (manager, shutdown, handle) = start(env.config(script, 1));

    wait_until(Duration::from_secs(5), || manager.running_job_count() == 1).await;
    let running = manager.running_jobs();
    assert_eq!(running[0].path, older);

    wait_until(Duration::from_secs(10), || {
        manager.metrics().jobs_succeeded == 2
    })
    .await;
    stop(&shutdown, handle).await;

    assert_eq!(
        env.invocations(),
        vec![older.display().to_string(), newer.display().to_string()]
    );
    assert_eq!(manager.metrics().peak_scripts_running, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_hyphenated_and_foreign_files_never_launched() {
    let env = TestEnv::new();
    let good = env.add_car("batch", "good", 1_000);
    let tmp_name = format!("{}-tmp.car", ContentId::for_bytes(b"tmp"));
    let in_progress = env.add_file("batch", &tmp_name, 900);
    let bad_cid = env.add_file("batch", "bafy111.car", 800);
    let text = env.add_file("batch", "notes.txt", 700);
    let script = env.script(&format!(
        "echo \"$1\" >> '{}'\nrm -f \"$1\"",
        env.log_path().display()
    ));

    let (manager, shutdown, handle) = start(env.config(script, 4));
    wait_until(Duration::from_secs(5), || manager.metrics().jobs_succeeded == 1).await;
    // Let a few more scan passes go by.
    wait_until(Duration::from_secs(5), || manager.metrics().scans >= 5).await;
    stop(&shutdown, handle).await;

    assert_eq!(env.invocations(), vec![good.display().to_string()]);
    assert!(in_progress.exists());
    assert!(bad_cid.exists());
    assert!(text.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_script_is_retried_on_next_scan() {
    let env = TestEnv::new();
    let car = env.add_car("batch", "flaky", 1_000);
    let attempts = env.work.join("attempts");
    // First attempt fails, second succeeds and cleans up.
    let script = env.script(&format!(
        "echo x >> '{attempts}'\n\
         if [ \"$(wc -l < '{attempts}')\" -lt 2 ]; then echo 'remote busy' >&2; exit 1; fi\n\
         rm -f \"$1\"",
        attempts = attempts.display(),
    ));

    let (manager, shutdown, handle) = start(env.config(script, 1));
    wait_until(Duration::from_secs(10), || {
        manager.metrics().jobs_succeeded == 1
    })
    .await;
    stop(&shutdown, handle).await;

    let metrics = manager.metrics();
    assert_eq!(metrics.jobs_failed, 1);
    assert_eq!(metrics.jobs_started, 2);
    assert_eq!(fs::read_to_string(&attempts).unwrap().lines().count(), 2);
    assert!(!car.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_running_job_not_dispatched_twice() {
    let env = TestEnv::new();
    let car = env.add_car("batch", "slow", 1_000);
    // Script "succeeds" but leaves the file, so the job stays in removal wait.
    let script = env.script(&format!("echo \"$1\" >> '{}'", env.log_path().display()));

    let (manager, shutdown, handle) = start(env.config(script, 4));
    wait_until(Duration::from_secs(5), || manager.metrics().scans >= 10).await;

    assert_eq!(manager.running_job_count(), 1);
    assert_eq!(env.invocations().len(), 1);

    // Removing the file completes the job.
    fs::remove_file(&car).unwrap();
    wait_until(Duration::from_secs(5), || manager.running_job_count() == 0).await;
    assert_eq!(manager.metrics().jobs_succeeded, 1);

    stop(&shutdown, handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_stops_removal_wait_without_deleting() {
    let env = TestEnv::new();
    let car = env.add_car("batch", "kept", 1_000);
    let script = env.script("exit 0");

    let config = env.config(script, 2).with_intervals(
        Duration::from_millis(20),
        Duration::from_secs(60),
        Duration::from_millis(30),
    );
    let (manager, shutdown, handle) = start(config);
    wait_until(Duration::from_secs(5), || {
        let metrics = manager.metrics();
        metrics.jobs_started == 1 && metrics.scripts_running == 0
    })
    .await;
    assert_eq!(manager.running_job_count(), 1);

    let started = Instant::now();
    let err = stop(&shutdown, handle).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    match err {
        CopyError::Cancelled(ShutdownCause::Requested(reason)) => {
            assert_eq!(reason, "test finished")
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(car.exists());
    assert_eq!(manager.running_job_count(), 0);
    assert_eq!(manager.metrics().jobs_cancelled, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancel_during_script_leaves_child_running() {
    let env = TestEnv::new();
    let car = env.add_car("batch", "inflight", 1_000);
    let done = env.work.join("done");
    let script = env.script(&format!(
        "sleep 0.5\necho finished > '{}'",
        done.display()
    ));

    let (manager, shutdown, handle) = start(env.config(script, 1));
    wait_until(Duration::from_secs(5), || manager.metrics().scripts_running == 1).await;

    let err = stop(&shutdown, handle).await;
    assert!(err.is_cancelled());
    let metrics = manager.metrics();
    assert_eq!(metrics.jobs_cancelled, 1);
    // The gauge only counts scripts still awaited; the child keeps going.
    assert_eq!(metrics.scripts_running, 0);
    assert!(!done.exists());

    wait_until(Duration::from_secs(5), || done.exists()).await;
    assert!(car.exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_saturated_loop_does_not_scan() {
    let env = TestEnv::new();
    env.add_car("batch", "a", 1_000);
    env.add_car("batch", "b", 1_001);
    let script = env.script("exit 0");

    let config = env.config(script, 1).with_intervals(
        Duration::from_secs(60),
        Duration::from_secs(60),
        Duration::from_millis(10),
    );
    let (manager, shutdown, handle) = start(config);
    wait_until(Duration::from_secs(5), || manager.running_job_count() == 1).await;
    let scans = manager.metrics().scans;
    sleep(Duration::from_millis(200)).await;
    assert!(manager.metrics().scans <= scans + 1);

    stop(&shutdown, handle).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_scan_error_ends_run() {
    let env = TestEnv::new();
    let script = env.script("exit 0");
    let manager = CopyManager::new(env.config(script, 1)).unwrap();
    fs::remove_dir_all(&env.root).unwrap();

    let err = timeout(Duration::from_secs(5), manager.run(&ShutdownToken::new()))
        .await
        .expect("run should stop on scan error");
    assert!(matches!(err, CopyError::ReadDir { .. }), "{:?}", err);
    assert_eq!(manager.metrics().scan_errors, 1);
}

#[tokio::test]
async fn test_cancelled_before_start_returns_immediately() {
    let env = TestEnv::new();
    env.add_car("batch", "never", 1_000);
    let script = env.script(&format!("echo \"$1\" >> '{}'", env.log_path().display()));
    let manager = CopyManager::new(env.config(script, 1)).unwrap();

    let shutdown = ShutdownToken::new();
    shutdown.cancel(ShutdownCause::Signal("SIGTERM".to_string()));
    let err = manager.run(&shutdown).await;

    assert_eq!(err.to_string(), "Cancelled: received signal SIGTERM");
    assert_eq!(manager.metrics().scans, 0);
    assert!(env.invocations().is_empty());
}

#[test]
fn test_invalid_config_rejected() {
    let env = TestEnv::new();
    let err = CopyManager::new(CopyConfig::new(&env.root, &env.root)).unwrap_err();
    assert!(matches!(err, CopyError::Config(_)));
}
