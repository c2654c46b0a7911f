// tests/watcher_registration.rs

//! Tree registration and watch-point-loss behaviour on a real filesystem.

mod common;
use crate::common::init_tracing;

use std::error::Error;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use watchrun::errors::WatchrunError;
use watchrun::run::RunRequest;
use watchrun::watch::TreeWatcher;

type TestResult = Result<(), Box<dyn Error>>;

/// Settle time for the OS notification facility after registration.
const SETTLE: Duration = Duration::from_millis(250);
const EVENT_WAIT: Duration = Duration::from_secs(5);

fn request_channel() -> (mpsc::Sender<RunRequest>, mpsc::Receiver<RunRequest>) {
    mpsc::channel::<RunRequest>(1)
}

#[tokio::test]
async fn registers_root_and_subdirectories_excluding_ignored_names() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    std::fs::create_dir_all(root.join("a/b"))?;
    std::fs::create_dir_all(root.join("c"))?;
    std::fs::create_dir_all(root.join(".git/objects"))?;
    std::fs::create_dir_all(root.join("vendor/pkg"))?;
    std::fs::write(root.join("a/file.txt"), "x")?;

    let (request_tx, _request_rx) = request_channel();
    let watcher = TreeWatcher::new(root.to_path_buf(), request_tx)?;

    let set = watcher.watch_set();
    assert!(set.contains(root));
    assert!(set.contains(&root.join("a")));
    assert!(set.contains(&root.join("a/b")));
    assert!(set.contains(&root.join("c")));
    assert!(!set.contains(&root.join(".git")));
    assert!(!set.contains(&root.join(".git/objects")));
    assert!(!set.contains(&root.join("vendor")));
    assert!(!set.contains(&root.join("vendor/pkg")));
    Ok(())
}

#[tokio::test]
async fn file_root_registers_exactly_that_path() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let file = tmp.path().join("watched.txt");
    std::fs::write(&file, "x")?;

    let (request_tx, _request_rx) = request_channel();
    let watcher = TreeWatcher::new(file.clone(), request_tx)?;

    assert_eq!(watcher.watch_set().len(), 1);
    assert!(watcher.watch_set().contains(&file));
    Ok(())
}

#[tokio::test]
async fn registration_is_idempotent_and_tolerates_vanished_paths() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    std::fs::create_dir_all(root.join("a"))?;

    let (request_tx, _request_rx) = request_channel();
    let mut watcher = TreeWatcher::new(root.to_path_buf(), request_tx)?;
    let before = watcher.watch_set().len();

    // Re-registering the whole tree changes nothing.
    watcher.register_tree(root)?;
    assert_eq!(watcher.watch_set().len(), before);

    // A path that no longer exists is silently skipped.
    watcher.register_tree(&root.join("gone"))?;
    assert_eq!(watcher.watch_set().len(), before);

    // A directory created later is picked up by re-walking it.
    std::fs::create_dir_all(root.join("new/deep"))?;
    watcher.register_tree(&root.join("new"))?;
    assert!(watcher.watch_set().contains(&root.join("new")));
    assert!(watcher.watch_set().contains(&root.join("new/deep")));
    Ok(())
}

#[tokio::test]
async fn missing_root_is_a_setup_error() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let (request_tx, _request_rx) = request_channel();

    let err = TreeWatcher::new(tmp.path().join("missing"), request_tx)
        .err()
        .expect("missing root must fail");
    assert!(matches!(err, WatchrunError::Setup(_)));
    Ok(())
}

#[tokio::test]
async fn file_change_produces_an_acknowledged_run_request() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let file = tmp.path().join("f.txt");
    std::fs::write(&file, "one")?;

    let (request_tx, mut request_rx) = request_channel();
    let watcher = TreeWatcher::new(tmp.path().to_path_buf(), request_tx)?;
    let handle = tokio::spawn(watcher.run());

    tokio::time::sleep(SETTLE).await;
    std::fs::write(&file, "two")?;

    let request = timeout(EVENT_WAIT, request_rx.recv())
        .await?
        .expect("a run request for the change");
    let _ = request.done.send(());

    handle.abort();
    Ok(())
}

#[tokio::test]
async fn removing_the_watch_root_is_fatal() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let root = tmp.path().join("sub");
    std::fs::create_dir(&root)?;

    let (request_tx, mut request_rx) = request_channel();
    let watcher = TreeWatcher::new(root.clone(), request_tx)?;
    let handle = tokio::spawn(watcher.run());

    // Acknowledge any requests so the watcher never stalls on the way to
    // the removal event.
    let ack_task = tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let _ = request.done.send(());
        }
    });

    tokio::time::sleep(SETTLE).await;
    std::fs::remove_dir(&root)?;

    let res = timeout(EVENT_WAIT, handle).await??;
    let err = res.err().expect("root removal must be fatal");
    assert!(matches!(err, WatchrunError::WatchPointLost(_)), "{err}");

    ack_task.abort();
    Ok(())
}

#[tokio::test]
async fn removing_a_descendant_is_not_fatal() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let root = tmp.path();
    std::fs::create_dir(root.join("sub"))?;

    let (request_tx, mut request_rx) = request_channel();
    let watcher = TreeWatcher::new(root.to_path_buf(), request_tx)?;
    let handle = tokio::spawn(watcher.run());

    let ack_task = tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let _ = request.done.send(());
        }
    });

    tokio::time::sleep(SETTLE).await;
    std::fs::remove_dir(root.join("sub"))?;
    tokio::time::sleep(SETTLE).await;

    assert!(!handle.is_finished(), "descendant removal must not kill the watcher");

    handle.abort();
    ack_task.abort();
    Ok(())
}
