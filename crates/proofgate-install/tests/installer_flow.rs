//! Installer state machine driven through a fake set of install steps.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use proofgate_install::{
    spawn, InstallError, InstallPlan, InstallState, InstallSteps, Installer, Phase,
    STATUS_LOG_TAIL,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSteps {
    downloads: AtomicUsize,
    extracts: AtomicUsize,
    verifies: AtomicUsize,
    verify_done: AtomicBool,
    downloader_fails: bool,
    download_fails: bool,
    download_panics: bool,
    archive_lacks_binary: bool,
    verify_fails: bool,
    download_delay: Duration,
    verify_delay: Duration,
}

#[async_trait]
impl InstallSteps for FakeSteps {
    async fn ensure_downloader(&self) -> Result<(), InstallError> {
        if self.downloader_fails {
            return Err(InstallError::Downloader("apt-get: permission denied".into()));
        }
        Ok(())
    }

    async fn download(
        &self,
        _url: &str,
        dest: &Path,
        _timeout: Duration,
    ) -> Result<(), InstallError> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if self.download_panics {
            panic!("network stack exploded");
        }
        tokio::time::sleep(self.download_delay).await;
        if self.download_fails {
            return Err(InstallError::Download("404 Not Found (exit code 8)".into()));
        }
        fs::write(dest, b"archive").unwrap();
        Ok(())
    }

    async fn extract(&self, _archive: &Path, dest: &Path) -> Result<(), InstallError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        let bin = dest.join("tamarin-prover-1.10.0").join("bin");
        fs::create_dir_all(&bin).unwrap();
        let name = if self.archive_lacks_binary {
            "README.md"
        } else {
            "tamarin-prover"
        };
        fs::write(bin.join(name), b"#!/bin/sh\necho tamarin-prover 1.10.0\n").unwrap();
        Ok(())
    }

    async fn verify(&self, binary: &Path) -> Result<String, InstallError> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        assert!(binary.is_file());
        tokio::time::sleep(self.verify_delay).await;
        if self.verify_fails {
            return Err(InstallError::Verify("exit code 1".into()));
        }
        self.verify_done.store(true, Ordering::SeqCst);
        Ok("tamarin-prover 1.10.0".into())
    }
}

fn plan_in(dir: &TempDir) -> InstallPlan {
    InstallPlan {
        release_url: "https://example.invalid/tamarin.tar.gz".into(),
        install_path: dir.path().join("bin").join("tamarin-prover"),
        archive_path: dir.path().join("tamarin.tar.gz"),
        extract_dir: dir.path().join("extract"),
        ..InstallPlan::default()
    }
}

fn installer(dir: &TempDir, steps: FakeSteps) -> Arc<Installer<FakeSteps>> {
    Arc::new(Installer::new(
        plan_in(dir),
        steps,
        Arc::new(InstallState::new()),
    ))
}

fn full_log(state: &InstallState) -> Vec<String> {
    state.snapshot(usize::MAX).log
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_install_publishes_version_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let installer = installer(&dir, FakeSteps::default());

    assert_eq!(installer.run().await, Phase::Installed);

    let plan = installer.plan();
    assert!(plan.install_path.is_file());
    assert!(!plan.archive_path.exists());
    assert!(!plan.extract_dir.exists());

    let log = full_log(installer.state());
    assert_eq!(log.first().map(String::as_str), Some("Starting tamarin-prover installation"));
    let cleaning = log.iter().position(|e| e == "Cleaning up temporary files");
    let cleaned = log.iter().position(|e| e == "Cleaned up temporary files");
    assert!(cleaning.is_some() && cleaning < cleaned);
    assert!(log.iter().any(|e| e == "Download complete"));
    assert!(log.iter().any(|e| e.starts_with("Found binary at ")));
    assert!(log.iter().any(|e| e == "Cleaned up temporary files"));
    assert_eq!(
        log.last().map(String::as_str),
        Some("Installation successful: tamarin-prover 1.10.0")
    );

    let snap = installer.state().snapshot(STATUS_LOG_TAIL);
    assert!(snap.installed);
    assert!(!snap.installing);
    assert_eq!(snap.log.len(), STATUS_LOG_TAIL);
}

#[tokio::test]
async fn concurrent_triggers_download_once() {
    let dir = TempDir::new().unwrap();
    let installer = installer(
        &dir,
        FakeSteps {
            download_delay: Duration::from_millis(100),
            ..FakeSteps::default()
        },
    );

    let (a, b) = tokio::join!(installer.run(), installer.run());
    // The losing trigger returns immediately while the winner is mid-download.
    assert!(a == Phase::Installed || b == Phase::Installed);
    assert!(a == Phase::Installing || b == Phase::Installing);
    assert_eq!(installer.steps().downloads.load(Ordering::SeqCst), 1);

    assert_eq!(installer.run().await, Phase::Installed);
    assert_eq!(installer.steps().downloads.load(Ordering::SeqCst), 1);
    assert_eq!(installer.steps().extracts.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_installed_before_verification() {
    let dir = TempDir::new().unwrap();
    let installer = installer(
        &dir,
        FakeSteps {
            download_delay: Duration::from_millis(20),
            verify_delay: Duration::from_millis(50),
            ..FakeSteps::default()
        },
    );

    let mut readers = Vec::new();
    for _ in 0..4 {
        let installer = Arc::clone(&installer);
        readers.push(tokio::spawn(async move {
            for _ in 0..2_000 {
                let snap = installer.state().snapshot(STATUS_LOG_TAIL);
                assert!(!(snap.installed && snap.installing));
                if snap.installed {
                    assert!(installer.steps().verify_done.load(Ordering::SeqCst));
                    // Published together with the version entry, never before it.
                    assert_eq!(
                        snap.log.last().map(String::as_str),
                        Some("Installation successful: tamarin-prover 1.10.0")
                    );
                    break;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }));
    }

    let handle = spawn(Arc::clone(&installer));
    assert_eq!(handle.await.unwrap(), Phase::Installed);
    for reader in readers {
        reader.await.unwrap();
    }
    assert!(installer.state().is_installed());
    assert_eq!(installer.steps().verifies.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn download_failure_stops_the_run() {
    let dir = TempDir::new().unwrap();
    let installer = installer(
        &dir,
        FakeSteps {
            download_fails: true,
            ..FakeSteps::default()
        },
    );

    assert_eq!(installer.run().await, Phase::Failed);
    let snap = installer.state().snapshot(STATUS_LOG_TAIL);
    assert!(!snap.installed);
    assert!(!snap.installing);
    assert_eq!(
        snap.log.last().map(String::as_str),
        Some("Installation failed: download failed: 404 Not Found (exit code 8)")
    );
    assert_eq!(installer.steps().extracts.load(Ordering::SeqCst), 0);
    assert!(!installer.plan().install_path.exists());

    // Failed is terminal: no retry within the process.
    assert_eq!(installer.run().await, Phase::Failed);
}

#[tokio::test]
async fn missing_binary_in_archive_fails_and_cleans_up() {
    let dir = TempDir::new().unwrap();
    let installer = installer(
        &dir,
        FakeSteps {
            archive_lacks_binary: true,
            ..FakeSteps::default()
        },
    );

    assert_eq!(installer.run().await, Phase::Failed);
    let log = full_log(installer.state());
    assert!(log.iter().any(|e| e == "Cleaned up temporary files"));
    assert_eq!(
        log.last().map(String::as_str),
        Some("Installation failed: tamarin-prover binary not found in extracted archive")
    );
    assert!(!installer.plan().extract_dir.exists());
    assert!(!installer.plan().archive_path.exists());
}

#[tokio::test]
async fn failed_version_check_is_terminal_failure() {
    let dir = TempDir::new().unwrap();
    let installer = installer(
        &dir,
        FakeSteps {
            verify_fails: true,
            ..FakeSteps::default()
        },
    );

    assert_eq!(installer.run().await, Phase::Failed);
    assert_eq!(
        full_log(installer.state()).last().map(String::as_str),
        Some("Installation failed: version check failed: exit code 1")
    );
}

#[tokio::test]
async fn downloader_setup_failure_is_not_fatal() {
    let dir = TempDir::new().unwrap();
    let installer = installer(
        &dir,
        FakeSteps {
            downloader_fails: true,
            ..FakeSteps::default()
        },
    );

    assert_eq!(installer.run().await, Phase::Installed);
    assert!(full_log(installer.state())
        .iter()
        .any(|e| e.starts_with("Download helper setup failed, continuing")));
}

#[tokio::test]
async fn existing_binary_skips_download() {
    let dir = TempDir::new().unwrap();
    let plan = plan_in(&dir);
    fs::create_dir_all(plan.install_path.parent().unwrap()).unwrap();
    fs::write(&plan.install_path, b"#!/bin/sh\n").unwrap();

    let installer = Installer::new(plan, FakeSteps::default(), Arc::new(InstallState::new()));
    assert_eq!(installer.run().await, Phase::Installed);

    assert!(full_log(installer.state())
        .iter()
        .any(|e| e.starts_with("Found existing installation at ")));
    assert_eq!(installer.steps().downloads.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn download_disabled_without_existing_binary_fails() {
    let dir = TempDir::new().unwrap();
    let plan = InstallPlan {
        allow_download: false,
        ..plan_in(&dir)
    };
    let installer = Installer::new(plan, FakeSteps::default(), Arc::new(InstallState::new()));

    assert_eq!(installer.run().await, Phase::Failed);
    let mut log = full_log(installer.state());
    let last = log.pop().unwrap();
    assert!(last.ends_with("is not installed and automatic download is disabled"), "{last}");
    // Cleanup is logged on both sides even when there was nothing to remove.
    assert_eq!(
        log[log.len() - 2..],
        ["Cleaning up temporary files", "Cleaned up temporary files"]
    );
}

#[tokio::test]
async fn panicking_installer_is_recorded_as_failure() {
    let dir = TempDir::new().unwrap();
    let installer = installer(
        &dir,
        FakeSteps {
            download_panics: true,
            ..FakeSteps::default()
        },
    );

    let phase = spawn(Arc::clone(&installer)).await.unwrap();
    assert_eq!(phase, Phase::Failed);
    let snap = installer.state().snapshot(STATUS_LOG_TAIL);
    assert!(!snap.installing);
    assert!(!snap.installed);
    assert!(snap
        .log
        .last()
        .unwrap()
        .starts_with("Installation failed: installer task aborted"));
}
