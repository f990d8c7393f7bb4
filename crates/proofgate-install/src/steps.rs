//! The externally visible actions of an installation.
//!
//! [`InstallSteps`] covers everything that reaches outside the process
//! (package manager, network, archive tool, the installed binary). The
//! installer drives these steps; [`SystemSteps`] runs them with real
//! subprocesses.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use proofgate_exec::{run, ProcessOutput, RunError};
use thiserror::Error;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const PACKAGE_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(300);
const VERIFY_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("download helper unavailable: {0}")]
    Downloader(String),
    #[error("download failed: {0}")]
    Download(String),
    #[error("extraction failed: {0}")]
    Extract(String),
    #[error("{binary} binary not found in extracted archive")]
    BinaryNotFound { binary: String },
    #[error("failed to install binary to {path}: {source}")]
    Install {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("version check failed: {0}")]
    Verify(String),
    #[error("{path} is not installed and automatic download is disabled")]
    DownloadDisabled { path: PathBuf },
}

#[async_trait]
pub trait InstallSteps: Send + Sync {
    /// Makes the download helper available. Failure is not fatal.
    async fn ensure_downloader(&self) -> Result<(), InstallError>;

    async fn download(&self, url: &str, dest: &Path, timeout: Duration)
        -> Result<(), InstallError>;

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), InstallError>;

    /// Runs `<binary> --version` and returns the reported version line.
    async fn verify(&self, binary: &Path) -> Result<String, InstallError>;
}

/// `wget`, `apt-get` and `tar` as child processes.
#[derive(Debug, Clone)]
pub struct SystemSteps {
    pub downloader: String,
    pub package_manager: String,
    pub tar: String,
}

impl Default for SystemSteps {
    fn default() -> Self {
        Self {
            downloader: "wget".into(),
            package_manager: "apt-get".into(),
            tar: "tar".into(),
        }
    }
}

fn failure_text(output: &ProcessOutput) -> String {
    let text = output.stderr.trim();
    let text = if text.is_empty() {
        output.stdout.trim()
    } else {
        text
    };
    if text.is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        format!("{text} (exit code {})", output.exit_code)
    }
}

#[async_trait]
impl InstallSteps for SystemSteps {
    async fn ensure_downloader(&self) -> Result<(), InstallError> {
        if let Ok(output) = run(&self.downloader, ["--version"], PROBE_TIMEOUT).await {
            if output.success() {
                return Ok(());
            }
        }
        let output = run(
            &self.package_manager,
            ["install", "-y", self.downloader.as_str()],
            PACKAGE_INSTALL_TIMEOUT,
        )
        .await
        .map_err(|e| InstallError::Downloader(e.to_string()))?;
        if output.success() {
            Ok(())
        } else {
            Err(InstallError::Downloader(failure_text(&output)))
        }
    }

    async fn download(
        &self,
        url: &str,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), InstallError> {
        let output = run(
            &self.downloader,
            [OsStr::new("-q"), OsStr::new("-O"), dest.as_os_str(), OsStr::new(url)],
            timeout,
        )
        .await
        .map_err(|e| InstallError::Download(e.to_string()))?;
        // wget -q is silent on success; anything on stderr is a failure report.
        if !output.success() || !output.stderr.trim().is_empty() {
            return Err(InstallError::Download(failure_text(&output)));
        }
        Ok(())
    }

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(dest)
            .await
            .map_err(|e| InstallError::Extract(format!("{}: {e}", dest.display())))?;
        let output = run(
            &self.tar,
            [OsStr::new("-xzf"), archive.as_os_str(), OsStr::new("-C"), dest.as_os_str()],
            EXTRACT_TIMEOUT,
        )
        .await
        .map_err(|e| InstallError::Extract(e.to_string()))?;
        if !output.success() {
            return Err(InstallError::Extract(failure_text(&output)));
        }
        Ok(())
    }

    async fn verify(&self, binary: &Path) -> Result<String, InstallError> {
        let output = run(binary, ["--version"], VERIFY_TIMEOUT)
            .await
            .map_err(|e: RunError| InstallError::Verify(e.to_string()))?;
        if !output.success() {
            return Err(InstallError::Verify(failure_text(&output)));
        }
        Ok(version_line(&output))
    }
}

/// First non-blank line of the version output.
pub fn version_line(output: &ProcessOutput) -> String {
    output
        .combined()
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("unknown version")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, exit_code: i32) -> ProcessOutput {
        ProcessOutput {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    #[test]
    fn version_line_skips_blank_lines() {
        let out = output("\n  tamarin-prover 1.10.0, (C) David Basin\n\nmaude tool: 'maude'", "", 0);
        assert_eq!(version_line(&out), "tamarin-prover 1.10.0, (C) David Basin");
        assert_eq!(version_line(&output("", "", 0)), "unknown version");
    }

    #[test]
    fn failure_text_prefers_stderr() {
        assert_eq!(
            failure_text(&output("noise", "404 Not Found", 8)),
            "404 Not Found (exit code 8)"
        );
        assert_eq!(failure_text(&output("", "", 2)), "exit code 2");
        assert_eq!(failure_text(&output("only out", "", 1)), "only out (exit code 1)");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn download_fails_when_helper_missing() {
        let steps = SystemSteps {
            downloader: "proofgate-missing-downloader".into(),
            ..SystemSteps::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let err = steps
            .download(
                "http://127.0.0.1:9/archive.tar.gz",
                &dir.path().join("a.tar.gz"),
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Download(_)), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn verify_reports_nonzero_exit() {
        let err = SystemSteps::default()
            .verify(Path::new("false"))
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Verify(_)), "{err}");
    }
}
