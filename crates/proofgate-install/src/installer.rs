//! One-shot installation of the prover binary.
//!
//! [`Installer::run`] claims the shared [`InstallState`] with a check-and-set,
//! walks the install steps while appending to the state's log, removes its
//! download and extraction scratch space, and only then publishes the
//! terminal phase. Later calls in the same process are no-ops.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::state::{InstallState, Phase};
use crate::steps::{InstallError, InstallSteps};

pub const DEFAULT_RELEASE_URL: &str = "https://github.com/tamarin-prover/tamarin-prover/releases/download/1.10.0/tamarin-prover-1.10.0-linux64-ubuntu.tar.gz";
pub const DEFAULT_BINARY_NAME: &str = "tamarin-prover";
pub const DEFAULT_INSTALL_PATH: &str = "/usr/local/bin/tamarin-prover";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPlan {
    pub release_url: String,
    /// File name searched for inside the extracted archive.
    pub binary_name: String,
    pub install_path: PathBuf,
    pub archive_path: PathBuf,
    pub extract_dir: PathBuf,
    pub download_timeout: Duration,
    /// When false, only an already present binary can end in `Installed`.
    pub allow_download: bool,
}

impl Default for InstallPlan {
    fn default() -> Self {
        let tmp = std::env::temp_dir();
        Self {
            release_url: DEFAULT_RELEASE_URL.into(),
            binary_name: DEFAULT_BINARY_NAME.into(),
            install_path: PathBuf::from(DEFAULT_INSTALL_PATH),
            archive_path: tmp.join("tamarin-prover.tar.gz"),
            extract_dir: tmp.join("tamarin-prover-extract"),
            download_timeout: Duration::from_secs(600),
            allow_download: true,
        }
    }
}

pub struct Installer<S> {
    plan: InstallPlan,
    steps: S,
    state: Arc<InstallState>,
}

impl<S: InstallSteps> Installer<S> {
    pub fn new(plan: InstallPlan, steps: S, state: Arc<InstallState>) -> Self {
        Self { plan, steps, state }
    }

    pub fn plan(&self) -> &InstallPlan {
        &self.plan
    }

    pub fn state(&self) -> &Arc<InstallState> {
        &self.state
    }

    pub fn steps(&self) -> &S {
        &self.steps
    }

    /// Runs the installation if no other run has claimed it, and returns the
    /// phase observed afterwards.
    pub async fn run(&self) -> Phase {
        if !self.state.try_begin() {
            debug!(phase = %self.state.phase(), "installation already claimed; skipping");
            return self.state.phase();
        }
        self.log(format!("Starting {} installation", self.plan.binary_name));

        let outcome = self.install().await;
        self.cleanup().await;

        match outcome {
            Ok(version) => {
                info!(%version, path = %self.plan.install_path.display(), "installation complete");
                self.state
                    .mark_installed(format!("Installation successful: {version}"));
            }
            Err(err) => {
                error!(error = %err, "installation failed");
                self.state.mark_failed(format!("Installation failed: {err}"));
            }
        }
        self.state.phase()
    }

    async fn install(&self) -> Result<String, InstallError> {
        if let Some(version) = self.existing_install().await {
            return Ok(version);
        }
        if !self.plan.allow_download {
            return Err(InstallError::DownloadDisabled {
                path: self.plan.install_path.clone(),
            });
        }

        self.log("Ensuring download helper is available");
        match self.steps.ensure_downloader().await {
            Ok(()) => self.log("Download helper ready"),
            Err(err) => self.log(format!("Download helper setup failed, continuing: {err}")),
        }

        self.log(format!("Downloading {}", self.plan.release_url));
        self.steps
            .download(
                &self.plan.release_url,
                &self.plan.archive_path,
                self.plan.download_timeout,
            )
            .await?;
        self.log("Download complete");

        self.log("Extracting archive");
        self.steps
            .extract(&self.plan.archive_path, &self.plan.extract_dir)
            .await?;
        self.log("Extraction complete");

        self.log(format!("Searching for {} binary", self.plan.binary_name));
        let found = locate_binary(&self.plan.extract_dir, &self.plan.binary_name).ok_or_else(
            || InstallError::BinaryNotFound {
                binary: self.plan.binary_name.clone(),
            },
        )?;
        self.log(format!("Found binary at {}", found.display()));

        self.log(format!("Installing to {}", self.plan.install_path.display()));
        install_binary(&found, &self.plan.install_path)
            .await
            .map_err(|source| InstallError::Install {
                path: self.plan.install_path.clone(),
                source,
            })?;
        self.log("Binary installed");

        self.log("Verifying installation");
        self.steps.verify(&self.plan.install_path).await
    }

    async fn existing_install(&self) -> Option<String> {
        let path = &self.plan.install_path;
        if !path.is_file() {
            return None;
        }
        match self.steps.verify(path).await {
            Ok(version) => {
                self.log(format!("Found existing installation at {}", path.display()));
                Some(version)
            }
            Err(err) => {
                self.log(format!(
                    "Existing binary at {} is unusable ({err}); reinstalling",
                    path.display()
                ));
                None
            }
        }
    }

    async fn cleanup(&self) {
        self.log("Cleaning up temporary files");
        match tokio::fs::remove_file(&self.plan.archive_path).await {
            Ok(()) => debug!(path = %self.plan.archive_path.display(), "removed archive"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.plan.archive_path.display(),
                error = %err,
                "failed to remove archive"
            ),
        }
        match tokio::fs::remove_dir_all(&self.plan.extract_dir).await {
            Ok(()) => {
                debug!(path = %self.plan.extract_dir.display(), "removed extraction directory")
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                path = %self.plan.extract_dir.display(),
                error = %err,
                "failed to remove extraction directory"
            ),
        }
        self.log("Cleaned up temporary files");
    }

    fn log(&self, entry: impl Into<String>) {
        let entry = entry.into();
        info!("{entry}");
        self.state.append(entry);
    }
}

/// Spawns `installer` on the runtime under a supervisor task.
///
/// If the installer task panics or is cancelled, the supervisor records the
/// failure in the shared state so readers never wait on `Installing` forever.
pub fn spawn<S>(installer: Arc<Installer<S>>) -> JoinHandle<Phase>
where
    S: InstallSteps + 'static,
{
    let state = Arc::clone(installer.state());
    tokio::spawn(async move {
        let worker = tokio::spawn(async move { installer.run().await });
        match worker.await {
            Ok(phase) => phase,
            Err(err) => {
                error!(error = %err, "installer task aborted");
                // The task may have died before claiming the state.
                state.try_begin();
                state.mark_failed(format!("Installation failed: installer task aborted: {err}"));
                state.phase()
            }
        }
    })
}

/// First regular file named `name` under `root`, in file-name order.
pub fn locate_binary(root: &Path, name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .find(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .map(|entry| entry.into_path())
}

async fn install_binary(from: &Path, to: &Path) -> io::Result<()> {
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::copy(from, to).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(to, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}
