use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use proofgate_exec::ToolSpec;
use proofgate_install::InstallPlan;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_request_bytes: usize,
    pub max_source_bytes: usize,
    /// Cap on each tool output text returned to clients.
    pub max_output_bytes: usize,
    pub max_concurrent_runs: usize,
    pub allowed_origins: Vec<String>,
    pub circomspect_bin: PathBuf,
    pub circomspect_timeout_secs: u64,
    pub tamarin_check_timeout_secs: u64,
    pub tamarin_prove_timeout_secs: u64,
    pub health_probe_timeout_secs: u64,
    /// Also determines where the tamarin binary is invoked from.
    pub install: InstallPlan,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let env_or = |key: &str, default: String| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
        };
        fn parsed<T: FromStr>(raw: Option<String>, default: T) -> T {
            raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
        }

        let defaults = InstallPlan::default();
        let install = InstallPlan {
            release_url: env_or("TAMARIN_RELEASE_URL", defaults.release_url),
            install_path: PathBuf::from(env_or(
                "TAMARIN_BIN",
                defaults.install_path.to_string_lossy().into_owned(),
            )),
            download_timeout: Duration::from_secs(parsed(
                lookup("TAMARIN_DOWNLOAD_TIMEOUT_SECS"),
                defaults.download_timeout.as_secs(),
            )),
            allow_download: parsed(lookup("TAMARIN_AUTO_INSTALL"), defaults.allow_download),
            ..defaults
        };

        Self {
            host: env_or("PROOFGATE_HOST", "0.0.0.0".into()),
            port: parsed(lookup("PORT"), 5000),
            max_request_bytes: parsed(lookup("PROOFGATE_MAX_REQUEST_BYTES"), 1_048_576),
            max_source_bytes: parsed(lookup("PROOFGATE_MAX_SOURCE_BYTES"), 524_288),
            max_output_bytes: parsed(lookup("PROOFGATE_MAX_OUTPUT_BYTES"), 4_194_304),
            max_concurrent_runs: parsed(lookup("PROOFGATE_MAX_CONCURRENT_RUNS"), 4),
            allowed_origins: lookup("PROOFGATE_ALLOWED_ORIGINS")
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            circomspect_bin: PathBuf::from(env_or("CIRCOMSPECT_BIN", "circomspect".into())),
            circomspect_timeout_secs: parsed(lookup("CIRCOMSPECT_TIMEOUT_SECS"), 30),
            tamarin_check_timeout_secs: parsed(lookup("TAMARIN_CHECK_TIMEOUT_SECS"), 60),
            tamarin_prove_timeout_secs: parsed(lookup("TAMARIN_PROVE_TIMEOUT_SECS"), 300),
            health_probe_timeout_secs: parsed(lookup("HEALTH_PROBE_TIMEOUT_SECS"), 10),
            install,
        }
    }

    pub fn circomspect(&self) -> ToolSpec {
        ToolSpec::circomspect(
            self.circomspect_bin.clone(),
            Duration::from_secs(self.circomspect_timeout_secs),
        )
    }

    pub fn tamarin(&self) -> ToolSpec {
        ToolSpec::tamarin(
            self.install.install_path.clone(),
            Duration::from_secs(self.tamarin_check_timeout_secs),
            Duration::from_secs(self.tamarin_prove_timeout_secs),
        )
    }
}
