//! Command-line contracts of the wrapped analysis tools.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CIRCOMSPECT_SUFFIX: &str = ".circom";
pub const TAMARIN_SUFFIX: &str = ".spthy";

/// How thoroughly the tool should analyze the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Syntax and well-formedness only.
    #[default]
    Check,
    /// Attempt to prove every lemma.
    Prove,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Check => "check",
            Mode::Prove => "prove",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown mode '{0}' (expected check|prove)")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "check" => Ok(Mode::Check),
            "prove" => Ok(Mode::Prove),
            other => Err(UnknownMode(other.into())),
        }
    }
}

/// Flags placed before the source path, and the wall-clock budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub flags: Vec<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolSpec {
    /// Display name used in messages.
    pub name: String,
    pub program: PathBuf,
    /// Extension given to the scratch file, including the dot.
    pub suffix: String,
    pub check: Invocation,
    pub prove: Invocation,
}

impl ToolSpec {
    /// circomspect has no proof mode; both modes run the same lint pass.
    pub fn circomspect(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        let lint = Invocation {
            flags: Vec::new(),
            timeout,
        };
        Self {
            name: "circomspect".into(),
            program: program.into(),
            suffix: CIRCOMSPECT_SUFFIX.into(),
            check: lint.clone(),
            prove: lint,
        }
    }

    pub fn tamarin(
        program: impl Into<PathBuf>,
        check_timeout: Duration,
        prove_timeout: Duration,
    ) -> Self {
        Self {
            name: "tamarin-prover".into(),
            program: program.into(),
            suffix: TAMARIN_SUFFIX.into(),
            check: Invocation {
                flags: Vec::new(),
                timeout: check_timeout,
            },
            prove: Invocation {
                flags: vec!["--prove".into()],
                timeout: prove_timeout,
            },
        }
    }

    pub fn invocation(&self, mode: Mode) -> &Invocation {
        match mode {
            Mode::Check => &self.check,
            Mode::Prove => &self.prove,
        }
    }

    pub fn args_for(&self, mode: Mode, source: &Path) -> Vec<OsString> {
        let invocation = self.invocation(mode);
        let mut args: Vec<OsString> = invocation.flags.iter().map(OsString::from).collect();
        args.push(source.as_os_str().to_owned());
        args
    }

    pub fn timeout_for(&self, mode: Mode) -> Duration {
        self.invocation(mode).timeout
    }
}
