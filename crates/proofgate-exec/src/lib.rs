//! Execution primitives for proofgate.
//!
//! Source text goes through three steps, each usable on its own:
//! [`scratch`] writes it to a private temporary file, [`runner`] runs an
//! external tool over that file under a timeout, and [`classify`] buckets the
//! captured output into a [`Status`]. [`analysis::analyze`] chains the three
//! for a [`ToolSpec`].

pub mod analysis;
pub mod classify;
pub mod runner;
pub mod scratch;
pub mod tool;

pub use analysis::{analyze, Analysis, AnalyzeError};
pub use classify::{classify, Classification, ClassificationFlags, Classifier, KeywordSet, Status};
pub use runner::{run, CommandRunner, ProcessOutput, RunError, SystemRunner};
pub use scratch::{Scratch, ScratchError, ScratchFile};
pub use tool::{Invocation, Mode, ToolSpec, UnknownMode};
