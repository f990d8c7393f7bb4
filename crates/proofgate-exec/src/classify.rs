//! Heuristic classification of free-form tool output.
//!
//! The classifier does not parse the tool's grammar. It looks for fixed
//! keywords, case-insensitively, and applies a fixed priority order:
//!
//! 1. exit code 0 and no keyword hit: [`Status::Success`]
//! 2. any parse-error keyword: [`Status::ParseError`]
//! 3. any well-formedness keyword: [`Status::WellformednessError`]
//! 4. otherwise [`Status::Unknown`] on exit code 0, [`Status::Error`] on any other
//!
//! Downstream consumers branch on [`Status`], so the keyword lists and this
//! order are a compatibility contract.

use std::fmt;

use serde::{Deserialize, Serialize};

pub const PARSE_ERROR_KEYWORDS: &[&str] = &[
    "parse error",
    "syntax error",
    "lexical error",
    "unexpected token",
    "parsing failed",
];

pub const WELLFORMEDNESS_ERROR_KEYWORDS: &[&str] = &[
    "undeclared function",
    "undeclared sort",
    "type error",
    "restriction not satisfied",
    "unbound variable",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    ParseError,
    WellformednessError,
    Unknown,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "success",
            Status::ParseError => "parse_error",
            Status::WellformednessError => "wellformedness_error",
            Status::Unknown => "unknown",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassificationFlags {
    pub has_parse_error: bool,
    pub has_wellformedness_error: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub success: bool,
    pub status: Status,
    pub flags: ClassificationFlags,
}

/// A list of lowercase substrings, any one of which counts as a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: Vec<String>,
}

impl KeywordSet {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    /// `haystack` must already be lowercase.
    fn matches_lowercase(&self, haystack: &str) -> bool {
        self.keywords.iter().any(|k| haystack.contains(k.as_str()))
    }

    pub fn matches(&self, text: &str) -> bool {
        self.matches_lowercase(&text.to_lowercase())
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classifier {
    parse_error: KeywordSet,
    wellformedness_error: KeywordSet,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(
            KeywordSet::new(PARSE_ERROR_KEYWORDS),
            KeywordSet::new(WELLFORMEDNESS_ERROR_KEYWORDS),
        )
    }
}

impl Classifier {
    pub fn new(parse_error: KeywordSet, wellformedness_error: KeywordSet) -> Self {
        Self {
            parse_error,
            wellformedness_error,
        }
    }

    pub fn classify(&self, output: &str, exit_code: i32) -> Classification {
        let lowered = output.to_lowercase();
        let flags = ClassificationFlags {
            has_parse_error: self.parse_error.matches_lowercase(&lowered),
            has_wellformedness_error: self.wellformedness_error.matches_lowercase(&lowered),
        };

        let status = if exit_code == 0 && !flags.has_parse_error && !flags.has_wellformedness_error
        {
            Status::Success
        } else if flags.has_parse_error {
            Status::ParseError
        } else if flags.has_wellformedness_error {
            Status::WellformednessError
        } else if exit_code == 0 {
            Status::Unknown
        } else {
            Status::Error
        };

        Classification {
            success: matches!(status, Status::Success | Status::Unknown),
            status,
            flags,
        }
    }
}

/// Classifies with the default keyword lists.
pub fn classify(output: &str, exit_code: i32) -> Classification {
    Classifier::default().classify(output, exit_code)
}
