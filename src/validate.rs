//! Card number validation
//!
//! Normalizes a raw OCR string and checks it against the 20-digit card
//! pattern. On success the string is split into a 16-digit number and a
//! 4-digit security code.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::CardCandidate;

pub const NUMBER_LEN: usize = 16;
pub const CODE_LEN: usize = 4;

static TWENTY_DIGITS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9]{20}").expect("static pattern"));

/// How non-digit characters are removed before matching
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigitCleanup {
    /// Trim non-digits from both ends only; interior characters survive
    #[default]
    TrimEdges,
    /// Remove every non-digit character
    StripAll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidatorOptions {
    pub cleanup: DigitCleanup,
}

/// Why a recognized string was not accepted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NoTwentyDigitRun,
    NonDigit,
    /// Leading "1", usually a letter from the preceding word misread as a digit
    LeadingOne,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NoTwentyDigitRun => write!(f, "no run of 20 digits"),
            Rejection::NonDigit => write!(f, "contains non-digit characters"),
            Rejection::LeadingOne => write!(f, "starts with 1"),
        }
    }
}

impl std::error::Error for Rejection {}

/// Remove non-digit characters according to `mode`
pub fn clean_digits(raw: &str, mode: DigitCleanup) -> String {
    match mode {
        DigitCleanup::TrimEdges => raw
            .trim_matches(|c: char| !c.is_ascii_digit())
            .to_string(),
        DigitCleanup::StripAll => raw.chars().filter(|c| c.is_ascii_digit()).collect(),
    }
}

/// Clean a raw string the way the validator does before matching
pub fn normalize(raw: &str, mode: DigitCleanup) -> String {
    clean_digits(raw, mode).replace('O', "0")
}

/// Validate a recognized string and split it into number and code
///
/// The split uses fixed offsets on the cleaned string: the first 16
/// characters and the last 4. For strings longer than 20 digits this may not
/// line up with the matched run.
pub fn validate(raw: &str, options: &ValidatorOptions) -> Result<CardCandidate, Rejection> {
    let cleaned = normalize(raw, options.cleanup);

    if !TWENTY_DIGITS.is_match(&cleaned) {
        return Err(Rejection::NoTwentyDigitRun);
    }
    if !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return Err(Rejection::NonDigit);
    }
    if cleaned.starts_with('1') {
        return Err(Rejection::LeadingOne);
    }

    // All ASCII from here, byte offsets are char offsets
    let number = cleaned[..NUMBER_LEN].to_string();
    let code = cleaned[cleaned.len() - CODE_LEN..].to_string();

    Ok(CardCandidate { number, code })
}
