use std::io::Write;

use time::OffsetDateTime;
use time::macros::format_description;

use crate::models::CardCandidate;

/// Two write-only text surfaces: the card number and the security code
///
/// Only the scanner loop that owns a display writes to it. The last
/// accepted candidate always replaces whatever was shown before.
pub trait CardDisplay: Send {
    fn show_number(&mut self, number: &str);
    fn show_code(&mut self, code: &str);
}

/// Write both labels of a candidate
pub fn show_candidate<D: CardDisplay + ?Sized>(display: &mut D, candidate: &CardCandidate) {
    display.show_number(&candidate.number);
    display.show_code(&candidate.code);
}

/// In-memory labels
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LabelDisplay {
    number: Option<String>,
    code: Option<String>,
    writes: usize,
}

impl LabelDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn number(&self) -> Option<&str> {
        self.number.as_deref()
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Number of label writes so far
    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl CardDisplay for LabelDisplay {
    fn show_number(&mut self, number: &str) {
        self.number = Some(number.to_string());
        self.writes += 1;
    }

    fn show_code(&mut self, code: &str) {
        self.code = Some(code.to_string());
        self.writes += 1;
    }
}

/// Prints the labels to stdout whenever the shown pair changes
#[derive(Debug, Default)]
pub struct ConsoleDisplay {
    labels: LabelDisplay,
    printed: Option<(String, String)>,
}

impl ConsoleDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> &LabelDisplay {
        &self.labels
    }

    fn refresh(&mut self) {
        let (Some(number), Some(code)) = (self.labels.number(), self.labels.code()) else {
            return;
        };
        let current = (number.to_string(), code.to_string());
        if self.printed.as_ref() == Some(&current) {
            return;
        }

        let stamp = OffsetDateTime::now_utc()
            .format(format_description!("[hour]:[minute]:[second]"))
            .unwrap_or_default();
        let mut stdout = std::io::stdout().lock();
        let _ = writeln!(stdout, "[{stamp}] card number: {}  security code: {}", current.0, current.1);
        self.printed = Some(current);
    }
}

impl CardDisplay for ConsoleDisplay {
    fn show_number(&mut self, number: &str) {
        self.labels.show_number(number);
    }

    fn show_code(&mut self, code: &str) {
        self.labels.show_code(code);
        self.refresh();
    }
}
