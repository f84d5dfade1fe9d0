//! Record boundary detection for overview listings
//!
//! The listing never marks where one practitioner ends. A row starts a new
//! record only when its first cell looks like a registration number.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

type RowPredicate = dyn Fn(&[String]) -> bool + Send + Sync;

/// Decides whether a row opens a new record
#[derive(Clone)]
pub enum RecordStart {
    /// First cell matches a registration-number pattern (anchored)
    Pattern(Regex),

    /// Arbitrary row predicate, for registers with other boundary rules
    Custom(Arc<RowPredicate>),
}

impl RecordStart {
    /// Anchor `pattern` so it must cover the whole first cell
    pub fn from_pattern(pattern: &str) -> Result<Self, regex::Error> {
        let anchored = format!("^(?:{})$", pattern.trim_start_matches('^').trim_end_matches('$'));
        Ok(Self::Pattern(Regex::new(&anchored)?))
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&[String]) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn is_record_start(&self, row: &[String]) -> bool {
        match self {
            Self::Pattern(regex) => row
                .first()
                .is_some_and(|cell| regex.is_match(cell.trim())),
            Self::Custom(predicate) => predicate(row),
        }
    }
}

impl fmt::Debug for RecordStart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
