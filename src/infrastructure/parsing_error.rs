//! Parsing error types for register pages
//!
//! `MalformedPageError` is recoverable at page granularity: the page is logged
//! and skipped. `StructuralError` is not - it means the row model itself no
//! longer matches the register and must reach the caller.

use thiserror::Error;

use crate::domain::QualificationError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedPageError {
    #[error("Page body is empty")]
    EmptyBody,

    #[error("No table found in page body ({body_len} bytes)")]
    NoTable { body_len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructuralError {
    #[error("Continuation row {row:?} appeared before any record-start row")]
    OrphanContinuation { row: Vec<String> },

    #[error("Row {row:?} has no cell at position {position}")]
    MissingCell { row: Vec<String>, position: usize },

    #[error("Invalid qualification in row {row:?}: {source}")]
    InvalidQualification {
        row: Vec<String>,
        #[source]
        source: QualificationError,
    },

    #[error("Multiple specializations are not supported (row {row:?})")]
    MultipleSpecializations { row: Vec<String> },

    #[error("Unexpected repeated '{label}' row {row:?}")]
    UnexpectedRepeat { label: String, row: Vec<String> },

    #[error("Detail record is missing mandatory field '{field}'")]
    MissingField { field: &'static str },

    #[error("{source} (page: {url})")]
    OnPage {
        url: String,
        #[source]
        source: Box<StructuralError>,
    },
}

impl StructuralError {
    pub fn invalid_qualification(row: &[String], source: QualificationError) -> Self {
        Self::InvalidQualification {
            row: row.to_vec(),
            source,
        }
    }

    /// Attach the URL of the page the rows came from
    pub fn on_page(self, url: &str) -> Self {
        match self {
            already @ Self::OnPage { .. } => already,
            other => Self::OnPage {
                url: url.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// The offending row, if the error is tied to one
    pub fn row(&self) -> Option<&[String]> {
        match self {
            Self::OrphanContinuation { row }
            | Self::MissingCell { row, .. }
            | Self::InvalidQualification { row, .. }
            | Self::MultipleSpecializations { row }
            | Self::UnexpectedRepeat { row, .. } => Some(row),
            Self::MissingField { .. } => None,
            Self::OnPage { source, .. } => source.row(),
        }
    }
}

pub type ReconstructResult<T> = Result<T, StructuralError>;
