//! Overview listing reconstruction
//!
//! A listing page is a flat run of rows. A record-start row opens a new
//! practitioner; every following row up to the next record start adds one
//! qualification to it.

use tracing::{debug, trace};

use super::config::OverviewColumns;
use super::record_start::RecordStart;
use crate::domain::{BilingualText, Practitioner, Qualification};
use crate::infrastructure::parsing_error::{ReconstructResult, StructuralError};

/// Folds overview rows into practitioners
#[derive(Debug, Clone)]
pub struct OverviewReconstructor {
    record_start: RecordStart,
    columns: OverviewColumns,
}

impl OverviewReconstructor {
    pub fn new(record_start: RecordStart, columns: OverviewColumns) -> Self {
        Self {
            record_start,
            columns,
        }
    }

    pub fn reconstruct(&self, rows: &[Vec<String>]) -> ReconstructResult<Vec<Practitioner>> {
        let mut closed = Vec::new();
        let mut open: Option<Practitioner> = None;

        for row in rows {
            if self.record_start.is_record_start(row) {
                if let Some(done) = open.take() {
                    trace!("Closing {}", done.registration_no);
                    closed.push(done);
                }
                open = Some(self.open_record(row)?);
            } else {
                let current = open
                    .as_mut()
                    .ok_or_else(|| StructuralError::OrphanContinuation { row: row.clone() })?;
                let qualification = qualification_at(
                    row,
                    self.columns.continuation_nature,
                    self.columns.continuation_year,
                )?;
                current.qualifications.push(qualification);
            }
        }

        closed.extend(open);
        debug!("Reconstructed {} practitioners from {} rows", closed.len(), rows.len());
        Ok(closed)
    }

    fn open_record(&self, row: &[String]) -> ReconstructResult<Practitioner> {
        let columns = &self.columns;
        Ok(Practitioner::new(
            cell(row, columns.registration_no)?,
            BilingualText::new(cell(row, columns.name)?),
            BilingualText::new(cell(row, columns.address)?),
            qualification_at(row, columns.nature, columns.year)?,
        ))
    }
}

fn cell(row: &[String], position: usize) -> ReconstructResult<&str> {
    row.get(position)
        .map(String::as_str)
        .ok_or_else(|| StructuralError::MissingCell {
            row: row.to_vec(),
            position,
        })
}

fn qualification_at(row: &[String], nature: usize, year: usize) -> ReconstructResult<Qualification> {
    Qualification::parse(cell(row, nature)?, cell(row, year)?)
        .map_err(|source| StructuralError::invalid_qualification(row, source))
}
