//! Detail page reconstruction
//!
//! A detail page holds one practitioner as label/value rows in no fixed
//! order. The registration-number and qualification labels are reused for
//! the specialty block, so their meaning depends on which slots are already
//! filled.

use std::collections::HashMap;

use tracing::debug;

use super::config::DetailLabels;
use crate::domain::{BilingualText, Practitioner, Qualification};
use crate::infrastructure::parsing_error::{ReconstructResult, StructuralError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DetailField {
    Name,
    Address,
    RegistrationNo,
    Qualification,
    Specialty,
    /// Empty label: another entry for the preceding qualification label
    Continuation,
}

/// Slots filled while scanning one page
#[derive(Debug, Default)]
struct DetailSlots {
    registration_no: Option<String>,
    name: Option<BilingualText>,
    address: Option<BilingualText>,
    qualifications: Vec<Qualification>,
    specialty_registration_no: Option<String>,
    specialty_name: Option<String>,
    speciality_qualification: Option<Qualification>,
}

impl DetailSlots {
    fn specialty_started(&self) -> bool {
        self.specialty_registration_no.is_some() || self.specialty_name.is_some()
    }

    fn close(self) -> ReconstructResult<Practitioner> {
        let registration_no = self
            .registration_no
            .ok_or(StructuralError::MissingField { field: "registration_no" })?;
        let name = self.name.ok_or(StructuralError::MissingField { field: "name" })?;
        let address = self
            .address
            .ok_or(StructuralError::MissingField { field: "address" })?;
        if self.qualifications.is_empty() {
            return Err(StructuralError::MissingField {
                field: "qualifications",
            });
        }

        Ok(Practitioner {
            registration_no,
            name,
            address,
            qualifications: self.qualifications,
            specialty_registration_no: self.specialty_registration_no,
            specialty_name: self.specialty_name,
            speciality_qualification: self.speciality_qualification,
        })
    }
}

/// Folds labelled detail rows into exactly one practitioner
#[derive(Debug, Clone)]
pub struct DetailReconstructor {
    dispatch: HashMap<String, DetailField>,
    disclaimer_prefix: String,
    empty_address: String,
}

impl DetailReconstructor {
    pub fn new(labels: &DetailLabels) -> Self {
        let dispatch = HashMap::from([
            (labels.name.clone(), DetailField::Name),
            (labels.address.clone(), DetailField::Address),
            (labels.registration_no.clone(), DetailField::RegistrationNo),
            (labels.qualification.clone(), DetailField::Qualification),
            (labels.specialty.clone(), DetailField::Specialty),
            (String::new(), DetailField::Continuation),
        ]);

        Self {
            dispatch,
            disclaimer_prefix: labels.disclaimer_prefix.clone(),
            empty_address: labels.empty_address.clone(),
        }
    }

    pub fn reconstruct(&self, rows: &[Vec<String>]) -> ReconstructResult<Vec<Practitioner>> {
        let mut slots = DetailSlots::default();

        for row in rows {
            let Some(label) = row.first() else { continue };
            if !self.disclaimer_prefix.is_empty() && label.starts_with(&self.disclaimer_prefix) {
                break;
            }
            match self.dispatch.get(label.as_str()) {
                Some(field) => self.apply(&mut slots, *field, row)?,
                None => debug!("Ignoring unlabelled detail row {:?}", row),
            }
        }

        // No known label at all fails on the first mandatory field
        Ok(vec![slots.close()?])
    }

    fn apply(&self, slots: &mut DetailSlots, field: DetailField, row: &[String]) -> ReconstructResult<()> {
        match field {
            DetailField::Name => slots.name = Some(BilingualText::new(value(row)?)),
            DetailField::Address => {
                let raw = value(row)?;
                let address = if raw == self.empty_address { "" } else { raw };
                slots.address = Some(BilingualText::new(address));
            }
            DetailField::RegistrationNo => {
                let number = value(row)?.to_string();
                if slots.registration_no.is_none() {
                    slots.registration_no = Some(number);
                } else if slots.specialty_registration_no.is_none() {
                    slots.specialty_registration_no = Some(number);
                } else {
                    return Err(StructuralError::UnexpectedRepeat {
                        label: row[0].clone(),
                        row: row.to_vec(),
                    });
                }
            }
            DetailField::Qualification => {
                let qualification = trailing_qualification(row)?;
                if slots.qualifications.is_empty() {
                    slots.qualifications.push(qualification);
                } else if slots.specialty_started() {
                    if slots.speciality_qualification.is_some() {
                        return Err(StructuralError::MultipleSpecializations { row: row.to_vec() });
                    }
                    slots.speciality_qualification = Some(qualification);
                } else {
                    slots.qualifications.push(qualification);
                }
            }
            DetailField::Specialty => slots.specialty_name = Some(value(row)?.to_string()),
            DetailField::Continuation => {
                if slots.speciality_qualification.is_some() {
                    return Err(StructuralError::MultipleSpecializations { row: row.to_vec() });
                }
                if slots.qualifications.is_empty() {
                    return Err(StructuralError::OrphanContinuation { row: row.to_vec() });
                }
                slots.qualifications.push(trailing_qualification(row)?);
            }
        }
        Ok(())
    }
}

/// Last cell of a labelled row
fn value(row: &[String]) -> ReconstructResult<&str> {
    if row.len() < 2 {
        return Err(StructuralError::MissingCell {
            row: row.to_vec(),
            position: 1,
        });
    }
    Ok(row[row.len() - 1].as_str())
}

/// Nature and year from the last two cells
fn trailing_qualification(row: &[String]) -> ReconstructResult<Qualification> {
    if row.len() < 3 {
        return Err(StructuralError::MissingCell {
            row: row.to_vec(),
            position: 2,
        });
    }
    let (nature, year) = (&row[row.len() - 2], &row[row.len() - 1]);
    Qualification::parse(nature, year).map_err(|source| StructuralError::invalid_qualification(row, source))
}
