//! Practitioner register entities
//!
//! `BilingualText`, `Qualification` and `Practitioner` mirror one entry of the
//! public register. Their serde shape is the on-disk JSON format and the
//! search-index document format at the same time, so field names are fixed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static LATIN_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[a-zA-Z0-9.,!?]+").expect("valid latin pattern"));

static CJK_IDEOGRAPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{4e00}-\u{9fff}]").expect("valid cjk pattern"));

/// `(...)` or `[...]` groups inside a qualification cell
static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("valid bracket pattern"));

/// Free text that mixes Chinese and English, e.g. `區卓仲AU, CHEUK CHUNG`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualText {
    text: String,
}

impl BilingualText {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Latin letters, digits and `.,!?` runs joined by a single space
    pub fn latin(&self) -> String {
        LATIN_RUN
            .find_iter(&self.text)
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// CJK unified ideographs only. Punctuation and full-width forms are dropped.
    pub fn cjk(&self) -> String {
        CJK_IDEOGRAPH
            .find_iter(&self.text)
            .map(|m| m.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

impl From<&str> for BilingualText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl std::fmt::Display for BilingualText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QualificationError {
    #[error("Qualification year '{year}' is not a number (nature: '{nature_tag}')")]
    InvalidYear { nature_tag: String, year: String },
}

/// One credential entry, e.g. `MB BS (Lond)` obtained in `1998`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Qualification {
    pub nature: BilingualText,
    pub tag: Option<String>,
    pub year: i32,
}

impl Qualification {
    /// Build from the raw cell pair of a register row.
    ///
    /// Every bracketed group is removed from `nature_tag` to form the nature;
    /// the first group, without its brackets, becomes the tag.
    pub fn parse(nature_tag: &str, year: &str) -> Result<Self, QualificationError> {
        let year_value = year
            .trim()
            .parse::<i32>()
            .map_err(|_| QualificationError::InvalidYear {
                nature_tag: nature_tag.to_string(),
                year: year.to_string(),
            })?;

        let nature = BilingualText::new(&BRACKETED.replace_all(nature_tag, ""));
        let tag = BRACKETED.find(nature_tag).map(|m| {
            let group = m.as_str();
            group[1..group.len() - 1].trim().to_string()
        });

        Ok(Self {
            nature,
            tag,
            year: year_value,
        })
    }
}

/// One register entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Practitioner {
    pub registration_no: String,
    pub name: BilingualText,
    pub address: BilingualText,
    pub qualifications: Vec<Qualification>,
    #[serde(default)]
    pub specialty_registration_no: Option<String>,
    #[serde(default)]
    pub specialty_name: Option<String>,
    #[serde(default)]
    pub speciality_qualification: Option<Qualification>,
}

impl Practitioner {
    /// Open a record seeded with its first qualification
    pub fn new(
        registration_no: &str,
        name: BilingualText,
        address: BilingualText,
        first_qualification: Qualification,
    ) -> Self {
        Self {
            registration_no: registration_no.trim().to_string(),
            name,
            address,
            qualifications: vec![first_qualification],
            specialty_registration_no: None,
            specialty_name: None,
            speciality_qualification: None,
        }
    }

    pub fn has_specialty(&self) -> bool {
        self.specialty_registration_no.is_some() || self.specialty_name.is_some()
    }
}
