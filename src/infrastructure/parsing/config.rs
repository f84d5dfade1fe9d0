//! Parsing configuration for register tables
//!
//! Centralized row offsets, footer markers, column positions and labels.
//! The register's HTML carries no semantic markup, so everything the parser
//! knows about a page layout lives here.

use serde::{Deserialize, Serialize};

use crate::infrastructure::config::register;

/// Main parsing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingConfig {
    /// Regex a record-start row's first cell must match
    pub registration_pattern: String,

    /// Overview listing table layout
    pub overview_layout: TableLayout,

    /// Detail page table layout
    pub detail_layout: TableLayout,

    /// Column positions in overview rows
    pub overview_columns: OverviewColumns,

    /// Row labels on detail pages
    pub detail_labels: DetailLabels,
}

impl Default for ParsingConfig {
    fn default() -> Self {
        Self {
            registration_pattern: register::REGISTRATION_NO_PATTERN.to_string(),
            overview_layout: TableLayout::overview(),
            detail_layout: TableLayout::detail(),
            overview_columns: OverviewColumns::default(),
            detail_labels: DetailLabels::default(),
        }
    }
}

/// Where practitioner rows start and stop inside the first table of a page.
///
/// The default layout reads the whole table: no header rows, no footer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableLayout {
    /// Number of leading boilerplate rows
    pub header_offset: usize,

    /// A row whose first cell starts with one of these ends the table.
    /// Leading `«` and whitespace are ignored when matching.
    pub footer_prefixes: Vec<String>,
}

impl TableLayout {
    pub fn overview() -> Self {
        Self {
            header_offset: register::OVERVIEW_HEADER_ROWS,
            footer_prefixes: vec![register::PAGINATION_FOOTER.to_string()],
        }
    }

    pub fn detail() -> Self {
        Self {
            header_offset: 0,
            footer_prefixes: vec![register::DISCLAIMER_PREFIX.to_string()],
        }
    }

    pub fn is_footer(&self, first_cell: &str) -> bool {
        let cell = first_cell.trim_start_matches(|c: char| c == '«' || c.is_whitespace());
        self.footer_prefixes
            .iter()
            .any(|prefix| cell.starts_with(prefix.as_str()))
    }
}

/// Fixed cell positions inside overview rows
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewColumns {
    pub registration_no: usize,
    pub name: usize,
    pub address: usize,
    pub nature: usize,
    pub year: usize,

    /// Positions used by continuation rows
    pub continuation_nature: usize,
    pub continuation_year: usize,
}

impl Default for OverviewColumns {
    fn default() -> Self {
        Self {
            registration_no: 0,
            name: 1,
            address: 4,
            nature: 5,
            year: 7,
            continuation_nature: 0,
            continuation_year: 2,
        }
    }
}

/// Row labels (first cell) on detail pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetailLabels {
    pub name: String,
    pub address: String,
    pub registration_no: String,
    pub qualification: String,
    pub specialty: String,

    /// Rows starting with this text end the record
    pub disclaimer_prefix: String,

    /// Address value meaning "no address on file"
    pub empty_address: String,
}

impl Default for DetailLabels {
    fn default() -> Self {
        Self {
            name: "姓名Name".to_string(),
            address: "註冊地址Registered Address*".to_string(),
            registration_no: "註冊編號Registration No.".to_string(),
            qualification: "資格性質及年份Nature of Qualification and Year".to_string(),
            specialty: "專科Specialty".to_string(),
            disclaimer_prefix: register::DISCLAIMER_PREFIX.to_string(),
            empty_address: "-".to_string(),
        }
    }
}
