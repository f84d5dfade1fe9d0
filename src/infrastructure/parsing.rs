//! Register page parsing
//!
//! Two steps per page: `table_parser` turns HTML into a row stream, then a
//! reconstructor folds the rows into practitioner records. The first step
//! can fail with `MalformedPageError`, the second with `StructuralError`.

pub mod config;
pub mod detail_reconstructor;
pub mod overview_reconstructor;
pub mod record_start;
pub mod table_parser;

pub use config::{DetailLabels, OverviewColumns, ParsingConfig, TableLayout};
pub use detail_reconstructor::DetailReconstructor;
pub use overview_reconstructor::OverviewReconstructor;
pub use record_start::RecordStart;
pub use table_parser::{parse_rows, Row};

use crate::domain::Practitioner;
use crate::infrastructure::parsing_error::{MalformedPageError, ReconstructResult};

/// Row folding strategy for one page type
#[derive(Debug, Clone)]
pub enum RecordReconstructor {
    Overview(OverviewReconstructor),
    Detail(DetailReconstructor),
}

impl RecordReconstructor {
    pub fn reconstruct(&self, rows: &[Row]) -> ReconstructResult<Vec<Practitioner>> {
        match self {
            Self::Overview(inner) => inner.reconstruct(rows),
            Self::Detail(inner) => inner.reconstruct(rows),
        }
    }
}

/// Table layout and reconstructor for one page type
#[derive(Debug, Clone)]
pub struct PageParser {
    layout: TableLayout,
    reconstructor: RecordReconstructor,
}

impl PageParser {
    pub fn new(layout: TableLayout, reconstructor: RecordReconstructor) -> Self {
        Self {
            layout,
            reconstructor,
        }
    }

    pub fn overview(config: &ParsingConfig) -> Result<Self, regex::Error> {
        let record_start = RecordStart::from_pattern(&config.registration_pattern)?;
        Ok(Self::new(
            config.overview_layout.clone(),
            RecordReconstructor::Overview(OverviewReconstructor::new(
                record_start,
                config.overview_columns.clone(),
            )),
        ))
    }

    pub fn detail(config: &ParsingConfig) -> Self {
        Self::new(
            config.detail_layout.clone(),
            RecordReconstructor::Detail(DetailReconstructor::new(&config.detail_labels)),
        )
    }

    pub fn rows(&self, body: &str) -> Result<Vec<Row>, MalformedPageError> {
        parse_rows(body, &self.layout)
    }

    pub fn reconstruct(&self, rows: &[Row]) -> ReconstructResult<Vec<Practitioner>> {
        self.reconstructor.reconstruct(rows)
    }
}
