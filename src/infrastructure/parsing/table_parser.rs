//! Page parser - first table of a register page to a row stream
//!
//! Rows come out as trimmed `td` texts in document order, with header
//! boilerplate, spacer rows and everything from the footer onward removed.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use super::config::TableLayout;
use crate::infrastructure::parsing_error::MalformedPageError;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").expect("valid selector"));
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").expect("valid selector"));
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td").expect("valid selector"));

pub type Row = Vec<String>;

/// Extract the practitioner rows of a page
pub fn parse_rows(body: &str, layout: &TableLayout) -> Result<Vec<Row>, MalformedPageError> {
    if body.trim().is_empty() {
        return Err(MalformedPageError::EmptyBody);
    }

    let document = Html::parse_document(body);
    let table = document
        .select(&TABLE)
        .next()
        .ok_or(MalformedPageError::NoTable {
            body_len: body.len(),
        })?;

    let mut rows = Vec::new();
    for cells in table.select(&ROW).skip(layout.header_offset).map(row_cells) {
        if is_spacer(&cells) {
            continue;
        }
        if layout.is_footer(&cells[0]) {
            debug!("Footer reached: {:?}", cells[0]);
            break;
        }
        rows.push(cells);
    }

    debug!("Parsed {} rows (header offset {})", rows.len(), layout.header_offset);
    Ok(rows)
}

fn row_cells(row: ElementRef<'_>) -> Row {
    row.select(&CELL)
        .map(|cell| cell.text().collect::<String>().trim().to_string())
        .collect()
}

/// No cells at all, or a single empty cell
fn is_spacer(cells: &[String]) -> bool {
    match cells {
        [] => true,
        [only] => only.is_empty(),
        _ => false,
    }
}
