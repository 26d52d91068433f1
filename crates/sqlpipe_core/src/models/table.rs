//! Parsed table-description models.

use serde::{Deserialize, Serialize};

/// One column extracted from a table description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedColumn {
    /// Column name.
    pub name: String,
    /// Column type as reported by the driver (e.g. "INTEGER").
    pub col_type: String,
    /// Whether an index covers this column.
    pub is_indexed: bool,
    /// Whether a uniqueness constraint covers this column.
    pub is_unique: bool,
    /// Remaining constraint text (e.g. "NOT NULL DEFAULT 0").
    pub attributes: String,
}

/// Structured description of one table, derived purely from parsing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedTable {
    /// Table name.
    pub name: String,
    /// Columns in declaration order.
    pub columns: Vec<ParsedColumn>,
}

const HEADERS: [&str; 5] = ["NAME", "TYPE", "INDEX", "UNIQUE", "ATTRIBUTES"];

fn flag(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

impl ParsedTable {
    /// Create a description with no columns yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), columns: Vec::new() }
    }

    /// Render as a fixed-width text table.
    ///
    /// Column widths are the maximum cell length including the header
    /// label. Presentation only; consumers wanting structure use the
    /// fields directly.
    pub fn render(&self) -> String {
        let rows: Vec<[String; 5]> = self
            .columns
            .iter()
            .map(|c| {
                [
                    c.name.clone(),
                    c.col_type.clone(),
                    flag(c.is_indexed).to_string(),
                    flag(c.is_unique).to_string(),
                    c.attributes.clone(),
                ]
            })
            .collect();

        let mut widths = [0usize; 5];
        for (i, header) in HEADERS.iter().enumerate() {
            widths[i] = header.len();
        }
        for row in &rows {
            for (i, cell) in row.iter().enumerate() {
                widths[i] = widths[i].max(cell.len());
            }
        }

        let mut out = String::new();
        let header_cells: Vec<String> = HEADERS
            .iter()
            .enumerate()
            .map(|(i, h)| format!("{:<width$}", h, width = widths[i]))
            .collect();
        out.push_str(header_cells.join(" | ").trim_end());
        out.push('\n');
        for row in &rows {
            let cells: Vec<String> = row
                .iter()
                .enumerate()
                .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
                .collect();
            out.push_str(cells.join(" | ").trim_end());
            out.push('\n');
        }
        out
    }
}
