//! Parsing of captured driver output into structured rows.
//!
//! Everything here is best-effort by contract: a row or fragment that does
//! not match the expected shape is skipped, never fatal. Drivers disagree
//! about table rendering, so the parser only understands two shapes:
//! pipe-delimited cells with `-`/`+` rule lines, and SQLite's DDL dump for
//! table descriptions.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::models::connection::DriverKind;
use crate::models::table::{ParsedColumn, ParsedTable};

/// Default separator for delimiter-separated export.
pub const DEFAULT_EXPORT_SEPARATOR: &str = ";";

/// Turns raw captured text into rows and table descriptions.
pub struct ResultParser;

impl ResultParser {
    /// Split raw output into rows of trimmed cells.
    ///
    /// Rule lines (`-`/`+` only) are discarded. A line containing an
    /// unescaped `|` is split on it; other lines become single-cell rows,
    /// which accommodates SQLite's separator-free default output. There
    /// are no header semantics; treating row 0 as a header is the
    /// caller's job.
    pub fn parse_rows(raw: &str) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for line in raw.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || Self::is_rule_line(trimmed) {
                continue;
            }
            if Self::has_unescaped_pipe(line) {
                rows.push(Self::split_cells(line));
            } else {
                rows.push(vec![trimmed.to_string()]);
            }
        }
        rows
    }

    /// Flatten to a plain list when every row has exactly one cell.
    pub fn flatten_single_column(rows: &[Vec<String>]) -> Option<Vec<String>> {
        if rows.iter().all(|row| row.len() == 1) {
            Some(rows.iter().map(|row| row[0].clone()).collect())
        } else {
            None
        }
    }

    /// Parse a single logical column of names (table lists and the like).
    ///
    /// Uniform single-cell output is flattened; otherwise each row
    /// contributes its first cell.
    pub fn parse_string_list(raw: &str) -> Vec<String> {
        let rows = Self::parse_rows(raw);
        if let Some(flat) = Self::flatten_single_column(&rows) {
            return flat;
        }
        rows.into_iter()
            .filter_map(|row| row.into_iter().next())
            .filter(|cell| !cell.is_empty())
            .collect()
    }

    /// Parse a table description, choosing the strategy by driver.
    ///
    /// SQLite introspection returns the table's original `CREATE TABLE`
    /// DDL plus `CREATE INDEX` statements rather than a row-per-column
    /// result set, so it gets a dedicated path.
    pub fn parse_table_description(driver: DriverKind, table: &str, raw: &str) -> ParsedTable {
        match driver {
            DriverKind::Sqlite => Self::parse_sqlite_ddl(table, raw),
            _ => Self::parse_generic_description(table, raw),
        }
    }

    /// Re-join rows with a separator, each field double-quote wrapped.
    ///
    /// Same row-splitting logic as [`ResultParser::parse_rows`]; rule
    /// lines are stripped, embedded quotes are doubled.
    pub fn to_delimited(raw: &str, separator: &str) -> String {
        let mut out = String::new();
        for row in Self::parse_rows(raw) {
            let line: Vec<String> = row
                .iter()
                .map(|cell| format!("\"{}\"", cell.replace('"', "\"\"")))
                .collect();
            out.push_str(&line.join(separator));
            out.push('\n');
        }
        out
    }

    /// A visual separator emitted by CLI table renderers.
    fn is_rule_line(line: &str) -> bool {
        !line.is_empty() && line.chars().all(|c| c == '-' || c == '+')
    }

    fn has_unescaped_pipe(line: &str) -> bool {
        let mut escaped = false;
        for c in line.chars() {
            match c {
                '\\' if !escaped => escaped = true,
                '|' if !escaped => return true,
                _ => escaped = false,
            }
        }
        false
    }

    /// Split on unescaped `|`, trim cells, and drop the empty boundary
    /// cells produced by leading/trailing pipes.
    fn split_cells(line: &str) -> Vec<String> {
        let mut cells = Vec::new();
        let mut current = String::new();
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    } else {
                        current.push('\\');
                    }
                }
                '|' => {
                    cells.push(current.trim().to_string());
                    current = String::new();
                }
                _ => current.push(c),
            }
        }
        cells.push(current.trim().to_string());

        if cells.first().is_some_and(|c| c.is_empty()) {
            cells.remove(0);
        }
        if cells.len() > 1 && cells.last().is_some_and(|c| c.is_empty()) {
            cells.pop();
        }
        cells
    }

    /// Generic strategy: first cell is the name, second the type, the
    /// rest joins into attributes. Index/unique flags are unknowable from
    /// tabular output alone.
    fn parse_generic_description(table: &str, raw: &str) -> ParsedTable {
        let mut parsed = ParsedTable::new(table);
        for row in Self::parse_rows(raw) {
            let Some(name) = row.first().filter(|n| !n.is_empty()).cloned() else {
                continue;
            };
            parsed.columns.push(ParsedColumn {
                name,
                col_type: row.get(1).cloned().unwrap_or_default(),
                is_indexed: false,
                is_unique: false,
                attributes: row.iter().skip(2).cloned().collect::<Vec<_>>().join(" "),
            });
        }
        parsed
    }

    /// SQLite strategy over the `CREATE TABLE` / `CREATE INDEX` dump.
    fn parse_sqlite_ddl(table: &str, raw: &str) -> ParsedTable {
        let mut parsed = ParsedTable::new(table);

        // Statement/remainder split at the DDL terminator; the CREATE
        // TABLE body may span multiple lines.
        let (ddl, remainder) = raw.split_once(");").unwrap_or((raw, ""));

        let indexed = Self::indexed_columns(remainder);

        let body = match ddl.find('(') {
            Some(open) => &ddl[open + 1..],
            None => ddl,
        };
        let mut body = body.replace('"', "");

        // A trailing UNIQUE (...) clause is a constraint, not a column
        // definition; lift its columns out before splitting.
        let mut unique: HashSet<String> = HashSet::new();
        let mut clause_start = None;
        if let Some(pos) = body.rfind("UNIQUE") {
            let clause = body[pos..].trim_end();
            if let (Some(open), Some(close)) = (clause.find('('), clause.rfind(')')) {
                if open < close && clause[close + 1..].trim().is_empty() {
                    for column in clause[open + 1..close].split(',') {
                        unique.insert(column.trim().to_string());
                    }
                    clause_start = Some(pos);
                }
            }
        }
        if let Some(pos) = clause_start {
            body.truncate(pos);
            body = body.trim_end().trim_end_matches(',').to_string();
        }

        for fragment in Self::split_top_level_commas(&body) {
            let mut parts = fragment.split_whitespace();
            let Some(name) = parts.next() else {
                continue;
            };
            let col_type = parts.next().unwrap_or_default().to_string();
            let attributes = parts.collect::<Vec<_>>().join(" ");
            parsed.columns.push(ParsedColumn {
                is_indexed: indexed.contains(name),
                is_unique: unique.contains(name),
                name: name.to_string(),
                col_type,
                attributes,
            });
        }
        parsed
    }

    /// Collect column names covered by `CREATE INDEX "i" ON "t" ("col")`
    /// statements.
    fn indexed_columns(remainder: &str) -> HashSet<String> {
        static INDEX_RE: OnceLock<Option<Regex>> = OnceLock::new();
        let re = INDEX_RE.get_or_init(|| {
            Regex::new(r#"CREATE INDEX\s+"[^"]+"\s+ON\s+"[^"]+"\s+\(\s*"([^"]+)"\s*\)"#).ok()
        });

        let mut indexed = HashSet::new();
        if let Some(re) = re {
            for line in remainder.lines() {
                if let Some(captures) = re.captures(line) {
                    if let Some(column) = captures.get(1) {
                        indexed.insert(column.as_str().to_string());
                    }
                }
            }
        }
        indexed
    }

    /// Split on commas outside parentheses so types like `DECIMAL(10,2)`
    /// survive.
    fn split_top_level_commas(text: &str) -> Vec<&str> {
        let mut fragments = Vec::new();
        let mut depth = 0usize;
        let mut start = 0usize;
        for (i, c) in text.char_indices() {
            match c {
                '(' => depth += 1,
                ')' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    fragments.push(&text[start..i]);
                    start = i + 1;
                }
                _ => {}
            }
        }
        fragments.push(&text[start..]);
        fragments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipe_table_round_trip() {
        let raw = "+----+----+\n| a | b |\n+----+----+\n| 1 | 2 |\n+----+----+\n";
        let rows = ResultParser::parse_rows(raw);
        assert_eq!(rows, vec![vec!["a", "b"], vec!["1", "2"]]);
    }

    #[test]
    fn test_single_column_flattening() {
        let rows = vec![vec!["users".to_string()], vec!["orders".to_string()]];
        assert_eq!(
            ResultParser::flatten_single_column(&rows),
            Some(vec!["users".to_string(), "orders".to_string()])
        );
        assert_eq!(ResultParser::parse_string_list("users\norders\n"), ["users", "orders"]);
    }

    #[test]
    fn test_mixed_width_rows_do_not_flatten() {
        let rows = vec![vec!["a".to_string(), "b".to_string()], vec!["c".to_string()]];
        assert_eq!(ResultParser::flatten_single_column(&rows), None);
    }

    #[test]
    fn test_string_list_takes_first_cell_of_wide_rows() {
        let raw = "| users | table |\n| orders | table |\n";
        assert_eq!(ResultParser::parse_string_list(raw), ["users", "orders"]);
    }

    #[test]
    fn test_rule_lines_discarded() {
        assert!(ResultParser::parse_rows("----\n+--+\n---+---\n").is_empty());
        // A line with other characters is data, not a rule.
        assert_eq!(ResultParser::parse_rows("-x-\n").len(), 1);
    }

    #[test]
    fn test_escaped_pipe_stays_in_cell() {
        let rows = ResultParser::parse_rows("| a\\|b | c |\n");
        assert_eq!(rows, vec![vec!["a|b", "c"]]);
    }

    #[test]
    fn test_line_without_pipes_keeps_backslashes() {
        let rows = ResultParser::parse_rows("C:\\temp\\db\n");
        assert_eq!(rows, vec![vec!["C:\\temp\\db"]]);
    }

    #[test]
    fn test_sqlite_ddl_parse() {
        let raw = "CREATE TABLE \"t\" (\n\"id\" INTEGER NOT NULL, \"name\" TEXT, UNIQUE (\"name\")\n);\nCREATE INDEX \"idx_id\" ON \"t\" (\"id\");\n";
        let table = ResultParser::parse_table_description(DriverKind::Sqlite, "t", raw);
        assert_eq!(table.name, "t");
        assert_eq!(table.columns.len(), 2);

        let id = &table.columns[0];
        assert_eq!(id.name, "id");
        assert_eq!(id.col_type, "INTEGER");
        assert_eq!(id.attributes, "NOT NULL");
        assert!(id.is_indexed);
        assert!(!id.is_unique);

        let name = &table.columns[1];
        assert_eq!(name.name, "name");
        assert_eq!(name.col_type, "TEXT");
        assert_eq!(name.attributes, "");
        assert!(!name.is_indexed);
        assert!(name.is_unique);
    }

    #[test]
    fn test_sqlite_single_line_ddl() {
        let raw = "CREATE TABLE \"jobs\" (\"id\" INTEGER, \"payload\" TEXT DEFAULT 'x');\n";
        let table = ResultParser::parse_table_description(DriverKind::Sqlite, "jobs", raw);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[1].name, "payload");
        assert_eq!(table.columns[1].attributes, "DEFAULT 'x'");
    }

    #[test]
    fn test_sqlite_parenthesized_type_survives_comma_split() {
        let raw = "CREATE TABLE \"m\" (\"price\" DECIMAL(10,2) NOT NULL, \"note\" TEXT);\n";
        let table = ResultParser::parse_table_description(DriverKind::Sqlite, "m", raw);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0].col_type, "DECIMAL(10,2)");
    }

    #[test]
    fn test_sqlite_malformed_input_degrades() {
        let table =
            ResultParser::parse_table_description(DriverKind::Sqlite, "broken", "not ddl at all");
        // Best-effort: no panic, whatever fragments exist become columns.
        assert_eq!(table.name, "broken");
    }

    #[test]
    fn test_generic_description_from_pipe_rows() {
        let raw = "+----+------+\n| id | int |\n| name | text |\n+----+------+\n";
        let table = ResultParser::parse_table_description(DriverKind::Mysql, "users", raw);
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.columns[0].name, "id");
        assert_eq!(table.columns[0].col_type, "int");
        assert!(!table.columns[0].is_indexed);
    }

    #[test]
    fn test_export_quotes_and_joins() {
        let raw = "+----+----+\n| a | b |\n| say \"hi\" | 2 |\n";
        let exported = ResultParser::to_delimited(raw, DEFAULT_EXPORT_SEPARATOR);
        assert_eq!(exported, "\"a\";\"b\"\n\"say \"\"hi\"\"\";\"2\"\n");
    }

    #[test]
    fn test_export_custom_separator() {
        let exported = ResultParser::to_delimited("| 1 | 2 |\n", ",");
        assert_eq!(exported, "\"1\",\"2\"\n");
    }
}
