//! In-memory tabular model consumed by the analysis pipeline.
//!
//! A [`Table`] is an ordered list of [`Row`]s over uniquely named columns.
//! Every cell is a typed [`Value`]. Tables are produced once by a loader
//! and treated as read-only afterwards; operations that reorder or retype
//! cells (see [`crate::schema::prepare`]) work on a clone.
//!
//! Each row remembers the position it had when the table was loaded
//! (`Row::index`). Sorting keeps that label, so it can still be shown in
//! the text rendering and used as a fallback period label in charts.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
    Date(NaiveDate),
    Null,
}

impl Value {
    /// Returns the numeric payload, treating `NaN` as missing.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// Human-readable label, or `None` for missing values.
    pub fn label(&self) -> Option<String> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(format_number(*n)),
            Value::Text(s) => Some(s.clone()),
            Value::Date(d) => Some(d.format("%Y-%m-%d").to_string()),
            _ => None,
        }
    }
}

/// Derived type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    /// Every non-null cell is a number (an all-null column counts as numeric).
    Numeric,
    /// Every non-null cell is a date, and at least one is present.
    Date,
    /// Anything else.
    Text,
}

/// A row together with its original position in the loaded table.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub index: usize,
    pub values: Vec<Value>,
}

#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    #[error("duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("row {row} has {found} cells, expected {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    /// Build a table, numbering rows from 0 in the given order.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Result<Self, TableError> {
        let mut seen = HashSet::new();
        for name in &columns {
            if !seen.insert(name.as_str()) {
                return Err(TableError::DuplicateColumn(name.clone()));
            }
        }

        let mut out = Vec::with_capacity(rows.len());
        for (index, values) in rows.into_iter().enumerate() {
            if values.len() != columns.len() {
                return Err(TableError::RowWidth {
                    row: index,
                    expected: columns.len(),
                    found: values.len(),
                });
            }
            out.push(Row { index, values });
        }

        Ok(Self { columns, rows: out })
    }

    /// A table with the given header and no rows.
    pub fn empty(columns: Vec<String>) -> Result<Self, TableError> {
        Self::new(columns, Vec::new())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn column_kind(&self, idx: usize) -> ColumnKind {
        let mut has_date = false;
        let mut all_numeric = true;
        let mut all_date = true;

        for row in &self.rows {
            match &row.values[idx] {
                v if v.is_null() => {}
                Value::Number(_) => all_date = false,
                Value::Date(_) => {
                    has_date = true;
                    all_numeric = false;
                }
                _ => {
                    all_numeric = false;
                    all_date = false;
                }
            }
        }

        if all_numeric {
            ColumnKind::Numeric
        } else if all_date && has_date {
            ColumnKind::Date
        } else {
            ColumnKind::Text
        }
    }

    /// `(name, kind)` pairs in column order.
    pub fn column_kinds(&self) -> Vec<(&str, ColumnKind)> {
        self.columns
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), self.column_kind(i)))
            .collect()
    }

    /// Names of all numeric columns, in column order.
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.column_kinds()
            .into_iter()
            .filter(|(_, kind)| *kind == ColumnKind::Numeric)
            .map(|(name, _)| name)
            .collect()
    }

    /// Non-missing numbers of a column in row order. Unknown columns yield nothing.
    pub fn numeric_values(&self, name: &str) -> Vec<f64> {
        match self.column_index(name) {
            Some(idx) => self
                .rows
                .iter()
                .filter_map(|r| r.values[idx].as_number())
                .collect(),
            None => Vec::new(),
        }
    }

    /// The last `n` rows (all rows when fewer).
    pub fn tail(&self, n: usize) -> &[Row] {
        let start = self.rows.len().saturating_sub(n);
        &self.rows[start..]
    }

    pub(crate) fn set_column(&mut self, idx: usize, values: Vec<Value>) {
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.values[idx] = value;
        }
    }

    pub(crate) fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    /// Render the table as aligned plain text.
    ///
    /// The layout mirrors the familiar dataframe console output: a left
    /// index column, right-aligned value columns separated by two spaces,
    /// `NaN` for missing values (`NaT` in date columns).
    pub fn render_text(&self) -> String {
        if self.rows.is_empty() || self.columns.is_empty() {
            let indices: Vec<String> = self.rows.iter().map(|r| r.index.to_string()).collect();
            return format!(
                "Empty DataFrame\nColumns: [{}]\nIndex: [{}]",
                self.columns.join(", "),
                indices.join(", ")
            );
        }

        let kinds: Vec<ColumnKind> = (0..self.columns.len())
            .map(|i| self.column_kind(i))
            .collect();

        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .map(|row| {
                row.values
                    .iter()
                    .zip(&kinds)
                    .map(|(v, kind)| {
                        v.label().unwrap_or_else(|| match kind {
                            ColumnKind::Date => "NaT".to_string(),
                            _ => "NaN".to_string(),
                        })
                    })
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, name)| {
                cells
                    .iter()
                    .map(|r| r[i].chars().count())
                    .chain(std::iter::once(name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let index_labels: Vec<String> = self.rows.iter().map(|r| r.index.to_string()).collect();
        let index_width = index_labels
            .iter()
            .map(|s| s.chars().count())
            .max()
            .unwrap_or(0);

        let mut lines = Vec::with_capacity(self.rows.len() + 1);

        let mut header = " ".repeat(index_width);
        for (name, w) in self.columns.iter().zip(&widths) {
            header.push_str(&format!("  {:>width$}", name, width = w));
        }
        lines.push(header);

        for (label, row) in index_labels.iter().zip(&cells) {
            let mut line = format!("{:<width$}", label, width = index_width);
            for (cell, w) in row.iter().zip(&widths) {
                line.push_str(&format!("  {:>width$}", cell, width = w));
            }
            lines.push(line);
        }

        lines.join("\n")
    }
}

/// Shortest readable form of a number: integral values print without a
/// fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{:.0}", n)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let err = Table::new(cols(&["a", "a"]), vec![]).unwrap_err();
        assert_eq!(err, TableError::DuplicateColumn("a".to_string()));
    }

    #[test]
    fn test_row_width_checked() {
        let err = Table::new(cols(&["a", "b"]), vec![vec![Value::Number(1.0)]]).unwrap_err();
        assert!(matches!(err, TableError::RowWidth { row: 0, expected: 2, found: 1 }));
    }

    #[test]
    fn test_column_kinds() {
        let t = Table::new(
            cols(&["Quarter", "Revenue", "When", "Blank"]),
            vec![
                vec![
                    Value::Text("Q1".into()),
                    Value::Number(1.0),
                    Value::Date(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                    Value::Null,
                ],
                vec![
                    Value::Text("Q2".into()),
                    Value::Null,
                    Value::Null,
                    Value::Null,
                ],
            ],
        )
        .unwrap();

        assert_eq!(t.column_kind(0), ColumnKind::Text);
        assert_eq!(t.column_kind(1), ColumnKind::Numeric);
        assert_eq!(t.column_kind(2), ColumnKind::Date);
        assert_eq!(t.column_kind(3), ColumnKind::Numeric);
        assert_eq!(t.numeric_columns(), vec!["Revenue", "Blank"]);
        assert_eq!(t.numeric_values("Revenue"), vec![1.0]);
    }

    #[test]
    fn test_render_aligned() {
        let t = Table::new(
            cols(&["Quarter", "Revenue"]),
            vec![
                vec![Value::Text("Q1".into()), Value::Number(100.0)],
                vec![Value::Text("Q2".into()), Value::Number(1250.5)],
            ],
        )
        .unwrap();

        let text = t.render_text();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "   Quarter  Revenue");
        assert_eq!(lines[1], "0       Q1      100");
        assert_eq!(lines[2], "1       Q2   1250.5");
    }

    #[test]
    fn test_render_empty() {
        let t = Table::empty(cols(&["Date", "Revenue"])).unwrap();
        assert_eq!(
            t.render_text(),
            "Empty DataFrame\nColumns: [Date, Revenue]\nIndex: []"
        );
    }

    #[test]
    fn test_tail() {
        let rows = (0..10).map(|i| vec![Value::Number(i as f64)]).collect();
        let t = Table::new(cols(&["x"]), rows).unwrap();
        assert_eq!(t.tail(3).len(), 3);
        assert_eq!(t.tail(3)[0].index, 7);
        assert_eq!(t.tail(50).len(), 10);
    }
}
