//! Heuristic schema inference over uploaded tables.
//!
//! Column roles are chosen by ordered rule lists. Each [`ColumnRule`] is a
//! predicate over a column's `(name, kind)` pair; for a role, the rules
//! are tried in order and the first rule that matches any column selects
//! the first such column. Because rules only see `(name, kind)` pairs,
//! the policy can be tested without building a [`Table`].
//!
//! | Role | Rules |
//! |------|-------|
//! | period | name contains `date`, `period` or `quarter` |
//! | revenue | name contains `revenue`, `sales` or `income`; else first numeric column |
//! | expense | numeric column whose name contains `expense` or `cost` |
//!
//! [`prepare`] also parses the period column into dates and sorts a copy
//! of the table chronologically. Unparsable periods become
//! [`Value::Null`] and sort last, keeping their relative order.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::table::{ColumnKind, Table, Value};

pub const PERIOD_KEYWORDS: &[&str] = &["date", "period", "quarter"];
pub const REVENUE_KEYWORDS: &[&str] = &["revenue", "sales", "income"];
pub const EXPENSE_KEYWORDS: &[&str] = &["expense", "cost"];

/// A single column-selection predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRule {
    /// Lowercased column name contains any of the keywords.
    HasKeyword(&'static [&'static str]),
    /// Column is numeric.
    IsNumeric,
    /// Column is numeric and its lowercased name contains any of the keywords.
    HasKeywordNumeric(&'static [&'static str]),
}

impl ColumnRule {
    pub fn matches(&self, name: &str, kind: ColumnKind) -> bool {
        match self {
            ColumnRule::HasKeyword(keywords) => {
                let lower = name.to_lowercase();
                keywords.iter().any(|k| lower.contains(k))
            }
            ColumnRule::IsNumeric => kind == ColumnKind::Numeric,
            ColumnRule::HasKeywordNumeric(keywords) => {
                ColumnRule::IsNumeric.matches(name, kind)
                    && ColumnRule::HasKeyword(keywords).matches(name, kind)
            }
        }
    }
}

pub const PERIOD_RULES: &[ColumnRule] = &[ColumnRule::HasKeyword(PERIOD_KEYWORDS)];
pub const REVENUE_RULES: &[ColumnRule] = &[
    ColumnRule::HasKeyword(REVENUE_KEYWORDS),
    ColumnRule::IsNumeric,
];
pub const EXPENSE_RULES: &[ColumnRule] = &[ColumnRule::HasKeywordNumeric(EXPENSE_KEYWORDS)];

/// Evaluate `rules` in order against `columns`, skipping names in `exclude`.
pub fn select_column<'a>(
    columns: &[(&'a str, ColumnKind)],
    rules: &[ColumnRule],
    exclude: &[&str],
) -> Option<&'a str> {
    rules.iter().find_map(|rule| {
        columns
            .iter()
            .filter(|(name, _)| !exclude.contains(name))
            .find(|(name, kind)| rule.matches(name, *kind))
            .map(|(name, _)| *name)
    })
}

/// Column roles detected for one table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaHints {
    pub period_column: Option<String>,
    pub revenue_column: Option<String>,
    pub expense_column: Option<String>,
}

/// Infer column roles. Equivalent to `prepare(table).1`.
pub fn infer_schema(table: &Table) -> SchemaHints {
    prepare(table).1
}

/// Copy `table`, parse and sort its period column, and detect column roles.
///
/// The revenue and expense roles are chosen after period parsing, so a
/// period column never doubles as the numeric revenue fallback.
pub fn prepare(table: &Table) -> (Table, SchemaHints) {
    let mut prepared = table.clone();

    let period_column =
        select_column(&table.column_kinds(), PERIOD_RULES, &[]).map(str::to_string);

    if let Some(idx) = period_column
        .as_deref()
        .and_then(|name| prepared.column_index(name))
    {
        let parsed: Vec<Value> = prepared
            .rows()
            .iter()
            .map(|row| {
                parse_period(&row.values[idx])
                    .map(Value::Date)
                    .unwrap_or(Value::Null)
            })
            .collect();
        prepared.set_column(idx, parsed);
        prepared
            .rows_mut()
            .sort_by(|a, b| compare_periods(&a.values[idx], &b.values[idx]));
    }

    let kinds = prepared.column_kinds();
    let mut exclude: Vec<&str> = period_column.as_deref().into_iter().collect();
    let revenue_column = select_column(&kinds, REVENUE_RULES, &exclude).map(str::to_string);
    if let Some(revenue) = revenue_column.as_deref() {
        exclude.push(revenue);
    }
    let expense_column = select_column(&kinds, EXPENSE_RULES, &exclude).map(str::to_string);

    let hints = SchemaHints {
        period_column,
        revenue_column,
        expense_column,
    };

    if hints.revenue_column.is_none() {
        warn!(
            columns = table.columns().len(),
            "no revenue-like or numeric column found; metrics will be empty"
        );
    }
    debug!(?hints, "schema inferred");

    (prepared, hints)
}

/// Dates first in ascending order, missing values last.
fn compare_periods(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Date(_), _) => Ordering::Less,
        (_, Value::Date(_)) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Parse a period cell into a calendar date.
///
/// Quarter labels resolve to the first day of the quarter, `YYYY-MM` to
/// the first of the month and a bare year to January 1st.
pub fn parse_period(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Date(d) => Some(*d),
        Value::Text(s) => parse_period_text(s.trim()),
        Value::Number(n) if n.fract() == 0.0 && (1000.0..=9999.0).contains(n) => {
            NaiveDate::from_ymd_opt(*n as i32, 1, 1)
        }
        _ => None,
    }
}

fn parse_period_text(s: &str) -> Option<NaiveDate> {
    if s.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    parse_quarter(s)
        .or_else(|| parse_year_month(s))
        .or_else(|| parse_year(s))
}

/// `2023Q1`, `2023-Q1`, `Q1 2023`, `Q1-2023`.
fn parse_quarter(s: &str) -> Option<NaiveDate> {
    let compact: String = s
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | '/'))
        .collect::<String>()
        .to_ascii_uppercase();

    let (year, quarter) = match compact.split_once('Q')? {
        ("", rest) if rest.len() == 5 && rest.is_ascii() => (&rest[1..], &rest[..1]),
        pair => pair,
    };

    if year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = year.parse().ok()?;
    let quarter: u32 = quarter.parse().ok()?;
    if !(1..=4).contains(&quarter) {
        return None;
    }
    NaiveDate::from_ymd_opt(year, (quarter - 1) * 3 + 1, 1)
}

/// `2023-01` or `2023/01`.
fn parse_year_month(s: &str) -> Option<NaiveDate> {
    let (year, month) = s.split_once(|c| c == '-' || c == '/')?;
    if year.len() != 4 || month.is_empty() || month.len() > 2 {
        return None;
    }
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, 1)
}

fn parse_year(s: &str) -> Option<NaiveDate> {
    if s.len() == 4 && s.chars().all(|c| c.is_ascii_digit()) {
        NaiveDate::from_ymd_opt(s.parse().ok()?, 1, 1)
    } else {
        None
    }
}
