//! Financial metrics engine.
//!
//! Computes period-over-period change metrics, a KPI set and a bounded
//! chart projection from a prepared [`Table`] and its [`SchemaHints`].
//! Every function here is total: missing columns or values produce the
//! documented zero/empty results instead of errors.
//!
//! Revenue values are the non-missing numeric cells of the revenue
//! column in chronological row order. Missing cells are dropped, never
//! zero-filled.
//!
//! # Change metrics
//!
//! The series is treated as quarterly.
//!
//! | Values | QoQ | YoY |
//! |--------|-----|-----|
//! | 0–1 | `0.0` | `0.0` |
//! | 2–3 | last vs previous | last vs first |
//! | 4–7 | last vs previous | see [`YoyPolicy`] |
//! | ≥ 8 | last vs previous | sum of last 4 vs sum of the 4 before |
//!
//! A zero base always yields `0.0`.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use tracing::info;

use crate::schema::{prepare, SchemaHints};
use crate::table::Table;

pub const QUARTERS_PER_YEAR: usize = 4;
pub const DEFAULT_CHART_WINDOW: usize = 8;
pub const MAX_CHART_SERIES: usize = 4;

/// How YoY is computed when only 4–7 quarterly values exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YoyPolicy {
    /// Compare the trailing four-quarter sum with itself. Always `0.0`;
    /// kept for output compatibility with earlier reports.
    Legacy,
    /// Compare the latest quarter with the same quarter one year earlier,
    /// or with the first quarter when only four values exist.
    #[default]
    SameQuarter,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricsOptions {
    pub yoy_policy: YoyPolicy,
    /// Number of trailing rows projected into the chart.
    pub chart_window: usize,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            yoy_policy: YoyPolicy::default(),
            chart_window: DEFAULT_CHART_WINDOW,
        }
    }
}

/// Percentage change from `previous` to `current`; `0.0` for a zero base.
pub fn pct_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous * 100.0
}

pub fn qoq_change(values: &[f64]) -> f64 {
    match values {
        [.., previous, last] => pct_change(*last, *previous),
        _ => 0.0,
    }
}

pub fn yoy_change(values: &[f64], policy: YoyPolicy) -> f64 {
    let n = values.len();
    let q = QUARTERS_PER_YEAR;

    let (recent, previous) = match n {
        0 | 1 => return 0.0,
        2 | 3 => (values[n - 1], values[0]),
        _ if n >= 2 * q => (
            values[n - q..].iter().sum::<f64>(),
            values[n - 2 * q..n - q].iter().sum::<f64>(),
        ),
        _ => match policy {
            YoyPolicy::Legacy => {
                let trailing: f64 = values[n - q..].iter().sum();
                (trailing, trailing)
            }
            YoyPolicy::SameQuarter if n > q => (values[n - 1], values[n - 1 - q]),
            YoyPolicy::SameQuarter => (values[n - 1], values[0]),
        },
    };

    pct_change(recent, previous)
}

/// Mean of consecutive percentage changes. Pairs with a zero base are skipped.
pub fn growth_rate(values: &[f64]) -> f64 {
    let changes: Vec<f64> = values
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| pct_change(w[1], w[0]))
        .collect();

    if changes.is_empty() {
        return 0.0;
    }
    changes.iter().sum::<f64>() / changes.len() as f64
}

/// Sample standard deviation (`n - 1` denominator); `0.0` below two values.
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Key performance indicators. Only computed fields are serialized, so a
/// table without revenue data serializes as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Kpis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_revenue: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_growth_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue_volatility: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_expenses: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub net_income: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit_margin: Option<f64>,
}

impl Kpis {
    pub fn is_empty(&self) -> bool {
        *self == Kpis::default()
    }

    pub fn has_expenses(&self) -> bool {
        self.total_expenses.is_some()
    }
}

/// Sum of `values`; `0.0` (never `-0.0`) when empty.
fn sum_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum()
    }
}

pub fn compute_kpis(table: &Table, hints: &SchemaHints) -> Kpis {
    let Some(revenue) = hints.revenue_column.as_deref() else {
        return Kpis::default();
    };
    let revenues = table.numeric_values(revenue);
    if revenues.is_empty() {
        return Kpis::default();
    }

    let total: f64 = revenues.iter().sum();
    let mut kpis = Kpis {
        total_revenue: Some(total),
        average_revenue: Some(total / revenues.len() as f64),
        revenue_growth_rate: Some(growth_rate(&revenues)),
        revenue_volatility: Some(sample_std(&revenues)),
        ..Kpis::default()
    };

    if let Some(expense) = hints.expense_column.as_deref() {
        let total_expenses = sum_or_zero(&table.numeric_values(expense));
        let net_income = total - total_expenses;
        kpis.total_expenses = Some(total_expenses);
        kpis.net_income = Some(net_income);
        kpis.profit_margin = Some(if total != 0.0 {
            net_income / total * 100.0
        } else {
            0.0
        });
    }

    kpis
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
}

/// One chart point: a period label plus one value per series column.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartPoint {
    pub period: String,
    pub values: Vec<(String, f64)>,
}

impl Serialize for ChartPoint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 1))?;
        map.serialize_entry("period", &self.period)?;
        for (column, value) in &self.values {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    #[serde(rename = "type")]
    pub kind: ChartKind,
    pub data: Vec<ChartPoint>,
    pub series: Vec<String>,
}

impl ChartSeries {
    /// Placeholder chart used when there is nothing to plot.
    pub fn empty() -> Self {
        Self {
            kind: ChartKind::Bar,
            data: Vec::new(),
            series: Vec::new(),
        }
    }
}

/// Project the last `window` rows onto the revenue column plus up to three
/// further numeric columns. Missing cells plot as `0.0`.
pub fn chart_series(table: &Table, hints: &SchemaHints, window: usize) -> ChartSeries {
    let revenue = match hints.revenue_column.as_deref() {
        Some(r) if !table.is_empty() => r,
        _ => return ChartSeries::empty(),
    };
    let period = hints.period_column.as_deref();

    let mut series = vec![revenue.to_string()];
    for name in table.numeric_columns() {
        if series.len() >= MAX_CHART_SERIES {
            break;
        }
        if name != revenue && Some(name) != period {
            series.push(name.to_string());
        }
    }

    let columns: Vec<(String, usize)> = series
        .iter()
        .filter_map(|name| table.column_index(name).map(|idx| (name.clone(), idx)))
        .collect();
    let period_idx = period.and_then(|p| table.column_index(p));

    let data = table
        .tail(window)
        .iter()
        .map(|row| ChartPoint {
            period: period_idx
                .and_then(|i| row.values[i].label())
                .unwrap_or_else(|| row.index.to_string()),
            values: columns
                .iter()
                .map(|(name, idx)| (name.clone(), row.values[*idx].as_number().unwrap_or(0.0)))
                .collect(),
        })
        .collect();

    ChartSeries {
        kind: ChartKind::Line,
        data,
        series,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsResult {
    pub yoy_change: f64,
    pub qoq_change: f64,
    pub kpis: Kpis,
    pub chart: ChartSeries,
}

impl MetricsResult {
    pub fn total_revenue(&self) -> f64 {
        self.kpis.total_revenue.unwrap_or(0.0)
    }

    pub fn average_revenue(&self) -> f64 {
        self.kpis.average_revenue.unwrap_or(0.0)
    }

    pub fn revenue_growth_rate(&self) -> f64 {
        self.kpis.revenue_growth_rate.unwrap_or(0.0)
    }

    pub fn revenue_volatility(&self) -> f64 {
        self.kpis.revenue_volatility.unwrap_or(0.0)
    }
}

/// Compute all metrics for an already prepared table.
pub fn compute_metrics(table: &Table, hints: &SchemaHints, opts: &MetricsOptions) -> MetricsResult {
    let revenues = hints
        .revenue_column
        .as_deref()
        .map(|r| table.numeric_values(r))
        .unwrap_or_default();

    MetricsResult {
        yoy_change: yoy_change(&revenues, opts.yoy_policy),
        qoq_change: qoq_change(&revenues),
        kpis: compute_kpis(table, hints),
        chart: chart_series(table, hints, opts.chart_window),
    }
}

/// A prepared table together with its schema hints and metrics.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub table: Table,
    pub hints: SchemaHints,
    pub metrics: MetricsResult,
}

/// Prepare `table` (period parsing and sorting on a copy) and compute metrics.
pub fn analyze(table: &Table, opts: &MetricsOptions) -> Analysis {
    let (prepared, hints) = prepare(table);
    let metrics = compute_metrics(&prepared, &hints, opts);

    info!(
        rows = prepared.len(),
        revenue_column = hints.revenue_column.as_deref().unwrap_or("-"),
        yoy = metrics.yoy_change,
        qoq = metrics.qoq_change,
        "metrics computed"
    );

    Analysis {
        table: prepared,
        hints,
        metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    const QUARTERS: [f64; 8] = [100.0, 110.0, 120.0, 90.0, 130.0, 140.0, 150.0, 160.0];

    fn revenue_table(values: &[f64]) -> Table {
        Table::new(
            vec!["Revenue".to_string()],
            values.iter().map(|v| vec![Value::Number(*v)]).collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_eight_quarters() {
        let yoy = yoy_change(&QUARTERS, YoyPolicy::SameQuarter);
        // (580 - 420) / 420
        assert!((yoy - 38.095238).abs() < 1e-4, "yoy = {}", yoy);
        let qoq = qoq_change(&QUARTERS);
        assert!((qoq - 6.666667).abs() < 1e-4, "qoq = {}", qoq);
    }

    #[test]
    fn test_fewer_than_two_values() {
        for values in [&[][..], &[42.0][..]] {
            assert_eq!(qoq_change(values), 0.0);
            assert_eq!(yoy_change(values, YoyPolicy::Legacy), 0.0);
            assert_eq!(yoy_change(values, YoyPolicy::SameQuarter), 0.0);
        }
    }

    #[test]
    fn test_zero_base() {
        assert_eq!(qoq_change(&[10.0, 0.0, 5.0]), 0.0);
        assert_eq!(yoy_change(&[0.0, 5.0], YoyPolicy::SameQuarter), 0.0);
        assert_eq!(
            yoy_change(&[0.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 4.0], YoyPolicy::SameQuarter),
            0.0
        );
    }

    #[test]
    fn test_short_series_compares_last_to_first() {
        assert!((yoy_change(&[100.0, 80.0, 125.0], YoyPolicy::Legacy) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_mid_length_policies() {
        let values = [100.0, 110.0, 120.0, 90.0, 150.0];
        assert_eq!(yoy_change(&values, YoyPolicy::Legacy), 0.0);
        // 150 vs 100, four quarters earlier
        assert!((yoy_change(&values, YoyPolicy::SameQuarter) - 50.0).abs() < 1e-9);
        // exactly four: 90 vs 100
        assert!((yoy_change(&values[..4], YoyPolicy::SameQuarter) + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_growth_and_volatility() {
        assert!((growth_rate(&[100.0, 110.0, 121.0]) - 10.0).abs() < 1e-9);
        assert_eq!(growth_rate(&[0.0, 0.0]), 0.0);
        assert_eq!(growth_rate(&[5.0]), 0.0);
        assert!((sample_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.13809).abs() < 1e-4);
        assert_eq!(sample_std(&[3.0]), 0.0);
    }

    #[test]
    fn test_missing_values_are_dropped() {
        let t = Table::new(
            vec!["Revenue".to_string()],
            vec![
                vec![Value::Number(100.0)],
                vec![Value::Null],
                vec![Value::Number(150.0)],
                vec![Value::Number(f64::NAN)],
            ],
        )
        .unwrap();
        let analysis = analyze(&t, &MetricsOptions::default());
        assert!((analysis.metrics.qoq_change - 50.0).abs() < 1e-9);
        assert_eq!(analysis.metrics.kpis.total_revenue, Some(250.0));
        assert_eq!(analysis.metrics.kpis.average_revenue, Some(125.0));
    }

    #[test]
    fn test_expense_kpis() {
        let t = Table::new(
            vec!["Revenue".to_string(), "Expenses".to_string()],
            vec![
                vec![Value::Number(100.0), Value::Number(60.0)],
                vec![Value::Number(100.0), Value::Null],
                vec![Value::Number(200.0), Value::Number(90.0)],
            ],
        )
        .unwrap();
        let kpis = analyze(&t, &MetricsOptions::default()).metrics.kpis;
        assert_eq!(kpis.total_expenses, Some(150.0));
        assert_eq!(kpis.net_income, Some(250.0));
        assert_eq!(kpis.profit_margin, Some(62.5));
    }

    #[test]
    fn test_text_cost_column_is_not_expenses() {
        let t = Table::new(
            vec![
                "Cost Center".to_string(),
                "Revenue".to_string(),
                "Operating Expenses".to_string(),
            ],
            vec![
                vec![Value::Text("CC-1".to_string()), Value::Number(100.0), Value::Number(40.0)],
                vec![Value::Text("CC-2".to_string()), Value::Number(200.0), Value::Number(80.0)],
            ],
        )
        .unwrap();
        let analysis = analyze(&t, &MetricsOptions::default());
        assert_eq!(
            analysis.hints.expense_column.as_deref(),
            Some("Operating Expenses")
        );
        let kpis = analysis.metrics.kpis;
        assert_eq!(kpis.total_expenses, Some(120.0));
        assert_eq!(kpis.net_income, Some(180.0));
        assert_eq!(kpis.profit_margin, Some(60.0));
    }

    #[test]
    fn test_empty_expense_column_totals_positive_zero() {
        let t = Table::new(
            vec!["Revenue".to_string(), "Expenses".to_string()],
            vec![
                vec![Value::Number(100.0), Value::Null],
                vec![Value::Number(50.0), Value::Null],
            ],
        )
        .unwrap();
        let kpis = analyze(&t, &MetricsOptions::default()).metrics.kpis;
        let total = kpis.total_expenses.unwrap();
        assert_eq!(total, 0.0);
        assert!(total.is_sign_positive());
        let json = serde_json::to_string(&kpis).unwrap();
        assert!(json.contains("\"total_expenses\":0.0"), "{}", json);
    }

    #[test]
    fn test_zero_revenue_margin() {
        let t = Table::new(
            vec!["Sales".to_string(), "Cost".to_string()],
            vec![vec![Value::Number(0.0), Value::Number(10.0)]],
        )
        .unwrap();
        let kpis = analyze(&t, &MetricsOptions::default()).metrics.kpis;
        assert_eq!(kpis.profit_margin, Some(0.0));
        assert_eq!(kpis.net_income, Some(-10.0));
    }

    #[test]
    fn test_empty_table() {
        let t = Table::empty(vec!["Revenue".to_string()]).unwrap();
        let m = analyze(&t, &MetricsOptions::default()).metrics;
        assert_eq!(m.yoy_change, 0.0);
        assert_eq!(m.qoq_change, 0.0);
        assert!(m.kpis.is_empty());
        assert_eq!(m.chart, ChartSeries::empty());
        assert_eq!(serde_json::to_string(&m.kpis).unwrap(), "{}");
        assert_eq!(
            serde_json::to_string(&m.chart).unwrap(),
            r#"{"type":"bar","data":[],"series":[]}"#
        );
    }

    #[test]
    fn test_chart_window_and_series() {
        let rows = (1..=10)
            .map(|i| {
                vec![
                    Value::Text(format!("2023-{:02}-01", i)),
                    Value::Number(1.0),
                    Value::Number(i as f64 * 10.0),
                    Value::Number(2.0),
                    Value::Number(3.0),
                    Value::Number(4.0),
                ]
            })
            .collect();
        let t = Table::new(
            ["Date", "A", "Revenue", "B", "C", "D"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows,
        )
        .unwrap();

        let chart = analyze(&t, &MetricsOptions::default()).metrics.chart;
        assert_eq!(chart.kind, ChartKind::Line);
        assert_eq!(chart.series, vec!["Revenue", "A", "B", "C"]);
        assert_eq!(chart.data.len(), 8);
        assert_eq!(chart.data[0].period, "2023-03-01");
        assert_eq!(chart.data[7].values[0], ("Revenue".to_string(), 100.0));

        let json = serde_json::to_string(&chart.data[7]).unwrap();
        assert_eq!(
            json,
            r#"{"period":"2023-10-01","Revenue":100.0,"A":1.0,"B":2.0,"C":3.0}"#
        );
    }

    #[test]
    fn test_chart_uses_row_index_without_period() {
        let t = revenue_table(&[5.0, 6.0]);
        let chart = analyze(&t, &MetricsOptions::default()).metrics.chart;
        let labels: Vec<&str> = chart.data.iter().map(|p| p.period.as_str()).collect();
        assert_eq!(labels, vec!["0", "1"]);
    }

    #[test]
    fn test_units_fallback_metrics() {
        let t = Table::new(
            vec!["Units".to_string()],
            vec![vec![Value::Number(10.0)], vec![Value::Number(12.0)]],
        )
        .unwrap();
        let analysis = analyze(&t, &MetricsOptions::default());
        assert_eq!(analysis.hints.revenue_column.as_deref(), Some("Units"));
        assert!((analysis.metrics.qoq_change - 20.0).abs() < 1e-9);
        assert_eq!(analysis.metrics.total_revenue(), 22.0);
    }
}
