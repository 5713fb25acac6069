//! Number formatting shared by the summary chunk, prompts and reports.

/// Format with two decimals and `,` thousands separators: `1234567.891` → `1,234,567.89`.
pub fn thousands(value: f64) -> String {
    if !value.is_finite() {
        return format!("{}", value);
    }

    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Dollar amount: `-1500` → `-$1,500.00`.
pub fn currency(value: f64) -> String {
    let formatted = thousands(value);
    match formatted.strip_prefix('-') {
        Some(rest) => format!("-${}", rest),
        None => format!("${}", formatted),
    }
}
