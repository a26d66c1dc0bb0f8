//! Regex scan for statement-style line items.
//!
//! Recognizes lines shaped like `<date> <description> <amount>` and is only
//! used as a secondary signal next to AI extraction.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;

static LINE_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        ^\s*
        (?P<date>
            \d{4}-\d{2}-\d{2}
          | \d{1,2}/\d{1,2}/\d{2,4}
          | \d{1,2}\s+(?:jan|feb|mar|apr|may|jun|jul|aug|sep|sept|oct|nov|dec)[a-z]*\.?(?:\s+\d{4})?
        )
        \s+
        (?P<description>.+?)
        \s+
        (?P<sign>-)?\s*
        (?P<currency>[$£€¥₹])?\s*
        (?P<amount>\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)
        \s*$",
    )
    .expect("valid regex")
});

#[derive(Debug, Clone, PartialEq)]
pub struct PatternLine {
    /// ISO date when the matched text could be normalized, the raw match otherwise.
    pub date: String,
    pub description: String,
    /// Negative for debits written with a leading minus.
    pub amount: f64,
    pub currency: Option<char>,
}

pub fn scan_line_items(text: &str) -> Vec<PatternLine> {
    text.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<PatternLine> {
    let caps = LINE_ITEM.captures(line)?;

    let raw_date = caps.name("date")?.as_str();
    let description = caps.name("description")?.as_str().trim().to_string();
    let mut amount: f64 = caps.name("amount")?.as_str().replace(',', "").parse().ok()?;
    if caps.name("sign").is_some() {
        amount = -amount;
    }

    Some(PatternLine {
        date: normalize_date(raw_date).unwrap_or_else(|| raw_date.to_string()),
        description,
        amount,
        currency: caps
            .name("currency")
            .and_then(|c| c.as_str().chars().next()),
    })
}

/// Converts ISO, US (`MM/DD/YYYY`, `MM/DD/YY`) and `DD Mon YYYY` dates to `YYYY-MM-DD`.
pub fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim().trim_end_matches('.');
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    // Two-digit years are tried first; `%Y` would read "24" as year 24.
    let formats = ["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%d %b %Y", "%d %B %Y"];

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&collapsed, fmt).ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
}
