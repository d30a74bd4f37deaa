//! FILENAME: subtotal-engine/src/partition.rs
//! Bucketing of numeric and date columns for grouping.
//!
//! A partition is an ascending list of thresholds. A value's bucket is the
//! index of the half-open interval `[t[i], t[i+1])` that contains it, with
//! everything below the first threshold in bucket 0 and everything at or
//! above the last one in the final bucket. `n` thresholds give `n + 1`
//! buckets.

use chrono::{Datelike, Duration, Months, NaiveDate};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::definition::{ColumnDef, Record, ValueFormat};
use crate::value::{compare_f64, date_from_ordinal, date_ordinal, parse_date, Value};

/// Named date frequencies accepted in a bucket spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DateFrequency {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl DateFrequency {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Some(DateFrequency::Daily),
            "WEEKLY" => Some(DateFrequency::Weekly),
            "MONTHLY" => Some(DateFrequency::Monthly),
            "QUARTERLY" => Some(DateFrequency::Quarterly),
            "YEARLY" => Some(DateFrequency::Yearly),
            _ => None,
        }
    }

    /// Start of the period containing `date`. Weeks start on Monday.
    fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            DateFrequency::Daily => date,
            DateFrequency::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            DateFrequency::Monthly => date.with_day(1).unwrap_or(date),
            DateFrequency::Quarterly => {
                let month = (date.month0() / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), month, 1).unwrap_or(date)
            }
            DateFrequency::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }

    fn advance(self, date: NaiveDate) -> Option<NaiveDate> {
        match self {
            DateFrequency::Daily => date.checked_add_signed(Duration::days(1)),
            DateFrequency::Weekly => date.checked_add_signed(Duration::days(7)),
            DateFrequency::Monthly => date.checked_add_months(Months::new(1)),
            DateFrequency::Quarterly => date.checked_add_months(Months::new(3)),
            DateFrequency::Yearly => date.checked_add_months(Months::new(12)),
        }
    }
}

/// Whether thresholds are plain numbers or date ordinals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PartitionKind {
    Numeric,
    Date,
}

/// Resolved bucket boundaries for one grouping column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    kind: PartitionKind,
    thresholds: Vec<f64>,
}

impl Partition {
    /// Builds a numeric partition. Thresholds are sorted; NaN is dropped.
    pub fn numeric(thresholds: impl IntoIterator<Item = f64>) -> Self {
        let mut thresholds: Vec<f64> = thresholds.into_iter().filter(|t| !t.is_nan()).collect();
        thresholds.sort_by(|a, b| compare_f64(*a, *b));
        thresholds.dedup();
        Partition { kind: PartitionKind::Numeric, thresholds }
    }

    pub fn dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        let mut partition = Partition::numeric(dates.into_iter().map(date_ordinal));
        partition.kind = PartitionKind::Date;
        partition
    }

    /// Parses a comma-separated numeric threshold list. Tokens that are not
    /// numbers are dropped.
    pub fn parse_numeric(spec: &str) -> Self {
        let thresholds = spec.split(',').filter_map(|token| {
            let token = token.trim();
            match token.parse::<f64>() {
                Ok(n) if !n.is_nan() => Some(n),
                _ => {
                    if !token.is_empty() {
                        warn!("dropping non-numeric bucket threshold '{}'", token);
                    }
                    None
                }
            }
        });
        Partition::numeric(thresholds)
    }

    /// Parses a comma-separated date list. Unparseable tokens are dropped.
    pub fn parse_dates(spec: &str) -> Self {
        let dates = spec.split(',').filter_map(|token| {
            let parsed = parse_date(token);
            if parsed.is_none() && !token.trim().is_empty() {
                warn!("dropping unparseable bucket date '{}'", token.trim());
            }
            parsed
        });
        Partition::dates(dates)
    }

    /// Thresholds for a frequency covering every date in `[first, last]`.
    pub fn for_frequency(frequency: DateFrequency, first: NaiveDate, last: NaiveDate) -> Self {
        let mut boundary = frequency.period_start(first);
        let mut dates = vec![boundary];
        while boundary <= last {
            match frequency.advance(boundary) {
                Some(next) => {
                    boundary = next;
                    dates.push(boundary);
                }
                None => break,
            }
        }
        Partition::dates(dates)
    }

    /// Resolves a raw bucket spec for a column, scanning `rows` for the date
    /// range when the spec names a frequency.
    pub fn resolve<'a>(
        column: &ColumnDef,
        spec: &str,
        rows: impl IntoIterator<Item = &'a Record>,
    ) -> Self {
        if column.format != ValueFormat::Date {
            return Partition::parse_numeric(spec);
        }
        let Some(frequency) = DateFrequency::parse(spec) else {
            return Partition::parse_dates(spec);
        };

        let mut range: Option<(NaiveDate, NaiveDate)> = None;
        for row in rows {
            if let Some(date) = row.get(&column.tag).and_then(Value::as_date) {
                range = Some(match range {
                    None => (date, date),
                    Some((lo, hi)) => (lo.min(date), hi.max(date)),
                });
            }
        }
        match range {
            Some((first, last)) => Partition::for_frequency(frequency, first, last),
            None => Partition::dates(Vec::new()),
        }
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn bucket_count(&self) -> usize {
        self.thresholds.len() + 1
    }

    /// Bucket index for a raw value, or `None` when the value has no
    /// numeric/date reading.
    pub fn bucket_of(&self, value: &Value) -> Option<usize> {
        let position = match self.kind {
            PartitionKind::Numeric => match value {
                Value::Date(_) => None,
                other => other.as_f64(),
            },
            PartitionKind::Date => value.as_date().map(date_ordinal),
        }?;
        Some(self.thresholds.partition_point(|t| *t <= position))
    }

    /// Group key for a raw value: the bucket index as a number, or empty.
    pub fn key_for(&self, value: &Value) -> Value {
        match self.bucket_of(value) {
            Some(bucket) => Value::Number(bucket as f64),
            None => Value::Empty,
        }
    }

    /// Human label for a bucket, e.g. `< 10`, `10 - 20`, `>= 20`.
    pub fn bucket_label(&self, bucket: usize) -> String {
        let fmt = |t: f64| match self.kind {
            PartitionKind::Numeric => Value::Number(t).display(),
            PartitionKind::Date => date_from_ordinal(t)
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_default(),
        };
        let n = self.thresholds.len();
        if n == 0 {
            return "All".to_string();
        }
        if bucket == 0 {
            format!("< {}", fmt(self.thresholds[0]))
        } else if bucket >= n {
            format!(">= {}", fmt(self.thresholds[n - 1]))
        } else {
            format!("{} - {}", fmt(self.thresholds[bucket - 1]), fmt(self.thresholds[bucket]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_numeric_bucket_boundaries() {
        let p = Partition::parse_numeric("10,20");
        assert_eq!(p.bucket_of(&Value::Number(5.0)), Some(0));
        assert_eq!(p.bucket_of(&Value::Number(10.0)), Some(1));
        assert_eq!(p.bucket_of(&Value::Number(15.0)), Some(1));
        assert_eq!(p.bucket_of(&Value::Number(20.0)), Some(2));
        assert_eq!(p.bucket_of(&Value::Number(25.0)), Some(2));
        assert_eq!(p.bucket_count(), 3);
    }

    #[test]
    fn test_non_numeric_tokens_dropped() {
        let p = Partition::parse_numeric("20, abc, 10,,");
        assert_eq!(p.thresholds(), &[10.0, 20.0]);
        assert_eq!(p.bucket_of(&Value::Number(15.0)), Some(1));
    }

    #[test]
    fn test_unreadable_value_has_no_bucket() {
        let p = Partition::parse_numeric("10");
        assert_eq!(p.key_for(&Value::text("n/a")), Value::Empty);
        assert_eq!(p.key_for(&Value::text("12")), Value::Number(1.0));
    }

    #[test]
    fn test_bucket_labels() {
        let p = Partition::parse_numeric("10,20");
        assert_eq!(p.bucket_label(0), "< 10");
        assert_eq!(p.bucket_label(1), "10 - 20");
        assert_eq!(p.bucket_label(2), ">= 20");
    }

    #[test]
    fn test_monthly_frequency_covers_range() {
        let p = Partition::for_frequency(DateFrequency::Monthly, date(2024, 1, 15), date(2024, 3, 2));
        // 2024-01-01, 02-01, 03-01, 04-01
        assert_eq!(p.thresholds().len(), 4);
        assert_eq!(p.bucket_of(&Value::Date(date(2024, 1, 15))), Some(1));
        assert_eq!(p.bucket_of(&Value::Date(date(2024, 2, 29))), Some(2));
        assert_eq!(p.bucket_of(&Value::Date(date(2024, 3, 2))), Some(3));
        assert_eq!(p.bucket_label(1), "2024-01-01 - 2024-02-01");
    }

    #[test]
    fn test_weekly_starts_on_monday() {
        // 2024-05-09 is a Thursday
        let p = Partition::for_frequency(DateFrequency::Weekly, date(2024, 5, 9), date(2024, 5, 9));
        assert_eq!(date_from_ordinal(p.thresholds()[0]), Some(date(2024, 5, 6)));
    }

    #[test]
    fn test_quarterly_start() {
        let p = Partition::for_frequency(DateFrequency::Quarterly, date(2023, 8, 20), date(2023, 8, 20));
        assert_eq!(date_from_ordinal(p.thresholds()[0]), Some(date(2023, 7, 1)));
        assert_eq!(date_from_ordinal(p.thresholds()[1]), Some(date(2023, 10, 1)));
    }

    #[test]
    fn test_date_list_drops_bad_tokens() {
        let p = Partition::parse_dates("2024-06-01, never, 01/01/2024");
        assert_eq!(p.kind(), PartitionKind::Date);
        assert_eq!(p.thresholds().len(), 2);
        assert_eq!(p.bucket_of(&Value::Date(date(2024, 3, 1))), Some(1));
    }

    #[test]
    fn test_resolve_by_column_format() {
        let col = ColumnDef::new("d", "Date").with_format(ValueFormat::Date);
        let mut r1 = Record::default();
        r1.insert("d".to_string(), Value::Date(date(2022, 5, 5)));
        let mut r2 = Record::default();
        r2.insert("d".to_string(), Value::Date(date(2024, 1, 1)));
        let p = Partition::resolve(&col, "yearly", [&r1, &r2]);
        // 2022, 2023, 2024, 2025
        assert_eq!(p.thresholds().len(), 4);

        let num = ColumnDef::new("n", "N").with_format(ValueFormat::Number);
        assert_eq!(Partition::resolve(&num, "1,2", [&r1]).kind(), PartitionKind::Numeric);
    }
}
