use chrono::{Datelike, Duration, Local, NaiveDate};

use crate::error::{ApiError, ApiResult};

/// Days covered by the insight window, today included.
pub const INSIGHT_WINDOW_DAYS: i64 = 30;

pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Inclusive date bounds; `None` leaves that side open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn between(from: NaiveDate, to: NaiveDate) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFilter {
    ThisMonth,
    LastMonth,
    ThisYear,
    Between(NaiveDate, NaiveDate),
    All,
}

fn parse_date(value: &str, field: &str) -> ApiResult<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| ApiError::validation(format!("Invalid {field}: expected YYYY-MM-DD")))
}

impl DateFilter {
    /// An explicit range needs both ends and beats a named filter. Unknown
    /// filter names select everything.
    pub fn from_query(
        filter: Option<&str>,
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> ApiResult<Self> {
        let start_date = start_date.filter(|value| !value.trim().is_empty());
        let end_date = end_date.filter(|value| !value.trim().is_empty());
        if let (Some(start), Some(end)) = (start_date, end_date) {
            return Ok(DateFilter::Between(
                parse_date(start, "start_date")?,
                parse_date(end, "end_date")?,
            ));
        }

        Ok(match filter.map(str::trim) {
            Some("this_month") => DateFilter::ThisMonth,
            Some("last_month") => DateFilter::LastMonth,
            Some("this_year") => DateFilter::ThisYear,
            _ => DateFilter::All,
        })
    }

    pub fn range(self, today: NaiveDate) -> DateRange {
        let month_start = today.with_day(1).unwrap_or(today);
        match self {
            DateFilter::ThisMonth => DateRange {
                from: Some(month_start),
                to: None,
            },
            DateFilter::LastMonth => {
                let last_month_end = month_start - Duration::days(1);
                let last_month_start = last_month_end.with_day(1).unwrap_or(last_month_end);
                DateRange::between(last_month_start, last_month_end)
            }
            DateFilter::ThisYear => DateRange {
                from: NaiveDate::from_ymd_opt(today.year(), 1, 1),
                to: None,
            },
            DateFilter::Between(from, to) => DateRange::between(from, to),
            DateFilter::All => DateRange::default(),
        }
    }
}

/// Trailing window of `days` calendar days ending at `today`.
pub fn trailing_window(today: NaiveDate, days: i64) -> DateRange {
    DateRange::between(today - Duration::days(days - 1), today)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn explicit_range_wins_over_filter() {
        let filter =
            DateFilter::from_query(Some("this_year"), Some("2024-01-01"), Some("2024-01-31"))
                .unwrap();
        assert_eq!(filter, DateFilter::Between(date("2024-01-01"), date("2024-01-31")));
    }

    #[test]
    fn half_range_falls_back_to_filter() {
        let filter = DateFilter::from_query(Some("this_month"), Some("2024-01-01"), None).unwrap();
        assert_eq!(filter, DateFilter::ThisMonth);
        let filter = DateFilter::from_query(Some("someday"), None, None).unwrap();
        assert_eq!(filter, DateFilter::All);
    }

    #[test]
    fn bad_dates_are_rejected() {
        assert!(DateFilter::from_query(None, Some("2024-13-01"), Some("2024-12-01")).is_err());
    }

    #[test]
    fn named_ranges() {
        let today = date("2024-03-15");
        assert_eq!(
            DateFilter::ThisMonth.range(today),
            DateRange {
                from: Some(date("2024-03-01")),
                to: None
            }
        );
        assert_eq!(
            DateFilter::LastMonth.range(today),
            DateRange::between(date("2024-02-01"), date("2024-02-29"))
        );
        assert_eq!(
            DateFilter::LastMonth.range(date("2024-01-10")),
            DateRange::between(date("2023-12-01"), date("2023-12-31"))
        );
        assert_eq!(DateFilter::ThisYear.range(today).from, Some(date("2024-01-01")));
        assert_eq!(DateFilter::All.range(today), DateRange::default());
    }

    #[test]
    fn insight_window_is_thirty_days_inclusive() {
        let window = trailing_window(date("2024-03-30"), INSIGHT_WINDOW_DAYS);
        assert_eq!(window.from, Some(date("2024-03-01")));
        assert!(window.contains(date("2024-03-30")));
        assert!(!window.contains(date("2024-02-29")));
    }
}
