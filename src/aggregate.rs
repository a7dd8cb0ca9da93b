//! Chart and summary aggregation over in-memory transactions.
//!
//! Sums accumulate in `f64` and are rounded to cents only when a bucket is
//! emitted, never per addition.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::dates::DateRange;
use crate::models::Transaction;

/// Days before today covered by the daily series (31 buckets in total).
pub const DAILY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bucket {
    /// Sortable grouping key (`YYYY-MM`, `YYYY-MM-DD` or the category name).
    pub key: String,
    pub label: String,
    pub amount: f64,
}

impl Bucket {
    pub fn new(key: impl Into<String>, label: impl Into<String>, amount: f64) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            amount,
        }
    }
}

/// Rounds half away from zero on the cent boundary.
pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn day_label(date: NaiveDate) -> String {
    date.format("%b %-d").to_string()
}

/// One bucket per calendar month present in the input, oldest first.
pub fn monthly(transactions: &[Transaction]) -> Vec<Bucket> {
    let mut totals: BTreeMap<(i32, u32), f64> = BTreeMap::new();
    for txn in transactions {
        *totals.entry((txn.date.year(), txn.date.month())).or_insert(0.0) += txn.amount;
    }

    totals
        .into_iter()
        .map(|((year, month), amount)| {
            let label = NaiveDate::from_ymd_opt(year, month, 1)
                .map(|first| first.format("%b %Y").to_string())
                .unwrap_or_default();
            Bucket::new(format!("{year:04}-{month:02}"), label, round_cents(amount))
        })
        .collect()
}

/// `days + 1` buckets ending at `today`, zero-filled for quiet days.
pub fn daily(transactions: &[Transaction], today: NaiveDate, days: i64) -> Vec<Bucket> {
    let start = today - Duration::days(days);
    let window = DateRange::between(start, today);
    let mut totals: HashMap<NaiveDate, f64> = HashMap::new();
    for txn in transactions {
        if window.contains(txn.date) {
            *totals.entry(txn.date).or_insert(0.0) += txn.amount;
        }
    }

    start
        .iter_days()
        .take_while(|date| *date <= today)
        .map(|date| {
            let amount = totals.get(&date).copied().unwrap_or(0.0);
            Bucket::new(date.to_string(), day_label(date), round_cents(amount))
        })
        .collect()
}

/// Totals per category name, largest first. Equal totals keep the order in
/// which their category was first seen.
pub fn by_category(transactions: &[Transaction]) -> Vec<Bucket> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<(&str, f64)> = Vec::new();
    for txn in transactions {
        match index.get(txn.category.as_str()) {
            Some(&slot) => totals[slot].1 += txn.amount,
            None => {
                index.insert(txn.category.as_str(), totals.len());
                totals.push((txn.category.as_str(), txn.amount));
            }
        }
    }

    totals.sort_by(|a, b| b.1.total_cmp(&a.1));
    totals
        .into_iter()
        .map(|(category, amount)| Bucket::new(category, category, round_cents(amount)))
        .collect()
}

/// Running total, one point per transaction in date order.
pub fn cumulative(transactions: &[Transaction]) -> Vec<Bucket> {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|txn| (txn.date, txn.created_at, txn.id));

    let mut running = 0.0;
    ordered
        .into_iter()
        .map(|txn| {
            running += txn.amount;
            Bucket::new(txn.date.to_string(), day_label(txn.date), round_cents(running))
        })
        .collect()
}

pub fn total(transactions: &[Transaction]) -> f64 {
    transactions.iter().map(|txn| txn.amount).sum()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub expense_count: usize,
    pub category_count: usize,
    pub highest_day: f64,
    pub average_per_day: f64,
    pub total_income: f64,
    pub total_expenses: f64,
    pub net: f64,
    pub savings_rate: f64,
}

/// Dashboard figures. `daily` is the zero-filled series from [`daily`].
pub fn stats(expenses: &[Transaction], income: &[Transaction], daily: &[Bucket]) -> Stats {
    let total_income = total(income);
    let total_expenses = total(expenses);
    let net = total_income - total_expenses;
    let daily_sum: f64 = daily.iter().map(|bucket| bucket.amount).sum();

    Stats {
        expense_count: expenses.len(),
        category_count: by_category(expenses).len(),
        highest_day: daily.iter().map(|bucket| bucket.amount).fold(0.0, f64::max),
        average_per_day: if daily.is_empty() {
            0.0
        } else {
            round_cents(daily_sum / daily.len() as f64)
        },
        total_income: round_cents(total_income),
        total_expenses: round_cents(total_expenses),
        net: round_cents(net),
        savings_rate: if total_income > 0.0 {
            round_cents(net / total_income * 100.0)
        } else {
            0.0
        },
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analytics {
    pub monthly: Vec<Bucket>,
    pub daily: Vec<Bucket>,
    pub categories: Vec<Bucket>,
    pub trend: Vec<Bucket>,
    pub stats: Stats,
}

/// Every chart series for a set of expenses.
///
/// `recent` holds the expenses of the trailing daily window, which may differ
/// from the filtered `expenses` used for the other series.
pub fn analytics(
    expenses: &[Transaction],
    recent: &[Transaction],
    income: &[Transaction],
    today: NaiveDate,
) -> Analytics {
    let daily = daily(recent, today, DAILY_WINDOW_DAYS);
    let stats = stats(expenses, income, &daily);
    Analytics {
        monthly: monthly(expenses),
        categories: by_category(expenses),
        trend: cumulative(expenses),
        daily,
        stats,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub(crate) fn txn(id: i64, amount: f64, day: &str, category: &str) -> Transaction {
        let created: NaiveDateTime = date(day).and_hms_opt(12, 0, 0).unwrap();
        Transaction {
            id,
            amount,
            description: format!("txn {id}"),
            category: category.to_string(),
            date: date(day),
            user_id: "user-1".to_string(),
            created_at: created,
            updated_at: created,
        }
    }

    fn scenario() -> Vec<Transaction> {
        vec![
            txn(1, 50.0, "2024-01-05", "Food"),
            txn(2, 30.0, "2024-01-05", "Food"),
            txn(3, 20.0, "2024-02-01", "Travel"),
        ]
    }

    fn pairs(buckets: &[Bucket]) -> Vec<(&str, f64)> {
        buckets.iter().map(|b| (b.key.as_str(), b.amount)).collect()
    }

    #[test]
    fn monthly_scenario() {
        let buckets = monthly(&scenario());
        assert_eq!(pairs(&buckets), vec![("2024-01", 80.0), ("2024-02", 20.0)]);
        assert_eq!(buckets[0].label, "Jan 2024");
    }

    #[test]
    fn category_scenario() {
        let buckets = by_category(&scenario());
        assert_eq!(pairs(&buckets), vec![("Food", 80.0), ("Travel", 20.0)]);
    }

    #[test]
    fn monthly_ignores_input_order() {
        let mut txns = scenario();
        txns.push(txn(4, 7.25, "2023-12-31", "Food"));
        let forward = monthly(&txns);
        txns.reverse();
        assert_eq!(monthly(&txns), forward);
        assert_eq!(forward[0].key, "2023-12");
    }

    #[test]
    fn months_sort_by_calendar_not_label() {
        let txns = vec![
            txn(1, 1.0, "2024-04-02", "Food"),
            txn(2, 1.0, "2024-08-02", "Food"),
            txn(3, 1.0, "2024-02-02", "Food"),
        ];
        let labels: Vec<_> = monthly(&txns).into_iter().map(|b| b.label).collect();
        assert_eq!(labels, vec!["Feb 2024", "Apr 2024", "Aug 2024"]);
    }

    #[test]
    fn daily_window_is_zero_filled() {
        let today = date("2024-03-10");
        let buckets = daily(&[], today, DAILY_WINDOW_DAYS);
        assert_eq!(buckets.len(), 31);
        assert!(buckets.iter().all(|b| b.amount == 0.0));
        assert_eq!(buckets.first().unwrap().key, "2024-02-09");
        assert_eq!(buckets.last().unwrap().key, "2024-03-10");
    }

    #[test]
    fn daily_window_drops_out_of_range_days() {
        let today = date("2024-03-10");
        let txns = vec![
            txn(1, 10.0, "2024-03-10", "Food"),
            txn(2, 5.0, "2024-03-10", "Food"),
            txn(3, 99.0, "2024-02-08", "Food"),
            txn(4, 3.0, "2024-03-11", "Food"),
        ];
        let buckets = daily(&txns, today, DAILY_WINDOW_DAYS);
        assert_eq!(buckets.len(), 31);
        assert_eq!(buckets.last().unwrap().amount, 15.0);
        assert_eq!(buckets.iter().map(|b| b.amount).sum::<f64>(), 15.0);
    }

    #[test]
    fn category_total_matches_input_sum() {
        let txns = vec![
            txn(1, 10.333, "2024-01-01", "Food"),
            txn(2, 0.1, "2024-01-02", "Travel"),
            txn(3, 0.2, "2024-01-03", "Travel"),
            txn(4, 5.555, "2024-01-04", "Fun"),
        ];
        let bucketed: f64 = by_category(&txns).iter().map(|b| b.amount).sum();
        assert!((bucketed - total(&txns)).abs() <= 0.01);
    }

    #[test]
    fn category_ties_keep_first_seen_order() {
        let txns = vec![
            txn(1, 10.0, "2024-01-01", "Books"),
            txn(2, 10.0, "2024-01-02", "Art"),
            txn(3, 25.0, "2024-01-03", "Rent"),
        ];
        let keys: Vec<_> = by_category(&txns).into_iter().map(|b| b.key).collect();
        assert_eq!(keys, vec!["Rent", "Books", "Art"]);
    }

    #[test]
    fn categories_are_not_merged() {
        let txns = vec![
            txn(1, 1.0, "2024-01-01", "Food"),
            txn(2, 1.0, "2024-01-01", "food"),
        ];
        assert_eq!(by_category(&txns).len(), 2);
    }

    #[test]
    fn cumulative_ends_at_total() {
        let mut txns = scenario();
        txns.push(txn(4, 0.5, "2023-11-30", "Food"));
        let trend = cumulative(&txns);
        assert_eq!(trend.len(), 4);
        assert_eq!(trend[0].key, "2023-11-30");
        assert_eq!(trend[0].amount, 0.5);
        assert_eq!(trend.last().unwrap().amount, round_cents(total(&txns)));
    }

    #[test]
    fn cumulative_breaks_date_ties_by_creation() {
        let mut later = txn(9, 5.0, "2024-01-05", "Food");
        later.created_at = later.created_at + Duration::hours(1);
        let earlier = txn(10, 1.0, "2024-01-05", "Food");
        let trend = cumulative(&[later, earlier]);
        assert_eq!(trend[0].amount, 1.0);
        assert_eq!(trend[1].amount, 6.0);
    }

    #[test]
    fn rounding_happens_once_per_bucket() {
        let txns: Vec<_> = (0..10).map(|i| txn(i, 0.333, "2024-01-01", "Food")).collect();
        assert_eq!(by_category(&txns)[0].amount, 3.33);
        assert_eq!(round_cents(2.675_000_1), 2.68);
        assert_eq!(round_cents(-1.005_000_1), -1.01);
    }

    #[test]
    fn binary_half_cents_round_as_stored() {
        // 1.005 and 2.675 sit just below the half cent in binary.
        assert_eq!(round_cents(1.005), 1.0);
        assert_eq!(round_cents(2.675), 2.67);
        assert_eq!(round_cents(0.125), 0.13);
        assert_eq!(round_cents(-0.125), -0.13);

        let buckets = by_category(&[txn(1, 1.005, "2024-01-01", "Food")]);
        assert_eq!(buckets[0].amount, 1.0);
        let days = daily(&[txn(2, 1.005, "2024-01-01", "Food")], date("2024-01-01"), 0);
        assert_eq!(days[0].amount, 1.0);
    }

    #[test]
    fn stats_cover_the_dashboard() {
        let today = date("2024-01-10");
        let expenses = vec![
            txn(1, 40.0, "2024-01-10", "Food"),
            txn(2, 22.0, "2024-01-09", "Travel"),
        ];
        let income = vec![txn(3, 200.0, "2024-01-02", "Salary")];
        let series = daily(&expenses, today, DAILY_WINDOW_DAYS);
        let stats = stats(&expenses, &income, &series);
        assert_eq!(stats.expense_count, 2);
        assert_eq!(stats.category_count, 2);
        assert_eq!(stats.highest_day, 40.0);
        assert_eq!(stats.average_per_day, 2.0);
        assert_eq!(stats.net, 138.0);
        assert_eq!(stats.savings_rate, 69.0);
    }

    #[test]
    fn savings_rate_without_income_is_zero() {
        let expenses = vec![txn(1, 40.0, "2024-01-10", "Food")];
        let stats = stats(&expenses, &[], &[]);
        assert_eq!(stats.savings_rate, 0.0);
        assert_eq!(stats.average_per_day, 0.0);
        assert_eq!(stats.net, -40.0);
    }
}
