//! Natural-language insight over the trailing 30-day window.
//!
//! The category breakdown is always computed here; the classifier only
//! supplies the summary, tips and trend. Unlike categorization there is no
//! local fallback text: a classifier failure is the caller's error.

use chrono::NaiveDate;
use rocket::tokio::task::spawn_blocking;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::aggregate::{self, by_category};
use crate::classifier::{Classifier, ClassifierError, Prompt};
use crate::dates::{trailing_window, INSIGHT_WINDOW_DAYS};
use crate::db::{self, DbPool};
use crate::error::StoreError;
use crate::models::{CategoryBreakdown, Insight, SpendingTrend, Transaction, TransactionKind};

const EMPTY_SUMMARY: &str = "No financial data found in the last 30 days. \
    Start tracking your income and expenses to get personalized insights!";
const EMPTY_TIPS: [&str; 2] = [
    "Begin by adding your daily transactions",
    "Categorize your spending and income for better analysis",
];

#[derive(Debug, Error)]
pub enum InsightError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// The three fields the classifier must produce.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InsightDraft {
    summary: String,
    tips: Vec<String>,
    spending_trend: SpendingTrend,
}

fn empty_insight() -> Insight {
    Insight {
        summary: EMPTY_SUMMARY.to_string(),
        tips: EMPTY_TIPS.iter().map(|tip| tip.to_string()).collect(),
        category_breakdown: CategoryBreakdown::default(),
        spending_trend: SpendingTrend::Stable,
    }
}

fn insight_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "summary": {
                "type": "string",
                "description": "A brief overview of financial patterns and performance"
            },
            "tips": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Practical financial tips based on income and spending"
            },
            "spendingTrend": {
                "type": "string",
                "enum": ["increasing", "decreasing", "stable"],
                "description": "Overall trend in spending"
            }
        },
        "required": ["summary", "tips", "spendingTrend"],
        "additionalProperties": false
    })
}

/// One line per transaction, expenses first, amounts signed.
fn transcript(expenses: &[Transaction], income: &[Transaction]) -> String {
    let expense_lines = expenses.iter().map(|txn| {
        format!("{}: -${} - {} ({})", txn.date, txn.amount, txn.description, txn.category)
    });
    let income_lines = income.iter().map(|txn| {
        format!("{}: +${} - {} ({})", txn.date, txn.amount, txn.description, txn.category)
    });
    expense_lines.chain(income_lines).collect::<Vec<_>>().join("\n")
}

fn insight_prompt(expenses: &[Transaction], income: &[Transaction]) -> Prompt {
    let total_income = aggregate::total(income);
    let total_expenses = aggregate::total(expenses);
    let net = total_income - total_expenses;

    Prompt::new(
        format!(
            "You are a personal finance advisor. \
             Analyze the user's financial data and provide insights.\n\
             Be encouraging and practical. \
             Focus on patterns, spending habits, and actionable advice.\n\
             Keep your response concise but helpful.\n\
             Total income: {total_income:.2}, Total expenses: {total_expenses:.2}, Net: {net:.2}"
        ),
        format!(
            "Please analyze my financial data from the last 30 days and provide insights:\n\n{}",
            transcript(expenses, income)
        ),
    )
    .schema("financial_insights", insight_schema())
}

/// Builds the insight for an already loaded window.
pub async fn summarize(
    classifier: &dyn Classifier,
    expenses: &[Transaction],
    income: &[Transaction],
) -> Result<Insight, ClassifierError> {
    if expenses.is_empty() && income.is_empty() {
        return Ok(empty_insight());
    }

    let category_breakdown = CategoryBreakdown(by_category(expenses));
    let answer = classifier.complete(&insight_prompt(expenses, income)).await?;
    let draft: InsightDraft =
        serde_json::from_str(&answer).map_err(|err| ClassifierError::Malformed(err.to_string()))?;

    Ok(Insight {
        summary: draft.summary,
        tips: draft.tips,
        category_breakdown,
        spending_trend: draft.spending_trend,
    })
}

fn load_window(
    pool: &DbPool,
    owner: &str,
    today: NaiveDate,
) -> Result<(Vec<Transaction>, Vec<Transaction>), StoreError> {
    let conn = pool.get()?;
    let window = trailing_window(today, INSIGHT_WINDOW_DAYS);
    let expenses = db::list_transactions(&conn, owner, TransactionKind::Expense, window, None)?;
    let income = db::list_transactions(&conn, owner, TransactionKind::Income, window, None)?;
    Ok((expenses, income))
}

/// Loads the owner's last 30 days and asks the classifier about them.
pub async fn generate_insight(
    pool: &DbPool,
    classifier: &dyn Classifier,
    owner: &str,
    today: NaiveDate,
) -> Result<Insight, InsightError> {
    let pool = pool.clone();
    let owner = owner.to_string();
    let (expenses, income) = spawn_blocking(move || load_window(&pool, &owner, today))
        .await
        .map_err(StoreError::from)??;
    debug!(
        expenses = expenses.len(),
        income = income.len(),
        "loaded insight window"
    );
    Ok(summarize(classifier, &expenses, &income).await?)
}
