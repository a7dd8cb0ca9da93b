use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rocket::request::FromParam;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize, Serializer};

use crate::aggregate::Bucket;
use crate::error::{ApiError, ApiResult};

/// Owner value carried by the shared default categories.
pub const DEFAULT_OWNER: &str = "default";

pub const FALLBACK_ICON: &str = "Circle";

/// Icon names a category may carry. Anything else renders as [`FALLBACK_ICON`].
pub const ICONS: &[&str] = &[
    "Circle",
    "UtensilsCrossed",
    "Car",
    "ShoppingBag",
    "Film",
    "Receipt",
    "Heart",
    "Plane",
    "GraduationCap",
    "Sparkles",
    "MoreHorizontal",
    "Briefcase",
    "Laptop",
    "TrendingUp",
    "Building",
    "Gift",
    "DollarSign",
    "Home",
    "Coffee",
    "GamepadIcon",
    "Music",
    "Book",
    "Dumbbell",
    "TreePine",
    "Shirt",
];

pub const DEFAULT_EXPENSE_CATEGORIES: &[(&str, &str)] = &[
    ("Food & Dining", "UtensilsCrossed"),
    ("Transportation", "Car"),
    ("Shopping", "ShoppingBag"),
    ("Entertainment", "Film"),
    ("Bills & Utilities", "Receipt"),
    ("Healthcare", "Heart"),
    ("Travel", "Plane"),
    ("Education", "GraduationCap"),
    ("Personal Care", "Sparkles"),
    ("Other", "MoreHorizontal"),
];

pub const DEFAULT_INCOME_CATEGORIES: &[(&str, &str)] = &[
    ("Salary", "Briefcase"),
    ("Freelance", "Laptop"),
    ("Investment", "TrendingUp"),
    ("Business", "Building"),
    ("Gift", "Gift"),
    ("Other Income", "DollarSign"),
];

pub fn resolve_icon(name: &str) -> &'static str {
    ICONS
        .iter()
        .copied()
        .find(|icon| *icon == name.trim())
        .unwrap_or(FALLBACK_ICON)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Expense,
    Income,
}

impl TransactionKind {
    /// Parses the singular wire name used by `type` fields.
    pub fn from_type(name: &str) -> Option<Self> {
        match name {
            "expense" => Some(TransactionKind::Expense),
            "income" => Some(TransactionKind::Income),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Expense => "expense",
            TransactionKind::Income => "income",
        }
    }

    /// Key of the list payload: `expenses` or `income`.
    pub fn collection(self) -> &'static str {
        match self {
            TransactionKind::Expense => "expenses",
            TransactionKind::Income => "income",
        }
    }

    /// Category the resolver lands on when classification fails.
    pub fn fallback_category(self) -> &'static str {
        match self {
            TransactionKind::Expense => "Other",
            TransactionKind::Income => "Other Income",
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'a> FromParam<'a> for TransactionKind {
    type Error = &'a str;

    fn from_param(param: &'a str) -> Result<Self, Self::Error> {
        match param {
            "expenses" => Ok(TransactionKind::Expense),
            "income" => Ok(TransactionKind::Income),
            other => Err(other),
        }
    }
}

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "expense" => Ok(TransactionKind::Expense),
            "income" => Ok(TransactionKind::Income),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// A stored expense or income row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    pub id: i64,
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub date: NaiveDate,
    pub user_id: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub user_id: String,
    pub is_default: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTransaction {
    pub amount: f64,
    pub description: String,
    pub category: String,
    pub date: NaiveDate,
}

impl NewTransaction {
    /// Trims text fields and rejects bodies the store must never see.
    pub fn validated(self) -> ApiResult<Self> {
        if !self.amount.is_finite() || self.amount <= 0.0 {
            return Err(ApiError::validation("Amount must be greater than zero"));
        }
        let description = self.description.trim().to_string();
        if description.is_empty() {
            return Err(ApiError::validation("Description is required"));
        }
        let category = self.category.trim().to_string();
        if category.is_empty() {
            return Err(ApiError::validation("Category is required"));
        }
        Ok(Self {
            amount: self.amount,
            description,
            category,
            date: self.date,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    pub name: String,
    pub icon: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

impl NewCategory {
    pub fn validated(self) -> ApiResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::validation("Category name is required"));
        }
        if self.icon.trim().is_empty() {
            return Err(ApiError::validation("Category icon is required"));
        }
        Ok(Self {
            name,
            icon: resolve_icon(&self.icon).to_string(),
            kind: self.kind,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategorizeRequest {
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: Option<TransactionKind>,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpendingTrend {
    Increasing,
    Decreasing,
    Stable,
}

/// Category totals keyed by name, kept in aggregation order on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryBreakdown(pub Vec<Bucket>);

#[cfg(test)]
impl CategoryBreakdown {
    pub fn get(&self, category: &str) -> Option<f64> {
        self.0
            .iter()
            .find(|bucket| bucket.key == category)
            .map(|bucket| bucket.amount)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for CategoryBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|bucket| (&bucket.key, bucket.amount)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub summary: String,
    pub tips: Vec<String>,
    pub category_breakdown: CategoryBreakdown,
    pub spending_trend: SpendingTrend,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(amount: f64, description: &str, category: &str) -> NewTransaction {
        NewTransaction {
            amount,
            description: description.to_string(),
            category: category.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        }
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert!(body(0.0, "Lunch", "Food & Dining").validated().is_err());
        assert!(body(-4.5, "Lunch", "Food & Dining").validated().is_err());
        assert!(body(f64::NAN, "Lunch", "Food & Dining").validated().is_err());
    }

    #[test]
    fn trims_text_fields() {
        let valid = body(12.5, "  Lunch ", " Food & Dining").validated().unwrap();
        assert_eq!(valid.description, "Lunch");
        assert_eq!(valid.category, "Food & Dining");
        assert!(body(12.5, "   ", "Food & Dining").validated().is_err());
    }

    #[test]
    fn unknown_icons_fall_back() {
        assert_eq!(resolve_icon("Plane"), "Plane");
        assert_eq!(resolve_icon("Rocket"), FALLBACK_ICON);
    }

    #[test]
    fn kind_path_segments() {
        assert_eq!(TransactionKind::from_param("expenses"), Ok(TransactionKind::Expense));
        assert_eq!(TransactionKind::from_param("income"), Ok(TransactionKind::Income));
        assert!(TransactionKind::from_param("expense").is_err());
    }

    #[test]
    fn kind_type_names() {
        assert_eq!(TransactionKind::from_type("expense"), Some(TransactionKind::Expense));
        assert_eq!(TransactionKind::from_type("income"), Some(TransactionKind::Income));
        assert_eq!(TransactionKind::from_type("expenses"), None);
        assert_eq!(TransactionKind::from_type("Income"), None);
    }

    #[test]
    fn breakdown_serializes_as_ordered_object() {
        let breakdown = CategoryBreakdown(vec![
            Bucket::new("Travel", "Travel", 20.0),
            Bucket::new("Food", "Food", 80.0),
        ]);
        let json = serde_json::to_string(&breakdown).unwrap();
        assert_eq!(json, r#"{"Travel":20.0,"Food":80.0}"#);
    }
}
