use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Result, Row};
use tracing::info;

use crate::dates::DateRange;
use crate::error::StoreError;
use crate::models::{
    Category, NewCategory, NewTransaction, Transaction, TransactionKind, DEFAULT_EXPENSE_CATEGORIES,
    DEFAULT_INCOME_CATEGORIES, DEFAULT_OWNER,
};

pub type DbPool = Pool<SqliteConnectionManager>;

pub fn init_db(path: &Path) -> std::result::Result<DbPool, StoreError> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let manager = SqliteConnectionManager::file(path).with_init(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
    });
    let pool = Pool::new(manager)?;
    {
        let conn = pool.get()?;
        run_migrations(&conn)?;
    }
    info!(path = %path.display(), "transaction store ready");
    Ok(pool)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            icon TEXT NOT NULL,
            type TEXT NOT NULL CHECK(type IN ('income', 'expense')),
            user_id TEXT NOT NULL,
            is_default INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS categories_owner_type_name
            ON categories (user_id, type, name);

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            kind TEXT NOT NULL CHECK(kind IN ('income', 'expense')),
            amount REAL NOT NULL CHECK(amount > 0),
            description TEXT NOT NULL,
            category TEXT NOT NULL,
            date TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS transactions_owner_kind_date
            ON transactions (user_id, kind, date);
        ",
    )?;
    seed_default_categories(conn)
}

fn seed_default_categories(conn: &Connection) -> Result<()> {
    let mut stmt = conn.prepare(
        "
        INSERT OR IGNORE INTO categories
            (name, icon, type, user_id, is_default, created_at, updated_at)
        VALUES (?1, ?2, ?3, ?4, 1, datetime('now'), datetime('now'))
        ",
    )?;
    let seeds = DEFAULT_EXPENSE_CATEGORIES
        .iter()
        .map(|seed| (seed, TransactionKind::Expense))
        .chain(
            DEFAULT_INCOME_CATEGORIES
                .iter()
                .map(|seed| (seed, TransactionKind::Income)),
        );
    for ((name, icon), kind) in seeds {
        stmt.execute(params![name, icon, kind, DEFAULT_OWNER])?;
    }
    Ok(())
}

const CATEGORY_COLUMNS: &str = "id, name, icon, type, user_id, is_default, created_at, updated_at";

fn category_from_row(row: &Row<'_>) -> Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        name: row.get(1)?,
        icon: row.get(2)?,
        kind: row.get(3)?,
        user_id: row.get(4)?,
        is_default: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Defaults first, then by name.
pub fn list_categories(
    conn: &Connection,
    owner: &str,
    kind: TransactionKind,
) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {CATEGORY_COLUMNS}
        FROM categories
        WHERE (user_id = ?1 OR is_default = 1) AND type = ?2
        ORDER BY is_default DESC, name ASC
        "
    ))?;
    let rows = stmt.query_map(params![owner, kind], category_from_row)?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Names of every category the owner may use for `kind`, in listing order.
pub fn category_names(
    conn: &Connection,
    owner: &str,
    kind: TransactionKind,
) -> Result<Vec<String>> {
    Ok(list_categories(conn, owner, kind)?
        .into_iter()
        .map(|category| category.name)
        .collect())
}

fn owned_category(conn: &Connection, owner: &str, id: i64) -> Result<Option<Category>> {
    conn.query_row(
        &format!("SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = ?1 AND user_id = ?2"),
        params![id, owner],
        category_from_row,
    )
    .optional()
}

/// Returns `None` when the name is already taken by the owner or a default
/// category of the same type.
pub fn insert_category(
    conn: &Connection,
    owner: &str,
    category: &NewCategory,
) -> Result<Option<Category>> {
    let inserted = conn.execute(
        "
        INSERT INTO categories
            (name, icon, type, user_id, is_default, created_at, updated_at)
        SELECT ?1, ?2, ?3, ?4, 0, datetime('now'), datetime('now')
        WHERE NOT EXISTS (
            SELECT 1 FROM categories
            WHERE name = ?1 AND type = ?3 AND (user_id = ?4 OR is_default = 1)
        )
        ",
        params![category.name, category.icon, category.kind, owner],
    )?;
    if inserted == 0 {
        return Ok(None);
    }
    owned_category(conn, owner, conn.last_insert_rowid())
}

/// What became of a category edit.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryUpdate {
    Updated(Category),
    /// Another category of the same type visible to the owner has the name.
    NameTaken,
    /// Unknown id, someone else's, a default, or a different type.
    NotFound,
}

/// Renames or re-icons an owned, non-default category. The stored type must
/// match: a category never changes type.
pub fn update_category(
    conn: &Connection,
    owner: &str,
    id: i64,
    category: &NewCategory,
) -> Result<CategoryUpdate> {
    let updated = conn.execute(
        "
        UPDATE categories
        SET name = ?1, icon = ?2, updated_at = datetime('now')
        WHERE id = ?3 AND user_id = ?4 AND type = ?5 AND is_default = 0
          AND NOT EXISTS (
              SELECT 1 FROM categories
              WHERE name = ?1 AND type = ?5 AND (user_id = ?4 OR is_default = 1) AND id <> ?3
          )
        ",
        params![category.name, category.icon, id, owner, category.kind],
    )?;
    if updated > 0 {
        return Ok(owned_category(conn, owner, id)?
            .map_or(CategoryUpdate::NotFound, CategoryUpdate::Updated));
    }

    let editable = conn
        .query_row(
            "
            SELECT 1 FROM categories
            WHERE id = ?1 AND user_id = ?2 AND type = ?3 AND is_default = 0
            ",
            params![id, owner, category.kind],
            |_| Ok(()),
        )
        .optional()?
        .is_some();
    Ok(if editable {
        CategoryUpdate::NameTaken
    } else {
        CategoryUpdate::NotFound
    })
}

/// `false` when nothing matched: unknown id, someone else's, or a default.
pub fn delete_category(conn: &Connection, owner: &str, id: i64) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM categories WHERE id = ?1 AND user_id = ?2 AND is_default = 0",
        params![id, owner],
    )?;
    Ok(deleted > 0)
}

const TRANSACTION_COLUMNS: &str =
    "id, amount, description, category, date, user_id, created_at, updated_at";

fn transaction_from_row(row: &Row<'_>) -> Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        amount: row.get(1)?,
        description: row.get(2)?,
        category: row.get(3)?,
        date: row.get(4)?,
        user_id: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Newest first. `limit` of `None` returns every match.
pub fn list_transactions(
    conn: &Connection,
    owner: &str,
    kind: TransactionKind,
    range: DateRange,
    limit: Option<i64>,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {TRANSACTION_COLUMNS}
        FROM transactions
        WHERE user_id = ?1
          AND kind = ?2
          AND (?3 IS NULL OR date >= ?3)
          AND (?4 IS NULL OR date <= ?4)
        ORDER BY date DESC, created_at DESC, id DESC
        LIMIT ?5
        "
    ))?;
    let rows = stmt.query_map(
        params![owner, kind, range.from, range.to, limit.unwrap_or(-1)],
        transaction_from_row,
    )?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// Inserts only if the category exists for the owner (or as a default) with
/// the same kind; returns `None` otherwise.
pub fn insert_transaction(
    conn: &Connection,
    owner: &str,
    kind: TransactionKind,
    txn: &NewTransaction,
) -> Result<Option<Transaction>> {
    let inserted = conn.execute(
        "
        INSERT INTO transactions
            (kind, amount, description, category, date, user_id, created_at, updated_at)
        SELECT ?1, ?2, ?3, ?4, ?5, ?6, datetime('now'), datetime('now')
        WHERE EXISTS (
            SELECT 1 FROM categories
            WHERE name = ?4 AND type = ?1 AND (user_id = ?6 OR is_default = 1)
        )
        ",
        params![kind, txn.amount, txn.description, txn.category, txn.date, owner],
    )?;
    if inserted == 0 {
        return Ok(None);
    }

    conn.query_row(
        &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1 AND user_id = ?2"),
        params![conn.last_insert_rowid(), owner],
        transaction_from_row,
    )
    .optional()
}

pub fn delete_transaction(
    conn: &Connection,
    owner: &str,
    kind: TransactionKind,
    id: i64,
) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2 AND kind = ?3",
        params![id, owner, kind],
    )?;
    Ok(deleted > 0)
}
