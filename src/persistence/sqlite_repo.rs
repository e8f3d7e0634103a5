use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use crate::domain::{Order, OrderSide, OrderStatus, Position, PositionStatus, User, Wallet};
use crate::errors::RepositoryError;

use super::{OrderRepository, PositionRepository, UserRepository, WalletRepository};

/// Inline rather than `include_str!("../schema.sql")` (database_tracker.rs's
/// approach): this crate's schema.sql doesn't exist in this checkout, and an
/// inline constant avoids depending on a file that isn't there.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS wallets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    public_address TEXT NOT NULL,
    encrypted_key_blob TEXT NOT NULL,
    chain TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS idx_wallets_user_id ON wallets(user_id);

CREATE TABLE IF NOT EXISTS orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    token_mint TEXT NOT NULL,
    side TEXT NOT NULL,
    amount_in REAL NOT NULL,
    status TEXT NOT NULL,
    signature TEXT,
    commission_usd REAL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_orders_user_id ON orders(user_id);

CREATE TABLE IF NOT EXISTS positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    token_mint TEXT NOT NULL,
    entry_amount_in REAL NOT NULL,
    entry_amount_out REAL NOT NULL,
    tp_pct REAL,
    sl_pct REAL,
    trailing_stop_pct REAL,
    highest_observed_price REAL NOT NULL,
    status TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_positions_status ON positions(status);
"#;

fn side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
        OrderSide::Swap => "swap",
    }
}

fn side_from_str(s: &str) -> OrderSide {
    match s {
        "sell" => OrderSide::Sell,
        "swap" => OrderSide::Swap,
        _ => OrderSide::Buy,
    }
}

fn order_status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Filled => "filled",
        OrderStatus::Failed => "failed",
    }
}

fn order_status_from_str(s: &str) -> OrderStatus {
    match s {
        "filled" => OrderStatus::Filled,
        "failed" => OrderStatus::Failed,
        _ => OrderStatus::Pending,
    }
}

fn position_status_to_str(status: PositionStatus) -> &'static str {
    match status {
        PositionStatus::Open => "open",
        PositionStatus::Exiting => "exiting",
        PositionStatus::Closed => "closed",
    }
}

fn position_status_from_str(s: &str) -> PositionStatus {
    match s {
        "exiting" => PositionStatus::Exiting,
        "closed" => PositionStatus::Closed,
        _ => PositionStatus::Open,
    }
}

/// One SQLite connection shared across all repositories, behind a
/// synchronous mutex. Every trait method offloads its blocking work onto
/// `spawn_blocking` so the async callers never block the executor.
#[derive(Clone)]
pub struct SqliteRepositories {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepositories {
    pub fn open(db_path: &str) -> Result<Self, RepositoryError> {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(SCHEMA_SQL)?;
        info!(db_path, "sqlite repositories initialized");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self, RepositoryError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, RepositoryError>
    where
        F: FnOnce(&Connection) -> Result<T, RepositoryError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            f(&conn)
        })
        .await
        .expect("sqlite worker task panicked")
    }
}

#[async_trait]
impl UserRepository for SqliteRepositories {
    async fn find_by_chat_id(&self, chat_id: &str) -> Result<Option<User>, RepositoryError> {
        let chat_id = chat_id.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, chat_id, created_at FROM users WHERE chat_id = ?1",
                params![chat_id],
                |row| {
                    let created_at: String = row.get(2)?;
                    Ok(User {
                        id: row.get(0)?,
                        chat_id: row.get(1)?,
                        created_at: created_at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
                    })
                },
            )
            .optional()
            .map_err(RepositoryError::from)
        })
        .await
    }

    async fn create(&self, chat_id: &str) -> Result<User, RepositoryError> {
        let chat_id = chat_id.to_string();
        self.with_conn(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO users (chat_id, created_at) VALUES (?1, ?2)",
                params![chat_id, created_at.to_rfc3339()],
            )?;
            Ok(User {
                id: conn.last_insert_rowid(),
                chat_id,
                created_at,
            })
        })
        .await
    }
}

#[async_trait]
impl WalletRepository for SqliteRepositories {
    async fn active_for_user(&self, user_id: i64) -> Result<Option<Wallet>, RepositoryError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, user_id, public_address, encrypted_key_blob, chain, active
                 FROM wallets WHERE user_id = ?1 AND active = 1",
                params![user_id],
                |row| {
                    Ok(Wallet {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        public_address: row.get(2)?,
                        encrypted_key_blob: row.get(3)?,
                        chain: row.get(4)?,
                        active: row.get::<_, i64>(5)? != 0,
                    })
                },
            )
            .optional()
            .map_err(RepositoryError::from)
        })
        .await
    }

    async fn insert(&self, wallet: &Wallet) -> Result<Wallet, RepositoryError> {
        let wallet = wallet.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO wallets (user_id, public_address, encrypted_key_blob, chain, active)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    wallet.user_id,
                    wallet.public_address,
                    wallet.encrypted_key_blob,
                    wallet.chain,
                    wallet.active as i64,
                ],
            )?;
            Ok(Wallet {
                id: conn.last_insert_rowid(),
                ..wallet
            })
        })
        .await
    }

    async fn set_active(&self, user_id: i64, wallet_id: i64) -> Result<(), RepositoryError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE wallets SET active = 0 WHERE user_id = ?1",
                params![user_id],
            )?;
            conn.execute(
                "UPDATE wallets SET active = 1 WHERE id = ?1 AND user_id = ?2",
                params![wallet_id, user_id],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl OrderRepository for SqliteRepositories {
    async fn insert(&self, order: &Order) -> Result<Order, RepositoryError> {
        let order = order.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO orders (user_id, token_mint, side, amount_in, status, signature, commission_usd, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    order.user_id,
                    order.token_mint,
                    side_to_str(order.side),
                    order.amount_in,
                    order_status_to_str(order.status),
                    order.signature,
                    order.commission_usd,
                    order.created_at.to_rfc3339(),
                ],
            )?;
            Ok(Order {
                id: conn.last_insert_rowid(),
                ..order
            })
        })
        .await
    }

    async fn update_status(
        &self,
        order_id: i64,
        status: OrderStatus,
        signature: Option<String>,
        commission_usd: Option<f64>,
    ) -> Result<(), RepositoryError> {
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE orders SET status = ?2, signature = ?3, commission_usd = ?4 WHERE id = ?1",
                params![order_id, order_status_to_str(status), signature, commission_usd],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, order_id: i64) -> Result<Option<Order>, RepositoryError> {
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT id, user_id, token_mint, side, amount_in, status, signature, commission_usd, created_at
                 FROM orders WHERE id = ?1",
                params![order_id],
                |row| {
                    let created_at: String = row.get(8)?;
                    let side: String = row.get(3)?;
                    let status: String = row.get(5)?;
                    Ok(Order {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        token_mint: row.get(2)?,
                        side: side_from_str(&side),
                        amount_in: row.get(4)?,
                        status: order_status_from_str(&status),
                        signature: row.get(6)?,
                        commission_usd: row.get(7)?,
                        created_at: created_at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
                    })
                },
            )
            .optional()
            .map_err(RepositoryError::from)
        })
        .await
    }
}

#[async_trait]
impl PositionRepository for SqliteRepositories {
    async fn insert(&self, position: &Position) -> Result<Position, RepositoryError> {
        let position = position.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO positions (user_id, token_mint, entry_amount_in, entry_amount_out,
                    tp_pct, sl_pct, trailing_stop_pct, highest_observed_price, status)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    position.user_id,
                    position.token_mint,
                    position.entry_amount_in,
                    position.entry_amount_out,
                    position.tp_pct,
                    position.sl_pct,
                    position.trailing_stop_pct,
                    position.highest_observed_price,
                    position_status_to_str(position.status),
                ],
            )?;
            Ok(Position {
                id: conn.last_insert_rowid(),
                ..position
            })
        })
        .await
    }

    async fn find_open(&self) -> Result<Vec<Position>, RepositoryError> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, token_mint, entry_amount_in, entry_amount_out,
                        tp_pct, sl_pct, trailing_stop_pct, highest_observed_price, status
                 FROM positions WHERE status = 'open'",
            )?;
            let rows = stmt.query_map([], |row| {
                let status: String = row.get(9)?;
                Ok(Position {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    token_mint: row.get(2)?,
                    entry_amount_in: row.get(3)?,
                    entry_amount_out: row.get(4)?,
                    tp_pct: row.get(5)?,
                    sl_pct: row.get(6)?,
                    trailing_stop_pct: row.get(7)?,
                    highest_observed_price: row.get(8)?,
                    status: position_status_from_str(&status),
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(RepositoryError::from)
        })
        .await
    }

    async fn update(&self, position: &Position) -> Result<(), RepositoryError> {
        let position = position.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "UPDATE positions SET tp_pct = ?2, sl_pct = ?3, trailing_stop_pct = ?4,
                    highest_observed_price = ?5, status = ?6 WHERE id = ?1",
                params![
                    position.id,
                    position.tp_pct,
                    position.sl_pct,
                    position.trailing_stop_pct,
                    position.highest_observed_price,
                    position_status_to_str(position.status),
                ],
            )?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn user_create_and_lookup_roundtrip() {
        let repo = SqliteRepositories::in_memory().unwrap();
        let created = repo.create("chat-1").await.unwrap();
        let found = repo.find_by_chat_id("chat-1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.chat_id, "chat-1");
    }

    #[tokio::test]
    async fn setting_active_wallet_deactivates_others() {
        let repo = SqliteRepositories::in_memory().unwrap();
        let user = repo.create("chat-2").await.unwrap();
        let w1 = repo
            .insert(&Wallet {
                id: 0,
                user_id: user.id,
                public_address: "addr1".to_string(),
                encrypted_key_blob: "blob1".to_string(),
                chain: "solana".to_string(),
                active: true,
            })
            .await
            .unwrap();
        let w2 = repo
            .insert(&Wallet {
                id: 0,
                user_id: user.id,
                public_address: "addr2".to_string(),
                encrypted_key_blob: "blob2".to_string(),
                chain: "solana".to_string(),
                active: false,
            })
            .await
            .unwrap();

        repo.set_active(user.id, w2.id).await.unwrap();
        let active = repo.active_for_user(user.id).await.unwrap().unwrap();
        assert_eq!(active.id, w2.id);
        let _ = w1;
    }

    #[tokio::test]
    async fn order_insert_update_and_find() {
        let repo = SqliteRepositories::in_memory().unwrap();
        let user = repo.create("chat-3").await.unwrap();
        let order = repo
            .insert(&Order {
                id: 0,
                user_id: user.id,
                token_mint: "MINT".to_string(),
                side: OrderSide::Buy,
                amount_in: 0.5,
                status: OrderStatus::Pending,
                signature: None,
                commission_usd: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        repo.update_status(order.id, OrderStatus::Filled, Some("sig".to_string()), Some(0.12))
            .await
            .unwrap();

        let found = repo.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(found.status, OrderStatus::Filled);
        assert_eq!(found.signature.as_deref(), Some("sig"));
    }

    #[tokio::test]
    async fn position_insert_and_find_open() {
        let repo = SqliteRepositories::in_memory().unwrap();
        let user = repo.create("chat-4").await.unwrap();
        repo.insert(&Position {
            id: 0,
            user_id: user.id,
            token_mint: "MINT".to_string(),
            entry_amount_in: 1.0,
            entry_amount_out: 1000.0,
            tp_pct: Some(50.0),
            sl_pct: Some(20.0),
            trailing_stop_pct: None,
            highest_observed_price: 0.001,
            status: PositionStatus::Open,
        })
        .await
        .unwrap();

        let open = repo.find_open().await.unwrap();
        assert_eq!(open.len(), 1);
    }
}
