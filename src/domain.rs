//! Core persistent entities. These are the shapes the persistence
//! gateway reads and writes; components operate on them by value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
}

/// Exactly one active wallet per user (enforced by the repository, not here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    pub id: i64,
    pub user_id: i64,
    pub public_address: String,
    /// Colon-joined base64 `{salt}:{iv}:{tag}:{ciphertext}`. The plaintext
    /// key is never represented by this struct.
    pub encrypted_key_blob: String,
    pub chain: String,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
    Swap,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "buy",
            OrderSide::Sell => "sell",
            OrderSide::Swap => "swap",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Filled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub token_mint: String,
    pub side: OrderSide,
    pub amount_in: f64,
    pub status: OrderStatus,
    pub signature: Option<String>,
    pub commission_usd: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Open,
    Exiting,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: i64,
    pub user_id: i64,
    pub token_mint: String,
    pub entry_amount_in: f64,
    pub entry_amount_out: f64,
    pub tp_pct: Option<f64>,
    pub sl_pct: Option<f64>,
    pub trailing_stop_pct: Option<f64>,
    pub highest_observed_price: f64,
    pub status: PositionStatus,
}

impl Position {
    pub fn entry_price(&self) -> f64 {
        if self.entry_amount_in <= 0.0 {
            0.0
        } else {
            self.entry_amount_out / self.entry_amount_in
        }
    }

    pub fn has_rule(&self) -> bool {
        self.tp_pct.is_some() || self.sl_pct.is_some() || self.trailing_stop_pct.is_some()
    }
}
