//! Persistence Gateway: one repository trait per entity, an
//! implementation-agnostic boundary between domain logic and storage.
//!
//! Grounded on `database_tracker.rs`'s `Arc<Mutex<Connection>>` +
//! parameterized-query shape; see `sqlite_repo.rs` for the one concrete
//! implementation.

mod sqlite_repo;

pub use sqlite_repo::SqliteRepositories;

use async_trait::async_trait;

use crate::domain::{Order, Position, User, Wallet};
use crate::errors::RepositoryError;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_chat_id(&self, chat_id: &str) -> Result<Option<User>, RepositoryError>;
    async fn create(&self, chat_id: &str) -> Result<User, RepositoryError>;
}

#[async_trait]
pub trait WalletRepository: Send + Sync {
    async fn active_for_user(&self, user_id: i64) -> Result<Option<Wallet>, RepositoryError>;
    async fn insert(&self, wallet: &Wallet) -> Result<Wallet, RepositoryError>;
    /// Deactivates every other wallet for the user, enforcing the
    /// "exactly one active wallet" invariant.
    async fn set_active(&self, user_id: i64, wallet_id: i64) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<Order, RepositoryError>;
    async fn update_status(
        &self,
        order_id: i64,
        status: crate::domain::OrderStatus,
        signature: Option<String>,
        commission_usd: Option<f64>,
    ) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, order_id: i64) -> Result<Option<Order>, RepositoryError>;
}

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn insert(&self, position: &Position) -> Result<Position, RepositoryError>;
    async fn find_open(&self) -> Result<Vec<Position>, RepositoryError>;
    async fn update(&self, position: &Position) -> Result<(), RepositoryError>;
}
