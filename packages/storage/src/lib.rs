// ABOUTME: Crosspost storage library providing the SQLite pool and identity tables
// ABOUTME: Owns schema migrations plus user and session storage

pub mod db;
pub mod error;
pub mod users;

pub use db::{data_dir, init_pool, init_pool_at};
pub use error::StorageError;
pub use users::{NewUser, Session, User, UserStorage};
