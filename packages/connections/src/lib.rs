// ABOUTME: Crosspost connections library: OAuth handshake and connected accounts
// ABOUTME: Provider definitions, flow manager, and SQLite-backed record storage

pub mod error;
pub mod manager;
pub mod provider;
pub mod storage;
pub mod types;

// Re-export main types
pub use error::{ConnectionError, ConnectionResult};
pub use manager::{ConnectionManager, PENDING_TTL_SECS};
pub use provider::{Provider, ProviderConfig};
pub use storage::ConnectionStorage;
pub use types::{CallbackParams, Connection, PendingAuthorization, TokenResponse};
