pub mod bootstrap;
pub mod pool;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::signature::SignatureVerifier;
use crate::config::Config;

/// Shared handles, injected into handlers via axum state. The pool is
/// acquired once at startup and owned here; nothing holds a global
/// connection.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub verifier: Arc<dyn SignatureVerifier>,
    pub config: Arc<Config>,
}
