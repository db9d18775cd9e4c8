use sqlx::PgPool;
use std::sync::Arc;

use crate::config::UploadLimits;
use crate::services::storage::BlobStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub storage: Arc<dyn BlobStore>,
    pub upload_limits: UploadLimits,
}

impl AppState {
    pub fn new(db: PgPool, storage: impl BlobStore + 'static, upload_limits: UploadLimits) -> Self {
        Self {
            db,
            storage: Arc::new(storage),
            upload_limits,
        }
    }
}
