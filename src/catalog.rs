//! Durable asset state.
//!
//! The transcode pipeline owns exactly two durable facts about an asset: the
//! `processing` flag (set when a job is queued, cleared on success) and the
//! asset's existence (deleted on terminal failure). Manifest reads also bump
//! a view counter.

use async_trait::async_trait;
use cliphost_common::AssetId;
use cliphost_db::pool::{get_conn, DbPool, PooledConnection};
use cliphost_db::queries::assets;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Database(#[from] cliphost_common::Error),

    #[error("catalog task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait AssetCatalog: Send + Sync + 'static {
    /// Assets left flagged as processing.
    async fn list_processing(&self) -> Result<Vec<AssetId>, CatalogError>;

    /// Create the asset if needed and flag it as processing.
    async fn mark_processing(&self, asset: AssetId) -> Result<(), CatalogError>;

    async fn set_processing(&self, asset: AssetId, processing: bool) -> Result<(), CatalogError>;

    async fn delete_asset(&self, asset: AssetId) -> Result<(), CatalogError>;

    /// Best-effort view counter bump.
    async fn increment_views(&self, asset: AssetId) -> Result<(), CatalogError>;
}

/// [`AssetCatalog`] backed by the SQLite pool.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: DbPool,
}

impl SqliteCatalog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(&PooledConnection) -> cliphost_common::Result<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = get_conn(&pool)?;
            f(&conn)
        })
        .await?;
        Ok(result?)
    }
}

#[async_trait]
impl AssetCatalog for SqliteCatalog {
    async fn list_processing(&self) -> Result<Vec<AssetId>, CatalogError> {
        self.with_conn(|conn| assets::list_processing(conn)).await
    }

    async fn mark_processing(&self, asset: AssetId) -> Result<(), CatalogError> {
        self.with_conn(move |conn| assets::mark_processing(conn, asset))
            .await
    }

    async fn set_processing(&self, asset: AssetId, processing: bool) -> Result<(), CatalogError> {
        self.with_conn(move |conn| assets::set_processing(conn, asset, processing))
            .await
    }

    async fn delete_asset(&self, asset: AssetId) -> Result<(), CatalogError> {
        self.with_conn(move |conn| assets::delete_asset(conn, asset).map(|_| ()))
            .await
    }

    async fn increment_views(&self, asset: AssetId) -> Result<(), CatalogError> {
        self.with_conn(move |conn| assets::increment_views(conn, asset).map(|_| ()))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cliphost_db::pool::init_memory_pool;

    #[tokio::test]
    async fn test_sqlite_catalog_flow() {
        let pool = init_memory_pool().unwrap();
        let catalog = SqliteCatalog::new(pool.clone());
        let asset = AssetId::new();

        catalog.mark_processing(asset).await.unwrap();
        assert_eq!(catalog.list_processing().await.unwrap(), vec![asset]);

        catalog.increment_views(asset).await.unwrap();
        catalog.set_processing(asset, false).await.unwrap();
        assert!(catalog.list_processing().await.unwrap().is_empty());

        let conn = get_conn(&pool).unwrap();
        assert_eq!(assets::get_asset(&conn, asset).unwrap().views, 1);
        drop(conn);

        catalog.delete_asset(asset).await.unwrap();
        let conn = get_conn(&pool).unwrap();
        assert!(assets::find_asset(&conn, asset).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_processing_unknown_asset_errors() {
        let catalog = SqliteCatalog::new(init_memory_pool().unwrap());
        let err = catalog.set_processing(AssetId::new(), false).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::Database(cliphost_common::Error::NotFound(_))
        ));
    }
}
