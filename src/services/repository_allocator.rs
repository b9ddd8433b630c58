//! RepositoryAllocator — round-robin choice of the destination repository.
//!
//! The rotation pointer is a single row in `repo_rotation`, shared by every
//! server instance using the same database. Each allocation advances the
//! pointer with one `UPDATE … RETURNING` statement, so the read and the
//! write happen under the same SQLite write lock. Concurrent allocations are
//! serialized and never hand out the same index twice, and an allocation
//! dropped mid-flight leaves no transaction open behind it.

use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AllocationError {
    #[error("metadata store unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),
    #[error("repository rotation state is missing")]
    RotationStateMissing,
}

#[derive(Clone)]
pub struct RepositoryAllocator {
    db: Arc<SqlitePool>,
    repositories: Arc<[String]>,
}

impl RepositoryAllocator {
    /// `repositories` must be non-empty; configuration parsing guarantees it.
    pub fn new(db: Arc<SqlitePool>, repositories: Vec<String>) -> Self {
        debug_assert!(!repositories.is_empty());
        Self {
            db,
            repositories: repositories.into(),
        }
    }

    pub fn repositories(&self) -> &[String] {
        &self.repositories
    }

    /// Atomically take the next rotation index and advance the pointer.
    pub async fn allocate_next(&self) -> Result<usize, AllocationError> {
        let n = self.repositories.len() as i64;
        let next = sqlx::query_scalar::<_, i64>(
            "UPDATE repo_rotation SET num = (num % ? + 1) % ? WHERE id = 1 RETURNING num",
        )
        .bind(n)
        .bind(n)
        .fetch_optional(&*self.db)
        .await?
        .ok_or(AllocationError::RotationStateMissing)?;

        let idx = (next + n - 1) % n;
        tracing::debug!("allocated repository index {} of {}", idx, n);
        Ok(idx as usize)
    }

    /// Allocate and resolve the repository name in one step.
    pub async fn allocate_repository(&self) -> Result<String, AllocationError> {
        let idx = self.allocate_next().await?;
        Ok(self.repositories[idx].clone())
    }

    /// Current pointer value, without advancing it.
    pub async fn peek(&self) -> Result<i64, AllocationError> {
        sqlx::query_scalar::<_, i64>("SELECT num FROM repo_rotation WHERE id = 1")
            .fetch_optional(&*self.db)
            .await?
            .ok_or(AllocationError::RotationStateMissing)
    }
}
