/*
 * Responsibility
 * - Storage collaborator for the authorization gate: provider metadata
 *   (domain, jwksUrl) keyed via the course -> provider association
 * - SQLx Postgres implementation + in-memory implementation for tests
 * - The gate reads only; provider registration is owned elsewhere
 */
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::repos::error::RepoError;

#[derive(Debug, Clone, FromRow)]
pub struct ProviderRecord {
    #[sqlx(rename = "providerId")]
    pub id: Uuid,
    /// Origin URL the provider registered; issuer/audience claims are
    /// compared against it.
    #[sqlx(rename = "domain")]
    pub domain: String,
    #[sqlx(rename = "jwksUrl")]
    pub jwks_url: Option<String>,
}

/// Lookup interface the gate depends on, injectable so tests never need a
/// database.
#[async_trait]
pub trait CourseProviderStore: Send + Sync {
    async fn get_provider_for_course(
        &self,
        course_id: &str,
    ) -> Result<Option<ProviderRecord>, RepoError>;
}

pub struct PgProviderStore {
    db: PgPool,
}

impl PgProviderStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CourseProviderStore for PgProviderStore {
    async fn get_provider_for_course(
        &self,
        course_id: &str,
    ) -> Result<Option<ProviderRecord>, RepoError> {
        let row = sqlx::query_as::<_, ProviderRecord>(
            r#"
            SELECT p."providerId", p."domain", p."jwksUrl"
            FROM providers p
            JOIN courses c ON c."providerId" = p."providerId"
            WHERE c."courseId" = $1
            "#,
        )
        .bind(course_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row)
    }
}

/// In-memory store for gate tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryProviderStore {
    courses: std::collections::HashMap<String, ProviderRecord>,
}

#[cfg(test)]
impl MemoryProviderStore {
    pub fn with_course(mut self, course_id: &str, provider: ProviderRecord) -> Self {
        self.courses.insert(course_id.to_string(), provider);
        self
    }
}

#[cfg(test)]
#[async_trait]
impl CourseProviderStore for MemoryProviderStore {
    async fn get_provider_for_course(
        &self,
        course_id: &str,
    ) -> Result<Option<ProviderRecord>, RepoError> {
        Ok(self.courses.get(course_id).cloned())
    }
}
