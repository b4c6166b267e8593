/*
 * Responsibility
 * - SQLx operations for the assignments table
 * - Only what the gated mutation routes need; full assignment CRUD lives
 *   with the course-management handlers
 */
use sqlx::PgPool;
use uuid::Uuid;

use crate::repos::error::RepoError;

pub async fn delete(db: &PgPool, assignment_id: Uuid) -> Result<bool, RepoError> {
    let result = sqlx::query(
        r#"
        DELETE FROM assignments
        WHERE "assignmentId" = $1
        "#,
    )
    .bind(assignment_id)
    .execute(db)
    .await?;

    Ok(result.rows_affected() > 0)
}
