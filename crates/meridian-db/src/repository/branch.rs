//! # Branch Repository
//!
//! Stores, warehouses, and the special repair/discard locations.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use meridian_core::{Branch, BranchKind};

const BRANCH_COLUMNS: &str = "id, code, name, kind, is_active, created_at";

/// Repository for branch database operations.
#[derive(Debug)]
pub struct BranchRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> BranchRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        BranchRepository { conn }
    }

    pub async fn insert(&mut self, branch: &Branch) -> DbResult<()> {
        debug!(id = %branch.id, code = %branch.code, kind = ?branch.kind, "Inserting branch");

        sqlx::query(
            r#"
            INSERT INTO branches (id, code, name, kind, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&branch.id)
        .bind(&branch.code)
        .bind(&branch.name)
        .bind(branch.kind)
        .bind(branch.is_active)
        .bind(branch.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<Branch>> {
        let sql = format!("SELECT {} FROM branches WHERE id = ?1", BRANCH_COLUMNS);
        let branch = sqlx::query_as::<_, Branch>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(branch)
    }

    pub async fn get_by_code(&mut self, code: &str) -> DbResult<Option<Branch>> {
        let sql = format!("SELECT {} FROM branches WHERE code = ?1", BRANCH_COLUMNS);
        let branch = sqlx::query_as::<_, Branch>(&sql)
            .bind(code)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(branch)
    }

    pub async fn list(&mut self, active_only: bool) -> DbResult<Vec<Branch>> {
        let sql = format!(
            "SELECT {} FROM branches WHERE (?1 = 0 OR is_active = 1) ORDER BY code",
            BRANCH_COLUMNS
        );
        let branches = sqlx::query_as::<_, Branch>(&sql)
            .bind(active_only)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(branches)
    }

    /// The oldest active branch of `kind` (ties broken by code).
    ///
    /// Used to locate the repair and discard branches.
    pub async fn first_of_kind(&mut self, kind: BranchKind) -> DbResult<Option<Branch>> {
        let sql = format!(
            r#"
            SELECT {} FROM branches
            WHERE kind = ?1 AND is_active = 1
            ORDER BY created_at, code
            LIMIT 1
            "#,
            BRANCH_COLUMNS
        );
        let branch = sqlx::query_as::<_, Branch>(&sql)
            .bind(kind)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(branch)
    }

    pub async fn set_active(&mut self, id: &str, active: bool) -> DbResult<bool> {
        let result = sqlx::query("UPDATE branches SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(active)
            .execute(&mut *self.conn)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig, DbError, Repositories};
    use chrono::{Duration, Utc};
    use meridian_core::{Branch, BranchKind};

    fn branch(id: &str, code: &str, kind: BranchKind) -> Branch {
        Branch {
            id: id.to_string(),
            code: code.to_string(),
            name: code.to_string(),
            kind,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_code_is_unique_violation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();

        uow.branches()
            .insert(&branch("b-1", "MAIN", BranchKind::Store))
            .await
            .unwrap();
        let err = uow
            .branches()
            .insert(&branch("b-2", "MAIN", BranchKind::Store))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));
    }

    #[tokio::test]
    async fn test_first_of_kind_skips_inactive_and_prefers_oldest() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut uow = db.begin().await.unwrap();

        let mut old = branch("r-1", "RPR1", BranchKind::Repair);
        old.created_at = Utc::now() - Duration::days(2);
        let newer = branch("r-2", "RPR2", BranchKind::Repair);
        uow.branches().insert(&old).await.unwrap();
        uow.branches().insert(&newer).await.unwrap();

        let found = uow.branches().first_of_kind(BranchKind::Repair).await.unwrap();
        assert_eq!(found.unwrap().id, "r-1");

        uow.branches().set_active("r-1", false).await.unwrap();
        let found = uow.branches().first_of_kind(BranchKind::Repair).await.unwrap();
        assert_eq!(found.unwrap().id, "r-2");

        assert!(uow
            .branches()
            .first_of_kind(BranchKind::Discard)
            .await
            .unwrap()
            .is_none());
    }
}
