//! # Register Repository
//!
//! Cash register sessions and the cash movements booked against them.
//!
//! At most one session per user is `open`; the partial unique index
//! `idx_register_sessions_one_open` rejects a second one even if two opens
//! race past the service-level check. That violation surfaces as
//! `CoreError::RegisterAlreadyOpen`.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use meridian_core::{CashMovement, CoreError, RegisterSession};

const SESSION_COLUMNS: &str = "id, branch_id, user_id, status, opening_balance_cents, \
     closing_balance_cents, expected_balance_cents, difference_cents, notes, opened_at, closed_at";

const MOVEMENT_COLUMNS: &str =
    "id, session_id, kind, amount_cents, reference_id, note, actor_id, created_at";

#[derive(Debug)]
pub struct RegisterRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> RegisterRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        RegisterRepository { conn }
    }

    pub async fn insert_session(&mut self, session: &RegisterSession) -> DbResult<()> {
        debug!(
            id = %session.id,
            user_id = %session.user_id,
            branch_id = %session.branch_id,
            "Opening register session"
        );

        let result = sqlx::query(
            r#"
            INSERT INTO register_sessions (
                id, branch_id, user_id, status, opening_balance_cents,
                closing_balance_cents, expected_balance_cents, difference_cents,
                notes, opened_at, closed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&session.id)
        .bind(&session.branch_id)
        .bind(&session.user_id)
        .bind(session.status)
        .bind(session.opening_balance_cents)
        .bind(session.closing_balance_cents)
        .bind(session.expected_balance_cents)
        .bind(session.difference_cents)
        .bind(&session.notes)
        .bind(session.opened_at)
        .bind(session.closed_at)
        .execute(&mut *self.conn)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) => {
                let err = DbError::from(err);
                if !err.is_unique_violation_on("register_sessions.user_id") {
                    return Err(err);
                }
                let existing = self
                    .open_for_user(&session.user_id)
                    .await?
                    .map(|s| s.id)
                    .unwrap_or_default();
                Err(DbError::Core(CoreError::RegisterAlreadyOpen {
                    session_id: existing,
                }))
            }
        }
    }

    pub async fn get(&mut self, id: &str) -> DbResult<Option<RegisterSession>> {
        let sql = format!("SELECT {} FROM register_sessions WHERE id = ?1", SESSION_COLUMNS);
        let session = sqlx::query_as::<_, RegisterSession>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(session)
    }

    /// The user's open session, if any.
    pub async fn open_for_user(&mut self, user_id: &str) -> DbResult<Option<RegisterSession>> {
        let sql = format!(
            "SELECT {} FROM register_sessions WHERE user_id = ?1 AND status = 'open'",
            SESSION_COLUMNS
        );
        let session = sqlx::query_as::<_, RegisterSession>(&sql)
            .bind(user_id)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(session)
    }

    /// Sessions at a branch, newest first.
    pub async fn list_for_branch(
        &mut self,
        branch_id: &str,
        limit: u32,
    ) -> DbResult<Vec<RegisterSession>> {
        let sql = format!(
            "SELECT {} FROM register_sessions WHERE branch_id = ?1 ORDER BY opened_at DESC LIMIT ?2",
            SESSION_COLUMNS
        );
        let sessions = sqlx::query_as::<_, RegisterSession>(&sql)
            .bind(branch_id)
            .bind(limit)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(sessions)
    }

    /// Writes the closing columns.
    pub async fn update_close(&mut self, session: &RegisterSession) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE register_sessions SET
                status = ?2,
                closing_balance_cents = ?3,
                expected_balance_cents = ?4,
                difference_cents = ?5,
                notes = ?6,
                closed_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(&session.id)
        .bind(session.status)
        .bind(session.closing_balance_cents)
        .bind(session.expected_balance_cents)
        .bind(session.difference_cents)
        .bind(&session.notes)
        .bind(session.closed_at)
        .execute(&mut *self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("register session", &session.id));
        }
        Ok(())
    }

    pub async fn insert_movement(&mut self, movement: &CashMovement) -> DbResult<()> {
        debug!(
            session_id = %movement.session_id,
            kind = ?movement.kind,
            amount_cents = movement.amount_cents,
            "Recording cash movement"
        );

        sqlx::query(
            r#"
            INSERT INTO cash_movements (
                id, session_id, kind, amount_cents, reference_id, note, actor_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.session_id)
        .bind(movement.kind)
        .bind(movement.amount_cents)
        .bind(&movement.reference_id)
        .bind(&movement.note)
        .bind(&movement.actor_id)
        .bind(movement.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// A session's cash movements, oldest first.
    pub async fn movements(&mut self, session_id: &str) -> DbResult<Vec<CashMovement>> {
        let sql = format!(
            "SELECT {} FROM cash_movements WHERE session_id = ?1 ORDER BY created_at, rowid",
            MOVEMENT_COLUMNS
        );
        let movements = sqlx::query_as::<_, CashMovement>(&sql)
            .bind(session_id)
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(movements)
    }
}
