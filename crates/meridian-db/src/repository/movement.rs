//! # Movement Repository
//!
//! The append-only movement log. Rows are inserted by the ledger in the same
//! transaction as the stock change they describe; triggers reject any
//! UPDATE or DELETE.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use crate::error::DbResult;
use meridian_core::{MovementRecord, MovementReference, MovementType, ReferenceKind};

/// Stored shape of a movement: the reference is split into two columns.
#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    product_id: String,
    variant_id: Option<String>,
    from_branch_id: Option<String>,
    to_branch_id: Option<String>,
    movement_type: MovementType,
    quantity: i64,
    reference_kind: ReferenceKind,
    reference_id: String,
    actor_id: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MovementRow> for MovementRecord {
    fn from(row: MovementRow) -> Self {
        MovementRecord {
            id: row.id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            from_branch_id: row.from_branch_id,
            to_branch_id: row.to_branch_id,
            movement_type: row.movement_type,
            quantity: row.quantity,
            reference: MovementReference::from_parts(row.reference_kind, row.reference_id),
            actor_id: row.actor_id,
            note: row.note,
            created_at: row.created_at,
        }
    }
}

/// Query filter for the movement history.
///
/// `branch_id` matches either side of a movement.
#[derive(Debug, Clone, Default)]
pub struct MovementFilter {
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
    pub branch_id: Option<String>,
    pub movement_type: Option<MovementType>,
    pub reference: Option<MovementReference>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

#[derive(Debug)]
pub struct MovementRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> MovementRepository<'c> {
    pub(crate) fn new(conn: &'c mut SqliteConnection) -> Self {
        MovementRepository { conn }
    }

    pub(crate) async fn insert(&mut self, movement: &MovementRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stock_movements (
                id, product_id, variant_id, from_branch_id, to_branch_id,
                movement_type, quantity, reference_kind, reference_id,
                actor_id, note, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.product_id)
        .bind(&movement.variant_id)
        .bind(&movement.from_branch_id)
        .bind(&movement.to_branch_id)
        .bind(movement.movement_type)
        .bind(movement.quantity)
        .bind(movement.reference.kind())
        .bind(movement.reference.id())
        .bind(&movement.actor_id)
        .bind(&movement.note)
        .bind(movement.created_at)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Movements matching `filter`, oldest first.
    pub async fn list(&mut self, filter: &MovementFilter) -> DbResult<Vec<MovementRecord>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, product_id, variant_id, from_branch_id, to_branch_id, movement_type, \
             quantity, reference_kind, reference_id, actor_id, note, created_at \
             FROM stock_movements WHERE 1 = 1",
        );

        if let Some(product_id) = &filter.product_id {
            qb.push(" AND product_id = ").push_bind(product_id.clone());
        }
        if let Some(variant_id) = &filter.variant_id {
            qb.push(" AND variant_id = ").push_bind(variant_id.clone());
        }
        if let Some(branch_id) = &filter.branch_id {
            qb.push(" AND (from_branch_id = ")
                .push_bind(branch_id.clone())
                .push(" OR to_branch_id = ")
                .push_bind(branch_id.clone())
                .push(")");
        }
        if let Some(movement_type) = filter.movement_type {
            qb.push(" AND movement_type = ").push_bind(movement_type);
        }
        if let Some(reference) = &filter.reference {
            qb.push(" AND reference_kind = ")
                .push_bind(reference.kind())
                .push(" AND reference_id = ")
                .push_bind(reference.id().to_string());
        }
        if let Some(since) = filter.since {
            qb.push(" AND created_at >= ").push_bind(since);
        }

        // rowid breaks ties between movements written in the same unit
        qb.push(" ORDER BY created_at, rowid");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb
            .build_query_as::<MovementRow>()
            .fetch_all(&mut *self.conn)
            .await?;

        Ok(rows.into_iter().map(MovementRecord::from).collect())
    }

    /// Every movement caused by one record (a sale, transfer, ...).
    pub async fn for_reference(
        &mut self,
        reference: &MovementReference,
    ) -> DbResult<Vec<MovementRecord>> {
        self.list(&MovementFilter {
            reference: Some(reference.clone()),
            ..MovementFilter::default()
        })
        .await
    }
}
