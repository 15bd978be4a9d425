use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use super::{first_row, only_row};
use crate::{
    db_types::{
        Cents,
        Decision,
        Dispute,
        DisputeId,
        DisputeMessage,
        DisputeReason,
        DisputeStatus,
        NewDispute,
        Priority,
        Resolution,
        TransactionId,
    },
    traits::{DisputeUpdate, NewDisputeMessage},
};

#[derive(Debug, Clone, FromRow)]
struct DisputeRow {
    id: DisputeId,
    transaction_id: TransactionId,
    initiator_id: String,
    reason: DisputeReason,
    description: String,
    status: DisputeStatus,
    priority: Priority,
    assignee_id: Option<String>,
    decision: Option<Decision>,
    refund_amount: Option<Cents>,
    resolution_reason: Option<String>,
    resolver_id: Option<String>,
    resolved_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DisputeRow> for Dispute {
    fn from(row: DisputeRow) -> Self {
        let resolution = match (row.decision, row.resolver_id, row.resolved_at) {
            (Some(decision), Some(resolver_id), Some(resolved_at)) => Some(Resolution {
                decision,
                refund_amount: row.refund_amount,
                reason: row.resolution_reason.unwrap_or_default(),
                resolver_id,
                resolved_at,
            }),
            _ => None,
        };
        Self {
            id: row.id,
            transaction_id: row.transaction_id,
            initiator_id: row.initiator_id,
            reason: row.reason,
            description: row.description,
            status: row.status,
            priority: row.priority,
            assignee_id: row.assignee_id,
            resolution,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Inserts a dispute in `open`. Fails with a unique-constraint violation if the transaction already has an open
/// dispute.
pub async fn insert_dispute(dispute: NewDispute, conn: &mut SqliteConnection) -> Result<Dispute, sqlx::Error> {
    let row: DisputeRow = sqlx::query_as(
        r#"
            INSERT INTO disputes
                (id, transaction_id, initiator_id, reason, description, status, priority, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING *;
        "#,
    )
    .bind(dispute.id)
    .bind(dispute.transaction_id)
    .bind(dispute.initiator_id)
    .bind(dispute.reason)
    .bind(dispute.description)
    .bind(DisputeStatus::Open)
    .bind(dispute.priority)
    .bind(dispute.created_at)
    .fetch_all(conn)
    .await
    .and_then(only_row)?;
    debug!("🗃️ Dispute {} opened against transaction {}", row.id, row.transaction_id);
    Ok(row.into())
}

pub async fn fetch_dispute(id: &DisputeId, conn: &mut SqliteConnection) -> Result<Option<Dispute>, sqlx::Error> {
    let row: Option<DisputeRow> =
        sqlx::query_as("SELECT * FROM disputes WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(row.map(Dispute::from))
}

pub async fn fetch_open_dispute_for_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    let row: Option<DisputeRow> = sqlx::query_as(
        "SELECT * FROM disputes WHERE transaction_id = $1 AND status IN ('open', 'under_review', 'escalated')",
    )
    .bind(id.as_str())
    .fetch_optional(conn)
    .await?;
    Ok(row.map(Dispute::from))
}

pub async fn fetch_disputes_for_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Vec<Dispute>, sqlx::Error> {
    let rows: Vec<DisputeRow> =
        sqlx::query_as("SELECT * FROM disputes WHERE transaction_id = $1 ORDER BY created_at ASC, rowid ASC")
            .bind(id.as_str())
            .fetch_all(conn)
            .await?;
    Ok(rows.into_iter().map(Dispute::from).collect())
}

/// Applies the update if the dispute is in one of its source statuses. Assignee and priority are only overwritten
/// when the update carries them.
pub async fn update_status(
    id: &DisputeId,
    update: &DisputeUpdate,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    if update.from.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE disputes SET status = ");
    builder.push_bind(update.to);
    builder.push(", updated_at = ");
    builder.push_bind(update.updated_at);
    if let Some(assignee) = &update.assignee_id {
        builder.push(", assignee_id = ");
        builder.push_bind(assignee.as_str());
    }
    if let Some(priority) = update.priority {
        builder.push(", priority = ");
        builder.push_bind(priority);
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id.as_str());
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in &update.from {
        statuses.push_bind(*status);
    }
    statuses.push_unseparated(") RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let row: Option<DisputeRow> = builder.build_query_as().fetch_all(conn).await.map(first_row)?;
    Ok(row.map(Dispute::from))
}

/// `under_review → resolved`, recording the resolution.
pub async fn record_resolution(
    id: &DisputeId,
    resolution: &Resolution,
    conn: &mut SqliteConnection,
) -> Result<Option<Dispute>, sqlx::Error> {
    let row: Option<DisputeRow> = sqlx::query_as(
        r#"
            UPDATE disputes SET
                status = $1,
                decision = $2,
                refund_amount = $3,
                resolution_reason = $4,
                resolver_id = $5,
                resolved_at = $6,
                updated_at = $6
            WHERE id = $7 AND status = $8
            RETURNING *;
        "#,
    )
    .bind(DisputeStatus::Resolved)
    .bind(resolution.decision)
    .bind(resolution.refund_amount)
    .bind(resolution.reason.as_str())
    .bind(resolution.resolver_id.as_str())
    .bind(resolution.resolved_at)
    .bind(id.as_str())
    .bind(DisputeStatus::UnderReview)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(row.map(Dispute::from))
}

/// Appends a message, unless the dispute is closed. Returns `None` if nothing was written.
pub async fn insert_message(
    message: NewDisputeMessage,
    conn: &mut SqliteConnection,
) -> Result<Option<DisputeMessage>, sqlx::Error> {
    let message = sqlx::query_as(
        r#"
            INSERT INTO dispute_messages (dispute_id, author_id, author_role, body, created_at)
            SELECT $1, $2, $3, $4, $5
            WHERE EXISTS (SELECT 1 FROM disputes WHERE id = $1 AND status != $6)
            RETURNING *;
        "#,
    )
    .bind(message.dispute_id)
    .bind(message.author_id)
    .bind(message.author_role)
    .bind(message.body)
    .bind(message.created_at)
    .bind(DisputeStatus::Closed)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(message)
}

pub async fn fetch_messages(id: &DisputeId, conn: &mut SqliteConnection) -> Result<Vec<DisputeMessage>, sqlx::Error> {
    let messages = sqlx::query_as("SELECT * FROM dispute_messages WHERE dispute_id = $1 ORDER BY id ASC")
        .bind(id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(messages)
}
