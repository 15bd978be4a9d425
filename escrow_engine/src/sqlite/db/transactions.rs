use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use super::{first_row, only_row};
use crate::{
    db_types::{
        Cents,
        DisputeId,
        FeeBreakdown,
        FeeRate,
        ListingId,
        LocationSample,
        Party,
        Transaction,
        TransactionHistoryEntry,
        TransactionId,
        TransactionRecord,
        TransactionStatus,
    },
    helpers::ProximityResult,
    traits::SettlementError,
};

/// The flat row layout of the `transactions` table. Fee and location columns are folded into their structs on the
/// way out.
#[derive(Debug, Clone, FromRow)]
struct TransactionRow {
    id: TransactionId,
    listing_id: ListingId,
    buyer_id: String,
    seller_id: String,
    amount: Cents,
    flat_fee: Cents,
    percentage_fee: Cents,
    total_fee: Cents,
    total_charge: Cents,
    seller_payout: Cents,
    fee_rate_bps: FeeRate,
    currency: String,
    payment_intent_id: String,
    status: TransactionStatus,
    proximity_verified: bool,
    proximity_distance_m: Option<f64>,
    proximity_verified_at: Option<DateTime<Utc>>,
    buyer_confirmed: bool,
    seller_confirmed: bool,
    buyer_lat: Option<f64>,
    buyer_lng: Option<f64>,
    buyer_accuracy_m: Option<f64>,
    buyer_located_at: Option<DateTime<Utc>>,
    seller_lat: Option<f64>,
    seller_lng: Option<f64>,
    seller_accuracy_m: Option<f64>,
    seller_located_at: Option<DateTime<Utc>>,
    dispute_id: Option<DisputeId>,
    status_before_dispute: Option<TransactionStatus>,
    funds_release_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    refunded_at: Option<DateTime<Utc>>,
}

fn location(
    lat: Option<f64>,
    lng: Option<f64>,
    accuracy_m: Option<f64>,
    recorded_at: Option<DateTime<Utc>>,
) -> Option<LocationSample> {
    match (lat, lng, recorded_at) {
        (Some(lat), Some(lng), Some(recorded_at)) => Some(LocationSample { lat, lng, accuracy_m, recorded_at }),
        _ => None,
    }
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            listing_id: row.listing_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            amount: row.amount,
            fees: FeeBreakdown {
                flat_fee: row.flat_fee,
                percentage_fee: row.percentage_fee,
                total_fee: row.total_fee,
                total_charge: row.total_charge,
                seller_payout: row.seller_payout,
                rate: row.fee_rate_bps,
            },
            currency: row.currency,
            payment_intent_id: row.payment_intent_id,
            status: row.status,
            proximity_verified: row.proximity_verified,
            proximity_distance_m: row.proximity_distance_m,
            proximity_verified_at: row.proximity_verified_at,
            buyer_confirmed: row.buyer_confirmed,
            seller_confirmed: row.seller_confirmed,
            buyer_location: location(row.buyer_lat, row.buyer_lng, row.buyer_accuracy_m, row.buyer_located_at),
            seller_location: location(row.seller_lat, row.seller_lng, row.seller_accuracy_m, row.seller_located_at),
            dispute_id: row.dispute_id,
            status_before_dispute: row.status_before_dispute,
            funds_release_at: row.funds_release_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            paid_at: row.paid_at,
            delivered_at: row.delivered_at,
            completed_at: row.completed_at,
            refunded_at: row.refunded_at,
        }
    }
}

/// Inserts a new transaction in `pending`. This is not atomic on its own; the caller pairs it with the initial history
/// entry inside a database transaction.
pub async fn insert_transaction(
    record: TransactionRecord,
    conn: &mut SqliteConnection,
) -> Result<Transaction, SettlementError> {
    let fees = record.fees;
    let new_tx = record.new_transaction;
    let row: TransactionRow = sqlx::query_as(
        r#"
            INSERT INTO transactions (
                id,
                listing_id,
                buyer_id,
                seller_id,
                amount,
                flat_fee,
                percentage_fee,
                total_fee,
                total_charge,
                seller_payout,
                fee_rate_bps,
                currency,
                payment_intent_id,
                status,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15)
            RETURNING *;
        "#,
    )
    .bind(record.id)
    .bind(new_tx.listing_id)
    .bind(new_tx.buyer_id)
    .bind(new_tx.seller_id)
    .bind(new_tx.amount)
    .bind(fees.flat_fee)
    .bind(fees.percentage_fee)
    .bind(fees.total_fee)
    .bind(fees.total_charge)
    .bind(fees.seller_payout)
    .bind(fees.rate)
    .bind(record.currency)
    .bind(record.payment_intent_id)
    .bind(TransactionStatus::Pending)
    .bind(record.created_at)
    .fetch_all(conn)
    .await
    .and_then(only_row)?;
    debug!("🗃️ Transaction {} inserted for {}", row.id, row.total_charge);
    Ok(row.into())
}

pub async fn fetch_transaction(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> =
        sqlx::query_as("SELECT * FROM transactions WHERE id = $1").bind(id.as_str()).fetch_optional(conn).await?;
    Ok(row.map(Transaction::from))
}

pub async fn count_paid_for_seller(seller_id: &str, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM transactions WHERE seller_id = $1 AND paid_at IS NOT NULL")
            .bind(seller_id)
            .fetch_one(conn)
            .await?;
    Ok(count)
}

pub async fn insert_history(
    id: &TransactionId,
    from: Option<TransactionStatus>,
    to: TransactionStatus,
    note: &str,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO transaction_history (transaction_id, from_status, to_status, note, created_at) VALUES ($1, $2, \
         $3, $4, $5)",
    )
    .bind(id.as_str())
    .bind(from)
    .bind(to)
    .bind(note)
    .bind(at)
    .execute(conn)
    .await?;
    trace!("🗃️ History entry for {id}: {from:?} -> {to}. {note}");
    Ok(())
}

pub async fn fetch_history(
    id: &TransactionId,
    conn: &mut SqliteConnection,
) -> Result<Vec<TransactionHistoryEntry>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM transaction_history WHERE transaction_id = $1 ORDER BY id ASC")
        .bind(id.as_str())
        .fetch_all(conn)
        .await?;
    Ok(entries)
}

/// Builds the error for a conditional update that matched no rows: either the transaction does not exist, or it was
/// not in the expected source status.
pub async fn transition_error(
    id: &TransactionId,
    to: TransactionStatus,
    conn: &mut SqliteConnection,
) -> SettlementError {
    match fetch_transaction(id, conn).await {
        Ok(Some(tx)) => SettlementError::InvalidTransition { from: tx.status, to },
        Ok(None) => SettlementError::TransactionNotFound(id.clone()),
        Err(e) => e.into(),
    }
}

/// `pending → paid`. Returns `None` if the transaction was not `pending`.
pub async fn mark_paid(
    id: &TransactionId,
    paid_at: DateTime<Utc>,
    funds_release_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
            UPDATE transactions SET status = $1, paid_at = $2, funds_release_at = $3, updated_at = $2
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(TransactionStatus::Paid)
    .bind(paid_at)
    .bind(funds_release_at)
    .bind(id.as_str())
    .bind(TransactionStatus::Pending)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(row.map(Transaction::from))
}

/// Overwrites the party's location snapshot if the transaction is in `required`.
pub async fn save_location(
    id: &TransactionId,
    party: Party,
    sample: &LocationSample,
    required: TransactionStatus,
    updated_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    // `party` renders as a fixed column prefix, never user input
    let sql = format!(
        "UPDATE transactions SET {p}_lat = $1, {p}_lng = $2, {p}_accuracy_m = $3, {p}_located_at = $4, updated_at = \
         $5 WHERE id = $6 AND status = $7 RETURNING *",
        p = party.as_str()
    );
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(sample.lat)
        .bind(sample.lng)
        .bind(sample.accuracy_m)
        .bind(sample.recorded_at)
        .bind(updated_at)
        .bind(id.as_str())
        .bind(required)
        .fetch_all(conn)
        .await
        .map(first_row)?;
    Ok(row.map(Transaction::from))
}

/// `paid → delivered_pending_confirmation`, recording the proximity result.
pub async fn mark_delivered(
    id: &TransactionId,
    result: &ProximityResult,
    verified_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
            UPDATE transactions SET
                status = $1,
                proximity_verified = 1,
                proximity_distance_m = $2,
                proximity_verified_at = $3,
                delivered_at = $3,
                updated_at = $3
            WHERE id = $4 AND status = $5
            RETURNING *;
        "#,
    )
    .bind(TransactionStatus::DeliveredPendingConfirmation)
    .bind(result.distance_meters)
    .bind(verified_at)
    .bind(id.as_str())
    .bind(TransactionStatus::Paid)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(row.map(Transaction::from))
}

/// Sets the party's completion flag, provided the transaction is still awaiting confirmations.
pub async fn set_confirmation(
    id: &TransactionId,
    party: Party,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let sql = format!(
        "UPDATE transactions SET {p}_confirmed = 1, updated_at = $1 WHERE id = $2 AND status = $3 RETURNING *",
        p = party.as_str()
    );
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(at)
        .bind(id.as_str())
        .bind(TransactionStatus::DeliveredPendingConfirmation)
        .fetch_all(conn)
        .await
        .map(first_row)?;
    Ok(row.map(Transaction::from))
}

/// `delivered_pending_confirmation → completed`, only if both parties have confirmed.
pub async fn complete_if_confirmed(
    id: &TransactionId,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let row: Option<TransactionRow> = sqlx::query_as(
        r#"
            UPDATE transactions SET status = $1, completed_at = $2, updated_at = $2
            WHERE id = $3 AND status = $4 AND buyer_confirmed = 1 AND seller_confirmed = 1
            RETURNING *;
        "#,
    )
    .bind(TransactionStatus::Completed)
    .bind(at)
    .bind(id.as_str())
    .bind(TransactionStatus::DeliveredPendingConfirmation)
    .fetch_all(conn)
    .await
    .map(first_row)?;
    Ok(row.map(Transaction::from))
}

/// Moves the transaction into `disputed` if its status is one of `allowed_from`, remembering where it came from.
pub async fn mark_disputed(
    id: &TransactionId,
    dispute_id: &DisputeId,
    allowed_from: &[TransactionStatus],
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    if allowed_from.is_empty() {
        return Ok(None);
    }
    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE transactions SET status_before_dispute = status, status = ");
    builder.push_bind(TransactionStatus::Disputed);
    builder.push(", dispute_id = ");
    builder.push_bind(dispute_id.as_str());
    builder.push(", updated_at = ");
    builder.push_bind(at);
    builder.push(" WHERE id = ");
    builder.push_bind(id.as_str());
    builder.push(" AND status IN (");
    let mut statuses = builder.separated(", ");
    for status in allowed_from {
        statuses.push_bind(*status);
    }
    statuses.push_unseparated(") RETURNING *");
    trace!("🗃️ Executing query: {}", builder.sql());
    let row: Option<TransactionRow> = builder.build_query_as().fetch_all(conn).await.map(first_row)?;
    Ok(row.map(Transaction::from))
}

/// `disputed → completed | refunded`, stamping the matching timestamp.
pub async fn settle_disputed(
    id: &TransactionId,
    outcome: TransactionStatus,
    at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Transaction>, sqlx::Error> {
    let stamp = match outcome {
        TransactionStatus::Refunded => "refunded_at",
        _ => "completed_at",
    };
    let sql = format!(
        "UPDATE transactions SET status = $1, {stamp} = $2, updated_at = $2 WHERE id = $3 AND status = $4 RETURNING *"
    );
    let row: Option<TransactionRow> = sqlx::query_as(&sql)
        .bind(outcome)
        .bind(at)
        .bind(id.as_str())
        .bind(TransactionStatus::Disputed)
        .fetch_all(conn)
        .await
        .map(first_row)?;
    Ok(row.map(Transaction::from))
}
