use sqlx::{types::Json, PgPool};
use uuid::Uuid;

use crate::trips::dto::{CreateTripRequest, UpdateTripRequest};
use crate::trips::repo_types::{
    CostLine, ItineraryDay, ReportDescriptor, Transcript, Trip, TripStatus,
};

const TRIP_COLS: &str = "id, user_id, title, destination, start_date, end_date, party_size, \
     status, is_deleted, deleted_by, deleted_at, itinerary, costs, reports, conversations, \
     created_at, updated_at";

impl Trip {
    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        req: &CreateTripRequest,
    ) -> anyhow::Result<Trip> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "INSERT INTO trips (user_id, title, destination, start_date, end_date, party_size, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {TRIP_COLS}"
        ))
        .bind(user_id)
        .bind(req.title.trim())
        .bind(req.destination.trim())
        .bind(req.start_date)
        .bind(req.end_date)
        .bind(req.party_size.unwrap_or(1))
        .bind(req.status.unwrap_or(TripStatus::Planned))
        .fetch_one(db)
        .await?;
        Ok(trip)
    }

    /// Fetches regardless of the soft-delete flag; visibility decisions belong
    /// to the caller, which knows who is asking.
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<Trip>> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {TRIP_COLS} FROM trips WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(trip)
    }

    pub async fn list_by_owner(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Trip>> {
        let rows = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {TRIP_COLS} FROM trips
             WHERE user_id = $1 AND NOT is_deleted
             ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn list_all(db: &PgPool) -> anyhow::Result<Vec<Trip>> {
        let rows = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {TRIP_COLS} FROM trips WHERE NOT is_deleted ORDER BY created_at DESC"
        ))
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn list_deleted(db: &PgPool) -> anyhow::Result<Vec<Trip>> {
        let rows = sqlx::query_as::<_, Trip>(&format!(
            "SELECT {TRIP_COLS} FROM trips WHERE is_deleted ORDER BY deleted_at DESC"
        ))
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn update_fields(
        db: &PgPool,
        id: Uuid,
        patch: &UpdateTripRequest,
    ) -> anyhow::Result<Trip> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "UPDATE trips SET
                 title = COALESCE($2, title),
                 destination = COALESCE($3, destination),
                 start_date = COALESCE($4, start_date),
                 end_date = COALESCE($5, end_date),
                 party_size = COALESCE($6, party_size),
                 status = COALESCE($7, status),
                 updated_at = now()
             WHERE id = $1
             RETURNING {TRIP_COLS}"
        ))
        .bind(id)
        .bind(patch.title.as_deref().map(str::trim))
        .bind(patch.destination.as_deref().map(str::trim))
        .bind(patch.start_date)
        .bind(patch.end_date)
        .bind(patch.party_size)
        .bind(patch.status)
        .fetch_one(db)
        .await?;
        Ok(trip)
    }

    /// Returns false when the trip was already soft-deleted.
    pub async fn soft_delete(db: &PgPool, id: Uuid, actor_id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE trips
             SET is_deleted = TRUE, deleted_by = $2, deleted_at = now(), updated_at = now()
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id)
        .bind(actor_id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn restore(db: &PgPool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query(
            "UPDATE trips
             SET is_deleted = FALSE, deleted_by = NULL, deleted_at = NULL, updated_at = now()
             WHERE id = $1 AND is_deleted",
        )
        .bind(id)
        .execute(db)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_permanently(db: &PgPool, id: Uuid) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM trips WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    /// Append-only; existing lines are never rewritten.
    pub async fn append_costs(db: &PgPool, id: Uuid, costs: &[CostLine]) -> anyhow::Result<Trip> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "UPDATE trips SET costs = costs || $2, updated_at = now()
             WHERE id = $1
             RETURNING {TRIP_COLS}"
        ))
        .bind(id)
        .bind(Json(costs))
        .fetch_one(db)
        .await?;
        Ok(trip)
    }

    /// Wholesale replacement, not a merge.
    pub async fn replace_itinerary(
        db: &PgPool,
        id: Uuid,
        days: &[ItineraryDay],
    ) -> anyhow::Result<Trip> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "UPDATE trips SET itinerary = $2, updated_at = now()
             WHERE id = $1
             RETURNING {TRIP_COLS}"
        ))
        .bind(id)
        .bind(Json(days))
        .fetch_one(db)
        .await?;
        Ok(trip)
    }

    pub async fn append_report(
        db: &PgPool,
        id: Uuid,
        descriptor: &ReportDescriptor,
    ) -> anyhow::Result<Trip> {
        let trip = sqlx::query_as::<_, Trip>(&format!(
            "UPDATE trips SET reports = reports || $2, updated_at = now()
             WHERE id = $1
             RETURNING {TRIP_COLS}"
        ))
        .bind(id)
        .bind(Json(std::slice::from_ref(descriptor)))
        .fetch_one(db)
        .await?;
        Ok(trip)
    }

    pub async fn append_conversation(
        db: &PgPool,
        id: Uuid,
        transcript: &Transcript,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "UPDATE trips SET conversations = conversations || $2, updated_at = now()
             WHERE id = $1",
        )
        .bind(id)
        .bind(Json(std::slice::from_ref(transcript)))
        .execute(db)
        .await?;
        Ok(())
    }

    /// Report file names for every trip of an owner, soft-deleted included.
    /// Used by account purge to remove physical artifacts first.
    pub async fn report_files_for_owner(db: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<String>> {
        let rows: Vec<(Json<Vec<ReportDescriptor>>,)> =
            sqlx::query_as("SELECT reports FROM trips WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(db)
                .await?;
        Ok(rows
            .into_iter()
            .flat_map(|(reports,)| reports.0.into_iter().map(|r| r.file))
            .collect())
    }
}
