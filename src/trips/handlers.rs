use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use time::OffsetDateTime;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::jwt::{AuthUser, Role},
    error::ApiError,
    reports::{report_file_name, report_path, trip_report_html},
    response::ApiResponse,
    state::AppState,
    trips::{
        dto::{
            AddCostsRequest, CreateTripRequest, ReplaceItineraryRequest, TripDetails,
            TripSummary, UpdateTripRequest,
        },
        repo_types::{derived_total, ReportDescriptor, Trip},
    },
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/trips/my", get(list_my_trips))
        .route("/trips", post(create_trip).get(list_all_trips))
        .route("/trips/deleted", get(list_deleted_trips))
        .route(
            "/trips/:id",
            get(get_trip).put(update_trip).delete(soft_delete_trip),
        )
        .route("/trips/:id/costs", put(add_costs))
        .route("/trips/:id/itinerary", put(replace_itinerary))
        .route("/trips/:id/report", post(generate_report))
        .route("/trips/:id/restore", post(restore_trip))
        .route("/trips/:id/permanent", delete(permanently_delete_trip))
}

/// Loads a trip and applies ownership + soft-delete visibility: a non-owner
/// gets `Forbidden` (existence is not masked here), an owner asking for a
/// soft-deleted trip gets `NotFound` unless they are an admin.
async fn load_visible(state: &AppState, id: Uuid, user: &AuthUser) -> Result<Trip, ApiError> {
    let trip = Trip::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("trip"))?;
    if trip.user_id != user.id && !user.has_role(Role::Admin) {
        warn!(user_id = %user.id, trip_id = %id, "access to foreign trip");
        return Err(ApiError::Forbidden);
    }
    if trip.is_deleted && !user.has_role(Role::Admin) {
        return Err(ApiError::NotFound("trip"));
    }
    Ok(trip)
}

#[instrument(skip(state))]
pub async fn list_my_trips(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<TripSummary>>>, ApiError> {
    let trips = Trip::list_by_owner(&state.db, user.id).await?;
    let items: Vec<TripSummary> = trips.into_iter().map(Into::into).collect();
    let count = items.len();
    Ok(Json(ApiResponse::with_count(items, count)))
}

#[instrument(skip(state, payload))]
pub async fn create_trip(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateTripRequest>,
) -> Result<Json<ApiResponse<TripDetails>>, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::Validation("Title is required".into()));
    }
    if payload.destination.trim().is_empty() {
        return Err(ApiError::Validation("Destination is required".into()));
    }
    if payload.end_date < payload.start_date {
        return Err(ApiError::Validation(
            "End date must not precede start date".into(),
        ));
    }
    if matches!(payload.party_size, Some(n) if n < 1) {
        return Err(ApiError::Validation("Party size must be at least 1".into()));
    }

    let trip = Trip::create(&state.db, user.id, &payload).await?;
    info!(trip_id = %trip.id, user_id = %user.id, "trip created");
    Ok(Json(ApiResponse::ok(trip.into())))
}

#[instrument(skip(state))]
pub async fn get_trip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TripDetails>>, ApiError> {
    let trip = load_visible(&state, id, &user).await?;
    Ok(Json(ApiResponse::ok(trip.into())))
}

#[instrument(skip(state, payload))]
pub async fn update_trip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTripRequest>,
) -> Result<Json<ApiResponse<TripDetails>>, ApiError> {
    let trip = load_visible(&state, id, &user).await?;

    let start = payload.start_date.unwrap_or(trip.start_date);
    let end = payload.end_date.unwrap_or(trip.end_date);
    if end < start {
        return Err(ApiError::Validation(
            "End date must not precede start date".into(),
        ));
    }
    if matches!(payload.party_size, Some(n) if n < 1) {
        return Err(ApiError::Validation("Party size must be at least 1".into()));
    }

    let updated = Trip::update_fields(&state.db, id, &payload).await?;
    Ok(Json(ApiResponse::ok(updated.into())))
}

#[instrument(skip(state))]
pub async fn soft_delete_trip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    load_visible(&state, id, &user).await?;
    Trip::soft_delete(&state.db, id, user.id).await?;
    info!(trip_id = %id, actor = %user.id, "trip soft-deleted");
    Ok(Json(ApiResponse::message("Trip deleted")))
}

#[instrument(skip(state, payload))]
pub async fn add_costs(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddCostsRequest>,
) -> Result<Json<ApiResponse<TripDetails>>, ApiError> {
    if payload.costs.is_empty() {
        return Err(ApiError::Validation("costs must not be empty".into()));
    }
    for line in &payload.costs {
        if line.amount < 0.0 || line.quantity < 0.0 {
            return Err(ApiError::Validation(
                "amount and quantity must be non-negative".into(),
            ));
        }
    }
    load_visible(&state, id, &user).await?;
    let trip = Trip::append_costs(&state.db, id, &payload.costs).await?;
    info!(trip_id = %id, added = payload.costs.len(), total = derived_total(&trip.costs.0), "costs appended");
    Ok(Json(ApiResponse::ok(trip.into())))
}

#[instrument(skip(state, payload))]
pub async fn replace_itinerary(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceItineraryRequest>,
) -> Result<Json<ApiResponse<TripDetails>>, ApiError> {
    load_visible(&state, id, &user).await?;
    let trip = Trip::replace_itinerary(&state.db, id, &payload.days).await?;
    info!(trip_id = %id, days = payload.days.len(), "itinerary replaced");
    Ok(Json(ApiResponse::ok(trip.into())))
}

#[instrument(skip(state))]
pub async fn generate_report(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ReportDescriptor>>, ApiError> {
    let trip = load_visible(&state, id, &user).await?;

    tokio::fs::create_dir_all(&state.config.reports.dir)
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("create reports dir: {e}")))?;

    let file = report_file_name(trip.id);
    let output = report_path(&state.config.reports.dir, &file);
    let html = trip_report_html(&trip);
    state.renderer.render_pdf(&html, &output).await?;

    let descriptor = ReportDescriptor {
        file,
        format: "pdf".into(),
        generated_at: OffsetDateTime::now_utc(),
    };
    Trip::append_report(&state.db, id, &descriptor).await?;
    info!(trip_id = %id, file = %descriptor.file, "report generated");
    Ok(Json(ApiResponse::ok(descriptor)))
}

#[instrument(skip(state))]
pub async fn list_all_trips(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<TripSummary>>>, ApiError> {
    user.require_role(Role::Admin)?;
    let trips = Trip::list_all(&state.db).await?;
    let items: Vec<TripSummary> = trips.into_iter().map(Into::into).collect();
    let count = items.len();
    Ok(Json(ApiResponse::with_count(items, count)))
}

#[instrument(skip(state))]
pub async fn list_deleted_trips(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<TripSummary>>>, ApiError> {
    user.require_role(Role::Admin)?;
    let trips = Trip::list_deleted(&state.db).await?;
    let items: Vec<TripSummary> = trips.into_iter().map(Into::into).collect();
    let count = items.len();
    Ok(Json(ApiResponse::with_count(items, count)))
}

#[instrument(skip(state))]
pub async fn restore_trip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<TripDetails>>, ApiError> {
    user.require_role(Role::Admin)?;
    let restored = Trip::restore(&state.db, id).await?;
    if !restored {
        return Err(ApiError::NotFound("deleted trip"));
    }
    let trip = Trip::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("trip"))?;
    info!(trip_id = %id, "trip restored");
    Ok(Json(ApiResponse::ok(trip.into())))
}

/// Irreversible. Physical report artifacts are removed first; a file that
/// cannot be removed is logged but never blocks the record deletion.
#[instrument(skip(state))]
pub async fn permanently_delete_trip(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    user.require_role(Role::Admin)?;
    let trip = Trip::find_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound("trip"))?;

    for report in &trip.reports.0 {
        let path = report_path(&state.config.reports.dir, &report.file);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            error!(trip_id = %id, file = %report.file, error = %e, "report artifact removal failed");
        }
    }

    Trip::delete_permanently(&state.db, id).await?;
    info!(trip_id = %id, actor = %user.id, "trip permanently deleted");
    Ok(Json(ApiResponse::message("Trip permanently deleted")))
}
