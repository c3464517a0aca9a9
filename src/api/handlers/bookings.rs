use axum::{
    extract::{Extension, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentUser, state::AppState},
    domain::{
        Booking, BookingFilter, BookingRole, BookingStatus, CreateBookingRequest, DecisionOutcome,
        PaymentDetails, Transaction,
    },
    error::{AppError, Result},
};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    role: BookingRole,
    status: Option<BookingStatus>,
}

#[derive(Debug, Serialize)]
pub struct BookingDto {
    id: Uuid,
    listing_id: Uuid,
    guest_id: Uuid,
    host_id: Uuid,
    date: String,
    start_time: String,
    end_time: String,
    venue_id: String,
    note: Option<String>,
    status: BookingStatus,
    /// Only the guest sees the code, and only once it can be used.
    checkin_code: Option<String>,
    created_at: String,
    updated_at: String,
}

impl BookingDto {
    fn for_viewer(booking: Booking, viewer: Uuid) -> Self {
        let checkin_code = (booking.guest_id == viewer && booking.status == BookingStatus::Confirmed)
            .then(|| booking.display_code());

        Self {
            id: booking.id,
            listing_id: booking.listing_id,
            guest_id: booking.guest_id,
            host_id: booking.host_id,
            date: booking.date.format("%Y-%m-%d").to_string(),
            start_time: booking.start_time.format("%H:%M").to_string(),
            end_time: booking.end_time.format("%H:%M").to_string(),
            venue_id: booking.venue_id,
            note: booking.note,
            status: booking.status,
            checkin_code,
            created_at: booking.created_at.to_rfc3339(),
            updated_at: booking.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    bookings: Vec<BookingDto>,
    total: usize,
}

#[derive(Debug, Serialize)]
struct DecisionResponse {
    booking: BookingDto,
    #[serde(skip_serializing_if = "Option::is_none")]
    transaction: Option<Transaction>,
}

fn decision_response(outcome: DecisionOutcome, viewer: Uuid) -> Response {
    match outcome {
        DecisionOutcome::Accepted { booking, transaction } => Json(DecisionResponse {
            booking: BookingDto::for_viewer(booking, viewer),
            transaction: Some(transaction),
        })
        .into_response(),
        DecisionOutcome::Rejected { booking } => Json(DecisionResponse {
            booking: BookingDto::for_viewer(booking, viewer),
            transaction: None,
        })
        .into_response(),
        DecisionOutcome::AlreadyDecided { current } => {
            AppError::AlreadyDecided { current }.into_response()
        }
        DecisionOutcome::PaymentAccountNotReady { remediation } => {
            AppError::PaymentAccountNotReady { remediation }.into_response()
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Json(request), _): WithRejection<Json<CreateBookingRequest>, AppError>,
) -> Result<(StatusCode, Json<BookingDto>)> {
    let booking = state
        .service_context
        .booking_service
        .create(current.user.id, request)
        .await?;

    Ok((StatusCode::CREATED, Json(BookingDto::for_viewer(booking, current.user.id))))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Query(params), _): WithRejection<Query<ListParams>, AppError>,
) -> Result<Json<ListResponse>> {
    let bookings = state
        .service_context
        .booking_service
        .list(BookingFilter {
            viewer: current.user.id,
            role: params.role,
            status: params.status,
        })
        .await?;

    let bookings: Vec<BookingDto> = bookings
        .into_iter()
        .map(|b| BookingDto::for_viewer(b, current.user.id))
        .collect();

    Ok(Json(ListResponse {
        total: bookings.len(),
        bookings,
    }))
}

pub async fn get(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<BookingDto>> {
    let booking = state
        .service_context
        .booking_service
        .get(id, current.user.id)
        .await?;

    Ok(Json(BookingDto::for_viewer(booking, current.user.id)))
}

pub async fn accept(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Response> {
    let outcome = state
        .service_context
        .booking_service
        .accept(id, current.user.id)
        .await?;

    Ok(decision_response(outcome, current.user.id))
}

pub async fn reject(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Response> {
    let outcome = state
        .service_context
        .booking_service
        .reject(id, current.user.id)
        .await?;

    Ok(decision_response(outcome, current.user.id))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<BookingDto>> {
    let booking = state
        .service_context
        .booking_service
        .cancel(id, current.user.id)
        .await?;

    Ok(Json(BookingDto::for_viewer(booking, current.user.id)))
}

pub async fn start(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<BookingDto>> {
    let booking = state
        .service_context
        .checkin_service
        .start_session(id, current.user.id)
        .await?;

    Ok(Json(BookingDto::for_viewer(booking, current.user.id)))
}

pub async fn complete(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<BookingDto>> {
    let booking = state
        .service_context
        .checkin_service
        .complete_session(id, current.user.id)
        .await?;

    Ok(Json(BookingDto::for_viewer(booking, current.user.id)))
}

pub async fn payment(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Json<PaymentDetails>> {
    let details = state
        .service_context
        .booking_service
        .payment_details(id, current.user.id)
        .await?;

    Ok(Json(details))
}

pub async fn checkin_qr(
    State(state): State<AppState>,
    Extension(current): Extension<CurrentUser>,
    WithRejection(Path(id), _): WithRejection<Path<Uuid>, AppError>,
) -> Result<Response> {
    let svg = state
        .service_context
        .booking_service
        .checkin_qr(id, current.user.id)
        .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        svg,
    )
        .into_response())
}
