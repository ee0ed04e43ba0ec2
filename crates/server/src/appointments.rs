//! Appointment HTTP surface: business listing, active-appointment lookup for
//! a conversation, create-or-reconcile booking, reschedule, and the
//! duplicate-cleanup maintenance endpoint.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use frontdesk_booking::{AppointmentCoordinator, BookingConfirmation};
use frontdesk_core::booking::BookingRequest;
use frontdesk_core::domain::appointment::{Appointment, AppointmentId};
use frontdesk_core::domain::conversation::{BusinessId, ConversationId};
use frontdesk_core::errors::ApplicationError;
use frontdesk_db::repositories::{AppointmentFilter, AppointmentRepository};

#[derive(Clone)]
pub struct AppointmentsState {
    coordinator: Arc<AppointmentCoordinator>,
    repository: Arc<dyn AppointmentRepository>,
    maintenance_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiError {
    error: String,
}

#[derive(Debug, Deserialize)]
pub struct BookingPayload {
    pub customer_name: String,
    pub customer_email: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    pub service_type: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub business_id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
}

impl BookingPayload {
    fn into_request(self) -> BookingRequest {
        BookingRequest {
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            service_type: self.service_type,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            notes: self.notes,
            business_id: BusinessId(self.business_id),
            conversation_id: self.conversation_id.map(ConversationId),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AppointmentResponse {
    pub id: String,
    pub business_id: String,
    pub conversation_id: Option<String>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub service_type: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub duration_minutes: u32,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Appointment> for AppointmentResponse {
    fn from(appointment: Appointment) -> Self {
        Self {
            id: appointment.id.0,
            business_id: appointment.business_id.0,
            conversation_id: appointment.conversation_id.map(|id| id.0),
            customer_name: appointment.customer_name,
            customer_email: appointment.customer_email,
            customer_phone: appointment.customer_phone,
            service_type: appointment.service_type,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            duration_minutes: appointment.duration_minutes,
            status: appointment.status.as_str().to_string(),
            notes: appointment.notes,
            created_at: appointment.created_at.to_rfc3339(),
            updated_at: appointment.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub confirmation_number: String,
    pub authoritative: bool,
    pub reconciled: bool,
    pub appointment: Option<AppointmentResponse>,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub duplicate_groups_found: u64,
    pub appointments_removed: u64,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    business_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateQuery {
    #[serde(default)]
    strict: bool,
}

pub fn router(
    coordinator: Arc<AppointmentCoordinator>,
    repository: Arc<dyn AppointmentRepository>,
    maintenance_token: Option<String>,
) -> Router {
    let state = AppointmentsState { coordinator, repository, maintenance_token };

    Router::new()
        .route("/api/v1/appointments", get(list_appointments).post(create_appointment))
        .route("/api/v1/appointments/cleanup", delete(cleanup_duplicates))
        .route("/api/v1/appointments/{id}", put(reschedule_appointment))
        .route(
            "/api/v1/conversations/{conversation_id}/appointment",
            get(conversation_appointment),
        )
        .with_state(state)
}

fn correlation_id() -> String {
    Uuid::new_v4().simple().to_string()
}

fn map_application_error(
    error: ApplicationError,
    correlation_id: &str,
) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        ApplicationError::Domain(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ApplicationError::AppointmentNotFound(_) => StatusCode::NOT_FOUND,
        ApplicationError::AppointmentClosed { .. } => StatusCode::CONFLICT,
        ApplicationError::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
        ApplicationError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // Validation details are safe and useful for form rendering; everything
    // else gets the sanitized interface message.
    let message = match &error {
        ApplicationError::Domain(domain_error) => domain_error.to_string(),
        other => other.clone().into_interface(correlation_id).user_message().to_string(),
    };

    warn!(
        event_name = "appointments.request_failed",
        correlation_id,
        error = %error,
        "appointment request rejected"
    );

    (status, Json(ApiError { error: message }))
}

async fn list_appointments(
    State(state): State<AppointmentsState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AppointmentResponse>>, (StatusCode, Json<ApiError>)> {
    let business_id = match query.business_id.filter(|value| !value.trim().is_empty()) {
        Some(business_id) => business_id,
        None => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(ApiError { error: "business_id is required".to_string() }),
            ))
        }
    };

    let filter = AppointmentFilter::for_business(BusinessId(business_id));
    match state.repository.list(&filter).await {
        Ok(appointments) => {
            Ok(Json(appointments.into_iter().map(AppointmentResponse::from).collect()))
        }
        Err(list_error) => {
            error!(
                event_name = "appointments.list_failed",
                error = %list_error,
                "failed to list appointments"
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiError { error: "Failed to fetch appointments".to_string() }),
            ))
        }
    }
}

async fn conversation_appointment(
    Path(conversation_id): Path<String>,
    State(state): State<AppointmentsState>,
) -> Json<Option<AppointmentResponse>> {
    let conversation_id = ConversationId(conversation_id);
    let active = state.coordinator.find_active(Some(&conversation_id)).await;
    Json(active.map(AppointmentResponse::from))
}

async fn create_appointment(
    State(state): State<AppointmentsState>,
    Query(query): Query<CreateQuery>,
    Json(payload): Json<BookingPayload>,
) -> Result<(StatusCode, Json<BookingResponse>), (StatusCode, Json<ApiError>)> {
    let correlation_id = correlation_id();
    let request = payload.into_request();

    match state.coordinator.create_or_reschedule(request, None).await {
        Ok(BookingConfirmation::Authoritative { appointment, confirmation_code, reconciled }) => {
            if reconciled && query.strict {
                return Err((
                    StatusCode::CONFLICT,
                    Json(ApiError {
                        error: format!(
                            "a scheduled appointment already exists for this slot: {}",
                            appointment.id
                        ),
                    }),
                ));
            }

            Ok((
                StatusCode::CREATED,
                Json(BookingResponse {
                    confirmation_number: confirmation_code,
                    authoritative: true,
                    reconciled,
                    appointment: Some(AppointmentResponse::from(appointment)),
                }),
            ))
        }
        Ok(BookingConfirmation::Degraded { confirmation_code }) => {
            info!(
                event_name = "appointments.create_degraded",
                correlation_id,
                confirmation_number = %confirmation_code,
                "issuing non-authoritative confirmation"
            );
            Ok((
                StatusCode::OK,
                Json(BookingResponse {
                    confirmation_number: confirmation_code,
                    authoritative: false,
                    reconciled: false,
                    appointment: None,
                }),
            ))
        }
        Err(application_error) => Err(map_application_error(application_error, &correlation_id)),
    }
}

async fn reschedule_appointment(
    Path(id): Path<String>,
    State(state): State<AppointmentsState>,
    Json(payload): Json<BookingPayload>,
) -> Result<Json<BookingResponse>, (StatusCode, Json<ApiError>)> {
    let correlation_id = correlation_id();
    let existing_id = AppointmentId(id);
    let request = payload.into_request();

    match state.coordinator.create_or_reschedule(request, Some(&existing_id)).await {
        Ok(BookingConfirmation::Authoritative { appointment, confirmation_code, reconciled }) => {
            Ok(Json(BookingResponse {
                confirmation_number: confirmation_code,
                authoritative: true,
                reconciled,
                appointment: Some(AppointmentResponse::from(appointment)),
            }))
        }
        Ok(BookingConfirmation::Degraded { confirmation_code }) => Ok(Json(BookingResponse {
            confirmation_number: confirmation_code,
            authoritative: false,
            reconciled: false,
            appointment: None,
        })),
        Err(application_error) => Err(map_application_error(application_error, &correlation_id)),
    }
}

async fn cleanup_duplicates(
    State(state): State<AppointmentsState>,
    headers: HeaderMap,
) -> Result<Json<CleanupResponse>, (StatusCode, Json<ApiError>)> {
    if let Some(expected) = &state.maintenance_token {
        let provided =
            headers.get("x-frontdesk-maintenance-token").and_then(|value| value.to_str().ok());
        match provided {
            Some(value) if value == expected => {}
            Some(_) => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json(ApiError { error: "invalid maintenance token".to_string() }),
                ))
            }
            None => {
                return Err((
                    StatusCode::UNAUTHORIZED,
                    Json(ApiError { error: "missing maintenance token".to_string() }),
                ))
            }
        }
    }

    let correlation_id = correlation_id();
    match state.coordinator.cleanup_duplicates().await {
        Ok(report) => Ok(Json(CleanupResponse {
            message: format!(
                "Cleanup completed. Removed {} duplicate appointments.",
                report.appointments_removed
            ),
            duplicate_groups_found: report.duplicate_groups_found,
            appointments_removed: report.appointments_removed,
        })),
        Err(application_error) => Err(map_application_error(application_error, &correlation_id)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use axum::Json;
    use chrono::NaiveDate;

    use frontdesk_booking::AppointmentCoordinator;
    use frontdesk_db::repositories::InMemoryAppointmentRepository;

    use super::{
        cleanup_duplicates, conversation_appointment, create_appointment, list_appointments,
        reschedule_appointment, AppointmentsState, BookingPayload, CreateQuery, ListQuery,
    };

    fn state_with_token(maintenance_token: Option<&str>) -> AppointmentsState {
        let repository = Arc::new(InMemoryAppointmentRepository::default());
        AppointmentsState {
            coordinator: Arc::new(AppointmentCoordinator::new(repository.clone())),
            repository,
            maintenance_token: maintenance_token.map(str::to_string),
        }
    }

    fn payload(conversation: Option<&str>) -> BookingPayload {
        BookingPayload {
            customer_name: "Alice Example".to_string(),
            customer_email: "alice@example.com".to_string(),
            customer_phone: None,
            service_type: "consultation".to_string(),
            appointment_date: NaiveDate::from_ymd_opt(2099, 1, 5).expect("valid date"),
            appointment_time: "10:00 AM".to_string(),
            notes: None,
            business_id: "B1".to_string(),
            conversation_id: conversation.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn booking_returns_created_with_a_confirmation_number() {
        let state = state_with_token(None);

        let (status, Json(body)) = create_appointment(
            State(state.clone()),
            Query(CreateQuery { strict: false }),
            Json(payload(Some("C1"))),
        )
        .await
        .expect("booking accepted");

        assert_eq!(status, StatusCode::CREATED);
        assert!(body.authoritative);
        assert!(!body.reconciled);
        assert!(body.confirmation_number.starts_with("APT-"));
        let appointment = body.appointment.expect("appointment payload");
        assert_eq!(appointment.duration_minutes, 30);
        assert_eq!(appointment.status, "scheduled");
    }

    #[tokio::test]
    async fn duplicate_booking_reconciles_unless_strict_mode_observes_it() {
        let state = state_with_token(None);

        create_appointment(
            State(state.clone()),
            Query(CreateQuery { strict: false }),
            Json(payload(Some("C1"))),
        )
        .await
        .expect("first booking");

        let (status, Json(body)) = create_appointment(
            State(state.clone()),
            Query(CreateQuery { strict: false }),
            Json(payload(Some("C1"))),
        )
        .await
        .expect("retried booking reconciles");
        assert_eq!(status, StatusCode::CREATED);
        assert!(body.reconciled);

        let (status, Json(error)) = create_appointment(
            State(state),
            Query(CreateQuery { strict: true }),
            Json(payload(Some("C1"))),
        )
        .await
        .expect_err("strict mode surfaces the conflict");
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(error.error.contains("already exists"));
    }

    #[tokio::test]
    async fn invalid_booking_is_rejected_with_unprocessable_entity() {
        let state = state_with_token(None);
        let mut bad = payload(Some("C1"));
        bad.customer_email = "not-an-address".to_string();

        let (status, Json(error)) = create_appointment(
            State(state),
            Query(CreateQuery { strict: false }),
            Json(bad),
        )
        .await
        .expect_err("invalid booking rejected");

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error.error.contains("customer_email"));
    }

    #[tokio::test]
    async fn conversation_lookup_routes_between_wizard_and_reschedule() {
        let state = state_with_token(None);

        let Json(none) =
            conversation_appointment(Path("C1".to_string()), State(state.clone())).await;
        assert!(none.is_none());

        create_appointment(
            State(state.clone()),
            Query(CreateQuery { strict: false }),
            Json(payload(Some("C1"))),
        )
        .await
        .expect("booking accepted");

        let Json(found) = conversation_appointment(Path("C1".to_string()), State(state)).await;
        let found = found.expect("active appointment");
        assert_eq!(found.conversation_id.as_deref(), Some("C1"));
        assert_eq!(found.status, "scheduled");
    }

    #[tokio::test]
    async fn reschedule_of_unknown_id_returns_not_found() {
        let state = state_with_token(None);

        let (status, _) = reschedule_appointment(
            Path("APPT-missing".to_string()),
            State(state),
            Json(payload(Some("C1"))),
        )
        .await
        .expect_err("unknown id rejected");

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn reschedule_moves_the_existing_appointment() {
        let state = state_with_token(None);

        let (_, Json(created)) = create_appointment(
            State(state.clone()),
            Query(CreateQuery { strict: false }),
            Json(payload(Some("C1"))),
        )
        .await
        .expect("booking accepted");
        let appointment = created.appointment.expect("appointment payload");

        let mut moved = payload(Some("C1"));
        moved.service_type = "strategy-session".to_string();
        moved.appointment_time = "2:00 PM".to_string();

        let Json(body) =
            reschedule_appointment(Path(appointment.id.clone()), State(state), Json(moved))
                .await
                .expect("reschedule accepted");

        let updated = body.appointment.expect("appointment payload");
        assert_eq!(updated.id, appointment.id);
        assert_eq!(updated.appointment_time, "2:00 PM");
        assert_eq!(updated.duration_minutes, 90);
        assert_eq!(updated.created_at, appointment.created_at);
    }

    #[tokio::test]
    async fn listing_requires_a_business_id() {
        let state = state_with_token(None);

        let (status, Json(error)) =
            list_appointments(State(state), Query(ListQuery { business_id: None }))
                .await
                .expect_err("missing business_id rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.error, "business_id is required");
    }

    #[tokio::test]
    async fn listing_returns_the_business_appointments() {
        let state = state_with_token(None);
        create_appointment(
            State(state.clone()),
            Query(CreateQuery { strict: false }),
            Json(payload(Some("C1"))),
        )
        .await
        .expect("booking accepted");

        let Json(appointments) = list_appointments(
            State(state),
            Query(ListQuery { business_id: Some("B1".to_string()) }),
        )
        .await
        .expect("listing succeeds");

        assert_eq!(appointments.len(), 1);
        assert_eq!(appointments[0].business_id, "B1");
    }

    #[tokio::test]
    async fn cleanup_requires_the_maintenance_token_when_configured() {
        let state = state_with_token(Some("maint-secret"));

        let (status, _) = cleanup_duplicates(State(state.clone()), HeaderMap::new())
            .await
            .expect_err("missing token rejected");
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-frontdesk-maintenance-token",
            HeaderValue::from_static("maint-secret"),
        );
        let Json(report) =
            cleanup_duplicates(State(state), headers).await.expect("authorized cleanup runs");
        assert_eq!(report.appointments_removed, 0);
        assert_eq!(report.duplicate_groups_found, 0);
    }
}
