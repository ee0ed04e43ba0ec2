use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use frontdesk_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use frontdesk_core::domain::conversation::{BusinessId, ConversationId};

pub mod appointment;
pub mod counter;
pub mod memory;

pub use appointment::SqlAppointmentRepository;
pub use counter::SqlCounterStore;
pub use memory::{InMemoryAppointmentRepository, InMemoryCounterStore};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("a scheduled appointment already holds this slot: `{existing_id}`")]
    Conflict { existing_id: AppointmentId },
    #[error("appointment `{0}` not found")]
    NotFound(AppointmentId),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppointmentFilter {
    pub conversation_id: Option<ConversationId>,
    pub business_id: Option<BusinessId>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn scheduled_for_conversation(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            status: Some(AppointmentStatus::Scheduled),
            ..Self::default()
        }
    }

    pub fn for_business(business_id: BusinessId) -> Self {
        Self { business_id: Some(business_id), ..Self::default() }
    }

    pub fn with_status(status: AppointmentStatus) -> Self {
        Self { status: Some(status), ..Self::default() }
    }
}

/// Fields a reschedule may change. Identity, status, and creation time are
/// out of reach by construction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReschedulePatch {
    pub service_type: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub duration_minutes: u32,
    pub notes: Option<String>,
}

#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, RepositoryError>;

    async fn find_by_id(&self, id: &AppointmentId)
        -> Result<Option<Appointment>, RepositoryError>;

    /// Persist a new appointment. A uniqueness violation on the scheduled
    /// slot surfaces as [`RepositoryError::Conflict`] carrying the id of the
    /// row that already holds it.
    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError>;

    /// Apply a reschedule patch and bump `updated_at`. Status and
    /// `created_at` are left untouched.
    async fn update(
        &self,
        id: &AppointmentId,
        patch: ReschedulePatch,
    ) -> Result<Appointment, RepositoryError>;

    /// Delete the given rows in a single transaction; either every id listed
    /// is applied or none are.
    async fn delete_many(&self, ids: &[AppointmentId]) -> Result<u64, RepositoryError>;
}
