pub mod booking;
pub mod config;
pub mod domain;
pub mod errors;
pub mod quota;
pub mod session;

pub use booking::{
    confirmation_code, synthetic_confirmation_code, BookingRequest, BookingValidationError,
    CONFIRMATION_PREFIX,
};
pub use domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
pub use domain::conversation::{BookingContext, BusinessId, ConversationId};
pub use domain::service::{duration_for, ServiceType, DEFAULT_DURATION_MINUTES};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use quota::{quota_key, CounterStore, CounterStoreError, QuotaTracker, MAX_FREE_MESSAGES};
pub use session::{SessionKey, SessionQuotaGate, SESSION_WINDOW_HOURS};
