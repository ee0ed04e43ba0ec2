//! Booking requests, field validation, and confirmation-code derivation.
//!
//! Validation is deliberately synchronous and collects every failure at once
//! so the caller can surface a complete form-error list in a single round
//! trip.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::appointment::AppointmentId;
use crate::domain::conversation::{BookingContext, BusinessId, ConversationId};

pub const CONFIRMATION_PREFIX: &str = "APT-";

/// Clock format bookings arrive in, e.g. `10:00 AM`.
const TIME_FORMAT: &str = "%I:%M %p";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("booking validation failed: {}", failures.join("; "))]
pub struct BookingValidationError {
    pub failures: Vec<String>,
}

/// A booking submission as it comes off the form, before any persistence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRequest {
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub service_type: String,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    pub notes: Option<String>,
    pub business_id: BusinessId,
    pub conversation_id: Option<ConversationId>,
}

impl BookingRequest {
    pub fn validate(&self) -> Result<(), BookingValidationError> {
        self.validate_at(Utc::now().date_naive())
    }

    pub fn validate_at(&self, today: NaiveDate) -> Result<(), BookingValidationError> {
        let mut failures = Vec::new();

        if self.customer_name.trim().is_empty() {
            failures.push("customer_name is required".to_string());
        }

        let email = self.customer_email.trim();
        if email.is_empty() {
            failures.push("customer_email is required".to_string());
        } else if !email.contains('@') {
            failures.push(format!("customer_email `{email}` is not a valid address"));
        }

        if self.service_type.trim().is_empty() {
            failures.push("service_type is required".to_string());
        }

        if self.appointment_date < today {
            failures.push(format!(
                "appointment_date {} is in the past",
                self.appointment_date
            ));
        }
        if matches!(self.appointment_date.weekday(), Weekday::Sat | Weekday::Sun) {
            failures.push(format!(
                "appointment_date {} falls on a weekend",
                self.appointment_date
            ));
        }

        let time = self.appointment_time.trim();
        if time.is_empty() {
            failures.push("appointment_time is required".to_string());
        } else if parse_appointment_time(time).is_none() {
            failures.push(format!("appointment_time `{time}` is not a valid clock time"));
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BookingValidationError { failures })
        }
    }

    /// Chat-session scope of this booking, when it originated in a
    /// conversation.
    pub fn booking_context(&self) -> Option<BookingContext> {
        self.conversation_id
            .clone()
            .map(|conversation_id| BookingContext::new(conversation_id, self.business_id.clone()))
    }
}

pub fn parse_appointment_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(&raw.trim().to_ascii_uppercase(), TIME_FORMAT).ok()
}

/// Human-readable confirmation code for a stored appointment: the fixed
/// prefix plus the last six characters of the identifier, upper-cased.
pub fn confirmation_code(id: &AppointmentId) -> String {
    let raw = &id.0;
    let tail = &raw[raw.len().saturating_sub(6)..];
    format!("{CONFIRMATION_PREFIX}{}", tail.to_ascii_uppercase())
}

/// Fallback confirmation code when the appointment could not be persisted:
/// derived from the wall clock, so the user-facing flow can still complete.
/// Not authoritative until reconciled against storage.
pub fn synthetic_confirmation_code(at: DateTime<Utc>) -> String {
    format!("{CONFIRMATION_PREFIX}{:06}", at.timestamp_millis().rem_euclid(1_000_000))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, TimeZone, Utc};

    use crate::domain::appointment::AppointmentId;
    use crate::domain::conversation::{BusinessId, ConversationId};

    use super::{
        confirmation_code, parse_appointment_time, synthetic_confirmation_code, BookingRequest,
    };

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date")
    }

    fn request() -> BookingRequest {
        BookingRequest {
            customer_name: "Alice Example".to_string(),
            customer_email: "alice@example.com".to_string(),
            customer_phone: None,
            service_type: "consultation".to_string(),
            appointment_date: monday(),
            appointment_time: "10:00 AM".to_string(),
            notes: None,
            business_id: BusinessId("biz-1".to_string()),
            conversation_id: Some(ConversationId("conv-1".to_string())),
        }
    }

    #[test]
    fn complete_request_passes_validation() {
        request().validate_at(monday()).expect("valid request");
    }

    #[test]
    fn validation_collects_every_failure_at_once() {
        let mut bad = request();
        bad.customer_name = "  ".to_string();
        bad.customer_email = "not-an-address".to_string();
        bad.appointment_time = "25:99".to_string();

        let error = bad.validate_at(monday()).expect_err("invalid request");
        assert_eq!(error.failures.len(), 3);
    }

    #[test]
    fn past_dates_are_rejected() {
        let mut stale = request();
        stale.appointment_date = NaiveDate::from_ymd_opt(2025, 3, 7).expect("valid date");

        let error = stale
            .validate_at(monday())
            .expect_err("past dates should fail validation");
        assert!(error.failures[0].contains("in the past"));
    }

    #[test]
    fn weekends_are_rejected() {
        let mut weekend = request();
        weekend.appointment_date = NaiveDate::from_ymd_opt(2025, 3, 15).expect("valid date");

        let error = weekend
            .validate_at(monday())
            .expect_err("saturday bookings should fail validation");
        assert!(error.failures[0].contains("weekend"));
    }

    #[test]
    fn unknown_service_types_are_not_a_validation_failure() {
        let mut odd = request();
        odd.service_type = "deep-tissue-audit".to_string();

        odd.validate_at(monday()).expect("unlisted services still book");
    }

    #[test]
    fn clock_times_parse_without_zero_padding() {
        assert!(parse_appointment_time("9:00 AM").is_some());
        assert!(parse_appointment_time("12:30 pm").is_some());
        assert!(parse_appointment_time("13:00 PM").is_none());
    }

    #[test]
    fn confirmation_code_uses_upper_cased_identifier_tail() {
        let id = AppointmentId("APPT-4f9c2d81a6b34e55b2c91d70e3aa8bcd".to_string());
        assert_eq!(confirmation_code(&id), "APT-AA8BCD");
    }

    #[test]
    fn synthetic_code_keeps_the_last_six_timestamp_digits() {
        let at = Utc.timestamp_millis_opt(1_700_000_012_034).single().expect("valid timestamp");
        assert_eq!(synthetic_confirmation_code(at), "APT-012034");
    }

    #[test]
    fn booking_context_requires_a_conversation() {
        let with_conversation = request();
        let context = with_conversation.booking_context().expect("conversation present");
        assert_eq!(context.business_id, BusinessId("biz-1".to_string()));

        let mut anonymous = request();
        anonymous.conversation_id = None;
        assert!(anonymous.booking_context().is_none());
    }
}
