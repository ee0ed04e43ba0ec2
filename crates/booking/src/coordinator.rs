//! Appointment coordination: route a conversation into a create or a
//! reschedule flow, and converge duplicate submissions onto one record.
//!
//! The existence check and the insert are not one transaction. The race
//! window between them is closed after the fact by the storage layer's
//! scheduled-slot uniqueness rule: a losing writer gets a conflict and is
//! reconciled onto the surviving row. Best-effort, not transactional.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{error, info, warn};

use frontdesk_core::booking::{confirmation_code, synthetic_confirmation_code, BookingRequest};
use frontdesk_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use frontdesk_core::domain::conversation::ConversationId;
use frontdesk_core::domain::service::duration_for;
use frontdesk_core::errors::{ApplicationError, DomainError};
use frontdesk_db::repositories::{
    AppointmentFilter, AppointmentRepository, RepositoryError, ReschedulePatch,
};

/// Outcome of a booking submission. `Degraded` means persistence was
/// unreachable and the code was fabricated from the clock so the user-facing
/// flow could still complete; it is not authoritative until reconciled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingConfirmation {
    Authoritative { appointment: Appointment, confirmation_code: String, reconciled: bool },
    Degraded { confirmation_code: String },
}

impl BookingConfirmation {
    pub fn confirmation_code(&self) -> &str {
        match self {
            Self::Authoritative { confirmation_code, .. }
            | Self::Degraded { confirmation_code } => confirmation_code,
        }
    }

    pub fn is_authoritative(&self) -> bool {
        matches!(self, Self::Authoritative { .. })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub duplicate_groups_found: u64,
    pub appointments_removed: u64,
}

pub struct AppointmentCoordinator {
    repository: Arc<dyn AppointmentRepository>,
}

impl AppointmentCoordinator {
    pub fn new(repository: Arc<dyn AppointmentRepository>) -> Self {
        Self { repository }
    }

    /// The appointment still scheduled for this conversation, if any. Callers
    /// use the answer to route into a reschedule flow instead of a fresh
    /// booking wizard.
    ///
    /// A lookup failure is treated as "none found": a transient storage
    /// problem must never block a customer from booking.
    pub async fn find_active(
        &self,
        conversation_id: Option<&ConversationId>,
    ) -> Option<Appointment> {
        let conversation_id = conversation_id?;
        let filter = AppointmentFilter::scheduled_for_conversation(conversation_id.clone());

        match self.repository.list(&filter).await {
            Ok(rows) => rows.into_iter().max_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0))
            }),
            Err(lookup_error) => {
                warn!(
                    event_name = "booking.lookup.failed",
                    conversation_id = %conversation_id,
                    error = %lookup_error,
                    "treating active-appointment lookup failure as none found"
                );
                None
            }
        }
    }

    /// Create a new appointment, or reschedule `existing_id` in place.
    ///
    /// Validation and unknown-id failures are the caller's problem;
    /// persistence outages are absorbed into a degraded confirmation so the
    /// conversation can finish.
    pub async fn create_or_reschedule(
        &self,
        request: BookingRequest,
        existing_id: Option<&AppointmentId>,
    ) -> Result<BookingConfirmation, ApplicationError> {
        request.validate().map_err(DomainError::from)?;

        match existing_id {
            Some(id) => self.reschedule(request, id).await,
            None => Ok(self.create(request).await),
        }
    }

    async fn create(&self, request: BookingRequest) -> BookingConfirmation {
        let now = Utc::now();
        let appointment = Appointment {
            id: AppointmentId::generate(),
            business_id: request.business_id.clone(),
            conversation_id: request.conversation_id.clone(),
            customer_name: request.customer_name.clone(),
            customer_email: request.customer_email.clone(),
            customer_phone: request.customer_phone.clone(),
            service_type: request.service_type.clone(),
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time.clone(),
            duration_minutes: duration_for(&request.service_type),
            status: AppointmentStatus::Scheduled,
            notes: request.notes.clone(),
            created_at: now,
            updated_at: now,
        };

        match self.repository.insert(appointment).await {
            Ok(stored) => {
                info!(
                    event_name = "booking.create.stored",
                    appointment_id = %stored.id,
                    business_id = %stored.business_id,
                    "appointment scheduled"
                );
                BookingConfirmation::Authoritative {
                    confirmation_code: confirmation_code(&stored.id),
                    appointment: stored,
                    reconciled: false,
                }
            }
            Err(RepositoryError::Conflict { existing_id }) => {
                let context = request.booking_context();
                info!(
                    event_name = "booking.create.conflict_reconciled",
                    existing_id = %existing_id,
                    conversation_id = context
                        .as_ref()
                        .map(|ctx| ctx.conversation_id.0.as_str())
                        .unwrap_or("unknown"),
                    business_id = %request.business_id,
                    "duplicate submission converged onto existing appointment"
                );
                self.reconcile_onto(existing_id).await
            }
            Err(insert_error) => {
                error!(
                    event_name = "booking.create.degraded",
                    business_id = %request.business_id,
                    error = %insert_error,
                    "persistence unavailable, issuing synthetic confirmation"
                );
                BookingConfirmation::Degraded {
                    confirmation_code: synthetic_confirmation_code(Utc::now()),
                }
            }
        }
    }

    /// Resolve a duplicate-slot conflict by adopting the row that won the
    /// race, as if it had been the one just created.
    async fn reconcile_onto(&self, existing_id: AppointmentId) -> BookingConfirmation {
        match self.repository.find_by_id(&existing_id).await {
            Ok(Some(existing)) => BookingConfirmation::Authoritative {
                confirmation_code: confirmation_code(&existing.id),
                appointment: existing,
                reconciled: true,
            },
            Ok(None) | Err(_) => {
                warn!(
                    event_name = "booking.create.reconcile_readback_failed",
                    existing_id = %existing_id,
                    "conflicting row could not be read back; degrading confirmation"
                );
                BookingConfirmation::Degraded { confirmation_code: confirmation_code(&existing_id) }
            }
        }
    }

    async fn reschedule(
        &self,
        request: BookingRequest,
        id: &AppointmentId,
    ) -> Result<BookingConfirmation, ApplicationError> {
        let existing = match self.repository.find_by_id(id).await {
            Ok(Some(existing)) => existing,
            Ok(None) => return Err(ApplicationError::AppointmentNotFound(id.clone())),
            Err(read_error) => {
                error!(
                    event_name = "booking.reschedule.degraded",
                    appointment_id = %id,
                    error = %read_error,
                    "persistence unavailable, issuing synthetic confirmation"
                );
                return Ok(BookingConfirmation::Degraded {
                    confirmation_code: synthetic_confirmation_code(Utc::now()),
                });
            }
        };

        if existing.status.is_terminal() {
            return Err(ApplicationError::AppointmentClosed {
                id: existing.id,
                status: existing.status,
            });
        }

        let patch = ReschedulePatch {
            service_type: request.service_type.clone(),
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time.clone(),
            duration_minutes: duration_for(&request.service_type),
            notes: request.notes.clone(),
        };

        match self.repository.update(id, patch).await {
            Ok(updated) => {
                info!(
                    event_name = "booking.reschedule.stored",
                    appointment_id = %updated.id,
                    business_id = %updated.business_id,
                    "appointment rescheduled"
                );
                Ok(BookingConfirmation::Authoritative {
                    confirmation_code: confirmation_code(&updated.id),
                    appointment: updated,
                    reconciled: false,
                })
            }
            Err(RepositoryError::NotFound(missing)) => {
                Err(ApplicationError::AppointmentNotFound(missing))
            }
            Err(update_error) => {
                error!(
                    event_name = "booking.reschedule.degraded",
                    appointment_id = %id,
                    error = %update_error,
                    "persistence unavailable, issuing synthetic confirmation"
                );
                Ok(BookingConfirmation::Degraded {
                    confirmation_code: synthetic_confirmation_code(Utc::now()),
                })
            }
        }
    }

    /// Batch maintenance: collapse every duplicate scheduled slot down to its
    /// oldest member. Unlike the interactive path this aborts on the first
    /// storage failure; a partial delete could destroy the wrong record.
    pub async fn cleanup_duplicates(&self) -> Result<CleanupReport, ApplicationError> {
        let scheduled = self
            .repository
            .list(&AppointmentFilter::with_status(AppointmentStatus::Scheduled))
            .await
            .map_err(|list_error| ApplicationError::Persistence(list_error.to_string()))?;

        let mut groups: HashMap<SlotKey, Vec<Appointment>> = HashMap::new();
        for appointment in scheduled {
            groups.entry(slot_key(&appointment)).or_default().push(appointment);
        }

        let mut duplicate_groups_found = 0u64;
        let mut ids_to_delete = Vec::new();
        for members in groups.values_mut() {
            if members.len() < 2 {
                continue;
            }
            duplicate_groups_found += 1;
            members.sort_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0))
            });
            ids_to_delete.extend(members.iter().skip(1).map(|member| member.id.clone()));
        }

        if ids_to_delete.is_empty() {
            return Ok(CleanupReport::default());
        }

        let appointments_removed = self
            .repository
            .delete_many(&ids_to_delete)
            .await
            .map_err(|delete_error| ApplicationError::Persistence(delete_error.to_string()))?;

        info!(
            event_name = "booking.cleanup.completed",
            duplicate_groups_found,
            appointments_removed,
            "duplicate appointments collapsed"
        );

        Ok(CleanupReport { duplicate_groups_found, appointments_removed })
    }
}

type SlotKey = (Option<String>, String, NaiveDate, String);

fn slot_key(appointment: &Appointment) -> SlotKey {
    (
        appointment.conversation_id.as_ref().map(|id| id.0.clone()),
        appointment.customer_email.clone(),
        appointment.appointment_date,
        appointment.appointment_time.clone(),
    )
}
