use std::collections::HashMap;

use chrono::Utc;
use tokio::sync::RwLock;

use frontdesk_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use frontdesk_core::quota::{CounterStore, CounterStoreError};

use super::{AppointmentFilter, AppointmentRepository, RepositoryError, ReschedulePatch};

/// In-memory appointment store for tests. Enforces the same one-scheduled-
/// appointment-per-slot rule the SQL schema enforces, so the conflict path
/// behaves identically against either backend.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    rows: RwLock<HashMap<String, Appointment>>,
}

impl InMemoryAppointmentRepository {
    fn matches(filter: &AppointmentFilter, appointment: &Appointment) -> bool {
        if let Some(conversation_id) = &filter.conversation_id {
            if appointment.conversation_id.as_ref() != Some(conversation_id) {
                return false;
            }
        }
        if let Some(business_id) = &filter.business_id {
            if &appointment.business_id != business_id {
                return false;
            }
        }
        if let Some(status) = filter.status {
            if appointment.status != status {
                return false;
            }
        }
        true
    }

    /// Store a row without the scheduled-slot check. Lets tests fixture the
    /// duplicate states a deployment without the uniqueness rule could have
    /// accumulated.
    pub async fn seed(&self, appointment: Appointment) {
        let mut rows = self.rows.write().await;
        rows.insert(appointment.id.0.clone(), appointment);
    }

    fn holds_same_slot(existing: &Appointment, candidate: &Appointment) -> bool {
        existing.status == AppointmentStatus::Scheduled
            && existing.conversation_id.is_some()
            && existing.conversation_id == candidate.conversation_id
            && existing.customer_email == candidate.customer_email
            && existing.appointment_date == candidate.appointment_date
            && existing.appointment_time == candidate.appointment_time
    }
}

#[async_trait::async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = self.rows.read().await;
        let mut matched: Vec<Appointment> =
            rows.values().filter(|row| Self::matches(filter, row)).cloned().collect();
        matched.sort_by(|a, b| {
            b.appointment_date
                .cmp(&a.appointment_date)
                .then_with(|| b.appointment_time.cmp(&a.appointment_time))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        Ok(matched)
    }

    async fn find_by_id(
        &self,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id.0).cloned())
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let mut rows = self.rows.write().await;

        if appointment.status == AppointmentStatus::Scheduled {
            let mut holders: Vec<&Appointment> = rows
                .values()
                .filter(|existing| Self::holds_same_slot(existing, &appointment))
                .collect();
            holders.sort_by(|a, b| {
                a.created_at.cmp(&b.created_at).then_with(|| a.id.0.cmp(&b.id.0))
            });
            if let Some(existing) = holders.first() {
                return Err(RepositoryError::Conflict { existing_id: existing.id.clone() });
            }
        }

        rows.insert(appointment.id.0.clone(), appointment.clone());
        Ok(appointment)
    }

    async fn update(
        &self,
        id: &AppointmentId,
        patch: ReschedulePatch,
    ) -> Result<Appointment, RepositoryError> {
        let mut rows = self.rows.write().await;
        let appointment =
            rows.get_mut(&id.0).ok_or_else(|| RepositoryError::NotFound(id.clone()))?;

        appointment.service_type = patch.service_type;
        appointment.appointment_date = patch.appointment_date;
        appointment.appointment_time = patch.appointment_time;
        appointment.duration_minutes = patch.duration_minutes;
        appointment.notes = patch.notes;
        appointment.updated_at = Utc::now();

        Ok(appointment.clone())
    }

    async fn delete_many(&self, ids: &[AppointmentId]) -> Result<u64, RepositoryError> {
        let mut rows = self.rows.write().await;
        let mut removed = 0u64;
        for id in ids {
            if rows.remove(&id.0).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[derive(Default)]
pub struct InMemoryCounterStore {
    values: RwLock<HashMap<String, i64>>,
}

#[async_trait::async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn get(&self, key: &str) -> Result<Option<i64>, CounterStoreError> {
        let values = self.values.read().await;
        Ok(values.get(key).copied())
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), CounterStoreError> {
        let mut values = self.values.write().await;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use frontdesk_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
    use frontdesk_core::domain::conversation::{BusinessId, ConversationId};

    use crate::repositories::{
        AppointmentFilter, AppointmentRepository, InMemoryAppointmentRepository, RepositoryError,
    };

    fn appointment(id: &str, conversation: Option<&str>) -> Appointment {
        let now = Utc::now();
        Appointment {
            id: AppointmentId(id.to_string()),
            business_id: BusinessId("biz-1".to_string()),
            conversation_id: conversation.map(|value| ConversationId(value.to_string())),
            customer_name: "Alice Example".to_string(),
            customer_email: "alice@example.com".to_string(),
            customer_phone: None,
            service_type: "consultation".to_string(),
            appointment_date: NaiveDate::from_ymd_opt(2025, 3, 10).expect("valid date"),
            appointment_time: "10:00 AM".to_string(),
            duration_minutes: 30,
            status: AppointmentStatus::Scheduled,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn in_memory_repo_round_trips_appointments() {
        let repo = InMemoryAppointmentRepository::default();
        let stored = appointment("APPT-1", Some("conv-1"));

        repo.insert(stored.clone()).await.expect("insert appointment");
        let found = repo.find_by_id(&stored.id).await.expect("find appointment");

        assert_eq!(found, Some(stored));
    }

    #[tokio::test]
    async fn in_memory_repo_reports_conflicts_like_the_sql_backend() {
        let repo = InMemoryAppointmentRepository::default();
        repo.insert(appointment("APPT-1", Some("conv-1"))).await.expect("first insert");

        let error = repo
            .insert(appointment("APPT-2", Some("conv-1")))
            .await
            .expect_err("same slot should conflict");

        assert!(matches!(
            error,
            RepositoryError::Conflict { existing_id } if existing_id.0 == "APPT-1"
        ));
    }

    #[tokio::test]
    async fn anonymous_bookings_never_conflict() {
        let repo = InMemoryAppointmentRepository::default();
        repo.insert(appointment("APPT-1", None)).await.expect("first insert");
        repo.insert(appointment("APPT-2", None)).await.expect("second insert");

        let all = repo.list(&AppointmentFilter::default()).await.expect("list");
        assert_eq!(all.len(), 2);
    }
}
