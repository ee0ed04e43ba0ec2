use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use frontdesk_core::domain::appointment::{Appointment, AppointmentId, AppointmentStatus};
use frontdesk_core::domain::conversation::{BusinessId, ConversationId};

use super::{AppointmentFilter, AppointmentRepository, RepositoryError, ReschedulePatch};
use crate::DbPool;

pub struct SqlAppointmentRepository {
    pool: DbPool,
}

impl SqlAppointmentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Id of the scheduled row already occupying this appointment's slot,
    /// if any. Used to resolve unique-index violations into a conflict the
    /// caller can reconcile against.
    async fn scheduled_slot_owner(
        &self,
        appointment: &Appointment,
    ) -> Result<Option<AppointmentId>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id FROM appointments
             WHERE status = 'scheduled'
               AND conversation_id IS ?
               AND customer_email = ?
               AND appointment_date = ?
               AND appointment_time = ?
             ORDER BY datetime(created_at) ASC, id ASC
             LIMIT 1",
        )
        .bind(appointment.conversation_id.as_ref().map(|id| id.0.as_str()))
        .bind(&appointment.customer_email)
        .bind(appointment.appointment_date.to_string())
        .bind(&appointment.appointment_time)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| AppointmentId(row.get::<String, _>("id"))))
    }
}

#[async_trait::async_trait]
impl AppointmentRepository for SqlAppointmentRepository {
    async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, business_id, conversation_id, customer_name, customer_email,
                    customer_phone, service_type, appointment_date, appointment_time,
                    duration_minutes, status, notes, created_at, updated_at
             FROM appointments
             WHERE (?1 IS NULL OR conversation_id = ?1)
               AND (?2 IS NULL OR business_id = ?2)
               AND (?3 IS NULL OR status = ?3)
             ORDER BY appointment_date DESC, appointment_time DESC, datetime(created_at) DESC",
        )
        .bind(filter.conversation_id.as_ref().map(|id| id.0.as_str()))
        .bind(filter.business_id.as_ref().map(|id| id.0.as_str()))
        .bind(filter.status.map(|status| status.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_appointment).collect()
    }

    async fn find_by_id(
        &self,
        id: &AppointmentId,
    ) -> Result<Option<Appointment>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, business_id, conversation_id, customer_name, customer_email,
                    customer_phone, service_type, appointment_date, appointment_time,
                    duration_minutes, status, notes, created_at, updated_at
             FROM appointments WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_appointment).transpose()
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO appointments (
                id, business_id, conversation_id, customer_name, customer_email,
                customer_phone, service_type, appointment_date, appointment_time,
                duration_minutes, status, notes, created_at, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&appointment.id.0)
        .bind(&appointment.business_id.0)
        .bind(appointment.conversation_id.as_ref().map(|id| id.0.as_str()))
        .bind(&appointment.customer_name)
        .bind(&appointment.customer_email)
        .bind(appointment.customer_phone.as_deref())
        .bind(&appointment.service_type)
        .bind(appointment.appointment_date.to_string())
        .bind(&appointment.appointment_time)
        .bind(appointment.duration_minutes as i64)
        .bind(appointment.status.as_str())
        .bind(appointment.notes.as_deref())
        .bind(appointment.created_at.to_rfc3339())
        .bind(appointment.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await;

        if let Err(error) = result {
            let unique_violation =
                matches!(&error, sqlx::Error::Database(db) if db.is_unique_violation());
            if unique_violation {
                if let Some(existing_id) = self.scheduled_slot_owner(&appointment).await? {
                    return Err(RepositoryError::Conflict { existing_id });
                }
            }
            return Err(RepositoryError::Database(error));
        }

        Ok(appointment)
    }

    async fn update(
        &self,
        id: &AppointmentId,
        patch: ReschedulePatch,
    ) -> Result<Appointment, RepositoryError> {
        let updated_at = Utc::now();
        let result = sqlx::query(
            "UPDATE appointments
             SET service_type = ?, appointment_date = ?, appointment_time = ?,
                 duration_minutes = ?, notes = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&patch.service_type)
        .bind(patch.appointment_date.to_string())
        .bind(&patch.appointment_time)
        .bind(patch.duration_minutes as i64)
        .bind(patch.notes.as_deref())
        .bind(updated_at.to_rfc3339())
        .bind(&id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.clone()));
        }

        self.find_by_id(id).await?.ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    async fn delete_many(&self, ids: &[AppointmentId]) -> Result<u64, RepositoryError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0u64;
        for id in ids {
            let result = sqlx::query("DELETE FROM appointments WHERE id = ?")
                .bind(&id.0)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        Ok(removed)
    }
}

fn decode_appointment(row: SqliteRow) -> Result<Appointment, RepositoryError> {
    let date_raw = row.get::<String, _>("appointment_date");
    let appointment_date = date_raw
        .parse::<NaiveDate>()
        .map_err(|error| RepositoryError::Decode(format!("appointment_date `{date_raw}`: {error}")))?;

    let status_raw = row.get::<String, _>("status");
    let status = AppointmentStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_raw}`")))?;

    let duration = row.get::<i64, _>("duration_minutes");
    let duration_minutes = u32::try_from(duration)
        .map_err(|_| RepositoryError::Decode(format!("negative duration `{duration}`")))?;

    Ok(Appointment {
        id: AppointmentId(row.get::<String, _>("id")),
        business_id: BusinessId(row.get::<String, _>("business_id")),
        conversation_id: row.get::<Option<String>, _>("conversation_id").map(ConversationId),
        customer_name: row.get::<String, _>("customer_name"),
        customer_email: row.get::<String, _>("customer_email"),
        customer_phone: row.get::<Option<String>, _>("customer_phone"),
        service_type: row.get::<String, _>("service_type"),
        appointment_date,
        appointment_time: row.get::<String, _>("appointment_time"),
        duration_minutes,
        status,
        notes: row.get::<Option<String>, _>("notes"),
        created_at: decode_timestamp(&row, "created_at")?,
        updated_at: decode_timestamp(&row, "updated_at")?,
    })
}

fn decode_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw = row.get::<String, _>(column);
    DateTime::parse_from_rfc3339(&raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}
