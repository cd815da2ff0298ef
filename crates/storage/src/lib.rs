use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use uuid::Uuid;

use shared::{
    domain::{AppointmentStatus, FormRecord, ProviderId, RegistrationId},
    protocol::{AppointmentRequest, AppointmentSummary},
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredRegistration {
    pub registration_id: RegistrationId,
    pub email: String,
    pub record: FormRecord,
    pub submitted_at: DateTime<Utc>,
}

/// Narrows [`Storage::list_appointments`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub provider_id: Option<ProviderId>,
    pub status: Option<AppointmentStatus>,
    pub date: Option<NaiveDate>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn set_availability(&self, provider_id: &ProviderId, cells: &[String]) -> Result<()> {
        let cells_json = serde_json::to_string(cells)?;
        sqlx::query(
            "INSERT INTO provider_availability (provider_id, cells_json, updated_at)
             VALUES (?, ?, CURRENT_TIMESTAMP)
             ON CONFLICT(provider_id) DO UPDATE SET cells_json = excluded.cells_json, updated_at = CURRENT_TIMESTAMP",
        )
        .bind(provider_id.as_str())
        .bind(cells_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to store availability for {}", provider_id.as_str()))?;
        Ok(())
    }

    pub async fn get_availability(&self, provider_id: &ProviderId) -> Result<Option<Vec<String>>> {
        let row = sqlx::query("SELECT cells_json FROM provider_availability WHERE provider_id = ?")
            .bind(provider_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| {
            let raw = r.get::<String, _>(0);
            serde_json::from_str(&raw).context("corrupt availability payload")
        })
        .transpose()
    }

    /// Returns `None` when a registration with the same email (case-insensitive)
    /// already exists.
    pub async fn insert_registration(
        &self,
        email: &str,
        record_json: &str,
        submitted_at: DateTime<Utc>,
    ) -> Result<Option<RegistrationId>> {
        let row = sqlx::query(
            "INSERT INTO registrations (email, record_json, submitted_at) VALUES (?, ?, ?)
             ON CONFLICT(email) DO NOTHING
             RETURNING id",
        )
        .bind(email)
        .bind(record_json)
        .bind(submitted_at)
        .fetch_optional(&self.pool)
        .await
        .context("failed to insert registration")?;
        Ok(row.map(|r| RegistrationId(r.get::<i64, _>(0))))
    }

    pub async fn registration_by_email(&self, email: &str) -> Result<Option<StoredRegistration>> {
        let row = sqlx::query(
            "SELECT id, email, record_json, submitted_at FROM registrations WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            let record_json = r.get::<String, _>(2);
            Ok(StoredRegistration {
                registration_id: RegistrationId(r.get::<i64, _>(0)),
                email: r.get::<String, _>(1),
                record: serde_json::from_str(&record_json)
                    .context("corrupt registration payload")?,
                submitted_at: r.get::<DateTime<Utc>, _>(3),
            })
        })
        .transpose()
    }

    pub async fn count_registrations(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM registrations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Books a slot. Returns `None` when the provider already has a
    /// non-cancelled appointment at the same date and start time; the partial
    /// unique index on active slots decides, so concurrent bookers cannot both
    /// win.
    pub async fn create_appointment(
        &self,
        request: &AppointmentRequest,
    ) -> Result<Option<AppointmentSummary>> {
        let summary = AppointmentSummary {
            appointment_id: Uuid::new_v4().to_string(),
            provider_id: request.provider_id.clone(),
            patient_name: request.patient_name.clone(),
            date: request.date,
            start_time: request.start_time.clone(),
            status: AppointmentStatus::Scheduled,
            reason: request.reason.clone(),
            created_at: Utc::now(),
        };
        let inserted = sqlx::query(
            "INSERT INTO appointments (id, provider_id, patient_name, date, start_time, status, reason, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&summary.appointment_id)
        .bind(summary.provider_id.as_str())
        .bind(&summary.patient_name)
        .bind(summary.date)
        .bind(&summary.start_time)
        .bind(summary.status.as_str())
        .bind(summary.reason.as_deref())
        .bind(summary.created_at)
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => Ok(Some(summary)),
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => Ok(None),
            Err(err) => Err(anyhow::Error::new(err).context("failed to insert appointment")),
        }
    }

    pub async fn list_appointments(&self, filter: &AppointmentFilter) -> Result<Vec<AppointmentSummary>> {
        let rows = sqlx::query(
            "SELECT id, provider_id, patient_name, date, start_time, status, reason, created_at
             FROM appointments
             WHERE (?1 IS NULL OR provider_id = ?1)
               AND (?2 IS NULL OR status = ?2)
               AND (?3 IS NULL OR date = ?3)
             ORDER BY date ASC, start_time ASC",
        )
        .bind(filter.provider_id.as_ref().map(ProviderId::as_str))
        .bind(filter.status.map(AppointmentStatus::as_str))
        .bind(filter.date)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(appointment_from_row).collect()
    }

    /// Returns `false` when no appointment has that id.
    pub async fn update_appointment_status(
        &self,
        appointment_id: &str,
        status: AppointmentStatus,
    ) -> Result<bool> {
        let result = sqlx::query("UPDATE appointments SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(appointment_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

fn appointment_from_row(r: &SqliteRow) -> Result<AppointmentSummary> {
    let raw_status = r.get::<String, _>(5);
    let status = AppointmentStatus::parse(&raw_status)
        .with_context(|| format!("unknown appointment status '{raw_status}'"))?;
    Ok(AppointmentSummary {
        appointment_id: r.get::<String, _>(0),
        provider_id: ProviderId(r.get::<String, _>(1)),
        patient_name: r.get::<String, _>(2),
        date: r.get::<NaiveDate, _>(3),
        start_time: r.get::<String, _>(4),
        status,
        reason: r.get::<Option<String>, _>(6),
        created_at: r.get::<DateTime<Utc>, _>(7),
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url.starts_with("sqlite::memory:") || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod lib_tests;
