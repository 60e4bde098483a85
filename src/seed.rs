//! Demo data for the `calls` table
//!
//! Replaces every row with randomly generated call records so there is
//! something to ask questions about.

use crate::db::connection::classify_error;
use crate::db::MySqlExecutor;
use crate::error::Result;
use chrono::{Duration, NaiveDateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::mysql::MySqlConnection;
use sqlx::Connection;
use tracing::{info, warn};

pub const COUNTRIES: [&str; 7] = ["France", "Germany", "USA", "Canada", "Spain", "Brazil", "Japan"];
pub const CALL_TYPES: [&str; 2] = ["incoming", "outgoing"];

/// Records are spread over this many days before now.
const WINDOW_DAYS: i64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub timestamp: NaiveDateTime,
    pub duration_minutes: f64,
    pub origin_country: &'static str,
    pub destination_country: &'static str,
    pub call_type: &'static str,
}

impl CallRecord {
    pub fn random<R: Rng + ?Sized>(rng: &mut R, now: NaiveDateTime) -> Self {
        let offset_secs = rng.gen_range(0..=WINDOW_DAYS * 24 * 60 * 60);
        let duration = (rng.gen_range(1.0..=30.0_f64) * 100.0).round() / 100.0;

        let origin = COUNTRIES[rng.gen_range(0..COUNTRIES.len())];
        let destinations: Vec<&'static str> =
            COUNTRIES.iter().copied().filter(|c| *c != origin).collect();
        let destination = destinations
            .choose(rng)
            .copied()
            .unwrap_or(COUNTRIES[0]);

        Self {
            timestamp: now - Duration::seconds(offset_secs),
            duration_minutes: duration,
            origin_country: origin,
            destination_country: destination,
            call_type: CALL_TYPES[rng.gen_range(0..CALL_TYPES.len())],
        }
    }
}

pub fn generate(count: usize) -> Vec<CallRecord> {
    let mut rng = rand::thread_rng();
    let now = Utc::now().naive_utc();
    (0..count).map(|_| CallRecord::random(&mut rng, now)).collect()
}

/// Deletes all calls and inserts `count` fresh records in one transaction.
pub async fn reseed(executor: &MySqlExecutor, count: usize) -> Result<usize> {
    let records = generate(count);
    let mut conn = executor.connect().await?;

    let result = replace_calls(&mut conn, &records).await;

    if let Err(e) = conn.close().await {
        warn!("Failed to close database connection cleanly: {}", e);
    }
    if let Ok(inserted) = &result {
        info!("Inserted {} fake call records", inserted);
    }
    result
}

async fn replace_calls(conn: &mut MySqlConnection, records: &[CallRecord]) -> Result<usize> {
    let mut tx = conn.begin().await.map_err(classify_error)?;

    sqlx::query("DELETE FROM calls")
        .execute(&mut *tx)
        .await
        .map_err(classify_error)?;

    for record in records {
        sqlx::query(
            "INSERT INTO calls (timestamp, duration_minutes, origin_country, destination_country, call_type) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.timestamp)
        .bind(record.duration_minutes)
        .bind(record.origin_country)
        .bind(record.destination_country)
        .bind(record.call_type)
        .execute(&mut *tx)
        .await
        .map_err(classify_error)?;
    }

    tx.commit().await.map_err(classify_error)?;
    Ok(records.len())
}
