//! Diesel-backed upload counters for persistent multi-process coordination.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::backend::{check_windows, RateLimitBackend, RateLimitError, RateLimitResult};
use super::config::Window;
use crate::repository::pool::DbPool;
use crate::repository::records::NewUploadEvent;
use crate::repository::format_timestamp;
use crate::schema::upload_events;
use crate::{with_conn, with_conn_split};

/// Upload counters stored in the `upload_events` table (SQLite/PostgreSQL).
#[derive(Clone)]
pub struct DieselRateLimitBackend {
    pool: DbPool,
}

impl DieselRateLimitBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RateLimitBackend for DieselRateLimitBackend {
    /// Inserts the event first and counts inside the same transaction. A full
    /// window returns an error, which rolls the insert back.
    async fn try_acquire(
        &self,
        key: &str,
        windows: &[Window],
        now: DateTime<Utc>,
    ) -> RateLimitResult<()> {
        let id = uuid::Uuid::new_v4().to_string();
        let created_at = format_timestamp(now);
        let starts: Vec<String> = windows
            .iter()
            .map(|w| format_timestamp(w.scope.start(now)))
            .collect();

        // Insert, then count the windows including the new row
        macro_rules! record_and_check {
            ($conn:ident) => {{
                diesel::insert_into(upload_events::table)
                    .values(NewUploadEvent {
                        id: &id,
                        ip_address: key,
                        created_at: &created_at,
                    })
                    .execute($conn)
                    .await?;

                let mut used = Vec::with_capacity(starts.len());
                for since in &starts {
                    let count: i64 = upload_events::table
                        .filter(upload_events::ip_address.eq(key))
                        .filter(upload_events::created_at.ge(since))
                        .count()
                        .get_result($conn)
                        .await?;
                    // Exclude the row just inserted
                    used.push((count - 1).max(0) as u32);
                }

                check_windows(windows, &used, now)
            }};
        }

        with_conn_split!(self.pool,
            sqlite: conn => {
                // The INSERT takes SQLite's write lock, so writers serialize here
                conn.transaction::<_, RateLimitError, _>(|conn| {
                    async move { record_and_check!(conn) }.scope_boxed()
                })
                .await
            },
            postgres: conn => {
                // READ COMMITTED hides concurrent inserts; serialize per key instead
                conn.transaction::<_, RateLimitError, _>(|conn| {
                    async move {
                        diesel::sql_query("SELECT pg_advisory_xact_lock(hashtext($1))")
                            .bind::<diesel::sql_types::Text, _>(key)
                            .execute(conn)
                            .await?;
                        record_and_check!(conn)
                    }
                    .scope_boxed()
                })
                .await
            }
        )
    }

    async fn count_since(&self, key: &str, since: DateTime<Utc>) -> RateLimitResult<u32> {
        let since = format_timestamp(since);
        let count: i64 = with_conn!(self.pool, conn => {
            upload_events::table
                .filter(upload_events::ip_address.eq(key))
                .filter(upload_events::created_at.ge(&since))
                .count()
                .get_result(&mut conn)
                .await?
        });
        Ok(count.max(0) as u32)
    }

    async fn prune(&self, before: DateTime<Utc>) -> RateLimitResult<u64> {
        let before = format_timestamp(before);
        let deleted = with_conn!(self.pool, conn => {
            diesel::delete(upload_events::table.filter(upload_events::created_at.lt(&before)))
                .execute(&mut conn)
                .await?
        });
        Ok(deleted as u64)
    }
}
