//! Transcription repository.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::pool::{DbError, DbPool};
use super::records::TranscriptionRecord;
use crate::models::Transcription;
use crate::schema::transcriptions;
use crate::with_conn;

#[derive(Clone)]
pub struct TranscriptionRepository {
    pool: DbPool,
}

impl TranscriptionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, id: &str) -> Result<Option<Transcription>, DbError> {
        let record: Option<TranscriptionRecord> = with_conn!(self.pool, conn => {
            transcriptions::table
                .find(id)
                .first::<TranscriptionRecord>(&mut conn)
                .await
                .optional()?
        });
        Ok(record.map(Transcription::from))
    }

    /// Most recent transcription of a project.
    pub async fn latest_for_project(
        &self,
        project_id: &str,
    ) -> Result<Option<Transcription>, DbError> {
        let record: Option<TranscriptionRecord> = with_conn!(self.pool, conn => {
            transcriptions::table
                .filter(transcriptions::project_id.eq(project_id))
                .order(transcriptions::created_at.desc())
                .first::<TranscriptionRecord>(&mut conn)
                .await
                .optional()?
        });
        Ok(record.map(Transcription::from))
    }
}
