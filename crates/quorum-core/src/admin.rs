use std::sync::Arc;

use chrono::{DateTime, Utc};
use quorum_db::Database;
use quorum_types::ServiceError;
use tracing::{info, warn};
use uuid::Uuid;

use crate::token::make_pronounceable;
use crate::view::ViewCache;
use crate::{MEETING_CODE_ATTEMPTS, MEETING_CODE_LENGTH, db_err};

/// Admin mutations. Every committed create/delete invalidates the shared
/// view snapshots before returning, so pollers see the change on their
/// next tick instead of after the TTL runs out.
#[derive(Clone)]
pub struct AdminService {
    db: Arc<Database>,
    cache: Arc<ViewCache>,
}

impl AdminService {
    pub fn new(db: Arc<Database>, cache: Arc<ViewCache>) -> Self {
        Self { db, cache }
    }

    /// Creates a meeting with a freshly minted pronounceable code.
    /// Returns (meeting id, code).
    pub fn create_meeting(
        &self,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(String, String), ServiceError> {
        if end_time <= start_time {
            return Err(ServiceError::InvalidInput(
                "end time must be after start time".to_string(),
            ));
        }

        for _ in 0..MEETING_CODE_ATTEMPTS {
            let id = Uuid::new_v4().to_string();
            let code = make_pronounceable(MEETING_CODE_LENGTH);

            match self.db.insert_meeting(&id, start_time, end_time, &code) {
                Ok(()) => {
                    self.cache.invalidate_meetings();
                    info!(meeting_id = %id, "meeting created");
                    return Ok((id, code));
                }
                Err(e) if quorum_db::is_unique_violation(&e) => {
                    warn!("meeting code collision, minting a new code");
                }
                Err(e) => return Err(db_err(e)),
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "failed to generate a unique meeting code after {MEETING_CODE_ATTEMPTS} attempts"
        )))
    }

    /// Deletes a meeting; its polls, checkins and votes cascade with it.
    /// Returns false if no such meeting existed.
    pub fn delete_meeting(&self, meeting_id: &str) -> Result<bool, ServiceError> {
        let deleted = self.db.delete_meeting(meeting_id).map_err(db_err)?;
        if deleted {
            self.cache.invalidate_meetings();
            info!(meeting_id, "meeting deleted");
        }
        Ok(deleted)
    }

    /// Adds a poll to an existing meeting. Returns the poll id.
    pub fn create_poll(&self, meeting_id: &str, name: &str) -> Result<String, ServiceError> {
        if name.trim().is_empty() {
            return Err(ServiceError::InvalidInput(
                "poll name must not be empty".to_string(),
            ));
        }

        self.db
            .get_meeting(meeting_id)
            .map_err(db_err)?
            .ok_or(ServiceError::NotFound)?;

        if self
            .db
            .poll_name_exists(meeting_id, name.trim())
            .map_err(db_err)?
        {
            return Err(ServiceError::InvalidInput(
                "a poll with this name already exists".to_string(),
            ));
        }

        let id = Uuid::new_v4().to_string();
        self.db
            .insert_poll(&id, meeting_id, name.trim())
            .map_err(db_err)?;
        self.cache.invalidate_meetings();
        info!(meeting_id, poll_id = %id, "poll created");
        Ok(id)
    }

    /// Deletes a poll, verifying it belongs to the given meeting.
    /// Returns false if no such poll existed.
    pub fn delete_poll(&self, meeting_id: &str, poll_id: &str) -> Result<bool, ServiceError> {
        let Some(poll) = self.db.get_poll(poll_id).map_err(db_err)? else {
            return Ok(false);
        };
        if poll.meeting_id != meeting_id {
            return Err(ServiceError::InvalidPoll);
        }

        let deleted = self.db.delete_poll(poll_id).map_err(db_err)?;
        if deleted {
            self.cache.invalidate_meetings();
            info!(meeting_id, poll_id, "poll deleted");
        }
        Ok(deleted)
    }
}
