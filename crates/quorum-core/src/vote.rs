use std::sync::Arc;

use chrono::Utc;
use quorum_db::Database;
use quorum_types::{Choice, ServiceError};
use uuid::Uuid;

use crate::availability::is_available;
use crate::db_err;
use crate::token::token_lookup_key;

/// Exactly-once vote casting per (poll, checkin) pair.
#[derive(Clone)]
pub struct VoteService {
    db: Arc<Database>,
    token_secret: Arc<str>,
}

impl VoteService {
    pub fn new(db: Arc<Database>, token_secret: &str) -> Self {
        Self {
            db,
            token_secret: Arc::from(token_secret),
        }
    }

    /// Casts a vote. Under N concurrent identical calls exactly one
    /// succeeds and the rest see `AlreadyVoted`.
    ///
    /// The pre-check below is only a cheap early exit: two callers can
    /// both pass it before either insert commits. The UNIQUE constraint
    /// on (poll_id, checkin_id) is the real arbiter, and its violation is
    /// mapped back to `AlreadyVoted` rather than an internal error.
    pub fn cast_vote(
        &self,
        meeting_id: &str,
        poll_id: &str,
        token: &str,
        choice: Choice,
    ) -> Result<(), ServiceError> {
        let meeting = self
            .db
            .get_meeting(meeting_id)
            .map_err(db_err)?
            .ok_or(ServiceError::NotFound)?;

        if !is_available(meeting.start_time, meeting.end_time, Utc::now()) {
            return Err(ServiceError::NotAvailable);
        }

        let poll = self
            .db
            .get_poll(poll_id)
            .map_err(db_err)?
            .filter(|p| p.meeting_id == meeting_id)
            .ok_or(ServiceError::InvalidPoll)?;

        let lookup_key = token_lookup_key(&self.token_secret, token);
        let checkin = self
            .db
            .get_checkin_by_lookup(meeting_id, &lookup_key)
            .map_err(db_err)?
            .ok_or(ServiceError::InvalidToken)?;

        if self.db.vote_exists(&poll.id, &checkin.id).map_err(db_err)? {
            return Err(ServiceError::AlreadyVoted);
        }

        let vote_id = Uuid::new_v4().to_string();
        match self
            .db
            .insert_vote(&vote_id, &poll.id, &checkin.id, choice.as_str())
        {
            Ok(()) => Ok(()),
            Err(e) if quorum_db::is_unique_violation(&e) => Err(ServiceError::AlreadyVoted),
            Err(e) => Err(db_err(e)),
        }
    }
}
