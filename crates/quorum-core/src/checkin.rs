use std::sync::Arc;

use chrono::Utc;
use quorum_db::Database;
use quorum_db::models::CheckinRow;
use quorum_types::ServiceError;
use tracing::warn;
use uuid::Uuid;

use crate::availability::is_available;
use crate::token::{generate_vote_token, token_lookup_key};
use crate::{TOKEN_MINT_ATTEMPTS, db_err};

/// Idempotent check-in protocol. Per (meeting, attendee) the only
/// transition is not-checked-in → checked-in; re-presenting a held token
/// returns the same token without a second row.
#[derive(Clone)]
pub struct CheckinService {
    db: Arc<Database>,
    token_secret: Arc<str>,
}

impl CheckinService {
    pub fn new(db: Arc<Database>, token_secret: &str) -> Self {
        Self {
            db,
            token_secret: Arc::from(token_secret),
        }
    }

    /// Checks the caller in and returns their vote token.
    ///
    /// If `existing_token` is supplied and already belongs to this
    /// meeting, it is returned unchanged — the retry/reload path. A fresh
    /// token is minted otherwise; the astronomically unlikely lookup-key
    /// collision is absorbed by a bounded retry loop.
    pub fn check_in(
        &self,
        meeting_id: &str,
        code: &str,
        existing_token: Option<&str>,
    ) -> Result<String, ServiceError> {
        let meeting = self
            .db
            .get_meeting(meeting_id)
            .map_err(db_err)?
            .ok_or(ServiceError::NotFound)?;

        if meeting.code != code {
            return Err(ServiceError::InvalidCode);
        }

        if !is_available(meeting.start_time, meeting.end_time, Utc::now()) {
            return Err(ServiceError::NotAvailable);
        }

        if let Some(token) = existing_token {
            let lookup_key = token_lookup_key(&self.token_secret, token);
            if self
                .db
                .get_checkin_by_lookup(meeting_id, &lookup_key)
                .map_err(db_err)?
                .is_some()
            {
                return Ok(token.to_string());
            }
        }

        for attempt in 1..=TOKEN_MINT_ATTEMPTS {
            let token = generate_vote_token();
            let lookup_key = token_lookup_key(&self.token_secret, &token);
            let checkin_id = Uuid::new_v4().to_string();

            match self.db.insert_checkin(&checkin_id, meeting_id, &lookup_key) {
                Ok(()) => return Ok(token),
                Err(e) if quorum_db::is_unique_violation(&e) => {
                    warn!(
                        meeting_id,
                        attempt, "vote token lookup key collision, minting a new token"
                    );
                }
                Err(e) => return Err(db_err(e)),
            }
        }

        Err(ServiceError::Internal(anyhow::anyhow!(
            "failed to mint a unique vote token after {TOKEN_MINT_ATTEMPTS} attempts"
        )))
    }

    /// Read-only resolution of a token to its checkin row, scoped to one
    /// meeting. A token issued for a different meeting resolves to
    /// nothing here.
    pub fn find_checkin(
        &self,
        meeting_id: &str,
        token: &str,
    ) -> Result<Option<CheckinRow>, ServiceError> {
        let lookup_key = token_lookup_key(&self.token_secret, token);
        self.db
            .get_checkin_by_lookup(meeting_id, &lookup_key)
            .map_err(db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn service() -> (CheckinService, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (CheckinService::new(db.clone(), "test-secret"), db)
    }

    fn open_meeting(db: &Database, code: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        db.insert_meeting(&id, now - Duration::minutes(5), now + Duration::hours(1), code)
            .unwrap();
        id
    }

    #[test]
    fn issues_a_token_and_stores_one_checkin() {
        let (svc, db) = service();
        let meeting = open_meeting(&db, "BAKOMEDU");

        let token = svc.check_in(&meeting, "BAKOMEDU", None).unwrap();
        assert!(!token.is_empty());

        let row = svc.find_checkin(&meeting, &token).unwrap().unwrap();
        assert_eq!(row.meeting_id, meeting);
        // the raw token never reaches the store
        assert_ne!(row.token_lookup_key, token);
    }

    #[test]
    fn re_presenting_the_token_is_idempotent() {
        let (svc, db) = service();
        let meeting = open_meeting(&db, "BAKOMEDU");

        let token = svc.check_in(&meeting, "BAKOMEDU", None).unwrap();
        let again = svc.check_in(&meeting, "BAKOMEDU", Some(&token)).unwrap();
        let third = svc.check_in(&meeting, "BAKOMEDU", Some(&token)).unwrap();
        assert_eq!(token, again);
        assert_eq!(token, third);

        let count = db
            .checkin_counts()
            .unwrap()
            .get(&meeting)
            .copied()
            .unwrap_or(0);
        assert_eq!(count, 1);
    }

    #[test]
    fn unknown_stale_token_gets_a_fresh_one() {
        let (svc, db) = service();
        let meeting = open_meeting(&db, "BAKOMEDU");

        let token = svc
            .check_in(&meeting, "BAKOMEDU", Some("left-over-from-elsewhere"))
            .unwrap();
        assert_ne!(token, "left-over-from-elsewhere");
    }

    #[test]
    fn rejects_missing_meeting_and_bad_code() {
        let (svc, db) = service();
        let meeting = open_meeting(&db, "BAKOMEDU");

        assert!(matches!(
            svc.check_in("no-such-meeting", "BAKOMEDU", None),
            Err(ServiceError::NotFound)
        ));
        assert!(matches!(
            svc.check_in(&meeting, "WRONG", None),
            Err(ServiceError::InvalidCode)
        ));
    }

    #[test]
    fn rejects_checkin_outside_the_window() {
        let (svc, db) = service();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        // meeting ended an hour ago
        db.insert_meeting(&id, now - Duration::hours(3), now - Duration::hours(1), "BAKOMEDU")
            .unwrap();

        assert!(matches!(
            svc.check_in(&id, "BAKOMEDU", None),
            Err(ServiceError::NotAvailable)
        ));
    }

    #[test]
    fn token_for_another_meeting_does_not_resolve() {
        let (svc, db) = service();
        let m1 = open_meeting(&db, "BAKOMEDU");
        let m2 = open_meeting(&db, "TUVEXOLA");

        let token = svc.check_in(&m1, "BAKOMEDU", None).unwrap();
        assert!(svc.find_checkin(&m2, &token).unwrap().is_none());
    }
}
