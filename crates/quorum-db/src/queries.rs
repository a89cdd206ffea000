use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use crate::Database;
use crate::models::{CheckinRow, MeetingRow, PollRow, VoteRow};

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so that the
/// SQL `ORDER BY start_time` matches chronological order.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn meeting_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MeetingRow> {
    Ok(MeetingRow {
        id: row.get(0)?,
        start_time: decode_ts(1, row.get(1)?)?,
        end_time: decode_ts(2, row.get(2)?)?,
        code: row.get(3)?,
    })
}

impl Database {
    // -- Meetings --

    pub fn insert_meeting(
        &self,
        id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        code: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO meetings (id, start_time, end_time, code) VALUES (?1, ?2, ?3, ?4)",
                params![id, encode_ts(start_time), encode_ts(end_time), code],
            )?;
            Ok(())
        })
    }

    pub fn get_meeting(&self, id: &str) -> Result<Option<MeetingRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, start_time, end_time, code FROM meetings WHERE id = ?1",
                [id],
                meeting_from_row,
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// All meetings, newest start time first.
    pub fn list_meetings(&self) -> Result<Vec<MeetingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, start_time, end_time, code FROM meetings ORDER BY start_time DESC",
            )?;
            let rows = stmt
                .query_map([], meeting_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Deletes a meeting; polls, checkins and votes go with it via the
    /// FK cascade. Returns false if no such meeting existed.
    pub fn delete_meeting(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let affected = conn.execute("DELETE FROM meetings WHERE id = ?1", [id])?;
            Ok(affected > 0)
        })
    }

    // -- Polls --

    pub fn insert_poll(&self, id: &str, meeting_id: &str, name: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO polls (id, meeting_id, name) VALUES (?1, ?2, ?3)",
                params![id, meeting_id, name],
            )?;
            Ok(())
        })
    }

    pub fn get_poll(&self, id: &str) -> Result<Option<PollRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, meeting_id, name FROM polls WHERE id = ?1",
                [id],
                |row| {
                    Ok(PollRow {
                        id: row.get(0)?,
                        meeting_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
        })
    }

    /// True if the meeting already has a poll with this exact name.
    pub fn poll_name_exists(&self, meeting_id: &str, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT id FROM polls WHERE meeting_id = ?1 AND name = ?2",
                    params![meeting_id, name],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    pub fn delete_poll(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let affected = conn.execute("DELETE FROM polls WHERE id = ?1", [id])?;
            Ok(affected > 0)
        })
    }

    /// Batch-fetch the polls of a set of meetings in one query.
    pub fn polls_for_meetings(&self, meeting_ids: &[String]) -> Result<Vec<PollRow>> {
        if meeting_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=meeting_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, meeting_id, name FROM polls WHERE meeting_id IN ({}) ORDER BY created_at",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let binds: Vec<&dyn rusqlite::types::ToSql> = meeting_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(binds.as_slice(), |row| {
                    Ok(PollRow {
                        id: row.get(0)?,
                        meeting_id: row.get(1)?,
                        name: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Checkins --

    pub fn insert_checkin(&self, id: &str, meeting_id: &str, token_lookup_key: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO checkins (id, meeting_id, token_lookup_key) VALUES (?1, ?2, ?3)",
                params![id, meeting_id, token_lookup_key],
            )?;
            Ok(())
        })
    }

    /// Indexed O(1) lookup by the derived token key, scoped to one meeting.
    pub fn get_checkin_by_lookup(
        &self,
        meeting_id: &str,
        token_lookup_key: &str,
    ) -> Result<Option<CheckinRow>> {
        self.with_conn(|conn| query_checkin_by_lookup(conn, meeting_id, token_lookup_key))
    }

    /// Check-in counts per meeting, in one grouped query.
    pub fn checkin_counts(&self) -> Result<HashMap<String, u64>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT meeting_id, COUNT(*) FROM checkins GROUP BY meeting_id")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))?
                .collect::<Result<HashMap<_, _>, _>>()?;
            Ok(rows)
        })
    }

    // -- Votes --

    pub fn insert_vote(
        &self,
        id: &str,
        poll_id: &str,
        checkin_id: &str,
        choice: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO votes (id, poll_id, checkin_id, choice) VALUES (?1, ?2, ?3, ?4)",
                params![id, poll_id, checkin_id, choice],
            )?;
            Ok(())
        })
    }

    pub fn vote_exists(&self, poll_id: &str, checkin_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<String> = conn
                .query_row(
                    "SELECT id FROM votes WHERE poll_id = ?1 AND checkin_id = ?2",
                    params![poll_id, checkin_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Batch-fetch one caller's votes across all their checkins in one
    /// query — the tier-2 personalization read.
    pub fn votes_for_checkins(&self, checkin_ids: &[String]) -> Result<Vec<VoteRow>> {
        if checkin_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=checkin_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT poll_id, checkin_id, choice FROM votes WHERE checkin_id IN ({})",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let binds: Vec<&dyn rusqlite::types::ToSql> = checkin_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(binds.as_slice(), |row| {
                    Ok(VoteRow {
                        poll_id: row.get(0)?,
                        checkin_id: row.get(1)?,
                        choice: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Vote counts per (poll, choice), in one grouped query — the admin
    /// tally read.
    pub fn vote_tallies(&self) -> Result<Vec<(String, String, u64)>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT poll_id, choice, COUNT(*) FROM votes GROUP BY poll_id, choice")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_checkin_by_lookup(
    conn: &Connection,
    meeting_id: &str,
    token_lookup_key: &str,
) -> Result<Option<CheckinRow>> {
    conn.query_row(
        "SELECT id, meeting_id, token_lookup_key, created_at
         FROM checkins WHERE meeting_id = ?1 AND token_lookup_key = ?2",
        params![meeting_id, token_lookup_key],
        |row| {
            Ok(CheckinRow {
                id: row.get(0)?,
                meeting_id: row.get(1)?,
                token_lookup_key: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()
    .map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn seed_meeting(db: &Database) -> String {
        let id = new_id();
        let now = Utc::now();
        db.insert_meeting(&id, now, now + Duration::hours(1), &format!("CODE-{id}"))
            .unwrap();
        id
    }

    #[test]
    fn meeting_round_trip_preserves_times() {
        let db = Database::open_in_memory().unwrap();
        let id = new_id();
        let start = Utc::now();
        let end = start + Duration::hours(2);
        db.insert_meeting(&id, start, end, "BAKOMEDU").unwrap();

        let row = db.get_meeting(&id).unwrap().unwrap();
        assert_eq!(row.code, "BAKOMEDU");
        // stored at microsecond precision
        assert!((row.start_time - start).num_microseconds().unwrap_or(0).abs() <= 1);
        assert!((row.end_time - end).num_microseconds().unwrap_or(0).abs() <= 1);
    }

    #[test]
    fn meetings_listed_newest_first() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let older = new_id();
        let newer = new_id();
        db.insert_meeting(&older, now - Duration::hours(3), now, "AAAAAAAA")
            .unwrap();
        db.insert_meeting(&newer, now, now + Duration::hours(1), "BBBBBBBB")
            .unwrap();

        let rows = db.list_meetings().unwrap();
        assert_eq!(rows[0].id, newer);
        assert_eq!(rows[1].id, older);
    }

    #[test]
    fn duplicate_meeting_code_is_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        db.insert_meeting(&new_id(), now, now + Duration::hours(1), "SAMECODE")
            .unwrap();
        let err = db
            .insert_meeting(&new_id(), now, now + Duration::hours(1), "SAMECODE")
            .unwrap_err();
        assert!(crate::is_unique_violation(&err));
        assert!(!crate::is_transient(&err));
    }

    #[test]
    fn duplicate_checkin_lookup_key_is_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        let meeting = seed_meeting(&db);
        db.insert_checkin(&new_id(), &meeting, "deadbeef").unwrap();
        let err = db.insert_checkin(&new_id(), &meeting, "deadbeef").unwrap_err();
        assert!(crate::is_unique_violation(&err));

        // same key under a different meeting is fine
        let other = seed_meeting(&db);
        db.insert_checkin(&new_id(), &other, "deadbeef").unwrap();
    }

    #[test]
    fn duplicate_vote_is_unique_violation() {
        let db = Database::open_in_memory().unwrap();
        let meeting = seed_meeting(&db);
        let poll = new_id();
        db.insert_poll(&poll, &meeting, "Budget").unwrap();
        let checkin = new_id();
        db.insert_checkin(&checkin, &meeting, "cafe").unwrap();

        db.insert_vote(&new_id(), &poll, &checkin, "A").unwrap();
        let err = db.insert_vote(&new_id(), &poll, &checkin, "B").unwrap_err();
        assert!(crate::is_unique_violation(&err));
        assert!(db.vote_exists(&poll, &checkin).unwrap());
    }

    #[test]
    fn poll_name_lookup_is_scoped_to_meeting() {
        let db = Database::open_in_memory().unwrap();
        let m1 = seed_meeting(&db);
        let m2 = seed_meeting(&db);
        db.insert_poll(&new_id(), &m1, "Budget").unwrap();

        assert!(db.poll_name_exists(&m1, "Budget").unwrap());
        assert!(!db.poll_name_exists(&m1, "Elections").unwrap());
        assert!(!db.poll_name_exists(&m2, "Budget").unwrap());
    }

    #[test]
    fn deleting_meeting_cascades() {
        let db = Database::open_in_memory().unwrap();
        let meeting = seed_meeting(&db);
        let poll = new_id();
        db.insert_poll(&poll, &meeting, "Budget").unwrap();
        let checkin = new_id();
        db.insert_checkin(&checkin, &meeting, "cafe").unwrap();
        db.insert_vote(&new_id(), &poll, &checkin, "A").unwrap();

        assert!(db.delete_meeting(&meeting).unwrap());
        assert!(db.get_poll(&poll).unwrap().is_none());
        assert!(db.get_checkin_by_lookup(&meeting, "cafe").unwrap().is_none());
        assert!(!db.vote_exists(&poll, &checkin).unwrap());

        // idempotent delete reports nothing removed
        assert!(!db.delete_meeting(&meeting).unwrap());
    }

    #[test]
    fn bulk_queries_cover_all_rows() {
        let db = Database::open_in_memory().unwrap();
        let m1 = seed_meeting(&db);
        let m2 = seed_meeting(&db);
        let p1 = new_id();
        let p2 = new_id();
        db.insert_poll(&p1, &m1, "First").unwrap();
        db.insert_poll(&p2, &m2, "Second").unwrap();

        let polls = db.polls_for_meetings(&[m1.clone(), m2.clone()]).unwrap();
        assert_eq!(polls.len(), 2);
        assert!(db.polls_for_meetings(&[]).unwrap().is_empty());

        let c1 = new_id();
        let c2 = new_id();
        db.insert_checkin(&c1, &m1, "k1").unwrap();
        db.insert_checkin(&c2, &m2, "k2").unwrap();
        db.insert_vote(&new_id(), &p1, &c1, "A").unwrap();
        db.insert_vote(&new_id(), &p2, &c2, "C").unwrap();

        let votes = db.votes_for_checkins(&[c1.clone(), c2.clone()]).unwrap();
        assert_eq!(votes.len(), 2);

        let counts = db.checkin_counts().unwrap();
        assert_eq!(counts.get(&m1), Some(&1));
        assert_eq!(counts.get(&m2), Some(&1));

        let tallies = db.vote_tallies().unwrap();
        assert!(tallies.contains(&(p1, "A".to_string(), 1)));
        assert!(tallies.contains(&(p2, "C".to_string(), 1)));
    }
}
