/// Database row types — these map directly to SQLite rows.
/// Distinct from the quorum-types API models to keep the DB layer
/// independent.
use chrono::{DateTime, Utc};

pub struct MeetingRow {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub code: String,
}

pub struct PollRow {
    pub id: String,
    pub meeting_id: String,
    pub name: String,
}

pub struct CheckinRow {
    pub id: String,
    pub meeting_id: String,
    pub token_lookup_key: String,
    pub created_at: String,
}

pub struct VoteRow {
    pub poll_id: String,
    pub checkin_id: String,
    pub choice: String,
}
