use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::choice::Choice;

// -- Check-in --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckinRequest {
    pub code: String,
    /// A previously issued vote token, if the caller still holds one.
    /// Re-presenting it makes the check-in idempotent.
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckinResponse {
    pub token: String,
}

// -- Voting --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoteRequest {
    pub token: String,
    pub choice: Choice,
}

// -- Meeting views (user-facing, personalized) --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollView {
    pub id: String,
    pub name: String,
    /// The caller's own vote, `null` if they have not voted.
    pub vote: Option<Choice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingView {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub code: String,
    pub checked_in: bool,
    pub polls: Vec<PollView>,
}

// -- Meeting views (admin, aggregate) --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminPollView {
    pub id: String,
    pub name: String,
    pub total_votes: u64,
    /// Tally per option, zero-filled across the full A-H alphabet.
    pub votes: BTreeMap<Choice, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminMeetingView {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub code: String,
    pub checkins: u64,
    pub polls: Vec<AdminPollView>,
}

// -- Admin mutations --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMeetingRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CreateMeetingResponse {
    pub id: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePollRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct CreatePollResponse {
    pub id: String,
}

// -- Admin auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
}
