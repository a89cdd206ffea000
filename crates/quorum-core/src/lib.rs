//! Business services for the meeting/poll core: idempotent check-in,
//! exactly-once voting, and the two-tier cached meeting views.

pub mod admin;
pub mod availability;
pub mod checkin;
pub mod token;
pub mod view;
pub mod vote;

use std::time::Duration;

use quorum_types::ServiceError;

pub use admin::AdminService;
pub use checkin::CheckinService;
pub use view::{MeetingViewService, ViewCache};
pub use vote::VoteService;

/// How long a shared meeting snapshot stays fresh. Mutations invalidate
/// the cache explicitly, so this only bounds staleness from check-ins and
/// votes, which the shared tier does not show anyway.
pub const MEETING_CACHE_TTL: Duration = Duration::from_secs(3);

/// Capacity of each view cache. Far above the handful of keys in use;
/// the bound exists so the cache cannot grow without limit.
pub const VIEW_CACHE_MAX_SIZE: usize = 100;

/// Push interval for the user-facing meeting stream.
pub const SSE_USER_INTERVAL: Duration = Duration::from_secs(5);

/// Push interval for the admin dashboard stream.
pub const SSE_ADMIN_INTERVAL: Duration = Duration::from_secs(3);

/// Check-in opens this many minutes before the meeting starts.
pub const EARLY_CHECKIN_MINUTES: i64 = 15;

/// Bounded retry count when a freshly minted token collides.
pub const TOKEN_MINT_ATTEMPTS: u32 = 5;

/// Meeting codes are pronounceable 8-character strings.
pub const MEETING_CODE_LENGTH: usize = 8;

/// Bounded retry count when a freshly minted meeting code collides.
pub const MEETING_CODE_ATTEMPTS: u32 = 3;

/// Classifies a storage error: busy/locked is retryable, anything else
/// is unexpected. Uniqueness violations are handled at the call sites
/// that race on purpose.
pub(crate) fn db_err(err: anyhow::Error) -> ServiceError {
    if quorum_db::is_transient(&err) {
        ServiceError::Transient(err)
    } else {
        ServiceError::Internal(err)
    }
}
