use chrono::{DateTime, Duration, Utc};

use crate::EARLY_CHECKIN_MINUTES;

/// True when `now` is inside the meeting's availability window.
///
/// The window opens 15 minutes before the scheduled start so attendees
/// can check in early, and closes at the scheduled end. Both boundaries
/// are inclusive.
pub fn is_available(start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    let opens = start - Duration::minutes(EARLY_CHECKIN_MINUTES);
    opens <= now && now <= end
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let start = Utc::now();
        (start, start + Duration::hours(1))
    }

    #[test]
    fn open_during_the_meeting() {
        let (start, end) = window();
        assert!(is_available(start, end, start + Duration::minutes(30)));
    }

    #[test]
    fn opens_fifteen_minutes_early_inclusive() {
        let (start, end) = window();
        assert!(is_available(start, end, start - Duration::minutes(15)));
        assert!(!is_available(start, end, start - Duration::minutes(15) - Duration::seconds(1)));
    }

    #[test]
    fn closes_at_end_inclusive() {
        let (start, end) = window();
        assert!(is_available(start, end, end));
        assert!(!is_available(start, end, end + Duration::seconds(1)));
    }
}
