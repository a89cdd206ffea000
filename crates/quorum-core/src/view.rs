use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use quorum_cache::{CacheStats, TtlCache};
use quorum_db::Database;
use quorum_types::api::{AdminMeetingView, AdminPollView, MeetingView, PollView};
use quorum_types::{Choice, ServiceError};

use crate::availability::is_available;
use crate::token::token_lookup_key;
use crate::{MEETING_CACHE_TTL, VIEW_CACHE_MAX_SIZE, db_err};

pub const BASE_MEETINGS_KEY: &str = "base_meetings";
pub const ADMIN_MEETINGS_KEY: &str = "admin_meetings";

/// Tier-1 data: identical for every caller, safe to share. Personal
/// fields (`checked_in`, `vote`) are merged in later, per request.
#[derive(Debug, Clone)]
pub struct BaseMeeting {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub code: String,
    pub polls: Vec<BasePoll>,
}

#[derive(Debug, Clone)]
pub struct BasePoll {
    pub id: String,
    pub name: String,
}

/// The process-wide snapshot cache. One instance is built at startup and
/// handed to every consumer; mutation endpoints reach it through
/// [`ViewCache::invalidate_meetings`] right after their commit.
pub struct ViewCache {
    pub(crate) base: TtlCache<Arc<Vec<BaseMeeting>>>,
    pub(crate) admin: TtlCache<Arc<Vec<AdminMeetingView>>>,
}

impl ViewCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            base: TtlCache::new(max_size),
            admin: TtlCache::new(max_size),
        }
    }

    /// Drops both shared snapshots. Called by every committed meeting or
    /// poll mutation — this, not the TTL, is what makes new data visible
    /// immediately.
    pub fn invalidate_meetings(&self) {
        self.base.invalidate(BASE_MEETINGS_KEY);
        self.admin.invalidate(ADMIN_MEETINGS_KEY);
    }

    pub fn clear(&self) {
        self.base.clear();
        self.admin.clear();
    }

    /// Per-snapshot cache statistics for the monitoring endpoint.
    pub fn stats(&self) -> BTreeMap<String, CacheStats> {
        BTreeMap::from([
            ("available".to_string(), self.base.stats()),
            ("admin".to_string(), self.admin.stats()),
        ])
    }
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new(VIEW_CACHE_MAX_SIZE)
    }
}

/// Serves "what is open right now" cheaply: the shared part is computed
/// at most once per TTL window system-wide, the personal part is a pair
/// of indexed reads per request.
#[derive(Clone)]
pub struct MeetingViewService {
    db: Arc<Database>,
    cache: Arc<ViewCache>,
    token_secret: Arc<str>,
    ttl: Duration,
}

impl MeetingViewService {
    pub fn new(db: Arc<Database>, cache: Arc<ViewCache>, token_secret: &str) -> Self {
        Self {
            db,
            cache,
            token_secret: Arc::from(token_secret),
            ttl: MEETING_CACHE_TTL,
        }
    }

    /// Overrides the snapshot TTL; tests use this to make expiry visible.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Meetings whose availability window contains `now`, personalized
    /// with the caller's check-in and vote status.
    ///
    /// `tokens` maps meeting id → the caller's claimed vote token. A
    /// missing, invalid, or foreign token never fails the call; the
    /// caller simply appears not checked in there.
    pub fn list_available(
        &self,
        tokens: &HashMap<String, String>,
    ) -> Result<Vec<MeetingView>, ServiceError> {
        let base = self
            .cache
            .base
            .get_or_fetch(BASE_MEETINGS_KEY, self.ttl, || self.fetch_base())
            .map_err(db_err)?;

        // Tier 2: resolve the caller's tokens to checkins (indexed reads),
        // then pull all their votes in one query.
        let mut checkin_by_meeting: HashMap<String, String> = HashMap::new();
        for meeting in base.iter() {
            let Some(token) = tokens.get(&meeting.id) else {
                continue;
            };
            let lookup_key = token_lookup_key(&self.token_secret, token);
            if let Some(row) = self
                .db
                .get_checkin_by_lookup(&meeting.id, &lookup_key)
                .map_err(db_err)?
            {
                checkin_by_meeting.insert(meeting.id.clone(), row.id);
            }
        }

        let checkin_ids: Vec<String> = checkin_by_meeting.values().cloned().collect();
        let vote_rows = self.db.votes_for_checkins(&checkin_ids).map_err(db_err)?;
        let mut vote_map: HashMap<(String, String), Choice> = HashMap::new();
        for row in vote_rows {
            if let Ok(choice) = row.choice.parse::<Choice>() {
                vote_map.insert((row.poll_id, row.checkin_id), choice);
            }
        }

        let views = base
            .iter()
            .map(|meeting| {
                let checkin_id = checkin_by_meeting.get(&meeting.id);
                let polls = meeting
                    .polls
                    .iter()
                    .map(|poll| PollView {
                        id: poll.id.clone(),
                        name: poll.name.clone(),
                        vote: checkin_id.and_then(|cid| {
                            vote_map.get(&(poll.id.clone(), cid.clone())).copied()
                        }),
                    })
                    .collect();
                MeetingView {
                    id: meeting.id.clone(),
                    start_time: meeting.start_time,
                    end_time: meeting.end_time,
                    code: meeting.code.clone(),
                    checked_in: checkin_id.is_some(),
                    polls,
                }
            })
            .collect();

        Ok(views)
    }

    /// The admin dashboard snapshot: every meeting with check-in counts
    /// and zero-filled per-option tallies. No personalization, so the
    /// whole payload is shareable and cached under its own key.
    pub fn admin_overview(&self) -> Result<Arc<Vec<AdminMeetingView>>, ServiceError> {
        self.cache
            .admin
            .get_or_fetch(ADMIN_MEETINGS_KEY, self.ttl, || self.fetch_admin())
            .map_err(db_err)
    }

    fn fetch_base(&self) -> anyhow::Result<Arc<Vec<BaseMeeting>>> {
        let now = Utc::now();
        let meetings = self.db.list_meetings()?;
        let open: Vec<_> = meetings
            .into_iter()
            .filter(|m| is_available(m.start_time, m.end_time, now))
            .collect();

        let ids: Vec<String> = open.iter().map(|m| m.id.clone()).collect();
        let mut polls_by_meeting: HashMap<String, Vec<BasePoll>> = HashMap::new();
        for poll in self.db.polls_for_meetings(&ids)? {
            polls_by_meeting
                .entry(poll.meeting_id)
                .or_default()
                .push(BasePoll {
                    id: poll.id,
                    name: poll.name,
                });
        }

        let base = open
            .into_iter()
            .map(|m| BaseMeeting {
                polls: polls_by_meeting.remove(&m.id).unwrap_or_default(),
                id: m.id,
                start_time: m.start_time,
                end_time: m.end_time,
                code: m.code,
            })
            .collect();
        Ok(Arc::new(base))
    }

    fn fetch_admin(&self) -> anyhow::Result<Arc<Vec<AdminMeetingView>>> {
        let meetings = self.db.list_meetings()?;
        let ids: Vec<String> = meetings.iter().map(|m| m.id.clone()).collect();
        let polls = self.db.polls_for_meetings(&ids)?;
        let checkin_counts = self.db.checkin_counts()?;

        let mut tally_map: HashMap<String, BTreeMap<Choice, u64>> = HashMap::new();
        for (poll_id, choice, count) in self.db.vote_tallies()? {
            if let Ok(choice) = choice.parse::<Choice>() {
                tally_map.entry(poll_id).or_default().insert(choice, count);
            }
        }

        let mut polls_by_meeting: HashMap<String, Vec<AdminPollView>> = HashMap::new();
        for poll in polls {
            let counted = tally_map.get(&poll.id);
            let votes: BTreeMap<Choice, u64> = Choice::ALL
                .iter()
                .map(|&c| (c, counted.and_then(|t| t.get(&c)).copied().unwrap_or(0)))
                .collect();
            let total_votes = votes.values().sum();
            polls_by_meeting
                .entry(poll.meeting_id.clone())
                .or_default()
                .push(AdminPollView {
                    id: poll.id,
                    name: poll.name,
                    total_votes,
                    votes,
                });
        }

        let overview = meetings
            .into_iter()
            .map(|m| AdminMeetingView {
                checkins: checkin_counts.get(&m.id).copied().unwrap_or(0),
                polls: polls_by_meeting.remove(&m.id).unwrap_or_default(),
                id: m.id,
                start_time: m.start_time,
                end_time: m.end_time,
                code: m.code,
            })
            .collect();
        Ok(Arc::new(overview))
    }
}
