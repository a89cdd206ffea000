use std::sync::Arc;

use quorum_core::{AdminService, CheckinService, MeetingViewService, ViewCache, VoteService};
use quorum_db::Database;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub cache: Arc<ViewCache>,
    pub checkins: CheckinService,
    pub votes: VoteService,
    pub views: MeetingViewService,
    pub admin: AdminService,
    pub jwt_secret: String,
    pub admin_password: String,
}

impl AppStateInner {
    /// Wires one cache and one database handle into every service —
    /// explicit dependency injection, no hidden globals.
    pub fn new(db: Arc<Database>, secret_key: &str, admin_password: &str) -> Self {
        let cache = Arc::new(ViewCache::default());
        Self {
            checkins: CheckinService::new(db.clone(), secret_key),
            votes: VoteService::new(db.clone(), secret_key),
            views: MeetingViewService::new(db.clone(), cache.clone(), secret_key),
            admin: AdminService::new(db.clone(), cache.clone()),
            db,
            cache,
            jwt_secret: secret_key.to_string(),
            admin_password: admin_password.to_string(),
        }
    }
}
