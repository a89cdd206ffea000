use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS meetings (
            id          TEXT PRIMARY KEY,
            start_time  TEXT NOT NULL,
            end_time    TEXT NOT NULL,
            code        TEXT NOT NULL UNIQUE,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS polls (
            id          TEXT PRIMARY KEY,
            meeting_id  TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            name        TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_polls_meeting
            ON polls(meeting_id);

        -- token_lookup_key is a keyed hash of the vote token, never the raw
        -- token. The UNIQUE pair doubles as the O(1) lookup index.
        CREATE TABLE IF NOT EXISTS checkins (
            id               TEXT PRIMARY KEY,
            meeting_id       TEXT NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            token_lookup_key TEXT NOT NULL,
            created_at       TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(meeting_id, token_lookup_key)
        );

        -- The UNIQUE pair is the exactly-once arbiter for concurrent votes.
        CREATE TABLE IF NOT EXISTS votes (
            id          TEXT PRIMARY KEY,
            poll_id     TEXT NOT NULL REFERENCES polls(id) ON DELETE CASCADE,
            checkin_id  TEXT NOT NULL REFERENCES checkins(id) ON DELETE CASCADE,
            choice      TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(poll_id, checkin_id)
        );

        CREATE INDEX IF NOT EXISTS idx_votes_checkin
            ON votes(checkin_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
