use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::response::Sse;
use axum::response::sse::Event;
use futures_util::Stream;
use serde_json::json;
use tracing::{error, warn};

use quorum_core::{SSE_ADMIN_INTERVAL, SSE_USER_INTERVAL};
use quorum_types::ServiceError;

use crate::error::ApiError;
use crate::meetings::{TokenQuery, parse_token_map};
use crate::state::{AppState, AppStateInner};

/// Consecutive transient failures tolerated before the stream gives up.
const MAX_CONSECUTIVE_ERRORS: u32 = 3;

/// Live meeting list for one attendee. The client passes its token map
/// once at connect time and reconnects to change it.
pub async fn meeting_stream(
    State(state): State<AppState>,
    Query(query): Query<TokenQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let tokens = parse_token_map(&query.tokens)?;

    let stream = snapshot_stream(state, SSE_USER_INTERVAL, move |state| {
        let views = state.views.list_available(&tokens)?;
        to_json(&views)
    });
    Ok(Sse::new(stream))
}

/// Live admin dashboard: all meetings with check-in counts and tallies.
pub async fn admin_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = snapshot_stream(state, SSE_ADMIN_INTERVAL, |state| {
        let overview = state.views.admin_overview()?;
        to_json(&*overview)
    });
    Sse::new(stream)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(value).map_err(|e| ServiceError::Internal(e.into()))
}

/// One cancellable polling loop per connected client.
///
/// Each tick recomputes the snapshot off the async runtime and pushes it
/// as a `data:` event. A transient backend error skips the tick — the
/// client just misses one update — and only after `MAX_CONSECUTIVE_ERRORS`
/// in a row does the stream emit a terminal `event: error` and close.
/// Non-transient errors close immediately. Either way the client only
/// ever sees a generic message; detail stays in the server logs.
///
/// Dropping the response (client disconnect, shutdown) cancels the task
/// at the next await point, before any further data is produced.
pub(crate) fn snapshot_stream<F>(
    state: AppState,
    period: Duration,
    fetch: F,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    F: Fn(&AppStateInner) -> Result<serde_json::Value, ServiceError> + Send + Sync + 'static,
{
    let fetch = Arc::new(fetch);

    async_stream::stream! {
        let mut consecutive_errors: u32 = 0;
        let mut ticker = tokio::time::interval(period);

        loop {
            ticker.tick().await;

            let fetch = fetch.clone();
            let state = state.clone();
            let result = tokio::task::spawn_blocking(move || fetch(&state)).await;

            match result {
                Ok(Ok(snapshot)) => {
                    consecutive_errors = 0;
                    match Event::default().json_data(&snapshot) {
                        Ok(event) => yield Ok(event),
                        Err(e) => {
                            error!("snapshot serialization failed: {e}");
                            yield Ok(terminal_error("internal server error"));
                            break;
                        }
                    }
                }
                Ok(Err(err)) if err.is_transient() => {
                    consecutive_errors += 1;
                    warn!(
                        attempt = consecutive_errors,
                        max = MAX_CONSECUTIVE_ERRORS,
                        "snapshot fetch failed transiently: {err:#?}"
                    );
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        yield Ok(terminal_error("service temporarily unavailable"));
                        break;
                    }
                    // skip this tick's emission, retry on the next one
                }
                Ok(Err(err)) => {
                    error!("snapshot fetch failed: {err:#?}");
                    yield Ok(terminal_error("internal server error"));
                    break;
                }
                Err(join) => {
                    error!("snapshot task failed: {join}");
                    yield Ok(terminal_error("internal server error"));
                    break;
                }
            }
        }
    }
}

fn terminal_error(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "error": message }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use quorum_db::Database;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_state() -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(AppStateInner::new(db, "test-secret", "admin-pw"))
    }

    #[tokio::test]
    async fn emits_a_snapshot_per_tick() {
        let stream = snapshot_stream(test_state(), Duration::from_millis(5), |_| {
            Ok(json!({"n": 1}))
        });
        let mut stream = std::pin::pin!(stream);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_some());
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_terminal() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        let stream = snapshot_stream(test_state(), Duration::from_millis(5), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Transient(anyhow::anyhow!("db busy")))
        });
        let mut stream = std::pin::pin!(stream);

        // two silent retries, then one terminal error event and the end
        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_CONSECUTIVE_ERRORS);
    }

    #[tokio::test]
    async fn recovery_resets_the_error_budget() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        let stream = snapshot_stream(test_state(), Duration::from_millis(5), move |_| {
            // fail transiently on every odd tick, succeed on even ones
            if seen.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                Err(ServiceError::Transient(anyhow::anyhow!("db busy")))
            } else {
                Ok(json!({"ok": true}))
            }
        });
        let mut stream = std::pin::pin!(stream);

        // alternating failure/success never reaches the terminal threshold
        for _ in 0..4 {
            assert!(stream.next().await.is_some());
        }
    }

    #[tokio::test]
    async fn internal_errors_terminate_immediately() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = attempts.clone();
        let stream = snapshot_stream(test_state(), Duration::from_millis(5), move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::Internal(anyhow::anyhow!("boom")))
        });
        let mut stream = std::pin::pin!(stream);

        assert!(stream.next().await.is_some());
        assert!(stream.next().await.is_none());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn live_state_produces_real_snapshots() {
        let state = test_state();
        let now = chrono::Utc::now();
        let (meeting, _) = state
            .admin
            .create_meeting(now - chrono::Duration::minutes(5), now + chrono::Duration::hours(1))
            .unwrap();
        state.admin.create_poll(&meeting, "Budget").unwrap();

        let stream = snapshot_stream(state, Duration::from_millis(5), |state| {
            let views = state.views.list_available(&Default::default())?;
            to_json(&views)
        });
        let mut stream = std::pin::pin!(stream);
        assert!(stream.next().await.is_some());
    }
}
