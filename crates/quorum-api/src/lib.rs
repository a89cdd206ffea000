pub mod admin;
pub mod auth;
pub mod error;
pub mod meetings;
pub mod middleware;
pub mod sse;
pub mod state;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};
