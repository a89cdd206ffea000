pub mod api;
pub mod choice;
pub mod error;

pub use choice::Choice;
pub use error::ServiceError;
