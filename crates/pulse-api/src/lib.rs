pub mod admin;
pub mod conversations;
pub mod error;
pub mod middleware;
pub mod notifications;
pub mod social;
pub mod state;
pub mod stories;

pub use error::ApiError;
pub use state::{AppState, AppStateInner};

#[cfg(test)]
pub(crate) mod testing;
