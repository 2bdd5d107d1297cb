pub mod auth;
pub mod connection;
pub mod dispatcher;
pub mod presence;

pub use auth::TokenVerifier;
pub use dispatcher::{Dispatcher, Session};
pub use presence::{ChannelHandle, InMemoryPresence, PresenceRegistry};
