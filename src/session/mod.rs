//! # Session registry.
//!
//! - [`SessionRegistry`]: lazily creates and caches the one [`Session`]
//! - [`Authenticator`] / [`Credentials`]: how a session is obtained
//! - [`SessionStore`]: persisted artifact so restarts skip the login

mod auth;
mod registry;
mod store;

pub use auth::{Authenticator, Credentials};
pub use registry::{AuthState, Session, SessionRegistry};
pub use store::{SessionArtifact, SessionStore};
