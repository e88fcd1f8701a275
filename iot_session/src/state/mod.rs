//! Session state container shared between the session manager and the UI.

pub mod session;
pub mod store;

pub use session::{Freshness, SessionAction, SessionPhase, SessionState, Stage};
pub use store::SessionStore;
