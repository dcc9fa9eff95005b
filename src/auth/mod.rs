//! Token store and authentication lifecycle.

mod monitor;
mod session;
pub(crate) mod token;

pub use monitor::spawn_expiry_monitor;
pub use session::{AuthSession, AuthState};
pub use token::{AuthToken, TokenStore};
