//! Session state machine, persistence, and account lifecycle wrappers.

pub mod registration;
pub mod session;
pub mod store;

pub use registration::{
    complete_user_reset, register_ephemeral, request_signup_link, request_user_reset,
    update_user, verify_signup_link, SignupConfirmation, UserUpdate,
};
pub use session::Session;
pub use store::{SessionRecord, SessionStore};
