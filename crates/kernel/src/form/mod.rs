//! Form plumbing shared by the admin surfaces.
//!
//! - per-build working state persisted between round-trips ([`FormStateStore`])
//! - CSRF token generation and verification
//! - AJAX command responses for partial rebuilds

pub mod ajax;
pub mod csrf;
mod state;

pub use ajax::{AjaxCommand, AjaxRequest, AjaxResponse};
pub use csrf::{generate_csrf_token, session_form_key, verify_csrf_token};
pub use state::{
    FormState, FormStateStore, PgFormStateStore, STATE_TTL_SECS, ValidationError, new_build_id,
};
