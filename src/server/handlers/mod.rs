//! HTTP request handlers.

mod anonymous;
mod form;
mod health;
mod outputs;
mod projects;

pub use anonymous::{anonymous_claim, anonymous_preview, anonymous_rate_limit, anonymous_status, anonymous_upload};
pub use health::health;
pub use outputs::{delete_output, get_output, update_output};
pub use projects::{generate_output, get_project, list_project_outputs, list_projects, upload_project};
