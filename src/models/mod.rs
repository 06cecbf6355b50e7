//! Data models for repurpose.

mod output;
mod project;
mod session;
mod transcription;

pub use output::{Output, OutputKind, OutputStatus};
pub use project::{Project, ProjectStatus};
pub use session::{AnonymousSession, SessionStatus};
pub use transcription::{count_words, Segment, Transcription};
