//! Shared types for Slate components.
//!
//! Everything the daemon hands to clients or to the hosted store lives here,
//! so the wire shapes have a single definition.

pub mod canvas;
pub mod envelope;
pub mod feedback;
pub mod question;
pub mod records;

pub use canvas::{CanvasState, Stroke};
pub use envelope::{ApiResponse, Pagination};
pub use feedback::{FeedbackResult, Outcome};
pub use question::{GeneratedQuestion, QuestionContext, QuestionOption};
pub use records::{
    HistoryEntry, HistoryPage, HistoryQuery, HistoryUpdate, NewHistoryEntry, NewPracticeAttempt,
    PracticeAttempt, UserProfile, VerificationCode,
};

/// Crate version, reported by the health endpoint.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
