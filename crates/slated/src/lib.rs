//! slated library - whiteboard tutoring backend
//!
//! Exposes modules so integration tests can build the router
//! against in-memory fakes.

pub mod auth;
pub mod canvas;
pub mod config;
pub mod error;
pub mod gemini;
pub mod mailer;
pub mod middleware;
pub mod parse;
pub mod prompts;
pub mod routes;
pub mod server;
pub mod store;
pub mod tutor;

pub use config::Config;
pub use server::{build_router, AppState, SharedState};
