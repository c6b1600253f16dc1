//! Core data models used throughout docsmith.
//!
//! These types represent the inference fragments, grounding context, and
//! users that flow through the generation and auth paths.

use serde::{Deserialize, Serialize};

/// One decoded line of the inference server's newline-delimited JSON stream.
///
/// Only the incremental text delta and the completion flag matter to the
/// relay; everything else on the line is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceFragment {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
}

/// Reference text fetched from the external knowledge source.
#[derive(Debug, Clone)]
pub struct GroundingContext {
    pub title: String,
    pub body: String,
}

impl GroundingContext {
    /// Render the context block inserted verbatim into a grounded prompt.
    pub fn render(&self) -> String {
        format!("Verified Topic: {}\n\n{}", self.title, self.body)
    }
}

/// A registered user as stored in SQLite.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: i64,
}

/// The public view of a user returned by the auth endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub created_at: i64,
}

impl From<User> for UserRecord {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            created_at: user.created_at,
        }
    }
}
