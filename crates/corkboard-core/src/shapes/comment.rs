//! Comment pins.

use super::ObjectId;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A comment pinned at a world position. Thread UI lives outside the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: ObjectId,
    pub author: String,
    pub text: String,
    pub position: Point,
    pub created_at: u64,
}

impl Comment {
    pub fn new(author: impl Into<String>, text: impl Into<String>, position: Point) -> Self {
        Self {
            id: Uuid::new_v4(),
            author: author.into(),
            text: text.into(),
            position,
            created_at: crate::wall_clock_ms(),
        }
    }
}
