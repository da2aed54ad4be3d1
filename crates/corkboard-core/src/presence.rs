//! Presence payloads and the throttled cursor broadcast.

use crate::Instant;
use crate::shapes::ObjectId;
use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Awareness state published for a participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AwarenessState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<CursorPosition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selection: Vec<ObjectId>,
}

/// Cursor position in world coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub x: f64,
    pub y: f64,
}

impl From<Point> for CursorPosition {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<CursorPosition> for Point {
    fn from(c: CursorPosition) -> Self {
        Point::new(c.x, c.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub name: String,
    pub color: String,
}

/// Emits at most one cursor update per interval.
///
/// A position offered inside the interval is held back and sent by
/// [`CursorBroadcaster::flush`] once the interval has passed, so the last
/// resting position always goes out. Suppressed offers are dropped.
#[derive(Debug, Clone)]
pub struct CursorBroadcaster {
    interval: Duration,
    last_sent: Option<Instant>,
    held: Option<CursorPosition>,
}

impl CursorBroadcaster {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
            held: None,
        }
    }

    fn ready(&self, now: Instant) -> bool {
        self.last_sent
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval)
    }

    /// Offer the latest world cursor. Returns the update to broadcast now, if any.
    pub fn offer(&mut self, world: Point, now: Instant, suppressed: bool) -> Option<CursorPosition> {
        if suppressed {
            self.held = None;
            return None;
        }
        let position = CursorPosition::from(world);
        if self.ready(now) {
            self.held = None;
            self.last_sent = Some(now);
            Some(position)
        } else {
            self.held = Some(position);
            None
        }
    }

    /// Send a held-back position once the interval allows it.
    pub fn flush(&mut self, now: Instant, suppressed: bool) -> Option<CursorPosition> {
        if suppressed {
            self.held = None;
            return None;
        }
        if !self.ready(now) {
            return None;
        }
        let position = self.held.take()?;
        self.last_sent = Some(now);
        Some(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_throttles_to_interval() {
        let mut cursor = CursorBroadcaster::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(cursor.offer(Point::new(1.0, 1.0), t0, false).is_some());
        assert!(cursor.offer(Point::new(2.0, 2.0), t0 + Duration::from_millis(30), false).is_none());
        assert!(cursor.offer(Point::new(3.0, 3.0), t0 + Duration::from_millis(60), false).is_none());
        assert!(cursor.flush(t0 + Duration::from_millis(90), false).is_none());

        let trailing = cursor.flush(t0 + Duration::from_millis(100), false);
        assert_eq!(trailing, Some(CursorPosition { x: 3.0, y: 3.0 }));
        assert!(cursor.flush(t0 + Duration::from_millis(300), false).is_none());
    }

    #[test]
    fn test_suppressed_while_zooming_or_editing() {
        let mut cursor = CursorBroadcaster::new(Duration::from_millis(100));
        let t0 = Instant::now();
        assert!(cursor.offer(Point::ZERO, t0, true).is_none());
        assert!(cursor.offer(Point::ZERO, t0, false).is_some());
        cursor.offer(Point::new(5.0, 5.0), t0 + Duration::from_millis(10), false);
        assert!(cursor.flush(t0 + Duration::from_millis(200), true).is_none());
        assert!(cursor.flush(t0 + Duration::from_millis(300), false).is_none());
    }

    #[test]
    fn test_awareness_skips_empty_fields() {
        let state = AwarenessState {
            cursor: Some(Point::new(1.5, 2.0).into()),
            ..Default::default()
        };
        let json = serde_json::to_string(&state).unwrap();
        assert_eq!(json, r#"{"cursor":{"x":1.5,"y":2.0}}"#);
    }
}
