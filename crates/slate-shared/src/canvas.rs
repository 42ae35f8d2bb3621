//! Stroke-list payload sent by the whiteboard.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stroke {
    #[serde(default)]
    pub points: Vec<serde_json::Value>,
    #[serde(default)]
    pub is_eraser: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CanvasState {
    #[serde(default)]
    pub strokes: Vec<Stroke>,
}

impl CanvasState {
    pub fn drawing_strokes(&self) -> impl Iterator<Item = &Stroke> {
        self.strokes.iter().filter(|s| !s.is_eraser)
    }

    pub fn eraser_count(&self) -> usize {
        self.strokes.iter().filter(|s| s.is_eraser).count()
    }

    /// Total points across non-eraser strokes.
    pub fn drawn_points(&self) -> usize {
        self.drawing_strokes().map(|s| s.points.len()).sum()
    }
}

/// Count strokes in an arbitrary client payload without requiring it to
/// match [`CanvasState`].
pub fn stroke_count(payload: &serde_json::Value) -> usize {
    payload
        .get("strokes")
        .and_then(|s| s.as_array())
        .map(|a| a.len())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_counts() {
        let state: CanvasState = serde_json::from_value(json!({
            "strokes": [
                { "points": [[0, 0], [1, 1], [2, 2]] },
                { "points": [[5, 5]], "isEraser": true },
                { "points": [[3, 3], [4, 4]] }
            ]
        }))
        .unwrap();
        assert_eq!(state.drawing_strokes().count(), 2);
        assert_eq!(state.eraser_count(), 1);
        assert_eq!(state.drawn_points(), 5);
    }

    #[test]
    fn test_stroke_count_tolerates_other_shapes() {
        assert_eq!(stroke_count(&json!({ "strokes": [{}, {}] })), 2);
        assert_eq!(stroke_count(&json!({ "lines": [] })), 0);
        assert_eq!(stroke_count(&json!("not an object")), 0);
    }
}
