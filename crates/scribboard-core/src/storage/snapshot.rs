//! Board payload encoding.
//!
//! A board is stored as a JSON array of strokes. Decoding is lenient per
//! entry: a malformed stroke is skipped and logged, the rest survive.

use super::{StoreError, StoreResult};
use crate::stroke::Stroke;
use serde_json::Value;

/// Encode strokes as a JSON array.
pub fn encode_snapshot(strokes: &[Stroke]) -> StoreResult<String> {
    serde_json::to_string(strokes).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Decode a stored board payload.
///
/// Fails only if the payload is not a JSON array.
pub fn decode_snapshot(board_id: &str, payload: &str) -> StoreResult<Vec<Stroke>> {
    let value: Value = serde_json::from_str(payload).map_err(|e| StoreError::MalformedSnapshot {
        board: board_id.to_string(),
        reason: e.to_string(),
    })?;

    match value {
        Value::Array(entries) => Ok(decode_entries(board_id, entries)),
        other => Err(StoreError::MalformedSnapshot {
            board: board_id.to_string(),
            reason: format!("expected an array of strokes, got {}", json_kind(&other)),
        }),
    }
}

/// Decode already-parsed entries, skipping the malformed ones.
pub(crate) fn decode_entries(board_id: &str, entries: Vec<Value>) -> Vec<Stroke> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<Stroke>(entry) {
            Ok(stroke) => Some(stroke),
            Err(e) => {
                log::warn!("Skipping malformed stroke {} on board {}: {}", index, board_id, e);
                None
            }
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stroke::{InkColor, StrokePoint};

    fn stroke(x: f64) -> Stroke {
        Stroke::new(
            vec![StrokePoint::new(x, 0.0), StrokePoint::new(x + 5.0, 5.0)],
            InkColor::BLACK,
            3.0,
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let strokes = vec![stroke(0.0), stroke(10.0), stroke(20.0)];
        let json = encode_snapshot(&strokes).unwrap();
        let decoded = decode_snapshot("b", &json).unwrap();
        assert_eq!(decoded, strokes);
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let good = serde_json::to_string(&stroke(0.0)).unwrap();
        let payload = format!(
            r##"[{good}, {{"points":[{{"x":1,"y":1}}],"color":"#000000","width":3}}, {{"color":"nope"}}, 42, {good}]"##
        );
        let decoded = decode_snapshot("b", &payload).unwrap();
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn test_non_array_payload_is_malformed() {
        let err = decode_snapshot("b", r#"{"strokes":[]}"#).unwrap_err();
        assert!(matches!(err, StoreError::MalformedSnapshot { ref board, .. } if board == "b"));

        assert!(decode_snapshot("b", "not json").is_err());
    }

    #[test]
    fn test_empty_array() {
        assert!(decode_snapshot("b", "[]").unwrap().is_empty());
    }
}
