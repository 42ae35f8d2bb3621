//! Whiteboard image and stroke preprocessing.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use serde_json::Value;
use slate_shared::CanvasState;

use crate::gemini::InlineImage;

/// Below this many decoded bytes a canvas export is treated as blank
pub const MIN_CANVAS_BYTES: usize = 1000;

pub const CANVAS_DEFAULT_MIME: &str = "image/png";
pub const PHOTO_DEFAULT_MIME: &str = "image/jpeg";

/// Clients send padded and unpadded payloads
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CanvasError {
    #[error("No image provided. Send base64 data in \"imageBase64\".")]
    Missing,

    #[error("Provided image data is invalid.")]
    InvalidBase64,

    #[error("Provided image data is empty.")]
    Empty,

    #[error("The canvas appears to be blank. Please write your work before submitting.")]
    Blank { bytes: usize },
}

/// Decoded image ready to attach to a model request
#[derive(Debug, Clone)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Split `data:<mime>;base64,<payload>` into header MIME and payload.
fn split_data_uri(raw: &str) -> (Option<&str>, &str) {
    let Some(comma) = raw.rfind(',') else {
        return (None, raw);
    };
    let header = &raw[..comma];
    let mime = header
        .strip_prefix("data:")
        .and_then(|h| h.split(';').next())
        .map(str::trim)
        .filter(|m| !m.is_empty());
    (mime, &raw[comma + 1..])
}

/// Identify common image formats by signature
pub fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

impl ImagePayload {
    /// Decode a client payload.
    ///
    /// MIME precedence: `declared`, data-URI header, sniffed signature,
    /// then `default_mime`.
    pub fn decode(raw: &str, declared: Option<&str>, default_mime: &str) -> Result<Self, CanvasError> {
        let (header_mime, payload) = split_data_uri(raw);
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Err(CanvasError::Empty);
        }

        let bytes = LENIENT
            .decode(compact.as_bytes())
            .map_err(|_| CanvasError::InvalidBase64)?;
        if bytes.is_empty() {
            return Err(CanvasError::Empty);
        }

        let mime_type = declared
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .or(header_mime)
            .or_else(|| sniff_mime(&bytes))
            .unwrap_or(default_mime)
            .to_string();

        Ok(Self { bytes, mime_type })
    }

    /// Decode a canvas export, rejecting near-empty images
    pub fn decode_canvas(raw: &str, declared: Option<&str>) -> Result<Self, CanvasError> {
        let payload = Self::decode(raw, declared, CANVAS_DEFAULT_MIME)?;
        if payload.bytes.len() < MIN_CANVAS_BYTES {
            return Err(CanvasError::Blank {
                bytes: payload.bytes.len(),
            });
        }
        Ok(payload)
    }

    pub fn to_inline(&self) -> InlineImage {
        InlineImage {
            mime_type: self.mime_type.clone(),
            data: STANDARD.encode(&self.bytes),
        }
    }
}

const BLANK_BOARD: &str = "The whiteboard is blank. No work has been written yet.";
const ERASED_BOARD: &str = "The whiteboard only holds eraser marks. Earlier work was erased entirely.";

/// Textual summary of a stroke list for text-only evaluation
pub fn describe_strokes(state: &CanvasState) -> String {
    if state.strokes.is_empty() {
        return BLANK_BOARD.to_string();
    }

    let drawing = state.drawing_strokes().count();
    if drawing == 0 {
        return ERASED_BOARD.to_string();
    }

    let points = state.drawn_points();
    let mut description = match points {
        0..=9 => "Only a few marks are on the board, likely scribbles or test strokes.",
        10..=49 => "A short piece of work is on the board, a few symbols or a brief calculation.",
        50..=199 => "A moderate amount of work is on the board, probably several steps.",
        _ => "An extensive solution is on the board with detailed working and possibly more than one approach.",
    }
    .to_string();

    let erasures = state.eraser_count();
    if erasures > 0 {
        description.push_str(&format!(
            " There are {} erasure(s), so the student revised their work.",
            erasures
        ));
    }

    if points as f64 / drawing as f64 > 20.0 {
        description.push_str(" Strokes are mostly long, suggesting written expressions or equations.");
    } else {
        description.push_str(" Strokes are mostly short, suggesting digits, symbols or brief notes.");
    }

    description
}

/// Describe an arbitrary client canvas payload.
///
/// Accepts the stroke object itself or a JSON string of it. Anything
/// else is embedded verbatim.
pub fn describe_canvas(payload: &Value) -> String {
    let parsed;
    let value = match payload {
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(v) => {
                parsed = v;
                &parsed
            }
            Err(_) => payload,
        },
        other => other,
    };

    match value {
        Value::Null => BLANK_BOARD.to_string(),
        Value::Object(map) if map.get("strokes").map(Value::is_array).unwrap_or(false) => {
            match serde_json::from_value::<CanvasState>(value.clone()) {
                Ok(state) => describe_strokes(&state),
                Err(_) => format!("The canvas holds drawing data in this form: {}", value),
            }
        }
        other => format!("The canvas holds drawing data in this form: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn png_bytes(len: usize) -> Vec<u8> {
        let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        bytes.resize(len, 7);
        bytes
    }

    #[test]
    fn test_data_uri_prefix_and_whitespace() {
        let encoded = STANDARD.encode(png_bytes(1500));
        let (head, tail) = encoded.split_at(40);
        let raw = format!("data:image/webp;base64,{}\n  {}", head, tail);

        let payload = ImagePayload::decode_canvas(&raw, None).unwrap();
        assert_eq!(payload.bytes.len(), 1500);
        // header wins over the sniffed PNG signature
        assert_eq!(payload.mime_type, "image/webp");
    }

    #[test]
    fn test_mime_precedence() {
        let encoded = STANDARD.encode(png_bytes(1200));
        let declared = ImagePayload::decode(&encoded, Some("image/gif"), CANVAS_DEFAULT_MIME).unwrap();
        assert_eq!(declared.mime_type, "image/gif");

        let sniffed = ImagePayload::decode(&encoded, None, PHOTO_DEFAULT_MIME).unwrap();
        assert_eq!(sniffed.mime_type, "image/png");

        let unknown = ImagePayload::decode(&STANDARD.encode([1u8; 16]), None, PHOTO_DEFAULT_MIME).unwrap();
        assert_eq!(unknown.mime_type, "image/jpeg");
    }

    #[test]
    fn test_small_canvas_is_blank() {
        let encoded = STANDARD.encode(png_bytes(999));
        assert_eq!(
            ImagePayload::decode_canvas(&encoded, None).unwrap_err(),
            CanvasError::Blank { bytes: 999 }
        );
        // photos only need to be non-empty
        assert!(ImagePayload::decode(&encoded, None, PHOTO_DEFAULT_MIME).is_ok());
    }

    #[test]
    fn test_invalid_and_empty() {
        assert_eq!(
            ImagePayload::decode("not*base64!", None, CANVAS_DEFAULT_MIME).unwrap_err(),
            CanvasError::InvalidBase64
        );
        assert_eq!(
            ImagePayload::decode("data:image/png;base64,", None, CANVAS_DEFAULT_MIME).unwrap_err(),
            CanvasError::Empty
        );
    }

    #[test]
    fn test_unpadded_base64() {
        let payload = ImagePayload::decode("AAE", None, CANVAS_DEFAULT_MIME).unwrap();
        assert_eq!(payload.bytes, vec![0, 1]);
    }

    #[test]
    fn test_sniff_webp_and_jpeg() {
        assert_eq!(sniff_mime(b"RIFF\0\0\0\0WEBPVP8 "), Some("image/webp"));
        assert_eq!(sniff_mime(&[0xFF, 0xD8, 0xFF, 0xE0]), Some("image/jpeg"));
        assert_eq!(sniff_mime(b"GIF89a..."), Some("image/gif"));
        assert_eq!(sniff_mime(b"plain"), None);
    }

    #[test]
    fn test_describe_strokes() {
        assert_eq!(describe_canvas(&json!({ "strokes": [] })), BLANK_BOARD);
        assert_eq!(
            describe_canvas(&json!({ "strokes": [{ "points": [[1, 1]], "isEraser": true }] })),
            ERASED_BOARD
        );

        let long_stroke: Vec<_> = (0..60).map(|i| json!([i, i])).collect();
        let desc = describe_canvas(&json!({
            "strokes": [
                { "points": long_stroke },
                { "points": [[0, 0]], "isEraser": true }
            ]
        }));
        assert!(desc.starts_with("A moderate amount"));
        assert!(desc.contains("1 erasure(s)"));
        assert!(desc.contains("mostly long"));
    }

    #[test]
    fn test_describe_string_payload() {
        let desc = describe_canvas(&json!(r#"{"strokes":[{"points":[[0,0],[1,1]]}]}"#));
        assert!(desc.starts_with("Only a few marks"));
        assert!(desc.contains("mostly short"));

        let other = describe_canvas(&json!({ "shapes": [1] }));
        assert!(other.contains("shapes"));
    }
}
