use thiserror::Error;

use crate::types::ObjectId;

#[derive(Debug, Error)]
pub enum TextError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to parse SVG: {0}")]
    Svg(#[from] roxmltree::Error),
    #[error("SVG document has no <text> element")]
    MissingTextElement,
    #[error("no text object with id {0}")]
    UnknownObject(ObjectId),
    #[error("text object {0} is not editable")]
    NotEditable(ObjectId),
    #[error("unknown action: {0}")]
    UnknownAction(String),
    #[error("drawing surface unavailable: {0}")]
    Surface(String),
    #[error("native input unavailable: {0}")]
    NativeInput(String),
}

impl TextError {
    /// JSON error body returned across the wasm boundary.
    pub fn to_json(&self) -> String {
        serde_json::json!({ "error": self.to_string() }).to_string()
    }
}
