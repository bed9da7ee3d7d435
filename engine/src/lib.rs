pub mod types;
pub mod error;
pub mod logger;
pub mod buffer;
pub mod style;
pub mod measure;
pub mod layout;
pub mod geometry;
pub mod events;
pub mod objects;
pub mod editing;
pub mod selection;
pub mod keys;
pub mod drag;
pub mod render;
pub mod blink;
pub mod bridge;
pub mod engine;
pub mod commands;
pub mod io;
pub mod svg;

pub use engine::{Scene, SceneObject, TextEngine};
pub use error::TextError;
pub use types::*;
pub use objects::*;
