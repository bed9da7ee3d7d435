use serde::{Serialize, Deserialize};

pub type ObjectId = u32;

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
    Justify,
    JustifyLeft,
    JustifyCenter,
    JustifyRight,
}

impl TextAlign {
    pub fn is_justify(self) -> bool {
        matches!(self, TextAlign::Justify | TextAlign::JustifyLeft | TextAlign::JustifyCenter | TextAlign::JustifyRight)
    }

    /// Anchor used for lines that are not stretched.
    pub fn resting(self) -> TextAlign {
        match self {
            TextAlign::Justify | TextAlign::JustifyLeft => TextAlign::Left,
            TextAlign::JustifyCenter => TextAlign::Center,
            TextAlign::JustifyRight => TextAlign::Right,
            other => other,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Ltr,
    Rtl,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionDirection {
    #[default]
    None,
    Left,
    Right,
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers { shift: false, alt: false, ctrl: false, meta: false };
    pub const SHIFT: Modifiers = Modifiers { shift: true, alt: false, ctrl: false, meta: false };
    pub const ALT: Modifiers = Modifiers { shift: false, alt: true, ctrl: false, meta: false };
    pub const META: Modifiers = Modifiers { shift: false, alt: false, ctrl: false, meta: true };

    /// Cmd on macOS, Ctrl elsewhere.
    pub fn primary(&self) -> bool {
        self.ctrl || self.meta
    }
}

/// Object-level text defaults. Per-character overrides live in the style map.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TextProps {
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: String,
    pub font_style: String,
    pub fill: String,
    pub stroke: Option<String>,
    pub text_background_color: Option<String>,
    pub underline: bool,
    pub linethrough: bool,
    pub overline: bool,
    pub line_height: f64,
    pub char_spacing: f64,
    pub text_align: TextAlign,
    pub direction: Direction,
    /// Box width for wrapped text. `None` sizes the object to its longest line.
    pub wrap_width: Option<f64>,
    pub split_by_grapheme: bool,
    pub min_width: f64,
}

impl Default for TextProps {
    fn default() -> Self {
        TextProps {
            font_family: "Times New Roman".to_string(),
            font_size: 40.0,
            font_weight: "normal".to_string(),
            font_style: "normal".to_string(),
            fill: "rgb(0,0,0)".to_string(),
            stroke: None,
            text_background_color: None,
            underline: false,
            linethrough: false,
            overline: false,
            line_height: 1.16,
            char_spacing: 0.0,
            text_align: TextAlign::Left,
            direction: Direction::Ltr,
            wrap_width: None,
            split_by_grapheme: false,
            min_width: 20.0,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct EditingOptions {
    pub editable: bool,
    pub cursor_width: f64,
    pub cursor_color: Option<String>,
    pub cursor_delay: f64,
    pub cursor_duration: f64,
    pub selection_color: String,
    pub composition_color: String,
    pub editing_border_color: String,
    pub word_separators: String,
    pub empty_line_selection_width: Option<f64>,
    pub drag_enabled: bool,
}

impl Default for EditingOptions {
    fn default() -> Self {
        EditingOptions {
            editable: true,
            cursor_width: 2.0,
            cursor_color: None,
            cursor_delay: 1000.0,
            cursor_duration: 600.0,
            selection_color: "rgba(17,119,255,0.3)".to_string(),
            composition_color: "black".to_string(),
            editing_border_color: "rgba(102,153,255,0.25)".to_string(),
            word_separators: " \t\n\r".to_string(),
            empty_line_selection_width: None,
            drag_enabled: true,
        }
    }
}

/// Canvas-level appearance an object shows while it is idle. Editing swaps
/// in its own values and keeps these aside until exit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Appearance {
    pub has_controls: bool,
    pub border_color: String,
    pub lock_movement_x: bool,
    pub lock_movement_y: bool,
    pub hover_cursor: Option<String>,
    pub selectable: bool,
    pub default_cursor: String,
    pub move_cursor: String,
}

impl Default for Appearance {
    fn default() -> Self {
        Appearance {
            has_controls: true,
            border_color: "rgb(178,204,255)".to_string(),
            lock_movement_x: false,
            lock_movement_y: false,
            hover_cursor: None,
            selectable: true,
            default_cursor: "default".to_string(),
            move_cursor: "move".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "key", content = "value", rename_all = "camelCase")]
pub enum AppearanceChange {
    HasControls(bool),
    BorderColor(String),
    LockMovementX(bool),
    LockMovementY(bool),
    HoverCursor(Option<String>),
    Selectable(bool),
    DefaultCursor(String),
    MoveCursor(String),
}

impl Appearance {
    pub fn apply(&mut self, change: AppearanceChange) {
        match change {
            AppearanceChange::HasControls(v) => self.has_controls = v,
            AppearanceChange::BorderColor(v) => self.border_color = v,
            AppearanceChange::LockMovementX(v) => self.lock_movement_x = v,
            AppearanceChange::LockMovementY(v) => self.lock_movement_y = v,
            AppearanceChange::HoverCursor(v) => self.hover_cursor = v,
            AppearanceChange::Selectable(v) => self.selectable = v,
            AppearanceChange::DefaultCursor(v) => self.default_cursor = v,
            AppearanceChange::MoveCursor(v) => self.move_cursor = v,
        }
    }

    pub(crate) fn for_editing(options: &EditingOptions) -> Appearance {
        Appearance {
            has_controls: false,
            border_color: options.editing_border_color.clone(),
            lock_movement_x: true,
            lock_movement_y: true,
            hover_cursor: Some("text".to_string()),
            selectable: false,
            default_cursor: "text".to_string(),
            move_cursor: "text".to_string(),
        }
    }
}
