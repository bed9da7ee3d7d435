use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

use crate::editing::EditableText;
use crate::engine::{Scene, SceneObject, TextEngine};
use crate::error::TextError;
use crate::geometry::ObjectTransform;
use crate::measure::TextMeasurer;
use crate::objects::TextObject;
use crate::style::{CharStyle, StyleMap};
use crate::types::{Appearance, EditingOptions, ObjectId, TextProps};

/// One run of identically styled characters, `[start, end)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StyleSpan {
    pub start: usize,
    pub end: usize,
    pub style: CharStyle,
}

/// Collapse a style map into spans of contiguous equal styles. Unstyled
/// characters produce no span.
pub fn spans_from_styles(styles: &StyleMap, len: usize) -> Vec<StyleSpan> {
    let mut spans: Vec<StyleSpan> = Vec::new();
    for index in 0..len {
        let style = styles.style_at(index);
        if style.is_empty() {
            continue;
        }
        match spans.last_mut() {
            Some(last) if last.end == index && last.style == style => last.end += 1,
            _ => spans.push(StyleSpan { start: index, end: index + 1, style }),
        }
    }
    spans
}

/// Expand spans back into a style map for a text of `len` characters.
/// Spans with invalid bounds are skipped.
pub fn styles_from_spans(spans: &[StyleSpan], len: usize) -> StyleMap {
    let mut styles = StyleMap::new();
    for span in spans {
        if span.start >= span.end || span.end > len {
            log::warn!("dropping style span {}..{} for text of length {}", span.start, span.end, len);
            continue;
        }
        styles.merge_range(span.start..span.end, &span.style);
    }
    styles
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKind {
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "i-text")]
    IText,
    #[serde(rename = "textbox")]
    Textbox,
}

/// Persisted form of a text object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextObjectData {
    #[serde(rename = "type")]
    pub kind: TextKind,
    #[serde(default)]
    pub id: Option<ObjectId>,
    #[serde(default)]
    pub name: Option<String>,
    pub text: String,
    #[serde(flatten)]
    pub props: TextProps,
    #[serde(flatten)]
    pub transform: ObjectTransform,
    #[serde(default = "default_opacity")]
    pub opacity: f64,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default)]
    pub styles: Vec<StyleSpan>,
    /// Resting appearance; an object saved mid-edit stores what it will
    /// return to, not the editing look.
    #[serde(default)]
    pub appearance: Appearance,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editing: Option<EditingOptions>,
}

fn default_opacity() -> f64 {
    1.0
}

fn default_visible() -> bool {
    true
}

impl TextObjectData {
    pub fn from_object(object: &SceneObject) -> TextObjectData {
        let text = object.text();
        let (kind, editing) = match object {
            SceneObject::Static(_) => (TextKind::Text, None),
            SceneObject::Editable(e) if text.props().wrap_width.is_some() => (TextKind::Textbox, Some(e.options.clone())),
            SceneObject::Editable(e) => (TextKind::IText, Some(e.options.clone())),
        };
        TextObjectData {
            kind,
            id: Some(text.id),
            name: Some(text.name.clone()),
            text: text.text().to_string(),
            props: text.props().clone(),
            transform: text.transform,
            opacity: text.opacity,
            visible: text.visible,
            styles: spans_from_styles(text.styles(), text.len()),
            appearance: object
                .editable()
                .and_then(EditableText::saved_appearance)
                .unwrap_or(&text.appearance)
                .clone(),
            editing,
        }
    }

    /// Rebuild the object under `id`.
    pub fn into_object(self, id: ObjectId, measurer: Box<dyn TextMeasurer>) -> SceneObject {
        let mut props = self.props;
        if self.kind == TextKind::Textbox && props.wrap_width.is_none() {
            props.wrap_width = Some(props.min_width);
        }
        if self.kind == TextKind::IText {
            props.wrap_width = None;
        }
        let mut object = TextObject::new(id, &self.text, props, measurer);
        if let Some(name) = self.name {
            object.name = name;
        }
        object.transform = self.transform;
        object.opacity = self.opacity;
        object.visible = self.visible;
        object.appearance = self.appearance;
        let len = object.len();
        object.replace_styles(styles_from_spans(&self.styles, len));
        match self.kind {
            TextKind::Text => SceneObject::Static(object),
            TextKind::IText | TextKind::Textbox => {
                SceneObject::Editable(EditableText::new(object, self.editing.unwrap_or_default()))
            }
        }
    }
}

impl Scene {
    pub fn to_data(&self) -> Vec<TextObjectData> {
        self.objects.iter().map(TextObjectData::from_object).collect()
    }

    /// Add persisted objects, keeping their ids unless already taken.
    pub fn load(&mut self, data: Vec<TextObjectData>) -> Vec<ObjectId> {
        let mut ids = Vec::with_capacity(data.len());
        for item in data {
            let id = match item.id {
                Some(id) if id > 0 && self.object(id).is_none() => id,
                _ => self.next_id,
            };
            let object = item.into_object(id, self.measurer());
            ids.push(self.insert_object(object));
        }
        log::debug!("loaded {} text objects", ids.len());
        ids
    }
}

#[wasm_bindgen]
impl TextEngine {
    pub fn get_objects_json(&self) -> String {
        let scene = self.scene.borrow();
        match serde_json::to_string(&scene.to_data()) {
            Ok(json) => json,
            Err(e) => TextError::from(e).to_json(),
        }
    }

    pub fn load_objects_json(&mut self, json: &str) -> String {
        let data: Vec<TextObjectData> = match serde_json::from_str(json) {
            Ok(d) => d,
            Err(e) => return TextError::from(e).to_json(),
        };
        let ids = {
            let mut scene = self.scene.borrow_mut();
            let ids = scene.load(data);
            scene.render(js_sys::Date::now());
            ids
        };
        serde_json::json!({ "success": true, "ids": ids }).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MonospaceMeasurer;
    use crate::types::AppearanceChange;

    fn red() -> CharStyle {
        CharStyle { fill: Some("red".into()), ..Default::default() }
    }

    #[test]
    fn adjacent_equal_styles_share_a_span() {
        let mut styles = StyleMap::new();
        styles.merge_range(1..3, &red());
        styles.merge_range(3..4, &red());
        styles.merge_range(5..6, &red());
        let spans = spans_from_styles(&styles, 6);
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[0].start, spans[0].end), (1, 4));
        assert_eq!((spans[1].start, spans[1].end), (5, 6));
    }

    #[test]
    fn invalid_spans_are_dropped() {
        let spans = vec![
            StyleSpan { start: 0, end: 2, style: red() },
            StyleSpan { start: 3, end: 3, style: red() },
            StyleSpan { start: 4, end: 40, style: red() },
        ];
        let styles = styles_from_spans(&spans, 5);
        assert_eq!(styles.style_at(1), red());
        assert!(styles.get(2).is_none());
        assert!(styles.get(4).is_none());
    }

    #[test]
    fn loads_textbox_json() {
        let json = r#"[{"type":"textbox","text":"hi there","fontSize":12,"left":10,"top":20,
            "styles":[{"start":0,"end":2,"style":{"fontWeight":"bold"}}],"wrapWidth":80}]"#;
        let data: Vec<TextObjectData> = serde_json::from_str(json).unwrap_or_default();
        assert_eq!(data.len(), 1);
        let object = data[0].clone().into_object(7, Box::new(MonospaceMeasurer::default()));
        let SceneObject::Editable(e) = &object else { panic!("textbox should be editable") };
        assert_eq!(e.text.props().font_size, 12.0);
        assert_eq!(e.text.props().wrap_width, Some(80.0));
        assert_eq!(e.text.transform.left, 10.0);
        assert_eq!(e.text.style_at(1).font_weight.as_deref(), Some("bold"));
        assert!(e.text.style_at(2).is_empty());
    }

    #[test]
    fn scene_round_trip_keeps_ids_and_kinds() {
        let scene = Scene::shared();
        let mut scene = scene.borrow_mut();
        let a = scene.add_text("static", TextProps::default(), None, ObjectTransform::default());
        let b = scene.add_text("edit me", TextProps::default(), Some(EditingOptions::default()), ObjectTransform::default());
        let json = serde_json::to_string(&scene.to_data()).unwrap_or_default();

        let other = Scene::shared();
        let mut other = other.borrow_mut();
        let data: Vec<TextObjectData> = serde_json::from_str(&json).unwrap_or_default();
        assert_eq!(other.load(data), vec![a, b]);
        assert!(matches!(other.object(a), Some(SceneObject::Static(_))));
        assert_eq!(other.editable(b).map(|e| e.text.text().to_string()).as_deref(), Some("edit me"));
    }

    #[test]
    fn taken_ids_are_reassigned() {
        let scene = Scene::shared();
        let mut scene = scene.borrow_mut();
        let a = scene.add_text("one", TextProps::default(), None, ObjectTransform::default());
        let data = scene.to_data();
        let ids = scene.load(data);
        assert_eq!(ids.len(), 1);
        assert_ne!(ids[0], a);
    }

    #[test]
    fn saving_mid_edit_keeps_the_resting_appearance() {
        let scene = Scene::shared();
        let mut scene = scene.borrow_mut();
        let id = scene.add_text("edit me", TextProps::default(), Some(EditingOptions::default()), ObjectTransform::default());
        assert!(scene.enter_editing(id));
        if let Some(e) = scene.editable_mut(id) {
            e.set_appearance(AppearanceChange::BorderColor("red".into()));
        }
        let data = scene.to_data();
        assert_eq!(data[0].appearance.border_color, "red");
        assert!(data[0].appearance.has_controls);

        let json = serde_json::to_string(&data).unwrap_or_default();
        let other = Scene::shared();
        let mut other = other.borrow_mut();
        other.load(serde_json::from_str(&json).unwrap_or_default());
        let restored = other.object(id).map(|o| o.text().appearance.clone()).unwrap_or_default();
        assert_eq!(restored.border_color, "red");
        assert!(restored.has_controls);
    }
}
