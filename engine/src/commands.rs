use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use crate::editing::EditableText;
use crate::engine::{Scene, SceneObject, TextEngine};
use crate::error::TextError;
use crate::style::{CharStyle, StyleProperty};
use crate::types::{AppearanceChange, ObjectId, TextProps};

#[derive(Deserialize)]
struct Command {
    action: String,
    #[serde(default)]
    params: Value,
}

fn param<T: DeserializeOwned>(params: &Value, key: &str) -> Result<T, TextError> {
    Ok(serde_json::from_value(params.get(key).cloned().unwrap_or(Value::Null))?)
}

fn opt_index(params: &Value, key: &str) -> Option<usize> {
    params[key].as_u64().map(|v| v as usize)
}

/// Overlay the keys of `patch` onto the serialized form of `current`.
fn merged<T: Serialize + DeserializeOwned>(current: &T, patch: &Value) -> Result<T, TextError> {
    let mut value = serde_json::to_value(current)?;
    if let (Some(target), Some(fields)) = (value.as_object_mut(), patch.as_object()) {
        for (key, field) in fields {
            target.insert(key.clone(), field.clone());
        }
    }
    Ok(serde_json::from_value(value)?)
}

impl Scene {
    fn target_id(&self, params: &Value) -> Result<ObjectId, TextError> {
        match params["id"].as_u64() {
            Some(id) => Ok(id as ObjectId),
            None => self.active.ok_or(TextError::UnknownObject(0)),
        }
    }

    fn target_editable(&mut self, params: &Value) -> Result<&mut EditableText, TextError> {
        let id = self.target_id(params)?;
        match self.object_mut(id) {
            None => Err(TextError::UnknownObject(id)),
            Some(object) => object.editable_mut().ok_or(TextError::NotEditable(id)),
        }
    }

    /// Run one `{action, params}` command. Object-targeting actions use
    /// `params.id`, falling back to the active object.
    pub fn execute(&mut self, action: &str, params: &Value) -> Result<Value, TextError> {
        let result = match action {
            "insert_text" => {
                let text: String = param(params, "text")?;
                let e = self.target_editable(params)?;
                e.insert_text(&text);
                json!({ "success": true, "selectionStart": e.selection_start() })
            }
            "remove_chars" => {
                let e = self.target_editable(params)?;
                let start = opt_index(params, "start").unwrap_or(e.selection_start());
                let end = opt_index(params, "end").unwrap_or(e.selection_end());
                e.remove_chars(start, end);
                json!({ "success": true })
            }
            "select" => {
                let e = self.target_editable(params)?;
                let start = params["start"].as_i64().unwrap_or(0) as isize;
                let end = params["end"].as_i64().map_or(start, |v| v as isize);
                e.set_selection_start(start);
                e.set_selection_end(end);
                json!({ "success": true, "selectionStart": e.selection_start(), "selectionEnd": e.selection_end() })
            }
            "select_all" => {
                let e = self.target_editable(params)?;
                e.select_all();
                json!({ "success": true, "selectionEnd": e.selection_end() })
            }
            "select_word" => {
                let e = self.target_editable(params)?;
                let index = opt_index(params, "index").unwrap_or(e.selection_start());
                e.select_word(index);
                json!({ "success": true, "selectionStart": e.selection_start(), "selectionEnd": e.selection_end() })
            }
            "get_selection_styles" => {
                let e = self.target_editable(params)?;
                let styles = e.get_selection_styles(opt_index(params, "start"), opt_index(params, "end"));
                json!({ "success": true, "styles": styles })
            }
            "set_selection_styles" => {
                let style: CharStyle = param(params, "style")?;
                let e = self.target_editable(params)?;
                e.set_selection_styles(&style, opt_index(params, "start"), opt_index(params, "end"));
                json!({ "success": true })
            }
            "remove_style" => {
                let property: StyleProperty = param(params, "property")?;
                let id = self.target_id(params)?;
                let object = self.object_mut(id).ok_or(TextError::UnknownObject(id))?;
                object.text_mut().remove_style(property);
                json!({ "success": true })
            }
            "set_text" => {
                let text: String = param(params, "text")?;
                let id = self.target_id(params)?;
                let object = self.object_mut(id).ok_or(TextError::UnknownObject(id))?;
                object.text_mut().set_text(&text);
                if let Some(e) = object.editable_mut() {
                    let (start, end) = (e.selection_start(), e.selection_end());
                    e.set_selection_range(start, end);
                }
                json!({ "success": true })
            }
            "set_props" => {
                let id = self.target_id(params)?;
                let object = self.object_mut(id).ok_or(TextError::UnknownObject(id))?;
                let props: TextProps = merged(object.text().props(), &params["props"])?;
                object.text_mut().set_props(props);
                json!({ "success": true })
            }
            "set_transform" => {
                let id = self.target_id(params)?;
                let object = self.object_mut(id).ok_or(TextError::UnknownObject(id))?;
                let transform = merged(&object.text().transform, &params["transform"])?;
                object.text_mut().transform = transform;
                json!({ "success": true })
            }
            "set_appearance" => {
                let change: AppearanceChange = serde_json::from_value(params.clone())?;
                let id = self.target_id(params)?;
                match self.object_mut(id).ok_or(TextError::UnknownObject(id))? {
                    SceneObject::Editable(e) => e.set_appearance(change),
                    SceneObject::Static(text) => text.appearance.apply(change),
                }
                json!({ "success": true })
            }
            "enter_editing" => {
                let id = self.target_id(params)?;
                json!({ "success": self.enter_editing(id) })
            }
            "exit_editing" => {
                self.exit_editing();
                json!({ "success": true })
            }
            "copy" | "cut" => {
                let cut = action == "cut";
                let e = self.target_editable(params)?;
                let payload = if cut { e.cut() } else { e.copy() };
                let text = payload.as_ref().map(|p| p.text.clone());
                if payload.is_some() {
                    self.clipboard = payload;
                }
                json!({ "success": true, "text": text })
            }
            "paste" => {
                let text: String = param(params, "text")?;
                let clipboard = self.clipboard.clone();
                let e = self.target_editable(params)?;
                e.paste(&text, clipboard.as_ref());
                json!({ "success": true })
            }
            "get_state" => {
                let e = self.target_editable(params)?;
                json!({
                    "id": e.id(),
                    "text": e.text.text(),
                    "selectionStart": e.selection_start(),
                    "selectionEnd": e.selection_end(),
                    "isEditing": e.is_editing(),
                    "isComposing": e.is_composing(),
                    "appearance": e.text.appearance,
                })
            }
            "remove" => {
                let id = self.target_id(params)?;
                json!({ "success": self.remove_object(id) })
            }
            other => return Err(TextError::UnknownAction(other.to_string())),
        };
        self.flush_events();
        Ok(result)
    }
}

#[wasm_bindgen]
impl TextEngine {
    pub fn execute_command(&mut self, cmd_json: &str) -> String {
        let cmd: Command = match serde_json::from_str(cmd_json) {
            Ok(c) => c,
            Err(e) => return TextError::from(e).to_json(),
        };
        let response = {
            let mut scene = self.scene.borrow_mut();
            let result = scene.execute(&cmd.action, &cmd.params);
            scene.render(js_sys::Date::now());
            result
        };
        self.dispatch();
        match response {
            Ok(value) => value.to_string(),
            Err(e) => {
                log::debug!("command {} failed: {}", cmd.action, e);
                e.to_json()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ObjectTransform;
    use crate::types::EditingOptions;

    fn scene() -> (std::rc::Rc<std::cell::RefCell<Scene>>, ObjectId) {
        let scene = Scene::shared();
        let props = TextProps { font_size: 20.0, ..Default::default() };
        let id = scene.borrow_mut().add_text("hello world", props, Some(EditingOptions::default()), ObjectTransform::default());
        (scene, id)
    }

    #[test]
    fn select_clamps_out_of_range_indices() {
        let (scene, id) = scene();
        let mut scene = scene.borrow_mut();
        let out = scene.execute("select", &json!({ "id": id, "start": -5, "end": 500 }));
        let out = out.unwrap_or_default();
        assert_eq!(out["selectionStart"], 0);
        assert_eq!(out["selectionEnd"], 11);
    }

    #[test]
    fn styles_round_trip_through_commands() {
        let (scene, id) = scene();
        let mut scene = scene.borrow_mut();
        let style = json!({ "fill": "red", "fontWeight": "bold" });
        assert!(scene.execute("set_selection_styles", &json!({ "id": id, "style": style, "start": 0, "end": 2 })).is_ok());
        let out = scene.execute("get_selection_styles", &json!({ "id": id, "start": 0, "end": 3 })).unwrap_or_default();
        assert_eq!(out["styles"][0]["fill"], "red");
        assert_eq!(out["styles"][1]["fontWeight"], "bold");
        assert_eq!(out["styles"][2], json!({}));
        assert!(scene.execute("remove_style", &json!({ "id": id, "property": "fill" })).is_ok());
        let out = scene.execute("get_selection_styles", &json!({ "id": id, "start": 0, "end": 1 })).unwrap_or_default();
        assert_eq!(out["styles"][0], json!({ "fontWeight": "bold" }));
    }

    #[test]
    fn props_are_patched_not_replaced() {
        let (scene, id) = scene();
        let mut scene = scene.borrow_mut();
        assert!(scene.execute("set_props", &json!({ "id": id, "props": { "fill": "blue" } })).is_ok());
        let props = scene.object(id).map(|o| o.text().props().clone()).unwrap_or_default();
        assert_eq!(props.fill, "blue");
        assert_eq!(props.font_size, 20.0);
    }

    #[test]
    fn unknown_targets_and_actions_fail() {
        let (scene, _id) = scene();
        let mut scene = scene.borrow_mut();
        assert!(matches!(scene.execute("select_all", &json!({ "id": 99 })), Err(TextError::UnknownObject(99))));
        assert!(matches!(scene.execute("frobnicate", &json!({})), Err(TextError::UnknownAction(_))));
    }

    #[test]
    fn cut_then_paste_moves_styled_text() {
        let (scene, id) = scene();
        let mut scene = scene.borrow_mut();
        assert_eq!(scene.execute("enter_editing", &json!({ "id": id })).unwrap_or_default()["success"], true);
        scene.execute("set_selection_styles", &json!({ "id": id, "style": { "fill": "red" }, "start": 0, "end": 5 })).ok();
        scene.execute("select", &json!({ "id": id, "start": 0, "end": 5 })).ok();
        let out = scene.execute("cut", &json!({ "id": id })).unwrap_or_default();
        assert_eq!(out["text"], "hello");
        scene.execute("select", &json!({ "id": id, "start": 6, "end": 6 })).ok();
        scene.execute("paste", &json!({ "id": id, "text": "hello" })).ok();
        let state = scene.execute("get_state", &json!({ "id": id })).unwrap_or_default();
        assert_eq!(state["text"], " worldhello");
        let out = scene.execute("get_selection_styles", &json!({ "id": id, "start": 6, "end": 7 })).unwrap_or_default();
        assert_eq!(out["styles"][0]["fill"], "red");
    }

    #[test]
    fn state_reports_the_live_appearance() {
        let (scene, id) = scene();
        let mut scene = scene.borrow_mut();
        let idle = scene.execute("get_state", &json!({ "id": id })).unwrap_or_default();
        assert_eq!(idle["appearance"]["hasControls"], true);
        scene.execute("enter_editing", &json!({ "id": id })).ok();
        let editing = scene.execute("get_state", &json!({ "id": id })).unwrap_or_default();
        assert_eq!(editing["appearance"]["hasControls"], false);
        assert_eq!(editing["appearance"]["borderColor"], EditingOptions::default().editing_border_color);
    }
}
