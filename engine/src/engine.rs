use std::cell::RefCell;
use std::rc::{Rc, Weak};

use kurbo::{Affine, Point};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CanvasRenderingContext2d, Element, HtmlCanvasElement};

use crate::blink::BlinkTimer;
use crate::bridge::{HiddenTextarea, InputPool, InputSink, NativeEvent, NativeInput, NativeOutcome};
use crate::editing::{ClipboardPayload, EditableText, PointerRelease};
use crate::error::TextError;
use crate::events::{self, Emitter, TextEvent};
use crate::geometry::{viewport_matrix, ObjectTransform};
use crate::keys::{Key, KeyOutcome};
use crate::measure::{CanvasMeasurer, MonospaceMeasurer, TextMeasurer};
use crate::objects::TextObject;
use crate::render::DrawSurface;
use crate::types::{EditingOptions, Modifiers, ObjectId, TextProps};

/// Repaint interval of the top layer while a caret blinks.
const BLINK_FRAME_MS: i32 = 32;

pub enum SceneObject {
    /// Styled text without editing support.
    Static(TextObject),
    Editable(EditableText),
}

impl SceneObject {
    pub fn id(&self) -> ObjectId {
        self.text().id
    }

    pub fn text(&self) -> &TextObject {
        match self {
            SceneObject::Static(text) => text,
            SceneObject::Editable(editable) => &editable.text,
        }
    }

    pub fn text_mut(&mut self) -> &mut TextObject {
        match self {
            SceneObject::Static(text) => text,
            SceneObject::Editable(editable) => &mut editable.text,
        }
    }

    pub fn editable(&self) -> Option<&EditableText> {
        match self {
            SceneObject::Editable(editable) => Some(editable),
            SceneObject::Static(_) => None,
        }
    }

    pub fn editable_mut(&mut self) -> Option<&mut EditableText> {
        match self {
            SceneObject::Editable(editable) => Some(editable),
            SceneObject::Static(_) => None,
        }
    }
}

/// Everything the engine owns. Shared behind `Rc<RefCell<_>>` so native input
/// and timer callbacks can reach it through a weak handle.
pub struct Scene {
    pub(crate) objects: Vec<SceneObject>,
    pub(crate) next_id: ObjectId,
    pub(crate) active: Option<ObjectId>,
    pub viewport_x: f64,
    pub viewport_y: f64,
    pub viewport_zoom: f64,
    pub(crate) main: Option<CanvasRenderingContext2d>,
    pub(crate) top: Option<CanvasRenderingContext2d>,
    pub(crate) inputs: InputPool,
    pub(crate) clipboard: Option<ClipboardPayload>,
    pub(crate) events: Emitter,
    pending_enter: Option<ObjectId>,
    drop_target: Option<ObjectId>,
    blink_timer: Option<BlinkTimer>,
    handle: Weak<RefCell<Scene>>,
}

impl Scene {
    pub fn shared() -> Rc<RefCell<Scene>> {
        Rc::new_cyclic(|handle| {
            RefCell::new(Scene {
                objects: Vec::new(),
                next_id: 1,
                active: None,
                viewport_x: 0.0,
                viewport_y: 0.0,
                viewport_zoom: 1.0,
                main: None,
                top: None,
                inputs: InputPool::default(),
                clipboard: None,
                events: Emitter::new(),
                pending_enter: None,
                drop_target: None,
                blink_timer: None,
                handle: handle.clone(),
            })
        })
    }

    pub(crate) fn measurer(&self) -> Box<dyn TextMeasurer> {
        match &self.main {
            Some(ctx) => Box::new(CanvasMeasurer::new(ctx.clone())),
            None => Box::new(MonospaceMeasurer::default()),
        }
    }

    pub fn add_text(&mut self, text: &str, props: TextProps, options: Option<EditingOptions>, transform: ObjectTransform) -> ObjectId {
        let id = self.next_id;
        self.next_id += 1;
        let mut object = TextObject::new(id, text, props, self.measurer());
        object.transform = transform;
        self.objects.push(match options {
            Some(options) => SceneObject::Editable(EditableText::new(object, options)),
            None => SceneObject::Static(object),
        });
        id
    }

    pub(crate) fn insert_object(&mut self, object: SceneObject) -> ObjectId {
        let id = object.id();
        self.next_id = self.next_id.max(id + 1);
        self.objects.push(object);
        id
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        if self.editing_id() == Some(id) {
            self.exit_editing();
        }
        let before = self.objects.len();
        self.objects.retain(|o| o.id() != id);
        self.inputs.discard(id);
        if self.active == Some(id) {
            self.active = None;
        }
        before != self.objects.len()
    }

    pub fn object(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.id() == id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.iter_mut().find(|o| o.id() == id)
    }

    pub fn editable(&self, id: ObjectId) -> Option<&EditableText> {
        self.object(id).and_then(SceneObject::editable)
    }

    pub fn editable_mut(&mut self, id: ObjectId) -> Option<&mut EditableText> {
        self.object_mut(id).and_then(SceneObject::editable_mut)
    }

    pub fn active(&self) -> Option<ObjectId> {
        self.active
    }

    pub fn editing_id(&self) -> Option<ObjectId> {
        self.objects
            .iter()
            .filter_map(SceneObject::editable)
            .find(|e| e.is_editing())
            .map(EditableText::id)
    }

    pub fn set_viewport(&mut self, x: f64, y: f64, zoom: f64) {
        self.viewport_x = x;
        self.viewport_y = y;
        self.viewport_zoom = zoom;
        let view = self.view();
        for editable in self.objects.iter_mut().filter_map(SceneObject::editable_mut) {
            editable.set_view(view);
        }
    }

    pub fn view(&self) -> Affine {
        viewport_matrix(self.viewport_x, self.viewport_y, self.viewport_zoom)
    }

    fn scene_point(&self, screen: Point) -> Point {
        self.view().inverse() * screen
    }

    /// Topmost visible, selectable object under a scene point.
    pub fn hit_test(&self, point: Point) -> Option<ObjectId> {
        self.objects
            .iter()
            .rev()
            .find(|o| o.text().appearance.selectable && o.text().contains(point))
            .map(SceneObject::id)
    }

    /// CSS cursor for the pointer at `screen`: the hover cursor of the object
    /// under it, else that object's move cursor, else the default.
    pub fn cursor_at(&self, screen: Point) -> String {
        let point = self.scene_point(screen);
        let hovered = self.objects.iter().rev().map(SceneObject::text).find(|t| t.contains(point));
        match hovered {
            Some(text) => text.appearance.hover_cursor.clone().unwrap_or_else(|| text.appearance.move_cursor.clone()),
            None => "default".to_string(),
        }
    }

    fn show_cursor(&self, cursor: &str) {
        let Some(canvas) = self.top.as_ref().and_then(CanvasRenderingContext2d::canvas) else { return };
        if let Err(err) = canvas.style().set_property("cursor", cursor) {
            log::warn!("failed to set canvas cursor: {:?}", err);
        }
    }

    fn editable_under(&self, point: Point, except: ObjectId) -> Option<ObjectId> {
        self.objects
            .iter()
            .rev()
            .filter_map(SceneObject::editable)
            .find(|e| e.id() != except && e.options.editable && e.text.contains(point))
            .map(EditableText::id)
    }

    // ---- editing lifecycle ----

    pub fn enter_editing(&mut self, id: ObjectId) -> bool {
        if self.editing_id().is_some_and(|current| current != id) {
            self.exit_editing();
        }
        let view = self.view();
        let can_enter = self.editable(id).is_some_and(EditableText::can_enter_editing);
        if !can_enter {
            return false;
        }
        let bridge = self.inputs.acquire(id);
        let Some(editable) = self.editable_mut(id) else { return false };
        editable.set_view(view);
        editable.enter_editing(bridge);
        self.active = Some(id);
        self.start_blink();
        self.flush_events();
        true
    }

    pub fn exit_editing(&mut self) {
        let Some(id) = self.editing_id() else { return };
        let bridge = self.editable_mut(id).and_then(EditableText::exit_editing);
        if let Some(bridge) = bridge {
            self.inputs.release(id, bridge);
        }
        self.blink_timer = None;
        self.flush_events();
    }

    fn start_blink(&mut self) {
        if self.top.is_none() || self.blink_timer.is_some() {
            return;
        }
        let handle = self.handle.clone();
        self.blink_timer = BlinkTimer::start(BLINK_FRAME_MS, move || {
            let Some(scene) = handle.upgrade() else { return };
            if let Ok(mut scene) = scene.try_borrow_mut() {
                scene.render_top(js_sys::Date::now());
            };
        });
    }

    /// Move object events to the canvas emitter under their canvas names.
    pub fn flush_events(&mut self) {
        let mut fired: Vec<TextEvent> = Vec::new();
        for editable in self.objects.iter_mut().filter_map(SceneObject::editable_mut) {
            fired.extend(editable.drain_events());
        }
        for event in fired {
            let name = if event.name == events::MODIFIED {
                "object:modified".to_string()
            } else {
                format!("{}{}", events::CANVAS_PREFIX, event.name)
            };
            self.events.fire(&name, event.target);
        }
    }

    pub fn drain_canvas_events(&mut self) -> Vec<TextEvent> {
        self.events.drain()
    }

    // ---- pointer ----

    pub fn pointer_down(&mut self, screen: Point, now: f64, modifiers: Modifiers) {
        let point = self.scene_point(screen);
        self.pending_enter = None;
        if let Some(id) = self.editing_id() {
            if let Some(editable) = self.editable_mut(id) {
                if editable.text.contains(point) {
                    editable.mouse_down(point, now, modifiers);
                    self.flush_events();
                    return;
                }
            }
            self.exit_editing();
        }
        match self.hit_test(point) {
            Some(id) if self.active == Some(id) => {
                if self.editable(id).is_some_and(EditableText::can_enter_editing) {
                    self.pending_enter = Some(id);
                }
            }
            hit => self.active = hit,
        }
    }

    pub fn pointer_move(&mut self, screen: Point) -> bool {
        let point = self.scene_point(screen);
        let Some(id) = self.editing_id() else { return false };
        let dragging_out = self
            .editable(id)
            .is_some_and(|e| e.is_mouse_down() && e.is_dragging() && !e.text.contains(point));
        if dragging_out {
            let target = self.editable_under(point, id);
            if target != self.drop_target {
                self.clear_drop_target();
            }
            if let Some(source) = self.editable_mut(id) {
                source.clear_drop_preview();
            }
            if let Some(target_id) = target {
                if let Some(editable) = self.editable_mut(target_id) {
                    editable.drag_over(point);
                }
            }
            self.drop_target = target;
            return true;
        }
        self.clear_drop_target();
        let changed = self.editable_mut(id).is_some_and(|e| e.mouse_move(point));
        self.flush_events();
        changed
    }

    pub fn pointer_up(&mut self, screen: Point) {
        let point = self.scene_point(screen);
        if let Some(id) = self.pending_enter.take() {
            if self.hit_test(point) == Some(id) && self.enter_editing(id) {
                if let Some(editable) = self.editable_mut(id) {
                    let index = editable.selection_start_from_pointer(point);
                    editable.set_cursor_by_click(index, false);
                }
                self.flush_events();
            }
            return;
        }
        let Some(id) = self.editing_id() else { return };
        let release = self.editable_mut(id).map(|e| e.mouse_up(point));
        if release == Some(PointerRelease::DraggedOut) {
            self.drop_outside(id, point);
        }
        self.clear_drop_target();
        self.flush_events();
    }

    fn clear_drop_target(&mut self) {
        if let Some(target) = self.drop_target.take() {
            if let Some(editable) = self.editable_mut(target) {
                editable.clear_drop_preview();
            }
        }
    }

    /// Finish a text drag released outside its source: the text moves to the
    /// editable object under the pointer, which then takes over editing.
    fn drop_outside(&mut self, source: ObjectId, point: Point) {
        let target = self.drop_target.or_else(|| self.editable_under(point, source));
        let Some(drag) = self.editable_mut(source).and_then(EditableText::take_drag) else { return };
        let Some(target) = target else {
            log::debug!("text {}: drag released over nothing", source);
            return;
        };
        let Some(editable) = self.editable_mut(target) else { return };
        let index = editable.selection_start_from_pointer(point);
        let inserted = editable.accept_drop(index, &drag.payload);
        if let Some(editable) = self.editable_mut(source) {
            editable.remove_dragged(&drag);
        }
        log::debug!("text {}: moved {}..{} into text {} at {}", source, drag.start, drag.end, target, inserted.start);
        self.exit_editing();
        self.enter_editing(target);
        if let Some(editable) = self.editable_mut(target) {
            editable.set_selection_range(inserted.start, inserted.end);
        }
        self.flush_events();
    }

    // ---- keyboard and native input ----

    pub fn key_down(&mut self, key: &Key, modifiers: Modifiers) -> NativeOutcome {
        let Some(id) = self.editing_id() else { return NativeOutcome::Ignored };
        let outcome = self.editable_mut(id).map_or(KeyOutcome::Ignored, |e| e.on_key_down(key, modifiers));
        let result = match outcome {
            KeyOutcome::Ignored => NativeOutcome::Ignored,
            KeyOutcome::Handled => NativeOutcome::Handled,
            KeyOutcome::ExitEditing => {
                self.exit_editing();
                NativeOutcome::Handled
            }
        };
        self.flush_events();
        result
    }

    /// Handle an event from the native input of `target`. Events that arrive
    /// after the session ended are dropped.
    pub fn native_event(&mut self, target: ObjectId, event: NativeEvent) -> NativeOutcome {
        if self.editing_id() != Some(target) {
            return NativeOutcome::Ignored;
        }
        if let NativeEvent::KeyDown { key, modifiers } = &event {
            return self.key_down(key, *modifiers);
        }
        let clipboard = self.clipboard.clone();
        let Some(editable) = self.editable_mut(target) else { return NativeOutcome::Ignored };
        let mut copied = None;
        match event {
            NativeEvent::KeyDown { .. } => {}
            NativeEvent::Input { value, selection_start, selection_end, from_paste } => {
                editable.on_input(&value, selection_start, selection_end, from_paste, clipboard.as_ref());
            }
            NativeEvent::CompositionStart => editable.composition_start(),
            NativeEvent::CompositionUpdate(data) => editable.composition_update(&data),
            NativeEvent::CompositionEnd(data) => editable.commit_composition(data.as_deref()),
            // The native cut edits the input's value; the following input
            // event removes the text here.
            NativeEvent::Copy | NativeEvent::Cut => copied = editable.copy(),
        }
        if copied.is_some() {
            self.clipboard = copied;
        }
        self.flush_events();
        NativeOutcome::Ignored
    }

    // ---- rendering ----

    /// Repaint every object, then the top layer. Clears the caret caches so
    /// the next blink frame recomputes them once.
    pub fn render_to(&mut self, main: &mut dyn DrawSurface, top: &mut dyn DrawSurface, now: f64) {
        let view = self.view();
        main.clear();
        for object in &self.objects {
            object.text().render(main, view);
        }
        for editable in self.objects.iter().filter_map(SceneObject::editable) {
            editable.invalidate_cursor_cache();
        }
        self.render_top_to(top, now);
    }

    pub fn render_top_to(&mut self, top: &mut dyn DrawSurface, now: f64) {
        let view = self.view();
        let zoom = self.viewport_zoom;
        top.clear();
        if let Some(active) = self.active.and_then(|id| self.object(id)) {
            active.text().render_border(top, view, zoom);
        }
        for editable in self.objects.iter_mut().filter_map(SceneObject::editable_mut) {
            editable.render_cursor_or_selection(top, view, zoom, now);
        }
    }

    pub fn render(&mut self, now: f64) {
        let (Some(mut main), Some(mut top)) = (self.main.clone(), self.top.clone()) else { return };
        self.render_to(&mut main, &mut top, now);
    }

    pub fn render_top(&mut self, now: f64) {
        let Some(mut top) = self.top.clone() else { return };
        self.render_top_to(&mut top, now);
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.blink_timer = None;
        for object in &self.objects {
            self.inputs.discard(object.id());
        }
    }
}

type JsListeners = Rc<RefCell<Vec<(String, js_sys::Function)>>>;

/// Forward canvas events to JS listeners once the scene is released.
fn dispatch(scene: &RefCell<Scene>, listeners: &RefCell<Vec<(String, js_sys::Function)>>) {
    let fired = match scene.try_borrow_mut() {
        Ok(mut scene) => scene.drain_canvas_events(),
        Err(_) => return,
    };
    if fired.is_empty() {
        return;
    }
    let listeners = listeners.borrow().clone();
    for event in fired {
        let Ok(value) = serde_wasm_bindgen::to_value(&event) else { continue };
        for (name, callback) in &listeners {
            if *name == event.name {
                if let Err(err) = callback.call1(&JsValue::NULL, &value) {
                    log::warn!("listener for {} failed: {:?}", event.name, err);
                }
            }
        }
    }
}

struct SceneSink {
    scene: Weak<RefCell<Scene>>,
    listeners: Weak<RefCell<Vec<(String, js_sys::Function)>>>,
}

impl InputSink for SceneSink {
    fn deliver(&self, target: ObjectId, event: NativeEvent) -> NativeOutcome {
        let Some(scene) = self.scene.upgrade() else { return NativeOutcome::Ignored };
        let outcome = match scene.try_borrow_mut() {
            Ok(mut scene) => {
                let outcome = scene.native_event(target, event);
                scene.render(js_sys::Date::now());
                outcome
            }
            Err(_) => {
                log::debug!("text {}: native event while the engine is busy", target);
                return NativeOutcome::Ignored;
            }
        };
        if let Some(listeners) = self.listeners.upgrade() {
            dispatch(&scene, &listeners);
        }
        outcome
    }
}

#[wasm_bindgen]
pub struct TextEngine {
    pub(crate) scene: Rc<RefCell<Scene>>,
    listeners: JsListeners,
}

impl Default for TextEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl TextEngine {
    pub(crate) fn dispatch(&self) {
        dispatch(&self.scene, &self.listeners);
    }
}

fn context_2d(canvas: &HtmlCanvasElement) -> Result<CanvasRenderingContext2d, TextError> {
    canvas
        .get_context("2d")
        .map_err(|e| TextError::Surface(format!("{:?}", e)))?
        .ok_or_else(|| TextError::Surface("2d context unavailable".to_string()))?
        .dyn_into::<CanvasRenderingContext2d>()
        .map_err(|_| TextError::Surface("not a 2d context".to_string()))
}

fn parse_text_args(props_json: &str, options_json: &str) -> Result<(TextProps, ObjectTransform, Option<EditingOptions>), TextError> {
    Ok((serde_json::from_str(props_json)?, serde_json::from_str(props_json)?, serde_json::from_str(options_json)?))
}

fn modifiers(shift: bool, alt: bool, ctrl: bool, meta: bool) -> Modifiers {
    Modifiers { shift, alt, ctrl, meta }
}

#[wasm_bindgen]
impl TextEngine {
    #[wasm_bindgen(constructor)]
    pub fn new() -> TextEngine {
        console_error_panic_hook::set_once();
        crate::logger::init(log::LevelFilter::Info);
        TextEngine { scene: Scene::shared(), listeners: Rc::new(RefCell::new(Vec::new())) }
    }

    pub fn set_log_level(&self, level: &str) {
        let level = level.parse().unwrap_or(log::LevelFilter::Info);
        log::set_max_level(level);
    }

    /// Bind the main and top canvases. Hidden inputs are created inside
    /// `container`, or the document body when it is absent.
    pub fn attach(&mut self, main: &HtmlCanvasElement, top: &HtmlCanvasElement, container: Option<Element>) -> String {
        let (main, top) = match (context_2d(main), context_2d(top)) {
            (Ok(main), Ok(top)) => (main, top),
            (Err(e), _) | (_, Err(e)) => return e.to_json(),
        };
        let sink: Rc<dyn InputSink> = Rc::new(SceneSink {
            scene: Rc::downgrade(&self.scene),
            listeners: Rc::downgrade(&self.listeners),
        });
        let mut scene = self.scene.borrow_mut();
        scene.inputs.set_factory(Box::new(move |owner| {
            let document = web_sys::window()?.document()?;
            HiddenTextarea::create(&document, container.as_ref(), owner, sink.clone())
                .map(|textarea| Box::new(textarea) as Box<dyn NativeInput>)
                .map_err(|e| log::warn!("text {}: {}", owner, e))
                .ok()
        }));
        for object in scene.objects.iter_mut() {
            object.text_mut().set_measurer(Box::new(CanvasMeasurer::new(main.clone())));
        }
        scene.main = Some(main);
        scene.top = Some(top);
        "{\"success\": true}".to_string()
    }

    pub fn set_viewport(&mut self, x: f64, y: f64, zoom: f64) {
        self.scene.borrow_mut().set_viewport(x, y, zoom);
    }

    /// Add a text object. `props_json` holds text defaults and placement;
    /// `options_json` the editing options, or `null` for static text.
    pub fn add_text(&mut self, text: &str, props_json: &str, options_json: &str) -> String {
        match parse_text_args(props_json, options_json) {
            Ok((props, transform, options)) => {
                let id = self.scene.borrow_mut().add_text(text, props, options, transform);
                serde_json::json!({ "success": true, "id": id }).to_string()
            }
            Err(e) => e.to_json(),
        }
    }

    pub fn remove_object(&mut self, id: ObjectId) -> bool {
        let removed = self.scene.borrow_mut().remove_object(id);
        self.dispatch();
        removed
    }

    pub fn active_object(&self) -> Option<ObjectId> {
        self.scene.borrow().active()
    }

    pub fn editing_object(&self) -> Option<ObjectId> {
        self.scene.borrow().editing_id()
    }

    pub fn on_pointer_down(&mut self, x: f64, y: f64, shift: bool, alt: bool, ctrl: bool, meta: bool) {
        let now = js_sys::Date::now();
        {
            let mut scene = self.scene.borrow_mut();
            scene.pointer_down(Point::new(x, y), now, modifiers(shift, alt, ctrl, meta));
            scene.render(now);
        }
        self.dispatch();
    }

    pub fn on_pointer_move(&mut self, x: f64, y: f64) {
        let now = js_sys::Date::now();
        {
            let mut scene = self.scene.borrow_mut();
            if scene.pointer_move(Point::new(x, y)) {
                scene.render_top(now);
            }
            let cursor = scene.cursor_at(Point::new(x, y));
            scene.show_cursor(&cursor);
        }
        self.dispatch();
    }

    pub fn on_pointer_up(&mut self, x: f64, y: f64) {
        let now = js_sys::Date::now();
        {
            let mut scene = self.scene.borrow_mut();
            scene.pointer_up(Point::new(x, y));
            scene.render(now);
        }
        self.dispatch();
    }

    /// Keys that reach the canvas instead of the hidden input. Returns
    /// whether the default action should be prevented.
    pub fn on_key_down(&mut self, key: &str, shift: bool, alt: bool, ctrl: bool, meta: bool) -> bool {
        let now = js_sys::Date::now();
        let outcome = {
            let mut scene = self.scene.borrow_mut();
            let outcome = scene.key_down(&Key::from_dom(key), modifiers(shift, alt, ctrl, meta));
            scene.render(now);
            outcome
        };
        self.dispatch();
        outcome == NativeOutcome::Handled
    }

    pub fn enter_editing(&mut self, id: ObjectId) -> bool {
        let entered = {
            let mut scene = self.scene.borrow_mut();
            let entered = scene.enter_editing(id);
            scene.render(js_sys::Date::now());
            entered
        };
        self.dispatch();
        entered
    }

    pub fn exit_editing(&mut self) {
        {
            let mut scene = self.scene.borrow_mut();
            scene.exit_editing();
            scene.render(js_sys::Date::now());
        }
        self.dispatch();
    }

    pub fn selection_start(&self, id: ObjectId) -> Option<usize> {
        self.scene.borrow().editable(id).map(EditableText::selection_start)
    }

    pub fn selection_end(&self, id: ObjectId) -> Option<usize> {
        self.scene.borrow().editable(id).map(EditableText::selection_end)
    }

    pub fn set_selection_start(&mut self, id: ObjectId, index: i32) {
        self.with_editable(id, |e| e.set_selection_start(index as isize));
    }

    pub fn set_selection_end(&mut self, id: ObjectId, index: i32) {
        self.with_editable(id, |e| e.set_selection_end(index as isize));
    }

    /// Per-character style records of `[start, end)` as plain JS objects.
    pub fn get_selection_styles(&self, id: ObjectId, start: Option<usize>, end: Option<usize>) -> JsValue {
        let scene = self.scene.borrow();
        let styles = scene.editable(id).map(|e| e.get_selection_styles(start, end)).unwrap_or_default();
        serde_wasm_bindgen::to_value(&styles).unwrap_or(JsValue::NULL)
    }

    pub fn on(&mut self, name: &str, callback: js_sys::Function) {
        self.listeners.borrow_mut().push((name.to_string(), callback));
    }

    pub fn off(&mut self, name: &str) {
        self.listeners.borrow_mut().retain(|(n, _)| n != name);
    }

    pub fn render(&self) {
        self.scene.borrow_mut().render(js_sys::Date::now());
    }

    pub fn render_top(&self) {
        self.scene.borrow_mut().render_top(js_sys::Date::now());
    }
}

impl TextEngine {
    fn with_editable(&mut self, id: ObjectId, f: impl FnOnce(&mut EditableText)) {
        {
            let mut scene = self.scene.borrow_mut();
            if let Some(editable) = scene.editable_mut(id) {
                f(editable);
            }
            scene.flush_events();
            scene.render_top(js_sys::Date::now());
        }
        self.dispatch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::FakeInput;
    use crate::render::{DrawCall, RecordingSurface};
    use crate::types::{Appearance, AppearanceChange};

    fn props() -> TextProps {
        TextProps { font_size: 20.0, line_height: 1.0, ..Default::default() }
    }

    fn scene_with(text: &str) -> (Rc<RefCell<Scene>>, ObjectId) {
        let scene = Scene::shared();
        let id = scene.borrow_mut().add_text(text, props(), Some(EditingOptions::default()), ObjectTransform::default());
        (scene, id)
    }

    #[test]
    fn second_click_enters_editing_at_the_pointer() {
        let (scene, id) = scene_with("hello");
        let mut scene = scene.borrow_mut();
        // Boxes are 12 wide per grapheme at the default advance.
        scene.pointer_down(Point::new(25.0, 5.0), 0.0, Modifiers::NONE);
        scene.pointer_up(Point::new(25.0, 5.0));
        assert_eq!(scene.active(), Some(id));
        assert_eq!(scene.editing_id(), None);
        scene.pointer_down(Point::new(25.0, 5.0), 1000.0, Modifiers::NONE);
        scene.pointer_up(Point::new(25.0, 5.0));
        assert_eq!(scene.editing_id(), Some(id));
        assert_eq!(scene.editable(id).map(EditableText::selection_start), Some(2));
        let names: Vec<String> = scene.drain_canvas_events().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&"text:editing:entered".to_string()));
        assert!(names.contains(&"text:selection:changed".to_string()));
    }

    #[test]
    fn clicking_outside_exits_editing() {
        let (scene, id) = scene_with("hello");
        let mut scene = scene.borrow_mut();
        assert!(scene.enter_editing(id));
        scene.pointer_down(Point::new(500.0, 500.0), 0.0, Modifiers::NONE);
        assert_eq!(scene.editing_id(), None);
        assert_eq!(scene.active(), None);
        let names: Vec<String> = scene.drain_canvas_events().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&"text:editing:exited".to_string()));
    }

    #[test]
    fn native_input_is_reused_across_sessions() {
        let (scene, id) = scene_with("hello");
        let mut scene = scene.borrow_mut();
        let created = Rc::new(std::cell::Cell::new(0));
        let counter = created.clone();
        let fake = FakeInput::new();
        let shared = fake.clone();
        scene.inputs.set_factory(Box::new(move |_| {
            counter.set(counter.get() + 1);
            Some(Box::new(shared.clone()) as Box<dyn NativeInput>)
        }));
        scene.enter_editing(id);
        assert!(fake.is_focused());
        scene.exit_editing();
        scene.enter_editing(id);
        scene.exit_editing();
        assert_eq!(created.get(), 1);
        scene.remove_object(id);
        assert!(fake.is_detached());
    }

    #[test]
    fn late_native_events_are_ignored() {
        let (scene, id) = scene_with("hello");
        let mut scene = scene.borrow_mut();
        let event = NativeEvent::Input { value: "x".into(), selection_start: 1, selection_end: 1, from_paste: false };
        assert_eq!(scene.native_event(id, event), NativeOutcome::Ignored);
        assert_eq!(scene.object(id).map(|o| o.text().text().to_string()), Some("hello".to_string()));
    }

    #[test]
    fn escape_exits_and_copy_fills_the_clipboard() {
        let (scene, id) = scene_with("hello");
        let mut scene = scene.borrow_mut();
        scene.enter_editing(id);
        if let Some(e) = scene.editable_mut(id) {
            e.set_selection_range(0, 2);
        }
        scene.native_event(id, NativeEvent::Copy);
        assert_eq!(scene.clipboard.as_ref().map(|c| c.text.as_str()), Some("he"));
        let outcome = scene.native_event(id, NativeEvent::KeyDown { key: Key::Escape, modifiers: Modifiers::NONE });
        assert_eq!(outcome, NativeOutcome::Handled);
        assert_eq!(scene.editing_id(), None);
    }

    #[test]
    fn drag_moves_text_between_objects() {
        let scene = Scene::shared();
        let mut scene = scene.borrow_mut();
        let source = scene.add_text("hello", props(), Some(EditingOptions::default()), ObjectTransform::default());
        let target_at = ObjectTransform { top: 100.0, ..Default::default() };
        let target = scene.add_text("ab", props(), Some(EditingOptions::default()), target_at);
        scene.enter_editing(source);
        if let Some(e) = scene.editable_mut(source) {
            e.set_selection_range(0, 2);
        }
        scene.pointer_down(Point::new(5.0, 5.0), 0.0, Modifiers::NONE);
        assert!(scene.editable(source).is_some_and(EditableText::is_dragging));
        assert!(scene.pointer_move(Point::new(20.0, 105.0)));
        assert_eq!(scene.editable(target).and_then(EditableText::drop_preview), Some(2));
        scene.pointer_up(Point::new(20.0, 105.0));
        assert_eq!(scene.object(source).map(|o| o.text().text().to_string()), Some("llo".to_string()));
        assert_eq!(scene.object(target).map(|o| o.text().text().to_string()), Some("abhe".to_string()));
        assert_eq!(scene.editing_id(), Some(target));
        let e = scene.editable(target);
        assert_eq!(e.map(|e| (e.selection_start(), e.selection_end())), Some((2, 4)));
    }

    #[test]
    fn full_render_clears_both_layers() {
        let (scene, id) = scene_with("hi");
        let mut scene = scene.borrow_mut();
        scene.enter_editing(id);
        let mut main = RecordingSurface::new();
        let mut top = RecordingSurface::new();
        scene.render_to(&mut main, &mut top, 0.0);
        assert_eq!(main.calls.first(), Some(&DrawCall::Clear));
        assert_eq!(main.texts(), vec!["hi"]);
        assert_eq!(top.calls.first(), Some(&DrawCall::Clear));
        assert_eq!(top.fill_rects().len(), 1);
    }

    fn stroke_styles(surface: &RecordingSurface) -> Vec<&str> {
        surface
            .calls
            .iter()
            .filter_map(|c| match c {
                DrawCall::StrokeStyle(color) => Some(color.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn editing_swaps_the_border_and_hides_controls() {
        let (scene, id) = scene_with("hi");
        let mut scene = scene.borrow_mut();
        scene.pointer_down(Point::new(5.0, 5.0), 0.0, Modifiers::NONE);
        assert_eq!(scene.active(), Some(id));

        let mut idle = RecordingSurface::new();
        scene.render_top_to(&mut idle, 0.0);
        assert_eq!(idle.stroke_rects().len(), 9);
        assert_eq!(stroke_styles(&idle)[0], Appearance::default().border_color);

        scene.enter_editing(id);
        let mut editing = RecordingSurface::new();
        scene.render_top_to(&mut editing, 0.0);
        assert_eq!(editing.stroke_rects().len(), 1);
        assert_eq!(stroke_styles(&editing)[0], EditingOptions::default().editing_border_color);

        scene.exit_editing();
        let mut after = RecordingSurface::new();
        scene.render_top_to(&mut after, 0.0);
        assert_eq!(after.stroke_rects().len(), 9);
        assert_eq!(stroke_styles(&after)[0], Appearance::default().border_color);
    }

    #[test]
    fn hover_cursor_follows_the_appearance() {
        let (scene, id) = scene_with("hi");
        let mut scene = scene.borrow_mut();
        assert_eq!(scene.cursor_at(Point::new(5.0, 5.0)), "move");
        assert_eq!(scene.cursor_at(Point::new(500.0, 5.0)), "default");
        scene.enter_editing(id);
        assert_eq!(scene.cursor_at(Point::new(5.0, 5.0)), "text");
    }

    #[test]
    fn unselectable_objects_ignore_clicks() {
        let (scene, id) = scene_with("hi");
        let mut scene = scene.borrow_mut();
        if let Some(text) = scene.object_mut(id).map(SceneObject::text_mut) {
            text.appearance.apply(AppearanceChange::Selectable(false));
        }
        scene.pointer_down(Point::new(5.0, 5.0), 0.0, Modifiers::NONE);
        assert_eq!(scene.active(), None);
    }
}
