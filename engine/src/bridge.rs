//! The hidden native input that receives keyboard, IME and clipboard events
//! for the object being edited. The text object stays the source of truth;
//! the input only mirrors its value and selection.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{CompositionEvent, Document, Element, Event, HtmlTextAreaElement, KeyboardEvent};

use crate::error::TextError;
use crate::keys::Key;
use crate::types::{Modifiers, ObjectId};

pub trait NativeInput {
    fn focus(&mut self);
    fn blur(&mut self);
    fn value(&self) -> String;
    fn set_value(&mut self, value: &str);
    /// Selection in UTF-16 code units.
    fn set_selection(&mut self, start: usize, end: usize);
    /// Move the input next to the caret (screen pixels) so IME popups line up.
    fn set_position(&mut self, x: f64, y: f64, font_size: f64);
    /// Remove the input from the document for good.
    fn detach(&mut self);
}

/// Events coming out of the native input, already translated from the DOM.
#[derive(Clone, Debug, PartialEq)]
pub enum NativeEvent {
    KeyDown { key: Key, modifiers: Modifiers },
    Input { value: String, selection_start: usize, selection_end: usize, from_paste: bool },
    CompositionStart,
    CompositionUpdate(String),
    CompositionEnd(Option<String>),
    Copy,
    Cut,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NativeOutcome {
    Ignored,
    /// The default browser action must be suppressed.
    Handled,
}

/// Receiver of native input events, usually the engine behind a weak handle.
pub trait InputSink {
    fn deliver(&self, target: ObjectId, event: NativeEvent) -> NativeOutcome;
}

pub type InputFactory = Box<dyn FnMut(ObjectId) -> Option<Box<dyn NativeInput>>>;

/// One native input per object, created on first edit and reused after.
#[derive(Default)]
pub struct InputPool {
    factory: Option<InputFactory>,
    idle: HashMap<ObjectId, Box<dyn NativeInput>>,
}

impl InputPool {
    pub fn new(factory: InputFactory) -> Self {
        InputPool { factory: Some(factory), idle: HashMap::new() }
    }

    pub fn set_factory(&mut self, factory: InputFactory) {
        self.factory = Some(factory);
    }

    pub fn acquire(&mut self, owner: ObjectId) -> Option<Box<dyn NativeInput>> {
        if let Some(input) = self.idle.remove(&owner) {
            return Some(input);
        }
        let factory = self.factory.as_mut()?;
        factory(owner)
    }

    pub fn release(&mut self, owner: ObjectId, input: Box<dyn NativeInput>) {
        self.idle.insert(owner, input);
    }

    /// Drop the owner's input, e.g. when the object leaves the canvas.
    pub fn discard(&mut self, owner: ObjectId) {
        if let Some(mut input) = self.idle.remove(&owner) {
            input.detach();
        }
    }

    pub fn idle_count(&self) -> usize {
        self.idle.len()
    }
}

#[derive(Debug, Default)]
struct FakeState {
    value: String,
    selection: (usize, usize),
    focused: bool,
    position: Option<(f64, f64, f64)>,
    detached: bool,
}

/// In-memory native input for headless use. Clones share state.
#[derive(Clone, Debug, Default)]
pub struct FakeInput {
    state: Rc<RefCell<FakeState>>,
}

impl FakeInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> String {
        self.state.borrow().value.clone()
    }

    pub fn selection(&self) -> (usize, usize) {
        self.state.borrow().selection
    }

    pub fn is_focused(&self) -> bool {
        self.state.borrow().focused
    }

    pub fn position(&self) -> Option<(f64, f64, f64)> {
        self.state.borrow().position
    }

    pub fn is_detached(&self) -> bool {
        self.state.borrow().detached
    }
}

impl NativeInput for FakeInput {
    fn focus(&mut self) {
        self.state.borrow_mut().focused = true;
    }

    fn blur(&mut self) {
        self.state.borrow_mut().focused = false;
    }

    fn value(&self) -> String {
        FakeInput::value(self)
    }

    fn set_value(&mut self, value: &str) {
        self.state.borrow_mut().value = value.to_string();
    }

    fn set_selection(&mut self, start: usize, end: usize) {
        self.state.borrow_mut().selection = (start, end);
    }

    fn set_position(&mut self, x: f64, y: f64, font_size: f64) {
        self.state.borrow_mut().position = Some((x, y, font_size));
    }

    fn detach(&mut self) {
        let mut state = self.state.borrow_mut();
        state.focused = false;
        state.detached = true;
    }
}

type DomListener = Closure<dyn FnMut(Event)>;

/// A `<textarea>` kept out of sight inside the canvas container.
pub struct HiddenTextarea {
    element: HtmlTextAreaElement,
    listeners: Vec<(&'static str, DomListener)>,
}

impl HiddenTextarea {
    pub fn create(document: &Document, container: Option<&Element>, owner: ObjectId, sink: Rc<dyn InputSink>) -> Result<HiddenTextarea, TextError> {
        let element: HtmlTextAreaElement = document
            .create_element("textarea")
            .map_err(js_error)?
            .dyn_into()
            .map_err(|_| TextError::NativeInput("created element is not a textarea".to_string()))?;
        for (name, value) in [
            ("autocapitalize", "off"),
            ("autocorrect", "off"),
            ("autocomplete", "off"),
            ("spellcheck", "false"),
            ("data-role", "text-input"),
            ("wrap", "off"),
        ] {
            element.set_attribute(name, value).map_err(js_error)?;
        }
        let style = element.style();
        for (name, value) in [
            ("position", "absolute"),
            ("top", "0px"),
            ("left", "0px"),
            ("z-index", "-999"),
            ("opacity", "0"),
            ("width", "1px"),
            ("height", "1px"),
            ("padding-top", "0px"),
        ] {
            style.set_property(name, value).map_err(js_error)?;
        }
        let parent: Element = match container {
            Some(container) => container.clone(),
            None => document
                .body()
                .map(Element::from)
                .ok_or_else(|| TextError::NativeInput("document has no body".to_string()))?,
        };
        parent.append_child(&element).map_err(js_error)?;

        let mut textarea = HiddenTextarea { element, listeners: Vec::new() };
        textarea.listen(owner, sink)?;
        log::debug!("text {}: hidden textarea attached", owner);
        Ok(textarea)
    }

    fn listen(&mut self, owner: ObjectId, sink: Rc<dyn InputSink>) -> Result<(), TextError> {
        let pasting = Rc::new(Cell::new(false));

        let keydown = {
            let sink = sink.clone();
            Closure::<dyn FnMut(Event)>::new(move |event: Event| {
                let Some(event) = event.dyn_ref::<KeyboardEvent>() else { return };
                let modifiers = Modifiers {
                    shift: event.shift_key(),
                    alt: event.alt_key(),
                    ctrl: event.ctrl_key(),
                    meta: event.meta_key(),
                };
                let key = Key::from_dom(&event.key());
                if sink.deliver(owner, NativeEvent::KeyDown { key, modifiers }) == NativeOutcome::Handled {
                    event.prevent_default();
                    event.stop_propagation();
                }
            })
        };
        let input = {
            let sink = sink.clone();
            let element = self.element.clone();
            let pasting = pasting.clone();
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                let start = element.selection_start().ok().flatten().unwrap_or(0) as usize;
                let end = element.selection_end().ok().flatten().unwrap_or(0) as usize;
                sink.deliver(owner, NativeEvent::Input {
                    value: element.value(),
                    selection_start: start,
                    selection_end: end,
                    from_paste: pasting.replace(false),
                });
            })
        };
        let paste = {
            let pasting = pasting.clone();
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| pasting.set(true))
        };
        let composition_start = {
            let sink = sink.clone();
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                sink.deliver(owner, NativeEvent::CompositionStart);
            })
        };
        let composition_update = {
            let sink = sink.clone();
            Closure::<dyn FnMut(Event)>::new(move |event: Event| {
                let data = event.dyn_ref::<CompositionEvent>().and_then(|e| e.data()).unwrap_or_default();
                sink.deliver(owner, NativeEvent::CompositionUpdate(data));
            })
        };
        let composition_end = {
            let sink = sink.clone();
            Closure::<dyn FnMut(Event)>::new(move |event: Event| {
                let data = event.dyn_ref::<CompositionEvent>().and_then(|e| e.data());
                sink.deliver(owner, NativeEvent::CompositionEnd(data));
            })
        };
        let copy = {
            let sink = sink.clone();
            Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
                sink.deliver(owner, NativeEvent::Copy);
            })
        };
        let cut = Closure::<dyn FnMut(Event)>::new(move |_event: Event| {
            sink.deliver(owner, NativeEvent::Cut);
        });

        for (name, listener) in [
            ("keydown", keydown),
            ("input", input),
            ("paste", paste),
            ("compositionstart", composition_start),
            ("compositionupdate", composition_update),
            ("compositionend", composition_end),
            ("copy", copy),
            ("cut", cut),
        ] {
            self.element
                .add_event_listener_with_callback(name, listener.as_ref().unchecked_ref())
                .map_err(js_error)?;
            self.listeners.push((name, listener));
        }
        Ok(())
    }
}

impl NativeInput for HiddenTextarea {
    fn focus(&mut self) {
        if let Err(err) = self.element.focus() {
            log::warn!("textarea focus failed: {:?}", err);
        }
    }

    fn blur(&mut self) {
        if let Err(err) = self.element.blur() {
            log::warn!("textarea blur failed: {:?}", err);
        }
    }

    fn value(&self) -> String {
        self.element.value()
    }

    fn set_value(&mut self, value: &str) {
        self.element.set_value(value);
    }

    fn set_selection(&mut self, start: usize, end: usize) {
        if let Err(err) = self.element.set_selection_range(start as u32, end as u32) {
            log::warn!("textarea selection failed: {:?}", err);
        }
    }

    fn set_position(&mut self, x: f64, y: f64, font_size: f64) {
        let style = self.element.style();
        for (name, value) in [
            ("left", format!("{}px", x)),
            ("top", format!("{}px", y)),
            ("font-size", format!("{}px", font_size)),
        ] {
            if let Err(err) = style.set_property(name, &value) {
                log::warn!("textarea style {} failed: {:?}", name, err);
            }
        }
    }

    fn detach(&mut self) {
        for (name, listener) in self.listeners.drain(..) {
            let _ = self.element.remove_event_listener_with_callback(name, listener.as_ref().unchecked_ref());
        }
        self.element.remove();
    }
}

impl Drop for HiddenTextarea {
    fn drop(&mut self) {
        if !self.listeners.is_empty() {
            self.detach();
        }
    }
}

fn js_error(err: JsValue) -> TextError {
    TextError::NativeInput(format!("{:?}", err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_reuses_an_owners_input() {
        let created = Rc::new(Cell::new(0));
        let counter = created.clone();
        let mut pool = InputPool::new(Box::new(move |_owner| {
            counter.set(counter.get() + 1);
            Some(Box::new(FakeInput::new()) as Box<dyn NativeInput>)
        }));
        let first = pool.acquire(1);
        assert!(first.is_some());
        if let Some(input) = first {
            pool.release(1, input);
        }
        assert!(pool.acquire(1).is_some());
        assert_eq!(created.get(), 1);
        assert!(pool.acquire(2).is_some());
        assert_eq!(created.get(), 2);
    }

    #[test]
    fn discard_detaches() {
        let fake = FakeInput::new();
        let mut pool = InputPool::default();
        pool.release(3, Box::new(fake.clone()));
        assert_eq!(pool.idle_count(), 1);
        pool.discard(3);
        assert!(fake.is_detached());
        assert_eq!(pool.idle_count(), 0);
        assert!(pool.acquire(3).is_none());
    }
}
