//! The editable capability layered on top of a [`TextObject`].
//!
//! Editing state only exists between `enter_editing` and `exit_editing`.
//! Pointer, keyboard, clipboard and composition input all end up in the
//! mutation paths here; selection bookkeeping lives in `selection.rs`, key
//! bindings in `keys.rs` and text drag-and-drop in `drag.rs`.

use std::cell::Cell;
use std::ops::Range;

use kurbo::{Affine, Point};
use serde::{Serialize, Deserialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::blink::CursorBlink;
use crate::bridge::NativeInput;
use crate::buffer::{grapheme_count, normalize_newlines, utf16_to_grapheme};
use crate::events::{self, Emitter, TextEvent};
use crate::objects::{InsertStyle, TextObject};
use crate::selection::CursorOffsets;
use crate::style::CharStyle;
use crate::types::{Appearance, AppearanceChange, EditingOptions, Modifiers, ObjectId, SelectionDirection};

pub const MULTI_CLICK_MS: f64 = 500.0;
pub const MULTI_CLICK_DISTANCE: f64 = 5.0;

/// Text and styles captured by copy/cut, offered back on paste.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ClipboardPayload {
    pub text: String,
    pub styles: Vec<CharStyle>,
}

/// In-progress IME text, already spliced into the buffer at `start..end`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Composition {
    pub start: usize,
    pub end: usize,
}

/// Selection captured when a text drag starts.
#[derive(Clone, Debug, PartialEq)]
pub struct DragState {
    pub start: usize,
    pub end: usize,
    pub payload: ClipboardPayload,
}

pub(crate) struct EditingSession {
    pub(crate) saved: Appearance,
    pub(crate) bridge: Option<Box<dyn NativeInput>>,
    pub(crate) composition: Option<Composition>,
    pub(crate) drag: Option<DragState>,
    pub(crate) mouse_down: bool,
    pub(crate) anchor: usize,
    pub(crate) blink: CursorBlink,
    pub(crate) text_before: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerRelease {
    Released,
    /// The pointer let go of a text drag outside this object.
    DraggedOut,
}

#[derive(Default)]
struct ClickTracker {
    last_time: Option<f64>,
    last_point: Point,
    count: u32,
}

impl ClickTracker {
    fn register(&mut self, point: Point, now: f64) -> u32 {
        let repeat = match self.last_time {
            Some(last) => now - last < MULTI_CLICK_MS && (point - self.last_point).hypot() <= MULTI_CLICK_DISTANCE,
            None => false,
        };
        self.count = if repeat { (self.count + 1).min(3) } else { 1 };
        self.last_time = Some(now);
        self.last_point = point;
        self.count
    }
}

pub struct EditableText {
    pub text: TextObject,
    pub options: EditingOptions,
    pub(crate) selection_start: usize,
    pub(crate) selection_end: usize,
    pub(crate) selection_direction: SelectionDirection,
    pub(crate) session: Option<EditingSession>,
    pub(crate) events: Emitter,
    pub(crate) boundary_cache: Cell<Option<(u64, usize, CursorOffsets)>>,
    pub(crate) drop_preview: Option<usize>,
    clicks: ClickTracker,
    pub(crate) view: Affine,
}

impl EditableText {
    pub fn new(text: TextObject, options: EditingOptions) -> Self {
        EditableText {
            text,
            options,
            selection_start: 0,
            selection_end: 0,
            selection_direction: SelectionDirection::None,
            session: None,
            events: Emitter::new(),
            boundary_cache: Cell::new(None),
            drop_preview: None,
            clicks: ClickTracker::default(),
            view: Affine::IDENTITY,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.text.id
    }

    pub fn is_editing(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_composing(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.composition.is_some())
    }

    pub fn composition(&self) -> Option<Composition> {
        self.session.as_ref().and_then(|s| s.composition)
    }

    pub fn is_dragging(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.drag.is_some())
    }

    pub fn is_mouse_down(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.mouse_down)
    }

    pub fn on(&mut self, name: &str, listener: impl FnMut(&TextEvent) + 'static) {
        self.events.on(name, listener);
    }

    pub fn drain_events(&mut self) -> Vec<TextEvent> {
        self.events.drain()
    }

    pub(crate) fn fire(&mut self, name: &str) {
        let id = self.id();
        self.events.fire(name, id);
    }

    /// Scene to screen transform, used to place the native input.
    pub fn set_view(&mut self, view: Affine) {
        self.view = view;
    }

    pub fn can_enter_editing(&self) -> bool {
        !self.is_editing() && self.options.editable
    }

    pub fn enter_editing(&mut self, bridge: Option<Box<dyn NativeInput>>) -> bool {
        if !self.can_enter_editing() {
            return false;
        }
        let saved = std::mem::replace(&mut self.text.appearance, Appearance::for_editing(&self.options));
        self.session = Some(EditingSession {
            saved,
            bridge,
            composition: None,
            drag: None,
            mouse_down: false,
            anchor: self.selection_start,
            blink: CursorBlink::new(self.options.cursor_delay, self.options.cursor_duration),
            text_before: self.text.text().to_string(),
        });
        if let Some(bridge) = self.session.as_mut().and_then(|s| s.bridge.as_mut()) {
            bridge.focus();
        }
        self.sync_native_input();
        log::debug!("text {}: editing entered", self.id());
        self.fire(events::EDITING_ENTERED);
        self.fire(events::SELECTION_CHANGED);
        true
    }

    /// Leave editing, restoring the appearance captured on entry. Hands the
    /// native input back so the caller can return it to its pool.
    pub fn exit_editing(&mut self) -> Option<Box<dyn NativeInput>> {
        if self.is_composing() {
            self.cancel_composition();
        }
        let session = self.session.take()?;
        self.text.appearance = session.saved;
        self.selection_end = self.selection_start;
        self.selection_direction = SelectionDirection::None;
        self.drop_preview = None;
        let mut bridge = session.bridge;
        if let Some(input) = bridge.as_mut() {
            input.blur();
        }
        log::debug!("text {}: editing exited", self.id());
        self.fire(events::EDITING_EXITED);
        if session.text_before != self.text.text() {
            self.fire(events::MODIFIED);
        }
        bridge
    }

    /// Appearance writes land in the saved snapshot while editing, so they
    /// take effect on exit instead of fighting the editing look.
    pub fn set_appearance(&mut self, change: AppearanceChange) {
        match self.session.as_mut() {
            Some(session) => session.saved.apply(change),
            None => self.text.appearance.apply(change),
        }
    }

    pub fn saved_appearance(&self) -> Option<&Appearance> {
        self.session.as_ref().map(|s| &s.saved)
    }

    pub(crate) fn restart_blink(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.blink.restart();
        }
    }

    /// Push value, selection and caret position to the native input.
    pub(crate) fn sync_native_input(&mut self) {
        if self.session.as_ref().map_or(true, |s| s.bridge.is_none() || s.composition.is_some()) {
            return;
        }
        let buffer = self.text.buffer();
        let start = buffer.to_utf16(self.selection_start);
        let end = buffer.to_utf16(self.selection_end);
        let value = self.text.text().to_string();
        let (caret, font_size) = self.caret_screen_position();
        if let Some(bridge) = self.session.as_mut().and_then(|s| s.bridge.as_mut()) {
            if bridge.value() != value {
                bridge.set_value(&value);
            }
            bridge.set_selection(start, end);
            bridge.set_position(caret.x, caret.y, font_size);
        }
    }

    fn caret_screen_position(&self) -> (Point, f64) {
        let b = self.cursor_boundaries(self.selection_start, false);
        let local = Point::new(b.left + b.left_offset, b.top + b.top_offset);
        let scene = self.text.matrix() * local;
        let font_size = self.text.resolved_style_at(self.selection_start.saturating_sub(1)).font_size;
        (self.view * scene, font_size * self.text.transform.scale_y * self.view.as_coeffs()[3])
    }

    // ---- pointer ----

    pub fn mouse_down(&mut self, point: Point, now: f64, modifiers: Modifiers) {
        if !self.is_editing() {
            return;
        }
        if self.is_composing() {
            self.commit_composition(None);
        }
        let clicks = self.clicks.register(point, now);
        let index = self.selection_start_from_pointer(point);
        if let Some(session) = self.session.as_mut() {
            session.mouse_down = true;
        }
        if clicks == 1 && !modifiers.shift && self.is_pointer_over_selection(index) {
            self.begin_drag();
            return;
        }
        match clicks {
            2 => self.select_word(index),
            3 => self.select_line(index),
            _ => self.set_cursor_by_click(index, modifiers.shift),
        }
        let anchor = self.selection_start;
        if let Some(session) = self.session.as_mut() {
            session.anchor = anchor;
            session.blink.restart();
        }
    }

    /// Extend the selection from the anchor to the pointer while the button
    /// is held. Returns whether anything visible changed.
    pub fn mouse_move(&mut self, point: Point) -> bool {
        let Some(session) = self.session.as_ref() else { return false };
        if !session.mouse_down {
            return false;
        }
        let anchor = session.anchor;
        if session.drag.is_some() {
            return self.drag_over(point).is_some();
        }
        let index = self.selection_start_from_pointer(point);
        let (start, end) = (self.selection_start, self.selection_end);
        if (index != anchor || start == end) && (start == index || end == index) {
            return false;
        }
        let (new_start, new_end) = if index > anchor { (anchor, index) } else { (index, anchor) };
        if (new_start, new_end) == (start, end) {
            return false;
        }
        self.selection_start = new_start;
        self.selection_end = new_end;
        self.selection_direction = if index > anchor { SelectionDirection::Right } else { SelectionDirection::Left };
        self.fire(events::SELECTION_CHANGED);
        self.sync_native_input();
        true
    }

    pub fn mouse_up(&mut self, point: Point) -> PointerRelease {
        let Some(session) = self.session.as_mut() else { return PointerRelease::Released };
        session.mouse_down = false;
        if session.drag.is_none() {
            session.blink.restart();
            return PointerRelease::Released;
        }
        if self.text.contains(point) {
            self.drop_within(point);
            PointerRelease::Released
        } else {
            self.drop_preview = None;
            PointerRelease::DraggedOut
        }
    }

    pub(crate) fn set_cursor_by_click(&mut self, index: usize, shift: bool) {
        let (start, end) = (self.selection_start, self.selection_end);
        if shift {
            self.set_selection_with_shift(start, end, index);
        } else {
            self.selection_start = index;
            self.selection_end = index;
        }
        self.fire(events::SELECTION_CHANGED);
        self.sync_native_input();
    }

    // ---- content ----

    /// Central mutation path: replace `range`, move the caret after the
    /// inserted text and notify.
    pub(crate) fn replace_range(&mut self, range: Range<usize>, insert: &str, styles: InsertStyle) -> Range<usize> {
        let inserted = self.text.splice(range, insert, styles);
        self.selection_start = inserted.end;
        self.selection_end = inserted.end;
        self.fire(events::CHANGED);
        self.restart_blink();
        self.sync_native_input();
        inserted
    }

    /// Replace the selection with `text`, as if typed.
    pub fn insert_text(&mut self, text: &str) {
        let range = self.selection_start..self.selection_end;
        self.replace_range(range, text, InsertStyle::Inherit);
    }

    pub fn remove_chars(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        self.replace_range(start..end, "", InsertStyle::Inherit);
    }

    pub fn selected_text(&self) -> &str {
        self.text.buffer().slice(self.selection_start..self.selection_end)
    }

    /// Reconcile the buffer with the native input's new value. The edit is
    /// located from the input's caret: everything after it is untouched, and
    /// the change cannot begin after the old selection start.
    pub fn on_input(&mut self, value: &str, selection_start: usize, selection_end: usize, from_paste: bool, clipboard: Option<&ClipboardPayload>) -> bool {
        if !self.is_editing() || self.is_composing() {
            return false;
        }
        let next = normalize_newlines(value);
        let len = self.text.len();
        if next.is_empty() {
            if len == 0 {
                return false;
            }
            self.replace_range(0..len, "", InsertStyle::Inherit);
            return true;
        }
        let next_graphemes: Vec<&str> = next.graphemes(true).collect();
        let next_len = next_graphemes.len();
        let caret_start = utf16_to_grapheme(&next, selection_start).min(next_len);
        let caret_end = utf16_to_grapheme(&next, selection_end).clamp(caret_start, next_len);

        let suffix = (next_len - caret_end).min(len);
        let old_end = len - suffix;
        let common = self
            .text
            .buffer()
            .graphemes()
            .zip(next_graphemes.iter())
            .take_while(|(a, b)| a == *b)
            .count();
        let prefix = common.min(self.selection_start).min(caret_end).min(old_end);
        let removed = prefix..old_end;
        let inserted: String = next_graphemes[prefix..caret_end].concat();
        if removed.is_empty() && inserted.is_empty() {
            self.set_selection_range(caret_start, caret_end);
            return false;
        }

        let styles = match clipboard {
            Some(payload) if from_paste && payload.text == inserted => InsertStyle::Explicit(payload.styles.clone()),
            _ if !removed.is_empty() && !inserted.is_empty() => {
                let first = self.text.style_at(removed.start);
                InsertStyle::Explicit(vec![first; grapheme_count(&inserted)])
            }
            _ => InsertStyle::Inherit,
        };
        self.text.splice(removed, &inserted, styles);
        self.selection_start = caret_start.min(self.text.len());
        self.selection_end = caret_end.min(self.text.len());
        self.fire(events::CHANGED);
        self.restart_blink();
        self.sync_native_input();
        true
    }

    // ---- clipboard ----

    pub fn copy(&self) -> Option<ClipboardPayload> {
        if self.selection_start == self.selection_end {
            return None;
        }
        Some(ClipboardPayload {
            text: self.selected_text().to_string(),
            styles: self.text.styles_in(self.selection_start, self.selection_end),
        })
    }

    pub fn cut(&mut self) -> Option<ClipboardPayload> {
        let payload = self.copy()?;
        self.remove_chars(self.selection_start, self.selection_end);
        Some(payload)
    }

    /// Insert pasted text; when it matches what was last copied, the copied
    /// styles come along.
    pub fn paste(&mut self, text: &str, clipboard: Option<&ClipboardPayload>) {
        if !self.is_editing() || text.is_empty() {
            return;
        }
        let text = normalize_newlines(text);
        let styles = match clipboard {
            Some(payload) if payload.text == text => InsertStyle::Explicit(payload.styles.clone()),
            _ => InsertStyle::Inherit,
        };
        let range = self.selection_start..self.selection_end;
        self.replace_range(range, &text, styles);
    }

    // ---- styles ----

    /// Styles of `[start, end)`, defaulting to the current selection.
    pub fn get_selection_styles(&self, start: Option<usize>, end: Option<usize>) -> Vec<CharStyle> {
        let start = start.unwrap_or(self.selection_start);
        let end = end.unwrap_or(self.selection_end);
        self.text.styles_in(start, end)
    }

    pub fn set_selection_styles(&mut self, style: &CharStyle, start: Option<usize>, end: Option<usize>) {
        let start = start.unwrap_or(self.selection_start);
        let end = end.unwrap_or(self.selection_end);
        self.text.apply_style(style, start, end);
        self.sync_native_input();
    }

    // ---- composition ----

    pub fn composition_start(&mut self) {
        if !self.is_editing() || self.is_composing() {
            return;
        }
        if self.selection_start != self.selection_end {
            let range = self.selection_start..self.selection_end;
            self.text.splice(range, "", InsertStyle::Inherit);
            self.selection_end = self.selection_start;
            self.fire(events::CHANGED);
        }
        let at = self.selection_start;
        if let Some(session) = self.session.as_mut() {
            session.composition = Some(Composition { start: at, end: at });
        }
        log::debug!("text {}: composition started at {}", self.id(), at);
    }

    /// Show the IME's current preedit text in place of the previous one.
    pub fn composition_update(&mut self, data: &str) {
        if !self.is_editing() {
            return;
        }
        if !self.is_composing() {
            self.composition_start();
        }
        let Some(composition) = self.composition() else { return };
        let inserted = self.text.splice(composition.start..composition.end, data, InsertStyle::Inherit);
        if let Some(session) = self.session.as_mut() {
            session.composition = Some(Composition { start: inserted.start, end: inserted.end });
            session.blink.restart();
        }
        self.selection_start = inserted.end;
        self.selection_end = inserted.end;
    }

    /// Keep the preedit text (replaced by `data` when the IME reports a
    /// final string) and leave composition mode.
    pub fn commit_composition(&mut self, data: Option<&str>) {
        let Some(composition) = self.composition() else { return };
        let mut end = composition.end;
        if let Some(data) = data {
            if self.text.buffer().slice(composition.start..composition.end) != data {
                end = self.text.splice(composition.start..composition.end, data, InsertStyle::Inherit).end;
            }
        }
        if let Some(session) = self.session.as_mut() {
            session.composition = None;
        }
        self.selection_start = end;
        self.selection_end = end;
        log::debug!("text {}: composition committed", self.id());
        if end > composition.start || data.is_some() {
            self.fire(events::CHANGED);
        }
        self.sync_native_input();
    }

    /// Drop the preedit text and leave composition mode.
    pub fn cancel_composition(&mut self) {
        let Some(composition) = self.composition() else { return };
        self.text.splice(composition.start..composition.end, "", InsertStyle::Inherit);
        if let Some(session) = self.session.as_mut() {
            session.composition = None;
        }
        self.selection_start = composition.start;
        self.selection_end = composition.start;
        log::debug!("text {}: composition cancelled", self.id());
        self.sync_native_input();
    }
}
