use std::ops::Range;

use kurbo::Point;

use crate::editing::{ClipboardPayload, DragState, EditableText};
use crate::events;
use crate::objects::InsertStyle;

impl EditableText {
    /// Capture the selection as the dragged payload.
    pub(crate) fn begin_drag(&mut self) {
        let (start, end) = (self.selection_start, self.selection_end);
        let payload = ClipboardPayload {
            text: self.selected_text().to_string(),
            styles: self.text.styles_in(start, end),
        };
        if let Some(session) = self.session.as_mut() {
            session.drag = Some(DragState { start, end, payload });
            log::debug!("text {}: drag started over {}..{}", self.text.id, start, end);
        }
    }

    pub fn drag_state(&self) -> Option<&DragState> {
        self.session.as_ref().and_then(|s| s.drag.as_ref())
    }

    pub fn drop_preview(&self) -> Option<usize> {
        self.drop_preview
    }

    /// Track a drag hovering this object. Returns the drop index, or `None`
    /// over the dragged range itself.
    pub fn drag_over(&mut self, point: Point) -> Option<usize> {
        let index = self.selection_start_from_pointer(point);
        if let Some(drag) = self.drag_state() {
            if index >= drag.start && index <= drag.end {
                self.drop_preview = None;
                return None;
            }
        }
        self.drop_preview = Some(index);
        Some(index)
    }

    pub fn clear_drop_preview(&mut self) {
        self.drop_preview = None;
    }

    pub fn take_drag(&mut self) -> Option<DragState> {
        self.session.as_mut().and_then(|s| s.drag.take())
    }

    /// Move the dragged text to the pointer within this object. Dropping onto
    /// the dragged range just places the caret.
    pub(crate) fn drop_within(&mut self, point: Point) -> bool {
        let Some(drag) = self.take_drag() else { return false };
        self.drop_preview = None;
        let index = self.selection_start_from_pointer(point);
        if index >= drag.start && index <= drag.end {
            self.set_selection_range(index, index);
            return false;
        }
        let moved = drag.end - drag.start;
        self.text.splice(drag.start..drag.end, "", InsertStyle::Inherit);
        let at = if index > drag.end { index - moved } else { index };
        let inserted = self.text.splice(at..at, &drag.payload.text, InsertStyle::Explicit(drag.payload.styles));
        log::debug!("text {}: dropped {}..{} at {}", self.text.id, drag.start, drag.end, at);
        self.select_after_drop(inserted);
        true
    }

    /// Receive text dragged from another object.
    pub fn accept_drop(&mut self, index: usize, payload: &ClipboardPayload) -> Range<usize> {
        self.drop_preview = None;
        let inserted = self.text.splice(index..index, &payload.text, InsertStyle::Explicit(payload.styles.clone()));
        self.select_after_drop(inserted.clone());
        inserted
    }

    /// Remove text that was dropped into another object.
    pub fn remove_dragged(&mut self, drag: &DragState) {
        self.text.splice(drag.start..drag.end, "", InsertStyle::Inherit);
        self.selection_start = drag.start.min(self.text.len());
        self.selection_end = self.selection_start;
        self.fire(events::CHANGED);
        self.fire(events::SELECTION_CHANGED);
        self.sync_native_input();
    }

    fn select_after_drop(&mut self, inserted: Range<usize>) {
        self.selection_start = inserted.start;
        self.selection_end = inserted.end;
        self.fire(events::CHANGED);
        self.fire(events::SELECTION_CHANGED);
        self.restart_blink();
        self.sync_native_input();
    }
}
