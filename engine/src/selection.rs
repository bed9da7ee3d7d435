use kurbo::Point;

use crate::editing::EditableText;
use crate::events;
use crate::layout::CursorLocation;
use crate::types::{Direction, SelectionDirection};

/// Caret position relative to the layout origin.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorOffsets {
    pub left: f64,
    pub top: f64,
}

/// Layout origin in center-origin object coordinates plus the caret offsets
/// from it. The caret sits at `(left + left_offset, top + top_offset)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorBoundaries {
    pub left: f64,
    pub top: f64,
    pub left_offset: f64,
    pub top_offset: f64,
}

impl EditableText {
    pub fn selection_start(&self) -> usize {
        self.selection_start
    }

    pub fn selection_end(&self) -> usize {
        self.selection_end
    }

    pub fn selection_direction(&self) -> SelectionDirection {
        self.selection_direction
    }

    /// Clamps into `[0, len]`; the end moves along when passed.
    pub fn set_selection_start(&mut self, index: isize) {
        let index = index.clamp(0, self.text.len() as isize) as usize;
        if index != self.selection_start {
            self.fire(events::SELECTION_CHANGED);
            self.selection_start = index;
            self.selection_end = self.selection_end.max(index);
            self.restart_blink();
        }
        self.sync_native_input();
    }

    /// Clamps into `[0, len]`; the start moves along when passed.
    pub fn set_selection_end(&mut self, index: isize) {
        let index = index.clamp(0, self.text.len() as isize) as usize;
        if index != self.selection_end {
            self.fire(events::SELECTION_CHANGED);
            self.selection_end = index;
            self.selection_start = self.selection_start.min(index);
            self.restart_blink();
        }
        self.sync_native_input();
    }

    pub fn set_selection_range(&mut self, start: usize, end: usize) {
        let len = self.text.len();
        let start = start.min(len);
        let end = end.clamp(start, len);
        if (start, end) != (self.selection_start, self.selection_end) {
            self.selection_start = start;
            self.selection_end = end;
            self.fire(events::SELECTION_CHANGED);
            self.restart_blink();
        }
        self.sync_native_input();
    }

    pub fn get_2d_cursor_location(&self, index: usize) -> CursorLocation {
        self.text.layout().cursor_location(index)
    }

    pub fn invalidate_cursor_cache(&self) {
        self.boundary_cache.set(None);
    }

    /// Caret boundaries for `position`. The last non-fresh result is reused
    /// until the layout changes or a repaint clears it; `fresh` bypasses the
    /// cache entirely.
    pub fn cursor_boundaries(&self, position: usize, fresh: bool) -> CursorBoundaries {
        let offsets = if fresh {
            self.cursor_offsets(position)
        } else {
            let revision = self.text.revision();
            match self.boundary_cache.get() {
                Some((rev, pos, offsets)) if rev == revision && pos == position => offsets,
                _ => {
                    let offsets = self.cursor_offsets(position);
                    self.boundary_cache.set(Some((revision, position, offsets)));
                    offsets
                }
            }
        };
        CursorBoundaries {
            left: self.text.left_offset(),
            top: self.text.top_offset(),
            left_offset: offsets.left,
            top_offset: offsets.top,
        }
    }

    fn cursor_offsets(&self, position: usize) -> CursorOffsets {
        let layout = self.text.layout();
        let location = layout.cursor_location(position);
        let Some(line) = layout.lines.get(location.line_index) else {
            return CursorOffsets { left: 0.0, top: 0.0 };
        };
        let line_left = layout.line_left_offset(location.line_index);
        let mut left = line.bounds.get(location.char_index).map_or(0.0, |b| b.left);
        if layout.char_spacing_width != 0.0 && location.char_index == line.len() {
            left -= layout.char_spacing_width;
        }
        let left = left.max(0.0);
        CursorOffsets {
            left: match layout.direction {
                Direction::Ltr => line_left + left,
                Direction::Rtl => line_left - left,
            },
            top: layout.line_top(location.line_index),
        }
    }

    /// Nearest grapheme boundary to a scene point.
    pub fn selection_start_from_pointer(&self, scene: Point) -> usize {
        let p = self.text.to_box(scene);
        let layout = self.text.layout();
        let line_index = layout.line_at(p.y);
        let Some(line) = layout.lines.get(line_index) else { return 0 };
        let column = layout.column_at(line_index, layout.advance_at(line_index, p.x));
        (line.start + column).min(self.text.len())
    }

    pub(crate) fn is_pointer_over_selection(&self, index: usize) -> bool {
        self.options.drag_enabled
            && self.selection_start < self.selection_end
            && index >= self.selection_start
            && index <= self.selection_end
    }

    fn is_space(&self, index: usize) -> bool {
        match self.text.buffer().grapheme(index) {
            Some(g) => g.chars().all(|c| self.options.word_separators.contains(c)),
            None => false,
        }
    }

    /// Edge of the word around `start`, searching backwards or forwards. A
    /// separator at `start` belongs to no word, so a backward search from it
    /// lands at the start of the preceding word.
    pub fn search_word_boundary(&self, start: usize, forward: bool) -> usize {
        let len = self.text.len();
        let mut index = start.min(len);
        if forward {
            while index < len && !self.is_space(index) {
                index += 1;
            }
        } else {
            while index > 0 && !self.is_space(index - 1) {
                index -= 1;
            }
        }
        index
    }

    pub fn find_word_boundary_left(&self, from: usize) -> usize {
        let mut index = from.min(self.text.len());
        while index > 0 && self.is_space(index - 1) {
            index -= 1;
        }
        while index > 0 && !self.is_space(index - 1) {
            index -= 1;
        }
        index
    }

    pub fn find_word_boundary_right(&self, from: usize) -> usize {
        let len = self.text.len();
        let mut index = from.min(len);
        while index < len && self.is_space(index) {
            index += 1;
        }
        while index < len && !self.is_space(index) {
            index += 1;
        }
        index
    }

    /// Start of the visual line holding `from`.
    pub fn find_line_boundary_left(&self, from: usize) -> usize {
        self.text.layout().line_range(from).start
    }

    pub fn find_line_boundary_right(&self, from: usize) -> usize {
        self.text.layout().line_range(from).end
    }

    pub fn select_word(&mut self, index: usize) {
        let start = self.search_word_boundary(index, false);
        let end = self.search_word_boundary(index, true);
        self.set_selection_range(start, end);
    }

    pub fn select_line(&mut self, index: usize) {
        let range = self.text.layout().line_range(index);
        self.set_selection_range(range.start, range.end);
    }

    pub fn select_all(&mut self) {
        self.selection_direction = SelectionDirection::None;
        self.set_selection_range(0, self.text.len());
    }

    /// Move the free end of `[start, end)` to `target`, flipping which end is
    /// free when the target crosses the fixed one.
    pub(crate) fn set_selection_with_shift(&mut self, start: usize, end: usize, target: usize) {
        let target = target.min(self.text.len());
        if target <= start {
            if end == start {
                self.selection_direction = SelectionDirection::Left;
            } else if self.selection_direction == SelectionDirection::Right {
                self.selection_direction = SelectionDirection::Left;
                self.selection_end = start;
            }
            self.selection_start = target;
        } else if target < end {
            if self.selection_direction == SelectionDirection::Right {
                self.selection_end = target;
            } else {
                self.selection_start = target;
            }
        } else {
            if end == start {
                self.selection_direction = SelectionDirection::Right;
            } else if self.selection_direction == SelectionDirection::Left {
                self.selection_direction = SelectionDirection::Right;
                self.selection_start = end;
            }
            self.selection_end = target;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MonospaceMeasurer;
    use crate::objects::TextObject;
    use crate::types::{EditingOptions, TextProps};

    fn editor_with(text: &str, props: TextProps) -> EditableText {
        let object = TextObject::new(1, text, props, Box::new(MonospaceMeasurer { advance: 0.5 }));
        EditableText::new(object, EditingOptions::default())
    }

    fn editor(text: &str) -> EditableText {
        editor_with(text, TextProps { font_size: 20.0, line_height: 1.0, ..Default::default() })
    }

    fn count(e: &mut EditableText, name: &str) -> usize {
        e.drain_events().iter().filter(|ev| ev.name == name).count()
    }

    #[test]
    fn setters_clamp_and_fire_once() {
        let mut e = editor("hello");
        e.set_selection_start(-5);
        assert_eq!(e.selection_start(), 0);
        assert_eq!(count(&mut e, events::SELECTION_CHANGED), 0);
        e.set_selection_end(105);
        assert_eq!(e.selection_end(), 5);
        e.set_selection_start(2);
        e.set_selection_start(2);
        assert_eq!(count(&mut e, events::SELECTION_CHANGED), 2);
        e.set_selection_end(1);
        assert_eq!((e.selection_start(), e.selection_end()), (1, 1));
    }

    #[test]
    fn word_boundaries_skip_separators() {
        let e = editor("hello big world");
        assert_eq!(e.find_word_boundary_left(15), 10);
        assert_eq!(e.find_word_boundary_left(10), 6);
        assert_eq!(e.find_word_boundary_right(5), 9);
        assert_eq!(e.find_word_boundary_right(0), 5);
        assert_eq!(e.search_word_boundary(7, false), 6);
        assert_eq!(e.search_word_boundary(7, true), 9);
    }

    #[test]
    fn double_click_on_separator_picks_preceding_word() {
        let mut e = editor("hello world");
        e.select_word(5);
        assert_eq!((e.selection_start(), e.selection_end()), (0, 5));
    }

    #[test]
    fn word_selection_reaches_both_ends_of_the_text() {
        let mut e = editor("hello world");
        e.select_word(0);
        assert_eq!((e.selection_start(), e.selection_end()), (0, 5));
        e.select_word(11);
        assert_eq!((e.selection_start(), e.selection_end()), (6, 11));
        e.select_word(100);
        assert_eq!((e.selection_start(), e.selection_end()), (6, 11));
    }

    #[test]
    fn boundaries_place_the_caret() {
        let e = editor("abcd");
        let b = e.cursor_boundaries(2, false);
        assert_eq!(b.left, -20.0);
        assert_eq!(b.left_offset, 20.0);
        assert_eq!(b.top_offset, 0.0);
        assert!((b.top + 11.3).abs() < 1e-9);
    }

    #[test]
    fn char_spacing_is_dropped_at_line_end() {
        let e = editor_with("abcd", TextProps { font_size: 20.0, line_height: 1.0, char_spacing: 100.0, ..Default::default() });
        assert_eq!(e.cursor_boundaries(4, true).left_offset, 46.0);
        assert_eq!(e.cursor_boundaries(1, true).left_offset, 12.0);
    }

    #[test]
    fn rtl_offsets_run_leftwards() {
        let e = editor_with("abcd", TextProps { font_size: 20.0, line_height: 1.0, direction: Direction::Rtl, ..Default::default() });
        let b = e.cursor_boundaries(1, true);
        assert_eq!(b.left, 20.0);
        assert_eq!(b.left_offset, -10.0);
    }

    #[test]
    fn cache_follows_layout_revision() {
        let mut e = editor("abcd");
        let before = e.cursor_boundaries(4, false);
        e.text.set_text("ab");
        let after = e.cursor_boundaries(4, false);
        assert_ne!(before, after);
        assert_eq!(after.left_offset, 20.0);
    }

    #[test]
    fn pointer_maps_to_nearest_boundary() {
        let mut e = editor("abcd\nefgh");
        e.text.transform.left = 100.0;
        e.text.transform.top = 50.0;
        assert_eq!(e.selection_start_from_pointer(Point::new(121.0, 55.0)), 2);
        assert_eq!(e.selection_start_from_pointer(Point::new(126.0, 55.0)), 3);
        assert_eq!(e.selection_start_from_pointer(Point::new(600.0, 80.0)), 9);
        assert_eq!(e.selection_start_from_pointer(Point::new(0.0, 0.0)), 0);
    }

    #[test]
    fn shift_extension_flips_direction() {
        let mut e = editor("abcdefgh");
        e.set_selection_range(3, 3);
        e.set_selection_with_shift(3, 3, 6);
        assert_eq!((e.selection_start(), e.selection_end()), (3, 6));
        assert_eq!(e.selection_direction(), SelectionDirection::Right);
        e.set_selection_with_shift(3, 6, 1);
        assert_eq!((e.selection_start(), e.selection_end()), (1, 3));
        assert_eq!(e.selection_direction(), SelectionDirection::Left);
    }

    #[test]
    fn line_selection_uses_visual_lines() {
        let mut e = editor_with("hello world", TextProps { font_size: 20.0, line_height: 1.0, wrap_width: Some(60.0), ..Default::default() });
        e.select_line(8);
        assert_eq!((e.selection_start(), e.selection_end()), (6, 11));
        assert_eq!(e.find_line_boundary_left(3), 0);
        assert_eq!(e.find_line_boundary_right(3), 5);
    }
}
