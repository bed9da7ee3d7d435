use crate::editing::EditableText;
use crate::events;
use crate::types::{Direction, Modifiers, SelectionDirection};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Home,
    End,
    PageUp,
    PageDown,
    Backspace,
    Delete,
    Enter,
    Tab,
    Escape,
    Character(String),
}

impl Key {
    /// Parse a DOM `KeyboardEvent.key` value.
    pub fn from_dom(key: &str) -> Key {
        match key {
            "ArrowLeft" | "Left" => Key::ArrowLeft,
            "ArrowRight" | "Right" => Key::ArrowRight,
            "ArrowUp" | "Up" => Key::ArrowUp,
            "ArrowDown" | "Down" => Key::ArrowDown,
            "Home" => Key::Home,
            "End" => Key::End,
            "PageUp" => Key::PageUp,
            "PageDown" => Key::PageDown,
            "Backspace" => Key::Backspace,
            "Delete" | "Del" => Key::Delete,
            "Enter" => Key::Enter,
            "Tab" => Key::Tab,
            "Escape" | "Esc" => Key::Escape,
            other => Key::Character(other.to_string()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Not ours; let the native input have it.
    Ignored,
    Handled,
    /// Tab/Escape: the owner should end the editing session.
    ExitEditing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl EditableText {
    pub fn on_key_down(&mut self, key: &Key, modifiers: Modifiers) -> KeyOutcome {
        if !self.is_editing() {
            return KeyOutcome::Ignored;
        }
        if self.is_composing() {
            return match key {
                Key::Tab | Key::Escape => {
                    self.cancel_composition();
                    KeyOutcome::ExitEditing
                }
                _ => KeyOutcome::Ignored,
            };
        }
        let rtl = self.text.props().direction == Direction::Rtl;
        match key {
            Key::Tab | Key::Escape => KeyOutcome::ExitEditing,
            Key::ArrowLeft => {
                self.move_cursor(if rtl { Side::Right } else { Side::Left }, modifiers, false);
                KeyOutcome::Handled
            }
            Key::ArrowRight => {
                self.move_cursor(if rtl { Side::Left } else { Side::Right }, modifiers, false);
                KeyOutcome::Handled
            }
            Key::Home => {
                self.move_cursor(Side::Left, modifiers, true);
                KeyOutcome::Handled
            }
            Key::End => {
                self.move_cursor(Side::Right, modifiers, true);
                KeyOutcome::Handled
            }
            Key::ArrowUp => {
                self.move_vertical(false, modifiers, false);
                KeyOutcome::Handled
            }
            Key::ArrowDown => {
                self.move_vertical(true, modifiers, false);
                KeyOutcome::Handled
            }
            Key::PageUp => {
                self.move_vertical(false, modifiers, true);
                KeyOutcome::Handled
            }
            Key::PageDown => {
                self.move_vertical(true, modifiers, true);
                KeyOutcome::Handled
            }
            Key::Backspace => {
                self.delete_backward(modifiers);
                KeyOutcome::Handled
            }
            Key::Delete => {
                self.delete_forward(modifiers);
                KeyOutcome::Handled
            }
            Key::Enter => {
                self.insert_text("\n");
                KeyOutcome::Handled
            }
            Key::Character(c) if modifiers.primary() && c.eq_ignore_ascii_case("a") => {
                self.select_all();
                KeyOutcome::Handled
            }
            Key::Character(_) => KeyOutcome::Ignored,
        }
    }

    fn step(&self, from: usize, side: Side, modifiers: Modifiers, to_line: bool) -> usize {
        let len = self.text.len();
        match side {
            Side::Left if modifiers.alt => self.find_word_boundary_left(from),
            Side::Left if modifiers.primary() || to_line => self.find_line_boundary_left(from),
            Side::Left => from.saturating_sub(1),
            Side::Right if modifiers.alt => self.find_word_boundary_right(from),
            Side::Right if modifiers.primary() || to_line => self.find_line_boundary_right(from),
            Side::Right => (from + 1).min(len),
        }
    }

    fn move_cursor(&mut self, side: Side, modifiers: Modifiers, to_line: bool) {
        let (start, end) = (self.selection_start, self.selection_end);
        let len = self.text.len();
        match (side, modifiers.shift) {
            (Side::Left, true) => {
                if start == end {
                    self.selection_direction = SelectionDirection::Left;
                }
                if self.selection_direction == SelectionDirection::Right && start != end {
                    self.selection_end = self.step(end, side, modifiers, to_line).max(start);
                } else if start != 0 {
                    self.selection_direction = SelectionDirection::Left;
                    self.selection_start = self.step(start, side, modifiers, to_line);
                }
            }
            (Side::Left, false) => {
                self.selection_direction = SelectionDirection::Left;
                if start == end && start != 0 {
                    self.selection_start = self.step(start, side, modifiers, to_line);
                }
                self.selection_end = self.selection_start;
            }
            (Side::Right, true) => {
                if start == end {
                    self.selection_direction = SelectionDirection::Right;
                }
                if self.selection_direction == SelectionDirection::Left && start != end {
                    self.selection_start = self.step(start, side, modifiers, to_line).min(end);
                } else if end != len {
                    self.selection_direction = SelectionDirection::Right;
                    self.selection_end = self.step(end, side, modifiers, to_line);
                }
            }
            (Side::Right, false) => {
                self.selection_direction = SelectionDirection::Right;
                if start == end {
                    self.selection_start = self.step(start, side, modifiers, to_line);
                    self.selection_end = self.selection_start;
                } else {
                    self.selection_start = end;
                }
            }
        }
        self.after_caret_move((start, end));
    }

    /// Index reached by moving one visual line up or down from `from`,
    /// keeping the horizontal position.
    fn vertical_target(&self, from: usize, down: bool) -> usize {
        let layout = self.text.layout();
        let location = layout.cursor_location(from);
        let last_line = layout.lines.len().saturating_sub(1);
        if down && location.line_index >= last_line {
            return self.text.len();
        }
        if !down && location.line_index == 0 {
            return 0;
        }
        let line = &layout.lines[location.line_index];
        let advance = line.bounds.get(location.char_index).map_or(0.0, |b| b.left);
        let x = layout.visual_x(location.line_index, advance);
        let target = if down { location.line_index + 1 } else { location.line_index - 1 };
        let column = layout.column_at(target, layout.advance_at(target, x));
        layout.index_of(crate::layout::CursorLocation { line_index: target, char_index: column })
    }

    fn move_vertical(&mut self, down: bool, modifiers: Modifiers, page: bool) {
        let (start, end) = (self.selection_start, self.selection_end);
        let moving_end = self.selection_direction == SelectionDirection::Right;
        let from = if moving_end { end } else { start };
        let target = if page || modifiers.primary() {
            if down { self.text.len() } else { 0 }
        } else {
            self.vertical_target(from, down)
        };
        if modifiers.shift {
            self.set_selection_with_shift(start, end, target);
        } else {
            self.selection_start = target;
            self.selection_end = target;
        }
        self.after_caret_move((start, end));
    }

    fn after_caret_move(&mut self, before: (usize, usize)) {
        self.restart_blink();
        if (self.selection_start, self.selection_end) != before {
            self.fire(events::SELECTION_CHANGED);
            self.sync_native_input();
        }
    }

    fn delete_backward(&mut self, modifiers: Modifiers) {
        let (start, end) = (self.selection_start, self.selection_end);
        if start != end {
            self.remove_chars(start, end);
        } else if modifiers.alt {
            self.remove_chars(self.find_word_boundary_left(start), start);
        } else if modifiers.primary() {
            self.remove_chars(self.find_line_boundary_left(start), start);
        } else if start > 0 {
            self.remove_chars(start - 1, start);
        }
    }

    fn delete_forward(&mut self, modifiers: Modifiers) {
        let (start, end) = (self.selection_start, self.selection_end);
        if start != end {
            self.remove_chars(start, end);
        } else if modifiers.alt {
            self.remove_chars(start, self.find_word_boundary_right(start));
        } else if modifiers.primary() {
            self.remove_chars(start, self.find_line_boundary_right(start));
        } else {
            self.remove_chars(start, (start + 1).min(self.text.len()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MonospaceMeasurer;
    use crate::objects::TextObject;
    use crate::types::{EditingOptions, TextProps};

    fn editing(text: &str) -> EditableText {
        let props = TextProps { font_size: 20.0, line_height: 1.0, ..Default::default() };
        let object = TextObject::new(1, text, props, Box::new(MonospaceMeasurer { advance: 0.5 }));
        let mut e = EditableText::new(object, EditingOptions::default());
        e.enter_editing(None);
        e
    }

    fn press(e: &mut EditableText, key: Key, modifiers: Modifiers) -> KeyOutcome {
        e.on_key_down(&key, modifiers)
    }

    fn sel(e: &EditableText) -> (usize, usize) {
        (e.selection_start(), e.selection_end())
    }

    #[test]
    fn dom_keys_parse() {
        assert_eq!(Key::from_dom("ArrowLeft"), Key::ArrowLeft);
        assert_eq!(Key::from_dom("Esc"), Key::Escape);
        assert_eq!(Key::from_dom("x"), Key::Character("x".into()));
    }

    #[test]
    fn arrows_move_and_collapse() {
        let mut e = editing("hello");
        e.set_selection_range(2, 2);
        press(&mut e, Key::ArrowRight, Modifiers::NONE);
        assert_eq!(sel(&e), (3, 3));
        press(&mut e, Key::ArrowLeft, Modifiers::SHIFT);
        press(&mut e, Key::ArrowLeft, Modifiers::SHIFT);
        assert_eq!(sel(&e), (1, 3));
        press(&mut e, Key::ArrowRight, Modifiers::NONE);
        assert_eq!(sel(&e), (3, 3));
        press(&mut e, Key::ArrowLeft, Modifiers::NONE);
        press(&mut e, Key::ArrowLeft, Modifiers::NONE);
        press(&mut e, Key::ArrowLeft, Modifiers::NONE);
        press(&mut e, Key::ArrowLeft, Modifiers::NONE);
        assert_eq!(sel(&e), (0, 0));
    }

    #[test]
    fn shift_reverses_over_the_anchor() {
        let mut e = editing("hello");
        e.set_selection_range(2, 2);
        press(&mut e, Key::ArrowRight, Modifiers::SHIFT);
        assert_eq!(sel(&e), (2, 3));
        press(&mut e, Key::ArrowLeft, Modifiers::SHIFT);
        assert_eq!(sel(&e), (2, 2));
        press(&mut e, Key::ArrowLeft, Modifiers::SHIFT);
        assert_eq!(sel(&e), (1, 2));
    }

    #[test]
    fn alt_moves_by_word_and_meta_by_line() {
        let mut e = editing("one two three");
        e.set_selection_range(13, 13);
        press(&mut e, Key::ArrowLeft, Modifiers::ALT);
        assert_eq!(sel(&e), (8, 8));
        press(&mut e, Key::ArrowLeft, Modifiers::META);
        assert_eq!(sel(&e), (0, 0));
        press(&mut e, Key::End, Modifiers::SHIFT);
        assert_eq!(sel(&e), (0, 13));
    }

    #[test]
    fn vertical_moves_keep_column() {
        let mut e = editing("abcd\nef\nghij");
        e.set_selection_range(3, 3);
        press(&mut e, Key::ArrowDown, Modifiers::NONE);
        assert_eq!(sel(&e), (7, 7));
        press(&mut e, Key::ArrowDown, Modifiers::NONE);
        assert_eq!(sel(&e), (10, 10));
        press(&mut e, Key::ArrowDown, Modifiers::NONE);
        assert_eq!(sel(&e), (12, 12));
        press(&mut e, Key::ArrowUp, Modifiers { shift: true, meta: true, ..Modifiers::NONE });
        assert_eq!(sel(&e), (0, 12));
    }

    #[test]
    fn deletion_variants() {
        let mut e = editing("one two\nthree");
        e.set_selection_range(7, 7);
        press(&mut e, Key::Backspace, Modifiers::ALT);
        assert_eq!(e.text.text(), "one \nthree");
        press(&mut e, Key::Backspace, Modifiers::META);
        assert_eq!(e.text.text(), "\nthree");
        press(&mut e, Key::Delete, Modifiers::NONE);
        assert_eq!(e.text.text(), "three");
        e.set_selection_range(1, 3);
        press(&mut e, Key::Backspace, Modifiers::NONE);
        assert_eq!(e.text.text(), "tee");
        assert_eq!(sel(&e), (1, 1));
    }

    #[test]
    fn escape_asks_to_exit_and_cancels_composition() {
        let mut e = editing("ab");
        e.set_selection_range(2, 2);
        e.composition_update("zz");
        assert_eq!(press(&mut e, Key::Escape, Modifiers::NONE), KeyOutcome::ExitEditing);
        assert_eq!(e.text.text(), "ab");
        assert_eq!(press(&mut e, Key::Character("c".into()), Modifiers::NONE), KeyOutcome::Ignored);
    }

    #[test]
    fn select_all_and_enter() {
        let mut e = editing("ab");
        assert_eq!(press(&mut e, Key::Character("a".into()), Modifiers::META), KeyOutcome::Handled);
        assert_eq!(sel(&e), (0, 2));
        press(&mut e, Key::Enter, Modifiers::NONE);
        assert_eq!(e.text.text(), "\n");
        assert_eq!(e.text.layout().lines.len(), 2);
    }
}
