use kurbo::{Affine, Rect};
use web_sys::CanvasRenderingContext2d;

use crate::editing::EditableText;
use crate::layout::FONT_SIZE_FRACTION;
use crate::objects::TextObject;
use crate::style::ResolvedStyle;
use crate::types::Direction;

const UNDERLINE_OFFSET: f64 = 0.10;
const LINETHROUGH_OFFSET: f64 = -0.315;
const OVERLINE_OFFSET: f64 = -0.88;
const DRAG_SOURCE_ALPHA: f64 = 0.5;
const HANDLE_SIZE: f64 = 8.0;

/// The slice of the 2D context API the text renderer needs.
pub trait DrawSurface {
    fn save(&mut self);
    fn restore(&mut self);
    fn set_transform(&mut self, m: Affine);
    /// Wipe the whole surface.
    fn clear(&mut self);
    fn set_global_alpha(&mut self, alpha: f64);
    fn set_fill_style(&mut self, color: &str);
    fn set_stroke_style(&mut self, color: &str);
    fn set_line_width(&mut self, width: f64);
    fn set_font(&mut self, font: &str);
    fn fill_rect(&mut self, rect: Rect);
    fn stroke_rect(&mut self, rect: Rect);
    fn fill_text(&mut self, text: &str, x: f64, y: f64);
    fn stroke_text(&mut self, text: &str, x: f64, y: f64);
}

impl DrawSurface for CanvasRenderingContext2d {
    fn save(&mut self) {
        CanvasRenderingContext2d::save(self);
    }

    fn restore(&mut self) {
        CanvasRenderingContext2d::restore(self);
    }

    fn set_transform(&mut self, m: Affine) {
        let [a, b, c, d, e, f] = m.as_coeffs();
        let _ = CanvasRenderingContext2d::set_transform(self, a, b, c, d, e, f);
    }

    fn clear(&mut self) {
        let _ = CanvasRenderingContext2d::set_transform(self, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0);
        if let Some(canvas) = self.canvas() {
            self.clear_rect(0.0, 0.0, canvas.width() as f64, canvas.height() as f64);
        }
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        CanvasRenderingContext2d::set_global_alpha(self, alpha);
    }

    fn set_fill_style(&mut self, color: &str) {
        self.set_fill_style_str(color);
    }

    fn set_stroke_style(&mut self, color: &str) {
        self.set_stroke_style_str(color);
    }

    fn set_line_width(&mut self, width: f64) {
        CanvasRenderingContext2d::set_line_width(self, width);
    }

    fn set_font(&mut self, font: &str) {
        CanvasRenderingContext2d::set_font(self, font);
    }

    fn fill_rect(&mut self, rect: Rect) {
        CanvasRenderingContext2d::fill_rect(self, rect.x0, rect.y0, rect.width(), rect.height());
    }

    fn stroke_rect(&mut self, rect: Rect) {
        CanvasRenderingContext2d::stroke_rect(self, rect.x0, rect.y0, rect.width(), rect.height());
    }

    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        let _ = CanvasRenderingContext2d::fill_text(self, text, x, y);
    }

    fn stroke_text(&mut self, text: &str, x: f64, y: f64) {
        let _ = CanvasRenderingContext2d::stroke_text(self, text, x, y);
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DrawCall {
    Save,
    Restore,
    SetTransform(Affine),
    Clear,
    GlobalAlpha(f64),
    FillStyle(String),
    StrokeStyle(String),
    LineWidth(f64),
    Font(String),
    FillRect(Rect),
    StrokeRect(Rect),
    FillText { text: String, x: f64, y: f64 },
    StrokeText { text: String, x: f64, y: f64 },
}

/// Surface that only records what was drawn.
#[derive(Clone, Debug, Default)]
pub struct RecordingSurface {
    pub calls: Vec<DrawCall>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fill_rects(&self) -> Vec<Rect> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DrawCall::FillRect(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn stroke_rects(&self) -> Vec<Rect> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DrawCall::StrokeRect(r) => Some(*r),
                _ => None,
            })
            .collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                DrawCall::FillText { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl DrawSurface for RecordingSurface {
    fn save(&mut self) {
        self.calls.push(DrawCall::Save);
    }
    fn restore(&mut self) {
        self.calls.push(DrawCall::Restore);
    }
    fn set_transform(&mut self, m: Affine) {
        self.calls.push(DrawCall::SetTransform(m));
    }
    fn clear(&mut self) {
        self.calls.push(DrawCall::Clear);
    }
    fn set_global_alpha(&mut self, alpha: f64) {
        self.calls.push(DrawCall::GlobalAlpha(alpha));
    }
    fn set_fill_style(&mut self, color: &str) {
        self.calls.push(DrawCall::FillStyle(color.to_string()));
    }
    fn set_stroke_style(&mut self, color: &str) {
        self.calls.push(DrawCall::StrokeStyle(color.to_string()));
    }
    fn set_line_width(&mut self, width: f64) {
        self.calls.push(DrawCall::LineWidth(width));
    }
    fn set_font(&mut self, font: &str) {
        self.calls.push(DrawCall::Font(font.to_string()));
    }
    fn fill_rect(&mut self, rect: Rect) {
        self.calls.push(DrawCall::FillRect(rect));
    }
    fn stroke_rect(&mut self, rect: Rect) {
        self.calls.push(DrawCall::StrokeRect(rect));
    }
    fn fill_text(&mut self, text: &str, x: f64, y: f64) {
        self.calls.push(DrawCall::FillText { text: text.to_string(), x, y });
    }
    fn stroke_text(&mut self, text: &str, x: f64, y: f64) {
        self.calls.push(DrawCall::StrokeText { text: text.to_string(), x, y });
    }
}

impl TextObject {
    /// Outline of the active object in its border color, with resize handles
    /// when it shows controls. Line widths stay constant on screen.
    pub fn render_border(&self, surface: &mut dyn DrawSurface, view: Affine, zoom: f64) {
        if !self.visible {
            return;
        }
        let (w, h) = (self.width() / 2.0, self.height() / 2.0);
        let scale = (zoom * self.transform.scale_x).abs().max(f64::EPSILON);
        surface.save();
        surface.set_transform(view * self.matrix());
        surface.set_stroke_style(&self.appearance.border_color);
        surface.set_line_width(1.0 / scale);
        surface.stroke_rect(Rect::new(-w, -h, w, h));
        if self.appearance.has_controls {
            let size = HANDLE_SIZE / scale;
            surface.set_fill_style("#ffffff");
            let handles = [(-w, -h), (w, -h), (-w, h), (w, h), (0.0, -h), (0.0, h), (-w, 0.0), (w, 0.0)];
            for (x, y) in handles {
                let handle = Rect::from_center_size((x, y), (size, size));
                surface.fill_rect(handle);
                surface.stroke_rect(handle);
            }
        }
        surface.restore();
    }

    /// Paint the text in object-local coordinates under `view * matrix`.
    pub fn render(&self, surface: &mut dyn DrawSurface, view: Affine) {
        if !self.visible || self.opacity <= 0.0 {
            return;
        }
        surface.save();
        surface.set_transform(view * self.matrix());
        surface.set_global_alpha(self.opacity);
        let layout = self.layout();
        let half_width = self.width() / 2.0;
        let per_grapheme = layout.char_spacing_width != 0.0 || layout.direction == Direction::Rtl;
        let mut line_top = self.top_offset();
        for (i, line) in layout.lines.iter().enumerate() {
            let origin = layout.line_origin(i) - half_width;
            let baseline = line_top + line.height / layout.line_height * (1.0 - FONT_SIZE_FRACTION);
            let runs = self.line_runs(i);
            for (columns, style) in &runs {
                if let Some(color) = &style.text_background_color {
                    let span = self.run_span(i, columns.clone(), origin);
                    surface.set_fill_style(color);
                    surface.fill_rect(Rect::new(span.0, line_top, span.1, line_top + line.height / layout.line_height));
                }
            }
            for (columns, style) in &runs {
                surface.set_font(&style.font_declaration(style.font_size));
                surface.set_fill_style(&style.fill);
                if let Some(stroke) = &style.stroke {
                    surface.set_stroke_style(stroke);
                    surface.set_line_width(1.0);
                }
                let y = baseline + style.delta_y;
                if per_grapheme || line.justified {
                    for column in columns.clone() {
                        let Some(grapheme) = self.buffer().grapheme(line.start + column) else { continue };
                        let b = &line.bounds[column];
                        let x = match layout.direction {
                            Direction::Ltr => origin + b.left,
                            Direction::Rtl => origin - b.left - (b.width - layout.char_spacing_width),
                        };
                        draw_text(surface, grapheme, x, y, style);
                    }
                } else {
                    let text = self.buffer().slice(line.start + columns.start..line.start + columns.end);
                    draw_text(surface, text, origin + line.bounds[columns.start].left, y, style);
                }
                let (x0, x1) = self.run_span(i, columns.clone(), origin);
                let thickness = style.font_size / 15.0;
                for (on, offset) in [
                    (style.underline, UNDERLINE_OFFSET),
                    (style.linethrough, LINETHROUGH_OFFSET),
                    (style.overline, OVERLINE_OFFSET),
                ] {
                    if on {
                        let top = y + offset * style.font_size;
                        surface.fill_rect(Rect::new(x0, top, x1, top + thickness));
                    }
                }
            }
            line_top += line.height;
        }
        surface.restore();
    }

    /// Horizontal extent of a run of columns on a line, in local coordinates.
    fn run_span(&self, line_index: usize, columns: std::ops::Range<usize>, origin: f64) -> (f64, f64) {
        let layout = self.layout();
        let line = &layout.lines[line_index];
        let start = line.bounds[columns.start].left;
        let last = &line.bounds[columns.end - 1];
        let end = last.left + last.width;
        match layout.direction {
            Direction::Ltr => (origin + start, origin + end),
            Direction::Rtl => (origin - end, origin - start),
        }
    }
}

fn draw_text(surface: &mut dyn DrawSurface, text: &str, x: f64, y: f64, style: &ResolvedStyle) {
    surface.fill_text(text, x, y);
    if style.stroke.is_some() {
        surface.stroke_text(text, x, y);
    }
}

impl EditableText {
    /// Caret rectangle in object-local coordinates and its color.
    pub fn caret_rect(&self, position: usize, fresh: bool, zoom: f64) -> (Rect, String) {
        let b = self.cursor_boundaries(position, fresh);
        let layout = self.text.layout();
        let location = layout.cursor_location(position);
        let line = &layout.lines[location.line_index];
        let char_index = location.char_index.saturating_sub(1);
        let style = self.text.resolved_style_at(line.start + char_index);
        let char_height = style.font_size;
        let multiplier = (self.text.transform.scale_x * zoom).abs().max(f64::EPSILON);
        let width = self.options.cursor_width / multiplier;
        let top = b.top
            + b.top_offset
            + (1.0 - FONT_SIZE_FRACTION) * line.height / layout.line_height
            - char_height * (1.0 - FONT_SIZE_FRACTION)
            + style.delta_y;
        let left = b.left + b.left_offset - width / 2.0;
        let color = self.options.cursor_color.clone().unwrap_or(style.fill);
        (Rect::new(left, top, left + width, top + char_height), color)
    }

    /// Highlight rectangles for `[start, end)`, one per visual line, in
    /// object-local coordinates. With `composition` set, each rectangle is a
    /// one unit bar under the line instead.
    pub fn selection_rects(&self, start: usize, end: usize, composition: bool) -> Vec<Rect> {
        let layout = self.text.layout();
        let b = self.cursor_boundaries(start, true);
        let from = layout.cursor_location(start);
        let to = layout.cursor_location(end);
        let justify = layout.align.is_justify();
        let mut top = b.top + b.top_offset;
        // A range ending at a line start highlights nothing on that line.
        let last = if to.char_index == 0 && to.line_index > from.line_index { to.line_index - 1 } else { to.line_index };
        let mut rects = Vec::new();
        for i in from.line_index..=last {
            let Some(line) = layout.lines.get(i) else { break };
            let line_offset = layout.line_left_offset(i);
            let mut line_height = line.height;
            let box_start = if i == from.line_index { line.bounds[from.char_index].left } else { 0.0 };
            let box_end = if i < to.line_index {
                if justify && !layout.is_end_of_wrapping(i) {
                    layout.width
                } else if line.width > 0.0 {
                    line.width
                } else {
                    self.options.empty_line_selection_width.unwrap_or(line.space_width)
                }
            } else if to.char_index == 0 {
                line.bounds[0].left
            } else {
                let prev = &line.bounds[to.char_index - 1];
                prev.left + prev.width - layout.char_spacing_width
            };
            let real_height = line_height;
            if layout.line_height < 1.0 || (i == last && layout.line_height > 1.0) {
                line_height /= layout.line_height;
            }
            let width = box_end - box_start;
            let x = match layout.direction {
                Direction::Ltr => b.left + line_offset + box_start,
                Direction::Rtl => b.left + line_offset - box_end,
            };
            let (y, height) = if composition { (top + line_height, 1.0) } else { (top, line_height) };
            rects.push(Rect::new(x, y, x + width, y + height));
            top += real_height;
        }
        rects
    }

    /// Paint the caret or the selection on the top surface. Does nothing
    /// outside editing except for a pending drop preview.
    pub fn render_cursor_or_selection(&mut self, surface: &mut dyn DrawSurface, view: Affine, zoom: f64, now: f64) {
        if !self.is_editing() && self.drop_preview.is_none() {
            return;
        }
        surface.save();
        surface.set_transform(view * self.text.matrix());
        if let Some(drag) = self.drag_state() {
            let rects = self.selection_rects(drag.start, drag.end, false);
            surface.set_global_alpha(DRAG_SOURCE_ALPHA);
            surface.set_fill_style(&self.options.selection_color);
            for rect in rects {
                surface.fill_rect(rect);
            }
        } else if self.is_editing() {
            if let Some(composition) = self.composition() {
                surface.set_fill_style(&self.options.composition_color);
                for rect in self.selection_rects(composition.start, composition.end, true) {
                    surface.fill_rect(rect);
                }
                self.render_caret(surface, zoom, now);
            } else if self.selection_start == self.selection_end {
                self.render_caret(surface, zoom, now);
            } else {
                surface.set_fill_style(&self.options.selection_color);
                for rect in self.selection_rects(self.selection_start, self.selection_end, false) {
                    surface.fill_rect(rect);
                }
            }
        }
        if let Some(index) = self.drop_preview {
            let (rect, color) = self.caret_rect(index, true, zoom);
            surface.set_global_alpha(1.0);
            surface.set_fill_style(&color);
            surface.fill_rect(rect);
        }
        surface.restore();
    }

    fn render_caret(&mut self, surface: &mut dyn DrawSurface, zoom: f64, now: f64) {
        let opacity = match self.session.as_mut() {
            Some(session) if session.mouse_down => 1.0,
            Some(session) => session.blink.opacity(now),
            None => return,
        };
        let (rect, color) = self.caret_rect(self.selection_start, false, zoom);
        surface.set_fill_style(&color);
        surface.set_global_alpha(opacity);
        surface.fill_rect(rect);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MonospaceMeasurer;
    use crate::style::CharStyle;
    use crate::types::{EditingOptions, TextAlign, TextProps};

    fn object(text: &str, props: TextProps) -> TextObject {
        TextObject::new(1, text, props, Box::new(MonospaceMeasurer { advance: 0.5 }))
    }

    fn props() -> TextProps {
        TextProps { font_size: 20.0, line_height: 1.0, ..Default::default() }
    }

    #[test]
    fn plain_lines_draw_one_call_per_run() {
        let mut text = object("ab\ncd", props());
        let red = CharStyle { fill: Some("red".into()), ..Default::default() };
        text.apply_style(&red, 3, 4);
        let mut surface = RecordingSurface::new();
        text.render(&mut surface, Affine::IDENTITY);
        assert_eq!(surface.texts(), vec!["ab", "c", "d"]);
        assert!(surface.calls.contains(&DrawCall::FillStyle("red".into())));
        // First baseline sits at the line height times (1 - fraction) below the top.
        let first_y = surface.calls.iter().find_map(|c| match c {
            DrawCall::FillText { y, .. } => Some(*y),
            _ => None,
        });
        let expected = -text.height() / 2.0 + 20.0 * 1.13 * (1.0 - FONT_SIZE_FRACTION);
        assert!((first_y.unwrap_or(0.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn underline_draws_a_bar() {
        let mut text = object("ab", props());
        text.update_props(|p| p.underline = true);
        let mut surface = RecordingSurface::new();
        text.render(&mut surface, Affine::IDENTITY);
        let bars = surface.fill_rects();
        assert_eq!(bars.len(), 1);
        assert!((bars[0].width() - 20.0).abs() < 1e-9);
        assert!((bars[0].height() - 20.0 / 15.0).abs() < 1e-9);
    }

    #[test]
    fn caret_is_constant_device_width() {
        let mut editor = EditableText::new(object("abc", props()), EditingOptions::default());
        editor.text.transform.scale_x = 2.0;
        let (rect, color) = editor.caret_rect(1, true, 2.0);
        assert!((rect.width() - 0.5).abs() < 1e-9);
        assert!((rect.height() - 20.0).abs() < 1e-9);
        assert_eq!(color, TextProps::default().fill);
    }

    #[test]
    fn interior_justified_lines_span_the_box() {
        let p = TextProps { wrap_width: Some(60.0), text_align: TextAlign::Justify, ..props() };
        let editor = EditableText::new(object("ab c dd", p), EditingOptions::default());
        let layout = editor.text.layout();
        assert_eq!(layout.lines.len(), 2);
        let rects = editor.selection_rects(0, editor.text.len(), false);
        assert_eq!(rects.len(), 2);
        assert!((rects[0].width() - layout.width).abs() < 1e-9);
        assert!((rects[1].width() - layout.lines[1].width).abs() < 1e-9);
    }

    #[test]
    fn empty_line_uses_space_width() {
        let editor = EditableText::new(object("a\n\nb", props()), EditingOptions::default());
        let rects = editor.selection_rects(0, 4, false);
        assert_eq!(rects.len(), 3);
        assert!((rects[1].width() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn rtl_selection_is_mirrored() {
        let p = TextProps { direction: Direction::Rtl, ..props() };
        let editor = EditableText::new(object("abcd", p), EditingOptions::default());
        let rects = editor.selection_rects(0, 1, false);
        // The first grapheme sits at the right edge of the box.
        assert!((rects[0].x1 - 20.0).abs() < 1e-9);
        assert!((rects[0].x0 - 10.0).abs() < 1e-9);
    }

    #[test]
    fn nothing_drawn_outside_editing() {
        let mut editor = EditableText::new(object("abc", props()), EditingOptions::default());
        let mut surface = RecordingSurface::new();
        editor.render_cursor_or_selection(&mut surface, Affine::IDENTITY, 1.0, 0.0);
        assert!(surface.calls.is_empty());
    }

    #[test]
    fn caret_is_opaque_while_mouse_is_down() {
        let mut editor = EditableText::new(object("abc", props()), EditingOptions::default());
        editor.enter_editing(None);
        editor.mouse_down(kurbo::Point::new(0.0, 0.0), 0.0, crate::types::Modifiers::NONE);
        let mut surface = RecordingSurface::new();
        editor.render_cursor_or_selection(&mut surface, Affine::IDENTITY, 1.0, 50_000.0);
        assert!(surface.calls.contains(&DrawCall::GlobalAlpha(1.0)));
        assert_eq!(surface.fill_rects().len(), 1);
    }

    #[test]
    fn range_ending_at_a_line_start_skips_that_line() {
        let editor = EditableText::new(object("ab\ncd", props()), EditingOptions::default());
        let rects = editor.selection_rects(0, 3, false);
        assert_eq!(rects.len(), 1);
        assert!((rects[0].width() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn composition_underlines_the_preedit_text_under_the_caret() {
        let mut editor = EditableText::new(object("abc", props()), EditingOptions::default());
        editor.enter_editing(None);
        editor.set_selection_range(3, 3);
        editor.composition_start();
        editor.composition_update("xy");
        let mut surface = RecordingSurface::new();
        editor.render_cursor_or_selection(&mut surface, Affine::IDENTITY, 1.0, 0.0);
        let color = EditingOptions::default().composition_color;
        assert!(surface.calls.contains(&DrawCall::FillStyle(color)));
        let rects = surface.fill_rects();
        assert_eq!(rects.len(), 2);
        assert!((rects[0].height() - 1.0).abs() < 1e-9);
        assert!((rects[0].width() - 20.0).abs() < 1e-9);
        // The caret follows the preedit text.
        assert!((rects[1].height() - 20.0).abs() < 1e-9);
        assert!(rects[1].center().x > rects[0].x1 - 1.0);
    }

    #[test]
    fn dragged_text_is_dimmed_while_dragging() {
        let mut editor = EditableText::new(object("abcdef", props()), EditingOptions::default());
        editor.enter_editing(None);
        editor.set_selection_range(0, 2);
        editor.mouse_down(kurbo::Point::new(12.0, 10.0), 0.0, crate::types::Modifiers::NONE);
        assert!(editor.is_dragging());
        let mut surface = RecordingSurface::new();
        editor.render_cursor_or_selection(&mut surface, Affine::IDENTITY, 1.0, 0.0);
        assert!(surface.calls.contains(&DrawCall::GlobalAlpha(DRAG_SOURCE_ALPHA)));
        let color = EditingOptions::default().selection_color;
        assert!(surface.calls.contains(&DrawCall::FillStyle(color)));
        let rects = surface.fill_rects();
        assert_eq!(rects.len(), 1);
        assert!((rects[0].width() - 20.0).abs() < 1e-9);
    }
}
