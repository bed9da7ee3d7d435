use std::ops::Range;

use kurbo::{Affine, Point};

use crate::buffer::TextBuffer;
use crate::geometry::ObjectTransform;
use crate::layout::{layout_text, TextLayout, FONT_SIZE_FRACTION};
use crate::measure::TextMeasurer;
use crate::style::{CharStyle, ResolvedStyle, StyleMap, StyleProperty};
use crate::types::{Appearance, Direction, ObjectId, TextProps};

/// Styles for graphemes entering the buffer.
#[derive(Clone, Debug, PartialEq)]
pub enum InsertStyle {
    /// Copy the style of the grapheme before the insertion point (or after
    /// it, at the very start).
    Inherit,
    /// One record per inserted grapheme; missing entries inherit.
    Explicit(Vec<CharStyle>),
}

/// Renderable styled text: content, per-character styles, placement and the
/// layout derived from them.
pub struct TextObject {
    pub id: ObjectId,
    pub name: String,
    buffer: TextBuffer,
    styles: StyleMap,
    props: TextProps,
    pub transform: ObjectTransform,
    pub appearance: Appearance,
    pub opacity: f64,
    pub visible: bool,
    layout: TextLayout,
    measurer: Box<dyn TextMeasurer>,
    revision: u64,
}

impl TextObject {
    pub fn new(id: ObjectId, text: &str, props: TextProps, mut measurer: Box<dyn TextMeasurer>) -> Self {
        let buffer = TextBuffer::new(text);
        let styles = StyleMap::new();
        let layout = layout_text(&buffer, &styles, &props, measurer.as_mut());
        TextObject {
            id,
            name: format!("Text {}", id),
            buffer,
            styles,
            props,
            transform: ObjectTransform::default(),
            appearance: Appearance::default(),
            opacity: 1.0,
            visible: true,
            layout,
            measurer,
            revision: 0,
        }
    }

    pub fn text(&self) -> &str {
        self.buffer.as_str()
    }

    /// Length in graphemes.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn buffer(&self) -> &TextBuffer {
        &self.buffer
    }

    pub fn styles(&self) -> &StyleMap {
        &self.styles
    }

    pub fn props(&self) -> &TextProps {
        &self.props
    }

    pub fn layout(&self) -> &TextLayout {
        &self.layout
    }

    /// Bumped on every relayout; derived caches key on it.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn width(&self) -> f64 {
        self.layout.width
    }

    pub fn height(&self) -> f64 {
        self.layout.height
    }

    pub fn relayout(&mut self) {
        self.layout = layout_text(&self.buffer, &self.styles, &self.props, self.measurer.as_mut());
        self.revision += 1;
    }

    pub fn set_measurer(&mut self, measurer: Box<dyn TextMeasurer>) {
        self.measurer = measurer;
        self.relayout();
    }

    pub fn set_text(&mut self, text: &str) {
        self.buffer = TextBuffer::new(text);
        self.styles.truncate(self.buffer.len());
        self.relayout();
    }

    pub fn set_props(&mut self, props: TextProps) {
        self.props = props;
        self.relayout();
    }

    pub fn update_props(&mut self, update: impl FnOnce(&mut TextProps)) {
        update(&mut self.props);
        self.relayout();
    }

    pub fn replace_styles(&mut self, styles: StyleMap) {
        self.styles = styles;
        self.styles.truncate(self.buffer.len());
        self.relayout();
    }

    pub fn style_at(&self, index: usize) -> CharStyle {
        self.styles.style_at(index)
    }

    pub fn resolved_style_at(&self, index: usize) -> ResolvedStyle {
        match self.styles.get(index) {
            Some(style) if index < self.len() => style.resolve(&self.props),
            _ => CharStyle::default().resolve(&self.props),
        }
    }

    fn clamp_range(&self, start: usize, end: usize) -> Range<usize> {
        let len = self.len();
        let start = start.min(len);
        start..end.clamp(start, len)
    }

    /// Per-grapheme overrides over `[start, end)`.
    pub fn styles_in(&self, start: usize, end: usize) -> Vec<CharStyle> {
        self.styles.styles_in(self.clamp_range(start, end))
    }

    /// Merge `style` into `[start, end)`.
    pub fn apply_style(&mut self, style: &CharStyle, start: usize, end: usize) {
        let range = self.clamp_range(start, end);
        if range.is_empty() {
            return;
        }
        self.styles.merge_range(range, style);
        self.relayout();
    }

    pub fn remove_style(&mut self, property: StyleProperty) {
        self.styles.clear_property(property);
        self.relayout();
    }

    /// Replace `range` with `insert`, keeping the style map aligned with the
    /// buffer. Returns the range the inserted graphemes now occupy.
    pub fn splice(&mut self, range: Range<usize>, insert: &str, styles: InsertStyle) -> Range<usize> {
        let range = self.clamp_range(range.start, range.end);
        let inherited = if range.start > 0 {
            self.styles.style_at(range.start - 1)
        } else {
            self.styles.style_at(range.end)
        };
        self.styles.remove_range(range.clone());
        let count = self.buffer.splice(range.clone(), insert);
        self.styles.insert_gap(range.start, count);
        for k in 0..count {
            let style = match &styles {
                InsertStyle::Explicit(list) => list.get(k).cloned().unwrap_or_else(|| inherited.clone()),
                InsertStyle::Inherit => inherited.clone(),
            };
            self.styles.set(range.start + k, style);
        }
        self.relayout();
        range.start..range.start + count
    }

    pub fn matrix(&self) -> Affine {
        self.transform.matrix(self.width(), self.height())
    }

    /// Scene point in box coordinates (top-left origin, unscaled).
    pub fn to_box(&self, scene: Point) -> Point {
        self.transform.to_box(scene, self.width(), self.height())
    }

    pub fn contains(&self, scene: Point) -> bool {
        self.visible && self.transform.contains(scene, self.width(), self.height())
    }

    /// Left edge of the layout in center-origin coordinates.
    pub(crate) fn left_offset(&self) -> f64 {
        match self.props.direction {
            Direction::Ltr => -self.width() / 2.0,
            Direction::Rtl => self.width() / 2.0,
        }
    }

    pub(crate) fn top_offset(&self) -> f64 {
        -self.height() / 2.0
    }

    /// Consecutive graphemes of line `line_index` sharing one resolved style,
    /// as line-relative column ranges.
    pub(crate) fn line_runs(&self, line_index: usize) -> Vec<(Range<usize>, ResolvedStyle)> {
        let mut runs: Vec<(Range<usize>, ResolvedStyle)> = Vec::new();
        let Some(line) = self.layout.lines.get(line_index) else { return runs };
        for column in 0..line.len() {
            let style = self.resolved_style_at(line.start + column);
            match runs.last_mut() {
                Some((range, current)) if *current == style => range.end = column + 1,
                _ => runs.push((column..column + 1, style)),
            }
        }
        runs
    }

    pub fn to_svg_element(&self) -> String {
        let layout = &self.layout;
        let base = CharStyle::default().resolve(&self.props);
        let m = self.matrix().as_coeffs();
        let mut spans = String::new();
        let mut line_top = self.top_offset();
        for (i, line) in layout.lines.iter().enumerate() {
            let baseline = line_top + line.height / layout.line_height * (1.0 - FONT_SIZE_FRACTION);
            let origin = layout.line_origin(i) - self.width() / 2.0;
            let runs = self.line_runs(i);
            if runs.is_empty() {
                // keeps blank lines when the markup is read back
                spans.push_str(&format!(r##"<tspan x="{}" y="{}"></tspan>"##, origin, baseline));
            }
            for (columns, style) in runs {
                let first = &line.bounds[columns.start];
                let last = &line.bounds[columns.end - 1];
                let x = match layout.direction {
                    Direction::Ltr => origin + first.left,
                    Direction::Rtl => origin - last.left - last.width,
                };
                let text = self.buffer.slice(line.start + columns.start..line.start + columns.end);
                spans.push_str(&format!(
                    r##"<tspan x="{}" y="{}"{}>{}</tspan>"##,
                    x,
                    baseline + style.delta_y,
                    svg_style_attrs(&style, &base),
                    escape_xml(text)
                ));
            }
            line_top += line.height;
        }
        let mut attrs = vec![
            format!(r##"font-family="{}""##, escape_xml(&self.props.font_family)),
            format!(r##"font-size="{}""##, self.props.font_size),
            format!(r##"font-style="{}""##, self.props.font_style),
            format!(r##"font-weight="{}""##, self.props.font_weight),
            format!(r##"fill="{}""##, self.props.fill),
        ];
        if let Some(stroke) = &self.props.stroke {
            attrs.push(format!(r##"stroke="{}""##, stroke));
        }
        if self.props.direction == Direction::Rtl {
            attrs.push(r##"direction="rtl""##.to_string());
        }
        if self.opacity < 1.0 {
            attrs.push(format!(r##"opacity="{}""##, self.opacity));
        }
        format!(
            r##"<g transform="matrix({} {} {} {} {} {})"><text xml:space="preserve" {}>{}</text></g>"##,
            m[0], m[1], m[2], m[3], m[4], m[5],
            attrs.join(" "),
            spans
        )
    }
}

fn svg_style_attrs(style: &ResolvedStyle, base: &ResolvedStyle) -> String {
    let mut attrs = String::new();
    if style.font_family != base.font_family {
        attrs.push_str(&format!(r##" font-family="{}""##, escape_xml(&style.font_family)));
    }
    if style.font_size != base.font_size {
        attrs.push_str(&format!(r##" font-size="{}""##, style.font_size));
    }
    if style.font_weight != base.font_weight {
        attrs.push_str(&format!(r##" font-weight="{}""##, style.font_weight));
    }
    if style.font_style != base.font_style {
        attrs.push_str(&format!(r##" font-style="{}""##, style.font_style));
    }
    if style.fill != base.fill {
        attrs.push_str(&format!(r##" fill="{}""##, style.fill));
    }
    if style.stroke != base.stroke {
        if let Some(stroke) = &style.stroke {
            attrs.push_str(&format!(r##" stroke="{}""##, stroke));
        }
    }
    let mut decorations = Vec::new();
    if style.underline {
        decorations.push("underline");
    }
    if style.linethrough {
        decorations.push("line-through");
    }
    if style.overline {
        decorations.push("overline");
    }
    if !decorations.is_empty() {
        attrs.push_str(&format!(r##" text-decoration="{}""##, decorations.join(" ")));
    }
    attrs
}

pub(crate) fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measure::MonospaceMeasurer;

    fn object(text: &str) -> TextObject {
        let props = TextProps { font_size: 20.0, line_height: 1.0, ..Default::default() };
        TextObject::new(1, text, props, Box::new(MonospaceMeasurer { advance: 0.5 }))
    }

    fn red() -> CharStyle {
        CharStyle { fill: Some("red".to_string()), ..Default::default() }
    }

    #[test]
    fn typing_inherits_previous_style() {
        let mut obj = object("ab");
        obj.apply_style(&red(), 1, 2);
        let inserted = obj.splice(2..2, "cd", InsertStyle::Inherit);
        assert_eq!(inserted, 2..4);
        assert_eq!(obj.text(), "abcd");
        assert_eq!(obj.style_at(3), red());
        assert_eq!(obj.style_at(0), CharStyle::default());
    }

    #[test]
    fn splice_shifts_styles_after_the_edit() {
        let mut obj = object("abcdef");
        obj.apply_style(&red(), 4, 5);
        obj.splice(1..3, "", InsertStyle::Inherit);
        assert_eq!(obj.text(), "adef");
        assert_eq!(obj.style_at(2), red());
        assert_eq!(obj.styles().iter().count(), 1);
    }

    #[test]
    fn explicit_styles_land_on_inserted_graphemes() {
        let mut obj = object("xy");
        let bold = CharStyle { font_weight: Some("bold".to_string()), ..Default::default() };
        obj.splice(1..1, "ab", InsertStyle::Explicit(vec![bold.clone(), red()]));
        assert_eq!(obj.styles_in(0, 4), vec![CharStyle::default(), bold, red(), CharStyle::default()]);
    }

    #[test]
    fn every_relayout_bumps_revision() {
        let mut obj = object("a");
        let before = obj.revision();
        obj.set_text("abc");
        assert!(obj.revision() > before);
        assert_eq!(obj.width(), 30.0);
    }

    #[test]
    fn svg_export_escapes_and_splits_runs() {
        let mut obj = object("a<b");
        obj.apply_style(&red(), 2, 3);
        let svg = obj.to_svg_element();
        assert!(svg.contains("a&lt;</tspan>"));
        assert!(svg.contains(r#"fill="red">b</tspan>"#));
        assert_eq!(svg.matches("<tspan").count(), 2);
    }

    #[test]
    fn line_runs_group_equal_styles() {
        let mut obj = object("aabbcc");
        obj.apply_style(&red(), 2, 4);
        let runs: Vec<_> = obj.line_runs(0).into_iter().map(|(r, _)| r).collect();
        assert_eq!(runs, vec![0..2, 2..4, 4..6]);
    }
}
