//! Line breaking and per-character geometry.
//!
//! A layout is a pure function of the buffer, the style map, the object
//! defaults and a measurer. It is rebuilt whenever one of those changes and
//! read everywhere else; nothing here knows about editing state.

use std::ops::Range;

use crate::buffer::TextBuffer;
use crate::measure::{GlyphMetrics, TextMeasurer};
use crate::style::{CharStyle, ResolvedStyle, StyleMap};
use crate::types::{Direction, TextAlign, TextProps};

/// Line box height relative to the largest font size on the line.
pub const FONT_SIZE_MULT: f64 = 1.13;
/// Share of the font size below the baseline.
pub const FONT_SIZE_FRACTION: f64 = 0.222;
/// Width given to an unwrapped object whose text measures zero.
pub const MIN_TEXT_WIDTH: f64 = 2.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CharBound {
    /// Offset from the line's start.
    pub left: f64,
    pub width: f64,
    pub kerned_width: f64,
    pub height: f64,
    pub delta_y: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Line {
    pub start: usize,
    /// One past the last grapheme drawn on this line.
    pub end: usize,
    /// First grapheme of the next line. Larger than `end` when a newline or
    /// the space at a soft wrap is swallowed by the break.
    pub next_start: usize,
    /// One entry per grapheme plus a trailing zero-width entry after the
    /// last one, so a caret at the end of the line has a bound too.
    pub bounds: Vec<CharBound>,
    pub width: f64,
    pub height: f64,
    pub max_font_size: f64,
    /// Last line of a paragraph (hard break or end of text).
    pub ends_paragraph: bool,
    /// Spaces were widened to fill the box.
    pub justified: bool,
    /// Width of a space in this line's style.
    pub space_width: f64,
}

impl Line {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    pub fn contains(&self, index: usize) -> bool {
        index >= self.start && index <= self.end
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorLocation {
    pub line_index: usize,
    pub char_index: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextLayout {
    pub lines: Vec<Line>,
    pub width: f64,
    pub height: f64,
    pub line_height: f64,
    pub char_spacing_width: f64,
    pub align: TextAlign,
    pub direction: Direction,
    pub text_len: usize,
}

impl TextLayout {
    /// Map a flat grapheme index to (line, column). The column may equal the
    /// line length: the caret sits after the line's last grapheme.
    pub fn cursor_location(&self, index: usize) -> CursorLocation {
        let index = index.min(self.text_len);
        for (line_index, line) in self.lines.iter().enumerate() {
            if index <= line.end {
                return CursorLocation { line_index, char_index: index.saturating_sub(line.start) };
            }
        }
        let line_index = self.lines.len().saturating_sub(1);
        let char_index = self.lines.last().map_or(0, |l| l.len());
        CursorLocation { line_index, char_index }
    }

    pub fn index_of(&self, location: CursorLocation) -> usize {
        match self.lines.get(location.line_index) {
            Some(line) => line.start + location.char_index.min(line.len()),
            None => self.text_len,
        }
    }

    pub fn line_top(&self, line_index: usize) -> f64 {
        self.lines.iter().take(line_index).map(|l| l.height).sum()
    }

    pub fn is_end_of_wrapping(&self, line_index: usize) -> bool {
        self.lines.get(line_index).map_or(true, |l| l.ends_paragraph)
    }

    /// Horizontal offset of a line inside the box, from alignment.
    pub fn line_left_offset(&self, line_index: usize) -> f64 {
        let Some(line) = self.lines.get(line_index) else { return 0.0 };
        if line.justified || (self.align == TextAlign::Justify && !line.ends_paragraph) {
            return 0.0;
        }
        let diff = self.width - line.width;
        let align = self.align.resting();
        match (self.direction, align) {
            (Direction::Ltr, TextAlign::Center) => diff / 2.0,
            (Direction::Ltr, TextAlign::Right) => diff,
            (Direction::Ltr, _) => 0.0,
            (Direction::Rtl, TextAlign::Right) => 0.0,
            (Direction::Rtl, TextAlign::Center) => -diff / 2.0,
            (Direction::Rtl, _) => -diff,
        }
    }

    /// Column on `line_index` closest to `advance`, the distance from the
    /// line's origin in reading order.
    pub fn column_at(&self, line_index: usize, advance: f64) -> usize {
        let Some(line) = self.lines.get(line_index) else { return 0 };
        let mut edge = 0.0;
        for (j, bound) in line.bounds.iter().take(line.len()).enumerate() {
            let next = edge + bound.kerned_width;
            if next > advance {
                return if (next - advance).abs() < (advance - edge).abs() { j + 1 } else { j };
            }
            edge = next;
        }
        line.len()
    }

    /// Horizontal box coordinate where a line's text begins: its left end for
    /// LTR, its right end for RTL.
    pub fn line_origin(&self, line_index: usize) -> f64 {
        match self.direction {
            Direction::Ltr => self.line_left_offset(line_index),
            Direction::Rtl => self.width + self.line_left_offset(line_index),
        }
    }

    /// Box x of a point `advance` units into the line.
    pub fn visual_x(&self, line_index: usize, advance: f64) -> f64 {
        match self.direction {
            Direction::Ltr => self.line_origin(line_index) + advance,
            Direction::Rtl => self.line_origin(line_index) - advance,
        }
    }

    /// Inverse of [`TextLayout::visual_x`].
    pub fn advance_at(&self, line_index: usize, x: f64) -> f64 {
        match self.direction {
            Direction::Ltr => x - self.line_origin(line_index),
            Direction::Rtl => self.line_origin(line_index) - x,
        }
    }

    /// Line whose vertical span contains `y`; clamps above and below.
    pub fn line_at(&self, y: f64) -> usize {
        let mut top = 0.0;
        for (i, line) in self.lines.iter().enumerate() {
            top += line.height;
            if y < top {
                return i;
            }
        }
        self.lines.len().saturating_sub(1)
    }

    /// Graphemes of a visual line, for selection by line.
    pub fn line_range(&self, index: usize) -> Range<usize> {
        let location = self.cursor_location(index);
        let line = &self.lines[location.line_index];
        line.start..line.end
    }
}

struct Word {
    range: Range<usize>,
    width: f64,
}

fn is_joiner(g: &str) -> bool {
    matches!(g, " " | "\t")
}

/// Compute lines and bounds for `buffer`.
pub fn layout_text(buffer: &TextBuffer, styles: &StyleMap, props: &TextProps, measurer: &mut dyn TextMeasurer) -> TextLayout {
    let len = buffer.len();
    let base = CharStyle::default().resolve(props);
    let resolved: Vec<ResolvedStyle> = (0..len)
        .map(|i| styles.get(i).map_or_else(|| base.clone(), |s| s.resolve(props)))
        .collect();
    let spacing = props.font_size * props.char_spacing / 1000.0;

    let mut paragraphs = Vec::new();
    let mut paragraph_start = 0;
    for i in 0..len {
        if buffer.is_newline(i) {
            paragraphs.push(paragraph_start..i);
            paragraph_start = i + 1;
        }
    }
    paragraphs.push(paragraph_start..len);

    let mut metrics = vec![GlyphMetrics { width: 0.0, kerned_width: 0.0 }; len];
    for paragraph in &paragraphs {
        let mut previous: Option<usize> = None;
        for i in paragraph.clone() {
            let grapheme = buffer.grapheme(i).unwrap_or("");
            let prev = previous.and_then(|p| buffer.grapheme(p).map(|g| (g, &resolved[p])));
            metrics[i] = measurer.measure(grapheme, &resolved[i], prev);
            previous = Some(i);
        }
    }
    let advance = |i: usize| metrics[i].kerned_width + spacing;

    let mut breaks: Vec<(usize, usize, usize, bool)> = Vec::new();
    let mut box_width = 0.0;
    match props.wrap_width {
        Some(wrap_width) => {
            let paragraph_words: Vec<Vec<Word>> = paragraphs
                .iter()
                .map(|p| split_words(buffer, p.clone(), props.split_by_grapheme, &advance))
                .collect();
            let largest = paragraph_words.iter().flatten().map(|w| w.width).fold(0.0, f64::max);
            box_width = wrap_width.max(largest).max(props.min_width);
            for (paragraph, words) in paragraphs.iter().zip(&paragraph_words) {
                let next = if paragraph.end < len { paragraph.end + 1 } else { paragraph.end };
                let consumed = if props.split_by_grapheme { 0 } else { 1 };
                let mut line_start = paragraph.start;
                let mut line_width = 0.0;
                let mut prev_end: Option<usize> = None;
                for word in words {
                    match prev_end {
                        None => line_width = word.width,
                        Some(end) => {
                            let infix = if props.split_by_grapheme { 0.0 } else { advance(end) };
                            if line_width + infix + word.width > box_width {
                                breaks.push((line_start, end, end + consumed, false));
                                line_start = word.range.start;
                                line_width = word.width;
                            } else {
                                line_width += infix + word.width;
                            }
                        }
                    }
                    prev_end = Some(word.range.end);
                }
                breaks.push((line_start, paragraph.end, next, true));
            }
        }
        None => {
            for paragraph in &paragraphs {
                let next = if paragraph.end < len { paragraph.end + 1 } else { paragraph.end };
                breaks.push((paragraph.start, paragraph.end, next, true));
            }
        }
    }

    let mut lines: Vec<Line> = breaks
        .into_iter()
        .map(|(start, end, next_start, ends_paragraph)| {
            let line_style = resolved.get(start).unwrap_or(&base);
            let mut bounds: Vec<CharBound> = Vec::with_capacity(end - start + 1);
            let mut width = 0.0;
            let mut max_font_size: f64 = 0.0;
            for i in start..end {
                let style = &resolved[i];
                let m = metrics[i];
                let kerned = if i == start { m.width } else { m.kerned_width };
                let left = match bounds.last() {
                    Some(prev) => prev.left + prev.width + kerned - m.width,
                    None => 0.0,
                };
                bounds.push(CharBound {
                    left,
                    width: m.width + spacing,
                    kerned_width: kerned + spacing,
                    height: style.font_size,
                    delta_y: style.delta_y,
                });
                width += kerned + spacing;
                max_font_size = max_font_size.max(style.font_size);
            }
            let trailing_left = bounds.last().map_or(0.0, |b: &CharBound| b.left + b.width);
            bounds.push(CharBound { left: trailing_left, width: 0.0, kerned_width: 0.0, height: line_style.font_size, delta_y: 0.0 });
            if start == end {
                max_font_size = line_style.font_size;
            }
            let space_width = measurer.measure(" ", line_style, None).width;
            Line {
                start,
                end,
                next_start,
                bounds,
                width,
                height: max_font_size * props.line_height * FONT_SIZE_MULT,
                max_font_size,
                ends_paragraph,
                justified: false,
                space_width,
            }
        })
        .collect();

    if props.wrap_width.is_none() {
        box_width = lines.iter().map(|l| l.width).fold(0.0, f64::max);
        if box_width <= 0.0 {
            box_width = MIN_TEXT_WIDTH;
        }
    }

    if props.text_align.is_justify() {
        for line in lines.iter_mut().filter(|l| !l.ends_paragraph) {
            justify_line(buffer, line, box_width);
        }
    }

    let count = lines.len();
    let height = lines
        .iter()
        .enumerate()
        .map(|(i, l)| if i + 1 == count { l.height / props.line_height } else { l.height })
        .sum();

    TextLayout {
        lines,
        width: box_width,
        height,
        line_height: props.line_height,
        char_spacing_width: spacing,
        align: props.text_align,
        direction: props.direction,
        text_len: len,
    }
}

fn split_words(buffer: &TextBuffer, paragraph: Range<usize>, by_grapheme: bool, advance: &dyn Fn(usize) -> f64) -> Vec<Word> {
    if by_grapheme {
        return paragraph.map(|i| Word { range: i..i + 1, width: advance(i) }).collect();
    }
    let mut words = Vec::new();
    let mut word_start = paragraph.start;
    for i in paragraph.clone() {
        if buffer.grapheme(i).is_some_and(is_joiner) {
            words.push(word_start..i);
            word_start = i + 1;
        }
    }
    words.push(word_start..paragraph.end);
    words
        .into_iter()
        .map(|range| Word { width: range.clone().map(advance).sum(), range })
        .collect()
}

/// Widen the spaces of `line` so it fills `box_width`.
fn justify_line(buffer: &TextBuffer, line: &mut Line, box_width: f64) {
    let spaces = (line.start..line.end).filter(|&i| buffer.grapheme(i).is_some_and(is_joiner)).count();
    if spaces == 0 || line.width >= box_width {
        return;
    }
    let extra = (box_width - line.width) / spaces as f64;
    let mut accumulated = 0.0;
    for (j, bound) in line.bounds.iter_mut().enumerate() {
        bound.left += accumulated;
        if buffer.grapheme(line.start + j).is_some_and(is_joiner) && line.start + j < line.end {
            bound.width += extra;
            bound.kerned_width += extra;
            accumulated += extra;
        }
    }
    line.width = box_width;
    line.justified = true;
}
