use std::borrow::Cow;
use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Serialize, Deserialize};

use crate::types::TextProps;

/// Sparse per-character overrides. Absent fields inherit the object defaults.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CharStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_weight: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stroke: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linethrough: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overline: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_background_color: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StyleProperty {
    FontFamily,
    FontSize,
    FontWeight,
    FontStyle,
    Fill,
    Stroke,
    Underline,
    Linethrough,
    Overline,
    DeltaY,
    TextBackgroundColor,
}

impl CharStyle {
    pub fn is_empty(&self) -> bool {
        *self == CharStyle::default()
    }

    /// Overwrite the fields `other` sets, keep the rest.
    pub fn merge(&mut self, other: &CharStyle) {
        fn take<T: Clone>(dst: &mut Option<T>, src: &Option<T>) {
            if let Some(v) = src {
                *dst = Some(v.clone());
            }
        }
        take(&mut self.font_family, &other.font_family);
        take(&mut self.font_size, &other.font_size);
        take(&mut self.font_weight, &other.font_weight);
        take(&mut self.font_style, &other.font_style);
        take(&mut self.fill, &other.fill);
        take(&mut self.stroke, &other.stroke);
        take(&mut self.underline, &other.underline);
        take(&mut self.linethrough, &other.linethrough);
        take(&mut self.overline, &other.overline);
        take(&mut self.delta_y, &other.delta_y);
        take(&mut self.text_background_color, &other.text_background_color);
    }

    pub fn clear(&mut self, property: StyleProperty) {
        match property {
            StyleProperty::FontFamily => self.font_family = None,
            StyleProperty::FontSize => self.font_size = None,
            StyleProperty::FontWeight => self.font_weight = None,
            StyleProperty::FontStyle => self.font_style = None,
            StyleProperty::Fill => self.fill = None,
            StyleProperty::Stroke => self.stroke = None,
            StyleProperty::Underline => self.underline = None,
            StyleProperty::Linethrough => self.linethrough = None,
            StyleProperty::Overline => self.overline = None,
            StyleProperty::DeltaY => self.delta_y = None,
            StyleProperty::TextBackgroundColor => self.text_background_color = None,
        }
    }

    pub fn resolve(&self, defaults: &TextProps) -> ResolvedStyle {
        ResolvedStyle {
            font_family: self.font_family.clone().unwrap_or_else(|| defaults.font_family.clone()),
            font_size: self.font_size.unwrap_or(defaults.font_size),
            font_weight: self.font_weight.clone().unwrap_or_else(|| defaults.font_weight.clone()),
            font_style: self.font_style.clone().unwrap_or_else(|| defaults.font_style.clone()),
            fill: self.fill.clone().unwrap_or_else(|| defaults.fill.clone()),
            stroke: self.stroke.clone().or_else(|| defaults.stroke.clone()),
            underline: self.underline.unwrap_or(defaults.underline),
            linethrough: self.linethrough.unwrap_or(defaults.linethrough),
            overline: self.overline.unwrap_or(defaults.overline),
            delta_y: self.delta_y.unwrap_or(0.0),
            text_background_color: self.text_background_color.clone().or_else(|| defaults.text_background_color.clone()),
        }
    }
}

/// A style with every property filled in.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedStyle {
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: String,
    pub font_style: String,
    pub fill: String,
    pub stroke: Option<String>,
    pub underline: bool,
    pub linethrough: bool,
    pub overline: bool,
    pub delta_y: f64,
    pub text_background_color: Option<String>,
}

impl ResolvedStyle {
    /// CSS font shorthand at the given pixel size.
    pub fn font_declaration(&self, size: f64) -> String {
        format!("{} {} {}px {}", self.font_style, self.font_weight, size, quote_family(&self.font_family))
    }

    /// Whether two styles shape with the same font (so kerning applies).
    pub fn same_font(&self, other: &ResolvedStyle) -> bool {
        self.font_family == other.font_family
            && self.font_weight == other.font_weight
            && self.font_style == other.font_style
            && self.font_size == other.font_size
    }
}

fn quote_family(family: &str) -> Cow<'_, str> {
    let generic = ["serif", "sans-serif", "monospace", "cursive", "fantasy", "system-ui"];
    if family.contains(',') || family.starts_with('"') || family.starts_with('\'') || generic.contains(&family) {
        Cow::Borrowed(family)
    } else {
        Cow::Owned(format!("\"{}\"", family))
    }
}

/// Per-character style overrides keyed by grapheme index. Empty records are
/// never stored, so a missing key means "object defaults".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StyleMap {
    styles: BTreeMap<usize, CharStyle>,
}

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }

    pub fn clear(&mut self) {
        self.styles.clear();
    }

    pub fn get(&self, index: usize) -> Option<&CharStyle> {
        self.styles.get(&index)
    }

    pub fn style_at(&self, index: usize) -> CharStyle {
        self.styles.get(&index).cloned().unwrap_or_default()
    }

    pub fn set(&mut self, index: usize, style: CharStyle) {
        if style.is_empty() {
            self.styles.remove(&index);
        } else {
            self.styles.insert(index, style);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &CharStyle)> {
        self.styles.iter().map(|(i, s)| (*i, s))
    }

    /// Merge `style` into every character of `range`.
    pub fn merge_range(&mut self, range: Range<usize>, style: &CharStyle) {
        if style.is_empty() {
            return;
        }
        for index in range {
            self.styles.entry(index).or_default().merge(style);
        }
    }

    pub fn styles_in(&self, range: Range<usize>) -> Vec<CharStyle> {
        range.map(|i| self.style_at(i)).collect()
    }

    pub fn clear_property(&mut self, property: StyleProperty) {
        for style in self.styles.values_mut() {
            style.clear(property);
        }
        self.styles.retain(|_, s| !s.is_empty());
    }

    /// Drop the styles of `range` and close the gap.
    pub fn remove_range(&mut self, range: Range<usize>) {
        if range.is_empty() {
            return;
        }
        let count = range.end - range.start;
        let mut tail = self.styles.split_off(&range.start);
        let after = tail.split_off(&range.end);
        self.styles.extend(after.into_iter().map(|(i, s)| (i - count, s)));
    }

    /// Open a gap of `count` characters at `at`, shifting later styles.
    pub fn insert_gap(&mut self, at: usize, count: usize) {
        if count == 0 {
            return;
        }
        let tail = self.styles.split_off(&at);
        self.styles.extend(tail.into_iter().map(|(i, s)| (i + count, s)));
    }

    /// Keep only styles for indices below `len`.
    pub fn truncate(&mut self, len: usize) {
        let _ = self.styles.split_off(&len);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(color: &str) -> CharStyle {
        CharStyle { fill: Some(color.to_string()), ..Default::default() }
    }

    #[test]
    fn merge_keeps_unrelated_properties() {
        let mut map = StyleMap::new();
        map.set(1, CharStyle { font_size: Some(12.0), ..Default::default() });
        map.merge_range(0..3, &fill("red"));
        assert_eq!(map.get(1).and_then(|s| s.font_size), Some(12.0));
        assert_eq!(map.get(1).and_then(|s| s.fill.clone()).as_deref(), Some("red"));
        assert_eq!(map.style_at(3), CharStyle::default());
    }

    #[test]
    fn remove_range_shifts_tail_down() {
        let mut map = StyleMap::new();
        map.set(0, fill("a"));
        map.set(2, fill("b"));
        map.set(5, fill("c"));
        map.remove_range(1..4);
        assert_eq!(map.style_at(0), fill("a"));
        assert_eq!(map.style_at(2), fill("c"));
        assert_eq!(map.iter().count(), 2);
    }

    #[test]
    fn insert_gap_shifts_tail_up() {
        let mut map = StyleMap::new();
        map.set(0, fill("a"));
        map.set(3, fill("b"));
        map.insert_gap(2, 4);
        assert_eq!(map.style_at(0), fill("a"));
        assert_eq!(map.style_at(7), fill("b"));
        assert!(map.get(3).is_none());
    }

    #[test]
    fn clearing_last_property_drops_record() {
        let mut map = StyleMap::new();
        map.merge_range(0..2, &fill("red"));
        map.clear_property(StyleProperty::Fill);
        assert!(map.is_empty());
    }

    #[test]
    fn resolve_falls_back_to_defaults() {
        let props = TextProps::default();
        let resolved = CharStyle { font_size: Some(10.0), ..Default::default() }.resolve(&props);
        assert_eq!(resolved.font_size, 10.0);
        assert_eq!(resolved.fill, props.fill);
        assert_eq!(resolved.font_declaration(10.0), "normal normal 10px \"Times New Roman\"");
    }
}
