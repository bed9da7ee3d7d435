use std::collections::HashMap;

use web_sys::CanvasRenderingContext2d;

use crate::style::ResolvedStyle;

/// Glyphs are measured at this size and scaled, so one cache entry serves
/// every font size of a family/weight/style.
pub const CACHE_FONT_SIZE: f64 = 400.0;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GlyphMetrics {
    pub width: f64,
    /// Advance once kerning against the previous grapheme is applied.
    pub kerned_width: f64,
}

pub trait TextMeasurer {
    fn measure(&mut self, grapheme: &str, style: &ResolvedStyle, previous: Option<(&str, &ResolvedStyle)>) -> GlyphMetrics;
}

/// Fixed advance per grapheme, as a fraction of the font size. Used headless.
#[derive(Clone, Copy, Debug)]
pub struct MonospaceMeasurer {
    pub advance: f64,
}

impl Default for MonospaceMeasurer {
    fn default() -> Self {
        MonospaceMeasurer { advance: 0.6 }
    }
}

impl TextMeasurer for MonospaceMeasurer {
    fn measure(&mut self, grapheme: &str, style: &ResolvedStyle, _previous: Option<(&str, &ResolvedStyle)>) -> GlyphMetrics {
        let width = if grapheme == "\n" { 0.0 } else { style.font_size * self.advance };
        GlyphMetrics { width, kerned_width: width }
    }
}

/// Measures through `CanvasRenderingContext2d::measure_text`.
pub struct CanvasMeasurer {
    ctx: CanvasRenderingContext2d,
    current_font: String,
    widths: HashMap<String, HashMap<String, f64>>,
}

impl CanvasMeasurer {
    pub fn new(ctx: CanvasRenderingContext2d) -> Self {
        CanvasMeasurer { ctx, current_font: String::new(), widths: HashMap::new() }
    }

    pub fn clear_cache(&mut self) {
        self.widths.clear();
    }

    fn cached_width(&mut self, font: &str, text: &str) -> f64 {
        if let Some(width) = self.widths.get(font).and_then(|m| m.get(text)) {
            return *width;
        }
        if self.current_font != font {
            self.ctx.set_font(font);
            self.current_font = font.to_string();
        }
        let width = match self.ctx.measure_text(text) {
            Ok(metrics) => metrics.width(),
            Err(err) => {
                log::warn!("measure_text failed for {:?}: {:?}", text, err);
                0.0
            }
        };
        self.widths.entry(font.to_string()).or_default().insert(text.to_string(), width);
        width
    }
}

impl TextMeasurer for CanvasMeasurer {
    fn measure(&mut self, grapheme: &str, style: &ResolvedStyle, previous: Option<(&str, &ResolvedStyle)>) -> GlyphMetrics {
        let font = style.font_declaration(CACHE_FONT_SIZE);
        let scale = style.font_size / CACHE_FONT_SIZE;
        let width = self.cached_width(&font, grapheme);
        let kerned = match previous {
            Some((prev, prev_style)) if prev_style.same_font(style) => {
                let pair = self.cached_width(&font, &format!("{}{}", prev, grapheme));
                pair - self.cached_width(&font, prev)
            }
            _ => width,
        };
        GlyphMetrics { width: width * scale, kerned_width: kerned * scale }
    }
}
