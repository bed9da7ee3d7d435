use kurbo::Affine;
use wasm_bindgen::prelude::*;

use crate::buffer::grapheme_count;
use crate::engine::{Scene, TextEngine};
use crate::error::TextError;
use crate::geometry::ObjectTransform;
use crate::layout::FONT_SIZE_FRACTION;
use crate::style::{CharStyle, StyleMap};
use crate::types::{Direction, EditingOptions, ObjectId, TextProps};

impl Scene {
    pub fn export_svg(&self, width: f64, height: f64) -> String {
        let mut body = String::new();
        for object in &self.objects {
            let text = object.text();
            if text.visible {
                body.push_str(&text.to_svg_element());
            }
        }
        format!(
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">{}</svg>"##,
            width, height, width, height, body
        )
    }

    /// Add every `<text>` element of the document as an editable object.
    pub fn import_svg(&mut self, source: &str) -> Result<Vec<ObjectId>, TextError> {
        let doc = roxmltree::Document::parse(source)?;
        let mut ids = Vec::new();
        for node in doc.descendants().filter(|n| n.has_tag_name("text")) {
            ids.push(self.import_text_node(node));
        }
        if ids.is_empty() {
            log::warn!("svg import found no <text> element");
            return Err(TextError::MissingTextElement);
        }
        Ok(ids)
    }

    fn import_text_node(&mut self, node: roxmltree::Node) -> ObjectId {
        let props = props_from_node(node);
        let base = CharStyle::default();
        let mut text = String::new();
        let mut runs: Vec<(usize, usize, CharStyle)> = Vec::new();
        let mut line_y: Option<f64> = None;
        let mut first_pos: Option<(f64, f64)> = None;
        let mut len = 0;

        let tspans: Vec<roxmltree::Node> = node.children().filter(|n| n.has_tag_name("tspan")).collect();
        if tspans.is_empty() {
            text = node.text().unwrap_or_default().to_string();
            first_pos = Some((number(node, "x").unwrap_or(0.0), number(node, "y").unwrap_or(0.0)));
        }
        for span in tspans {
            let y = number(span, "y");
            if let (Some(prev), Some(y)) = (line_y, y) {
                if (prev - y).abs() > 1e-6 {
                    text.push('\n');
                    len += 1;
                }
            }
            if first_pos.is_none() {
                first_pos = Some((number(span, "x").unwrap_or(0.0), y.unwrap_or(0.0)));
            }
            line_y = y.or(line_y);
            let content = span.text().unwrap_or_default();
            let count = grapheme_count(content);
            let style = span_style(span, &props);
            if count > 0 && style != base {
                runs.push((len, len + count, style));
            }
            text.push_str(content);
            len += count;
        }

        let id = self.add_text(&text, props, Some(EditingOptions::default()), ObjectTransform::default());
        let Some(object) = self.object_mut(id) else { return id };
        let object = object.text_mut();
        let mut styles = StyleMap::new();
        for (start, end, style) in &runs {
            styles.merge_range(*start..*end, style);
        }
        object.replace_styles(styles);
        if let Some(opacity) = number(node, "opacity") {
            object.opacity = opacity.clamp(0.0, 1.0);
        }

        let (width, height) = (object.width(), object.height());
        object.transform = match placement(node) {
            Some(matrix) => transform_from_matrix(matrix, width, height),
            None => {
                let (x, y) = first_pos.unwrap_or_default();
                let layout = object.layout();
                let ascent = layout
                    .lines
                    .first()
                    .map_or(0.0, |line| line.height / layout.line_height * (1.0 - FONT_SIZE_FRACTION));
                ObjectTransform { left: x, top: y - ascent, ..ObjectTransform::default() }
            }
        };
        log::debug!("imported svg text as object {}", id);
        id
    }
}

/// Presentation attribute or inline style declaration of `name`, with the
/// inline style winning.
fn svg_attr<'a>(node: roxmltree::Node<'a, '_>, name: &str) -> Option<&'a str> {
    if let Some(style) = node.attribute("style") {
        for part in style.split(';') {
            if let Some((key, value)) = part.split_once(':') {
                if key.trim() == name {
                    return Some(value.trim());
                }
            }
        }
    }
    node.attribute(name)
}

fn number(node: roxmltree::Node, name: &str) -> Option<f64> {
    svg_attr(node, name).and_then(|v| v.trim_end_matches("px").trim().parse::<f64>().ok())
}

fn props_from_node(node: roxmltree::Node) -> TextProps {
    let mut props = TextProps::default();
    if let Some(v) = svg_attr(node, "font-family") {
        props.font_family = v.trim_matches(|c: char| c == '\'' || c == '"').to_string();
    }
    if let Some(v) = number(node, "font-size") {
        props.font_size = v;
    }
    if let Some(v) = svg_attr(node, "font-weight") {
        props.font_weight = v.to_string();
    }
    if let Some(v) = svg_attr(node, "font-style") {
        props.font_style = v.to_string();
    }
    if let Some(v) = svg_attr(node, "fill") {
        props.fill = if v == "none" { "transparent".to_string() } else { v.to_string() };
    }
    if let Some(v) = svg_attr(node, "stroke") {
        props.stroke = (v != "none").then(|| v.to_string());
    }
    if let Some(v) = svg_attr(node, "text-decoration") {
        props.underline = v.contains("underline");
        props.linethrough = v.contains("line-through");
        props.overline = v.contains("overline");
    }
    if svg_attr(node, "direction") == Some("rtl") {
        props.direction = Direction::Rtl;
    }
    props
}

/// Overrides a `<tspan>` carries relative to its text's defaults.
fn span_style(span: roxmltree::Node, props: &TextProps) -> CharStyle {
    let mut style = CharStyle::default();
    if let Some(v) = svg_attr(span, "font-family").map(|v| v.trim_matches(|c: char| c == '\'' || c == '"')) {
        if v != props.font_family {
            style.font_family = Some(v.to_string());
        }
    }
    if let Some(v) = number(span, "font-size") {
        if v != props.font_size {
            style.font_size = Some(v);
        }
    }
    if let Some(v) = svg_attr(span, "font-weight") {
        if v != props.font_weight {
            style.font_weight = Some(v.to_string());
        }
    }
    if let Some(v) = svg_attr(span, "font-style") {
        if v != props.font_style {
            style.font_style = Some(v.to_string());
        }
    }
    if let Some(v) = svg_attr(span, "fill") {
        if v != props.fill {
            style.fill = Some(v.to_string());
        }
    }
    if let Some(v) = svg_attr(span, "stroke") {
        if Some(v) != props.stroke.as_deref() {
            style.stroke = Some(v.to_string());
        }
    }
    if let Some(v) = svg_attr(span, "text-decoration") {
        let underline = v.contains("underline");
        let linethrough = v.contains("line-through");
        let overline = v.contains("overline");
        style.underline = (underline != props.underline).then_some(underline);
        style.linethrough = (linethrough != props.linethrough).then_some(linethrough);
        style.overline = (overline != props.overline).then_some(overline);
    }
    style
}

/// Combined `transform` of the node and its ancestors, if any declare one.
fn placement(node: roxmltree::Node) -> Option<Affine> {
    let mut matrix: Option<Affine> = None;
    for ancestor in node.ancestors() {
        if let Some(t) = ancestor.attribute("transform").and_then(parse_transform) {
            matrix = Some(t * matrix.unwrap_or(Affine::IDENTITY));
        }
    }
    matrix
}

fn parse_transform(value: &str) -> Option<Affine> {
    let mut result = Affine::IDENTITY;
    let mut rest = value.trim();
    while let Some(open) = rest.find('(') {
        let close = rest[open..].find(')')? + open;
        let name = rest[..open].trim().trim_start_matches(',').trim();
        let args: Vec<f64> = rest[open + 1..close]
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<f64>())
            .collect::<Result<_, _>>()
            .ok()?;
        let step = match (name, args.as_slice()) {
            ("matrix", [a, b, c, d, e, f]) => Affine::new([*a, *b, *c, *d, *e, *f]),
            ("translate", [x]) => Affine::translate((*x, 0.0)),
            ("translate", [x, y]) => Affine::translate((*x, *y)),
            ("scale", [s]) => Affine::scale(*s),
            ("scale", [x, y]) => Affine::scale_non_uniform(*x, *y),
            ("rotate", [deg]) => Affine::rotate(deg.to_radians()),
            ("rotate", [deg, cx, cy]) => Affine::rotate_about(deg.to_radians(), (*cx, *cy).into()),
            _ => {
                log::warn!("ignoring unsupported svg transform {}", name);
                Affine::IDENTITY
            }
        };
        result = result * step;
        rest = &rest[close + 1..];
    }
    Some(result)
}

/// Split a center-origin placement matrix into translation, rotation and
/// scale. Skew is not recovered.
fn transform_from_matrix(matrix: Affine, width: f64, height: f64) -> ObjectTransform {
    let [a, b, c, d, e, f] = matrix.as_coeffs();
    let scale_x = a.hypot(b);
    if scale_x == 0.0 {
        return ObjectTransform { left: e, top: f, ..ObjectTransform::default() };
    }
    let scale_y = (a * d - b * c) / scale_x;
    let transform = ObjectTransform {
        angle: b.atan2(a),
        scale_x,
        scale_y: scale_y.abs(),
        flip_y: scale_y < 0.0,
        ..ObjectTransform::default()
    };
    ObjectTransform {
        left: e - width * transform.scale_x / 2.0,
        top: f - height * transform.scale_y / 2.0,
        ..transform
    }
}

#[wasm_bindgen]
impl TextEngine {
    pub fn export_svg(&self, width: f64, height: f64) -> String {
        self.scene.borrow().export_svg(width, height)
    }

    pub fn import_svg(&mut self, data: &[u8]) -> String {
        let source = String::from_utf8_lossy(data);
        let result = {
            let mut scene = self.scene.borrow_mut();
            let result = scene.import_svg(&source);
            scene.render(js_sys::Date::now());
            result
        };
        match result {
            Ok(ids) => serde_json::json!({ "success": true, "ids": ids }).to_string(),
            Err(e) => {
                log::warn!("svg import rejected: {}", e);
                e.to_json()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SceneObject;

    fn bold() -> CharStyle {
        CharStyle { font_weight: Some("bold".into()), ..Default::default() }
    }

    #[test]
    fn export_then_import_keeps_lines_styles_and_placement() {
        let scene = Scene::shared();
        let mut scene = scene.borrow_mut();
        let transform = ObjectTransform { left: 10.0, top: 20.0, angle: 0.5, ..Default::default() };
        let props = TextProps { font_size: 20.0, ..Default::default() };
        let id = scene.add_text("ab\n\ncd", props, None, transform);
        if let Some(object) = scene.object_mut(id) {
            object.text_mut().apply_style(&bold(), 0, 1);
        }
        let svg = scene.export_svg(200.0, 100.0);

        let other = Scene::shared();
        let mut other = other.borrow_mut();
        let ids = other.import_svg(&svg).unwrap_or_default();
        assert_eq!(ids.len(), 1);
        let Some(SceneObject::Editable(e)) = other.object(ids[0]) else { panic!("imported text should be editable") };
        assert_eq!(e.text.text(), "ab\n\ncd");
        assert_eq!(e.text.style_at(0), bold());
        assert!(e.text.style_at(1).is_empty());
        assert_eq!(e.text.props().font_size, 20.0);
        assert!((e.text.transform.left - 10.0).abs() < 1e-6);
        assert!((e.text.transform.top - 20.0).abs() < 1e-6);
        assert!((e.text.transform.angle - 0.5).abs() < 1e-6);
    }

    #[test]
    fn plain_text_uses_its_baseline_position() {
        let scene = Scene::shared();
        let mut scene = scene.borrow_mut();
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><text x="5" y="40" style="font-size: 30px; fill: red">hello</text></svg>"#;
        let ids = scene.import_svg(svg).unwrap_or_default();
        let Some(object) = ids.first().and_then(|id| scene.object(*id)) else { panic!("missing object") };
        let text = object.text();
        assert_eq!(text.text(), "hello");
        assert_eq!(text.props().fill, "red");
        assert_eq!(text.transform.left, 5.0);
        assert!(text.transform.top < 40.0);
    }

    #[test]
    fn documents_without_text_are_rejected() {
        let scene = Scene::shared();
        let mut scene = scene.borrow_mut();
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg"><rect width="5" height="5"/></svg>"#;
        assert!(matches!(scene.import_svg(svg), Err(TextError::MissingTextElement)));
        assert!(matches!(scene.import_svg("<svg"), Err(TextError::Svg(_))));
    }

    #[test]
    fn transform_lists_compose_left_to_right() {
        let m = parse_transform("translate(10, 20) scale(2)").unwrap_or(Affine::IDENTITY);
        assert_eq!(m.as_coeffs(), [2.0, 0.0, 0.0, 2.0, 10.0, 20.0]);
        assert!(parse_transform("matrix(1 0 0 1 x 0)").is_none());
    }
}
