use kurbo::{Affine, Point, Rect, Vec2};
use serde::{Serialize, Deserialize};

/// Placement of an object on the scene. `left`/`top` locate the unrotated
/// scaled box; rotation, skew and flips happen around the box center.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectTransform {
    pub left: f64,
    pub top: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    pub angle: f64, // in radians
    pub skew_x: f64,
    pub skew_y: f64,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Default for ObjectTransform {
    fn default() -> Self {
        ObjectTransform {
            left: 0.0,
            top: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            angle: 0.0,
            skew_x: 0.0,
            skew_y: 0.0,
            flip_x: false,
            flip_y: false,
        }
    }
}

impl ObjectTransform {
    pub fn center(&self, width: f64, height: f64) -> Point {
        Point::new(self.left + width * self.scale_x / 2.0, self.top + height * self.scale_y / 2.0)
    }

    /// Maps center-origin object coordinates to scene coordinates.
    pub fn matrix(&self, width: f64, height: f64) -> Affine {
        let sx = if self.flip_x { -self.scale_x } else { self.scale_x };
        let sy = if self.flip_y { -self.scale_y } else { self.scale_y };
        let skew = Affine::new([1.0, self.skew_y.tan(), self.skew_x.tan(), 1.0, 0.0, 0.0]);
        Affine::translate(self.center(width, height).to_vec2())
            * Affine::rotate(self.angle)
            * Affine::scale_non_uniform(sx, sy)
            * skew
    }

    /// Maps a scene point into box coordinates (origin at the box's top-left
    /// corner, unscaled).
    pub fn to_box(&self, scene: Point, width: f64, height: f64) -> Point {
        let local = self.matrix(width, height).inverse() * scene;
        local + Vec2::new(width / 2.0, height / 2.0)
    }

    pub fn contains(&self, scene: Point, width: f64, height: f64) -> bool {
        let det = self.scale_x * self.scale_y;
        if det == 0.0 || !det.is_finite() {
            return false;
        }
        let p = self.to_box(scene, width, height);
        Rect::new(0.0, 0.0, width, height).contains(p)
    }

    /// Axis-aligned bounds of the transformed box.
    pub fn scene_bounds(&self, width: f64, height: f64) -> Rect {
        let m = self.matrix(width, height);
        let corners = [
            Point::new(-width / 2.0, -height / 2.0),
            Point::new(width / 2.0, -height / 2.0),
            Point::new(width / 2.0, height / 2.0),
            Point::new(-width / 2.0, height / 2.0),
        ];
        let mut bounds = Rect::from_points(m * corners[0], m * corners[0]);
        for corner in &corners[1..] {
            bounds = bounds.union_pt(m * *corner);
        }
        bounds
    }
}

/// Scene to screen mapping of the canvas viewport.
pub fn viewport_matrix(x: f64, y: f64, zoom: f64) -> Affine {
    Affine::translate((x, y)) * Affine::scale(zoom)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Point, b: Point) -> bool {
        (a - b).hypot() < 1e-9
    }

    #[test]
    fn identity_box_maps_to_left_top() {
        let t = ObjectTransform { left: 10.0, top: 20.0, ..Default::default() };
        assert!(close(t.to_box(Point::new(10.0, 20.0), 100.0, 50.0), Point::new(0.0, 0.0)));
        assert!(close(t.to_box(Point::new(60.0, 45.0), 100.0, 50.0), Point::new(50.0, 25.0)));
    }

    #[test]
    fn rotation_is_about_the_center() {
        let t = ObjectTransform { angle: std::f64::consts::FRAC_PI_2, ..Default::default() };
        // Box 100x20 centered at (50, 10); after a quarter turn its top-left
        // corner sits at (60, -40).
        assert!(close(t.to_box(Point::new(60.0, -40.0), 100.0, 20.0), Point::new(0.0, 0.0)));
        assert!(t.contains(Point::new(50.0, 40.0), 100.0, 20.0));
        assert!(!t.contains(Point::new(90.0, 10.0), 100.0, 20.0));
    }

    #[test]
    fn flip_mirrors_box_coordinates() {
        let t = ObjectTransform { flip_x: true, ..Default::default() };
        assert!(close(t.to_box(Point::new(10.0, 5.0), 100.0, 20.0), Point::new(90.0, 5.0)));
    }

    #[test]
    fn scale_widens_bounds() {
        let t = ObjectTransform { scale_x: 2.0, scale_y: 3.0, ..Default::default() };
        let b = t.scene_bounds(10.0, 10.0);
        assert!((b.width() - 20.0).abs() < 1e-9);
        assert!((b.height() - 30.0).abs() < 1e-9);
        assert!(close(t.to_box(Point::new(20.0, 30.0), 10.0, 10.0), Point::new(10.0, 10.0)));
    }
}
