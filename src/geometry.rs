//! Plain 2D math shared by the classifier and the motion controller.

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

pub fn distance(a: Point, b: Point) -> f32 {
    (b.x - a.x).hypot(b.y - a.y)
}

/// Angle at vertex `b` sweeping from `a` to `c`, in degrees within [0, 360).
pub fn angle(a: Point, b: Point, c: Point) -> f32 {
    let ang = ((c.y - b.y).atan2(c.x - b.x) - (a.y - b.y).atan2(a.x - b.x)).to_degrees();
    if ang < 0.0 { ang + 360.0 } else { ang }
}

/// Linear map of `value` from `[in_min, in_max]` onto `[out_min, out_max]`.
///
/// No clamping: values outside the input range extrapolate. The caller must
/// ensure `in_min != in_max`.
pub fn map_range(value: f32, in_min: f32, in_max: f32, out_min: f32, out_max: f32) -> f32 {
    (value - in_min) * (out_max - out_min) / (in_max - in_min) + out_min
}
