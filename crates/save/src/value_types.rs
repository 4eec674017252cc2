//! Runtime value types that have a built-in savable mapping but are not part
//! of the engine's math prelude: keyframe curves and color gradients.

use bevy::color::{Color, LinearRgba};

/// A single curve keyframe.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Keyframe {
    pub time: f32,
    pub value: f32,
    pub in_tangent: f32,
    pub out_tangent: f32,
}

impl Keyframe {
    pub fn new(time: f32, value: f32) -> Self {
        Self {
            time,
            value,
            in_tangent: 0.0,
            out_tangent: 0.0,
        }
    }
}

/// Piecewise curve sampled by linear interpolation between keyframes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyframeCurve {
    pub keys: Vec<Keyframe>,
}

impl KeyframeCurve {
    pub fn new(mut keys: Vec<Keyframe>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    pub fn evaluate(&self, time: f32) -> f32 {
        let Some(first) = self.keys.first() else {
            return 0.0;
        };
        if time <= first.time {
            return first.value;
        }
        for pair in self.keys.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if time <= b.time {
                let span = b.time - a.time;
                if span <= f32::EPSILON {
                    return b.value;
                }
                let t = (time - a.time) / span;
                return a.value + (b.value - a.value) * t;
            }
        }
        self.keys.last().map_or(0.0, |k| k.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientColorKey {
    pub time: f32,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientAlphaKey {
    pub time: f32,
    pub alpha: f32,
}

/// Color gradient with independent color and alpha keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorGradient {
    pub color_keys: Vec<GradientColorKey>,
    pub alpha_keys: Vec<GradientAlphaKey>,
}

pub(crate) fn color_to_array(color: Color) -> [f32; 4] {
    let c = LinearRgba::from(color);
    [c.red, c.green, c.blue, c.alpha]
}

pub(crate) fn array_to_color(rgba: [f32; 4]) -> Color {
    Color::linear_rgba(rgba[0], rgba[1], rgba[2], rgba[3])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_evaluate_interpolates() {
        let curve = KeyframeCurve::new(vec![Keyframe::new(1.0, 10.0), Keyframe::new(0.0, 0.0)]);
        assert_eq!(curve.keys[0].time, 0.0);
        assert!((curve.evaluate(0.5) - 5.0).abs() < 1e-5);
        assert_eq!(curve.evaluate(-1.0), 0.0);
        assert_eq!(curve.evaluate(5.0), 10.0);
    }

    #[test]
    fn test_empty_curve_is_zero() {
        assert_eq!(KeyframeCurve::default().evaluate(3.0), 0.0);
    }

    #[test]
    fn test_color_array_roundtrip() {
        let color = Color::linear_rgba(0.25, 0.5, 0.75, 1.0);
        assert_eq!(color_to_array(color), [0.25, 0.5, 0.75, 1.0]);
        assert_eq!(array_to_color(color_to_array(color)), color);
    }
}
