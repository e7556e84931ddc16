//! Fixed-point math utilities for deterministic simulation.
//!
//! All battle simulation uses fixed-point arithmetic so that two runs of
//! the same battle produce bit-identical trajectories on any machine.
//! Floating-point values only appear at the content boundary, where RON
//! templates are converted once via [`fixed_decimal`].

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Fixed-point 2D vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

/// Serde support for fixed-point numbers written by hand in content files.
///
/// Values are read and written as plain decimals (`speed: 45.5`). The
/// conversion happens once when content is loaded, so simulation state never
/// holds a float.
pub mod fixed_decimal {
    use super::Fixed;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize a fixed-point number as a decimal.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(value.to_num::<f64>())
    }

    /// Deserialize a fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = f64::deserialize(deserializer)?;
        Fixed::checked_from_num(value)
            .ok_or_else(|| de::Error::custom(format!("{value} is out of fixed-point range")))
    }
}

/// Serde support for `Option<Fixed>` written by hand in content files.
pub mod option_fixed_decimal {
    use super::Fixed;
    use serde::{de, Deserialize, Deserializer, Serializer};

    /// Serialize an optional fixed-point number as a decimal.
    pub fn serialize<S>(value: &Option<Fixed>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(v) => serializer.serialize_some(&v.to_num::<f64>()),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize an optional fixed-point number from a decimal.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Fixed>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let opt = Option::<f64>::deserialize(deserializer)?;
        opt.map(|value| {
            Fixed::checked_from_num(value)
                .ok_or_else(|| de::Error::custom(format!("{value} is out of fixed-point range")))
        })
        .transpose()
    }
}

/// Serde support for [`Vec2Fixed`] written by hand in content files as `(x, y)`.
pub mod vec2_decimal {
    use super::{Fixed, Vec2Fixed};
    use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a vector as an `(f64, f64)` tuple.
    pub fn serialize<S>(value: &Vec2Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (value.x.to_num::<f64>(), value.y.to_num::<f64>()).serialize(serializer)
    }

    /// Deserialize a vector from an `(f64, f64)` tuple.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec2Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let (x, y) = <(f64, f64)>::deserialize(deserializer)?;
        let convert = |v: f64| {
            Fixed::checked_from_num(v)
                .ok_or_else(|| de::Error::custom(format!("{v} is out of fixed-point range")))
        };
        Ok(Vec2Fixed::new(convert(x)?, convert(y)?))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_ints(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        fixed_sqrt(self.distance_squared(other))
    }

    /// Distance with the vertical axis stretched by `y_bias`.
    ///
    /// Units on a side-on battlefield prefer targets on their own row, so
    /// vertical separation counts `y_bias` times as much as horizontal.
    #[must_use]
    pub fn biased_distance(self, other: Self, y_bias: Fixed) -> Fixed {
        let dx = self.x - other.x;
        let dy = (self.y - other.y).saturating_mul(y_bias);
        fixed_sqrt(dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy)))
    }

    /// Vector length.
    #[must_use]
    pub fn length(self) -> Fixed {
        fixed_sqrt(self.dot(self))
    }

    /// Dot product of two vectors.
    #[must_use]
    pub fn dot(self, other: Self) -> Fixed {
        self.x.saturating_mul(other.x).saturating_add(self.y.saturating_mul(other.y))
    }

    /// Multiply both components by a scalar.
    #[must_use]
    pub fn scale(self, factor: Fixed) -> Self {
        Self::new(self.x.saturating_mul(factor), self.y.saturating_mul(factor))
    }

    /// Linearly interpolate between two vectors.
    #[must_use]
    pub fn lerp(self, other: Self, t: Fixed) -> Self {
        Self {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }

    /// Normalize vector using fixed-point math.
    #[must_use]
    pub fn normalize(self) -> Self {
        let len_sq = self.dot(self);

        if len_sq == Fixed::ZERO {
            return Self::ZERO;
        }

        let len = fixed_sqrt(len_sq);
        if len == Fixed::ZERO {
            return Self::ZERO;
        }

        Self::new(self.x / len, self.y / len)
    }

    /// Move from `self` toward `target` by at most `max_step`.
    ///
    /// Returns the target exactly when it is within reach.
    #[must_use]
    pub fn step_toward(self, target: Self, max_step: Fixed) -> Self {
        let offset = target - self;
        let dist = offset.length();
        if dist <= max_step || dist == Fixed::ZERO {
            return target;
        }
        self + offset.normalize().scale(max_step)
    }
}

/// Computes the square root of a fixed-point number using binary search.
///
/// Non-positive inputs return zero.
#[must_use]
pub fn fixed_sqrt(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }

    let mut low = Fixed::ZERO;
    let mut high = if value > Fixed::ONE { value } else { Fixed::ONE };

    // 64 iterations walk every fractional bit of an I32F32.
    for _ in 0..64 {
        let mid = low + (high - low) / 2;
        if mid == low {
            break;
        }
        let mid_sq = mid.saturating_mul(mid);

        if mid_sq <= value {
            low = mid;
        } else {
            high = mid;
        }
    }

    low
}

/// Clamp a value into `[min, max]`.
#[must_use]
pub fn clamp(value: Fixed, min: Fixed, max: Fixed) -> Fixed {
    if value < min {
        min
    } else if value > max {
        max
    } else {
        value
    }
}

/// Launch velocity components for a ballistic arc.
///
/// For launch speed `speed`, gravity `gravity` and horizontal distance
/// `distance` returns `(horizontal, vertical)` speeds of the lower of the two
/// arcs that land at `distance`. Targets beyond the maximum range are fired
/// at 45 degrees. Uses the double-angle identities so no trigonometry is
/// needed: `sin2θ = g·d/v²`, `cosθ = sqrt((1 + cos2θ)/2)`.
#[must_use]
pub fn ballistic_launch(speed: Fixed, gravity: Fixed, distance: Fixed) -> (Fixed, Fixed) {
    let v_sq = speed.saturating_mul(speed);
    if v_sq == Fixed::ZERO {
        return (Fixed::ZERO, Fixed::ZERO);
    }
    let sin_2theta = clamp(gravity.saturating_mul(distance) / v_sq, Fixed::ZERO, Fixed::ONE);
    let cos_2theta = fixed_sqrt(Fixed::ONE - sin_2theta * sin_2theta);
    let cos_theta = fixed_sqrt((Fixed::ONE + cos_2theta) / 2);
    let sin_theta = fixed_sqrt((Fixed::ONE - cos_2theta) / 2);
    (speed * cos_theta, speed * sin_theta)
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl std::ops::AddAssign for Vec2Fixed {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epsilon() -> Fixed {
        Fixed::ONE / Fixed::from_num(10000)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(0));
        let b = Vec2Fixed::new(Fixed::from_num(0), Fixed::from_num(4));
        // 3² + 4² = 25
        assert_eq!(a.distance_squared(b), Fixed::from_num(25));
        assert!((a.distance(b) - Fixed::from_num(5)).abs() < epsilon());
    }

    #[test]
    fn test_biased_distance_weights_vertical_axis() {
        let origin = Vec2Fixed::ZERO;
        let below = Vec2Fixed::from_ints(0, 10);
        let beside = Vec2Fixed::from_ints(15, 0);
        let bias = Fixed::from_num(2);

        // 10 rows down counts as 20, further than 15 across.
        assert!(origin.biased_distance(below, bias) > origin.biased_distance(beside, bias));
        assert!(origin.distance(below) < origin.distance(beside));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(a * Fixed::from_num(7), b * Fixed::from_num(7));
        assert_eq!(fixed_sqrt(a), fixed_sqrt(b));
    }

    #[test]
    fn test_fixed_sqrt() {
        assert_eq!(fixed_sqrt(Fixed::ZERO), Fixed::ZERO);
        assert_eq!(fixed_sqrt(Fixed::from_num(-4)), Fixed::ZERO);
        assert!((fixed_sqrt(Fixed::from_num(144)) - Fixed::from_num(12)).abs() < epsilon());
        assert!((fixed_sqrt(Fixed::from_num(0.25)) - Fixed::from_num(0.5)).abs() < epsilon());
    }

    #[test]
    fn test_vec2_normalize() {
        let v = Vec2Fixed::new(Fixed::from_num(3), Fixed::from_num(4));
        let norm = v.normalize();

        let len_sq = norm.dot(norm);
        assert!(
            (len_sq - Fixed::ONE).abs() < epsilon(),
            "normalized vector length² should be ~1, got {len_sq:?}"
        );

        let ratio_diff = (norm.x * Fixed::from_num(4)) - (norm.y * Fixed::from_num(3));
        assert!(ratio_diff.abs() < epsilon(), "direction not preserved: {ratio_diff:?}");
        assert_eq!(Vec2Fixed::ZERO.normalize(), Vec2Fixed::ZERO);
    }

    #[test]
    fn test_step_toward_snaps_when_close() {
        let start = Vec2Fixed::ZERO;
        let target = Vec2Fixed::from_ints(3, 4);
        assert_eq!(start.step_toward(target, Fixed::from_num(10)), target);

        let partial = start.step_toward(target, Fixed::from_num(1));
        assert!((partial.length() - Fixed::ONE).abs() < epsilon());
    }

    #[test]
    fn test_ballistic_launch_max_range_is_45_degrees() {
        let gravity = Fixed::from_num(400);
        let max_range = Fixed::from_num(400);
        let speed = fixed_sqrt(gravity * max_range);
        let (vx, vz) = ballistic_launch(speed, gravity, max_range);
        assert!((vx - vz).abs() < Fixed::from_num(0.01), "vx={vx} vz={vz}");
    }

    #[test]
    fn test_ballistic_launch_lands_at_distance() {
        let gravity = Fixed::from_num(400);
        let speed = Fixed::from_num(400);
        let distance = Fixed::from_num(200);
        let (vx, vz) = ballistic_launch(speed, gravity, distance);
        // Flight time 2·vz/g, horizontal travel vx·t.
        let flight = vz * 2 / gravity;
        let travelled = vx * flight;
        assert!((travelled - distance).abs() < Fixed::from_num(0.1), "{travelled}");
    }

    #[test]
    fn test_fixed_decimal_round_trip_in_ron() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "fixed_decimal")]
            value: Fixed,
        }
        let parsed: Wrapper = ron::from_str("(value: 2.5)").unwrap();
        assert_eq!(parsed.value, Fixed::from_num(2.5));
    }
}
