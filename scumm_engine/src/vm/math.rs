//! Integer trigonometry used by the HE 90 math opcodes. Angles are whole
//! degrees, results of sin/cos are scaled by 100000.

const SCALE: f64 = 100_000.0;

pub fn sin(degrees: i32) -> i32 {
    ((degrees as f64).to_radians().sin() * SCALE) as i32
}

pub fn cos(degrees: i32) -> i32 {
    ((degrees as f64).to_radians().cos() * SCALE) as i32
}

/// Floor of the square root; negative input gives 0.
pub fn sqrt(value: i32) -> i32 {
    if value <= 0 {
        return 0;
    }
    let mut root = (value as f64).sqrt() as i64;
    while root * root > value as i64 {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= value as i64 {
        root += 1;
    }
    root as i32
}

/// Direction of `(dx, dy)` in degrees, 0..=359.
pub fn angle(dx: i32, dy: i32) -> i32 {
    let degrees = (dy as f64).atan2(dx as f64).to_degrees() as i32;
    degrees.rem_euclid(360)
}

/// Floor of the euclidean length of `deltas`.
pub fn distance(deltas: &[i32]) -> i32 {
    let sum: i64 = deltas.iter().map(|&d| d as i64 * d as i64).sum();
    let root = (sum as f64).sqrt() as i64;
    root.min(i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trig_is_scaled() {
        assert_eq!(sin(90), 100_000);
        assert_eq!(cos(0), 100_000);
        assert_eq!(sin(0), 0);
        assert!(cos(180) <= -99_999);
    }

    #[test]
    fn sqrt_floors() {
        assert_eq!(sqrt(16), 4);
        assert_eq!(sqrt(17), 4);
        assert_eq!(sqrt(24), 4);
        assert_eq!(sqrt(-9), 0);
    }

    #[test]
    fn angles_wrap_into_a_circle() {
        assert_eq!(angle(1, 0), 0);
        assert_eq!(angle(0, 1), 90);
        assert_eq!(angle(-1, 0), 180);
        assert_eq!(angle(0, -1), 270);
    }

    #[test]
    fn distances() {
        assert_eq!(distance(&[3, 4]), 5);
        assert_eq!(distance(&[1, 2, 2]), 3);
        assert_eq!(distance(&[1, 1]), 1);
    }
}
