//! Three-point touch calibration.
//!
//! Uses the integer form of the three-point algorithm from "SLYT277:
//! Calibration in Touch-Screen Systems" by Texas Instruments
//! <https://www.ti.com/lit/an/slyt277/slyt277.pdf>: the 2x3 affine system is
//! solved with Cramer's rule and the result kept as six coefficients over a
//! common divisor, so no floating point is needed on the target.
//!
//! ```text
//! x' = (A * x + B * y + C) / divisor
//! y' = (D * x + E * y + F) / divisor
//! ```
//!
//! Raw inputs are 16-bit and the solve runs in `i64`. The largest term,
//! `C`/`F`, is a sum of three products of three 16-bit values and stays well
//! under 2^51. Translation widens to `i128`, so a matrix restored from
//! storage with arbitrary coefficients clamps instead of overflowing.

use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

use crate::coords::{CalibratedPosition, DisplayBounds, RawPosition};

/// Upper bound on the postcard encoding of a [`CalibrationMatrix`]
/// (seven varint-encoded `i64`s).
pub const MAX_ENCODED_MATRIX_LEN: usize = 7 * 10;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// The raw points are collinear; collect a new set of samples
    #[error("calibration points are collinear")]
    Degenerate,
    /// A stored matrix could not be encoded or decoded
    #[error("calibration matrix encoding is invalid")]
    Encoding,
}

/// Three raw touch readings and the display points they were taken at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationSample {
    pub raw: [RawPosition; 3],
    pub reference: [CalibratedPosition; 3],
}

impl CalibrationSample {
    pub const fn new(raw: [RawPosition; 3], reference: [CalibratedPosition; 3]) -> Self {
        Self { raw, reference }
    }
}

/// Coefficients mapping raw sensor positions to display positions.
///
/// `divisor` is always positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationMatrix {
    pub a: i64,
    pub b: i64,
    pub c: i64,
    pub d: i64,
    pub e: i64,
    pub f: i64,
    pub divisor: i64,
}

impl CalibrationMatrix {
    /// Matrix that passes raw coordinates through unchanged
    pub const fn identity() -> Self {
        Self {
            a: 1,
            b: 0,
            c: 0,
            d: 0,
            e: 1,
            f: 0,
            divisor: 1,
        }
    }

    /// Encode for storage by the caller.
    pub fn to_slice<'b>(&self, buf: &'b mut [u8]) -> Result<&'b mut [u8], CalibrationError> {
        postcard::to_slice(self, buf).map_err(|_| CalibrationError::Encoding)
    }

    /// Decode a matrix previously written with [`Self::to_slice`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CalibrationError> {
        let matrix: Self = postcard::from_bytes(bytes).map_err(|_| CalibrationError::Encoding)?;
        if matrix.divisor <= 0 {
            return Err(CalibrationError::Encoding);
        }
        Ok(matrix)
    }

    /// Apply the transform with round-to-nearest, without clamping.
    ///
    /// Evaluated in `i128` so coefficients restored from storage cannot
    /// overflow, whatever their magnitude.
    fn apply(&self, raw: RawPosition) -> (i128, i128) {
        let x = raw.x as i128;
        let y = raw.y as i128;
        let divisor = self.divisor as i128;
        let cal_x = div_round(self.a as i128 * x + self.b as i128 * y + self.c as i128, divisor);
        let cal_y = div_round(self.d as i128 * x + self.e as i128 * y + self.f as i128, divisor);
        (cal_x, cal_y)
    }
}

impl Default for CalibrationMatrix {
    fn default() -> Self {
        Self::identity()
    }
}

/// Integer division rounding half away from zero. `den` must be positive.
fn div_round(num: i128, den: i128) -> i128 {
    if num >= 0 {
        (num + den / 2) / den
    } else {
        (num - den / 2) / den
    }
}

/// Solve for the matrix that maps each raw point onto its reference point.
pub fn compute_matrix(sample: &CalibrationSample) -> Result<CalibrationMatrix, CalibrationError> {
    let [(xa, ya), (xb, yb), (xc, yc)] = sample.raw.map(|p| (p.x as i64, p.y as i64));
    let [(xda, yda), (xdb, ydb), (xdc, ydc)] =
        sample.reference.map(|p| (p.x as i64, p.y as i64));

    let divisor = (xa - xc) * (yb - yc) - (xb - xc) * (ya - yc);
    if divisor == 0 {
        return Err(CalibrationError::Degenerate);
    }

    let a = (xda - xdc) * (yb - yc) - (xdb - xdc) * (ya - yc);
    let b = (xa - xc) * (xdb - xdc) - (xda - xdc) * (xb - xc);
    let c = yc * (xb * xda - xa * xdb) + ya * (xc * xdb - xb * xdc) + yb * (xa * xdc - xc * xda);

    let d = (yda - ydc) * (yb - yc) - (ydb - ydc) * (ya - yc);
    let e = (xa - xc) * (ydb - ydc) - (yda - ydc) * (xb - xc);
    let f = yc * (xb * yda - xa * ydb) + ya * (xc * ydb - xb * ydc) + yb * (xa * ydc - xc * yda);

    // Keep the divisor positive so rounding only has to look at the numerator.
    let sign = divisor.signum();
    Ok(CalibrationMatrix {
        a: a * sign,
        b: b * sign,
        c: c * sign,
        d: d * sign,
        e: e * sign,
        f: f * sign,
        divisor: divisor * sign,
    })
}

/// Translate a raw position, clamping into the `u16` coordinate range.
pub fn translate(raw: RawPosition, matrix: &CalibrationMatrix) -> CalibratedPosition {
    let (x, y) = matrix.apply(raw);
    CalibratedPosition::new(clamp_axis(x, u16::MAX), clamp_axis(y, u16::MAX))
}

/// Translate a raw position, clamping onto the display.
///
/// Noise near the panel edges can land a few pixels outside the display;
/// those samples are pinned to the nearest edge.
pub fn translate_within(
    raw: RawPosition,
    matrix: &CalibrationMatrix,
    bounds: DisplayBounds,
) -> CalibratedPosition {
    let (x, y) = matrix.apply(raw);
    CalibratedPosition::new(clamp_axis(x, bounds.max_x()), clamp_axis(y, bounds.max_y()))
}

fn clamp_axis(value: i128, max: u16) -> u16 {
    value.clamp(0, max as i128) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(x: u16, y: u16) -> RawPosition {
        RawPosition::new(x, y)
    }

    fn cal(x: u16, y: u16) -> CalibratedPosition {
        CalibratedPosition::new(x, y)
    }

    fn assert_close(actual: CalibratedPosition, expected: CalibratedPosition) {
        let dx = (actual.x as i32 - expected.x as i32).abs();
        let dy = (actual.y as i32 - expected.y as i32).abs();
        assert!(
            dx <= 1 && dy <= 1,
            "expected {:?} within 1 unit, got {:?}",
            expected,
            actual
        );
    }

    /// A 12-bit panel mounted flipped and skewed relative to an 800x480 display
    fn panel_reading(display: CalibratedPosition) -> RawPosition {
        let x = display.x as i32;
        let y = display.y as i32;
        raw(
            (3900 - 4 * x - y / 8) as u16,
            (250 + 7 * y + x / 16) as u16,
        )
    }

    #[test]
    fn test_offset_square_scenario() {
        let sample = CalibrationSample::new(
            [raw(10, 10), raw(110, 10), raw(10, 110)],
            [cal(0, 0), cal(100, 0), cal(0, 100)],
        );
        let matrix = compute_matrix(&sample).unwrap();

        assert_eq!(matrix.divisor, 10000);
        assert_close(translate(raw(60, 60), &matrix), cal(50, 50));
    }

    #[test]
    fn test_calibration_points_round_trip() {
        let reference = [cal(96, 80), cal(400, 400), cal(720, 240)];
        let sample = CalibrationSample::new(reference.map(panel_reading), reference);
        let matrix = compute_matrix(&sample).unwrap();

        for (raw_point, expected) in sample.raw.iter().zip(reference.iter()) {
            assert_close(translate(*raw_point, &matrix), *expected);
        }

        // A point that was not part of the calibration set
        assert_close(translate(panel_reading(cal(640, 64)), &matrix), cal(640, 64));
    }

    #[test]
    fn test_collinear_points_are_degenerate() {
        let sample = CalibrationSample::new(
            [raw(100, 100), raw(200, 200), raw(300, 300)],
            [cal(10, 10), cal(20, 50), cal(30, 10)],
        );
        assert_eq!(compute_matrix(&sample), Err(CalibrationError::Degenerate));
    }

    #[test]
    fn test_repeated_point_is_degenerate() {
        let sample = CalibrationSample::new(
            [raw(500, 500), raw(500, 500), raw(900, 100)],
            [cal(10, 10), cal(200, 200), cal(300, 10)],
        );
        assert_eq!(compute_matrix(&sample), Err(CalibrationError::Degenerate));
    }

    #[test]
    fn test_divisor_is_normalised_positive() {
        // Points listed clockwise produce a negative determinant
        let sample = CalibrationSample::new(
            [raw(10, 10), raw(10, 110), raw(110, 10)],
            [cal(0, 0), cal(0, 100), cal(100, 0)],
        );
        let matrix = compute_matrix(&sample).unwrap();
        assert!(matrix.divisor > 0);
        assert_close(translate(raw(60, 60), &matrix), cal(50, 50));
    }

    #[test]
    fn test_rounds_to_nearest() {
        // Halving scale: raw 3 -> 1.5 rounds up, raw 1 -> 0.5 rounds up
        let matrix = CalibrationMatrix {
            a: 1,
            b: 0,
            c: 0,
            d: 0,
            e: 1,
            f: 0,
            divisor: 2,
        };
        assert_eq!(translate(raw(3, 1), &matrix), cal(2, 1));
        assert_eq!(translate(raw(2, 4), &matrix), cal(1, 2));
        assert_eq!(div_round(-3, 2), -2);
        assert_eq!(div_round(-1, 4), 0);
    }

    #[test]
    fn test_out_of_range_results_are_clamped() {
        let sample = CalibrationSample::new(
            [raw(10, 10), raw(110, 10), raw(10, 110)],
            [cal(0, 0), cal(100, 0), cal(0, 100)],
        );
        let matrix = compute_matrix(&sample).unwrap();

        // Raw noise just outside the calibrated area
        assert_eq!(translate(raw(2, 5), &matrix), cal(0, 0));

        let bounds = DisplayBounds::new(100, 100);
        assert_eq!(translate_within(raw(400, 60), &matrix, bounds), cal(99, 50));
        assert_eq!(translate_within(raw(0, 0), &matrix, bounds), cal(0, 0));
    }

    #[test]
    fn test_full_range_inputs_do_not_overflow() {
        let sample = CalibrationSample::new(
            [raw(0, 0), raw(u16::MAX, 0), raw(0, u16::MAX)],
            [cal(u16::MAX, u16::MAX), cal(0, u16::MAX), cal(u16::MAX, 0)],
        );
        let matrix = compute_matrix(&sample).unwrap();
        assert_eq!(translate(raw(u16::MAX, u16::MAX), &matrix), cal(0, 0));
        assert_eq!(translate(raw(0, 0), &matrix), cal(u16::MAX, u16::MAX));
    }

    #[test]
    fn test_identity_matrix_passes_through() {
        let matrix = CalibrationMatrix::default();
        assert_eq!(translate(raw(123, 456), &matrix), cal(123, 456));
    }

    #[test]
    fn test_matrix_storage_encoding() {
        let reference = [cal(96, 80), cal(400, 400), cal(720, 240)];
        let matrix =
            compute_matrix(&CalibrationSample::new(reference.map(panel_reading), reference))
                .unwrap();

        let mut buf = [0u8; MAX_ENCODED_MATRIX_LEN];
        let used = matrix.to_slice(&mut buf).unwrap().len();
        assert_eq!(CalibrationMatrix::from_bytes(&buf[..used]), Ok(matrix));
    }

    #[test]
    fn test_restored_matrix_with_huge_coefficients_clamps() {
        let huge = CalibrationMatrix {
            a: i64::MAX / 2,
            b: i64::MIN,
            c: i64::MAX,
            d: i64::MIN / 3,
            e: i64::MAX,
            f: i64::MIN,
            divisor: 1,
        };
        let mut buf = [0u8; MAX_ENCODED_MATRIX_LEN];
        let used = huge.to_slice(&mut buf).unwrap().len();
        let restored = CalibrationMatrix::from_bytes(&buf[..used]).unwrap();

        assert_eq!(translate(raw(4, 0), &restored), cal(u16::MAX, 0));
        assert_eq!(
            translate(raw(u16::MAX, u16::MAX), &restored),
            cal(0, u16::MAX)
        );
        assert_eq!(
            translate_within(raw(4, 0), &restored, DisplayBounds::new(800, 480)),
            cal(799, 0)
        );
    }

    #[test]
    fn test_stored_matrix_with_zero_divisor_is_rejected() {
        let mut zero = CalibrationMatrix::identity();
        zero.divisor = 0;
        let mut buf = [0u8; MAX_ENCODED_MATRIX_LEN];
        let used = zero.to_slice(&mut buf).unwrap().len();
        assert_eq!(
            CalibrationMatrix::from_bytes(&buf[..used]),
            Err(CalibrationError::Encoding)
        );
        assert_eq!(
            CalibrationMatrix::from_bytes(&[0xFF]),
            Err(CalibrationError::Encoding)
        );
    }
}
