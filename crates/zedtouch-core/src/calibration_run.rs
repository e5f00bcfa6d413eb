//! Interactive three-point calibration as a resumable state machine.
//!
//! The main loop is cooperative, so collecting the three touches cannot block.
//! Instead a [`CalibrationRun`] is fed one queued touch event at a time and
//! advances through its phases:
//!
//! ```text
//! AwaitingPoint1 -> AwaitingPoint2 -> AwaitingPoint3 -> Computing -> Done
//!                                                               \-> Failed
//! ```
//!
//! Each point is the average of the samples of one press, committed when the
//! finger is lifted. The external UI asks [`CalibrationRun::current_target`]
//! where to draw the next marker.

use embedded_graphics::{
    draw_target::DrawTarget,
    pixelcolor::RgbColor,
    prelude::*,
    primitives::{Line, PrimitiveStyle},
};
use heapless::Vec;
use log::debug;

use crate::calibration::{CalibrationError, CalibrationMatrix, CalibrationSample, compute_matrix};
use crate::coords::{CalibratedPosition, DisplayBounds, RawPosition};
use crate::event::TouchEvent;

/// Half length of each arm of the calibration crosshair, in pixels
const MARKER_ARM: i32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationPhase {
    AwaitingPoint1,
    AwaitingPoint2,
    AwaitingPoint3,
    /// All three points captured, matrix not yet solved
    Computing,
    Done(CalibrationMatrix),
    Failed(CalibrationError),
}

impl CalibrationPhase {
    /// Index of the reference point being collected, if any
    pub const fn point_index(&self) -> Option<usize> {
        match self {
            Self::AwaitingPoint1 => Some(0),
            Self::AwaitingPoint2 => Some(1),
            Self::AwaitingPoint3 => Some(2),
            _ => None,
        }
    }

    const fn after_capture(captured: usize) -> Self {
        match captured {
            0 => Self::AwaitingPoint1,
            1 => Self::AwaitingPoint2,
            2 => Self::AwaitingPoint3,
            _ => Self::Computing,
        }
    }
}

/// Running average of the samples of a single press
#[derive(Debug, Default, Clone, Copy)]
struct PressAccumulator {
    sum_x: u32,
    sum_y: u32,
    count: u16,
}

impl PressAccumulator {
    fn add(&mut self, position: RawPosition) {
        // Sums cannot overflow u32 below u16::MAX samples
        if self.count < u16::MAX {
            self.sum_x += position.x as u32;
            self.sum_y += position.y as u32;
            self.count += 1;
        }
    }

    /// Average of the press, if it lasted at least `min_samples`. Resets.
    fn take_average(&mut self, min_samples: u16) -> Option<RawPosition> {
        let press = core::mem::take(self);
        if press.count == 0 || press.count < min_samples {
            return None;
        }
        let count = press.count as u32;
        Some(RawPosition::new(
            ((press.sum_x + count / 2) / count) as u16,
            ((press.sum_y + count / 2) / count) as u16,
        ))
    }
}

#[derive(Debug, Clone)]
pub struct CalibrationRun {
    reference: [CalibratedPosition; 3],
    captured: Vec<RawPosition, 3>,
    press: PressAccumulator,
    min_samples: u16,
    phase: CalibrationPhase,
}

impl CalibrationRun {
    pub fn new(reference: [CalibratedPosition; 3], min_samples: u16) -> Self {
        Self {
            reference,
            captured: Vec::new(),
            press: PressAccumulator::default(),
            min_samples: min_samples.max(1),
            phase: CalibrationPhase::AwaitingPoint1,
        }
    }

    pub fn phase(&self) -> CalibrationPhase {
        self.phase
    }

    pub fn reference_points(&self) -> [CalibratedPosition; 3] {
        self.reference
    }

    /// Raw points committed so far
    pub fn captured(&self) -> &[RawPosition] {
        &self.captured
    }

    /// Display point the user should touch next
    pub fn current_target(&self) -> Option<CalibratedPosition> {
        self.phase.point_index().map(|i| self.reference[i])
    }

    /// Feed one touch event. Events are ignored once all points are captured.
    pub fn feed(&mut self, event: &TouchEvent) -> CalibrationPhase {
        let Some(index) = self.phase.point_index() else {
            return self.phase;
        };

        if !event.is_release() {
            self.press.add(event.location);
            return self.phase;
        }

        if let Some(point) = self.press.take_average(self.min_samples)
            && self.captured.push(point).is_ok()
        {
            debug!(
                "calibration point {} captured: raw {:?} for display {:?}",
                index + 1,
                point,
                self.reference[index]
            );
            self.phase = CalibrationPhase::after_capture(self.captured.len());
        }
        self.phase
    }

    /// Solve the matrix once all three points are in.
    ///
    /// Returns `None` unless the run is in [`CalibrationPhase::Computing`].
    pub fn complete(&mut self) -> Option<Result<CalibrationMatrix, CalibrationError>> {
        if self.phase != CalibrationPhase::Computing {
            return None;
        }
        let Ok(raw) = <[RawPosition; 3]>::try_from(self.captured.as_slice()) else {
            self.restart();
            return None;
        };

        let result = compute_matrix(&CalibrationSample::new(raw, self.reference));
        self.phase = match result {
            Ok(matrix) => CalibrationPhase::Done(matrix),
            Err(e) => CalibrationPhase::Failed(e),
        };
        Some(result)
    }

    /// Discard captured points and wait for the first point again
    pub fn restart(&mut self) {
        self.captured.clear();
        self.press = PressAccumulator::default();
        self.phase = CalibrationPhase::AwaitingPoint1;
    }
}

/// Smallest width and height laid out on the quarter grid
pub const MIN_GRID_EXTENT: u16 = 4;

// Three well spread, non-collinear targets on a quarter grid of the display.
//
// +-------+-------+-------+-------+
// |       |       |       |       |
// +-------a-------+-------+-------+
// |       |       |       |       |
// +-------+-------+-------c-------+
// |       |       |       |       |
// +-------+-------b-------+-------+
// |       |       |       |       |
// +-------+-------+-------+-------+
//
/// Calibration targets for a display.
///
/// Displays narrower or shorter than [`MIN_GRID_EXTENT`] have no usable quarter
/// grid and get three corners instead. A display one pixel wide or high has no
/// three non-collinear points, so calibrating it always fails as
/// [`Degenerate`](CalibrationError::Degenerate).
pub fn reference_points(bounds: DisplayBounds) -> [CalibratedPosition; 3] {
    if bounds.width < MIN_GRID_EXTENT || bounds.height < MIN_GRID_EXTENT {
        let right = bounds.width.saturating_sub(1);
        let bottom = bounds.height.saturating_sub(1);
        return [
            CalibratedPosition::new(0, 0),
            CalibratedPosition::new(right, bottom),
            CalibratedPosition::new(right, 0),
        ];
    }

    let x = bounds.width / 4;
    let y = bounds.height / 4;
    [
        CalibratedPosition::new(x, y),
        CalibratedPosition::new(2 * x, 3 * y),
        CalibratedPosition::new(3 * x, 2 * y),
    ]
}

/// Clear the target and draw a crosshair at `point`.
pub fn draw_calibration_marker<DT>(
    draw_target: &mut DT,
    point: CalibratedPosition,
) -> Result<(), DT::Error>
where
    DT: DrawTarget<Color: RgbColor>,
{
    draw_target.clear(DT::Color::BLACK)?;

    let center = point.to_point();
    let style = PrimitiveStyle::with_stroke(DT::Color::WHITE, 1);
    Line::new(
        Point::new(center.x - MARKER_ARM, center.y),
        Point::new(center.x + MARKER_ARM, center.y),
    )
    .into_styled(style)
    .draw(draw_target)?;
    Line::new(
        Point::new(center.x, center.y - MARKER_ARM),
        Point::new(center.x, center.y + MARKER_ARM),
    )
    .into_styled(style)
    .draw(draw_target)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::translate;
    use crate::event::Gesture;
    use embedded_graphics::mock_display::MockDisplay;
    use embedded_graphics::pixelcolor::Rgb565;

    fn touch(x: u16, y: u16) -> TouchEvent {
        TouchEvent::new(Gesture::None, 1, RawPosition::new(x, y))
    }

    fn release() -> TouchEvent {
        TouchEvent::new(Gesture::None, 0, RawPosition::default())
    }

    fn press(run: &mut CalibrationRun, samples: &[(u16, u16)]) -> CalibrationPhase {
        for &(x, y) in samples {
            run.feed(&touch(x, y));
        }
        run.feed(&release())
    }

    fn square_reference() -> [CalibratedPosition; 3] {
        [
            CalibratedPosition::new(0, 0),
            CalibratedPosition::new(100, 0),
            CalibratedPosition::new(0, 100),
        ]
    }

    #[test]
    fn test_three_presses_reach_computing() {
        let mut run = CalibrationRun::new(square_reference(), 1);
        assert_eq!(run.current_target(), Some(CalibratedPosition::new(0, 0)));

        assert_eq!(press(&mut run, &[(10, 10)]), CalibrationPhase::AwaitingPoint2);
        assert_eq!(run.current_target(), Some(CalibratedPosition::new(100, 0)));
        assert_eq!(press(&mut run, &[(110, 10)]), CalibrationPhase::AwaitingPoint3);
        assert_eq!(press(&mut run, &[(10, 110)]), CalibrationPhase::Computing);
        assert_eq!(run.current_target(), None);

        let matrix = run.complete().unwrap().unwrap();
        assert_eq!(run.phase(), CalibrationPhase::Done(matrix));
        assert_eq!(
            translate(RawPosition::new(60, 60), &matrix),
            CalibratedPosition::new(50, 50)
        );
    }

    #[test]
    fn test_press_samples_are_averaged() {
        let mut run = CalibrationRun::new(square_reference(), 1);
        press(&mut run, &[(8, 9), (10, 10), (12, 12)]);
        assert_eq!(run.captured(), &[RawPosition::new(10, 10)]);
    }

    #[test]
    fn test_short_press_is_ignored() {
        let mut run = CalibrationRun::new(square_reference(), 3);
        assert_eq!(press(&mut run, &[(10, 10), (10, 10)]), CalibrationPhase::AwaitingPoint1);
        assert!(run.captured().is_empty());

        // A bare release with no samples does not count either
        assert_eq!(run.feed(&release()), CalibrationPhase::AwaitingPoint1);

        assert_eq!(
            press(&mut run, &[(10, 10), (10, 10), (10, 10)]),
            CalibrationPhase::AwaitingPoint2
        );
    }

    #[test]
    fn test_collinear_presses_fail_and_restart() {
        let mut run = CalibrationRun::new(square_reference(), 1);
        press(&mut run, &[(10, 10)]);
        press(&mut run, &[(20, 20)]);
        press(&mut run, &[(30, 30)]);

        assert_eq!(run.complete(), Some(Err(CalibrationError::Degenerate)));
        assert_eq!(run.phase(), CalibrationPhase::Failed(CalibrationError::Degenerate));

        // Further touches are ignored until restarted
        assert_eq!(
            press(&mut run, &[(50, 50)]),
            CalibrationPhase::Failed(CalibrationError::Degenerate)
        );

        run.restart();
        assert_eq!(run.phase(), CalibrationPhase::AwaitingPoint1);
        assert!(run.captured().is_empty());
    }

    #[test]
    fn test_complete_before_all_points_is_none() {
        let mut run = CalibrationRun::new(square_reference(), 1);
        press(&mut run, &[(10, 10)]);
        assert_eq!(run.complete(), None);
        assert_eq!(run.phase(), CalibrationPhase::AwaitingPoint2);
    }

    #[test]
    fn test_reference_points_on_quarter_grid() {
        let points = reference_points(DisplayBounds::new(800, 480));
        assert_eq!(
            points,
            [
                CalibratedPosition::new(200, 120),
                CalibratedPosition::new(400, 360),
                CalibratedPosition::new(600, 240),
            ]
        );
    }

    #[test]
    fn test_small_displays_get_solvable_targets() {
        for (width, height) in [(4, 4), (3, 3), (2, 2), (2, 600), (800, 3)] {
            let reference = reference_points(DisplayBounds::new(width, height));
            let raw = reference.map(|p| RawPosition::new(p.x, p.y));
            let matrix = compute_matrix(&CalibrationSample::new(raw, reference));
            assert!(matrix.is_ok(), "{}x{}: {:?}", width, height, reference);
        }
    }

    #[test]
    fn test_single_pixel_display_cannot_calibrate() {
        let reference = reference_points(DisplayBounds::new(1, 480));
        let raw = reference.map(|p| RawPosition::new(p.x, p.y));
        assert_eq!(
            compute_matrix(&CalibrationSample::new(raw, reference)),
            Err(CalibrationError::Degenerate)
        );
    }

    #[test]
    fn test_draw_calibration_marker() {
        let mut display: MockDisplay<Rgb565> = MockDisplay::new();
        display.set_allow_overdraw(true);

        draw_calibration_marker(&mut display, CalibratedPosition::new(20, 30)).unwrap();

        assert_eq!(display.get_pixel(Point::new(20, 30)), Some(Rgb565::WHITE));
        assert_eq!(
            display.get_pixel(Point::new(20 + MARKER_ARM, 30)),
            Some(Rgb565::WHITE)
        );
        assert_eq!(
            display.get_pixel(Point::new(20, 30 - MARKER_ARM)),
            Some(Rgb565::WHITE)
        );
        assert_eq!(display.get_pixel(Point::new(25, 35)), Some(Rgb565::BLACK));
    }
}
