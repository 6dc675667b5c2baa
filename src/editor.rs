//! Interactive mask editing.
//!
//! [`MaskEditor`] is a small state machine driven by plain pointer events,
//! independent of any windowing toolkit:
//!
//! - primary button down: `Idle -> Painting`, stamps 255
//! - secondary button down: `Idle -> Erasing`, stamps 0
//! - pointer move while active: stamps along the path since the last point
//! - button up: back to `Idle`
//!
//! The editor owns only its mask. Pipeline runs take a [`MaskEditor::snapshot`].

use image::Luma;
use imageproc::drawing::draw_filled_circle_mut;

use crate::mask::{Mask, MASKED, UNMASKED};

/// Smallest brush radius in pixels.
pub const MIN_BRUSH_RADIUS: u32 = 5;
/// Largest brush radius in pixels.
pub const MAX_BRUSH_RADIUS: u32 = 100;
/// Brush radius of a fresh editor.
pub const DEFAULT_BRUSH_RADIUS: u32 = 15;
/// Radius change per wheel notch.
pub const RADIUS_STEP: i32 = 2;

/// Which pointer button went down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    /// Left / primary button: paint.
    Primary,
    /// Right / secondary button: erase.
    Secondary,
}

/// Value a stroke writes into the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    /// Mark pixels for reconstruction (255).
    Paint,
    /// Restore pixels to "keep original" (0).
    Erase,
}

impl Polarity {
    fn value(self) -> u8 {
        match self {
            Polarity::Paint => MASKED,
            Polarity::Erase => UNMASKED,
        }
    }
}

/// A single circular stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrushStroke {
    /// Center x coordinate (may lie outside the mask).
    pub x: i32,
    /// Center y coordinate (may lie outside the mask).
    pub y: i32,
    /// Radius in pixels, clamped to the brush range when applied.
    pub radius: u32,
    /// Paint or erase.
    pub polarity: Polarity,
}

/// Editor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    /// No button held.
    Idle,
    /// Primary button held.
    Painting,
    /// Secondary button held.
    Erasing,
}

/// Brush-based editor for a binary mask.
#[derive(Debug, Clone)]
pub struct MaskEditor {
    mask: Mask,
    detected: Option<Mask>,
    state: EditorState,
    radius: u32,
    last: Option<(i32, i32)>,
}

impl MaskEditor {
    /// Start with an empty mask of the given size.
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            mask: Mask::new(width, height),
            detected: None,
            state: EditorState::Idle,
            radius: DEFAULT_BRUSH_RADIUS,
            last: None,
        }
    }

    /// Start from an automatically detected mask.
    ///
    /// [`MaskEditor::reset_to_detected`] returns to this mask later.
    #[must_use]
    pub fn from_detected(mask: Mask) -> Self {
        let (w, h) = mask.dimensions();
        Self {
            detected: Some(mask.clone()),
            mask,
            ..Self::new(w, h)
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EditorState {
        self.state
    }

    /// Current brush radius.
    #[must_use]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Set the brush radius, clamped to the allowed range.
    pub fn set_radius(&mut self, radius: u32) {
        self.radius = radius.clamp(MIN_BRUSH_RADIUS, MAX_BRUSH_RADIUS);
    }

    /// Grow (positive) or shrink (negative) the brush by `notches` wheel steps.
    pub fn adjust_radius(&mut self, notches: i32) {
        let target = i64::from(self.radius) + i64::from(notches) * i64::from(RADIUS_STEP);
        let clamped = target.clamp(i64::from(MIN_BRUSH_RADIUS), i64::from(MAX_BRUSH_RADIUS));
        self.radius = u32::try_from(clamped).unwrap_or(DEFAULT_BRUSH_RADIUS);
    }

    /// Borrow the mask being edited.
    #[must_use]
    pub fn mask(&self) -> &Mask {
        &self.mask
    }

    /// Immutable copy of the current mask for a pipeline run.
    #[must_use]
    pub fn snapshot(&self) -> Mask {
        self.mask.clone()
    }

    /// Button pressed at `(x, y)`; starts a stroke and stamps once.
    pub fn pointer_down(&mut self, button: PointerButton, x: i32, y: i32) {
        self.state = match button {
            PointerButton::Primary => EditorState::Painting,
            PointerButton::Secondary => EditorState::Erasing,
        };
        self.last = Some((x, y));
        if let Some(polarity) = self.polarity() {
            self.apply_stroke(BrushStroke {
                x,
                y,
                radius: self.radius,
                polarity,
            });
        }
    }

    /// Pointer moved to `(x, y)`; stamps along the path while a button is held.
    ///
    /// Only the part of the path whose brush can reach the mask is stamped.
    pub fn pointer_move(&mut self, x: i32, y: i32) {
        let Some(polarity) = self.polarity() else {
            return;
        };
        let (x0, y0) = self.last.unwrap_or((x, y));
        self.last = Some((x, y));

        let from = (f64::from(x0), f64::from(y0));
        let delta = (f64::from(x) - from.0, f64::from(y) - from.1);
        let Some((t0, t1)) = self.reachable_span(from, delta) else {
            return;
        };

        let visible = delta.0.hypot(delta.1) * (t1 - t0);
        let spacing = f64::from((self.radius / 2).max(1));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let steps = ((visible / spacing).ceil() as u32).max(1);

        for i in 0..=steps {
            let t = t0 + (t1 - t0) * f64::from(i) / f64::from(steps);
            #[allow(clippy::cast_possible_truncation)]
            let (px, py) = (
                (from.0 + delta.0 * t).round() as i32,
                (from.1 + delta.1 * t).round() as i32,
            );
            self.apply_stroke(BrushStroke {
                x: px,
                y: py,
                radius: self.radius,
                polarity,
            });
        }
    }

    /// Parameter range `[t0, t1]` of the segment `from + t * delta` that lies
    /// within one brush radius of the mask, or `None` if it never does.
    fn reachable_span(&self, from: (f64, f64), delta: (f64, f64)) -> Option<(f64, f64)> {
        let r = f64::from(self.radius);
        let (w, h) = self.mask.dimensions();
        let axes = [
            (from.0, delta.0, -r, f64::from(w) - 1.0 + r),
            (from.1, delta.1, -r, f64::from(h) - 1.0 + r),
        ];

        let (mut t0, mut t1) = (0.0_f64, 1.0_f64);
        for (p, d, lo, hi) in axes {
            if d.abs() < f64::EPSILON {
                if p < lo || p > hi {
                    return None;
                }
                continue;
            }
            let (a, b) = ((lo - p) / d, (hi - p) / d);
            t0 = t0.max(a.min(b));
            t1 = t1.min(a.max(b));
            if t0 > t1 {
                return None;
            }
        }
        Some((t0, t1))
    }

    /// Button released; returns to idle.
    pub fn pointer_up(&mut self) {
        self.state = EditorState::Idle;
        self.last = None;
    }

    /// Stamp a filled circle into the mask.
    ///
    /// The radius is clamped to the brush range. Stamps whose disc lies
    /// entirely outside the mask are ignored.
    pub fn apply_stroke(&mut self, stroke: BrushStroke) {
        let radius = stroke.radius.clamp(MIN_BRUSH_RADIUS, MAX_BRUSH_RADIUS);
        let (w, h) = self.mask.dimensions();
        let reach = i64::from(radius);
        let (cx, cy) = (i64::from(stroke.x), i64::from(stroke.y));
        let outside = cx + reach < 0
            || cy + reach < 0
            || cx - reach >= i64::from(w)
            || cy - reach >= i64::from(h);
        if outside {
            return;
        }

        draw_filled_circle_mut(
            self.mask.buffer_mut(),
            (stroke.x, stroke.y),
            i32::try_from(radius).unwrap_or(0),
            Luma([stroke.polarity.value()]),
        );
    }

    /// Clear the mask to all-zero.
    pub fn reset(&mut self) {
        let (w, h) = self.mask.dimensions();
        self.mask = Mask::new(w, h);
        self.pointer_up();
    }

    /// Synonym for [`MaskEditor::reset`].
    pub fn clear(&mut self) {
        self.reset();
    }

    /// Return to the automatically detected mask, or clear if there is none.
    pub fn reset_to_detected(&mut self) {
        match &self.detected {
            Some(detected) => {
                self.mask = detected.clone();
                self.pointer_up();
            }
            None => self.reset(),
        }
    }

    fn polarity(&self) -> Option<Polarity> {
        match self.state {
            EditorState::Idle => None,
            EditorState::Painting => Some(Polarity::Paint),
            EditorState::Erasing => Some(Polarity::Erase),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle_with_default_radius() {
        let editor = MaskEditor::new(50, 50);
        assert_eq!(editor.state(), EditorState::Idle);
        assert_eq!(editor.radius(), DEFAULT_BRUSH_RADIUS);
        assert!(editor.mask().is_empty());
    }

    #[test]
    fn primary_paints_and_secondary_erases() {
        let mut editor = MaskEditor::new(100, 100);
        editor.set_radius(10);

        editor.pointer_down(PointerButton::Primary, 50, 50);
        assert_eq!(editor.state(), EditorState::Painting);
        assert!(editor.mask().is_masked(50, 50));
        assert!(editor.mask().is_masked(58, 50));
        assert!(!editor.mask().is_masked(70, 50));
        editor.pointer_up();
        assert_eq!(editor.state(), EditorState::Idle);

        editor.set_radius(5);
        editor.pointer_down(PointerButton::Secondary, 50, 50);
        assert_eq!(editor.state(), EditorState::Erasing);
        assert!(!editor.mask().is_masked(50, 50));
        assert!(editor.mask().is_masked(58, 50));
        editor.pointer_up();
    }

    #[test]
    fn drag_leaves_no_gaps() {
        let mut editor = MaskEditor::new(200, 50);
        editor.set_radius(5);
        editor.pointer_down(PointerButton::Primary, 10, 25);
        editor.pointer_move(190, 25);
        editor.pointer_up();
        for x in 10..=190 {
            assert!(editor.mask().is_masked(x, 25), "gap at x={x}");
        }
    }

    #[test]
    fn moves_while_idle_do_nothing() {
        let mut editor = MaskEditor::new(40, 40);
        editor.pointer_move(20, 20);
        assert!(editor.mask().is_empty());
    }

    #[test]
    fn radius_is_clamped() {
        let mut editor = MaskEditor::new(10, 10);
        editor.set_radius(1);
        assert_eq!(editor.radius(), MIN_BRUSH_RADIUS);
        editor.set_radius(500);
        assert_eq!(editor.radius(), MAX_BRUSH_RADIUS);
        editor.adjust_radius(3);
        assert_eq!(editor.radius(), MAX_BRUSH_RADIUS);
        editor.adjust_radius(-2);
        assert_eq!(editor.radius(), MAX_BRUSH_RADIUS - 4);
        editor.adjust_radius(-1000);
        assert_eq!(editor.radius(), MIN_BRUSH_RADIUS);
    }

    #[test]
    fn strokes_outside_the_mask_are_clipped() {
        let mut editor = MaskEditor::new(20, 20);
        editor.apply_stroke(BrushStroke {
            x: -3,
            y: -3,
            radius: 6,
            polarity: Polarity::Paint,
        });
        assert!(editor.mask().is_masked(0, 0));
        assert_eq!(editor.mask().dimensions(), (20, 20));
    }

    #[test]
    fn reset_and_reset_to_detected() {
        let mut detected = Mask::new(30, 30);
        detected.set(5, 5, true);
        let mut editor = MaskEditor::from_detected(detected.clone());
        editor.pointer_down(PointerButton::Primary, 20, 20);
        editor.pointer_up();
        assert!(editor.mask().count() > 1);

        editor.reset_to_detected();
        assert_eq!(editor.mask(), &detected);

        editor.clear();
        assert!(editor.mask().is_empty());
    }

    #[test]
    fn snapshot_is_independent_of_later_edits() {
        let mut editor = MaskEditor::new(30, 30);
        let before = editor.snapshot();
        editor.pointer_down(PointerButton::Primary, 15, 15);
        assert!(before.is_empty());
        assert!(!editor.mask().is_empty());
    }

    #[test]
    fn oversized_stroke_radius_is_clamped() {
        let mut editor = MaskEditor::new(300, 300);
        editor.apply_stroke(BrushStroke {
            x: 150,
            y: 150,
            radius: 2_000_000_000,
            polarity: Polarity::Paint,
        });
        assert!(editor.mask().is_masked(150, 150));
        assert!(editor.mask().is_masked(240, 150));
        assert!(!editor.mask().is_masked(260, 150));
        assert!(!editor.mask().is_masked(0, 0));
    }

    #[test]
    fn extreme_pointer_coordinates_are_clipped() {
        let mut editor = MaskEditor::new(50, 50);
        editor.pointer_down(PointerButton::Primary, i32::MIN, 25);
        editor.pointer_move(i32::MAX, 25);
        editor.pointer_up();
        for x in 0..50 {
            assert!(editor.mask().is_masked(x, 25), "gap at x={x}");
        }

        editor.reset();
        editor.pointer_down(PointerButton::Primary, i32::MIN, i32::MIN);
        editor.pointer_move(i32::MIN, i32::MAX);
        editor.pointer_move(-1000, 5000);
        editor.pointer_up();
        assert!(editor.mask().is_empty());
    }
}
