//! Fast-marching inpainting.
//!
//! Masked pixels are filled in order of their distance from the mask boundary.
//! A narrow band starts on the known pixels touching the mask and advances
//! inward; each pixel is estimated from already-known neighbors within a
//! sampling radius, weighted by:
//! - **direction**: alignment with the marching normal (extends isophotes)
//! - **distance**: inverse squared distance
//! - **level**: similarity of arrival time
//!
//! Each contribution is extrapolated along the neighbor's color gradient.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::RgbImage;

use crate::mask::{Mask, MASKED};

/// Arrival time assigned to pixels the front has not reached.
const FAR: f32 = 1.0e6;

/// Direction weights at or below this are replaced by [`MIN_DIRECTION`].
const DIRECTION_FLOOR: f32 = 0.01;
const MIN_DIRECTION: f32 = 1.0e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Known,
    Band,
    Inside,
}

/// Heap entry ordered so that `BinaryHeap` pops the smallest arrival time.
#[derive(Debug, Clone, Copy)]
struct Front {
    time: f32,
    index: usize,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Front {}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .time
            .total_cmp(&self.time)
            .then_with(|| other.index.cmp(&self.index))
    }
}

struct Field {
    width: usize,
    height: usize,
    state: Vec<State>,
    time: Vec<f32>,
    color: Vec<[f32; 3]>,
}

impl Field {
    fn new(image: &RgbImage, mask: &Mask) -> Self {
        let width = image.width() as usize;
        let height = image.height() as usize;
        let mut state = Vec::with_capacity(width * height);
        let mut time = Vec::with_capacity(width * height);
        for &m in mask.as_raw() {
            if m == MASKED {
                state.push(State::Inside);
                time.push(FAR);
            } else {
                state.push(State::Known);
                time.push(0.0);
            }
        }
        let color = image
            .pixels()
            .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
            .collect();
        Self {
            width,
            height,
            state,
            time,
            color,
        }
    }

    /// Up, down, left, right neighbors that lie inside the image.
    fn neighbors4(&self, index: usize) -> [Option<usize>; 4] {
        let (x, y) = (index % self.width, index / self.width);
        [
            (y > 0).then(|| index - self.width),
            (y + 1 < self.height).then(|| index + self.width),
            (x > 0).then(|| index - 1),
            (x + 1 < self.width).then(|| index + 1),
        ]
    }

    fn reached(&self, index: usize) -> bool {
        self.state[index] != State::Inside
    }

    fn reached_time(&self, index: Option<usize>) -> Option<f32> {
        index.filter(|&i| self.reached(i)).map(|i| self.time[i])
    }

    /// Arrival time of `index` from its reached neighbors (first-order eikonal).
    fn arrival_time(&self, index: usize) -> f32 {
        let [up, down, left, right] = self.neighbors4(index).map(|n| self.reached_time(n));
        [
            solve(up, left),
            solve(up, right),
            solve(down, left),
            solve(down, right),
        ]
        .into_iter()
        .fold(FAR, f32::min)
    }

    /// Central (or one-sided) difference of arrival time at `index`.
    fn time_gradient(&self, index: usize) -> (f32, f32) {
        let [up, down, left, right] = self.neighbors4(index).map(|n| self.reached_time(n));
        let t = self.time[index];
        let diff = |lo: Option<f32>, hi: Option<f32>| match (lo, hi) {
            (Some(a), Some(b)) => (b - a) * 0.5,
            (None, Some(b)) => b - t,
            (Some(a), None) => t - a,
            (None, None) => 0.0,
        };
        (diff(left, right), diff(up, down))
    }

    /// Color gradient at a reached pixel, using only reached neighbors.
    fn color_gradient(&self, index: usize) -> [(f32, f32); 3] {
        let [up, down, left, right] = self
            .neighbors4(index)
            .map(|n| n.filter(|&i| self.reached(i)));
        let here = self.color[index];
        let mut grad = [(0.0, 0.0); 3];
        for (c, g) in grad.iter_mut().enumerate() {
            let diff = |lo: Option<usize>, hi: Option<usize>| match (lo, hi) {
                (Some(a), Some(b)) => (self.color[b][c] - self.color[a][c]) * 0.5,
                (None, Some(b)) => self.color[b][c] - here[c],
                (Some(a), None) => here[c] - self.color[a][c],
                (None, None) => 0.0,
            };
            *g = (diff(left, right), diff(up, down));
        }
        grad
    }

    /// Estimate the color of `index` from its neighborhood.
    fn estimate(&self, index: usize, radius: usize, prior_weight: f32) -> Option<[f32; 3]> {
        let (x, y) = (index % self.width, index / self.width);
        let (gtx, gty) = self.time_gradient(index);
        let gnorm = (gtx * gtx + gty * gty).sqrt();
        let normal = if gnorm > 0.0 {
            (gtx / gnorm, gty / gnorm)
        } else {
            (0.0, 0.0)
        };
        let t = self.time[index];
        #[allow(clippy::cast_precision_loss)]
        let limit = (radius * radius) as f32;

        let mut acc = [0.0_f32; 3];
        let mut total = 0.0_f32;

        for ny in y.saturating_sub(radius)..=(y + radius).min(self.height - 1) {
            for nx in x.saturating_sub(radius)..=(x + radius).min(self.width - 1) {
                let n = ny * self.width + nx;
                if n == index {
                    continue;
                }
                #[allow(clippy::cast_precision_loss)]
                let (rx, ry) = (x as f32 - nx as f32, y as f32 - ny as f32);
                let len2 = rx * rx + ry * ry;
                if len2 > limit {
                    continue;
                }

                if !self.reached(n) {
                    // Unreached pixels carry the previous pass's estimate.
                    if prior_weight > 0.0 {
                        let w = prior_weight / len2;
                        for (a, v) in acc.iter_mut().zip(self.color[n]) {
                            *a += w * v;
                        }
                        total += w;
                    }
                    continue;
                }

                let len = len2.sqrt();
                let mut direction = ((rx * normal.0 + ry * normal.1) / len).abs();
                if direction <= DIRECTION_FLOOR {
                    direction = MIN_DIRECTION;
                }
                let distance = 1.0 / len2;
                let level = 1.0 / (1.0 + (self.time[n] - t).abs());
                let w = direction * distance * level;

                let grad = self.color_gradient(n);
                for ((a, (gx, gy)), v) in acc.iter_mut().zip(grad).zip(self.color[n]) {
                    *a += w * (v + gx * rx + gy * ry);
                }
                total += w;
            }
        }

        (total > 0.0).then(|| acc.map(|a| a / total))
    }
}

/// Eikonal update from two orthogonal neighbors.
fn solve(a: Option<f32>, b: Option<f32>) -> f32 {
    match (a, b) {
        (Some(t1), Some(t2)) => {
            let d = t1 - t2;
            let r2 = 2.0 - d * d;
            if r2 > 0.0 {
                let s = (t1 + t2 + r2.sqrt()) * 0.5;
                if s >= t1 && s >= t2 {
                    return s;
                }
            }
            1.0 + t1.min(t2)
        }
        (Some(t), None) | (None, Some(t)) => 1.0 + t,
        (None, None) => FAR,
    }
}

/// Fill the masked pixels of `image` by fast marching.
///
/// `radius` is the sampling radius in pixels. When `prior_weight` is positive,
/// masked pixels not yet reached by the front still contribute their current
/// color with that relative weight; this lets a refinement pass build on an
/// earlier fill instead of discarding it.
///
/// Pixels outside the mask are returned unchanged. If the mask leaves no known
/// pixel at all, the image is returned as is.
#[must_use]
pub fn inpaint(image: &RgbImage, mask: &Mask, radius: u32, prior_weight: f32) -> RgbImage {
    let mut field = Field::new(image, mask);
    let radius = radius.max(1) as usize;
    let mut heap = BinaryHeap::new();

    for index in 0..field.state.len() {
        if field.state[index] == State::Known
            && field
                .neighbors4(index)
                .into_iter()
                .flatten()
                .any(|n| field.state[n] == State::Inside)
        {
            field.state[index] = State::Band;
            heap.push(Front { time: 0.0, index });
        }
    }

    while let Some(Front { index, .. }) = heap.pop() {
        if field.state[index] == State::Known {
            continue;
        }
        field.state[index] = State::Known;

        for n in field.neighbors4(index).into_iter().flatten() {
            match field.state[n] {
                State::Known => {}
                State::Band => {
                    let time = field.arrival_time(n);
                    if time < field.time[n] {
                        field.time[n] = time;
                        heap.push(Front { time, index: n });
                    }
                }
                State::Inside => {
                    field.time[n] = field.arrival_time(n);
                    field.state[n] = State::Band;
                    if let Some(color) = field.estimate(n, radius, prior_weight) {
                        field.color[n] = color;
                    }
                    heap.push(Front {
                        time: field.time[n],
                        index: n,
                    });
                }
            }
        }
    }

    let mut out = image.clone();
    for ((px, &m), color) in out.pixels_mut().zip(mask.as_raw()).zip(&field.color) {
        if m == MASKED {
            for (ch, v) in px.0.iter_mut().zip(color) {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    *ch = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn square_mask(w: u32, h: u32, x0: u32, y0: u32, size: u32) -> Mask {
        let mut mask = Mask::new(w, h);
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                mask.set(x, y, true);
            }
        }
        mask
    }

    #[test]
    fn heap_pops_smallest_time_first() {
        let mut heap = BinaryHeap::new();
        heap.push(Front { time: 3.0, index: 0 });
        heap.push(Front { time: 1.0, index: 1 });
        heap.push(Front { time: 2.0, index: 2 });
        assert_eq!(heap.pop().unwrap().index, 1);
        assert_eq!(heap.pop().unwrap().index, 2);
        assert_eq!(heap.pop().unwrap().index, 0);
    }

    #[test]
    fn solve_single_and_pair() {
        assert!((solve(Some(0.0), None) - 1.0).abs() < 1e-6);
        assert!((solve(None, None) - FAR).abs() < 1.0);
        // Two equal neighbors give the diagonal update 1/sqrt(2).
        let s = solve(Some(0.0), Some(0.0));
        assert!((s - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[test]
    fn fills_uniform_region_with_surrounding_color() {
        let mut img = RgbImage::from_pixel(40, 40, Rgb([100, 150, 200]));
        let mask = square_mask(40, 40, 15, 15, 10);
        for y in 15..25 {
            for x in 15..25 {
                img.put_pixel(x, y, Rgb([255, 255, 255]));
            }
        }
        let out = inpaint(&img, &mask, 3, 0.0);
        for y in 15..25 {
            for x in 15..25 {
                let px = out.get_pixel(x, y);
                assert_eq!(px, &Rgb([100, 150, 200]), "pixel ({x},{y})");
            }
        }
    }

    #[test]
    fn unmasked_pixels_are_untouched() {
        let img = RgbImage::from_fn(30, 30, |x, y| {
            #[allow(clippy::cast_possible_truncation)]
            Rgb([(x * 8) as u8, (y * 8) as u8, 77])
        });
        let mask = square_mask(30, 30, 10, 10, 6);
        let out = inpaint(&img, &mask, 3, 0.0);
        for (x, y, px) in out.enumerate_pixels() {
            if !mask.is_masked(x, y) {
                assert_eq!(px, img.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn full_mask_terminates_unchanged() {
        let img = RgbImage::from_pixel(12, 9, Rgb([9, 8, 7]));
        let out = inpaint(&img, &Mask::full(12, 9), 3, 0.0);
        assert_eq!(out, img);
    }

    #[test]
    fn extends_horizontal_gradient() {
        let img = RgbImage::from_fn(40, 20, |x, _| {
            #[allow(clippy::cast_possible_truncation)]
            let v = (x * 5) as u8;
            Rgb([v, v, v])
        });
        let mask = square_mask(40, 20, 18, 6, 6);
        let out = inpaint(&img, &mask, 3, 0.0);
        // Reconstructed values stay within the range of the boundary columns.
        for y in 6..12 {
            for x in 18..24 {
                let v = out.get_pixel(x, y)[0];
                assert!((80..=125).contains(&v), "pixel ({x},{y}) = {v}");
            }
        }
    }
}
