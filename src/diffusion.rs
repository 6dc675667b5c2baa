//! Edge-stopping diffusion inpainting.
//!
//! The hole is first seeded layer by layer from its rim (each layer takes the
//! mean of its already-filled 8-neighbors), then relaxed with Perona-Malik
//! diffusion. Conduction falls off with the local color difference, so strong
//! edges entering the hole are smoothed along rather than across.
//!
//! Known pixels act as a fixed boundary and are never written.

use image::RgbImage;

use crate::mask::{Mask, MASKED};

/// Stop iterating once no channel moves by more than this.
const CONVERGENCE: f32 = 1.0e-3;

struct Grid {
    width: usize,
    height: usize,
    color: Vec<[f32; 3]>,
}

impl Grid {
    fn new(image: &RgbImage) -> Self {
        Self {
            width: image.width() as usize,
            height: image.height() as usize,
            color: image
                .pixels()
                .map(|p| [f32::from(p[0]), f32::from(p[1]), f32::from(p[2])])
                .collect(),
        }
    }

    fn neighbors4(&self, index: usize) -> impl Iterator<Item = usize> {
        let (x, y, w, h) = (index % self.width, index / self.width, self.width, self.height);
        [
            (y > 0).then(|| index - w),
            (y + 1 < h).then(|| index + w),
            (x > 0).then(|| index - 1),
            (x + 1 < w).then(|| index + 1),
        ]
        .into_iter()
        .flatten()
    }

    fn neighbors8(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        let (x, y) = (index % self.width, index / self.width);
        let ys = y.saturating_sub(1)..=(y + 1).min(self.height - 1);
        ys.flat_map(move |ny| {
            (x.saturating_sub(1)..=(x + 1).min(self.width - 1)).map(move |nx| ny * self.width + nx)
        })
        .filter(move |&n| n != index)
    }
}

/// Seed masked pixels from the rim inward. Returns how many were filled.
fn onion_fill(grid: &mut Grid, holes: &[usize], filled: &mut [bool]) -> usize {
    let mut pending: Vec<usize> = holes.to_vec();
    let mut total = 0;

    loop {
        let layer: Vec<(usize, [f32; 3])> = pending
            .iter()
            .filter_map(|&i| {
                let mut sum = [0.0_f32; 3];
                let mut count = 0_u32;
                for n in grid.neighbors8(i).filter(|&n| filled[n]) {
                    for (s, v) in sum.iter_mut().zip(grid.color[n]) {
                        *s += v;
                    }
                    count += 1;
                }
                #[allow(clippy::cast_precision_loss)]
                let count = count as f32;
                (count > 0.0).then(|| (i, sum.map(|s| s / count)))
            })
            .collect();

        if layer.is_empty() {
            break;
        }
        total += layer.len();
        for (i, color) in layer {
            grid.color[i] = color;
            filled[i] = true;
        }
        pending.retain(|&i| !filled[i]);
    }
    total
}

/// Fill the masked pixels of `image` by anisotropic diffusion.
///
/// * `iterations` - Maximum number of relaxation sweeps.
/// * `conductance` - Color difference at which conduction halves.
/// * `step` - Time step per sweep; values above 0.25 are clamped for stability.
///
/// Pixels outside the mask are returned unchanged.
#[must_use]
pub fn inpaint(
    image: &RgbImage,
    mask: &Mask,
    iterations: u32,
    conductance: f32,
    step: f32,
) -> RgbImage {
    let mut grid = Grid::new(image);
    let holes: Vec<usize> = mask
        .as_raw()
        .iter()
        .enumerate()
        .filter(|(_, &m)| m == MASKED)
        .map(|(i, _)| i)
        .collect();

    let mut filled: Vec<bool> = mask.as_raw().iter().map(|&m| m != MASKED).collect();
    onion_fill(&mut grid, &holes, &mut filled);

    let step = step.clamp(0.0, 0.25);
    let k2 = conductance.max(f32::EPSILON).powi(2);
    let mut next = vec![[0.0_f32; 3]; holes.len()];

    for _ in 0..iterations {
        let mut max_change = 0.0_f32;
        for (slot, &i) in next.iter_mut().zip(&holes) {
            let here = grid.color[i];
            let mut flux = [0.0_f32; 3];
            for n in grid.neighbors4(i) {
                let there = grid.color[n];
                let d = [there[0] - here[0], there[1] - here[1], there[2] - here[2]];
                let mag2 = (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]) / 3.0;
                let g = 1.0 / (1.0 + mag2 / k2);
                for (f, dc) in flux.iter_mut().zip(d) {
                    *f += g * dc;
                }
            }
            for ((s, h), f) in slot.iter_mut().zip(here).zip(flux) {
                let delta = step * f;
                max_change = max_change.max(delta.abs());
                *s = h + delta;
            }
        }
        for (value, &i) in next.iter().zip(&holes) {
            grid.color[i] = *value;
        }
        if max_change < CONVERGENCE {
            break;
        }
    }

    let mut out = image.clone();
    for &i in &holes {
        #[allow(clippy::cast_possible_truncation)]
        let (x, y) = ((i % grid.width) as u32, (i / grid.width) as u32);
        let px = out.get_pixel_mut(x, y);
        for (ch, v) in px.0.iter_mut().zip(grid.color[i]) {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                *ch = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}
