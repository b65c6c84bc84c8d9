use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;

use crate::geometry::{Fp, Vec3f};
use crate::integrator::shade;
use crate::scene::Scene;

/// Smallest run of consecutive pixels handed to one worker at a time.
const PIXELS_PER_TASK: usize = 8;

const GAMMA: Fp = 2.2;

/// ACES filmic curve (Narkowicz fit), clamped to `[0, 1]`.
pub fn aces_tonemap(color: &Vec3f) -> Vec3f {
    const A: Fp = 2.51;
    const B: Fp = 0.03;
    const C: Fp = 2.43;
    const D: Fp = 0.59;
    const E: Fp = 0.14;
    color.map(|x| ((x * (A * x + B)) / (x * (C * x + D) + E)).clamp(0.0, 1.0))
}

pub fn gamma_corrected(color: &Vec3f) -> Vec3f {
    color.map(|x| x.powf(1.0 / GAMMA))
}

pub fn to_extern_color_format(color: &Vec3f) -> [u8; 3] {
    let quantize = |x: Fp| (x * 255.0).round().clamp(0.0, 255.0) as u8;
    [quantize(color.x), quantize(color.y), quantize(color.z)]
}

/// Display bytes for linear radiance: tone mapping, gamma, quantization.
pub fn radiance_to_bytes(radiance: &Vec3f) -> [u8; 3] {
    to_extern_color_format(&gamma_corrected(&aces_tonemap(radiance)))
}

/// Pixel `index` in row-major order, with a generator seeded by the index
/// alone so the result does not depend on scheduling.
pub fn render_pixel(scene: &Scene, index: usize) -> [u8; 3] {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(index as u64);
    let width = scene.width as usize;
    let x = (index % width) as u32;
    let y = (index / width) as u32;
    radiance_to_bytes(&shade(scene, &mut rng, x, y))
}

/// Renders every pixel on the current rayon pool and returns the RGB bytes
/// row by row, top to bottom.
pub fn render_scene(scene: &Scene, show_progress: bool) -> Vec<u8> {
    let pixel_count = scene.width as usize * scene.height as usize;
    let progress = if show_progress {
        let bar = ProgressBar::new(pixel_count as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{elapsed_precise} [{wide_bar}] {pos}/{len} pixels, eta {eta}",
        ) {
            bar.set_style(style);
        }
        bar
    } else {
        ProgressBar::hidden()
    };
    let pixels: Vec<[u8; 3]> = (0..pixel_count)
        .into_par_iter()
        .with_min_len(PIXELS_PER_TASK)
        .map(|index| render_pixel(scene, index))
        .progress_with(progress.clone())
        .collect();
    progress.finish_and_clear();
    pixels.into_iter().flatten().collect()
}
