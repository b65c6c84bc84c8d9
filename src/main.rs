mod aabb;
mod bvh;
mod distributions;
mod geometry;
mod integrator;
mod rendering;
mod scene;
mod utils;

#[cfg(test)]
mod tests;

extern crate nalgebra as na;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context};
use clap::Parser;
use image::{ImageFormat, RgbImage};

use crate::rendering::render_scene;
use crate::scene::Scene;

/// Offline Monte Carlo path tracer for line-oriented scene descriptions.
#[derive(Parser, Debug)]
#[command(name = "raytracing-engine", version)]
struct Cli {
    /// Scene description to render
    scene: PathBuf,

    /// Output image, binary PPM (P6)
    output: PathBuf,

    /// Also save a PNG copy of the image
    #[arg(long)]
    png: Option<PathBuf>,

    /// Worker threads; all cores by default
    #[arg(short, long)]
    threads: Option<usize>,

    /// Override the scene's sample count per pixel
    #[arg(long)]
    samples: Option<u32>,

    /// Do not draw a progress bar
    #[arg(long)]
    no_progress: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to set up the worker pool")?;
    }

    let mut scene = Scene::load(&cli.scene)?;
    if let Some(samples) = cli.samples {
        scene.samples = samples;
    }

    let started = Instant::now();
    let rendered_scene = render_scene(&scene, !cli.no_progress);
    log::info!(
        "rendered {}x{} ({} samples) in {:.2?}",
        scene.width,
        scene.height,
        scene.samples,
        started.elapsed()
    );

    let out_file = File::create(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    dump_rendered_to_ppm(&scene, &rendered_scene, &mut BufWriter::new(out_file))
        .with_context(|| format!("failed to write {}", cli.output.display()))?;

    if let Some(png_path) = &cli.png {
        dump_rendered_to_png(&scene, rendered_scene, png_path)?;
    }
    Ok(())
}

fn dump_rendered_to_png(scene: &Scene, rendered_scene: Vec<u8>, png_path: &Path) -> anyhow::Result<()> {
    let img = RgbImage::from_raw(scene.width, scene.height, rendered_scene)
        .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", scene.width, scene.height))?;
    img.save_with_format(png_path, ImageFormat::Png)
        .with_context(|| format!("failed to write {}", png_path.display()))?;
    Ok(())
}

fn dump_rendered_to_ppm(
    scene: &Scene,
    rendered_scene: &[u8],
    out: &mut impl Write,
) -> std::io::Result<()> {
    out.write_all(b"P6\n")?;
    out.write_all(format!("{} {}\n", scene.width, scene.height).as_bytes())?;
    out.write_all(b"255\n")?;
    out.write_all(rendered_scene)?;
    out.flush()
}
