use crate::distributions::{
    random_unit_vec, CosineWeightedDistribution, LightSamplingDistribution, MixDistribution,
    SampleDistribution,
};
use crate::geometry::{Object3D, Shape3D, Vec3f};
use crate::rendering::{radiance_to_bytes, render_scene};
use crate::scene::{Primitive, Scene};
use na::{Quaternion, UnitQuaternion};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use std::f64::consts::PI;

fn test_distribution(distribution: impl SampleDistribution) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);
    let normal = Vec3f::x();
    let point = Vec3f::default();
    let n = 400_000;
    let avg = (0..n)
        .map(|_| distribution.pdf(&point, &normal, &random_unit_vec(&mut rng)))
        .sum::<f64>()
        / (n as f64);
    let sphere_area = 4.0 * PI;
    assert!((avg * sphere_area - 1.0).abs() < 0.05, "integral {}", avg * sphere_area);
}

fn random_rotation(rng: &mut Xoshiro256PlusPlus) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(
        rng.gen_range(0.1..1.0),
        rng.gen(),
        rng.gen(),
        rng.gen(),
    ))
}

fn light(shape: Shape3D, rotation: UnitQuaternion<f64>) -> LightSamplingDistribution {
    LightSamplingDistribution::new(Object3D {
        shape,
        position: Vec3f::new(0.0, 0.0, 4.0),
        rotation,
    })
    .unwrap()
}

#[test]
fn test_cosine_distribution() {
    test_distribution(CosineWeightedDistribution);
}

#[test]
fn test_light_box_distribution_norotation() {
    test_distribution(light(
        Shape3D::Box {
            s: Vec3f::new(1.0, 2.0, 3.0),
        },
        UnitQuaternion::default(),
    ))
}

#[test]
fn test_light_box_distribution() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
    test_distribution(light(
        Shape3D::Box {
            s: Vec3f::new(1.0, 2.0, 3.0),
        },
        random_rotation(&mut rng),
    ))
}

#[test]
fn test_light_ellipsoid_distribution_norotation() {
    test_distribution(light(
        Shape3D::Ellipsoid {
            r: Vec3f::new(1.0, 2.0, 3.0),
        },
        Default::default(),
    ))
}

#[test]
fn test_light_ellipsoid_distribution() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(2);
    test_distribution(light(
        Shape3D::Ellipsoid {
            r: Vec3f::new(1.0, 2.0, 3.0),
        },
        random_rotation(&mut rng),
    ))
}

#[test]
fn test_light_triangle_distribution() {
    test_distribution(light(
        Shape3D::Triangle {
            u: Vec3f::new(6.0, 0.0, -3.0),
            v: Vec3f::new(3.0, 6.0, -3.0),
        },
        UnitQuaternion::default(),
    ))
}

#[test]
fn test_mix_distribution() {
    test_distribution(MixDistribution::new(vec![
        Box::new(CosineWeightedDistribution) as Box<dyn SampleDistribution>,
        Box::new(light(
            Shape3D::Ellipsoid {
                r: Vec3f::new(1.0, 1.0, 1.0),
            },
            Default::default(),
        )),
    ]))
}

#[test]
fn light_samples_point_at_the_light() {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(3);
    let distribution = light(
        Shape3D::Box {
            s: Vec3f::new(1.0, 1.0, 1.0),
        },
        Default::default(),
    );
    let normal = Vec3f::z();
    for _ in 0..1000 {
        let direction = distribution.sample(&Vec3f::zeros(), &normal, &mut rng);
        assert!((direction.norm() - 1.0).abs() < 1e-9);
        assert!(distribution.pdf(&Vec3f::zeros(), &normal, &direction) > 0.0);
    }
    assert_eq!(
        distribution.pdf(&Vec3f::zeros(), &normal, &Vec3f::new(0.0, 0.0, -1.0)),
        0.0
    );
}

fn unit_box_scene(samples: u32) -> Scene {
    let unit_box = Primitive {
        color: Vec3f::new(0.9, 0.3, 0.2),
        ..Primitive::new(Object3D {
            shape: Shape3D::Box {
                s: Vec3f::new(0.5, 0.5, 0.5),
            },
            position: Vec3f::zeros(),
            rotation: Default::default(),
        })
    };
    Scene {
        width: 32,
        height: 32,
        bg_color: Vec3f::new(0.6, 0.7, 0.8),
        camera_position: Vec3f::new(0.0, 0.0, 5.0),
        camera_forward: Vec3f::new(0.0, 0.0, -1.0),
        camera_right: Vec3f::new(1.0, 0.0, 0.0),
        camera_up: Vec3f::new(0.0, 1.0, 0.0),
        camera_fov_x: PI / 2.0,
        ray_depth: 2,
        samples,
        ..Default::default()
    }
    .with_primitives(vec![unit_box])
}

fn pixel(rendered: &[u8], scene: &Scene, x: usize, y: usize) -> [u8; 3] {
    let i = 3 * (y * scene.width as usize + x);
    [rendered[i], rendered[i + 1], rendered[i + 2]]
}

enum Footprint {
    Inside,
    Outside,
    Edge,
}

// Pixel coordinate `c` covers `[c, c + 1)` once jittered; the front face
// spans `16 +- 16 / 9` pixels on both axes.
fn footprint(c: usize) -> Footprint {
    let half = 16.0 / 9.0;
    let (low, high) = (c as f64, c as f64 + 1.0);
    if low >= 16.0 - half && high <= 16.0 + half {
        Footprint::Inside
    } else if high <= 16.0 - half || low >= 16.0 + half {
        Footprint::Outside
    } else {
        Footprint::Edge
    }
}

#[test]
fn unit_box_shows_up_where_it_projects() {
    let scene = unit_box_scene(1);
    let rendered = render_scene(&scene, false);
    assert_eq!(rendered.len(), 32 * 32 * 3);

    let background = radiance_to_bytes(&scene.bg_color);
    let box_color = radiance_to_bytes(&Vec3f::new(0.9, 0.3, 0.2).component_mul(&scene.bg_color));
    let (mut inside, mut outside) = (0, 0);
    for y in 0..32 {
        for x in 0..32 {
            let actual = pixel(&rendered, &scene, x, y);
            match (footprint(x), footprint(y)) {
                (Footprint::Outside, _) | (_, Footprint::Outside) => {
                    outside += 1;
                    assert_eq!(actual, background, "pixel {x} {y}");
                }
                (Footprint::Inside, Footprint::Inside) => {
                    inside += 1;
                    for channel in 0..3 {
                        assert!(
                            (actual[channel] as i32 - box_color[channel] as i32).abs() <= 1,
                            "pixel {x} {y}: {actual:?} vs {box_color:?}"
                        );
                    }
                }
                _ => {}
            }
        }
    }
    assert_eq!(inside, 4);
    assert_eq!(outside, 32 * 32 - 16);
}

#[test]
fn empty_scene_is_all_background() {
    let scene = Scene {
        width: 4,
        height: 3,
        bg_color: Vec3f::new(0.25, 0.5, 1.0),
        ..Default::default()
    }
    .with_primitives(vec![]);
    let rendered = render_scene(&scene, false);
    let background = radiance_to_bytes(&scene.bg_color);
    assert_eq!(rendered, background.repeat(12));
}

fn busy_scene() -> Scene {
    Scene::parse(
        "DIMENSIONS 24 16
BG_COLOR 0.1 0.1 0.15
CAMERA_POSITION 0 1 6
CAMERA_RIGHT 1 0 0
CAMERA_UP 0 1 0
CAMERA_FORWARD 0 0 -1
CAMERA_FOV_X 1.2
RAY_DEPTH 5
SAMPLES 4
NEW_PRIMITIVE
PLANE 0 1 0
POSITION 0 -1 0
COLOR 0.6 0.6 0.6
NEW_PRIMITIVE
ELLIPSOID 0.7 0.7 0.7
POSITION -1 0 0
DIELECTRIC
IOR 1.5
COLOR 1 1 1
NEW_PRIMITIVE
BOX 0.5 0.8 0.5
POSITION 1.2 -0.2 -0.5
ROTATION 0 0.3 0 1
METALLIC
COLOR 0.9 0.8 0.6
NEW_PRIMITIVE
TRIANGLE -2 -1 -2 2 -1 -2 0 2 -2
COLOR 0.3 0.7 0.3
NEW_PRIMITIVE
BOX 1 0.1 1
POSITION 0 3 0
EMISSION 6 6 5
",
    )
}

#[test]
fn render_is_independent_of_worker_count() {
    let scene = busy_scene();
    let single = rayon::ThreadPoolBuilder::new()
        .num_threads(1)
        .build()
        .unwrap()
        .install(|| render_scene(&scene, false));
    let several = rayon::ThreadPoolBuilder::new()
        .num_threads(4)
        .build()
        .unwrap()
        .install(|| render_scene(&scene, false));
    assert_eq!(single.len(), 24 * 16 * 3);
    assert_eq!(single, several);
    assert_eq!(single, render_scene(&scene, false));
}

#[test]
fn lit_scene_is_not_black() {
    let scene = busy_scene();
    let rendered = render_scene(&scene, false);
    let background = radiance_to_bytes(&scene.bg_color);
    let lit = rendered
        .chunks(3)
        .filter(|p| *p != background.as_slice() && p.iter().any(|c| *c > 0))
        .count();
    assert!(lit > 24 * 16 / 4, "only {lit} lit pixels");
}

#[test]
fn ppm_has_binary_header_then_pixels() {
    let scene = Scene {
        width: 2,
        height: 1,
        ..Default::default()
    };
    let mut out = Vec::new();
    crate::dump_rendered_to_ppm(&scene, &[1, 2, 3, 4, 5, 6], &mut out).unwrap();
    assert_eq!(out, b"P6\n2 1\n255\n\x01\x02\x03\x04\x05\x06");
}
