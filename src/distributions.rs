use std::f64::consts::PI;
use std::fmt::Debug;

use rand::{Rng, RngCore};
use rand_distr::{Distribution, StandardNormal};

use crate::geometry::{Fp, Object3D, Ray, Shape3D, Vec3f, EPS};
use crate::utils::chi_plus;

/// Direction distributions around a surface point. Samples are unit vectors;
/// `pdf` is the solid-angle density and accepts any non-zero direction.
/// All randomness comes from the caller's generator.
pub trait SampleDistribution: Send + Sync + Debug {
    fn sample(&self, point: &Vec3f, normal: &Vec3f, rng: &mut dyn RngCore) -> Vec3f;
    fn pdf(&self, point: &Vec3f, normal: &Vec3f, direction: &Vec3f) -> Fp;
}

#[derive(Debug)]
pub struct CosineWeightedDistribution;

#[derive(Debug)]
pub struct LightSamplingDistribution {
    object3d: Object3D,
}

/// Picks one of its members uniformly.
#[derive(Debug)]
pub struct MixDistribution {
    pub distributions: Vec<Box<dyn SampleDistribution>>,
}

pub fn random_unit_vec(rng: &mut dyn RngCore) -> Vec3f {
    loop {
        let v = Vec3f::new(
            StandardNormal.sample(rng),
            StandardNormal.sample(rng),
            StandardNormal.sample(rng),
        );
        let norm = v.norm();
        if norm > EPS {
            return v / norm;
        }
    }
}

fn symmetric(rng: &mut dyn RngCore, extent: Fp) -> Fp {
    (rng.gen::<Fp>() * 2.0 - 1.0) * extent
}

impl SampleDistribution for CosineWeightedDistribution {
    fn sample(&self, _: &Vec3f, normal: &Vec3f, rng: &mut dyn RngCore) -> Vec3f {
        let result = random_unit_vec(rng) + normal;
        let norm = result.norm();
        if norm > EPS {
            result / norm
        } else {
            *normal
        }
    }

    fn pdf(&self, _: &Vec3f, normal: &Vec3f, direction: &Vec3f) -> Fp {
        let cos = direction.normalize().dot(normal);
        chi_plus(cos) * cos / PI
    }
}

impl LightSamplingDistribution {
    /// Planes have no finite surface to sample.
    pub fn new(object3d: Object3D) -> Option<LightSamplingDistribution> {
        object3d
            .shape
            .is_bounded()
            .then_some(LightSamplingDistribution { object3d })
    }

    fn sample_local_point(&self, rng: &mut dyn RngCore) -> Vec3f {
        match &self.object3d.shape {
            Shape3D::Plane { .. } => Vec3f::zeros(),
            Shape3D::Ellipsoid { r } => random_unit_vec(rng).component_mul(r),
            Shape3D::Box { s } => {
                let (wx, wy, wz) = (s.y * s.z, s.x * s.z, s.x * s.y);
                let x = rng.gen::<Fp>() * (wx + wy + wz);
                let sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
                if x < wx {
                    Vec3f::new(s.x * sign, symmetric(rng, s.y), symmetric(rng, s.z))
                } else if x < wx + wy {
                    Vec3f::new(symmetric(rng, s.x), s.y * sign, symmetric(rng, s.z))
                } else {
                    Vec3f::new(symmetric(rng, s.x), symmetric(rng, s.y), s.z * sign)
                }
            }
            Shape3D::Triangle { u, v } => {
                let (mut a, mut b) = (rng.gen::<Fp>(), rng.gen::<Fp>());
                if a + b > 1.0 {
                    a = 1.0 - a;
                    b = 1.0 - b;
                }
                u * a + v * b
            }
        }
    }

    /// Density of the uniform-on-parameter surface sampling at `local`, per unit area.
    fn area_density(&self, local: &Vec3f) -> Fp {
        match &self.object3d.shape {
            Shape3D::Plane { .. } => 0.0,
            Shape3D::Ellipsoid { r } => {
                let n = local.component_div(r);
                let root = ((n.x * r.y * r.z).powi(2)
                    + (r.x * n.y * r.z).powi(2)
                    + (r.x * r.y * n.z).powi(2))
                .sqrt();
                1.0 / (4.0 * PI * root)
            }
            Shape3D::Box { s } => 1.0 / (8.0 * (s.x * s.y + s.y * s.z + s.z * s.x)),
            Shape3D::Triangle { u, v } => 2.0 / u.cross(v).norm(),
        }
    }
}

impl SampleDistribution for LightSamplingDistribution {
    fn sample(&self, point: &Vec3f, normal: &Vec3f, rng: &mut dyn RngCore) -> Vec3f {
        let target = self.object3d.global_point(&self.sample_local_point(rng));
        let direction = target - point;
        let norm = direction.norm();
        if norm > EPS {
            direction / norm
        } else {
            *normal
        }
    }

    fn pdf(&self, point: &Vec3f, _: &Vec3f, direction: &Vec3f) -> Fp {
        let ray = Ray::new(*point, direction.normalize());
        self.object3d
            .intersect_all_points(&ray)
            .iter()
            .map(|intersection| {
                let cos = intersection.normal.dot(&ray.direction).abs();
                if cos <= EPS {
                    return 0.0;
                }
                let local = self.object3d.local_point(&ray.at(intersection.offset));
                self.area_density(&local) * intersection.offset * intersection.offset / cos
            })
            .sum()
    }
}

impl MixDistribution {
    pub fn new(distributions: Vec<Box<dyn SampleDistribution>>) -> MixDistribution {
        MixDistribution { distributions }
    }
}

impl SampleDistribution for MixDistribution {
    fn sample(&self, point: &Vec3f, normal: &Vec3f, rng: &mut dyn RngCore) -> Vec3f {
        let n = self.distributions.len();
        if n == 0 {
            return *normal;
        }
        let rand_idx = rng.gen_range(0..n);
        self.distributions[rand_idx].sample(point, normal, rng)
    }

    fn pdf(&self, point: &Vec3f, normal: &Vec3f, direction: &Vec3f) -> Fp {
        if self.distributions.is_empty() {
            return 0.0;
        }
        let ans = self
            .distributions
            .iter()
            .map(|distr| distr.pdf(point, normal, direction))
            .sum::<Fp>();
        ans / (self.distributions.len() as Fp)
    }
}
