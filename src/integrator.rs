use std::f64::consts::PI;

use rand::{Rng, RngCore};

use crate::distributions::SampleDistribution;
use crate::geometry::{
    get_reflection_ray, get_refraction_ray, Fp, Intersection, Material, Ray, Vec3f,
};
use crate::scene::{Primitive, Scene};

/// Linear radiance arriving at pixel `(x, y)`, averaged over the scene's
/// sample count with a jittered position inside the pixel per sample.
pub fn shade(scene: &Scene, rng: &mut dyn RngCore, x: u32, y: u32) -> Vec3f {
    let samples = scene.samples.max(1);
    let mut sum = Vec3f::zeros();
    for _ in 0..samples {
        let jitter = (rng.gen::<Fp>(), rng.gen::<Fp>());
        let ray = scene.camera_ray(x, y, jitter);
        sum += trace(scene, &ray, scene.ray_depth, rng);
    }
    sum / samples as Fp
}

pub fn trace(scene: &Scene, ray: &Ray, depth: u32, rng: &mut dyn RngCore) -> Vec3f {
    if depth == 0 {
        return Vec3f::zeros();
    }
    let Some((intersection, primitive)) = scene.intersect(ray) else {
        return scene.bg_color;
    };
    let point = ray.at(intersection.offset);
    let direction = ray.direction.normalize();
    let scattered = match primitive.material {
        Material::Diffuse => diffuse(scene, primitive, &intersection, &point, depth, rng),
        Material::Metallic => {
            let reflected = Ray::new(point, get_reflection_ray(&direction, &intersection.normal));
            primitive
                .color
                .component_mul(&trace(scene, &reflected, depth - 1, rng))
        }
        Material::Dielectric => {
            dielectric(scene, primitive, &intersection, &point, &direction, depth, rng)
        }
    };
    primitive.emission + scattered
}

fn diffuse(
    scene: &Scene,
    primitive: &Primitive,
    intersection: &Intersection,
    point: &Vec3f,
    depth: u32,
    rng: &mut dyn RngCore,
) -> Vec3f {
    let distribution = &scene.diffuse_distribution;
    let normal = &intersection.normal;
    let w = distribution.sample(point, normal, rng);
    let cos = w.dot(normal);
    if cos <= 0.0 {
        return Vec3f::zeros();
    }
    let pdf = distribution.pdf(point, normal, &w);
    if !(pdf > 0.0) {
        return Vec3f::zeros();
    }
    let incoming = trace(scene, &Ray::new(*point, w), depth - 1, rng);
    primitive.color.component_mul(&incoming) * (cos / (PI * pdf))
}

/// Schlick's approximation of the Fresnel reflectance.
fn reflectance(cos: Fp, eta_from: Fp, eta_to: Fp) -> Fp {
    let r0 = ((eta_from - eta_to) / (eta_from + eta_to)).powi(2);
    r0 + (1.0 - r0) * (1.0 - cos).powi(5)
}

fn dielectric(
    scene: &Scene,
    primitive: &Primitive,
    intersection: &Intersection,
    point: &Vec3f,
    direction: &Vec3f,
    depth: u32,
    rng: &mut dyn RngCore,
) -> Vec3f {
    let normal = &intersection.normal;
    let entering = !intersection.inside;
    let (eta_from, eta_to) = if entering {
        (1.0, primitive.ior)
    } else {
        (primitive.ior, 1.0)
    };
    let reflected = Ray::new(*point, get_reflection_ray(direction, normal));
    let Some(refracted) = get_refraction_ray(direction, normal, eta_from / eta_to) else {
        return trace(scene, &reflected, depth - 1, rng);
    };
    let cos = -direction.dot(normal);
    if rng.gen::<Fp>() < reflectance(cos, eta_from, eta_to) {
        return trace(scene, &reflected, depth - 1, rng);
    }
    let transmitted = trace(scene, &Ray::new(*point, refracted), depth - 1, rng);
    if entering {
        primitive.color.component_mul(&transmitted)
    } else {
        transmitted
    }
}
