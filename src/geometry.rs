use arrayvec::ArrayVec;
use nalgebra::{UnitQuaternion, Vector3};

use crate::aabb::slabs;
use crate::utils::safe_sqrt;

pub type Fp = f64;
pub type Vec3f = Vector3<Fp>;

pub const EPS: Fp = 0.00001;
pub const FP_INF: Fp = Fp::INFINITY;
pub const FP_NEG_INF: Fp = Fp::NEG_INFINITY;

// offsets are in multiples of `direction`, which need not be unit length
#[derive(Clone, Debug)]
pub struct Ray {
    pub origin: Vec3f,
    pub direction: Vec3f,
}

impl Ray {
    pub fn new(origin: Vec3f, direction: Vec3f) -> Ray {
        Ray { origin, direction }
    }

    pub fn at(&self, offset: Fp) -> Vec3f {
        self.origin + self.direction * offset
    }
}

#[derive(Default, Clone, Debug)]
pub struct Intersection {
    pub offset: Fp,
    /// Unit normal, always facing against the ray direction.
    pub normal: Vec3f,
    /// Hit from inside the volume.
    pub inside: bool,
}

#[derive(Clone, Debug)]
pub enum Shape3D {
    Plane { norm: Vec3f },
    Ellipsoid { r: Vec3f },
    Box { s: Vec3f },
    // first vertex at the local origin, `u` and `v` are the edges
    Triangle { u: Vec3f, v: Vec3f },
}

impl Shape3D {
    pub fn is_bounded(&self) -> bool {
        !matches!(self, Shape3D::Plane { .. })
    }
}

#[derive(Clone, Debug)]
pub struct Object3D {
    pub shape: Shape3D,
    pub position: Vec3f,
    pub rotation: UnitQuaternion<Fp>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Material {
    #[default]
    Diffuse,
    Metallic,
    Dielectric,
}

pub fn get_reflection_ray(direction: &Vec3f, normal: &Vec3f) -> Vec3f {
    let projection = -direction.dot(normal);
    direction + normal * projection * 2.0
}

/// Snell refraction of a unit `direction` through a surface whose unit
/// `normal` faces against it, with `eta = n_from / n_to`. `None` on total
/// internal reflection.
pub fn get_refraction_ray(direction: &Vec3f, normal: &Vec3f, eta: Fp) -> Option<Vec3f> {
    let cos_in = -direction.dot(normal);
    let sin2_out = eta * eta * (1.0 - cos_in * cos_in);
    if sin2_out > 1.0 {
        return None;
    }
    let cos_out = safe_sqrt(1.0 - sin2_out);
    Some(direction * eta + normal * (eta * cos_in - cos_out))
}

fn intersect_all_points(ray: &Ray, shape: &Shape3D) -> ArrayVec<Intersection, 2> {
    let mut result = ArrayVec::<Intersection, 2>::new();
    match shape {
        Shape3D::Plane { norm } => {
            let x = norm.dot(&ray.direction);
            if x.abs() <= Fp::EPSILON {
                return result;
            }
            let offset = -ray.origin.dot(norm) / x;
            if offset > EPS {
                let norm = norm.normalize();
                result.push(Intersection {
                    offset,
                    normal: if x < 0.0 { norm } else { -norm },
                    inside: false,
                })
            }
        }
        Shape3D::Ellipsoid { r } => {
            if r.iter().any(|c| c.abs() <= Fp::EPSILON) {
                return result;
            }
            let d1 = ray.direction.component_div(r);
            let o1 = ray.origin.component_div(r);
            let a = d1.dot(&d1);
            let b = 2.0 * o1.dot(&d1);
            let c = o1.dot(&o1) - 1.0;
            let discr = b * b - 4.0 * a * c;
            if a == 0.0 || discr < 0.0 {
                return result;
            }
            let x1 = (-b - discr.sqrt()) / (2.0 * a);
            let x2 = (-b + discr.sqrt()) / (2.0 * a);
            let t1 = Fp::min(x1, x2);
            let t2 = Fp::max(x1, x2);
            let outward = |t: Fp| {
                ray.at(t)
                    .component_div(r)
                    .component_div(r)
                    .normalize()
            };
            if t1 > EPS {
                result.push(Intersection {
                    offset: t1,
                    normal: outward(t1),
                    inside: false,
                });
            }
            if t2 > EPS {
                result.push(Intersection {
                    offset: t2,
                    normal: -outward(t2),
                    inside: true,
                });
            }
        }
        Shape3D::Box { s } => {
            let Some(slab) = slabs(&ray.origin, &ray.direction, &-s, s) else {
                return result;
            };
            if slab.t_min > EPS {
                result.push(Intersection {
                    offset: slab.t_min,
                    normal: slab.entry_normal,
                    inside: false,
                });
            }
            if slab.t_max > EPS {
                result.push(Intersection {
                    offset: slab.t_max,
                    normal: slab.exit_normal,
                    inside: true,
                });
            }
        }
        Shape3D::Triangle { u, v } => {
            // Möller-Trumbore with the first vertex at the local origin.
            let p = ray.direction.cross(v);
            let det = u.dot(&p);
            if det.abs() <= Fp::EPSILON {
                return result;
            }
            let inv_det = 1.0 / det;
            let alpha = ray.origin.dot(&p) * inv_det;
            if !(0.0..=1.0).contains(&alpha) {
                return result;
            }
            let q = ray.origin.cross(u);
            let beta = ray.direction.dot(&q) * inv_det;
            if beta < 0.0 || alpha + beta > 1.0 {
                return result;
            }
            let offset = v.dot(&q) * inv_det;
            if offset > EPS {
                let normal = u.cross(v).normalize();
                result.push(Intersection {
                    offset,
                    normal: if normal.dot(&ray.direction) > 0.0 {
                        -normal
                    } else {
                        normal
                    },
                    inside: false,
                });
            }
        }
    }
    result
}

impl Object3D {
    pub fn to_local(&self, ray: &Ray) -> Ray {
        let inverse = self.rotation.inverse();
        Ray {
            origin: inverse.transform_vector(&(ray.origin - self.position)),
            direction: inverse.transform_vector(&ray.direction),
        }
    }

    pub fn local_point(&self, point: &Vec3f) -> Vec3f {
        self.rotation.inverse_transform_vector(&(point - self.position))
    }

    pub fn global_point(&self, local: &Vec3f) -> Vec3f {
        self.rotation.transform_vector(local) + self.position
    }

    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        self.intersect_all_points(ray).into_iter().next()
    }

    pub fn intersect_all_points(&self, ray: &Ray) -> ArrayVec<Intersection, 2> {
        let mut result = intersect_all_points(&self.to_local(ray), &self.shape);
        for intersection in &mut result {
            intersection.normal = self.rotation.transform_vector(&intersection.normal);
        }
        result
    }
}
