use crate::geometry::{Fp, Intersection, Object3D, Ray, Shape3D, Vec3f, EPS, FP_INF, FP_NEG_INF};
use crate::scene::Primitive;

#[derive(Clone, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3f,
    pub max: Vec3f,
}

/// The empty box: extending it by anything yields that thing's bounds.
impl Default for Aabb {
    fn default() -> Self {
        Aabb {
            min: Vec3f::new(FP_INF, FP_INF, FP_INF),
            max: Vec3f::new(FP_NEG_INF, FP_NEG_INF, FP_NEG_INF),
        }
    }
}

/// Parametric extent of a line inside an axis-aligned box, together with the
/// face normals at both ends, oriented against the line direction.
#[derive(Clone, Debug)]
pub struct Slab {
    pub t_min: Fp,
    pub t_max: Fp,
    pub entry_normal: Vec3f,
    pub exit_normal: Vec3f,
}

pub fn slabs(origin: &Vec3f, direction: &Vec3f, min: &Vec3f, max: &Vec3f) -> Option<Slab> {
    let mut t_min = FP_NEG_INF;
    let mut t_max = FP_INF;
    let mut entry_axis = 0;
    let mut exit_axis = 0;
    let mut crosses_any_slab = false;
    for axis in 0..3 {
        let o = origin[axis];
        let d = direction[axis];
        if d.abs() <= Fp::EPSILON {
            // parallel to this slab
            if o < min[axis] || o > max[axis] {
                return None;
            }
            continue;
        }
        crosses_any_slab = true;
        let mut t0 = (min[axis] - o) / d;
        let mut t1 = (max[axis] - o) / d;
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        if t0 > t_min {
            t_min = t0;
            entry_axis = axis;
        }
        if t1 < t_max {
            t_max = t1;
            exit_axis = axis;
        }
    }
    if !crosses_any_slab || !(t_min < t_max) {
        return None;
    }
    let facing = |axis: usize| {
        let mut normal = Vec3f::zeros();
        normal[axis] = -direction[axis].signum();
        normal
    };
    Some(Slab {
        t_min,
        t_max,
        entry_normal: facing(entry_axis),
        exit_normal: facing(exit_axis),
    })
}

impl Aabb {
    pub fn universe() -> Aabb {
        Aabb {
            min: Vec3f::new(FP_NEG_INF, FP_NEG_INF, FP_NEG_INF),
            max: Vec3f::new(FP_INF, FP_INF, FP_INF),
        }
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| self.min[axis] > self.max[axis])
    }

    pub fn extend_point(&self, point: &Vec3f) -> Aabb {
        Aabb {
            min: self.min.inf(point),
            max: self.max.sup(point),
        }
    }

    pub fn extend_aabb(&self, aabb: &Aabb) -> Aabb {
        Aabb {
            min: self.min.inf(&aabb.min),
            max: self.max.sup(&aabb.max),
        }
    }

    /// Half the surface area. Only ever compared against other boxes' areas.
    pub fn area(&self) -> Fp {
        if self.is_empty() {
            return 0.0;
        }
        let diff = self.max - self.min;
        let x = diff.x;
        let y = diff.y;
        let z = diff.z;
        x * y + y * z + z * x
    }

    pub fn contains(&self, aabb: &Aabb) -> bool {
        if aabb.is_empty() {
            return true;
        }
        for coord in 0..3 {
            if aabb.min[coord] < self.min[coord] {
                return false;
            }
            if aabb.max[coord] > self.max[coord] {
                return false;
            }
        }
        true
    }

    /// Entry point of the ray into the box. When the origin is already inside,
    /// the entry distance is meaningless, so the exit point is reported with
    /// `inside` set.
    pub fn intersect(&self, ray: &Ray) -> Option<Intersection> {
        if self.is_empty() {
            return None;
        }
        let slab = slabs(&ray.origin, &ray.direction, &self.min, &self.max)?;
        if slab.t_max < 0.0 {
            None
        } else if slab.t_min >= 0.0 {
            Some(Intersection {
                offset: slab.t_min,
                normal: slab.entry_normal,
                inside: false,
            })
        } else {
            Some(Intersection {
                offset: slab.t_max,
                normal: slab.exit_normal,
                inside: true,
            })
        }
    }

    pub fn of_object(object: &Object3D) -> Aabb {
        let Some(shape_aabb) = calculate_aabb_for_shape(&object.shape) else {
            return Aabb::universe();
        };
        let mut result = Aabb::default();
        for x_from_min in [false, true] {
            for y_from_min in [false, true] {
                for z_from_min in [false, true] {
                    let point = Vec3f::new(
                        if_then_else(x_from_min, shape_aabb.min.x, shape_aabb.max.x),
                        if_then_else(y_from_min, shape_aabb.min.y, shape_aabb.max.y),
                        if_then_else(z_from_min, shape_aabb.min.z, shape_aabb.max.z),
                    );
                    result = result.extend_point(&object.global_point(&point));
                }
            }
        }
        result
    }
}

fn calculate_aabb_for_shape(shape3d: &Shape3D) -> Option<Aabb> {
    let eps_vec = Vec3f::new(EPS, EPS, EPS);
    match shape3d {
        Shape3D::Plane { .. } => None,
        Shape3D::Ellipsoid { r } => Some(Aabb {
            min: -r.abs() - eps_vec,
            max: r.abs() + eps_vec,
        }),
        Shape3D::Box { s } => Some(Aabb {
            min: -s.abs() - eps_vec,
            max: s.abs() + eps_vec,
        }),
        Shape3D::Triangle { u, v } => {
            let origin = Vec3f::zeros();
            Some(Aabb {
                min: origin.inf(u).inf(v) - eps_vec,
                max: origin.sup(u).sup(v) + eps_vec,
            })
        }
    }
}

// to make the formatter happy
fn if_then_else<T>(cond: bool, fst: T, snd: T) -> T {
    if cond {
        fst
    } else {
        snd
    }
}

pub fn calculate_aabb(slice: &[Primitive]) -> Aabb {
    slice
        .iter()
        .fold(Aabb::default(), |result, primitive| result.extend_aabb(&primitive.aabb))
}
