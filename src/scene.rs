use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use na::{Quaternion, UnitQuaternion};
use thiserror::Error;

use crate::aabb::Aabb;
use crate::bvh::BvhTree;
use crate::distributions::{
    CosineWeightedDistribution, LightSamplingDistribution, MixDistribution, SampleDistribution,
};
use crate::geometry::{Fp, Intersection, Material, Object3D, Ray, Shape3D, Vec3f, EPS};

#[derive(Error, Debug)]
pub enum SceneError {
    #[error("failed to read scene {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: {directive} expects {expected} arguments, got {got}")]
    MissingArguments {
        line: usize,
        directive: String,
        expected: usize,
        got: usize,
    },

    #[error("line {line}: cannot parse {token:?} as a number")]
    InvalidNumber { line: usize, token: String },

    #[error("line {line}: {directive} outside of a primitive")]
    NoPrimitive { line: usize, directive: String },

    #[error("line {line}: rotation quaternion has zero length")]
    DegenerateRotation { line: usize },

    #[error("line {line}: unknown directive {directive}")]
    UnknownDirective { line: usize, directive: String },
}

#[derive(Clone, Debug)]
pub struct Primitive {
    pub object3d: Object3D,
    pub aabb: Aabb,
    pub color: Vec3f,
    pub material: Material,
    pub ior: Fp,
    pub emission: Vec3f,
}

impl Primitive {
    pub fn new(object3d: Object3D) -> Primitive {
        Primitive {
            aabb: Aabb::of_object(&object3d),
            object3d,
            color: Vec3f::zeros(),
            material: Material::Diffuse,
            ior: 1.5,
            emission: Vec3f::zeros(),
        }
    }

    pub fn is_emissive(&self) -> bool {
        self.emission.norm() > EPS
    }
}

#[derive(Debug)]
pub struct Scene {
    pub width: u32,
    pub height: u32,
    pub bg_color: Vec3f,
    pub camera_position: Vec3f,
    pub camera_forward: Vec3f,
    pub camera_right: Vec3f,
    pub camera_up: Vec3f,
    pub camera_fov_x: Fp,
    pub camera_fov_y: Fp,
    pub ray_depth: u32,
    pub samples: u32,
    pub bvh_finite_primitives: BvhTree,
    pub infinite_primitives: Vec<Primitive>,
    /// Direction sampler for diffuse bounces: cosine-weighted, mixed with
    /// light-surface sampling when the scene has bounded emitters.
    pub diffuse_distribution: MixDistribution,
}

impl Default for Scene {
    fn default() -> Self {
        Scene {
            width: 0,
            height: 0,
            bg_color: Vec3f::zeros(),
            camera_position: Vec3f::zeros(),
            camera_forward: Vec3f::new(0.0, 0.0, 1.0),
            camera_right: Vec3f::new(1.0, 0.0, 0.0),
            camera_up: Vec3f::new(0.0, 1.0, 0.0),
            camera_fov_x: std::f64::consts::FRAC_PI_2,
            camera_fov_y: 0.0,
            ray_depth: 6,
            samples: 1,
            bvh_finite_primitives: BvhTree::default(),
            infinite_primitives: vec![],
            diffuse_distribution: MixDistribution::new(vec![
                Box::new(CosineWeightedDistribution) as Box<dyn SampleDistribution>
            ]),
        }
    }
}

struct PendingPrimitive {
    shape: Option<Shape3D>,
    position: Vec3f,
    rotation: UnitQuaternion<Fp>,
    color: Vec3f,
    material: Material,
    ior: Fp,
    emission: Vec3f,
}

impl PendingPrimitive {
    fn new() -> PendingPrimitive {
        PendingPrimitive {
            shape: None,
            position: Vec3f::zeros(),
            rotation: Default::default(),
            color: Vec3f::zeros(),
            material: Material::Diffuse,
            ior: 1.5,
            emission: Vec3f::zeros(),
        }
    }

    fn finish(self) -> Option<Primitive> {
        let shape = self.shape?;
        Some(Primitive {
            color: self.color,
            material: self.material,
            ior: self.ior,
            emission: self.emission,
            ..Primitive::new(Object3D {
                shape,
                position: self.position,
                rotation: self.rotation,
            })
        })
    }
}

struct Directive<'a> {
    line: usize,
    name: &'a str,
    args: Vec<&'a str>,
}

impl Directive<'_> {
    fn expect(&self, count: usize) -> Result<(), SceneError> {
        if self.args.len() < count {
            return Err(SceneError::MissingArguments {
                line: self.line,
                directive: self.name.to_string(),
                expected: count,
                got: self.args.len(),
            });
        }
        Ok(())
    }

    fn number<T: FromStr>(&self, index: usize) -> Result<T, SceneError> {
        self.expect(index + 1)?;
        self.args[index]
            .parse()
            .map_err(|_| SceneError::InvalidNumber {
                line: self.line,
                token: self.args[index].to_string(),
            })
    }

    fn vector(&self, start: usize) -> Result<Vec3f, SceneError> {
        self.expect(start + 3)?;
        Ok(Vec3f::new(
            self.number(start)?,
            self.number(start + 1)?,
            self.number(start + 2)?,
        ))
    }
}

const SCENE_DIRECTIVES: [&str; 9] = [
    "DIMENSIONS",
    "BG_COLOR",
    "CAMERA_POSITION",
    "CAMERA_FORWARD",
    "CAMERA_RIGHT",
    "CAMERA_UP",
    "CAMERA_FOV_X",
    "RAY_DEPTH",
    "SAMPLES",
];

#[derive(Default)]
struct Parser {
    scene: Scene,
    primitives: Vec<Primitive>,
    current: Option<PendingPrimitive>,
}

impl Parser {
    fn flush_primitive(&mut self) {
        if let Some(pending) = self.current.take() {
            match pending.finish() {
                Some(primitive) => self.primitives.push(primitive),
                None => log::warn!("primitive without a shape, skipping"),
            }
        }
    }

    fn primitive(&mut self, directive: &Directive) -> Result<&mut PendingPrimitive, SceneError> {
        self.current.as_mut().ok_or_else(|| SceneError::NoPrimitive {
            line: directive.line,
            directive: directive.name.to_string(),
        })
    }

    fn apply(&mut self, directive: &Directive) -> Result<(), SceneError> {
        // a scene-level line ends the open primitive block
        if SCENE_DIRECTIVES.contains(&directive.name) {
            self.flush_primitive();
        }
        match directive.name {
            "DIMENSIONS" => {
                let width = directive.number(0)?;
                let height = directive.number(1)?;
                self.scene.width = width;
                self.scene.height = height;
            }
            "BG_COLOR" => self.scene.bg_color = directive.vector(0)?,
            "CAMERA_POSITION" => self.scene.camera_position = directive.vector(0)?,
            "CAMERA_FORWARD" => self.scene.camera_forward = directive.vector(0)?,
            "CAMERA_RIGHT" => self.scene.camera_right = directive.vector(0)?,
            "CAMERA_UP" => self.scene.camera_up = directive.vector(0)?,
            "CAMERA_FOV_X" => self.scene.camera_fov_x = directive.number(0)?,
            "RAY_DEPTH" => self.scene.ray_depth = directive.number(0)?,
            "SAMPLES" => self.scene.samples = directive.number(0)?,
            "NEW_PRIMITIVE" => {
                self.flush_primitive();
                self.current = Some(PendingPrimitive::new());
            }
            "PLANE" => {
                let norm = directive.vector(0)?.normalize();
                self.primitive(directive)?.shape = Some(Shape3D::Plane { norm });
            }
            "ELLIPSOID" => {
                let r = directive.vector(0)?;
                self.primitive(directive)?.shape = Some(Shape3D::Ellipsoid { r });
            }
            "BOX" => {
                let s = directive.vector(0)?;
                self.primitive(directive)?.shape = Some(Shape3D::Box { s });
            }
            "TRIANGLE" => {
                let a = directive.vector(0)?;
                let b = directive.vector(3)?;
                let c = directive.vector(6)?;
                let current = self.primitive(directive)?;
                current.shape = Some(Shape3D::Triangle { u: b - a, v: c - a });
                current.position += a;
            }
            "POSITION" => {
                let offset = directive.vector(0)?;
                self.primitive(directive)?.position += offset;
            }
            "ROTATION" => {
                let quaternion = Quaternion::new(
                    directive.number(3)?,
                    directive.number(0)?,
                    directive.number(1)?,
                    directive.number(2)?,
                );
                let rotation = UnitQuaternion::try_new(quaternion, EPS).ok_or(
                    SceneError::DegenerateRotation {
                        line: directive.line,
                    },
                )?;
                self.primitive(directive)?.rotation = rotation;
            }
            "COLOR" => {
                let color = directive.vector(0)?;
                self.primitive(directive)?.color = color;
            }
            "EMISSION" => {
                let emission = directive.vector(0)?;
                self.primitive(directive)?.emission = emission;
            }
            "IOR" => {
                let ior = directive.number(0)?;
                self.primitive(directive)?.ior = ior;
            }
            "METALLIC" => self.primitive(directive)?.material = Material::Metallic,
            "DIELECTRIC" => self.primitive(directive)?.material = Material::Dielectric,
            _ => {
                return Err(SceneError::UnknownDirective {
                    line: directive.line,
                    directive: directive.name.to_string(),
                })
            }
        }
        Ok(())
    }
}

impl Scene {
    pub fn load(path: impl AsRef<Path>) -> Result<Scene, SceneError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| SceneError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Scene::parse(&content))
    }

    /// Malformed or unknown lines are logged and skipped.
    pub fn parse(content: &str) -> Scene {
        let mut parser = Parser::default();
        for (index, line) in content.lines().enumerate() {
            let mut tokens = line.split_whitespace();
            let Some(name) = tokens.next() else {
                continue;
            };
            let directive = Directive {
                line: index + 1,
                name,
                args: tokens.collect(),
            };
            if let Err(err) = parser.apply(&directive) {
                log::warn!("{}, skipping", err);
            }
        }
        parser.flush_primitive();
        log::info!(
            "parsed scene {}x{}, {} primitives, {} samples, ray depth {}",
            parser.scene.width,
            parser.scene.height,
            parser.primitives.len(),
            parser.scene.samples,
            parser.scene.ray_depth
        );
        parser.scene.with_primitives(parser.primitives)
    }

    /// Derives the vertical field of view and builds the acceleration and
    /// light structures. The BVH owns (and reorders) the bounded primitives.
    pub fn with_primitives(mut self, primitives: Vec<Primitive>) -> Scene {
        self.camera_fov_y = if self.width > 0 {
            ((self.camera_fov_x / 2.).tan() * self.height as Fp / self.width as Fp).atan() * 2.0
        } else {
            0.0
        };

        let (finite, infinite): (Vec<_>, Vec<_>) = primitives
            .into_iter()
            .partition(|p| p.object3d.shape.is_bounded());

        let lights = finite
            .iter()
            .filter(|p| p.is_emissive())
            .filter_map(|p| LightSamplingDistribution::new(p.object3d.clone()))
            .map(|light| Box::new(light) as Box<dyn SampleDistribution>)
            .collect::<Vec<_>>();
        let mut distributions =
            vec![Box::new(CosineWeightedDistribution) as Box<dyn SampleDistribution>];
        if !lights.is_empty() {
            log::info!("sampling {} light sources", lights.len());
            distributions.push(Box::new(MixDistribution::new(lights)));
        }
        self.diffuse_distribution = MixDistribution::new(distributions);

        self.bvh_finite_primitives = BvhTree::build(finite);
        log::info!(
            "bvh: {} nodes, {} leaves, depth {}, bounds {:?}..{:?}",
            self.bvh_finite_primitives.nodes().len(),
            self.bvh_finite_primitives.leaf_count(),
            self.bvh_finite_primitives.depth(),
            self.bvh_finite_primitives.aabb().min.as_slice(),
            self.bvh_finite_primitives.aabb().max.as_slice()
        );
        self.infinite_primitives = infinite;
        self
    }

    /// Ray through pixel `(x, y)`; `jitter` in `[0, 1)^2` picks the point
    /// within the pixel, `(0.5, 0.5)` being its center.
    pub fn camera_ray(&self, x: u32, y: u32, jitter: (Fp, Fp)) -> Ray {
        let real_x = x as Fp + jitter.0;
        let real_y = y as Fp + jitter.1;
        let w = self.width as Fp;
        let h = self.height as Fp;
        let px = (2.0 * real_x / w - 1.0) * (self.camera_fov_x * 0.5).tan();
        let py = -(2.0 * real_y / h - 1.0) * (self.camera_fov_y * 0.5).tan();
        let direction = px * self.camera_right + py * self.camera_up + self.camera_forward;
        Ray {
            origin: self.camera_position,
            direction: direction.normalize(),
        }
    }

    pub fn intersect(&self, ray: &Ray) -> Option<(Intersection, &Primitive)> {
        let mut nearest: Option<(Intersection, &Primitive)> = None;
        for primitive in &self.infinite_primitives {
            if let Some(intersection) = primitive.object3d.intersect(ray) {
                if nearest
                    .as_ref()
                    .map_or(true, |(n, _)| intersection.offset < n.offset)
                {
                    nearest = Some((intersection, primitive));
                }
            }
        }
        let best = nearest.as_ref().map(|(n, _)| n.offset);
        if let Some((intersection, index)) = self.bvh_finite_primitives.intersect(ray, best) {
            if best.map_or(true, |best| intersection.offset < best) {
                nearest = Some((
                    intersection,
                    &self.bvh_finite_primitives.primitives()[index],
                ));
            }
        }
        nearest
    }
}
