// Animations Module - Descriptors, parameter validation and the registry
//
// Every animation declares a static descriptor (ordered parameter schema)
// used both to validate incoming configuration and to drive UI generation.
// The registry is a static name -> factory table; there is no dynamic
// lookup or code reloading.
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

use crate::color::parse_color_spec;
use crate::engine::Frame;
use crate::geometry::GeometryStore;

pub mod disco;
pub mod disks;
pub mod fade;
pub mod geodesic;
pub mod music;
pub mod snow;
pub mod spiral;
pub mod sweep;

/// Validation and configuration failures reported synchronously from setup.
/// None of these ever start a render loop.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Unknown animation: {0}")]
    UnknownAnimation(String),
    #[error("Missing parameters: {0}")]
    MissingParams(String),
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Invalid color: {0}")]
    InvalidColor(String),
    #[error("Geometry error: {0}")]
    Geometry(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParamKind {
    Bool {
        default: bool,
    },
    Int {
        min: i64,
        max: i64,
        default: i64,
    },
    Float {
        min: f64,
        max: f64,
        default: f64,
    },
    Color {
        default: &'static str,
        presets: &'static [&'static str],
    },
    Enum {
        options: &'static [&'static str],
        default: &'static str,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    #[serde(flatten)]
    pub kind: ParamKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnimationDescriptor {
    pub name: &'static str,
    pub label: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// Typed parameters that passed validation against a descriptor.
#[derive(Debug, Clone, Default)]
pub struct Params {
    values: HashMap<&'static str, ParamValue>,
}

impl Params {
    /// Validate a supplied JSON object against a descriptor. The key set
    /// must match the declared parameter set exactly: absent keys are a
    /// missing-parameters error, unknown keys an invalid-parameters error,
    /// as are type, bounds and option violations.
    pub fn validate(
        descriptor: &AnimationDescriptor,
        supplied: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Params, SetupError> {
        for key in supplied.keys() {
            if !descriptor.params.iter().any(|p| p.name == key) {
                return Err(SetupError::InvalidParams(format!(
                    "unexpected parameter '{}'",
                    key
                )));
            }
        }

        let mut values = HashMap::new();
        for spec in descriptor.params {
            let value = supplied
                .get(spec.name)
                .ok_or_else(|| SetupError::MissingParams(spec.name.to_string()))?;
            values.insert(spec.name, check_param(spec, value)?);
        }
        Ok(Params { values })
    }

    /// The declared defaults as a JSON object, the shape a caller would
    /// submit. Used by tests and by clients as a starting configuration.
    pub fn defaults(descriptor: &AnimationDescriptor) -> serde_json::Map<String, serde_json::Value> {
        let mut map = serde_json::Map::new();
        for spec in descriptor.params {
            let value = match spec.kind {
                ParamKind::Bool { default } => serde_json::json!(default),
                ParamKind::Int { default, .. } => serde_json::json!(default),
                ParamKind::Float { default, .. } => serde_json::json!(default),
                ParamKind::Color { default, .. } => serde_json::json!(default),
                ParamKind::Enum { default, .. } => serde_json::json!(default),
            };
            map.insert(spec.name.to_string(), value);
        }
        map
    }

    pub fn get_bool(&self, name: &str) -> bool {
        match self.values.get(name) {
            Some(ParamValue::Bool(v)) => *v,
            _ => panic!("parameter '{}' was not validated as bool", name),
        }
    }

    pub fn get_i64(&self, name: &str) -> i64 {
        match self.values.get(name) {
            Some(ParamValue::Int(v)) => *v,
            _ => panic!("parameter '{}' was not validated as int", name),
        }
    }

    pub fn get_f64(&self, name: &str) -> f64 {
        match self.values.get(name) {
            Some(ParamValue::Float(v)) => *v,
            Some(ParamValue::Int(v)) => *v as f64,
            _ => panic!("parameter '{}' was not validated as float", name),
        }
    }

    pub fn get_str(&self, name: &str) -> &str {
        match self.values.get(name) {
            Some(ParamValue::Str(v)) => v,
            _ => panic!("parameter '{}' was not validated as string", name),
        }
    }

    /// Brightness parameters are 0..=255 ints.
    pub fn get_brightness(&self, name: &str) -> u8 {
        self.get_i64(name).clamp(0, 255) as u8
    }
}

fn check_param(spec: &ParamSpec, value: &serde_json::Value) -> Result<ParamValue, SetupError> {
    let invalid = |why: &str| {
        SetupError::InvalidParams(format!("parameter '{}' {}", spec.name, why))
    };
    match spec.kind {
        ParamKind::Bool { .. } => value
            .as_bool()
            .map(ParamValue::Bool)
            .ok_or_else(|| invalid("must be a boolean")),
        ParamKind::Int { min, max, .. } => {
            let v = value.as_i64().ok_or_else(|| invalid("must be an integer"))?;
            if v < min || v > max {
                return Err(invalid(&format!("must be in [{}, {}]", min, max)));
            }
            Ok(ParamValue::Int(v))
        }
        ParamKind::Float { min, max, .. } => {
            let v = value.as_f64().ok_or_else(|| invalid("must be a number"))?;
            if v < min || v > max {
                return Err(invalid(&format!("must be in [{}, {}]", min, max)));
            }
            Ok(ParamValue::Float(v))
        }
        ParamKind::Color { presets, .. } => {
            let v = value.as_str().ok_or_else(|| invalid("must be a color string"))?;
            if !presets.contains(&v) && parse_color_spec(v, 255).is_none() {
                return Err(SetupError::InvalidColor(v.to_string()));
            }
            Ok(ParamValue::Str(v.to_string()))
        }
        ParamKind::Enum { options, .. } => {
            let v = value.as_str().ok_or_else(|| invalid("must be a string"))?;
            if !options.contains(&v) {
                return Err(invalid(&format!("must be one of {:?}", options)));
            }
            Ok(ParamValue::Str(v.to_string()))
        }
    }
}

/// What the render loop should do after a tick.
pub enum Tick {
    /// Sleep the remainder of the frame period and tick again.
    Continue,
    /// Dwell for the given duration before the next tick.
    Pause(Duration),
    /// The animation has nothing further to render; the loop exits.
    Finished,
}

/// One generative animation. setup() validates parameters and precomputes
/// geometry-derived state; tick() paints one frame. The engine owns the
/// loop, the pacing, and the cancellation flag.
pub trait Animation: Send {
    fn setup(&mut self, params: &Params, geometry: &GeometryStore) -> Result<(), SetupError>;
    fn tick(&mut self, frame: &mut Frame) -> anyhow::Result<Tick>;
}

/// Mailbox carrying one color per bin from an external analyzer to the
/// music animation. The collaborator's whole contract is "publish one
/// color per bin whenever you have a new frame".
#[derive(Clone, Default)]
pub struct BinFeed {
    slot: Arc<Mutex<Option<Vec<u32>>>>,
}

impl BinFeed {
    pub fn publish(&self, colors: Vec<u32>) {
        *self.slot.lock().unwrap() = Some(colors);
    }

    pub fn take(&self) -> Option<Vec<u32>> {
        self.slot.lock().unwrap().take()
    }
}

/// Runtime collaborators handed to animation factories.
pub struct RuntimeContext {
    pub bin_feed: BinFeed,
    pub cache_dir: PathBuf,
}

static REGISTRY: [&AnimationDescriptor; 12] = [
    &fade::DESCRIPTOR,
    &sweep::SWEEP_VERT,
    &sweep::SWEEP_HORIZ,
    &sweep::ROTATE,
    &sweep::SPHERE,
    &spiral::SPIRAL,
    &spiral::SNAKE,
    &snow::DESCRIPTOR,
    &disco::DESCRIPTOR,
    &disks::DESCRIPTOR,
    &music::DESCRIPTOR,
    &geodesic::DESCRIPTOR,
];

pub fn descriptors() -> &'static [&'static AnimationDescriptor] {
    &REGISTRY
}

pub fn descriptor(name: &str) -> Option<&'static AnimationDescriptor> {
    descriptors().iter().copied().find(|d| d.name == name)
}

/// Static factory table replacing the source's reflective module lookup.
pub fn create(name: &str, ctx: &RuntimeContext) -> Option<Box<dyn Animation>> {
    match name {
        "fade" => Some(Box::new(fade::Fade::new())),
        "sweep_vert" => Some(Box::new(sweep::Sweep::vertical())),
        "sweep_horiz" => Some(Box::new(sweep::Sweep::horizontal())),
        "rotate" => Some(Box::new(sweep::Rotate::new())),
        "sphere" => Some(Box::new(sweep::Sphere::new())),
        "spiral" => Some(Box::new(spiral::Spiral::new())),
        "snake" => Some(Box::new(spiral::Snake::new())),
        "snow" => Some(Box::new(snow::Snow::new())),
        "disco" => Some(Box::new(disco::Disco::new())),
        "disks" => Some(Box::new(disks::Disks::new())),
        "music" => Some(Box::new(music::Music::new(ctx.bin_feed.clone()))),
        "geodesic" => Some(Box::new(geodesic::Geodesic::new(ctx.cache_dir.clone()))),
        _ => None,
    }
}

/// Normal sample via Box-Muller. The pack carries no rand_distr, so the
/// two distributions the animations need are sampled locally.
pub fn sample_normal<R: Rng>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

/// Poisson sample: Knuth's product method for small rates, a rounded
/// normal approximation for large ones.
pub fn sample_poisson<R: Rng>(rng: &mut R, lambda: f64) -> u64 {
    if lambda <= 0.0 {
        return 0;
    }
    if lambda > 30.0 {
        return sample_normal(rng, lambda, lambda.sqrt()).round().max(0.0) as u64;
    }
    let limit = (-lambda).exp();
    let mut product: f64 = 1.0;
    let mut count = 0u64;
    loop {
        product *= rng.gen_range(0.0f64..1.0);
        if product <= limit {
            return count;
        }
        count += 1;
    }
}
