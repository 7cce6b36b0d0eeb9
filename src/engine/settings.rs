//! Typed registry of engine tunables.
//!
//! Each [`Setting`] carries a stable UI key used in persisted snapshots, the
//! accessor stem the engine exports (`web_get_<stem>` / `web_set_<stem>`),
//! its value kind and its hard-coded default.

use serde::Serialize;
use serde_json::Value;

use crate::color::{self, ColorValue};

/// Kind and range of a setting's value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingKind {
    Float { min: f32, max: f32 },
    Int { min: i32, max: i32 },
    Bool,
    Color,
}

/// A validated setting value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SettingValue {
    Float(f32),
    Int(i32),
    Bool(bool),
    Color(ColorValue),
}

impl SettingValue {
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f32> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub const fn as_color(&self) -> Option<ColorValue> {
        match self {
            Self::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// JSON form used in persisted snapshots.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl SettingKind {
    /// Validate a raw persisted value, clamping numbers into range.
    ///
    /// Returns `None` when the value is not well-typed for this kind.
    pub fn coerce(&self, raw: &Value) -> Option<SettingValue> {
        match *self {
            Self::Float { min, max } => {
                let v = raw.as_f64()?;
                if !v.is_finite() {
                    return None;
                }
                Some(SettingValue::Float((v as f32).clamp(min, max)))
            }
            Self::Int { min, max } => {
                let v = raw.as_f64()?;
                if !v.is_finite() {
                    return None;
                }
                let rounded = v.round().clamp(f64::from(min), f64::from(max));
                Some(SettingValue::Int(rounded as i32))
            }
            Self::Bool => match raw {
                Value::Bool(b) => Some(SettingValue::Bool(*b)),
                Value::Number(n) => match n.as_f64()? {
                    v if v == 0.0 => Some(SettingValue::Bool(false)),
                    v if v == 1.0 => Some(SettingValue::Bool(true)),
                    _ => None,
                },
                _ => None,
            },
            Self::Color => match raw {
                Value::Number(n) => {
                    let v = n.as_u64()?;
                    u32::try_from(v).ok().map(|v| SettingValue::Color(color::unpack(v)))
                }
                Value::Object(map) => {
                    let channel = |name: &str| map.get(name).and_then(Value::as_f64);
                    let (r, g, b) = (channel("r")?, channel("g")?, channel("b")?);
                    let a = channel("a").unwrap_or(255.0);
                    Some(SettingValue::Color(ColorValue::normalize(r, g, b, a)))
                }
                _ => None,
            },
        }
    }

    /// Clamp an in-memory value of the right kind; `None` on a kind mismatch.
    pub fn clamp(&self, value: SettingValue) -> Option<SettingValue> {
        match (*self, value) {
            (Self::Float { min, max }, SettingValue::Float(v)) if v.is_finite() => {
                Some(SettingValue::Float(v.clamp(min, max)))
            }
            (Self::Int { min, max }, SettingValue::Int(v)) => {
                Some(SettingValue::Int(v.clamp(min, max)))
            }
            (Self::Bool, SettingValue::Bool(_)) | (Self::Color, SettingValue::Color(_)) => {
                Some(value)
            }
            _ => None,
        }
    }

    /// Encode a value for the engine's numeric accessor ABI.
    pub fn to_wire(&self, value: SettingValue) -> f64 {
        match value {
            SettingValue::Float(v) => f64::from(v),
            SettingValue::Int(v) => f64::from(v),
            SettingValue::Bool(b) => {
                if b {
                    1.0
                } else {
                    0.0
                }
            }
            SettingValue::Color(c) => f64::from(color::pack(c)),
        }
    }

    /// Decode an engine read-back; `None` when the engine returned garbage.
    pub fn from_wire(&self, wire: f64) -> Option<SettingValue> {
        if !wire.is_finite() {
            return None;
        }
        Some(match *self {
            Self::Float { .. } => SettingValue::Float(wire as f32),
            Self::Int { .. } => SettingValue::Int(wire.round() as i32),
            Self::Bool => SettingValue::Bool(wire != 0.0),
            Self::Color => {
                SettingValue::Color(color::unpack(wire.clamp(0.0, f64::from(u32::MAX)) as u32))
            }
        })
    }
}

/// Static description of one tunable.
#[derive(Debug, Clone, Copy)]
pub struct SettingSpec {
    pub key: &'static str,
    pub stem: &'static str,
    pub kind: SettingKind,
    pub default: SettingValue,
}

/// Every tunable the panel tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Setting {
    TimePlaying,
    TimeFactor,
    TimeStepMultiplier,
    TargetFps,
    GravityMultiplier,
    Softening,
    Theta,
    DarkMatterEnabled,
    LoopingSpaceEnabled,
    PathPredictionEnabled,
    DrawQuadtree,
    DrawZCurves,
    GlowEnabled,
    TrailsLength,
    TrailsThickness,
    GlobalTrails,
    SelectedTrails,
    LocalTrails,
    WhiteTrails,
    ColorMode,
    LightColor,
    WallBaseColor,
    WallSpecularColor,
    PauseAfterRecording,
    CleanSceneAfterRecording,
    RecordingTimeLimit,
    ToolDrawParticles,
    ToolBlackHole,
    ToolBigGalaxy,
    ToolSmallGalaxy,
    ToolStar,
    ToolBigBang,
    ToolEraser,
    ToolRadialForce,
    ToolSpin,
    ToolGrab,
    ToolPointLight,
    ToolAreaLight,
    ToolConeLight,
    ToolWall,
    ToolCircle,
    ToolDrawShape,
    ToolLens,
    ToolMoveOptics,
    ToolEraseOptics,
    ToolSelectOptics,
}

const fn float(
    key: &'static str,
    stem: &'static str,
    min: f32,
    max: f32,
    default: f32,
) -> SettingSpec {
    SettingSpec {
        key,
        stem,
        kind: SettingKind::Float { min, max },
        default: SettingValue::Float(default),
    }
}

const fn int(
    key: &'static str,
    stem: &'static str,
    min: i32,
    max: i32,
    default: i32,
) -> SettingSpec {
    SettingSpec {
        key,
        stem,
        kind: SettingKind::Int { min, max },
        default: SettingValue::Int(default),
    }
}

const fn toggle(key: &'static str, stem: &'static str, default: bool) -> SettingSpec {
    SettingSpec {
        key,
        stem,
        kind: SettingKind::Bool,
        default: SettingValue::Bool(default),
    }
}

const fn color(key: &'static str, stem: &'static str, default: ColorValue) -> SettingSpec {
    SettingSpec {
        key,
        stem,
        kind: SettingKind::Color,
        default: SettingValue::Color(default),
    }
}

impl Setting {
    /// All settings in stable registry order.
    pub const ALL: [Self; 46] = [
        Self::TimePlaying,
        Self::TimeFactor,
        Self::TimeStepMultiplier,
        Self::TargetFps,
        Self::GravityMultiplier,
        Self::Softening,
        Self::Theta,
        Self::DarkMatterEnabled,
        Self::LoopingSpaceEnabled,
        Self::PathPredictionEnabled,
        Self::DrawQuadtree,
        Self::DrawZCurves,
        Self::GlowEnabled,
        Self::TrailsLength,
        Self::TrailsThickness,
        Self::GlobalTrails,
        Self::SelectedTrails,
        Self::LocalTrails,
        Self::WhiteTrails,
        Self::ColorMode,
        Self::LightColor,
        Self::WallBaseColor,
        Self::WallSpecularColor,
        Self::PauseAfterRecording,
        Self::CleanSceneAfterRecording,
        Self::RecordingTimeLimit,
        Self::ToolDrawParticles,
        Self::ToolBlackHole,
        Self::ToolBigGalaxy,
        Self::ToolSmallGalaxy,
        Self::ToolStar,
        Self::ToolBigBang,
        Self::ToolEraser,
        Self::ToolRadialForce,
        Self::ToolSpin,
        Self::ToolGrab,
        Self::ToolPointLight,
        Self::ToolAreaLight,
        Self::ToolConeLight,
        Self::ToolWall,
        Self::ToolCircle,
        Self::ToolDrawShape,
        Self::ToolLens,
        Self::ToolMoveOptics,
        Self::ToolEraseOptics,
        Self::ToolSelectOptics,
    ];

    /// Mutually exclusive tool toggles.
    pub const TOOLS: [Self; 20] = [
        Self::ToolDrawParticles,
        Self::ToolBlackHole,
        Self::ToolBigGalaxy,
        Self::ToolSmallGalaxy,
        Self::ToolStar,
        Self::ToolBigBang,
        Self::ToolEraser,
        Self::ToolRadialForce,
        Self::ToolSpin,
        Self::ToolGrab,
        Self::ToolPointLight,
        Self::ToolAreaLight,
        Self::ToolConeLight,
        Self::ToolWall,
        Self::ToolCircle,
        Self::ToolDrawShape,
        Self::ToolLens,
        Self::ToolMoveOptics,
        Self::ToolEraseOptics,
        Self::ToolSelectOptics,
    ];

    pub const fn spec(self) -> SettingSpec {
        match self {
            Self::TimePlaying => toggle("timePlaying", "time_playing", true),
            Self::TimeFactor => float("timeFactor", "time_factor", 0.0, 5.0, 1.0),
            Self::TimeStepMultiplier => float("timeStep", "time_step_multiplier", 0.1, 5.0, 1.0),
            Self::TargetFps => int("targetFps", "target_fps", 1, 1000, 144),
            Self::GravityMultiplier => float("gravity", "gravity_multiplier", 0.0, 5.0, 1.0),
            Self::Softening => float("softening", "softening", 0.5, 30.0, 2.5),
            Self::Theta => float("theta", "theta", 0.1, 5.0, 0.8),
            Self::DarkMatterEnabled => toggle("darkMatter", "dark_matter_enabled", true),
            Self::LoopingSpaceEnabled => toggle("loopingSpace", "looping_space_enabled", true),
            Self::PathPredictionEnabled => {
                toggle("pathPrediction", "path_prediction_enabled", false)
            }
            Self::DrawQuadtree => toggle("drawQuadtree", "draw_quadtree", false),
            Self::DrawZCurves => toggle("drawZCurves", "draw_z_curves", false),
            Self::GlowEnabled => toggle("glowEnabled", "glow_enabled", false),
            Self::TrailsLength => int("trailsLength", "trails_length", 0, 1500, 48),
            Self::TrailsThickness => float("trailsThickness", "trails_thickness", 0.01, 1.5, 0.1),
            Self::GlobalTrails => toggle("globalTrails", "global_trails", false),
            Self::SelectedTrails => toggle("selectedTrails", "selected_trails", false),
            Self::LocalTrails => toggle("localTrails", "local_trails", false),
            Self::WhiteTrails => toggle("whiteTrails", "white_trails", false),
            Self::ColorMode => int("colorMode", "color_mode", 0, 9, 0),
            Self::LightColor => color("lightColor", "light_color", ColorValue::rgb(255, 255, 255)),
            Self::WallBaseColor => {
                color("wallBaseColor", "wall_base_color", ColorValue::rgb(200, 200, 200))
            }
            Self::WallSpecularColor => {
                color("wallSpecularColor", "wall_specular_color", ColorValue::WHITE)
            }
            Self::PauseAfterRecording => {
                toggle("pauseAfterRecording", "pause_after_recording", false)
            }
            Self::CleanSceneAfterRecording => {
                toggle("cleanSceneAfterRecording", "clean_scene_after_recording", false)
            }
            Self::RecordingTimeLimit => {
                float("recordingTimeLimit", "recording_time_limit", 0.0, 60.0, 0.0)
            }
            Self::ToolDrawParticles => toggle("toolDrawParticles", "tool_draw_particles", false),
            Self::ToolBlackHole => toggle("toolBlackHole", "tool_black_hole", false),
            Self::ToolBigGalaxy => toggle("toolBigGalaxy", "tool_big_galaxy", false),
            Self::ToolSmallGalaxy => toggle("toolSmallGalaxy", "tool_small_galaxy", false),
            Self::ToolStar => toggle("toolStar", "tool_star", false),
            Self::ToolBigBang => toggle("toolBigBang", "tool_big_bang", false),
            Self::ToolEraser => toggle("toolEraser", "tool_eraser", false),
            Self::ToolRadialForce => toggle("toolRadialForce", "tool_radial_force", false),
            Self::ToolSpin => toggle("toolSpin", "tool_spin", false),
            Self::ToolGrab => toggle("toolGrab", "tool_grab", false),
            Self::ToolPointLight => toggle("toolPointLight", "tool_point_light", false),
            Self::ToolAreaLight => toggle("toolAreaLight", "tool_area_light", false),
            Self::ToolConeLight => toggle("toolConeLight", "tool_cone_light", false),
            Self::ToolWall => toggle("toolWall", "tool_wall", false),
            Self::ToolCircle => toggle("toolCircle", "tool_circle", false),
            Self::ToolDrawShape => toggle("toolDrawShape", "tool_draw_shape", false),
            Self::ToolLens => toggle("toolLens", "tool_lens", false),
            Self::ToolMoveOptics => toggle("toolMoveOptics", "tool_move_optics", false),
            Self::ToolEraseOptics => toggle("toolEraseOptics", "tool_erase_optics", false),
            Self::ToolSelectOptics => toggle("toolSelectOptics", "tool_select_optics", false),
        }
    }

    pub const fn key(self) -> &'static str {
        self.spec().key
    }

    pub const fn kind(self) -> SettingKind {
        self.spec().kind
    }

    pub const fn default_value(self) -> SettingValue {
        self.spec().default
    }

    pub fn getter(self) -> String {
        format!("web_get_{}", self.spec().stem)
    }

    pub fn setter(self) -> String {
        format!("web_set_{}", self.spec().stem)
    }

    /// Look up a setting by its UI key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.key() == key)
    }

    pub fn is_tool(self) -> bool {
        Self::TOOLS.contains(&self)
    }

    /// Settings switched off when `self` is switched on.
    pub fn exclusive_with(self) -> Vec<Self> {
        match self {
            Self::GlobalTrails => vec![Self::SelectedTrails],
            Self::SelectedTrails => vec![Self::GlobalTrails],
            tool if tool.is_tool() => Self::TOOLS.into_iter().filter(|t| *t != tool).collect(),
            _ => Vec::new(),
        }
    }
}
