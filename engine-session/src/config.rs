use core::fmt;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::events::{GameEvent, ShaderKind};
use crate::scorer::BitTargets;

/// How the engine scales its low-resolution output to the display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ScalingOption {
    Shader = 0,
    Soft = 1,
    None = 2,
    LqShader = 3,
}

impl Default for ScalingOption {
    fn default() -> Self {
        ScalingOption::Shader
    }
}

impl ScalingOption {
    pub fn uses_shader(self) -> bool {
        matches!(self, ScalingOption::Shader | ScalingOption::LqShader)
    }
}

/// Which game the engine should run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum GameType {
    Simon1 = 0,
    Simon2 = 1,
    Fotaq = 2,
    IndyFoa = 3,
}

impl Default for GameType {
    fn default() -> Self {
        GameType::Simon1
    }
}

/// Everything an engine run is configured with.
///
/// Built by the caller and handed to the session explicitly; there is no
/// process-wide instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub scaling_option: ScalingOption,
    pub game_type: GameType,
    /// Whether the shader performance test has already been run on this device
    pub shader_tested: bool,
    pub ultra_mode_supported: bool,
    /// Client API major version requested for the rendering context
    pub api_version: u8,
    pub bit_targets: BitTargets,
    /// Ignore surface changes whose height exceeds their width
    pub landscape_only: bool,
    pub thread_name: Option<String>,
    /// Named bitmap resources (encoded image files) handed to the engine
    /// before its main loop starts
    pub bitmap_resources: Vec<(String, PathBuf)>,
    /// Shader sources handed to the engine before its main loop starts
    pub shader_sources: Vec<(ShaderKind, PathBuf)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scaling_option: ScalingOption::default(),
            game_type: GameType::default(),
            shader_tested: false,
            ultra_mode_supported: false,
            api_version: 2,
            bit_targets: BitTargets::default(),
            landscape_only: false,
            thread_name: None,
            bitmap_resources: Vec::new(),
            shader_sources: Vec::new(),
        }
    }
}

/// A (cheaply clonable) reference to the live [`SessionConfig`]
///
/// Updates made through any reference, including the ones the session makes
/// itself in response to engine events, are visible through all of them.
#[derive(Clone, Default)]
pub struct SessionConfigRef {
    config: Arc<RwLock<SessionConfig>>,
}

impl PartialEq for SessionConfigRef {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.config, &other.config) {
            true
        } else {
            let other_guard = other.config.read().unwrap();
            self.config.read().unwrap().eq(&*other_guard)
        }
    }
}

impl fmt::Debug for SessionConfigRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.config.read().unwrap().fmt(f)
    }
}

impl From<SessionConfig> for SessionConfigRef {
    fn from(config: SessionConfig) -> Self {
        Self::new(config)
    }
}

impl SessionConfigRef {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Returns a deep copy of the current configuration
    pub fn copy(&self) -> SessionConfig {
        self.config.read().unwrap().clone()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut SessionConfig) -> R) -> R {
        f(&mut self.config.write().unwrap())
    }

    pub fn scaling_option(&self) -> ScalingOption {
        self.config.read().unwrap().scaling_option
    }

    pub fn game_type(&self) -> GameType {
        self.config.read().unwrap().game_type
    }

    pub fn shader_tested(&self) -> bool {
        self.config.read().unwrap().shader_tested
    }

    pub fn ultra_mode_supported(&self) -> bool {
        self.config.read().unwrap().ultra_mode_supported
    }

    pub fn landscape_only(&self) -> bool {
        self.config.read().unwrap().landscape_only
    }

    /// Records the outcome of a shader test or scaler fallback reported by
    /// the engine. Other events leave the configuration untouched.
    pub(crate) fn apply_game_event(&self, event: GameEvent) {
        let mut config = self.config.write().unwrap();
        match event {
            GameEvent::ScalerFallback | GameEvent::ShaderTestFailure => {
                config.scaling_option = ScalingOption::Soft;
                config.shader_tested = true;
            }
            GameEvent::ScalerLqFallback => {
                config.scaling_option = ScalingOption::LqShader;
                config.shader_tested = true;
            }
            GameEvent::ShaderTestSuccess => {
                config.shader_tested = true;
            }
            _ => return,
        }
        log::debug!(
            "{event:?}: scaling = {:?}, shader tested = {}",
            config.scaling_option,
            config.shader_tested
        );
    }
}
