//! Ranking of platform-reported display configurations.
//!
//! Several drivers ship a broken `eglChooseConfig` so instead of asking the
//! platform for a match we query every configuration it advertises and rank
//! them ourselves with a fixed heuristic that favours the tightest fit at or
//! above an RGB565 colour buffer, no depth/stencil and no multisampling.

use std::fmt;

use bitflags::bitflags;
use num_enum::{FromPrimitive, IntoPrimitive};

bitflags! {
    /// The kinds of drawable a configuration can render to (`EGL_SURFACE_TYPE`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SurfaceTypes: u32 {
        const PBUFFER = 0x0001;
        const PIXMAP = 0x0002;
        const WINDOW = 0x0004;
    }
}

bitflags! {
    /// The client APIs a configuration supports (`EGL_RENDERABLE_TYPE`)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RenderableTypes: u32 {
        const OPENGL_ES = 0x0001;
        const OPENVG = 0x0002;
        const OPENGL_ES2 = 0x0004;
        const OPENGL = 0x0008;
        const OPENGL_ES3 = 0x0040;
    }
}

/// The `EGL_CONFIG_CAVEAT` of a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum Caveat {
    None = 0x3038,
    Slow = 0x3050,
    NonConformant = 0x3051,

    #[num_enum(catch_all)]
    Unknown(i32),
}

/// One configuration as reported by the platform. Never mutated once queried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConfigurationCandidate {
    /// Platform identifier, only used for logging
    pub id: i32,
    pub red_bits: i32,
    pub green_bits: i32,
    pub blue_bits: i32,
    pub alpha_bits: i32,
    pub depth_bits: i32,
    pub stencil_bits: i32,
    pub samples: i32,
    pub surface_types: SurfaceTypes,
    pub renderable_types: RenderableTypes,
    pub caveat: Caveat,
}

impl Default for ConfigurationCandidate {
    fn default() -> Self {
        Self {
            id: 0,
            red_bits: 0,
            green_bits: 0,
            blue_bits: 0,
            alpha_bits: 0,
            depth_bits: 0,
            stencil_bits: 0,
            samples: 0,
            surface_types: SurfaceTypes::empty(),
            renderable_types: RenderableTypes::empty(),
            caveat: Caveat::None,
        }
    }
}

impl fmt::Display for ConfigurationCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.alpha_bits > 0 {
            write!(
                f,
                "[{}] RGBA{}{}{}{}",
                self.id, self.red_bits, self.green_bits, self.blue_bits, self.alpha_bits
            )?;
        } else {
            write!(
                f,
                "[{}] RGB{}{}{}",
                self.id, self.red_bits, self.green_bits, self.blue_bits
            )?;
        }
        if self.depth_bits > 0 {
            write!(f, " D{}", self.depth_bits)?;
        }
        if self.stencil_bits > 0 {
            write!(f, " S{}", self.stencil_bits)?;
        }
        if self.samples > 0 {
            write!(f, " MSAAx{}", self.samples)?;
        }
        if self.surface_types.contains(SurfaceTypes::WINDOW) {
            write!(f, " W")?;
        }
        if self.surface_types.contains(SurfaceTypes::PBUFFER) {
            write!(f, " P")?;
        }
        if self.surface_types.contains(SurfaceTypes::PIXMAP) {
            write!(f, " X")?;
        }
        match self.caveat {
            Caveat::None => {}
            Caveat::Slow => write!(f, " SLOW")?,
            Caveat::NonConformant => write!(f, " NON_CONFORMANT")?,
            Caveat::Unknown(value) => write!(f, " unknown CAVEAT 0x{value:x}")?,
        }
        write!(f, " renderable: {:#x}", self.renderable_types.bits())
    }
}

/// Minimum bit counts a configuration should provide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitTargets {
    pub red: i32,
    pub green: i32,
    pub blue: i32,
    pub alpha: i32,
    pub depth: i32,
    pub stencil: i32,
}

impl Default for BitTargets {
    /// At least RGB565, nothing else required
    fn default() -> Self {
        Self {
            red: 5,
            green: 6,
            blue: 5,
            alpha: 0,
            depth: 0,
            stencil: 0,
        }
    }
}

pub const BASE_SCORE: i32 = 10000;
const CAVEAT_PENALTY: i32 = 1000;
const SAMPLE_PENALTY: i32 = 100;
const MATCH_BONUS: i32 = 10;

/// The bonus applies whenever the target is met, so any bit count meets a
/// zero target
fn weight_bits(actual: i32, target: i32) -> i32 {
    let mut score = 0;
    if actual >= target {
        score += MATCH_BONUS;
    }
    // penalize wasted bits
    score -= actual - target;
    score
}

/// Picks the configuration to create the rendering context against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigChooser {
    pub targets: BitTargets,
    pub required_api: RenderableTypes,
}

impl Default for ConfigChooser {
    fn default() -> Self {
        Self {
            targets: BitTargets::default(),
            required_api: RenderableTypes::OPENGL_ES2,
        }
    }
}

impl ConfigChooser {
    pub fn new(targets: BitTargets, required_api: RenderableTypes) -> Self {
        Self {
            targets,
            required_api,
        }
    }

    /// Whether a candidate can be used for on-screen rendering with the required API
    pub fn is_usable(&self, candidate: &ConfigurationCandidate) -> bool {
        candidate.surface_types.contains(SurfaceTypes::WINDOW)
            && candidate.renderable_types.contains(self.required_api)
    }

    /// Whether a candidate provides at least the targeted colour depth
    pub fn meets_color_targets(&self, candidate: &ConfigurationCandidate) -> bool {
        candidate.red_bits >= self.targets.red
            && candidate.green_bits >= self.targets.green
            && candidate.blue_bits >= self.targets.blue
    }

    pub fn score(&self, candidate: &ConfigurationCandidate) -> i32 {
        let t = &self.targets;
        let mut score = BASE_SCORE;

        if candidate.caveat != Caveat::None {
            score -= CAVEAT_PENALTY;
        }

        // less MSAA is better
        score -= candidate.samples * SAMPLE_PENALTY;

        score += weight_bits(candidate.red_bits, t.red);
        score += weight_bits(candidate.green_bits, t.green);
        score += weight_bits(candidate.blue_bits, t.blue);
        score += weight_bits(candidate.alpha_bits, t.alpha);
        score += weight_bits(candidate.depth_bits, t.depth);
        score += weight_bits(candidate.stencil_bits, t.stencil);

        score
    }

    /// Returns the index of the best candidate, or `None` for an empty list.
    ///
    /// Candidates that can't render on-screen with the required API are only
    /// considered if nothing else is available, and likewise for candidates
    /// below the colour targets. Among the remaining candidates the first one
    /// with the strictly highest score wins.
    pub fn choose_index(&self, candidates: &[ConfigurationCandidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }

        let all: Vec<usize> = (0..candidates.len()).collect();

        let mut pool: Vec<usize> = all
            .iter()
            .copied()
            .filter(|&i| self.is_usable(&candidates[i]))
            .collect();
        if pool.is_empty() {
            log::error!("Unable to find an acceptable display config, expect badness.");
            pool = all;
        }

        let color_matches: Vec<usize> = pool
            .iter()
            .copied()
            .filter(|&i| self.meets_color_targets(&candidates[i]))
            .collect();
        if color_matches.is_empty() {
            log::warn!("No display config meets the colour targets {:?}", self.targets);
        } else {
            pool = color_matches;
        }

        log::debug!("Display configs:");
        let mut best: Option<(usize, i32)> = None;
        for i in pool {
            let score = self.score(&candidates[i]);
            log::debug!("{} ({})", candidates[i], score);
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((i, score)),
            }
        }

        let (index, _) = best?;
        log::debug!("Chosen display config: {}", candidates[index]);
        Some(index)
    }

    pub fn choose<'a>(
        &self,
        candidates: &'a [ConfigurationCandidate],
    ) -> Option<&'a ConfigurationCandidate> {
        self.choose_index(candidates).map(|i| &candidates[i])
    }
}
