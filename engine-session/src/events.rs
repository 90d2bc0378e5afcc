//! The integer event protocol spoken with the engine.
//!
//! The numeric values are a fixed contract with the native side and must
//! never be renumbered. Raw codes are decoded into these enums once, at the
//! boundary, and unknown codes are dropped there.

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Game-level notifications. The same numbering is used for requests sent
/// into the engine and for notifications the engine reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum GameEvent {
    /// Hardware scaling didn't work out, fall back to software scaling
    ScalerFallback = 0,
    ShouldTestShader = 1,
    ShaderTestSuccess = 2,
    ShaderTestFailure = 3,
    LoadSuccess = 4,
    LoadFailure = 5,
    SaveSuccess = 6,
    SaveFailure = 7,
    SaveCancelled = 8,
    HebrewTitleGone = 9,
    PostcardShown = 10,
    ShowMenu = 11,
    /// The high quality shader is too slow, fall back to the low quality one
    ScalerLqFallback = 12,
    UseUltraMode = 13,
}

/// In-game menu choices the engine asks the host to present
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum GameOption {
    None = 0,
    Save = 1,
    Load = 2,
    Exit = 3,
}

/// Which stage a preloaded shader source belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum ShaderKind {
    Vertex = 0,
    Fragment = 1,
    LqVertex = 2,
    LqFragment = 3,
}

/// The `type` argument of an input event pushed into the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(i32)]
pub enum InputEventType {
    SysKey = 0,
    Key = 1,
    Dpad = 2,
    Down = 3,
    Scroll = 4,
    Tap = 5,
    DoubleTap = 6,
    Multi = 7,
    Ball = 8,
    /// Asks the engine to leave its main loop; the cooperative way to end a run
    Quit = 0x1000,
}

/// An input event for the engine, with up to five type-specific arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: InputEventType,
    pub args: [i32; 5],
}

impl InputEvent {
    pub fn new(kind: InputEventType, args: [i32; 5]) -> Self {
        Self { kind, args }
    }

    pub fn quit() -> Self {
        Self::new(InputEventType::Quit, [0; 5])
    }
}
