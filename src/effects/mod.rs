// src/effects/mod.rs

pub mod chorus;
pub mod compressor;
pub mod delay;
pub mod equalizer;
pub mod graph;
pub mod params;
pub mod reverb;

pub use graph::{EffectChain, EffectKind, EffectNode, EffectsProcessor};
pub use params::EffectParameters;
