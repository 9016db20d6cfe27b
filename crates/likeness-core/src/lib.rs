//! likeness-core — face-matching engine.
//!
//! Localizes the most prominent face in a photograph, extracts a
//! fixed-format descriptor through the active backend (hand-engineered
//! classical features, or a pretrained embedding model when its runtime is
//! present), scores descriptor pairs on a 0-100 confidence scale, and
//! searches a registry's candidate set for the best match.
//!
//! The backend is chosen once per process by [`MatchingEngine::probe`] and
//! never changes afterwards.

pub mod cascade;
pub mod codec;
pub mod dnn;
pub mod embedder;
pub mod engine;
pub mod features;
pub mod imageops;
pub mod localizer;
pub mod model_fetch;
pub mod scorer;
pub mod search;
pub mod types;

pub use engine::{default_model_dir, EngineConfig, MatchingEngine, Verification};
pub use scorer::ClassicalScorerParams;
pub use types::{Backend, FaceDescriptor, FaceRegion, ImageSource, MatchResult};
