// THEORY:
// This file is the main entry point for the `chroma_shift` library crate.
// It defines the public API exposed to whatever service embeds the engine.
//
// The engine turns one raster image plus a list of palettes into one recolored
// variation per palette. Callers normally need only three things: a
// `RecolorConfig`, the `VariationOrchestrator` that runs a batch, and a
// `StorageSink` to hand finished images to. The single-palette
// `RecolorPipeline` and the individual stages in `core_modules` stay public for
// callers that want to drive a step on its own.
//
// The library emits `tracing` events but never installs a subscriber; that is
// the embedding application's decision.

pub mod config;
pub mod core_modules;
pub mod error;
pub mod parallel_pipeline;
pub mod pipeline;
pub mod storage;

pub use crate::config::{KMeansConfig, MaskTolerance, RecolorConfig};
pub use crate::core_modules::cache::ImageCache;
pub use crate::core_modules::codec::OutputFormat;
pub use crate::core_modules::color::{HsvColor, LabColor, RgbColor};
pub use crate::core_modules::pixel_buffer::PixelBuffer;
pub use crate::error::{ErrorKind, RecolorError, Result};
pub use crate::parallel_pipeline::{VariationOrchestrator, VariationRenderer};
pub use crate::pipeline::{
    DominantColor, Palette, PaletteSpec, RecolorPipeline, VariationFailure, VariationOutput,
    VariationResult, VariationSpec,
};
pub use crate::storage::{DirectorySink, MemoryStorageSink, StorageSink, VariationMetadata};
