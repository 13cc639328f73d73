// THEORY:
// The stages of the recoloring engine, from raw bytes to finished variation.
// Each module is a self-contained step with a plain-data hand-off to the next:
// codec -> pixel_buffer -> dominant -> palette_mapper -> recolor (mask) -> blender.
// `color` and `palette` are the shared vocabulary; `cache` sits in front of the codec.

pub mod blender;
pub mod cache;
pub mod codec;
pub mod color;
pub mod dominant;
pub mod mask;
pub mod palette;
pub mod palette_mapper;
pub mod pixel_buffer;
pub mod recolor;
