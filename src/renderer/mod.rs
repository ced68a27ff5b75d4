//! Rendering module
//!
//! `shapes` builds a screen-space draw list from a `Snapshot`; `canvas`
//! plays it back on a Canvas2D context in the browser.

#[cfg(target_arch = "wasm32")]
pub mod canvas;
pub mod shapes;

#[cfg(target_arch = "wasm32")]
pub use canvas::CanvasRenderer;
pub use shapes::{DrawCmd, avatar_triangle, build_frame, instruction_image};
