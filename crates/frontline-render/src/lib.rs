//! E-paper renderer for the Frontline territory tracker.
//!
//! - [`svg`]: builds the SVG document from a territory snapshot.
//! - [`magick`]: rasterizes it to a grayscale PNG with `ImageMagick`.
//! - [`renderer`]: ties both together behind
//!   [`frontline_core::render::Renderer`].

pub mod magick;
pub mod renderer;
pub mod svg;

pub use renderer::EpaperRenderer;
pub use svg::SvgComposer;
