//! The e-paper [`Renderer`].

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;

use frontline_core::config::RenderConfig;
use frontline_core::render::{RenderArtifact, RenderError, Renderer};
use frontline_types::ConquerStatus;

use crate::magick;
use crate::svg::SvgComposer;

/// Intermediate SVG written next to the output image.
pub const SVG_FILE: &str = "temp.svg";

/// Composes an SVG from the territory snapshot and rasterizes it with
/// `ImageMagick` into `{output_dir}/{output_file}`.
///
/// The PNG is rasterized into a sibling file first and renamed into place,
/// so readers of the output path only ever see complete images.
pub struct EpaperRenderer {
    composer: SvgComposer,
    config: RenderConfig,
}

impl EpaperRenderer {
    /// Build a renderer, loading the template named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::Template`] if the template cannot be loaded.
    pub fn new(config: RenderConfig) -> Result<Self, RenderError> {
        let composer = SvgComposer::new(&config)?;
        Ok(Self { composer, config })
    }

    /// Where the final image is written.
    pub fn output_path(&self) -> PathBuf {
        Path::new(&self.config.output_dir).join(&self.config.output_file)
    }

    fn svg_path(&self) -> PathBuf {
        Path::new(&self.config.output_dir).join(SVG_FILE)
    }

    fn partial_path(&self) -> PathBuf {
        Path::new(&self.config.output_dir).join(format!(".partial-{}", self.config.output_file))
    }
}

impl Renderer for EpaperRenderer {
    async fn render(
        &self,
        status: &ConquerStatus,
        reason: &str,
    ) -> Result<RenderArtifact, RenderError> {
        let clock = Instant::now();
        tracing::info!(reason, territories = status.len(), "Generating PNG");

        let svg = self.composer.compose(status, reason)?;
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let svg_path = self.svg_path();
        tokio::fs::write(&svg_path, svg).await?;

        let partial = self.partial_path();
        let output = self.output_path();
        if let Err(err) = magick::rasterize(&self.config, &svg_path, &partial).await {
            if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                tracing::trace!(error = %cleanup, "No partial image to remove");
            }
            return Err(err);
        }
        tokio::fs::rename(&partial, &output).await?;

        Ok(RenderArtifact {
            path: output,
            rendered_at: Utc::now(),
            duration_ms: u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("frontline-render-{name}-{}", std::process::id()))
    }

    #[test]
    fn output_path_joins_dir_and_file() {
        let renderer = EpaperRenderer::new(RenderConfig {
            output_dir: String::from("/srv/epaper"),
            ..RenderConfig::default()
        })
        .unwrap();
        assert_eq!(renderer.output_path(), PathBuf::from("/srv/epaper/latest.png"));
    }

    #[test]
    fn missing_custom_template_is_rejected() {
        let result = EpaperRenderer::new(RenderConfig {
            template_path: Some(String::from("/nonexistent/frontline/template.svg.j2")),
            ..RenderConfig::default()
        });
        assert!(matches!(result, Err(RenderError::Template(_))));
    }

    #[tokio::test]
    async fn failed_rasterizer_keeps_svg_and_leaves_no_image() {
        let dir = scratch_dir("failed");
        let renderer = EpaperRenderer::new(RenderConfig {
            output_dir: dir.display().to_string(),
            convert_binary: String::from("frontline-test-no-such-rasterizer"),
            ..RenderConfig::default()
        })
        .unwrap();

        let result = renderer
            .render(&ConquerStatus::empty(), "Initial generation")
            .await;
        assert!(matches!(result, Err(RenderError::Command(_))));

        let svg = tokio::fs::read_to_string(dir.join(SVG_FILE)).await.unwrap();
        assert!(svg.contains("Initial generation"));
        assert!(!renderer.output_path().exists());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
