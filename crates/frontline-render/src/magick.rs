//! `ImageMagick` rasterization.
//!
//! Converts the composed SVG into a 4-bit grayscale PNG sized for the
//! e-paper panel: white background, centered, Floyd-Steinberg dithered
//! down to the configured number of gray levels, metadata stripped.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use frontline_core::config::RenderConfig;
use frontline_core::render::RenderError;

/// Arguments for one `convert` run from `svg` to `png`.
pub fn convert_args(config: &RenderConfig, svg: &Path, png: &Path) -> Vec<OsString> {
    let geometry = format!("{}x{}", config.width, config.height);
    let density = config.density.to_string();
    let colors = config.gray_levels.to_string();
    let mut args: Vec<OsString> = Vec::with_capacity(28);
    args.push(svg.as_os_str().to_owned());
    for arg in [
        "-background",
        "white",
        "-density",
        density.as_str(),
        "-resize",
        geometry.as_str(),
        "-gravity",
        "center",
        "-extent",
        geometry.as_str(),
        "-colorspace",
        "Gray",
        "-type",
        "Grayscale",
        "-dither",
        "FloydSteinberg",
        "-colors",
        colors.as_str(),
        "-define",
        "png:bit-depth=4",
        "-define",
        "png:color-type=0",
        "-strip",
    ] {
        args.push(OsString::from(arg));
    }
    args.push(png.as_os_str().to_owned());
    args
}

/// Run the rasterizer, bounded by `config.timeout_ms`.
///
/// The child is killed if the deadline passes.
pub async fn rasterize(config: &RenderConfig, svg: &Path, png: &Path) -> Result<(), RenderError> {
    let mut command = Command::new(&config.convert_binary);
    command
        .args(convert_args(config, svg, png))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|e| {
        RenderError::Command(format!("failed to start {}: {e}", config.convert_binary))
    })?;

    let output = tokio::time::timeout(config.timeout(), child.wait_with_output())
        .await
        .map_err(|elapsed| {
            tracing::warn!(error = %elapsed, binary = %config.convert_binary, "Rasterizer deadline passed");
            RenderError::Timeout {
                timeout_ms: config.timeout_ms,
            }
        })??;

    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RenderError::Command(format!(
            "{} exited with {}: {}",
            config.convert_binary,
            output.status,
            stderr.trim()
        )))
    }
}
