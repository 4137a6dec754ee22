//! Page rendering collaborators.
//!
//! The pipeline only knows the capability interfaces: render text to a
//! paginated page image, render an arbitrary raster image to a normalized
//! page, and inspect/split multi-frame containers. The production
//! implementations drive the classic fax toolchain (`paps` + Ghostscript,
//! ImageMagick `convert`, `tiffsplit`) as blocking child processes; tests
//! substitute fakes.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::Settings;
use crate::error::{RelayError, Result};

/// Bottom rows of white space left in place when cropping a rendered text
/// page, so the last line does not touch the page edge.
const CROP_LEAVE_ROWS: u32 = 94;

/// Layout parameters handed to the renderers.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub font_name: String,
    pub font_size: u32,
    pub top_margin: u32,
    pub page_width: u32,
    pub margin_left: u32,
    pub margin_right: u32,
}

impl RenderOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            font_name: settings.text_font_name.clone(),
            font_size: settings.text_font_size,
            top_margin: settings.text_top_margin,
            page_width: settings.page_width,
            margin_left: settings.margin_left,
            margin_right: settings.margin_right,
        }
    }

    /// Usable width between the margins.
    pub fn content_width(&self) -> u32 {
        self.page_width
            .saturating_sub(self.margin_left)
            .saturating_sub(self.margin_right)
    }
}

/// Renders one artifact into one fax page image.
pub trait PageRenderer {
    /// Render a text file into a paginated page image.
    fn render_text(&self, text_file: &Path, page_file: &Path, options: &RenderOptions)
        -> Result<()>;

    /// Render a raster image into a single width-normalized, margin-padded
    /// portrait page image.
    fn render_image(
        &self,
        image_file: &Path,
        page_file: &Path,
        options: &RenderOptions,
    ) -> Result<()>;
}

/// Inspects and splits multi-frame image containers.
pub trait FrameSplitter {
    /// Number of frames in the container.
    fn frame_count(&self, container: &Path) -> Result<u32>;

    /// Split the container into one file per frame inside `dest_dir`,
    /// returned in frame order.
    fn split(&self, container: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>>;
}

// ── Production renderer ─────────────────────────────────────────

/// Renderer driving `paps`/Ghostscript for text and ImageMagick for images.
pub struct CommandRenderer;

impl PageRenderer for CommandRenderer {
    fn render_text(
        &self,
        text_file: &Path,
        page_file: &Path,
        options: &RenderOptions,
    ) -> Result<()> {
        let input = fs::File::open(text_file).map_err(|e| RelayError::io(text_file, e))?;

        let mut paps = Command::new("paps")
            .arg(format!("--font={} {}", options.font_name, options.font_size))
            .arg(format!("--top-margin={}", options.top_margin))
            .stdin(Stdio::from(input))
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| render_error(text_file, format!("spawning paps: {e}")))?;

        let postscript = paps
            .stdout
            .take()
            .ok_or_else(|| render_error(text_file, "no paps output".into()))?;

        let gs_status = Command::new("gs")
            .arg("-sDEVICE=tiffg3")
            .arg(format!("-sOutputFile={}", page_file.display()))
            .args(["-dBATCH", "-dNOPAUSE", "-dSAFER", "-dQUIET", "-"])
            .stdin(Stdio::from(postscript))
            .status()
            .map_err(|e| render_error(text_file, format!("spawning gs: {e}")))?;

        let paps_status = paps
            .wait()
            .map_err(|e| render_error(text_file, format!("waiting for paps: {e}")))?;
        if !paps_status.success() {
            return Err(render_error(text_file, format!("paps exited {paps_status}")));
        }
        if !gs_status.success() {
            return Err(render_error(text_file, format!("gs exited {gs_status}")));
        }

        crop_page_bottom(page_file)
    }

    fn render_image(
        &self,
        image_file: &Path,
        page_file: &Path,
        options: &RenderOptions,
    ) -> Result<()> {
        let (width, height) = image::image_dimensions(image_file)
            .map_err(|e| render_error(image_file, format!("reading dimensions: {e}")))?;

        let mut command = Command::new("convert");
        command.arg(image_file);
        if width > height {
            command.args(["-rotate", "90"]);
        }
        command.args(["-resize", &format!("{}x", options.content_width())]);
        command.args(["-background", "white", "-gravity", "northwest"]);
        command.args(["-splice", &format!("{}x0", options.margin_left)]);
        command.args(["-background", "white", "-gravity", "northeast"]);
        command.args(["-splice", &format!("{}x0", options.margin_right)]);
        command.arg(page_file);

        let status = command
            .status()
            .map_err(|e| render_error(image_file, format!("spawning convert: {e}")))?;
        if !status.success() {
            return Err(render_error(image_file, format!("convert exited {status}")));
        }
        Ok(())
    }
}

/// Crop trailing white space off the bottom of a rendered text page, keeping
/// [`CROP_LEAVE_ROWS`] rows of padding. A page that cannot be decoded or has
/// nothing to crop is left untouched.
fn crop_page_bottom(page_file: &Path) -> Result<()> {
    let Ok(decoded) = image::open(page_file) else {
        return Ok(());
    };
    let gray = decoded.to_luma8();
    let Some(bottom) = bottom_content_row(&gray) else {
        return Ok(());
    };
    let keep = bottom + CROP_LEAVE_ROWS;
    if keep >= gray.height() {
        return Ok(());
    }
    let cropped = image::imageops::crop_imm(&gray, 0, 0, gray.width(), keep).to_image();
    cropped
        .save(page_file)
        .map_err(|e| render_error(page_file, format!("saving cropped page: {e}")))?;
    Ok(())
}

/// Lowest row that contains any non-white pixel.
fn bottom_content_row(image: &image::GrayImage) -> Option<u32> {
    (0..image.height())
        .rev()
        .find(|&y| (0..image.width()).any(|x| image.get_pixel(x, y)[0] != 255))
}

fn render_error(path: &Path, reason: String) -> RelayError {
    RelayError::RenderError {
        path: path.to_path_buf(),
        reason,
    }
}

// ── Production frame splitter ───────────────────────────────────

/// TIFF container handling: frame counting by walking the IFD chain,
/// splitting via `tiffsplit`.
pub struct TiffSplitter;

impl FrameSplitter for TiffSplitter {
    fn frame_count(&self, container: &Path) -> Result<u32> {
        let bytes = fs::read(container).map_err(|e| RelayError::io(container, e))?;
        tiff_frame_count(&bytes).ok_or_else(|| RelayError::FrameError {
            path: container.to_path_buf(),
            reason: "not a readable TIFF container".into(),
        })
    }

    fn split(&self, container: &Path, dest_dir: &Path) -> Result<Vec<PathBuf>> {
        let status = Command::new("tiffsplit")
            .arg(container)
            .current_dir(dest_dir)
            .status()
            .map_err(|e| RelayError::FrameError {
                path: container.to_path_buf(),
                reason: format!("spawning tiffsplit: {e}"),
            })?;
        if !status.success() {
            return Err(RelayError::FrameError {
                path: container.to_path_buf(),
                reason: format!("tiffsplit exited {status}"),
            });
        }

        let mut frames: Vec<PathBuf> = fs::read_dir(dest_dir)
            .map_err(|e| RelayError::io(dest_dir, e))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .collect();
        // tiffsplit names outputs xaa.tif, xab.tif, … — lexical order is
        // frame order.
        frames.sort();
        Ok(frames)
    }
}

/// Count the frames (IFDs) of a TIFF byte stream.
///
/// Reads the 8-byte header for byte order and the first IFD offset, then
/// follows the next-IFD links. Returns `None` for anything that is not a
/// well-formed TIFF.
pub fn tiff_frame_count(bytes: &[u8]) -> Option<u32> {
    let big_endian = match bytes.get(0..2)? {
        b"MM" => true,
        b"II" => false,
        _ => return None,
    };
    if read_u16(bytes, 2, big_endian)? != 42 {
        return None;
    }

    let mut offset = read_u32(bytes, 4, big_endian)? as usize;
    let mut frames = 0u32;
    while offset != 0 {
        // Guards against cyclic IFD chains in corrupt files.
        if frames >= 10_000 {
            return None;
        }
        let entries = read_u16(bytes, offset, big_endian)? as usize;
        frames += 1;
        offset = read_u32(bytes, offset + 2 + entries * 12, big_endian)? as usize;
    }
    (frames > 0).then_some(frames)
}

fn read_u16(bytes: &[u8], at: usize, big_endian: bool) -> Option<u16> {
    let chunk: [u8; 2] = bytes.get(at..at + 2)?.try_into().ok()?;
    Some(if big_endian {
        u16::from_be_bytes(chunk)
    } else {
        u16::from_le_bytes(chunk)
    })
}

fn read_u32(bytes: &[u8], at: usize, big_endian: bool) -> Option<u32> {
    let chunk: [u8; 4] = bytes.get(at..at + 4)?.try_into().ok()?;
    Some(if big_endian {
        u32::from_be_bytes(chunk)
    } else {
        u32::from_le_bytes(chunk)
    })
}
