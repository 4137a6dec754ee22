//! Artifact persistence and run-scoped decision state.
//!
//! Artifacts are the sequence-numbered files a message is reduced to before
//! rendering. Their on-disk names are never reused within a run, even when
//! an artifact is later dropped, and list order is page order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{RelayError, Result};
use crate::parser::decode::Decoded;
use crate::render::FrameSplitter;
use crate::sniff;

/// Sub-sequence stride for frames unpacked from a multi-frame container:
/// frame `i` of parent `seq` becomes `seq * STRIDE + i`, which cannot
/// collide with the main counter.
pub const FRAME_SEQ_STRIDE: u64 = 10_000;

/// What a persisted artifact will be rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Text,
    Image,
}

/// One persisted, sequence-numbered output unit.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub seq: u64,
    pub file_name: String,
    pub kind: ArtifactKind,
}

impl Artifact {
    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(&self.file_name)
    }

    /// Name of the rendered page for this artifact (`<stem>.tiff`).
    pub fn page_name(&self) -> String {
        match self.file_name.rsplit_once('.') {
            Some((stem, _)) => format!("{stem}.tiff"),
            None => format!("{}.tiff", self.file_name),
        }
    }
}

/// Mutable state threaded through one run of the pipeline.
#[derive(Debug)]
pub struct DecisionState {
    /// The envelope caption and trigger scan still have to happen.
    pub first_text_pending: bool,
    /// The standard-resolution trigger was seen.
    pub standard_resolution: bool,
    /// At least one text part was encountered (even if discarded).
    pub saw_text: bool,
    /// Next artifact sequence number. Monotonic, never reused.
    pub counter: u64,
    /// Ordered artifact list — insertion order becomes page order.
    pub artifacts: Vec<Artifact>,
}

impl Default for DecisionState {
    fn default() -> Self {
        Self {
            first_text_pending: true,
            standard_resolution: false,
            saw_text: false,
            counter: 1,
            artifacts: Vec::new(),
        }
    }
}

/// Writes decided artifacts into the run's scratch directory.
pub struct ArtifactWriter<'a> {
    dir: &'a Path,
}

impl<'a> ArtifactWriter<'a> {
    pub fn new(dir: &'a Path) -> Self {
        Self { dir }
    }

    /// The scratch directory artifacts are written into.
    pub fn dir(&self) -> &Path {
        self.dir
    }

    /// Persist one artifact, re-checking the kind hint against the payload.
    ///
    /// Upstream classification may have been overridden since the payload
    /// was decoded, so the check is repeated at write time: a "binary"
    /// artifact whose payload is text is written as `<seq>.txt`, a "text"
    /// artifact whose payload is binary gets its sniffed image extension
    /// (`.jpg` when unrecognizable). Returns the artifact actually written.
    pub fn persist(
        &self,
        hint: ArtifactKind,
        file_name: String,
        data: &Decoded,
        seq: u64,
        subject: &str,
        sender: &str,
    ) -> Result<Artifact> {
        let mut kind = hint;
        let mut file_name = file_name;

        match (hint, data) {
            (ArtifactKind::Image, Decoded::Text(_)) => {
                kind = ArtifactKind::Text;
                file_name = format!("{seq}.txt");
                info!(
                    subject,
                    sender, "Saving image part as a text file (wrong content type in the message)"
                );
            }
            (ArtifactKind::Text, Decoded::Binary(bytes)) => {
                kind = ArtifactKind::Image;
                let ext = sniff::image_format(bytes)
                    .map(sniff::extension_for)
                    .unwrap_or("jpg");
                file_name = format!("{seq}.{ext}");
                info!(
                    subject,
                    sender, "Saving text part as an image file (wrong content type in the message)"
                );
            }
            _ => {}
        }

        let path = self.dir.join(&file_name);
        fs::write(&path, data.bytes()).map_err(|e| RelayError::PersistError {
            seq,
            reason: e.to_string(),
        })?;

        Ok(Artifact {
            seq,
            file_name,
            kind,
        })
    }

    /// Split a multi-frame container into one `.tif` artifact per frame.
    ///
    /// Frames keep their original order and take sub-sequence numbers under
    /// [`FRAME_SEQ_STRIDE`]; the parent file stays on disk but its artifact
    /// slot is dropped by the caller.
    pub fn unpack_frames(
        &self,
        parent: &Artifact,
        splitter: &dyn FrameSplitter,
    ) -> Result<Vec<Artifact>> {
        let frames_dir = self.dir.join(format!("frames-{}", parent.seq));
        fs::create_dir_all(&frames_dir).map_err(|e| RelayError::io(&frames_dir, e))?;

        let split = splitter.split(&parent.path(self.dir), &frames_dir);
        let frames = match split {
            Ok(frames) => frames,
            Err(e) => {
                let _ = fs::remove_dir_all(&frames_dir);
                return Err(e);
            }
        };

        let mut artifacts = Vec::with_capacity(frames.len());
        for (index, frame) in frames.iter().enumerate() {
            let seq = parent.seq * FRAME_SEQ_STRIDE + index as u64;
            let file_name = format!("{seq}.tif");
            fs::rename(frame, self.dir.join(&file_name))
                .map_err(|e| RelayError::io(frame, e))?;
            artifacts.push(Artifact {
                seq,
                file_name,
                kind: ArtifactKind::Image,
            });
        }

        let _ = fs::remove_dir_all(&frames_dir);
        Ok(artifacts)
    }
}
