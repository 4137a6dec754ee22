//! Pipeline orchestrator: one mail message in, one spooled fax out.
//!
//! Drives the whole run: precondition check, scratch area, raw-message
//! archive, envelope extraction, alternative selection, part iteration,
//! the no-text fallback page, rendering and dispatch. Collaborators come
//! in through the [`PageRenderer`], [`FrameSplitter`] and [`Dispatcher`]
//! traits so the pipeline never depends on a particular external tool.
//!
//! Failure policy: recover at the narrowest scope that makes sense. A part
//! that cannot be decoded, persisted or rendered is logged and dropped;
//! only precondition, parse and dispatch failures unwind to the caller.
//! The scratch directory is removed on every exit path.

use std::io::Read;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::archive;
use crate::artifact::{Artifact, ArtifactKind, ArtifactWriter, DecisionState};
use crate::config::Settings;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::parser::decode::{self, Decoded};
use crate::parser::header::EnvelopeSummary;
use crate::parser::message::{self, MessagePart};
use crate::render::{FrameSplitter, PageRenderer, RenderOptions};
use crate::select::select_alternative;
use crate::sniff::{self, Classification, MediaClass};
use crate::text;

/// How a successful run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The assembled page list was handed to the dispatcher.
    Dispatched { pages: usize },
    /// Correctly detected that there is nothing worth faxing.
    NothingToFax,
}

/// One-shot message pipeline. Construct once, run once per message.
pub struct Pipeline<'a> {
    settings: &'a Settings,
    renderer: &'a dyn PageRenderer,
    splitter: &'a dyn FrameSplitter,
    dispatcher: &'a dyn Dispatcher,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        settings: &'a Settings,
        renderer: &'a dyn PageRenderer,
        splitter: &'a dyn FrameSplitter,
        dispatcher: &'a dyn Dispatcher,
    ) -> Self {
        Self {
            settings,
            renderer,
            splitter,
            dispatcher,
        }
    }

    /// Run on a message read from `input` (typically stdin).
    pub fn run_from_reader(&self, mut input: impl Read) -> Result<RunOutcome> {
        self.check_precondition()?;
        let mut raw = Vec::new();
        input.read_to_end(&mut raw)?;
        self.run(&String::from_utf8_lossy(&raw))
    }

    /// Run on an in-memory message.
    pub fn run(&self, raw: &str) -> Result<RunOutcome> {
        self.check_precondition()?;

        // The scratch area is private to this run and removed on drop,
        // whatever happens below.
        let scratch = tempfile::TempDir::new()?;
        self.process(raw, scratch.path())
    }

    /// The one precondition checked before any temporary state exists.
    fn check_precondition(&self) -> Result<()> {
        if self.settings.phone_number.is_empty() {
            return Err(crate::error::RelayError::NoPhoneNumber);
        }
        Ok(())
    }

    fn process(&self, raw: &str, scratch: &Path) -> Result<RunOutcome> {
        if self.settings.log_message_to_file {
            if let Err(e) = archive::append_message(&self.settings.message_log_file, raw) {
                warn!(error = %e, "Logging message to the archive failed");
            }
        }

        let parsed = message::parse_message(raw.as_bytes())?;
        let envelope = EnvelopeSummary::from_message(&parsed, self.settings);
        let parts = message::collect_parts(&parsed);
        let parts = select_alternative(parts, self.settings.use_plain);

        let writer = ArtifactWriter::new(scratch);
        let mut state = DecisionState::default();

        for part in parts {
            self.process_part(part, &envelope, &writer, &mut state);
        }

        let nothing_useful = self.no_text_fallback(&envelope, &writer, &mut state);

        let pages = if nothing_useful {
            Vec::new()
        } else {
            self.render_artifacts(&state.artifacts, &envelope, scratch)
        };

        if pages.is_empty() {
            if !nothing_useful {
                info!(
                    subject = %envelope.subject,
                    sender = %envelope.sender,
                    "There was nothing to fax from the message"
                );
            }
            return Ok(RunOutcome::NothingToFax);
        }

        if state.standard_resolution {
            info!(
                subject = %envelope.subject,
                sender = %envelope.sender,
                "Standard resolution triggered for the message"
            );
        }
        self.dispatcher
            .dispatch(&self.settings.phone_number, &pages, state.standard_resolution)?;
        info!(
            subject = %envelope.subject,
            sender = %envelope.sender,
            pages = pages.len(),
            "Message spooled for delivery"
        );
        Ok(RunOutcome::Dispatched { pages: pages.len() })
    }

    /// Triage and persist one surviving top-level part.
    fn process_part(
        &self,
        part: MessagePart,
        envelope: &EnvelopeSummary,
        writer: &ArtifactWriter<'_>,
        state: &mut DecisionState,
    ) {
        // A nested container gets its own alternative selection; at most one
        // part is expected to survive it.
        let part = if part.is_container() {
            let children = select_alternative(part.children, self.settings.use_plain);
            match children.into_iter().next() {
                Some(child) => child,
                None => {
                    warn!(
                        subject = %envelope.subject,
                        sender = %envelope.sender,
                        "Container part had no usable alternative, skipping"
                    );
                    return;
                }
            }
        } else {
            part
        };

        let decoded = match decode::decode_part(&part) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(
                    subject = %envelope.subject,
                    sender = %envelope.sender,
                    error = %e,
                    "Skipped a part that failed transfer decoding"
                );
                return;
            }
        };

        // Nothing in here: the part is not persisted and not counted.
        if decoded.is_empty() {
            return;
        }

        let classification = sniff::classify(&part, &decoded);
        self.log_classification(&part, &classification, envelope);

        let seq = state.counter;
        match classification.class {
            MediaClass::Text => {
                self.process_text_part(&part, decoded, envelope, writer, state, seq);
            }
            MediaClass::Image(format) => {
                self.process_image_part(&part, decoded, format, envelope, writer, state, seq);
            }
            MediaClass::Other => {
                // Neither text nor image may hide anything; drop it.
                info!(
                    subject = %envelope.subject,
                    sender = %envelope.sender,
                    content_type = %part.content_type(),
                    "Discarded an attachment"
                );
            }
        }
        state.counter += 1;
    }

    fn process_text_part(
        &self,
        part: &MessagePart,
        decoded: Decoded,
        envelope: &EnvelopeSummary,
        writer: &ArtifactWriter<'_>,
        state: &mut DecisionState,
        seq: u64,
    ) {
        state.saw_text = true;

        let raw_text = match decoded {
            Decoded::Text(text) => text,
            Decoded::Binary(bytes) => decode::decode_charset(part.charset.as_deref(), &bytes),
        };
        let is_html = part.sub_type == "html";
        let mut body = text::normalize_body(raw_text, is_html, self.settings);

        let mut discard = false;
        if state.first_text_pending {
            // The caption joins the scan target on purpose: a trigger in the
            // subject line counts.
            body = if body.is_empty() {
                envelope.header_block(self.settings, false)
            } else {
                format!("{}{}", envelope.header_block(self.settings, true), body)
            };
            let scan = text::scan_triggers(&mut body, self.settings);
            discard = scan.discard;
            if scan.standard {
                state.standard_resolution = true;
            }
            state.first_text_pending = false;
        }

        let body = text::finish_text(body, self.settings);

        if discard {
            info!(
                subject = %envelope.subject,
                sender = %envelope.sender,
                "Text part discarded due to the message trigger"
            );
            return;
        }

        match writer.persist(
            ArtifactKind::Text,
            format!("{seq}.txt"),
            &Decoded::Text(body),
            seq,
            &envelope.subject,
            &envelope.sender,
        ) {
            Ok(artifact) => state.artifacts.push(artifact),
            Err(e) => info!(
                subject = %envelope.subject,
                sender = %envelope.sender,
                error = %e,
                "Saving text from the message was not possible"
            ),
        }
    }

    fn process_image_part(
        &self,
        part: &MessagePart,
        decoded: Decoded,
        format: image::ImageFormat,
        envelope: &EnvelopeSummary,
        writer: &ArtifactWriter<'_>,
        state: &mut DecisionState,
        seq: u64,
    ) {
        let declared_ext = part.filename_extension();
        let mut extension = if declared_ext == ".txt" {
            // Locally injected messages sometimes arrive with a stale .txt
            // name on an image payload; trust the bytes.
            match sniff::image_format(decoded.bytes()) {
                Some(sniffed) => format!(".{}", sniff::extension_for(sniffed)),
                None => ".jpg".to_string(),
            }
        } else if !declared_ext.is_empty() {
            declared_ext
        } else {
            format!(".{}", sniff::extension_for(format))
        };

        // Park TIFF variants under .tif; the render stage claims `<seq>.tiff`
        // and must not overwrite the as-received container.
        if sniff::is_tiff_extension(&extension) {
            extension = ".tif".to_string();
        }

        let artifact = match writer.persist(
            ArtifactKind::Image,
            format!("{seq}{extension}"),
            &decoded,
            seq,
            &envelope.subject,
            &envelope.sender,
        ) {
            Ok(artifact) => artifact,
            Err(e) => {
                info!(
                    subject = %envelope.subject,
                    sender = %envelope.sender,
                    error = %e,
                    "Saving image from the message was not possible"
                );
                return;
            }
        };

        if self.settings.unpack_multipage_tiffs && artifact.file_name.ends_with(".tif") {
            match self.splitter.frame_count(&artifact.path(writer.dir())) {
                Ok(frames) if frames > 1 => {
                    match writer.unpack_frames(&artifact, self.splitter) {
                        Ok(mut unpacked) => {
                            // The parent slot is emptied; the counter still
                            // advances past the frames it spawned.
                            state.artifacts.append(&mut unpacked);
                            state.counter += u64::from(frames) - 1;
                            return;
                        }
                        Err(e) => warn!(
                            subject = %envelope.subject,
                            sender = %envelope.sender,
                            error = %e,
                            "Failed to unpack a multi-frame container, keeping it whole"
                        ),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(
                    subject = %envelope.subject,
                    sender = %envelope.sender,
                    error = %e,
                    "Could not inspect a TIFF container, keeping it whole"
                ),
            }
        }

        state.artifacts.push(artifact);
    }

    /// Synthesize the header-only page when no text part survived.
    ///
    /// Returns true when the message is genuinely empty: nothing was
    /// persisted and the envelope carries no data at all.
    fn no_text_fallback(
        &self,
        envelope: &EnvelopeSummary,
        writer: &ArtifactWriter<'_>,
        state: &mut DecisionState,
    ) -> bool {
        if state.saw_text {
            return false;
        }
        if state.artifacts.is_empty() && envelope.is_placeholder_only(self.settings) {
            info!("There was nothing to fax from the message");
            return true;
        }

        match writer.persist(
            ArtifactKind::Text,
            "0.txt".to_string(),
            &Decoded::Text(envelope.header_block(self.settings, false)),
            0,
            &envelope.subject,
            &envelope.sender,
        ) {
            Ok(header_page) => state.artifacts.insert(0, header_page),
            Err(e) => info!(
                subject = %envelope.subject,
                sender = %envelope.sender,
                error = %e,
                "Saving the header page was not possible"
            ),
        }
        false
    }

    /// Render every artifact to its page image. Individual failures drop the
    /// artifact, never the run.
    fn render_artifacts(
        &self,
        artifacts: &[Artifact],
        envelope: &EnvelopeSummary,
        scratch: &Path,
    ) -> Vec<PathBuf> {
        let options = RenderOptions::from_settings(self.settings);
        let mut pages = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            let source = artifact.path(scratch);
            let page = scratch.join(artifact.page_name());
            let rendered = match artifact.kind {
                ArtifactKind::Text => self.renderer.render_text(&source, &page, &options),
                ArtifactKind::Image => self.renderer.render_image(&source, &page, &options),
            };
            match rendered {
                Ok(()) => pages.push(page),
                Err(e) => info!(
                    subject = %envelope.subject,
                    sender = %envelope.sender,
                    error = %e,
                    "Skipped an artifact that failed to render"
                ),
            }
        }
        pages
    }

    fn log_classification(
        &self,
        part: &MessagePart,
        classification: &Classification,
        envelope: &EnvelopeSummary,
    ) {
        if classification.text_reclassified_as_image {
            info!(
                subject = %envelope.subject,
                sender = %envelope.sender,
                "Saving text part as an image file (wrong content type in the message)"
            );
        }
        if classification.image_reclassified_as_text {
            info!(
                subject = %envelope.subject,
                sender = %envelope.sender,
                "Saving image part as a text file (wrong content type in the message)"
            );
        }
        if let Some(ref sniffed) = classification.mismatch {
            info!(
                subject = %envelope.subject,
                sender = %envelope.sender,
                declared = %part.content_type(),
                sniffed = %sniffed,
                "Overriding attachment media type"
            );
        }
    }
}
