//! Per-user session: the state machine a UI drives.
//!
//! ```text
//! Idle ─▶ Extracting ─▶ Extracted ─▶ Reorganizing ─▶ Reorganized ─▶ Answering ─▶ Answered
//!   ▲                      │  ▲                          │  ▲                      │
//!   └──── extract() from any stable state restarts ──────┘  └──── ask() again ─────┘
//! ```
//!
//! `Idle`, `Extracted`, `Reorganized` and `Answered` are stable. A failing
//! stage puts the session back in the stable state it started from, with its
//! stored artifacts untouched, and returns a [`StageFailure`] naming the
//! stage. Each session owns its own artifacts; nothing is shared between
//! sessions except the stateless [`DocPipeline`].

use crate::engine::{write_markdown, DocPipeline};
use crate::error::{DocQaError, Stage, StageFailure};
use crate::output::{ExtractionResult, OrganizedText, QaExchange};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

/// File name offered for the organized Markdown download.
pub const DEFAULT_EXPORT_NAME: &str = "organized.md";

/// Where a session is in the extract → reorganize → answer flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Extracting,
    Extracted,
    Reorganizing,
    Reorganized,
    Answering,
    Answered,
}

impl SessionState {
    /// Stable states are the ones a user can linger in.
    pub fn is_stable(self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::Extracted
                | SessionState::Reorganized
                | SessionState::Answered
        )
    }
}

/// One user's intermediate artifacts plus the state machine around them.
pub struct Session {
    pipeline: Arc<DocPipeline>,
    state: SessionState,
    extraction: Option<ExtractionResult>,
    organized: Option<OrganizedText>,
    history: Vec<QaExchange>,
    last_failure: Option<StageFailure>,
}

impl Session {
    pub fn new(pipeline: Arc<DocPipeline>) -> Self {
        Self {
            pipeline,
            state: SessionState::Idle,
            extraction: None,
            organized: None,
            history: Vec::new(),
            last_failure: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn extraction(&self) -> Option<&ExtractionResult> {
        self.extraction.as_ref()
    }

    pub fn raw_text(&self) -> Option<&str> {
        self.extraction.as_ref().map(|e| e.text.as_str())
    }

    pub fn organized(&self) -> Option<&OrganizedText> {
        self.organized.as_ref()
    }

    pub fn organized_markdown(&self) -> Option<&str> {
        self.organized.as_ref().map(|o| o.markdown.as_str())
    }

    pub fn history(&self) -> &[QaExchange] {
        &self.history
    }

    /// The most recent stage failure, cleared by the next successful stage.
    pub fn last_failure(&self) -> Option<&StageFailure> {
        self.last_failure.as_ref()
    }

    /// Text questions are answered against: organized Markdown if present,
    /// otherwise the raw extraction.
    pub fn context(&self) -> Option<&str> {
        self.organized_markdown().or_else(|| self.raw_text())
    }

    /// Extract a local file or URL, restarting the session on success.
    pub async fn extract(&mut self, input: &str) -> Result<&ExtractionResult, StageFailure> {
        let prior = self.begin(SessionState::Extracting);
        let pipeline = Arc::clone(&self.pipeline);
        let result = pipeline.extract_input(input).await;
        self.finish_extract(prior, result)
    }

    /// Extract an uploaded document, restarting the session on success.
    ///
    /// The upload is staged in a temp file for the duration of this call only.
    pub async fn extract_upload(
        &mut self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<&ExtractionResult, StageFailure> {
        let prior = self.begin(SessionState::Extracting);
        let pipeline = Arc::clone(&self.pipeline);
        let result = pipeline.extract_bytes(bytes, filename).await;
        self.finish_extract(prior, result)
    }

    /// Reorganize the extracted text into Markdown.
    ///
    /// On failure the raw text stays the session's context, unchanged.
    pub async fn reorganize(&mut self) -> Result<&OrganizedText, StageFailure> {
        let Some(raw) = self.raw_text().map(str::to_owned) else {
            return Err(self.fail_in_place(
                Stage::Reorganize,
                DocQaError::invalid_input("no extracted text; run extract first"),
            ));
        };

        let prior = self.begin(SessionState::Reorganizing);
        let pipeline = Arc::clone(&self.pipeline);
        match pipeline.reorganize(&raw).await {
            Ok(organized) => {
                self.state = SessionState::Reorganized;
                self.last_failure = None;
                Ok(&*self.organized.insert(organized))
            }
            Err(error) => Err(self.fail(prior, Stage::Reorganize, error)),
        }
    }

    /// Ask a question about the current context.
    pub async fn ask(&mut self, question: &str) -> Result<&QaExchange, StageFailure> {
        let Some(context) = self.context().map(str::to_owned) else {
            return Err(self.fail_in_place(
                Stage::Answer,
                DocQaError::invalid_input("no document loaded; run extract first"),
            ));
        };

        let prior = self.begin(SessionState::Answering);
        let pipeline = Arc::clone(&self.pipeline);
        match pipeline.answer(&context, question).await {
            Ok(exchange) => {
                self.state = SessionState::Answered;
                self.last_failure = None;
                self.history.push(exchange);
                Ok(&self.history[self.history.len() - 1])
            }
            Err(error) => Err(self.fail(prior, Stage::Answer, error)),
        }
    }

    /// Write the organized Markdown to `path` (atomic temp-file + rename).
    pub async fn export_markdown(&self, path: &Path) -> Result<(), DocQaError> {
        let markdown = self
            .organized_markdown()
            .ok_or_else(|| DocQaError::invalid_input("nothing to export; run reorganize first"))?;
        write_markdown(path, markdown).await
    }

    // ── Transitions ──────────────────────────────────────────────────────

    fn begin(&mut self, transient: SessionState) -> SessionState {
        let prior = self.state;
        self.state = transient;
        prior
    }

    fn finish_extract(
        &mut self,
        prior: SessionState,
        result: Result<ExtractionResult, DocQaError>,
    ) -> Result<&ExtractionResult, StageFailure> {
        match result {
            Ok(extraction) => {
                self.state = SessionState::Extracted;
                self.organized = None;
                self.history.clear();
                self.last_failure = None;
                Ok(&*self.extraction.insert(extraction))
            }
            Err(error) => Err(self.fail(prior, Stage::Extract, error)),
        }
    }

    fn fail(&mut self, prior: SessionState, stage: Stage, error: DocQaError) -> StageFailure {
        warn!("{} failed: {}", stage, error);
        self.state = prior;
        let failure = StageFailure { stage, error };
        self.last_failure = Some(failure.clone());
        failure
    }

    fn fail_in_place(&mut self, stage: Stage, error: DocQaError) -> StageFailure {
        let current = self.state;
        self.fail(current, stage, error)
    }
}
