//! Pipeline and session tests against recording fakes.
//!
//! No pdfium, tesseract or network is needed: every collaborator is a mock
//! that records how it was called, so these run everywhere.
//!
//! Run with:
//!   cargo test --test pipeline

use async_trait::async_trait;
use edgequake_docqa::prompts::{DEFAULT_ANSWER_PROMPT, DEFAULT_REORGANIZE_PROMPT};
use edgequake_docqa::{
    ChatModel, Completion, DocPipeline, DocQaError, DocumentConverter, DocumentKind, ErrorKind,
    ExtractionBackends, ExtractionMethod, OcrEngine, PageRasterizer, PipelineConfig,
    PipelineObserver, Session, SessionState, Stage,
};
use image::{DynamicImage, GenericImageView};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Fakes ────────────────────────────────────────────────────────────────────

/// Returns a fixed structured-conversion result.
struct FakeConverter {
    reply: Result<String, String>,
    calls: AtomicUsize,
}

impl FakeConverter {
    fn text(s: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(s.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(msg.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DocumentConverter for FakeConverter {
    async fn convert(&self, _path: &Path, _kind: &DocumentKind) -> Result<String, DocQaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply
            .clone()
            .map_err(|detail| DocQaError::ExternalService {
                service: "converter".into(),
                detail,
            })
    }
}

/// Renders `pages` blank pages whose width encodes the page number.
struct FakeRasterizer {
    pages: u32,
    fail: Option<String>,
    calls: AtomicUsize,
}

impl FakeRasterizer {
    fn with_pages(pages: u32) -> Arc<Self> {
        Arc::new(Self {
            pages,
            fail: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(msg: &str) -> Arc<Self> {
        Arc::new(Self {
            pages: 0,
            fail: Some(msg.to_string()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl PageRasterizer for FakeRasterizer {
    async fn render_pages(&self, _path: &Path, _dpi: u32) -> Result<Vec<DynamicImage>, DocQaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref detail) = self.fail {
            return Err(DocQaError::ExternalService {
                service: "pdfium".into(),
                detail: detail.clone(),
            });
        }
        Ok((1..=self.pages).map(|n| DynamicImage::new_rgb8(n, 1)).collect())
    }
}

/// "Recognises" the page number from the image width, or a fixed text.
struct FakeOcr {
    fixed: Option<String>,
    fail: Option<String>,
    languages: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl FakeOcr {
    fn new(fixed: Option<&str>, fail: Option<&str>) -> Arc<Self> {
        Arc::new(Self {
            fixed: fixed.map(str::to_string),
            fail: fail.map(str::to_string),
            languages: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    fn page_numbers() -> Arc<Self> {
        Self::new(None, None)
    }

    fn fixed(text: &str) -> Arc<Self> {
        Self::new(Some(text), None)
    }

    fn failing(msg: &str) -> Arc<Self> {
        Self::new(None, Some(msg))
    }
}

#[async_trait]
impl OcrEngine for FakeOcr {
    async fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, DocQaError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.languages.lock().unwrap().push(language.to_string());
        if let Some(ref detail) = self.fail {
            return Err(DocQaError::ExternalService {
                service: "tesseract".into(),
                detail: detail.clone(),
            });
        }
        Ok(match self.fixed {
            Some(ref text) => text.clone(),
            None => format!("page {}", image.dimensions().0),
        })
    }
}

/// Replays scripted replies and records every (system, user) pair.
#[derive(Default)]
struct FakeChat {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeChat {
    fn scripted(replies: &[Result<&str, &str>]) -> Arc<Self> {
        let replies = replies
            .iter()
            .copied()
            .map(|r| r.map(str::to_string).map_err(str::to_string))
            .collect();
        Arc::new(Self {
            replies: Mutex::new(replies),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn call(&self, idx: usize) -> (String, String) {
        self.calls.lock().unwrap()[idx].clone()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, system: &str, user: &str) -> Result<Completion, DocQaError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), user.to_string()));
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted reply left".to_string()));
        match reply {
            Ok(content) => Ok(Completion {
                content,
                input_tokens: 10,
                output_tokens: 5,
                duration_ms: 1,
            }),
            Err(detail) => Err(DocQaError::ExternalService {
                service: "llm".into(),
                detail,
            }),
        }
    }
}

/// Records observer events as short strings.
#[derive(Default)]
struct EventLog(Mutex<Vec<String>>);

impl PipelineObserver for EventLog {
    fn on_stage_start(&self, stage: Stage) {
        self.0.lock().unwrap().push(format!("start {stage}"));
    }

    fn on_ocr_fallback(&self, _reason: &str) {
        self.0.lock().unwrap().push("fallback".into());
    }

    fn on_ocr_page(&self, page_num: usize, total_pages: usize) {
        self.0
            .lock()
            .unwrap()
            .push(format!("ocr {page_num}/{total_pages}"));
    }

    fn on_stage_complete(&self, stage: Stage, _chars: usize) {
        self.0.lock().unwrap().push(format!("done {stage}"));
    }

    fn on_stage_error(&self, stage: Stage, _error: &str) {
        self.0.lock().unwrap().push(format!("fail {stage}"));
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

struct Harness {
    converter: Arc<FakeConverter>,
    rasterizer: Arc<FakeRasterizer>,
    ocr: Arc<FakeOcr>,
    chat: Arc<FakeChat>,
    pipeline: Arc<DocPipeline>,
}

fn harness_with_config(
    config: PipelineConfig,
    converter: Arc<FakeConverter>,
    rasterizer: Arc<FakeRasterizer>,
    ocr: Arc<FakeOcr>,
    chat: Arc<FakeChat>,
) -> Harness {
    let backends = ExtractionBackends {
        converter: converter.clone(),
        rasterizer: rasterizer.clone(),
        ocr: ocr.clone(),
    };
    let pipeline = Arc::new(DocPipeline::with_backends(config, backends, chat.clone()));
    Harness {
        converter,
        rasterizer,
        ocr,
        chat,
        pipeline,
    }
}

fn harness(
    converter: Arc<FakeConverter>,
    rasterizer: Arc<FakeRasterizer>,
    ocr: Arc<FakeOcr>,
    chat: Arc<FakeChat>,
) -> Harness {
    harness_with_config(PipelineConfig::default(), converter, rasterizer, ocr, chat)
}

fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

// ── Extraction ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn pdf_with_text_layer_skips_ocr() {
    let h = harness(
        FakeConverter::text("Quarterly report\n\nRevenue grew."),
        FakeRasterizer::with_pages(3),
        FakeOcr::page_numbers(),
        FakeChat::scripted(&[]),
    );

    let result = h.pipeline.extract(Path::new("report.pdf")).await.unwrap();

    assert_eq!(result.method, ExtractionMethod::Structured);
    assert!(result.text.contains("Revenue grew."));
    assert_eq!(result.ocr_pages, 0);
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn scanned_pdf_is_ocred_page_by_page_in_order() {
    let h = harness(
        FakeConverter::text("  \n \n"),
        FakeRasterizer::with_pages(3),
        FakeOcr::page_numbers(),
        FakeChat::scripted(&[]),
    );

    let result = h.pipeline.extract(Path::new("scan.pdf")).await.unwrap();

    assert_eq!(result.method, ExtractionMethod::Ocr);
    assert_eq!(result.ocr_pages, 3);
    assert_eq!(result.text, "page 1\npage 2\npage 3");
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn converter_error_falls_back_to_ocr() {
    let h = harness(
        FakeConverter::failing("corrupt xref table"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("recovered text"),
        FakeChat::scripted(&[]),
    );

    let result = h.pipeline.extract(Path::new("broken.pdf")).await.unwrap();

    assert_eq!(result.method, ExtractionMethod::Ocr);
    assert_eq!(result.text, "recovered text");
}

#[tokio::test]
async fn ocr_uses_configured_language() {
    let config = PipelineConfig::builder()
        .ocr_language("deu")
        .build()
        .unwrap();
    let h = harness_with_config(
        config,
        FakeConverter::text(""),
        FakeRasterizer::with_pages(2),
        FakeOcr::page_numbers(),
        FakeChat::scripted(&[]),
    );

    h.pipeline.extract(Path::new("scan.pdf")).await.unwrap();

    assert_eq!(*h.ocr.languages.lock().unwrap(), vec!["deu", "deu"]);
}

#[tokio::test]
async fn image_goes_through_ocr() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.png");
    DynamicImage::new_rgb8(8, 8).save(&path).unwrap();

    let h = harness(
        FakeConverter::failing("no structured converter for images"),
        FakeRasterizer::with_pages(0),
        FakeOcr::fixed("HELLO WORLD"),
        FakeChat::scripted(&[]),
    );

    let result = h.pipeline.extract(&path).await.unwrap();

    assert_eq!(result.method, ExtractionMethod::Ocr);
    assert!(result.text.contains("HELLO WORLD"));
    assert_eq!(result.ocr_pages, 1);
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn plain_text_is_read_directly() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "notes.txt", "\u{FEFF}Deadline: Friday\r\n".as_bytes());

    let h = harness(
        FakeConverter::text("should not be used"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("should not be used"),
        FakeChat::scripted(&[]),
    );

    let result = h.pipeline.extract(&path).await.unwrap();

    assert_eq!(result.method, ExtractionMethod::PlainText);
    assert_eq!(result.text, "Deadline: Friday");
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_extension_is_unsupported_once_the_converter_declines() {
    let h = harness(
        FakeConverter::failing("cannot read docx"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let err = h
        .pipeline
        .extract(Path::new("contract.docx"))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert!(matches!(
        err,
        DocQaError::UnsupportedFormat { ref extension } if extension == "docx"
    ));
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_extension_with_blank_conversion_is_unsupported() {
    let h = harness(
        FakeConverter::text(" \n "),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let err = h.pipeline.extract(Path::new("slides.pptx")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn converter_handles_html() {
    let h = harness(
        FakeConverter::text("Converted HTML body"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let result = h.pipeline.extract(Path::new("page.html")).await.unwrap();

    assert_eq!(result.method, ExtractionMethod::Structured);
    assert_eq!(result.text, "Converted HTML body");
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn every_image_extension_goes_through_ocr() {
    let dir = tempfile::tempdir().unwrap();

    for ext in ["jpg", "jpeg", "bmp", "tif", "tiff"] {
        let path = dir.path().join(format!("sample.{ext}"));
        DynamicImage::new_rgb8(8, 8).save(&path).unwrap();

        let h = harness(
            FakeConverter::failing("no structured converter for images"),
            FakeRasterizer::with_pages(0),
            FakeOcr::fixed("HELLO WORLD"),
            FakeChat::scripted(&[]),
        );

        let result = h.pipeline.extract(&path).await.unwrap();

        assert_eq!(result.method, ExtractionMethod::Ocr, "ext = {ext}");
        assert_eq!(result.ocr_pages, 1, "ext = {ext}");
        assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 1, "ext = {ext}");
    }
}

#[tokio::test]
async fn ocr_failure_is_external_service() {
    let h = harness(
        FakeConverter::text(""),
        FakeRasterizer::with_pages(2),
        FakeOcr::failing("tesseract exited with status 1"),
        FakeChat::scripted(&[]),
    );

    let err = h.pipeline.extract(Path::new("scan.pdf")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalService);
    // The first failing page stops the loop.
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rasterizer_failure_is_external_service() {
    let h = harness(
        FakeConverter::failing("corrupt xref table"),
        FakeRasterizer::failing("cannot open 'scan.pdf'"),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let err = h.pipeline.extract(Path::new("scan.pdf")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert_eq!(h.rasterizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.ocr.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blank_ocr_output_is_extraction_empty() {
    let h = harness(
        FakeConverter::text(""),
        FakeRasterizer::with_pages(2),
        FakeOcr::fixed("   "),
        FakeChat::scripted(&[]),
    );

    let err = h.pipeline.extract(Path::new("blank.pdf")).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ExtractionEmpty);
}

#[tokio::test]
async fn observer_sees_fallback_and_every_page() {
    let log = Arc::new(EventLog::default());
    let config = PipelineConfig::builder()
        .observer(log.clone())
        .build()
        .unwrap();
    let h = harness_with_config(
        config,
        FakeConverter::text(""),
        FakeRasterizer::with_pages(2),
        FakeOcr::page_numbers(),
        FakeChat::scripted(&[]),
    );

    h.pipeline.extract(Path::new("scan.pdf")).await.unwrap();

    assert_eq!(
        *log.0.lock().unwrap(),
        vec!["start extract", "fallback", "ocr 1/2", "ocr 2/2", "done extract"]
    );
}

#[tokio::test]
async fn upload_is_staged_and_cleaned_up() {
    let h = harness(
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let result = h
        .pipeline
        .extract_bytes(b"uploaded notes", "notes.txt")
        .await
        .unwrap();
    assert_eq!(result.text, "uploaded notes");

    let leftovers: Vec<_> = std::fs::read_dir(std::env::temp_dir())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            name.starts_with("docqa-upload-") && name.ends_with(".txt")
        })
        .filter(|e| std::fs::read(e.path()).map(|b| b == b"uploaded notes").unwrap_or(false))
        .collect();
    assert!(leftovers.is_empty(), "staged upload was not deleted");
}

#[tokio::test]
async fn upload_with_unsupported_extension_is_rejected() {
    let h = harness(
        FakeConverter::failing("cannot read docx"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let err = h
        .pipeline
        .extract_bytes(b"PK\x03\x04", "contract.docx")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    assert_eq!(h.converter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upload_with_converter_supported_extension_is_extracted() {
    let h = harness(
        FakeConverter::text("Converted HTML body"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let result = h
        .pipeline
        .extract_bytes(b"<p>Converted HTML body</p>", "page.html")
        .await
        .unwrap();
    assert_eq!(result.method, ExtractionMethod::Structured);
    assert_eq!(result.text, "Converted HTML body");
}

// ── Reorganize and answer ────────────────────────────────────────────────────

#[tokio::test]
async fn reorganize_empty_is_invalid_input_without_model_call() {
    let h = harness(
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[Ok("# never used")]),
    );

    for raw in ["", "  \n\t"] {
        let err = h.pipeline.reorganize(raw).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput, "raw = {raw:?}");
    }
    assert_eq!(h.chat.call_count(), 0);
}

#[tokio::test]
async fn reorganize_strips_fences_from_the_reply() {
    let h = harness(
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[Ok("```markdown\n# Title\n\nBody\n```")]),
    );

    let organized = h.pipeline.reorganize("Title\nBody").await.unwrap();

    assert_eq!(organized.markdown, "# Title\n\nBody\n");
    assert_eq!(organized.output_tokens, 5);
}

#[tokio::test]
async fn answer_with_empty_context_is_invalid_input_without_model_call() {
    let h = harness(
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[Ok("never used")]),
    );

    let err = h.pipeline.answer("", "X").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    let err = h.pipeline.answer("some context", "   ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);

    assert_eq!(h.chat.call_count(), 0);
}

#[tokio::test]
async fn model_failure_is_external_service() {
    let h = harness(
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[Err("401 invalid api key")]),
    );

    let err = h.pipeline.answer("context", "question?").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
}

#[tokio::test]
async fn hello_world_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.png");
    DynamicImage::new_rgb8(16, 16).save(&path).unwrap();

    let h = harness(
        FakeConverter::failing("no structured converter for images"),
        FakeRasterizer::with_pages(0),
        FakeOcr::fixed("HELLO WORLD"),
        FakeChat::scripted(&[Ok("# HELLO WORLD"), Ok("It says HELLO WORLD.")]),
    );

    let extraction = h.pipeline.extract(&path).await.unwrap();
    assert!(extraction.text.contains("HELLO WORLD"));

    let organized = h.pipeline.reorganize(&extraction.text).await.unwrap();
    let (system, user) = h.chat.call(0);
    assert_eq!(system, DEFAULT_REORGANIZE_PROMPT);
    assert!(user.starts_with("reorganize:"));
    assert!(user.contains("HELLO WORLD"));

    let qa = h
        .pipeline
        .answer(&organized.markdown, "What does it say?")
        .await
        .unwrap();
    let (system, user) = h.chat.call(1);
    assert!(system.starts_with(DEFAULT_ANSWER_PROMPT));
    assert!(system.contains("# HELLO WORLD"));
    assert_eq!(user, "What does it say?");
    assert_eq!(qa.answer, "It says HELLO WORLD.");
}

#[tokio::test]
async fn prompt_overrides_are_used() {
    let config = PipelineConfig::builder()
        .reorganize_prompt("Format as Markdown.")
        .answer_prompt("Answer tersely.")
        .build()
        .unwrap();
    let h = harness_with_config(
        config,
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[Ok("# A"), Ok("B")]),
    );

    h.pipeline.reorganize("A").await.unwrap();
    h.pipeline.answer("A", "?").await.unwrap();

    assert_eq!(h.chat.call(0).0, "Format as Markdown.");
    assert!(h.chat.call(1).0.starts_with("Answer tersely."));
}

// ── Session ──────────────────────────────────────────────────────────────────

fn text_session(chat: Arc<FakeChat>) -> (Session, tempfile::TempDir, PathBuf) {
    text_session_with_ocr(chat, FakeOcr::fixed("x"))
}

/// A session over `doc.txt`; the converter declines everything else.
fn text_session_with_ocr(
    chat: Arc<FakeChat>,
    ocr: Arc<FakeOcr>,
) -> (Session, tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(dir.path(), "doc.txt", b"The cat sat on the mat.");
    let h = harness(
        FakeConverter::failing("unreadable"),
        FakeRasterizer::with_pages(1),
        ocr,
        chat,
    );
    (Session::new(h.pipeline), dir, path)
}

#[tokio::test]
async fn session_walks_through_every_stable_state() {
    let chat = FakeChat::scripted(&[Ok("The cat sat on the mat."), Ok("The mat.")]);
    let (mut session, _dir, path) = text_session(chat.clone());
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.context().is_none());

    session.extract(path.to_str().unwrap()).await.unwrap();
    assert_eq!(session.state(), SessionState::Extracted);
    assert_eq!(session.context(), Some("The cat sat on the mat."));

    session.reorganize().await.unwrap();
    assert_eq!(session.state(), SessionState::Reorganized);
    assert_eq!(session.organized_markdown(), Some("The cat sat on the mat.\n"));

    let qa = session.ask("Where did the cat sit?").await.unwrap();
    assert_eq!(qa.answer, "The mat.");
    assert_eq!(session.state(), SessionState::Answered);
    assert_eq!(session.history().len(), 1);
    // The answer call saw the organized text, not the raw text.
    assert!(chat.call(1).0.contains("The cat sat on the mat.\n"));
}

#[tokio::test]
async fn failed_reorganize_keeps_raw_text_as_context() {
    let chat = FakeChat::scripted(&[Err("503 overloaded"), Ok("On the mat.")]);
    let (mut session, _dir, path) = text_session(chat);

    session.extract(path.to_str().unwrap()).await.unwrap();
    let failure = session.reorganize().await.unwrap_err();
    assert_eq!(failure.stage, Stage::Reorganize);
    assert_eq!(failure.kind(), ErrorKind::ExternalService);

    assert_eq!(session.state(), SessionState::Extracted);
    assert!(session.organized().is_none());
    assert_eq!(session.context(), Some("The cat sat on the mat."));
    assert_eq!(
        session.last_failure().map(|f| f.stage),
        Some(Stage::Reorganize)
    );

    // Questions still work against the raw text.
    session.ask("Where?").await.unwrap();
    assert_eq!(session.state(), SessionState::Answered);
    assert!(session.last_failure().is_none());
}

#[tokio::test]
async fn failed_extract_leaves_previous_document_in_place() {
    let chat = FakeChat::scripted(&[]);
    let (mut session, dir, path) = text_session(chat);

    session.extract(path.to_str().unwrap()).await.unwrap();
    let docx = write_file(dir.path(), "contract.docx", b"PK\x03\x04");
    let failure = session.extract(docx.to_str().unwrap()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Extract);
    assert_eq!(failure.kind(), ErrorKind::UnsupportedFormat);

    assert_eq!(session.state(), SessionState::Extracted);
    assert_eq!(session.raw_text(), Some("The cat sat on the mat."));
}

#[tokio::test]
async fn failed_ocr_leaves_session_state_unchanged() {
    let chat = FakeChat::scripted(&[]);
    let (mut session, dir, path) =
        text_session_with_ocr(chat, FakeOcr::failing("tesseract exited with status 1"));
    let png = dir.path().join("scan.png");
    DynamicImage::new_rgb8(8, 8).save(&png).unwrap();

    let failure = session.extract(png.to_str().unwrap()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Extract);
    assert_eq!(failure.kind(), ErrorKind::ExternalService);
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.raw_text().is_none());

    session.extract(path.to_str().unwrap()).await.unwrap();
    let failure = session.extract(png.to_str().unwrap()).await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::ExternalService);
    assert_eq!(session.state(), SessionState::Extracted);
    assert_eq!(session.raw_text(), Some("The cat sat on the mat."));
}

#[tokio::test]
async fn stages_out_of_order_are_invalid_input() {
    let chat = FakeChat::scripted(&[]);
    let (mut session, _dir, _path) = text_session(chat.clone());

    let failure = session.reorganize().await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::InvalidInput);
    let failure = session.ask("anything?").await.unwrap_err();
    assert_eq!(failure.stage, Stage::Answer);
    assert_eq!(failure.kind(), ErrorKind::InvalidInput);

    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn new_extract_resets_organized_text_and_history() {
    let chat = FakeChat::scripted(&[Ok("# Cat"), Ok("Mat.")]);
    let (mut session, dir, path) = text_session(chat);

    session.extract(path.to_str().unwrap()).await.unwrap();
    session.reorganize().await.unwrap();
    session.ask("Where?").await.unwrap();

    let other = write_file(dir.path(), "other.md", b"A different document.");
    session.extract(other.to_str().unwrap()).await.unwrap();

    assert_eq!(session.state(), SessionState::Extracted);
    assert!(session.organized().is_none());
    assert!(session.history().is_empty());
    assert_eq!(session.context(), Some("A different document."));
}

#[tokio::test]
async fn sessions_sharing_a_pipeline_keep_separate_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let a = write_file(dir.path(), "a.txt", b"alpha");
    let b = write_file(dir.path(), "b.txt", b"beta");
    let h = harness(
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        FakeChat::scripted(&[]),
    );

    let mut first = Session::new(Arc::clone(&h.pipeline));
    let mut second = Session::new(Arc::clone(&h.pipeline));
    first.extract(a.to_str().unwrap()).await.unwrap();
    second.extract(b.to_str().unwrap()).await.unwrap();

    assert_eq!(first.raw_text(), Some("alpha"));
    assert_eq!(second.raw_text(), Some("beta"));
}

#[tokio::test]
async fn session_upload_and_export() {
    let chat = FakeChat::scripted(&[Ok("# Minutes\n\n- approved")]);
    let h = harness(
        FakeConverter::text("x"),
        FakeRasterizer::with_pages(1),
        FakeOcr::fixed("x"),
        chat,
    );
    let mut session = Session::new(h.pipeline);

    session
        .extract_upload(b"Minutes\napproved", "minutes.txt")
        .await
        .unwrap();
    session.reorganize().await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("organized.md");
    session.export_markdown(&out).await.unwrap();

    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written, "# Minutes\n\n- approved\n");
    assert!(!out.with_extension("md.tmp").exists());
}

#[tokio::test]
async fn export_before_reorganize_is_invalid_input() {
    let (mut session, dir, path) = text_session(FakeChat::scripted(&[]));
    session.extract(path.to_str().unwrap()).await.unwrap();

    let err = session
        .export_markdown(&dir.path().join("organized.md"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}
