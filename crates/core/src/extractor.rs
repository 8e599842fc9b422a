use crate::error::IngestError;
use crate::traits::TextSource;
use lopdf::Document;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

/// Reads the embedded text layer of every page, blank pages included.
pub trait PdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError>;
}

/// Rasterises a single page to PNG bytes.
pub trait PageRenderer {
    fn render_page(&self, path: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, IngestError>;
}

pub trait OcrEngine {
    fn recognize(&self, image: &[u8]) -> Result<String, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, path: &Path) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            // A page whose content stream lopdf cannot decode is treated as image-only.
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    debug!(path = %path.display(), page = page_no, %error, "no text layer");
                    String::new()
                }
            };
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        if pages.is_empty() {
            return Err(IngestError::PdfParse(format!(
                "pdf has no pages: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

/// External OCR tool locations, read from `PDFTOPPM_CMD`, `TESSERACT_CMD`
/// and `TESSERACT_LANG`.
#[derive(Debug, Clone)]
pub struct OcrToolConfig {
    pub pdftoppm: String,
    pub tesseract: String,
    pub language: Option<String>,
}

impl Default for OcrToolConfig {
    fn default() -> Self {
        Self {
            pdftoppm: "pdftoppm".to_string(),
            tesseract: "tesseract".to_string(),
            language: None,
        }
    }
}

impl OcrToolConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pdftoppm: non_empty_env("PDFTOPPM_CMD").unwrap_or(defaults.pdftoppm),
            tesseract: non_empty_env("TESSERACT_CMD").unwrap_or(defaults.tesseract),
            language: non_empty_env("TESSERACT_LANG"),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

pub struct PdftoppmRenderer {
    command: String,
}

impl PdftoppmRenderer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl PageRenderer for PdftoppmRenderer {
    fn render_page(&self, path: &Path, page: u32, dpi: u32) -> Result<Vec<u8>, IngestError> {
        let page = page.to_string();
        let dpi = dpi.to_string();
        let output = Command::new(&self.command)
            .args(["-f", page.as_str(), "-l", page.as_str(), "-r", dpi.as_str()])
            .args(["-png", "-singlefile"])
            .arg(path)
            .stderr(Stdio::piped())
            .output()?;

        if !output.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(output.stdout)
    }
}

pub struct TesseractOcr {
    command: String,
    language: Option<String>,
}

impl TesseractOcr {
    pub fn new(command: impl Into<String>, language: Option<String>) -> Self {
        Self {
            command: command.into(),
            language,
        }
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &[u8]) -> Result<String, IngestError> {
        let mut command = Command::new(&self.command);
        command.args(["stdin", "stdout"]);
        if let Some(language) = &self.language {
            command.args(["-l", language.as_str()]);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(image)?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(IngestError::OcrFailed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Tesseract linked in through leptess. A fresh engine per page keeps the
/// struct `Send + Sync`.
#[cfg(feature = "ocr")]
pub struct LeptessOcr {
    language: String,
}

#[cfg(feature = "ocr")]
impl LeptessOcr {
    pub fn new(language: Option<String>) -> Self {
        Self {
            language: language.unwrap_or_else(|| "eng".to_string()),
        }
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for LeptessOcr {
    fn recognize(&self, image: &[u8]) -> Result<String, IngestError> {
        let mut engine = leptess::LepTess::new(None, &self.language)
            .map_err(|error| IngestError::OcrFailed(format!("tesseract init: {error}")))?;
        engine
            .set_image_from_mem(image)
            .map_err(|error| IngestError::OcrFailed(format!("image load: {error}")))?;
        engine
            .get_utf8_text()
            .map_err(|error| IngestError::OcrFailed(format!("recognition: {error}")))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractorOptions {
    /// Pages whose trimmed text layer is shorter than this are OCR'd.
    pub min_text_chars: usize,
    pub render_dpi: u32,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            min_text_chars: 50,
            render_dpi: 150,
        }
    }
}

pub struct TextExtractor {
    pages: Box<dyn PdfExtractor + Send + Sync>,
    renderer: Box<dyn PageRenderer + Send + Sync>,
    ocr: Box<dyn OcrEngine + Send + Sync>,
    options: ExtractorOptions,
}

impl TextExtractor {
    pub fn new(
        pages: Box<dyn PdfExtractor + Send + Sync>,
        renderer: Box<dyn PageRenderer + Send + Sync>,
        ocr: Box<dyn OcrEngine + Send + Sync>,
        options: ExtractorOptions,
    ) -> Self {
        Self {
            pages,
            renderer,
            ocr,
            options,
        }
    }

    /// lopdf for the text layer, pdftoppm + tesseract for scanned pages. With
    /// the `ocr` feature tesseract is linked through leptess instead of run
    /// as a process.
    pub fn with_system_tools(config: OcrToolConfig) -> Self {
        #[cfg(feature = "ocr")]
        let ocr: Box<dyn OcrEngine + Send + Sync> = Box::new(LeptessOcr::new(config.language));
        #[cfg(not(feature = "ocr"))]
        let ocr: Box<dyn OcrEngine + Send + Sync> =
            Box::new(TesseractOcr::new(config.tesseract, config.language));

        Self::new(
            Box::new(LopdfExtractor),
            Box::new(PdftoppmRenderer::new(config.pdftoppm)),
            ocr,
            ExtractorOptions::default(),
        )
    }

    pub fn try_extract(&self, path: &Path) -> Result<String, IngestError> {
        let pages = self.pages.extract_pages(path)?;
        let mut text = String::new();

        for page in pages {
            let page_text = if page.text.trim().chars().count() < self.options.min_text_chars {
                debug!(path = %path.display(), page = page.number, "falling back to ocr");
                let image = self
                    .renderer
                    .render_page(path, page.number, self.options.render_dpi)?;
                self.ocr.recognize(&image)?
            } else {
                page.text
            };

            text.push_str(&page_text);
            text.push('\n');
        }

        Ok(text.trim().to_string())
    }
}

impl TextSource for TextExtractor {
    fn extract_text(&self, path: &Path) -> String {
        match self.try_extract(path) {
            Ok(text) => text,
            Err(error) => {
                warn!(path = %path.display(), %error, "text extraction failed");
                String::new()
            }
        }
    }
}
