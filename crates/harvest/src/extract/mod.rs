//! Text extraction from paper PDFs.
//!
//! Extraction works page by page. Each page is rendered to a PNG at a fixed resolution and sent on
//! its own to a [`PageReader`]. A page that fails to render or read becomes an empty string and
//! the remaining pages are still processed. Only whole-document problems (the download failed, the
//! file is not a PDF) are returned as errors.
//!
//! # Examples
//!
//! ```no_run
//! use harvest::{
//!   configuration::Config,
//!   extract::{full_text, OcrExtractor, PdfSource},
//!   prelude::*,
//! };
//!
//! # async fn example() -> Result<(), HarvestError> {
//! let config = Config::load()?;
//! let service = config.ocr_service().expect("OCR is configured");
//! let extractor = OcrExtractor::new(service, config.ocr_dpi)?;
//!
//! let source = PdfSource::parse("https://arxiv.org/pdf/2301.07041.pdf");
//! let pages = extractor.extract(&source, 5).await?;
//! println!("{}", full_text(&pages));
//! # Ok(())
//! # }
//! ```

use std::io::Write;

use super::*;
use crate::configuration::ServiceConfig;

pub mod render;
pub mod vision;

pub use self::{render::*, vision::*};

/// Separator placed between pages by [`full_text`].
pub const PAGE_BREAK: &str = "\n\n--- Page Break ---\n\n";

/// Default render resolution.
pub const DEFAULT_DPI: u32 = 200;

/// Time a PDF download may take.
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// Extracted text keyed by 1-based page number.
pub type PageTexts = BTreeMap<u32, String>;

/// Where a PDF comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfSource {
  /// Downloaded to a temporary file that is removed afterwards
  Url(String),
  /// Read in place
  Path(PathBuf),
}

impl PdfSource {
  /// Treats `http://` and `https://` strings as URLs and anything else as a local path.
  pub fn parse(source: &str) -> Self {
    if source.starts_with("http://") || source.starts_with("https://") {
      Self::Url(source.to_string())
    } else {
      Self::Path(PathBuf::from(source))
    }
  }
}

impl Display for PdfSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      Self::Url(url) => write!(f, "{url}"),
      Self::Path(path) => write!(f, "{}", path.display()),
    }
  }
}

/// Joins pages in page order with [`PAGE_BREAK`].
pub fn full_text(pages: &PageTexts) -> String {
  pages.values().map(String::as_str).collect::<Vec<_>>().join(PAGE_BREAK)
}

/// Something that can pull text out of a PDF.
#[async_trait]
pub trait Extract: Send + Sync {
  /// Extracts up to `max_pages` pages from `source`.
  ///
  /// # Errors
  ///
  /// Fails only when the document as a whole is unavailable or unreadable.
  async fn extract(&self, source: &PdfSource, max_pages: u32) -> Result<PageTexts>;
}

/// [`Extract`] implementation that renders pages and reads them one at a time.
#[derive(Debug, Clone)]
pub struct OcrExtractor<R = Pdftoppm, P = VisionReader> {
  /// Page rasterizer
  renderer: R,
  /// Page reader
  reader:   P,
  /// Render resolution
  dpi:      u32,
  /// Client used for PDF downloads
  client:   reqwest::Client,
}

impl OcrExtractor {
  /// Extractor using `pdftoppm` and the configured vision model.
  pub fn new(service: &ServiceConfig, dpi: u32) -> Result<Self> {
    Ok(Self::with_parts(Pdftoppm::new(), VisionReader::new(service)?, dpi))
  }
}

impl<R: PageRenderer, P: PageReader> OcrExtractor<R, P> {
  /// Extractor from explicit parts.
  pub fn with_parts(renderer: R, reader: P, dpi: u32) -> Self {
    Self { renderer, reader, dpi, client: crate::llm::http_client(DOWNLOAD_TIMEOUT) }
  }

  /// Replaces the download time limit.
  pub fn with_download_timeout(mut self, timeout: Duration) -> Self {
    self.client = crate::llm::http_client(timeout);
    self
  }

  /// Runs the page loop over a local file.
  async fn extract_path(&self, pdf: &Path, max_pages: u32) -> Result<PageTexts> {
    let page_count = self.renderer.page_count(pdf)?;
    let last = page_count.min(max_pages);
    info!("Extracting {last} of {page_count} pages from {}", pdf.display());

    let mut pages = PageTexts::new();
    for page in 1..=last {
      debug!("Processing page {page}/{last}");
      let text = match self.renderer.render(pdf, page, self.dpi).await {
        Ok(png) => match self.reader.read(&png).await {
          Ok(text) => text,
          Err(e) => {
            warn!("Could not read page {page}: {e}");
            String::new()
          },
        },
        Err(e) => {
          warn!("Could not render page {page}: {e}");
          String::new()
        },
      };
      pages.insert(page, text);
    }
    Ok(pages)
  }

  /// Downloads `url` into a temporary file that is deleted when the handle drops.
  async fn download(&self, url: &str) -> Result<tempfile::NamedTempFile> {
    debug!("Downloading PDF from {url}");
    let response = self.client.get(url).send().await?;
    if !response.status().is_success() {
      return Err(HarvestError::ApiError(format!(
        "Failed to download PDF: {}",
        response.status()
      )));
    }

    let bytes = response.bytes().await?;
    let mut file = tempfile::Builder::new().prefix("harvest-").suffix(".pdf").tempfile()?;
    file.write_all(&bytes)?;
    file.flush()?;
    trace!("Saved {} bytes to {}", bytes.len(), file.path().display());
    Ok(file)
  }
}

#[async_trait]
impl<R: PageRenderer, P: PageReader> Extract for OcrExtractor<R, P> {
  async fn extract(&self, source: &PdfSource, max_pages: u32) -> Result<PageTexts> {
    match source {
      PdfSource::Path(path) => self.extract_path(path, max_pages).await,
      PdfSource::Url(url) => {
        let file = self.download(url).await?;
        let result = self.extract_path(file.path(), max_pages).await;
        if let Err(e) = file.close() {
          warn!("Could not remove temporary PDF: {e}");
        }
        result
      },
    }
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    atomic::{AtomicU32, Ordering},
    Mutex,
  };

  use super::*;

  /// Renders page `n` as the bytes of its number and fails on the listed pages.
  struct FakeRenderer {
    pages:   u32,
    failing: Vec<u32>,
  }

  #[async_trait]
  impl PageRenderer for FakeRenderer {
    fn page_count(&self, _pdf: &Path) -> Result<u32> { Ok(self.pages) }

    async fn render(&self, _pdf: &Path, page: u32, dpi: u32) -> Result<Vec<u8>> {
      assert_eq!(dpi, DEFAULT_DPI);
      if self.failing.contains(&page) {
        return Err(HarvestError::Render { page, reason: "boom".into() });
      }
      Ok(page.to_string().into_bytes())
    }
  }

  /// Echoes the page number and fails on the listed pages.
  struct FakeReader {
    failing: Vec<u32>,
    calls:   AtomicU32,
    order:   Mutex<Vec<u32>>,
  }

  impl FakeReader {
    fn failing(failing: &[u32]) -> Self {
      Self { failing: failing.to_vec(), calls: AtomicU32::new(0), order: Mutex::new(Vec::new()) }
    }
  }

  #[async_trait]
  impl PageReader for FakeReader {
    async fn read(&self, png: &[u8]) -> Result<String> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let page: u32 = String::from_utf8_lossy(png).parse().unwrap();
      self.order.lock().unwrap().push(page);
      if self.failing.contains(&page) {
        return Err(HarvestError::ApiError("model unavailable".into()));
      }
      Ok(format!("text of page {page}"))
    }
  }

  fn local() -> PdfSource { PdfSource::Path(PathBuf::from("paper.pdf")) }

  #[traced_test]
  #[tokio::test]
  async fn test_failed_page_is_empty_and_others_survive() {
    let extractor = OcrExtractor::with_parts(
      FakeRenderer { pages: 3, failing: vec![] },
      FakeReader::failing(&[2]),
      DEFAULT_DPI,
    );

    let pages = extractor.extract(&local(), 20).await.unwrap();
    assert_eq!(pages.len(), 3);
    assert_eq!(pages[&1], "text of page 1");
    assert_eq!(pages[&2], "");
    assert_eq!(pages[&3], "text of page 3");
    assert!(logs_contain("Could not read page 2"));

    assert_eq!(
      full_text(&pages),
      "text of page 1\n\n--- Page Break ---\n\n\n\n--- Page Break ---\n\ntext of page 3"
    );
  }

  #[traced_test]
  #[tokio::test]
  async fn test_render_failure_skips_reader() {
    let extractor = OcrExtractor::with_parts(
      FakeRenderer { pages: 2, failing: vec![1] },
      FakeReader::failing(&[]),
      DEFAULT_DPI,
    );

    let pages = extractor.extract(&local(), 20).await.unwrap();
    assert_eq!(pages[&1], "");
    assert_eq!(pages[&2], "text of page 2");
    assert_eq!(extractor.reader.calls.load(Ordering::SeqCst), 1);
    assert!(logs_contain("Could not render page 1"));
  }

  #[tokio::test]
  async fn test_max_pages_limits_work_and_order_is_sequential() {
    let extractor = OcrExtractor::with_parts(
      FakeRenderer { pages: 30, failing: vec![] },
      FakeReader::failing(&[]),
      DEFAULT_DPI,
    );

    let pages = extractor.extract(&local(), 4).await.unwrap();
    assert_eq!(pages.keys().copied().collect::<Vec<_>>(), vec![1, 2, 3, 4]);
    assert_eq!(*extractor.reader.order.lock().unwrap(), vec![1, 2, 3, 4]);
  }

  #[tokio::test]
  async fn test_unreadable_document_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.pdf");
    std::fs::write(&path, b"%PDF-1.4 truncated").unwrap();

    let extractor = OcrExtractor::with_parts(Pdftoppm::new(), FakeReader::failing(&[]), DEFAULT_DPI);
    assert!(extractor.extract(&PdfSource::Path(path), 5).await.is_err());
  }

  #[tokio::test]
  async fn test_failed_download_is_an_error() {
    let extractor = OcrExtractor::with_parts(
      FakeRenderer { pages: 1, failing: vec![] },
      FakeReader::failing(&[]),
      DEFAULT_DPI,
    );
    let source = PdfSource::Url("http://127.0.0.1:9/paper.pdf".into());
    assert!(extractor.extract(&source, 5).await.is_err());
    assert_eq!(extractor.reader.calls.load(Ordering::SeqCst), 0);
  }

  #[tokio::test]
  async fn test_silent_download_times_out() {
    let extractor = OcrExtractor::with_parts(
      FakeRenderer { pages: 1, failing: vec![] },
      FakeReader::failing(&[]),
      DEFAULT_DPI,
    )
    .with_download_timeout(Duration::from_millis(200));
    let source = PdfSource::Url(format!("{}/paper.pdf", crate::llm::tests::silent_server()));

    let result = tokio::time::timeout(Duration::from_secs(5), extractor.extract(&source, 5))
      .await
      .expect("download should give up after its own timeout");
    assert!(matches!(result, Err(HarvestError::Network(e)) if e.is_timeout()));
    assert_eq!(extractor.reader.calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn test_source_parsing() {
    assert_eq!(
      PdfSource::parse("https://arxiv.org/pdf/1.pdf"),
      PdfSource::Url("https://arxiv.org/pdf/1.pdf".into())
    );
    assert_eq!(PdfSource::parse("papers/1.pdf"), PdfSource::Path(PathBuf::from("papers/1.pdf")));
  }

  #[test]
  fn test_full_text_orders_numerically() {
    let mut pages = PageTexts::new();
    pages.insert(10, "ten".into());
    pages.insert(2, "two".into());
    pages.insert(1, "one".into());
    assert_eq!(full_text(&pages), format!("one{PAGE_BREAK}two{PAGE_BREAK}ten"));
    assert_eq!(full_text(&PageTexts::new()), "");
  }
}
