//! Module for the "ocr" command: one PDF in, one markdown file out.

use std::fmt::Write;

use harvest::extract::{full_text, OcrExtractor, PageTexts, PdfSource};

use super::*;

/// Characters of extracted text shown with `--preview`.
const PREVIEW_CHARS: usize = 500;

/// Arguments for [`Commands::Ocr`]
#[derive(Args, Clone)]
pub struct OcrArgs {
  /// PDF file path or `http(s)://` URL
  pub input: String,

  /// Output markdown file (defaults to `<name>_ocr.md` in the working directory)
  #[arg(long, short)]
  pub output: Option<PathBuf>,

  /// Maximum pages to OCR (defaults to `DEFAULT_MAX_PAGES`)
  #[arg(long, short = 'p')]
  pub max_pages: Option<u32>,

  /// Print the start of the extracted text
  #[arg(long)]
  pub preview: bool,
}

/// Function for the [`Commands::Ocr`] in the CLI.
pub async fn ocr(config: &Config, args: OcrArgs) -> Result<()> {
  let service = config.ocr_service().ok_or_else(|| {
    HarvestdError::NotConfigured("OCR_API_KEY and OCR_BASE_URL must be set to use OCR".into())
  })?;

  let source = PdfSource::parse(&args.input);
  if let PdfSource::Path(path) = &source {
    if !path.exists() {
      return Err(HarvestdError::FileNotFound(path.clone()));
    }
  }

  let max_pages = args.max_pages.unwrap_or(config.max_pages);
  println!("{} Extracting up to {max_pages} pages from {source}", style(INFO_PREFIX).cyan());

  let extractor = OcrExtractor::new(service, config.ocr_dpi)?;
  let pages = extractor.extract(&source, max_pages).await?;
  if pages.is_empty() {
    return Err(HarvestdError::NothingExtracted(source.to_string()));
  }

  let text = full_text(&pages);
  let characters = text.chars().count();
  println!(
    "{} Extracted {characters} characters from {} pages",
    style(SUCCESS_PREFIX).green(),
    pages.len()
  );

  let output = args.output.unwrap_or_else(|| default_output(&source));
  if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&output, render(&source, &pages, characters))?;
  println!("{} Saved to {}", style(SUCCESS_PREFIX).green(), style(output.display()).yellow());

  if args.preview {
    println!("\n{}", truncate_chars(&text, PREVIEW_CHARS));
  }
  Ok(())
}

/// `<stem>_ocr.md` for local files, `ocr_output.md` for URLs.
fn default_output(source: &PdfSource) -> PathBuf {
  match source {
    PdfSource::Path(path) => {
      let stem = path.file_stem().map_or_else(|| "ocr".into(), |s| s.to_string_lossy());
      PathBuf::from(format!("{stem}_ocr.md"))
    },
    PdfSource::Url(_) => PathBuf::from("ocr_output.md"),
  }
}

/// Markdown document with a header and one section per page.
fn render(source: &PdfSource, pages: &PageTexts, characters: usize) -> String {
  let mut md = format!(
    "# OCR Extract from PDF\n\n**Source:** {source}\n**Pages Processed:** {}\n**Characters \
     Extracted:** {characters}\n**Date:** {}\n\n---\n\n",
    pages.len(),
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
  );
  for (page, text) in pages {
    let _ = write!(md, "## Page {page}\n\n{text}\n\n---\n\n");
  }
  md
}
