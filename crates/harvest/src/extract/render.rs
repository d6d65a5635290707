//! PDF page rasterization.

use lopdf::Document;
use tokio::process::Command;

use super::*;

/// Turns PDF pages into PNG images.
#[async_trait]
pub trait PageRenderer: Send + Sync {
  /// Number of pages in the document.
  ///
  /// This doubles as validation: a file that is not a readable PDF fails here, before any page
  /// is rendered.
  fn page_count(&self, pdf: &Path) -> Result<u32>;

  /// Renders one 1-based page to PNG bytes at `dpi`.
  async fn render(&self, pdf: &Path, page: u32, dpi: u32) -> Result<Vec<u8>>;
}

/// Time one page render may take before the child is killed.
pub const RENDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Renderer backed by poppler's `pdftoppm`, with `lopdf` for page counting.
#[derive(Debug, Clone)]
pub struct Pdftoppm {
  /// Executable to run
  program: PathBuf,
  /// Limit on a single render
  timeout: Duration,
}

impl Default for Pdftoppm {
  fn default() -> Self { Self { program: PathBuf::from("pdftoppm"), timeout: RENDER_TIMEOUT } }
}

impl Pdftoppm {
  /// Uses `pdftoppm` from `PATH`.
  pub fn new() -> Self { Self::default() }

  /// Uses a specific `pdftoppm` executable.
  pub fn with_program(program: impl Into<PathBuf>) -> Self {
    Self { program: program.into(), ..Self::default() }
  }

  /// Replaces the per-page time limit.
  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = timeout;
    self
  }
}

#[async_trait]
impl PageRenderer for Pdftoppm {
  fn page_count(&self, pdf: &Path) -> Result<u32> {
    let document = Document::load(pdf)?;
    Ok(document.get_pages().len() as u32)
  }

  async fn render(&self, pdf: &Path, page: u32, dpi: u32) -> Result<Vec<u8>> {
    let render_error = |reason: String| HarvestError::Render { page, reason };

    let dir = tempfile::tempdir()?;
    let prefix = dir.path().join("page");
    let run = Command::new(&self.program)
      .arg("-png")
      .arg("-singlefile")
      .args(["-r", &dpi.to_string()])
      .args(["-f", &page.to_string(), "-l", &page.to_string()])
      .arg(pdf)
      .arg(&prefix)
      .kill_on_drop(true)
      .output();

    let output = tokio::time::timeout(self.timeout, run)
      .await
      .map_err(|_| render_error(format!("timed out after {:?}", self.timeout)))?
      .map_err(|e| render_error(format!("could not run {}: {e}", self.program.display())))?;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      return Err(render_error(format!("{} ({})", stderr.trim(), output.status)));
    }

    let png = tokio::fs::read(prefix.with_extension("png")).await?;
    trace!("Rendered page {page} of {} ({} bytes)", pdf.display(), png.len());
    Ok(png)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_page_count_rejects_non_pdf() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("not-a-paper.pdf");
    std::fs::write(&path, "<html>Service unavailable</html>").unwrap();

    assert!(Pdftoppm::new().page_count(&path).is_err());
  }

  #[tokio::test]
  async fn test_missing_program_is_a_render_error() {
    let dir = tempdir().unwrap();
    let renderer = Pdftoppm::with_program(dir.path().join("no-such-pdftoppm"));
    let result = renderer.render(&dir.path().join("x.pdf"), 3, 200).await;
    assert!(matches!(result, Err(HarvestError::Render { page: 3, .. })));
  }

  #[cfg(unix)]
  #[tokio::test]
  async fn test_hung_renderer_is_killed_after_timeout() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let program = dir.path().join("slow-pdftoppm");
    std::fs::write(&program, "#!/bin/sh\nsleep 30\n").unwrap();
    std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

    let renderer = Pdftoppm::with_program(&program).with_timeout(Duration::from_millis(200));
    let result = tokio::time::timeout(
      Duration::from_secs(5),
      renderer.render(&dir.path().join("x.pdf"), 2, 200),
    )
    .await
    .expect("render should give up after its own timeout");

    match result {
      Err(HarvestError::Render { page: 2, reason }) => assert!(reason.contains("timed out")),
      other => panic!("expected a render timeout, got {other:?}"),
    }
  }
}
