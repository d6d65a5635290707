//! Page reading through a vision-capable chat model.

use super::*;
use crate::{configuration::ServiceConfig, llm::{ChatRequest, Message}};

/// System prompt for page reading.
const OCR_SYSTEM_PROMPT: &str = "You are a helpful OCR assistant.";

/// Instruction sent alongside every page image.
const OCR_INSTRUCTION: &str = "Extract the text from the above document as if you were reading it \
                               naturally. Return the tables in html format. Return the equations \
                               in LaTeX representation. If there is an image in the document and \
                               image caption is not present, add a small description of the image \
                               inside the <img></img> tag; otherwise, add the image caption inside \
                               <img></img>. Watermarks should be wrapped in brackets. Ex: \
                               <watermark>OFFICIAL COPY</watermark>. Page numbers should be \
                               wrapped in brackets. Ex: <page_number>14</page_number> or \
                               <page_number>9/22</page_number>. Prefer using ☐ and ☑ for check \
                               boxes.";

/// Turns one rendered page into text.
#[async_trait]
pub trait PageReader: Send + Sync {
  /// Reads the text of a PNG page image.
  async fn read(&self, png: &[u8]) -> Result<String>;
}

/// [`PageReader`] that sends each page to an OpenAI-compatible vision model.
#[derive(Debug, Clone)]
pub struct VisionReader {
  /// Service endpoint
  base_url: String,
  /// Bearer token
  api_key:  String,
  /// Vision model name
  model:    String,
  /// Shared HTTP client
  client:   reqwest::Client,
}

impl VisionReader {
  /// Creates a reader for the given service.
  ///
  /// # Errors
  ///
  /// Returns [`HarvestError::Config`] when the base URL cannot be turned into an endpoint.
  pub fn new(service: &ServiceConfig) -> Result<Self> {
    crate::llm::completions_endpoint(&service.base_url)?;
    Ok(Self {
      base_url: service.base_url.clone(),
      api_key:  service.api_key.clone(),
      model:    service.model.clone(),
      client:   crate::llm::http_client(service.timeout()),
    })
  }
}

#[async_trait]
impl PageReader for VisionReader {
  async fn read(&self, png: &[u8]) -> Result<String> {
    ChatRequest::new()
      .with_client(self.client.clone())
      .with_host(&self.base_url)
      .with_api_key(&self.api_key)
      .with_model(&self.model)
      .with_system(OCR_SYSTEM_PROMPT)
      .with(Message::png_with_text(png, OCR_INSTRUCTION))
      .with_max_tokens(2048)
      .with_temperature(0.0)
      .send_for_text()
      .await
  }
}
