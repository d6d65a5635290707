//! Client for OpenAI-compatible chat completion services.
//!
//! Both the OCR capability (a vision model reading page images) and the summarization capability
//! (a text model) talk to `/chat/completions` endpoints with bearer authentication. This module
//! provides the shared request builder; prompts live with their callers in [`crate::extract`] and
//! [`crate::summarize`].
//!
//! # Examples
//!
//! ```no_run
//! use harvest::llm::ChatRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let response = ChatRequest::new()
//!   .with_host("http://localhost:11434/v1")
//!   .with_api_key("sk-local")
//!   .with_model("openai/gpt-oss-20b")
//!   .with_system("You answer in one word.")
//!   .with_message("What is the capital of France?")
//!   .with_max_tokens(16)
//!   .send()
//!   .await?;
//!
//! println!("Response: {}", response.content().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

use base64::{engine::general_purpose::STANDARD, Engine};

use super::*;

/// Host used when none was configured.
const FALLBACK_HOST: &str = "http://localhost:11434/v1";

/// Seconds a chat completion may take before it counts as failed.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// HTTP client whose requests fail once they take longer than `timeout`.
///
/// The timeout covers the whole request, from connecting until the body has been read.
pub fn http_client(timeout: Duration) -> reqwest::Client {
  reqwest::Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
    error!("Could not build HTTP client, requests will not time out: {e}");
    reqwest::Client::new()
  })
}

/// Who a [`Message`] is from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
  /// Instructions framing the conversation
  System,
  /// The caller
  User,
  /// The model
  Assistant,
}

/// Message content: plain text or a list of typed parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
  /// Plain text
  Text(String),
  /// Mixed text and image parts, used for vision requests
  Parts(Vec<ContentPart>),
}

/// One part of a multi-part message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
  /// A text fragment
  Text {
    /// The text itself
    text: String,
  },
  /// An image, inline as a data URL
  ImageUrl {
    /// Image location
    image_url: ImageUrl,
  },
}

/// Image reference inside a [`ContentPart::ImageUrl`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
  /// `data:image/png;base64,…` or a remote URL
  pub url: String,
}

/// A single message in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
  /// The role of the message sender
  pub role:    Role,
  /// What the sender said
  pub content: Content,
}

impl Message {
  /// Plain-text message from `role`.
  pub fn text(role: Role, content: &str) -> Self {
    Self { role, content: Content::Text(content.to_string()) }
  }

  /// User message carrying a text instruction and a PNG image.
  pub fn png_with_text(png: &[u8], text: &str) -> Self {
    let url = format!("data:image/png;base64,{}", STANDARD.encode(png));
    Self {
      role:    Role::User,
      content: Content::Parts(vec![
        ContentPart::Text { text: text.to_string() },
        ContentPart::ImageUrl { image_url: ImageUrl { url } },
      ]),
    }
  }
}

/// Request builder for chat completions.
///
/// The model and at least one message are required; [`ChatRequest::send`] checks both before
/// touching the network.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
  /// Model name. Sending without one is an error
  pub model:       Option<String>,
  /// Conversation so far, in order
  pub messages:    Vec<Message>,
  /// Upper bound on generated tokens
  #[serde(skip_serializing_if = "Option::is_none")]
  pub max_tokens:  Option<u32>,
  /// Sampling temperature
  #[serde(skip_serializing_if = "Option::is_none")]
  pub temperature: Option<f64>,
  /// Resolved `/chat/completions` endpoint
  #[serde(skip)]
  pub url:         Option<Url>,
  /// Bearer token, if the service wants one
  #[serde(skip)]
  api_key:         Option<String>,
  /// HTTP client, shared when the caller supplies one
  #[serde(skip)]
  client:          reqwest::Client,
}

/// Response body of a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
  /// Model that answered, when the service reports it
  #[serde(default)]
  pub model:   Option<String>,
  /// Candidate answers; only the first is used
  #[serde(default)]
  pub choices: Vec<Choice>,
}

/// One candidate answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
  /// The generated message
  pub message: ResponseMessage,
}

/// Message returned by the service. Content may be null for some reasoning models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
  /// Generated text
  #[serde(default)]
  pub content: Option<String>,
}

impl ChatResponse {
  /// Trimmed content of the first choice, if any.
  pub fn content(&self) -> Option<&str> {
    self.choices.first().and_then(|c| c.message.content.as_deref()).map(str::trim)
  }
}

/// Resolves a base URL to its `/chat/completions` endpoint.
///
/// Accepts the endpoint itself, a `/v1` base, or a bare host.
pub fn completions_endpoint(base: &str) -> Result<Url> {
  let base = base.trim().trim_end_matches('/');
  let endpoint = if base.ends_with("/chat/completions") {
    base.to_string()
  } else if base.ends_with("/v1") {
    format!("{base}/chat/completions")
  } else {
    format!("{base}/v1/chat/completions")
  };
  Url::parse(&endpoint).map_err(|e| HarvestError::Config(format!("invalid endpoint `{base}`: {e}")))
}

impl Default for ChatRequest {
  fn default() -> Self {
    Self {
      model:       None,
      messages:    Vec::new(),
      max_tokens:  None,
      temperature: None,
      url:         None,
      api_key:     None,
      client:      http_client(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
    }
  }
}

impl ChatRequest {
  /// Creates a new request with builder-style API with default settings.
  pub fn new() -> Self { Self::default() }

  /// Sets the service base URL; see [`completions_endpoint`] for accepted shapes.
  pub fn with_host(mut self, host: &str) -> Self {
    match completions_endpoint(host) {
      Ok(url) => self.url = Some(url),
      Err(e) => warn!("Ignoring host: {e}"),
    }
    self
  }

  /// Sets the bearer token. Empty keys are ignored.
  pub fn with_api_key(mut self, api_key: &str) -> Self {
    self.api_key = Some(api_key.to_string()).filter(|k| !k.is_empty());
    self
  }

  /// Reuses an existing HTTP client.
  pub fn with_client(mut self, client: reqwest::Client) -> Self {
    self.client = client;
    self
  }

  /// Sets the model to use for the request.
  pub fn with_model(mut self, model: &str) -> Self {
    self.model.replace(model.to_string());
    self
  }

  /// Adds a system message.
  pub fn with_system(mut self, content: &str) -> Self {
    self.messages.push(Message::text(Role::System, content));
    self
  }

  /// Adds a user message.
  pub fn with_message(mut self, content: &str) -> Self {
    self.messages.push(Message::text(Role::User, content));
    self
  }

  /// Adds a prebuilt message, e.g. one from [`Message::png_with_text`].
  pub fn with(mut self, message: Message) -> Self {
    self.messages.push(message);
    self
  }

  /// Caps the length of the answer.
  pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
    self.max_tokens = Some(max_tokens);
    self
  }

  /// Sets the sampling temperature.
  pub fn with_temperature(mut self, temperature: f64) -> Self {
    self.temperature = Some(temperature);
    self
  }

  /// Sends the request.
  ///
  /// # Errors
  ///
  /// This function will return an error if:
  /// - No model is specified
  /// - No messages are provided
  /// - The network request fails or the service answers with an error status
  /// - The response cannot be parsed
  pub async fn send(&self) -> Result<ChatResponse> {
    if self.model.is_none() {
      return Err(HarvestError::LLMMissingModel);
    }
    if self.messages.is_empty() {
      return Err(HarvestError::LLMMissingMessage);
    }

    let url = match &self.url {
      Some(url) => url.clone(),
      None => {
        warn!("No host set, using {FALLBACK_HOST}");
        completions_endpoint(FALLBACK_HOST)?
      },
    };

    let mut request = self.client.post(url).json(self);
    if let Some(key) = &self.api_key {
      request = request.bearer_auth(key);
    }

    let response: ChatResponse = request.send().await?.error_for_status()?.json().await?;
    trace!("Chat response: {response:?}");
    Ok(response)
  }

  /// Sends the request and returns the trimmed text of the first choice.
  ///
  /// # Errors
  ///
  /// Everything [`ChatRequest::send`] can return, plus [`HarvestError::ApiError`] when the
  /// service answered without content.
  pub async fn send_for_text(&self) -> Result<String> {
    let response = self.send().await?;
    response
      .content()
      .map(str::to_string)
      .ok_or_else(|| HarvestError::ApiError("response contained no message content".to_string()))
  }
}
