//! Error types for the `harvest` binary.

use thiserror::Error;

use super::*;

/// Errors surfaced to the user by a subcommand.
#[derive(Error, Debug)]
pub enum HarvestdError {
  /// Anything the library reports
  #[error(transparent)]
  Harvest(#[from] HarvestError),

  /// Reading or writing local files
  #[error(transparent)]
  Io(#[from] std::io::Error),

  /// A local input file does not exist
  #[error("File not found: {}", .0.display())]
  FileNotFound(PathBuf),

  /// OCR produced no pages
  #[error("No text extracted from {0}")]
  NothingExtracted(String),

  /// A capability the command needs is not configured
  #[error("{0}; run `harvest config` to see what is missing")]
  NotConfigured(String),

  /// A command line value is out of range
  #[error("Invalid argument: {0}")]
  InvalidArgument(String),
}

/// Result alias for subcommands.
pub type Result<T> = core::result::Result<T, HarvestdError>;
