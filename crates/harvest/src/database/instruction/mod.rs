//! Database instructions.
//!
//! Each instruction is a small value describing one unit of work against the store. Executing it
//! borrows the [`Database`] mutably so that instructions run strictly one after another on the
//! single connection.

use super::*;

pub mod add;
pub mod log;
pub mod query;
pub mod statistics;

pub use self::{add::*, log::*, query::*, statistics::*};

/// A single operation against the [`Database`].
#[async_trait]
pub trait DatabaseInstruction {
  /// What the instruction yields on success
  type Output;

  /// Runs the instruction in its own transaction.
  ///
  /// Takes a `&mut` reference to avoid taking ownership and allow multiple operations.
  async fn execute(&self, db: &mut Database) -> Result<Self::Output>;
}
