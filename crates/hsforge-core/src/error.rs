//! Error and diagnostic system for hsforge.
//!
//! This module provides an error handling system with:
//! - Error codes for documentation and searchability
//! - Slot-relative source locations
//! - Severity levels
//! - Diagnostic collector for accumulating multiple findings
//!
//! # Overview
//!
//! The error system is built around the [`Diagnostic`] type, which represents
//! a single error or warning message with an error code, an optional location
//! inside one script slot, and help text. Multiple diagnostics are wrapped in
//! [`DiagnosticList`] when a phase fails as a whole.
//!
//! # Example
//!
//! ```
//! # use hsforge_core::error::{Diagnostic, ErrorCode, Location};
//! # use hsforge_core::SlotRole;
//!
//! let diag = Diagnostic::error(ErrorCode::UnbalancedBlock, "`FOR` is never closed")
//!     .with_location(Location::new(SlotRole::Geometry, 4))
//!     .with_help("add a matching `NEXT`");
//!
//! assert_eq!(diag.to_string(), "error[L201]: `FOR` is never closed");
//! ```

mod collector;
mod diagnostic;
mod error_code;
mod list;
mod location;
mod model_error;
mod severity;

pub use collector::DiagnosticCollector;
pub use diagnostic::{Diagnostic, sort_diagnostics};
pub use error_code::ErrorCode;
pub use list::DiagnosticList;
pub use location::Location;
pub use model_error::ModelError;
pub use severity::Severity;
