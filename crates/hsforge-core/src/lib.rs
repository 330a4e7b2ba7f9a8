//! hsforge Core Types and Definitions
//!
//! This crate provides the in-memory model of a GDL library part and the
//! diagnostic vocabulary shared by every hsforge phase. It includes:
//!
//! - **Project**: The root aggregate holding identity, parameters and scripts ([`project::Project`])
//! - **Parameters**: The closed parameter type system and the ordered table ([`param`] module)
//! - **Slots**: The five fixed script sections ([`slot::SlotRole`], [`slot::ScriptSlot`])
//! - **Identity**: Library-part GUIDs ([`identity::Guid`])
//! - **Errors**: Diagnostics, error codes and severities ([`error`] module)

pub mod error;
pub mod identity;
pub mod param;
pub mod project;
pub mod slot;

pub use error::{Diagnostic, DiagnosticList, ErrorCode, Location, ModelError, Severity};
pub use identity::Guid;
pub use param::{ParamType, Parameter, ParameterTable, Value};
pub use project::{Project, Summary};
pub use slot::{ScriptSlot, SlotRole};
