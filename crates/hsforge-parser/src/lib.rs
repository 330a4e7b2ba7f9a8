//! # hsforge Parser
//!
//! Text-level processing of GDL library parts. This crate turns flat
//! sources, generation replies and HSF manifests into
//! [`hsforge_core::Project`] values, and checks projects for structural
//! defects before they reach the compiler.
//!
//! ## Usage
//!
//! ```
//! # use hsforge_parser::{lint, parse_source};
//! # use hsforge_core::SlotRole;
//! let parsed = parse_source(
//!     "! ==== 3D SCRIPT ====\nADD 0, 0, 1\nBLOCK A, B, 0.1\nDEL 1\nEND\n\
//!      ! ==== 2D SCRIPT ====\nPROJECT2 3, 270, 2\n",
//! );
//! assert_eq!(parsed.project.script(SlotRole::Geometry).lines().count(), 4);
//!
//! let diagnostics = lint(&parsed.project);
//! assert!(diagnostics.iter().all(|d| !d.is_error()));
//! ```

pub mod aliases;
pub mod lint;
pub mod manifest;
pub mod params;
pub mod reply;
pub mod source;
pub mod statement;
pub mod syntax;
pub mod xml;

pub use lint::{LintContext, LintRule, Linter, lint};
pub use params::{BuiltTable, CandidateParameter, Correction, ParameterBuilder, validate_table};
pub use reply::{Reply, parse_reply};
pub use source::{ParsedSource, parse_file, parse_source, render_source};
