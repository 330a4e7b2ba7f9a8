//! Error codes for the hsforge diagnostic system.
//!
//! Error codes are organized by phase:
//! - `P0xx` - Source and reply parsing findings
//! - `M1xx` - Parameter model and validation errors
//! - `L2xx` - Structural lint findings
//! - `C3xx` - Compilation and run-loop errors

use std::fmt;

use serde::{Serialize, Serializer};

/// Error codes for categorizing diagnostics.
///
/// Every defect kind has its own code so that repair prompts can target
/// the specific problem rather than a generic validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // =========================================================================
    // Parse Findings (P0xx)
    // =========================================================================
    /// Structural anomaly in the input that the parser recovered from.
    ///
    /// Covers repeated section headers, undecodable bytes and similar
    /// irregularities. Parsing continues.
    ParseAnomaly,

    /// A recognized section header with no content under it.
    EmptySection,

    /// A recognized section that has no slot in a library part.
    ///
    /// Property scripts are the usual case. Their content is dropped.
    UnsupportedSection,

    /// A parameter registered from a master-script assignment.
    ///
    /// The type was guessed from the literal's shape and the name prefix.
    InferredParameter,

    /// A line in the parameter list that is not a declaration.
    UnreadableDeclaration,

    /// A reply block whose header names no known script or manifest.
    UnrecognizedBlock,

    /// A generation reply with no recognizable blocks.
    EmptyReply,

    // =========================================================================
    // Parameter Errors (M1xx)
    // =========================================================================
    /// Assignment to a parameter that is not declared.
    UnknownParameter,

    /// A value whose shape disagrees with the declared parameter type.
    ///
    /// For example a text value for a length, or a fractional integer.
    TypeMismatch,

    /// A parameter type name that is neither canonical nor a known alias.
    UnsupportedParameterType,

    /// Two parameters share a name.
    DuplicateParameter,

    /// One of `A`, `B` or `ZZYZX` is absent from the table.
    MissingReservedParameter,

    /// A reserved parameter declared with a type other than Length.
    ReservedParameterType,

    /// A reserved parameter without the fixed flag.
    ReservedParameterNotFixed,

    /// A boolean parameter whose value is neither 0 nor 1.
    ///
    /// The value is reported, never clamped.
    BooleanDomain,

    /// A non-boolean parameter whose default does not fit its type.
    InvalidValue,

    /// A description that cannot be embedded safely in the manifest.
    ///
    /// It holds a CDATA terminator, a line break, or both quote characters.
    MalformedDescription,

    /// A generation round tried to change the type of a fixed parameter.
    ///
    /// The existing declaration is kept.
    FixedParameterRetyped,

    // =========================================================================
    // Lint Findings (L2xx)
    // =========================================================================
    /// A block opener with no matching closer.
    UnbalancedBlock,

    /// A block closer with no matching opener.
    ///
    /// Also raised for `ENDIF` after a single-line `IF` and for a stray `ELSE`.
    UnexpectedTerminator,

    /// `END` inside a subroutine body, before its `RETURN`.
    ///
    /// The compiler accepts this, but every statement after the `GOSUB`
    /// is silently skipped at runtime.
    PrematureTermination,

    /// The 3D script's main flow does not end with `END`.
    MissingTerminator,

    /// A subroutine body that runs into the next label or the end of the script.
    MissingReturn,

    /// `GOSUB` to a label that the script never defines.
    UndefinedSubroutine,

    /// Transformation pushes and `DEL` pops that do not balance within a scope.
    TransformImbalance,

    /// Markdown or reply-format residue copied into a script.
    ForeignTokenResidue,

    /// A 2D script without any drawing or projection statement.
    EmptyProjection,

    // =========================================================================
    // Compile and Run Errors (C3xx)
    // =========================================================================
    /// An error reported by the external converter.
    CompilerError,

    /// A warning reported by the external converter.
    CompilerWarning,

    /// A blocking call exceeded its deadline.
    Timeout,

    /// Two consecutive attempts produced the same document.
    Stalled,

    /// The external converter could not be located or started.
    ExternalToolUnavailable,

    /// The generation service returned an error.
    GenerationFailed,
}

impl ErrorCode {
    /// Returns the code as a string (e.g., "L202").
    pub fn as_str(&self) -> &'static str {
        match self {
            // Parse findings
            ErrorCode::ParseAnomaly => "P001",
            ErrorCode::EmptySection => "P002",
            ErrorCode::UnsupportedSection => "P003",
            ErrorCode::InferredParameter => "P004",
            ErrorCode::UnreadableDeclaration => "P005",
            ErrorCode::UnrecognizedBlock => "P006",
            ErrorCode::EmptyReply => "P007",
            // Parameter errors
            ErrorCode::UnknownParameter => "M101",
            ErrorCode::TypeMismatch => "M102",
            ErrorCode::UnsupportedParameterType => "M103",
            ErrorCode::DuplicateParameter => "M104",
            ErrorCode::MissingReservedParameter => "M105",
            ErrorCode::ReservedParameterType => "M106",
            ErrorCode::ReservedParameterNotFixed => "M107",
            ErrorCode::BooleanDomain => "M108",
            ErrorCode::InvalidValue => "M109",
            ErrorCode::MalformedDescription => "M110",
            ErrorCode::FixedParameterRetyped => "M111",
            // Lint findings
            ErrorCode::UnbalancedBlock => "L201",
            ErrorCode::UnexpectedTerminator => "L202",
            ErrorCode::PrematureTermination => "L203",
            ErrorCode::MissingTerminator => "L204",
            ErrorCode::MissingReturn => "L205",
            ErrorCode::UndefinedSubroutine => "L206",
            ErrorCode::TransformImbalance => "L207",
            ErrorCode::ForeignTokenResidue => "L208",
            ErrorCode::EmptyProjection => "L209",
            // Compile and run errors
            ErrorCode::CompilerError => "C301",
            ErrorCode::CompilerWarning => "C302",
            ErrorCode::Timeout => "C303",
            ErrorCode::Stalled => "C304",
            ErrorCode::ExternalToolUnavailable => "C305",
            ErrorCode::GenerationFailed => "C306",
        }
    }

    /// Returns a short description of what this error code means.
    pub fn description(&self) -> &'static str {
        match self {
            // Parse findings
            ErrorCode::ParseAnomaly => "parse anomaly",
            ErrorCode::EmptySection => "empty section",
            ErrorCode::UnsupportedSection => "unsupported section",
            ErrorCode::InferredParameter => "inferred parameter",
            ErrorCode::UnreadableDeclaration => "unreadable parameter declaration",
            ErrorCode::UnrecognizedBlock => "unrecognized reply block",
            ErrorCode::EmptyReply => "empty generation reply",
            // Parameter errors
            ErrorCode::UnknownParameter => "unknown parameter",
            ErrorCode::TypeMismatch => "type mismatch",
            ErrorCode::UnsupportedParameterType => "unsupported parameter type",
            ErrorCode::DuplicateParameter => "duplicate parameter",
            ErrorCode::MissingReservedParameter => "missing reserved parameter",
            ErrorCode::ReservedParameterType => "reserved parameter is not a length",
            ErrorCode::ReservedParameterNotFixed => "reserved parameter is not fixed",
            ErrorCode::BooleanDomain => "boolean value out of domain",
            ErrorCode::InvalidValue => "invalid parameter value",
            ErrorCode::MalformedDescription => "malformed description",
            ErrorCode::FixedParameterRetyped => "fixed parameter retyped",
            // Lint findings
            ErrorCode::UnbalancedBlock => "unbalanced block",
            ErrorCode::UnexpectedTerminator => "unexpected terminator",
            ErrorCode::PrematureTermination => "premature termination",
            ErrorCode::MissingTerminator => "missing terminator",
            ErrorCode::MissingReturn => "missing return",
            ErrorCode::UndefinedSubroutine => "undefined subroutine",
            ErrorCode::TransformImbalance => "transform imbalance",
            ErrorCode::ForeignTokenResidue => "foreign token residue",
            ErrorCode::EmptyProjection => "empty projection",
            // Compile and run errors
            ErrorCode::CompilerError => "compiler error",
            ErrorCode::CompilerWarning => "compiler warning",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Stalled => "stalled",
            ErrorCode::ExternalToolUnavailable => "external tool unavailable",
            ErrorCode::GenerationFailed => "generation failed",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
