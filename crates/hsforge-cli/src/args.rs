//! Command-line argument definitions for the hsforge CLI.
//!
//! This module defines the [`Args`] structure parsed from the command line
//! using [`clap`]. A subcommand selects the operation; configuration file
//! selection and logging verbosity apply to all of them.

use clap::{Parser, Subcommand};

/// Command-line arguments for the hsforge library-part tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a blank library part as an HSF tree
    New {
        /// Name of the library part
        name: String,

        /// Directory to write the HSF tree to (defaults to the name)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Convert a flat GDL source file into an HSF tree
    Import {
        /// Path to the flat source file
        input: String,

        /// Directory to write the HSF tree to (defaults to the file stem)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Check a flat source file or an HSF tree for defects
    Lint {
        /// Path to a flat source file or an HSF tree directory
        input: String,
    },

    /// Generate, compile and repair a library part
    Run {
        /// What to build or change
        task: String,

        /// Existing flat source file or HSF tree to modify
        #[arg(short, long)]
        project: Option<String>,

        /// Name of a new library part when no project is given
        #[arg(short, long, default_value = "Untitled")]
        name: String,

        /// Maximum number of attempts (overrides the configuration)
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Directory to write the final HSF tree to
        #[arg(short, long)]
        output: Option<String>,

        /// Write the attempt history to this TOML file
        #[arg(long)]
        report: Option<String>,
    },

    /// Decompile a .gsm library part into an HSF tree
    Decompile {
        /// Path to the .gsm file
        input: String,

        /// Directory to write the HSF tree to (defaults to the file stem)
        #[arg(short, long)]
        output: Option<String>,
    },
}
