//! Configuration types for hsforge runs.
//!
//! All types implement [`serde::Deserialize`] with every field defaulted, so
//! a partial TOML file (or none at all) yields a usable configuration.
//!
//! # Overview
//!
//! - [`AppConfig`] - Top-level configuration combining every section.
//! - [`CompilerConfig`] - Where the converter lives and how long it may run.
//! - [`GenerationConfig`] - The external command that answers generation requests.
//! - [`RunConfig`] - Limits of the orchestration loop.
//! - [`KnowledgeConfig`] - Where the domain documents are read from.
//!
//! # Example
//!
//! ```
//! # use hsforge::config::AppConfig;
//! let config = AppConfig::default();
//! assert_eq!(config.run().max_attempts(), 5);
//! assert!(config.compiler().path().is_none());
//! ```

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    compiler: CompilerConfig,

    #[serde(default)]
    generation: GenerationConfig,

    #[serde(default)]
    run: RunConfig,

    #[serde(default)]
    knowledge: KnowledgeConfig,
}

impl AppConfig {
    pub fn new(
        compiler: CompilerConfig,
        generation: GenerationConfig,
        run: RunConfig,
        knowledge: KnowledgeConfig,
    ) -> Self {
        Self {
            compiler,
            generation,
            run,
            knowledge,
        }
    }

    pub fn compiler(&self) -> &CompilerConfig {
        &self.compiler
    }

    pub fn generation(&self) -> &GenerationConfig {
        &self.generation
    }

    pub fn run(&self) -> &RunConfig {
        &self.run
    }

    pub fn knowledge(&self) -> &KnowledgeConfig {
        &self.knowledge
    }
}

fn default_compiler_timeout() -> u64 {
    120
}

/// Settings of the `LP_XMLConverter` adapter.
#[derive(Debug, Clone, Deserialize)]
pub struct CompilerConfig {
    /// Converter executable. Discovered when unset.
    #[serde(default)]
    path: Option<PathBuf>,

    /// Upper bound for one converter invocation, in seconds.
    #[serde(default = "default_compiler_timeout")]
    timeout_secs: u64,

    /// Directory compiled `.gsm` files are written to. Defaults to the
    /// current directory.
    #[serde(default)]
    output_dir: Option<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            path: None,
            timeout_secs: default_compiler_timeout(),
            output_dir: None,
        }
    }
}

impl CompilerConfig {
    pub fn new(path: Option<PathBuf>, timeout_secs: u64, output_dir: Option<PathBuf>) -> Self {
        Self {
            path,
            timeout_secs,
            output_dir,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn output_dir(&self) -> Option<&Path> {
        self.output_dir.as_deref()
    }
}

fn default_generation_timeout() -> u64 {
    300
}

/// Settings of the command-backed generator.
///
/// The command receives the prompt on stdin and answers on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    #[serde(default)]
    command: Option<String>,

    #[serde(default)]
    args: Vec<String>,

    #[serde(default = "default_generation_timeout")]
    timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            timeout_secs: default_generation_timeout(),
        }
    }
}

impl GenerationConfig {
    pub fn new(command: Option<String>, args: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            command,
            args,
            timeout_secs,
        }
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    5
}

/// Limits of the orchestration loop.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_max_attempts")]
    max_attempts: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl RunConfig {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

/// Location of the Markdown domain documents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(default)]
    dir: Option<PathBuf>,
}

impl KnowledgeConfig {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [compiler]
            path = "/opt/ac/LP_XMLConverter"

            [generation]
            command = "gdl-model"
            args = ["--json"]
            "#,
        )
        .unwrap();

        assert_eq!(
            config.compiler().path(),
            Some(Path::new("/opt/ac/LP_XMLConverter"))
        );
        assert_eq!(config.compiler().timeout(), Duration::from_secs(120));
        assert_eq!(config.generation().command(), Some("gdl-model"));
        assert_eq!(config.generation().args(), ["--json"]);
        assert_eq!(config.run().max_attempts(), 5);
        assert!(config.knowledge().dir().is_none());
    }
}
