//! Configuration parsing and validation.
//!
//! Workspace RAG is configured with a TOML file (default `./config/wrag.toml`).
//!
//! ```toml
//! [db]
//! path = "./data/wrag.sqlite"
//!
//! [chunking]
//! unit = "chars"      # or "tokens" (4 characters per token)
//! max_size = 1000
//! overlap = 200
//!
//! [retrieval]
//! default_k = 8
//! max_k = 50
//!
//! [embedding]
//! provider = "hashed" # hashed | local | openai | ollama | disabled
//! dims = 384
//!
//! [ingest]
//! max_file_bytes = 20971520
//! concurrency = 4
//! include_globs = ["**/*.md", "**/*.pdf"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use workspace_rag_core::chunk::ChunkParams;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Unit in which `max_size` and `overlap` are expressed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    #[default]
    Chars,
    Tokens,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default)]
    pub unit: ChunkUnit,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            unit: ChunkUnit::Chars,
            max_size: default_max_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Window parameters in characters.
    pub fn params(&self) -> Result<ChunkParams> {
        let params = match self.unit {
            ChunkUnit::Chars => ChunkParams::new(self.max_size, self.overlap),
            ChunkUnit::Tokens => ChunkParams::from_tokens(self.max_size, self.overlap),
        };
        Ok(params?)
    }
}

fn default_max_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
            max_k: default_max_k(),
        }
    }
}

fn default_k() -> usize {
    8
}
fn default_max_k() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the `ollama` provider (or an OpenAI-compatible endpoint).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Globs applied when ingesting a directory.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            concurrency: default_concurrency(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_max_file_bytes() -> u64 {
    20 * 1024 * 1024
}
fn default_concurrency() -> usize {
    4
}
fn default_include_globs() -> Vec<String> {
    [
        "txt", "md", "markdown", "csv", "tsv", "json", "pdf", "docx", "pptx", "xlsx",
    ]
    .iter()
    .map(|ext| format!("**/*.{}", ext))
    .collect()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = parse_config(&content)?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    config
        .chunking
        .params()
        .context("Invalid [chunking] section")?;

    // Validate retrieval
    if config.retrieval.max_k == 0 {
        bail!("retrieval.max_k must be >= 1");
    }
    if config.retrieval.default_k == 0 || config.retrieval.default_k > config.retrieval.max_k {
        bail!(
            "retrieval.default_k must be in [1, {}]",
            config.retrieval.max_k
        );
    }

    // Validate embedding
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "hashed" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, hashed, local, openai, or ollama.",
            other
        ),
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0");
    }

    // Validate ingest
    if config.ingest.max_file_bytes == 0 {
        bail!("ingest.max_file_bytes must be > 0");
    }
    if config.ingest.concurrency == 0 {
        bail!("ingest.concurrency must be >= 1");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[db]
path = "./data/wrag.sqlite"
"#;

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_config(MINIMAL).unwrap();
        validate(&config).unwrap();
        assert_eq!(config.chunking.max_size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.default_k, 8);
        assert_eq!(config.embedding.provider, "disabled");
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.embedding.max_retries, 3);
        assert_eq!(config.ingest.concurrency, 4);
        assert!(config
            .ingest
            .include_globs
            .contains(&"**/*.docx".to_string()));
    }

    #[test]
    fn overlap_must_be_smaller_than_max_size() {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[chunking]
max_size = 100
overlap = 100
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn token_unit_converts_to_characters() {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[chunking]
unit = "tokens"
max_size = 250
overlap = 25
"#,
        )
        .unwrap();
        let params = config.chunking.params().unwrap();
        assert_eq!(params.max_size(), 1000);
        assert_eq!(params.overlap(), 100);
    }

    #[test]
    fn remote_providers_require_model_and_dims() {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[embedding]
provider = "openai"
"#,
        )
        .unwrap();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("embedding.model"));
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[embedding]
provider = "cohere"
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn default_k_cannot_exceed_max_k() {
        let config = parse_config(
            r#"
[db]
path = "x.sqlite"

[retrieval]
default_k = 20
max_k = 10
"#,
        )
        .unwrap();
        assert!(validate(&config).is_err());
    }
}
