use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

use crate::cache::DEFAULT_CAPACITY;
use crate::corpus::DEFAULT_SOURCE;

pub struct Config {
    /// Directory holding the snapshot and the extracted page text.
    pub data_dir: PathBuf,
    pub snapshot_file: String,
    /// Source documents ingested when the snapshot is rebuilt.
    pub sources: Vec<String>,
    pub top_n: usize,
    pub similarity_threshold: f64,
    pub cache_capacity: usize,
    /// Pages with fewer trimmed characters are not ingested.
    pub min_page_chars: usize,

    pub max_tokens_total: usize,
    pub max_tokens_output: usize,
    pub system_message_tokens: usize,
    pub prompt_template_tokens: usize,
    pub max_context_entries: usize,

    pub api_base: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub embedding_max_tokens: usize,
    pub analysis_model: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("passage-retrieval");

        Self {
            data_dir,
            snapshot_file: "document_embeddings.json".to_string(),
            sources: vec![DEFAULT_SOURCE.to_string()],
            top_n: 3,
            similarity_threshold: 0.5,
            cache_capacity: DEFAULT_CAPACITY,
            min_page_chars: 50,
            max_tokens_total: 4000,
            max_tokens_output: 600,
            system_message_tokens: 100,
            prompt_template_tokens: 200,
            max_context_entries: 10,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            embedding_model: "text-embedding-ada-002".to_string(),
            embedding_max_tokens: 8000,
            analysis_model: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    /// Defaults overridden by `RAG_*` and `OPENAI_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();

        if let Some(dir) = lookup("RAG_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("RAG_SNAPSHOT") {
            config.snapshot_file = file;
        }
        if let Some(sources) = lookup("RAG_SOURCES") {
            config.sources = sources
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(value) = lookup("RAG_TOP_N") {
            config.top_n = parse_var("RAG_TOP_N", &value)?;
        }
        if let Some(value) = lookup("RAG_THRESHOLD") {
            config.similarity_threshold = parse_var("RAG_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("RAG_CACHE_CAPACITY") {
            config.cache_capacity = parse_var("RAG_CACHE_CAPACITY", &value)?;
        }
        if let Some(base) = lookup("OPENAI_API_BASE") {
            config.api_base = base;
        }
        config.api_key = lookup("OPENAI_API_KEY").filter(|key| !key.trim().is_empty());

        Ok(config)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(&self.snapshot_file)
    }

    /// Tokens left for retrieved context once output, system message and
    /// prompt template are reserved.
    pub fn context_tokens(&self) -> usize {
        self.max_tokens_total
            .saturating_sub(self.max_tokens_output)
            .saturating_sub(self.system_message_tokens)
            .saturating_sub(self.prompt_template_tokens)
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid value for {key}: {value:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_match_budget() {
        let config = Config::default();
        assert_eq!(config.top_n, 3);
        assert_eq!(config.similarity_threshold, 0.5);
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.context_tokens(), 3100);
        assert!(config.snapshot_path().ends_with("document_embeddings.json"));
    }

    #[test]
    fn env_overrides_apply() -> Result<()> {
        let config = Config::from_lookup(lookup(&[
            ("RAG_DATA_DIR", "/tmp/corpus"),
            ("RAG_SOURCES", "a.pdf, b.pdf,,"),
            ("RAG_TOP_N", "7"),
            ("RAG_THRESHOLD", "0.25"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))?;

        assert_eq!(config.data_dir, PathBuf::from("/tmp/corpus"));
        assert_eq!(config.sources, vec!["a.pdf", "b.pdf"]);
        assert_eq!(config.top_n, 7);
        assert_eq!(config.similarity_threshold, 0.25);
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        Ok(())
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[("RAG_TOP_N", "three")])).err();
        assert!(err.is_some_and(|e| e.to_string().contains("RAG_TOP_N")));
    }

    #[test]
    fn blank_api_key_is_ignored() -> Result<()> {
        let config = Config::from_lookup(lookup(&[("OPENAI_API_KEY", "  ")]))?;
        assert!(config.api_key.is_none());
        Ok(())
    }
}
