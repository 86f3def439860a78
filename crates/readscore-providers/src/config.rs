//! Service configuration and factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use readscore_core::orchestrator::AnalysisServices;
use readscore_core::traits::{
    AnalysisService, PersistenceService, StimulusProvider, TranscriptionService,
};

use crate::backend::{BackendClient, DEFAULT_BASE_URL};
use crate::heuristic::HeuristicAnalyzer;
use crate::whisper::WhisperTranscriber;

pub const CONFIG_FILE_NAME: &str = "readscore.toml";

/// Connection to the assessment backend.
///
/// Note: Custom Debug impl masks the token.
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_token: Option<String>,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_token: None,
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

/// Which service turns uploaded audio into text.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TranscriptionConfig {
    /// The backend's own transcription endpoint.
    #[default]
    Backend,
    Whisper {
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        base_url: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    /// No post-hoc transcription; transcripts are typed by hand.
    None,
}

impl std::fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionConfig::Backend => f.write_str("Backend"),
            TranscriptionConfig::Whisper {
                api_key,
                base_url,
                model,
            } => f
                .debug_struct("Whisper")
                .field("api_key", &api_key.as_ref().map(|_| "***"))
                .field("base_url", base_url)
                .field("model", model)
                .finish(),
            TranscriptionConfig::None => f.write_str("None"),
        }
    }
}

/// Which service scores transcripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AnalysisConfig {
    Backend,
    /// Local keyword heuristics; works offline.
    #[default]
    Heuristic,
}

/// Top-level readscore configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadscoreConfig {
    /// Request timeout for every HTTP service.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Academic year stamped on new sessions.
    #[serde(default = "default_academic_year")]
    pub academic_year: String,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub transcription: TranscriptionConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

fn default_timeout() -> u64 {
    120
}
fn default_academic_year() -> String {
    "2025-2026".to_string()
}

impl Default for ReadscoreConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            academic_year: default_academic_year(),
            backend: BackendConfig::default(),
            transcription: TranscriptionConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl ReadscoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str, env: &impl Fn(&str) -> Option<String>) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        if let Some(end) = result[start..].find('}') {
            let var_name = &result[start + 2..start + end];
            let value = env(var_name).unwrap_or_default();
            result = format!(
                "{}{}{}",
                &result[..start],
                value,
                &result[start + end + 1..]
            );
        } else {
            break;
        }
    }
    result
}

fn resolve_opt(s: &mut Option<String>, env: &impl Fn(&str) -> Option<String>) {
    if let Some(value) = s.as_mut() {
        *value = resolve_env_vars(value, env);
    }
    if s.as_deref().is_some_and(str::is_empty) {
        *s = None;
    }
}

/// Apply `READSCORE_API_TOKEN` / `READSCORE_OPENAI_KEY` overrides, then
/// resolve `${VAR}` references.
fn finalize(config: &mut ReadscoreConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(token) = env("READSCORE_API_TOKEN") {
        config.backend.api_token = Some(token);
    }
    if let Some(key) = env("READSCORE_OPENAI_KEY") {
        if let TranscriptionConfig::Whisper { api_key, .. } = &mut config.transcription {
            *api_key = Some(key);
        }
    }

    config.backend.base_url = resolve_env_vars(&config.backend.base_url, &env);
    resolve_opt(&mut config.backend.api_token, &env);
    if let TranscriptionConfig::Whisper {
        api_key, base_url, ..
    } = &mut config.transcription
    {
        resolve_opt(api_key, &env);
        resolve_opt(base_url, &env);
    }
}

/// Parse configuration from TOML text and apply environment overrides.
pub fn parse_config_str(content: &str) -> Result<ReadscoreConfig> {
    let mut config: ReadscoreConfig = toml::from_str(content)?;
    finalize(&mut config, |k| std::env::var(k).ok());
    Ok(config)
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `readscore.toml` in the current directory
/// 2. `~/.config/readscore/config.toml`
///
/// Environment variable overrides: `READSCORE_API_TOKEN`, `READSCORE_OPENAI_KEY`.
pub fn load_config() -> Result<ReadscoreConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<ReadscoreConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|dir| dir.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match &config_path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<ReadscoreConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => ReadscoreConfig::default(),
    };
    finalize(&mut config, |k| std::env::var(k).ok());
    debug!(path = ?config_path, ?config, "configuration loaded");

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("readscore"))
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// The collaborators a configuration describes.
#[derive(Clone)]
pub struct ServiceSet {
    pub persistence: Arc<dyn PersistenceService>,
    pub stimulus: Arc<dyn StimulusProvider>,
    pub transcription: Option<Arc<dyn TranscriptionService>>,
    pub analysis: Arc<dyn AnalysisService>,
}

impl ServiceSet {
    /// The subset the narrative analysis orchestrator needs.
    pub fn analysis_services(&self) -> AnalysisServices {
        AnalysisServices {
            persistence: self.persistence.clone(),
            transcription: self.transcription.clone(),
            analysis: self.analysis.clone(),
        }
    }
}

/// Create service instances from configuration.
pub fn create_services(config: &ReadscoreConfig) -> Result<ServiceSet> {
    let backend = Arc::new(
        BackendClient::with_timeout(
            Some(config.backend.base_url.clone()),
            config.backend.api_token.clone(),
            config.timeout(),
        )
        .context("failed to create backend client")?,
    );

    let transcription: Option<Arc<dyn TranscriptionService>> = match &config.transcription {
        TranscriptionConfig::Backend => Some(backend.clone()),
        TranscriptionConfig::Whisper {
            api_key,
            base_url,
            model,
        } => Some(Arc::new(
            WhisperTranscriber::with_timeout(
                api_key.clone(),
                base_url.clone(),
                model.clone(),
                config.timeout(),
            )
            .context("failed to create whisper client")?,
        )),
        TranscriptionConfig::None => None,
    };

    let analysis: Arc<dyn AnalysisService> = match config.analysis {
        AnalysisConfig::Backend => backend.clone(),
        AnalysisConfig::Heuristic => Arc::new(
            HeuristicAnalyzer::new().context("failed to build heuristic analyzer")?,
        ),
    };

    Ok(ServiceSet {
        persistence: backend.clone(),
        stimulus: backend,
        transcription,
        analysis,
    })
}
