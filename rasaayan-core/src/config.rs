//! Configuration system for Rasaayan.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> CLI args.
//! Configuration is loaded from `~/.config/rasaayan/config.toml` and/or `.rasaayan/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LabConfig {
    pub llm: LlmConfig,
    pub pubchem: PubChemConfig,
    pub resolver: ResolverConfig,
    pub store: StoreConfig,
    pub simulation: SimulationConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider name: "gemini" or "mock".
    pub provider: String,
    /// Model used for full reaction simulation.
    pub model: String,
    /// Lighter model used for goal interpretation.
    pub goal_model: String,
    /// Environment variable name containing the API key.
    pub api_key_env: String,
    /// Explicit API key. Takes precedence over `api_key_env`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Optional base URL override for the API endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Authentication method: "api_key" (default) or "oauth" (bearer token).
    #[serde(default)]
    pub auth_method: String,
    /// Sampling temperature. Unset leaves the model default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Output token cap, thinking tokens included. Unset sends no cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<usize>,
    /// Thinking budget for the simulation model. `None` disables the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<u32>,
    /// HTTP timeout for a single completion request.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-3-pro-preview".to_string(),
            goal_model: "gemini-3-flash-preview".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            api_key: None,
            base_url: None,
            auth_method: String::new(),
            temperature: None,
            max_output_tokens: None,
            thinking_budget: Some(32_768),
            timeout_secs: 300,
        }
    }
}

impl LlmConfig {
    /// Validate this LLM config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid. Problems are reported as
    /// human-readable warnings, never as errors.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(t) = self.temperature
            && !(0.0..=2.0).contains(&t)
        {
            warnings.push(format!(
                "llm.temperature ({}) is outside the typical range 0.0–2.0",
                t
            ));
        }
        if let (Some(max), Some(budget)) = (self.max_output_tokens, self.thinking_budget)
            && max <= budget as usize
        {
            warnings.push(format!(
                "llm.max_output_tokens ({}) does not exceed llm.thinking_budget ({}); \
                 thinking can use the whole cap and leave no answer",
                max, budget
            ));
        }
        if !matches!(self.provider.as_str(), "gemini" | "mock") {
            warnings.push(format!(
                "llm.provider '{}' is not supported; expected 'gemini' or 'mock'",
                self.provider
            ));
        }
        if self.timeout_secs == 0 {
            warnings.push("llm.timeout_secs is 0; every request will fail".to_string());
        }
        warnings
    }
}

/// PubChem PUG REST client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubChemConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for PubChemConfig {
    fn default() -> Self {
        Self {
            base_url: "https://pubchem.ncbi.nlm.nih.gov/rest/pug".to_string(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            user_agent: format!("rasaayan/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Identifier resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Number of batch entries resolved at once. 1 resolves sequentially.
    pub max_concurrency: usize,
    /// Inputs longer than this many characters classify as SMILES.
    pub smiles_length_threshold: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 1,
            smiles_length_threshold: 20,
        }
    }
}

/// History and inventory persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Overrides the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    pub history_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            history_capacity: 20,
        }
    }
}

impl StoreConfig {
    /// Directory holding `history.json` and `synthesized.json`.
    pub fn resolve_data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.data_dir {
            return dir.clone();
        }
        directories::ProjectDirs::from("dev", "rasaayan", "rasaayan")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".rasaayan"))
    }
}

/// How to treat results that omit optional fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultPolicy {
    /// Missing optional fields are accepted; out-of-range scores are clamped.
    #[default]
    Lenient,
    /// `mlAccuracy` is required and scores must be in range.
    Strict,
}

impl std::fmt::Display for ResultPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResultPolicy::Lenient => write!(f, "lenient"),
            ResultPolicy::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub result_policy: ResultPolicy,
    /// Upper bound on a whole simulation or goal request, including the
    /// model's thinking time.
    pub request_timeout_secs: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            result_policy: ResultPolicy::Lenient,
            request_timeout_secs: 180,
        }
    }
}

impl LabConfig {
    /// Collect validation warnings from every section.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.llm.validate();
        if self.resolver.max_concurrency == 0 {
            warnings.push("resolver.max_concurrency is 0; treating it as 1".to_string());
        }
        if self.store.history_capacity == 0 {
            warnings.push("store.history_capacity is 0; no history will be kept".to_string());
        }
        if self.simulation.request_timeout_secs == 0 {
            warnings.push("simulation.request_timeout_secs is 0".to_string());
        }
        warnings
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RASAAYAN_`)
/// 3. Workspace-local config (`.rasaayan/config.toml`)
/// 4. User config (`~/.config/rasaayan/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&LabConfig>,
) -> Result<LabConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(LabConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "rasaayan", "rasaayan") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".rasaayan").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // RASAAYAN_LLM__MODEL, RASAAYAN_STORE__HISTORY_CAPACITY, etc.
    figment = figment.merge(Env::prefixed("RASAAYAN_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".rasaayan").join("config.toml")
}
