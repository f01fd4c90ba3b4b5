//! Configuration for reqflow.
//!
//! Settings are layered: `.reqflow/reqflow.toml` → environment → CLI flags.
//! Secrets (the model API key and the tracker token) are only ever read from
//! the environment, never from the file.
//!
//! ```toml
//! [project]
//! scope = "checkout"
//! source = "meeting_transcript.vtt"
//!
//! [llm]
//! model = "gpt-4o"
//! temperature = 0.2
//!
//! [tracker]
//! base_url = "https://example.atlassian.net"
//! project = "SCRUM"
//! approved_only = true
//! ```
//!
//! The resolved [`Settings`] value is built once in `main` and handed to
//! every collaborator that needs it.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const CONFIG_DIR: &str = ".reqflow";
pub const CONFIG_FILE: &str = "reqflow.toml";

/// API key values that mean "no backend configured".
const OFFLINE_KEYS: [&str; 3] = ["", "dummy", "test"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSection {
    /// Scope id used for the scope memory tier.
    #[serde(default = "default_scope")]
    pub scope: String,
    /// Source document, relative to the project directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    #[serde(default = "default_output_json")]
    pub output_json: PathBuf,
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

fn default_scope() -> String {
    "default".to_string()
}

fn default_output_json() -> PathBuf {
    PathBuf::from("output.json")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("repo.db")
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            source: None,
            output_json: default_output_json(),
            db_path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
    /// Attempts per generation call, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_classifier_model")]
    pub classifier_model: String,
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_timeout() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    2
}

fn default_classifier_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            base_url: default_base_url(),
            timeout_secs: default_llm_timeout(),
            max_attempts: default_max_attempts(),
            classifier_model: default_classifier_model(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterSection {
    #[serde(default = "default_true")]
    pub smalltalk: bool,
    /// Confirm flagged lines with the classifier model before dropping them.
    #[serde(default)]
    pub llm_classifier: bool,
}

fn default_true() -> bool {
    true
}

impl Default for FilterSection {
    fn default() -> Self {
        Self {
            smalltalk: true,
            llm_classifier: false,
        }
    }
}

/// Bounds for session memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_summary_char_limit")]
    pub summary_char_limit: usize,
    #[serde(default = "default_action_log_limit")]
    pub action_log_limit: usize,
    #[serde(default = "default_bullet_char_limit")]
    pub bullet_char_limit: usize,
}

fn default_summary_char_limit() -> usize {
    crate::session::summary::DEFAULT_SUMMARY_CHAR_LIMIT
}

fn default_action_log_limit() -> usize {
    crate::session::ring::DEFAULT_ACTION_LOG_LIMIT
}

fn default_bullet_char_limit() -> usize {
    crate::session::summary::DEFAULT_BULLET_CHAR_LIMIT
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            summary_char_limit: default_summary_char_limit(),
            action_log_limit: default_action_log_limit(),
            bullet_char_limit: default_bullet_char_limit(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default = "default_tracker_project")]
    pub project: String,
    #[serde(default = "default_true")]
    pub approved_only: bool,
    /// Skip label search during upsert (for trackers without search access).
    #[serde(default)]
    pub skip_search: bool,
    #[serde(default = "default_tracker_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_link_type")]
    pub link_type: String,
    #[serde(default = "default_requirement_issue_type")]
    pub requirement_issue_type: String,
    #[serde(default = "default_test_issue_type")]
    pub test_issue_type: String,
    /// Reconcile automatically at the end of `reqflow run`.
    #[serde(default)]
    pub sync_on_pipeline: bool,
}

fn default_tracker_project() -> String {
    "SCRUM".to_string()
}

fn default_tracker_timeout() -> u64 {
    30
}

fn default_link_type() -> String {
    "Relates".to_string()
}

fn default_requirement_issue_type() -> String {
    "Story".to_string()
}

fn default_test_issue_type() -> String {
    "Task".to_string()
}

impl Default for TrackerSection {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: String::new(),
            user: String::new(),
            project: default_tracker_project(),
            approved_only: true,
            skip_search: false,
            timeout_secs: default_tracker_timeout(),
            link_type: default_link_type(),
            requirement_issue_type: default_requirement_issue_type(),
            test_issue_type: default_test_issue_type(),
            sync_on_pipeline: false,
        }
    }
}

/// The complete reqflow.toml structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReqflowToml {
    #[serde(default)]
    pub project: ProjectSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub tracker: TrackerSection,
}

impl ReqflowToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse reqflow.toml")
    }

    /// Load `.reqflow/reqflow.toml` if present, defaults otherwise.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let path = config_dir.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize reqflow.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Configuration problems worth surfacing as warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            warnings.push(format!(
                "llm.temperature {} is outside 0.0..=2.0",
                self.llm.temperature
            ));
        }
        if self.llm.max_attempts == 0 {
            warnings.push("llm.max_attempts is 0; generation will always use fixtures".into());
        }
        if self.memory.summary_char_limit == 0 {
            warnings.push("memory.summary_char_limit is 0; summaries will be empty".into());
        }
        if self.tracker.enabled && self.tracker.base_url.is_empty() {
            warnings.push("tracker.base_url is not set (or set JIRA_URL)".into());
        }
        warnings
    }

    /// Overlay environment variables using `lookup`.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(model) = lookup("OPENAI_MODEL").filter(|v| !v.is_empty()) {
            self.llm.model = model;
        }
        if let Some(t) = lookup("OPENAI_TEMPERATURE").and_then(|v| v.trim().parse().ok()) {
            self.llm.temperature = t;
        }
        if let Some(url) = lookup("OPENAI_BASE_URL").filter(|v| !v.is_empty()) {
            self.llm.base_url = url;
        }
        if let Some(source) = lookup("TRANSCRIPT_FILE").filter(|v| !v.is_empty()) {
            self.project.source = Some(PathBuf::from(source));
        }
        if let Some(db) = lookup("REPO_DB_PATH").filter(|v| !v.is_empty()) {
            self.project.db_path = PathBuf::from(db);
        }
        if let Some(flag) = lookup("SMALLTALK_FILTER").and_then(|v| parse_flag(&v)) {
            self.filter.smalltalk = flag;
        }
        if let Some(flag) = lookup("SMALLTALK_LLM_CLASSIFIER").and_then(|v| parse_flag(&v)) {
            self.filter.llm_classifier = flag;
        }
        if let Some(limit) = lookup("SESSION_SUMMARY_LIMIT").and_then(|v| v.trim().parse().ok()) {
            self.memory.summary_char_limit = limit;
        }
        if let Some(url) = lookup("JIRA_URL").filter(|v| !v.is_empty()) {
            self.tracker.base_url = url;
        }
        if let Some(user) = lookup("JIRA_USER")
            .filter(|v| !v.is_empty())
            .or_else(|| lookup("JIRA_EMAIL").filter(|v| !v.is_empty()))
        {
            self.tracker.user = user;
        }
        if let Some(project) = lookup("JIRA_PROJECT").filter(|v| !v.is_empty()) {
            self.tracker.project = project;
        }
        if let Some(flag) = lookup("JIRA_INTEGRATION").and_then(|v| parse_flag(&v)) {
            self.tracker.enabled = flag;
        }
        if let Some(flag) = lookup("JIRA_APPROVED_ONLY").and_then(|v| parse_flag(&v)) {
            self.tracker.approved_only = flag;
        }
        if let Some(flag) = lookup("JIRA_SKIP_SEARCH").and_then(|v| parse_flag(&v)) {
            self.tracker.skip_search = flag;
        }
    }
}

/// `1/true/yes/on` and `0/false/no/off`, case-insensitive.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Fully resolved settings for one process.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub config_dir: PathBuf,
    pub toml: ReqflowToml,
    /// Model API key; `None` or a placeholder value means offline.
    pub api_key: Option<String>,
    pub tracker_token: Option<String>,
    pub verbose: bool,
}

impl Settings {
    /// File → process environment.
    pub fn new(project_dir: PathBuf) -> Result<Self> {
        Self::with_env(project_dir, |key| std::env::var(key).ok())
    }

    /// File → environment as seen through `lookup`.
    pub fn with_env(project_dir: PathBuf, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .with_context(|| format!("Failed to resolve project directory: {}", project_dir.display()))?;
        let config_dir = project_dir.join(CONFIG_DIR);
        let mut toml = ReqflowToml::load_or_default(&config_dir)?;
        toml.apply_env_with(&lookup);

        let api_key = lookup("OPENAI_API_KEY").map(|k| k.trim().to_string());
        let tracker_token = lookup("JIRA_API_TOKEN")
            .filter(|v| !v.is_empty())
            .or_else(|| lookup("JIRA_TOKEN").filter(|v| !v.is_empty()));

        Ok(Self {
            project_dir,
            config_dir,
            toml,
            api_key,
            tracker_token,
            verbose: false,
        })
    }

    /// True when no usable model API key is configured.
    pub fn is_offline(&self) -> bool {
        match &self.api_key {
            None => true,
            Some(key) => OFFLINE_KEYS.contains(&key.to_lowercase().as_str()),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        }
    }

    pub fn scope(&self) -> &str {
        &self.toml.project.scope
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join(CONFIG_FILE)
    }

    /// Configured source document, if any.
    pub fn source_path(&self) -> Option<PathBuf> {
        self.toml.project.source.as_deref().map(|p| self.resolve(p))
    }

    pub fn output_json_path(&self) -> PathBuf {
        self.resolve(&self.toml.project.output_json)
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.toml.project.db_path)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.config_dir.join("logs")
    }

    pub fn llm(&self) -> &LlmSection {
        &self.toml.llm
    }

    pub fn filter(&self) -> &FilterSection {
        &self.toml.filter
    }

    pub fn memory(&self) -> &MemoryConfig {
        &self.toml.memory
    }

    pub fn tracker(&self) -> &TrackerSection {
        &self.toml.tracker
    }

    pub fn validate(&self) -> Vec<String> {
        self.toml.validate()
    }
}
