use serde::{Deserialize, Serialize};

/// Runtime configuration, loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    /// SQLite database file. Defaults to `~/.tallyscan/data/tallyscan.db`.
    #[serde(default)]
    pub database_path: Option<String>,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Another run's `processing` job is recovered once its claim is this old.
    #[serde(default = "default_orphan_after")]
    pub orphan_after_secs: u64,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub materializer: MaterializerConfig,
}

fn default_worker_count() -> usize {
    num_cpus::get()
}

fn default_queue_capacity() -> usize {
    64
}

fn default_orphan_after() -> u64 {
    crate::intake::DEFAULT_ORPHAN_AFTER_SECS
}

pub const MIN_IMAGE_BYTES: u64 = 100;
pub const MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Tesseract language. Only English is supported.
    #[serde(default = "default_language")]
    pub language: String,
    /// Directory holding `*.traineddata`; system default when unset.
    #[serde(default)]
    pub tessdata_dir: Option<String>,
    #[serde(default = "default_ocr_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_min_file_bytes")]
    pub min_file_bytes: u64,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
}

fn default_language() -> String {
    "eng".to_string()
}

fn default_ocr_timeout() -> u64 {
    60
}

fn default_min_file_bytes() -> u64 {
    MIN_IMAGE_BYTES
}

fn default_max_file_bytes() -> u64 {
    MAX_UPLOAD_BYTES
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            tessdata_dir: None,
            timeout_secs: default_ocr_timeout(),
            min_file_bytes: default_min_file_bytes(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PdfConfig {
    /// Resolution used when rendering pages for the OCR fallback.
    #[serde(default = "default_dpi")]
    pub render_dpi: u32,
    /// Direct text must be strictly longer than this to be accepted.
    #[serde(default = "default_min_direct_chars")]
    pub min_direct_text_chars: usize,
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm_path: String,
}

fn default_dpi() -> u32 {
    300
}

fn default_min_direct_chars() -> usize {
    50
}

fn default_pdftoppm() -> String {
    "pdftoppm".to_string()
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: default_dpi(),
            min_direct_text_chars: default_min_direct_chars(),
            pdftoppm_path: default_pdftoppm(),
        }
    }
}

/// Settings for the text-to-structured-data collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    /// OpenAI-compatible chat completions endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_ai_timeout")]
    pub timeout_secs: u64,
    /// Maximum number of document characters embedded in a prompt.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
    /// Retries after a rate-limited or unavailable response.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay, doubled on each retry.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_endpoint() -> String {
    "https://api.openai.com/v1/chat/completions".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "TALLYSCAN_AI_API_KEY".to_string()
}

fn default_ai_timeout() -> u64 {
    60
}

fn default_max_prompt_chars() -> usize {
    12_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    500
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_ai_timeout(),
            max_prompt_chars: default_max_prompt_chars(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializerConfig {
    /// Receipts are persisted only when confidence is strictly above this.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_confidence_threshold() -> f64 {
    0.7
}

impl Default for MaterializerConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            database_path: None,
            worker_count: default_worker_count(),
            queue_capacity: default_queue_capacity(),
            orphan_after_secs: default_orphan_after(),
            ocr: OcrConfig::default(),
            pdf: PdfConfig::default(),
            ai: AiConfig::default(),
            materializer: MaterializerConfig::default(),
        }
    }
}
