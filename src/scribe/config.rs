//! Runtime configuration for a writing session.
//!
//! [`ScribeConfig`] collects everything the binary needs to assemble a session: where
//! artifacts go, which model to talk to and how, the iteration budget, the system
//! prompt and the interactive prompt text. Values start from [`Default`] and are
//! overridden with the `with_*` builders.

use crate::clients::moonshot::MOONSHOT_BASE_URL;
use crate::input::InputConfig;
use std::path::PathBuf;

pub const DEFAULT_OUTPUT_DIR: &str = "output";
pub const DEFAULT_MODEL: &str = "kimi-k2-thinking";
pub const DEFAULT_TEMPERATURE: f32 = 1.0;
pub const DEFAULT_MAX_TOKENS: u32 = 65_536;
/// Budget applied by the command-line binary. The library itself imposes none.
pub const DEFAULT_MAX_ITERATIONS: usize = 300;

/// Instructions given to the model ahead of every session.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Scribe, an autonomous writing agent. You turn a single request into finished \
long-form writing: novels, books, short story collections, articles.

Work in this order:
1. Call create_project once with a short, descriptive project name. Every file you \
write goes into that project.
2. Plan the work: decide how many pieces are needed and what each one covers.
3. Write each chapter, story or article to its own file with write_file, using \
mode 'create'. Use 'append' to continue a long piece across several calls and \
'overwrite' only to replace a draft on purpose.
4. Use list_files to check what already exists before resuming or revising.

Write complete, polished text rather than outlines or placeholders. When a tool \
reports an error, read it, correct the call and continue. When every piece has been \
written, reply with a short summary of what you produced and where it was saved, \
without calling any more tools.";

/// Settings for one run of the writing agent.
#[derive(Debug, Clone)]
pub struct ScribeConfig {
    /// Directory the writer tools create projects in.
    pub output_dir: PathBuf,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on model calls; `None` means unbounded.
    pub max_iterations: Option<usize>,
    pub system_prompt: String,
    pub input: InputConfig,
}

impl Default for ScribeConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            model: DEFAULT_MODEL.to_string(),
            base_url: MOONSHOT_BASE_URL.to_string(),
            api_key: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            max_iterations: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            input: InputConfig::default().with_output_dir(DEFAULT_OUTPUT_DIR),
        }
    }
}

impl ScribeConfig {
    /// Also updates the directory announced by the interactive prompt.
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = output_dir.into();
        self.input.output_dir = Some(self.output_dir.clone());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: Option<usize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Replace the prompt text. The announced directory follows `output_dir`.
    pub fn with_input(mut self, input: InputConfig) -> Self {
        self.input = InputConfig {
            output_dir: Some(self.output_dir.clone()),
            ..input
        };
        self
    }

    /// The API key for display: first and last four characters only.
    ///
    /// Keys of eight characters or fewer are fully hidden.
    pub fn masked_api_key(&self) -> Option<String> {
        self.api_key.as_deref().map(mask_secret)
    }
}

/// Mask a secret as `abcd...wxyz`.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ScribeConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.model, "kimi-k2-thinking");
        assert_eq!(config.base_url, "https://api.moonshot.ai/v1");
        assert_eq!(config.max_tokens, 65_536);
        assert!(config.max_iterations.is_none());
        assert!(config.system_prompt.contains("create_project"));
        assert_eq!(config.input.output_dir, Some(PathBuf::from("output")));
    }

    #[test]
    fn test_builders_and_masking() {
        let config = ScribeConfig::default()
            .with_output_dir("books")
            .with_api_key("sk-1234567890abcd")
            .with_max_iterations(Some(5));
        assert_eq!(config.output_dir, PathBuf::from("books"));
        assert_eq!(config.input.output_dir, Some(PathBuf::from("books")));
        assert_eq!(config.max_iterations, Some(5));
        assert_eq!(config.masked_api_key().as_deref(), Some("sk-1...abcd"));
        assert_eq!(mask_secret("short"), "*****");
    }
}
