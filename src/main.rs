//! `scribe` command-line entry point.
//!
//! ```text
//! scribe "Create a collection of 15 sci-fi short stories"
//! scribe                       # interactive, finish the request with an empty line
//! ```
//!
//! Exit status: 0 on success or quit, 1 for an empty request or a setup problem, 2 when
//! the model backend fails, 3 when the iteration budget runs out.

use async_trait::async_trait;
use clap::Parser;
use scribe::clients::moonshot::MoonshotClient;
use scribe::config::{ScribeConfig, DEFAULT_MAX_ITERATIONS};
use scribe::event::{EventHandler, SessionEvent};
use scribe::input::InputCollector;
use scribe::tool_protocol::ToolRegistry;
use scribe::tools::WriterProtocol;
use scribe::{SessionError, SessionOrchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "scribe", version)]
#[command(about = "Scribe - an autonomous agent for novels, books and short story collections")]
struct Args {
    /// Your writing request, e.g. "Create a mystery novel". Prompted for when omitted.
    prompt: Option<String>,

    /// Moonshot API key
    #[arg(long, env = "MOONSHOT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// OpenAI-compatible base URL
    #[arg(long, env = "MOONSHOT_BASE_URL", default_value = scribe::clients::moonshot::MOONSHOT_BASE_URL)]
    base_url: String,

    #[arg(long, default_value = scribe::config::DEFAULT_MODEL)]
    model: String,

    /// Directory projects are written to
    #[arg(long, default_value = scribe::config::DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Maximum number of model calls; 0 removes the limit
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    #[arg(long, default_value_t = scribe::config::DEFAULT_TEMPERATURE)]
    temperature: f32,

    /// Maximum completion tokens per model call
    #[arg(long, default_value_t = scribe::config::DEFAULT_MAX_TOKENS)]
    max_tokens: u32,
}

impl Args {
    fn into_config(self) -> (ScribeConfig, Option<String>) {
        let mut config = ScribeConfig::default()
            .with_base_url(self.base_url)
            .with_model(self.model)
            .with_output_dir(self.output_dir)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_max_iterations(if self.max_iterations == 0 {
                None
            } else {
                Some(self.max_iterations)
            });
        if let Some(key) = self.api_key {
            config = config.with_api_key(key);
        }
        (config, self.prompt)
    }
}

/// Prints session progress to stdout.
struct ConsoleReporter {
    start: Instant,
    max_iterations: Option<usize>,
}

impl ConsoleReporter {
    fn new(max_iterations: Option<usize>) -> Self {
        Self {
            start: Instant::now(),
            max_iterations,
        }
    }

    fn stamp(&self) -> String {
        let elapsed = self.start.elapsed().as_secs();
        format!(
            "{} +{:02}:{:02}",
            chrono::Local::now().format("%H:%M:%S"),
            elapsed / 60,
            elapsed % 60
        )
    }
}

#[async_trait]
impl EventHandler for ConsoleReporter {
    async fn on_session_event(&self, event: &SessionEvent) {
        match event {
            SessionEvent::SessionStarted {
                model, tool_count, ..
            } => {
                let rule = "=".repeat(60);
                println!("{}\nStarting Scribe\n{}", rule, rule);
                println!("Model: {}", model);
                println!("Tools: {}", tool_count);
                match self.max_iterations {
                    Some(max) => println!("Max iterations: {}", max),
                    None => println!("Max iterations: unlimited"),
                }
                println!("{}\n", rule);
            }
            SessionEvent::ModelCallStarted { iteration, .. } => {
                let rule = "-".repeat(60);
                match self.max_iterations {
                    Some(max) => println!("\n{}\nIteration {}/{}\n{}", rule, iteration, max, rule),
                    None => println!("\n{}\nIteration {}\n{}", rule, iteration, rule),
                }
                println!("[{}] Calling the model...", self.stamp());
            }
            SessionEvent::ModelCallCompleted {
                tool_calls,
                tokens_used,
                reasoning_length,
                ..
            } => {
                if *reasoning_length > 0 {
                    println!("[{}] Reasoning: {} chars", self.stamp(), reasoning_length);
                }
                if let Some(usage) = tokens_used {
                    println!(
                        "[{}] Tokens: {} in / {} out",
                        self.stamp(),
                        usage.input_tokens,
                        usage.output_tokens
                    );
                }
                if *tool_calls > 0 {
                    println!("[{}] Model requested {} tool call(s)", self.stamp(), tool_calls);
                }
            }
            SessionEvent::ToolCallStarted { tool_name, .. } => {
                println!("[{}] Running {}", self.stamp(), tool_name);
            }
            SessionEvent::ToolCallCompleted {
                tool_name, error, ..
            } => match error {
                None => println!("[{}]   {} ok", self.stamp(), tool_name),
                Some(message) => {
                    println!("[{}]   {} failed: {}", self.stamp(), tool_name, message)
                }
            },
            SessionEvent::SessionCompleted {
                iterations,
                tool_calls_made,
                tokens_used,
                ..
            } => {
                let rule = "=".repeat(60);
                println!("\n{}\nTask completed", rule);
                println!("Model calls: {}", iterations);
                println!("Tool calls: {}", tool_calls_made);
                if let Some(usage) = tokens_used {
                    println!("Total tokens: {}", usage.total_tokens);
                }
                println!("{}", rule);
            }
            SessionEvent::SessionFailed { error, .. } => {
                eprintln!("[{}] Session failed: {}", self.stamp(), error);
            }
            SessionEvent::StateChanged { .. } => {}
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    scribe::init_logger();

    let (config, prompt) = args.into_config();

    let api_key = match &config.api_key {
        Some(key) if !key.trim().is_empty() => key.clone(),
        _ => {
            eprintln!("Error: MOONSHOT_API_KEY environment variable not set.");
            eprintln!("Please set your API key: export MOONSHOT_API_KEY='your-key-here'");
            return ExitCode::from(1);
        }
    };
    if let Some(masked) = config.masked_api_key() {
        println!("API key loaded: {}", masked);
    }
    println!("Base URL: {}\n", config.base_url);

    let collector = InputCollector::new(config.input.clone());
    let preset = prompt.clone();
    let collected = tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        collector.collect(preset.as_deref(), stdin.lock(), stdout.lock())
    })
    .await;
    let instruction = match collected {
        Ok(Ok(instruction)) => instruction,
        Ok(Err(err)) => {
            eprintln!("Error: {}", err);
            return ExitCode::from(1);
        }
        Err(err) => {
            eprintln!("Error: input task failed: {}", err);
            return ExitCode::from(1);
        }
    };

    if prompt.is_none() && instruction.is_quit_request() {
        println!("Goodbye!");
        return ExitCode::SUCCESS;
    }
    println!("\nTask: {}\n", instruction);

    let client = Arc::new(
        MoonshotClient::new_with_base_url(&api_key, &config.model, &config.base_url)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens),
    );

    let mut registry = ToolRegistry::empty();
    if let Err(err) = registry
        .add_protocol(Arc::new(WriterProtocol::new(config.output_dir.clone())))
        .await
    {
        eprintln!("Error: failed to register writer tools: {}", err);
        return ExitCode::from(1);
    }

    let mut orchestrator = SessionOrchestrator::new(client, Arc::new(registry))
        .with_system_prompt(config.system_prompt.clone())
        .with_max_iterations(config.max_iterations)
        .with_event_handler(Arc::new(ConsoleReporter::new(config.max_iterations)));

    match orchestrator.run(instruction).await {
        Ok(report) => {
            println!("\n{}", report.final_answer);
            println!("\nFiles are in {}", config.output_dir.display());
            ExitCode::SUCCESS
        }
        Err(SessionError::Gateway(err)) => {
            eprintln!("Error: {}", err);
            ExitCode::from(2)
        }
        Err(err @ SessionError::BudgetExhausted { .. }) => {
            eprintln!("Warning: {}", err);
            eprintln!("The task may not be complete. Check {} for progress.", config.output_dir.display());
            ExitCode::from(3)
        }
    }
}
