//! Capturing the user's instruction.
//!
//! An instruction either arrives complete (a command-line argument) or is typed at an
//! interactive prompt. Interactive capture accepts several lines and ends at the first
//! blank line that follows some content, so requests like
//!
//! ```text
//! > Write article A
//! > Write article B
//! >
//! ```
//!
//! become the two-line instruction `"Write article A\nWrite article B"`.

use crate::conversation::Instruction;
use std::error::Error;
use std::fmt;
use std::io::{BufRead, Write};
use std::path::PathBuf;

/// Failures while obtaining an instruction.
#[derive(Debug)]
pub enum InputError {
    /// Nothing but whitespace was supplied.
    EmptyInput,
    /// Reading the prompt or writing the banner failed.
    Io(std::io::Error),
}

impl fmt::Display for InputError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputError::EmptyInput => {
                write!(f, "Empty prompt. Please provide a writing request.")
            }
            InputError::Io(err) => write!(f, "Failed to read input: {}", err),
        }
    }
}

impl Error for InputError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InputError::EmptyInput => None,
            InputError::Io(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for InputError {
    fn from(err: std::io::Error) -> Self {
        InputError::Io(err)
    }
}

/// Text shown around interactive capture.
#[derive(Debug, Clone, PartialEq)]
pub struct InputConfig {
    /// Printed once before capture starts.
    pub banner: String,
    /// Printed before every line read.
    pub prompt: String,
    /// Where the session will save its files, announced under the banner.
    pub output_dir: Option<PathBuf>,
}

impl InputConfig {
    pub fn with_output_dir(mut self, output_dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(output_dir.into());
        self
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        let rule = "=".repeat(60);
        Self {
            banner: format!(
                "{rule}\nScribe Writing Agent\n{rule}\n\n\
                 Enter your writing request (or 'quit' to exit).\n\
                 Finish with an empty line.\n\
                 Example: Create a collection of 15 sci-fi short stories\n"
            ),
            prompt: "> ".to_string(),
            output_dir: None,
        }
    }
}

/// Produces the single [`Instruction`] a session starts from.
#[derive(Debug, Clone, Default)]
pub struct InputCollector {
    config: InputConfig,
}

impl InputCollector {
    pub fn new(config: InputConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &InputConfig {
        &self.config
    }

    /// Use `preset` verbatim when given; otherwise capture interactively from `reader`,
    /// writing the banner and prompts to `writer`.
    pub fn collect<R: BufRead, W: Write>(
        &self,
        preset: Option<&str>,
        reader: R,
        mut writer: W,
    ) -> Result<Instruction, InputError> {
        if let Some(text) = preset {
            let instruction = Instruction::from_text(text);
            if instruction.is_blank() {
                return Err(InputError::EmptyInput);
            }
            return Ok(instruction);
        }

        writeln!(writer, "{}", self.config.banner)?;
        if let Some(dir) = &self.config.output_dir {
            writeln!(writer, "Files will be saved under: {}\n", dir.display())?;
        }
        writer.flush()?;
        let lines = self.capture_lines(reader, &mut writer)?;
        if lines.is_empty() {
            return Err(InputError::EmptyInput);
        }
        Ok(Instruction::from_lines(lines))
    }

    /// Read lines until a blank line follows content, or the stream ends.
    ///
    /// Line terminators are stripped. Blank lines before the first content line are
    /// skipped; the returned lines never include the terminating blank line.
    pub fn capture_lines<R: BufRead, W: Write>(
        &self,
        mut reader: R,
        writer: &mut W,
    ) -> Result<Vec<String>, InputError> {
        let mut lines = Vec::new();
        let mut buffer = String::new();

        loop {
            write!(writer, "{}", self.config.prompt)?;
            writer.flush()?;

            buffer.clear();
            if reader.read_line(&mut buffer)? == 0 {
                break;
            }
            let line = buffer
                .strip_suffix('\n')
                .map(|l| l.strip_suffix('\r').unwrap_or(l))
                .unwrap_or(buffer.as_str());

            if line.trim().is_empty() {
                if lines.is_empty() {
                    continue;
                }
                break;
            }
            lines.push(line.to_string());
        }

        log::debug!("InputCollector::capture_lines(...): captured {} lines", lines.len());
        Ok(lines)
    }
}
