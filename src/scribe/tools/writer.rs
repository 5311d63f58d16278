//! The writing tools the model drives during a session.
//!
//! [`WriterProtocol`] exposes three tools over a sandboxed [`FileSystemTool`] rooted at
//! the configured output directory:
//!
//! - `create_project(project_name)` creates a project folder and makes it active
//! - `write_file(filename, content, mode)` writes one artifact into the active project
//! - `list_files()` lists what the active project already contains
//!
//! Files are always written inside the active project, so a session cannot write
//! anywhere before it has created one.

use crate::tool_protocol::{ToolMetadata, ToolParameter, ToolParameterType, ToolProtocol};
use crate::tools::filesystem::FileSystemTool;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Extensions `write_file` accepts. Artifacts are plain text.
pub const ALLOWED_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// How `write_file` treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Fail if the file already exists.
    Create,
    /// Add to the end of the file, creating it if needed.
    Append,
    /// Replace the file's content.
    Overwrite,
}

impl WriteMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create" => Some(WriteMode::Create),
            "append" => Some(WriteMode::Append),
            "overwrite" => Some(WriteMode::Overwrite),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Create => "create",
            WriteMode::Append => "append",
            WriteMode::Overwrite => "overwrite",
        }
    }
}

/// Failures specific to the writing workflow.
#[derive(Debug, Clone, PartialEq)]
pub enum WriterError {
    /// `write_file` or `list_files` was called before `create_project`.
    NoActiveProject,
    /// The project name has no usable characters after sanitizing.
    InvalidProjectName(String),
    UnknownTool(String),
}

impl fmt::Display for WriterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriterError::NoActiveProject => {
                write!(f, "No active project. Call create_project first")
            }
            WriterError::InvalidProjectName(name) => {
                write!(f, "Invalid project name: '{}'", name)
            }
            WriterError::UnknownTool(name) => write!(f, "Unknown writer tool: {}", name),
        }
    }
}

impl Error for WriterError {}

/// Reduce a free-form project name to a safe folder name.
///
/// Keeps Unicode letters and digits, `-` and `_`; whitespace becomes `_`; path
/// separators and other punctuation are dropped. Leading and trailing separators are
/// trimmed.
pub fn sanitize_project_name(name: &str) -> String {
    let mapped: String = name
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();

    let mut collapsed = String::with_capacity(mapped.len());
    for c in mapped.chars() {
        if c == '_' && collapsed.ends_with('_') {
            continue;
        }
        collapsed.push(c);
    }
    collapsed.trim_matches(|c| c == '_' || c == '-').to_string()
}

/// Tool protocol implementing the project based writing workflow.
pub struct WriterProtocol {
    fs: FileSystemTool,
    output_dir: PathBuf,
    active_project: RwLock<Option<String>>,
}

impl WriterProtocol {
    /// Writer rooted at `output_dir`. The directory is created on first use.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        let output_dir = output_dir.into();
        Self {
            fs: FileSystemTool::new().with_root_path(output_dir.clone()),
            output_dir,
            active_project: RwLock::new(None),
        }
    }

    /// Name of the folder files are currently written into.
    pub async fn active_project(&self) -> Option<String> {
        self.active_project.read().await.clone()
    }

    async fn require_project(&self) -> Result<String, WriterError> {
        self.active_project
            .read()
            .await
            .clone()
            .ok_or(WriterError::NoActiveProject)
    }

    /// Sandbox rooted at the project folder so filenames cannot climb out of it.
    fn project_fs(&self, project: &str) -> FileSystemTool {
        FileSystemTool::new()
            .with_root_path(self.output_dir.join(project))
            .with_allowed_extensions(ALLOWED_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    async fn create_project(&self, args: &Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let requested = args["project_name"].as_str().unwrap_or_default();
        let name = sanitize_project_name(requested);
        if name.is_empty() {
            return Err(Box::new(WriterError::InvalidProjectName(requested.to_string())));
        }

        let path = self.fs.create_directory(&name).await?;
        *self.active_project.write().await = Some(name.clone());
        log::info!("WriterProtocol: active project is now '{}'", name);

        Ok(json!({
            "project": name,
            "path": path.display().to_string(),
        }))
    }

    async fn write_file(&self, args: &Value) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let project = self.require_project().await?;
        let filename = args["filename"].as_str().unwrap_or_default();
        let content = args["content"].as_str().unwrap_or_default();
        let mode = args["mode"]
            .as_str()
            .and_then(WriteMode::parse)
            .unwrap_or(WriteMode::Create);

        let project_fs = self.project_fs(&project);
        let path = match mode {
            WriteMode::Create => project_fs.create_file(filename, content).await?,
            WriteMode::Append => project_fs.append_file(filename, content).await?,
            WriteMode::Overwrite => project_fs.write_file(filename, content).await?,
        };

        Ok(json!({
            "path": path.display().to_string(),
            "mode": mode.as_str(),
            "bytes_written": content.len(),
            "word_count": content.split_whitespace().count(),
        }))
    }

    async fn list_files(&self) -> Result<Value, Box<dyn Error + Send + Sync>> {
        let project = self.require_project().await?;
        let entries = self.project_fs(&project).walk_files("").await?;
        let files: Vec<Value> = entries
            .into_iter()
            .map(|entry| json!({"name": entry.name, "bytes": entry.size}))
            .collect();

        Ok(json!({
            "project": project,
            "files": files,
        }))
    }
}

#[async_trait]
impl ToolProtocol for WriterProtocol {
    async fn execute(
        &self,
        tool_name: &str,
        parameters: Value,
    ) -> Result<Value, Box<dyn Error + Send + Sync>> {
        match tool_name {
            "create_project" => self.create_project(&parameters).await,
            "write_file" => self.write_file(&parameters).await,
            "list_files" => self.list_files().await,
            other => Err(Box::new(WriterError::UnknownTool(other.to_string()))),
        }
    }

    async fn list_tools(&self) -> Result<Vec<ToolMetadata>, Box<dyn Error + Send + Sync>> {
        Ok(vec![
            ToolMetadata::new(
                "create_project",
                "Create a project folder for the current piece of work and make it the \
                 active project. Call this before writing any file.",
            )
            .with_parameter(
                ToolParameter::new("project_name", ToolParameterType::String)
                    .with_description("Name of the project, e.g. 'The Lighthouse Keeper'")
                    .required(),
            ),
            ToolMetadata::new(
                "write_file",
                "Write text to a file inside the active project. Use one file per \
                 chapter, story or article.",
            )
            .with_parameter(
                ToolParameter::new("filename", ToolParameterType::String)
                    .with_description(
                        "File name relative to the project, e.g. 'chapter_01.md' or \
                         'part_1/chapter_01.md'. Must end in .md, .markdown or .txt",
                    )
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("content", ToolParameterType::String)
                    .with_description("Text to write")
                    .required(),
            )
            .with_parameter(
                ToolParameter::new("mode", ToolParameterType::String)
                    .with_description(
                        "'create' fails if the file exists, 'append' adds to the end, \
                         'overwrite' replaces it",
                    )
                    .with_allowed_values(vec![json!("create"), json!("append"), json!("overwrite")])
                    .with_default(json!("create")),
            ),
            ToolMetadata::new(
                "list_files",
                "List every file in the active project, including those in subfolders, \
                 with paths relative to the project.",
            ),
        ])
    }

    fn protocol_name(&self) -> &str {
        "writer"
    }
}
