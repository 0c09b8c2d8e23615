//! Stock tool handlers served by `toolpilot serve`
//!
//! Thin adapters over the shell and the filesystem, rooted at a working
//! directory. They are trusted as-is; the gateway bounds their run time.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tokio::process::Command;

use super::definition::ToolDescriptor;
use super::handler::{HandlerError, ToolHandler, str_arg, usize_arg};
use super::schema::{ParamKind, ParamSpec};

const DEFAULT_MAX_OUTPUT_BYTES: usize = 100_000;
const DEFAULT_READ_LIMIT: usize = 2000;

fn truncate_output(mut output: String, max_bytes: usize) -> String {
    if output.len() > max_bytes {
        let mut cut = max_bytes;
        while !output.is_char_boundary(cut) {
            cut -= 1;
        }
        output.truncate(cut);
        output.push_str("\n... [output truncated]");
    }
    output
}

/// Runs `bash -c <command>` in the working directory
pub struct RunCommand {
    workdir: PathBuf,
    max_output_bytes: usize,
}

impl RunCommand {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(mut self, max_bytes: usize) -> Self {
        self.max_output_bytes = max_bytes;
        self
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("run_command", "Execute a shell command in the working directory")
            .param(ParamSpec::required("command", ParamKind::String).with_description("Command line passed to bash -c"))
    }
}

#[async_trait]
impl ToolHandler for RunCommand {
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value, HandlerError> {
        let command = str_arg(&arguments, "command")?;

        // kill_on_drop: a gateway timeout drops this future and must not leave the child running
        let output = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| HandlerError::new(format!("Failed to spawn bash: {}", e)))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push_str("\n--- stderr ---\n");
            }
            text.push_str(&stderr);
        }
        let text = truncate_output(text, self.max_output_bytes);

        if output.status.success() {
            Ok(json!({ "exit_code": 0, "output": text }))
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(HandlerError::new(format!("command exited with status {}: {}", code, text)))
        }
    }
}

/// Reads a text file with line numbers
pub struct ReadFile {
    workdir: PathBuf,
    max_output_bytes: usize,
}

impl ReadFile {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("read_file", "Read a text file, numbering its lines")
            .param(ParamSpec::required("path", ParamKind::String).with_description("Path relative to the working directory"))
            .param(ParamSpec::optional("offset", ParamKind::Integer).with_description("Lines to skip"))
            .param(ParamSpec::optional("limit", ParamKind::Integer).with_description("Maximum lines to return"))
    }
}

#[async_trait]
impl ToolHandler for ReadFile {
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value, HandlerError> {
        let path = self.workdir.join(str_arg(&arguments, "path")?);
        let offset = usize_arg(&arguments, "offset").unwrap_or(0);
        let limit = usize_arg(&arguments, "limit").unwrap_or(DEFAULT_READ_LIMIT);

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| HandlerError::new(format!("Failed to read {}: {}", path.display(), e)))?;

        let selected: Vec<String> = content
            .lines()
            .skip(offset)
            .take(limit)
            .enumerate()
            .map(|(i, line)| format!("{:>6}  {}", offset + i + 1, line))
            .collect();

        Ok(Value::String(truncate_output(selected.join("\n"), self.max_output_bytes)))
    }
}

/// Writes a file, creating parent directories
pub struct WriteFile {
    workdir: PathBuf,
}

impl WriteFile {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self { workdir: workdir.into() }
    }

    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("write_file", "Write content to a file, replacing it")
            .param(ParamSpec::required("path", ParamKind::String).with_description("Path relative to the working directory"))
            .param(ParamSpec::required("content", ParamKind::String))
    }
}

#[async_trait]
impl ToolHandler for WriteFile {
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value, HandlerError> {
        let path = self.workdir.join(str_arg(&arguments, "path")?);
        let content = str_arg(&arguments, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| HandlerError::new(format!("Failed to create directories: {}", e)))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| HandlerError::new(format!("Failed to write {}: {}", path.display(), e)))?;

        Ok(Value::String(format!(
            "Successfully wrote {} bytes to {}",
            content.len(),
            path.display()
        )))
    }
}

/// Returns its `text` argument
pub struct Echo;

impl Echo {
    pub fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("echo", "Return the given text unchanged").param(ParamSpec::required("text", ParamKind::String))
    }
}

#[async_trait]
impl ToolHandler for Echo {
    async fn handle(&self, arguments: Map<String, Value>) -> Result<Value, HandlerError> {
        Ok(Value::String(str_arg(&arguments, "text")?.to_string()))
    }
}

/// Every stock tool with its handler, rooted at `workdir`
pub fn stock_tools(workdir: &Path) -> Vec<(ToolDescriptor, Arc<dyn ToolHandler>)> {
    vec![
        (Echo::descriptor(), Arc::new(Echo) as Arc<dyn ToolHandler>),
        (ReadFile::descriptor(), Arc::new(ReadFile::new(workdir))),
        (RunCommand::descriptor(), Arc::new(RunCommand::new(workdir))),
        (WriteFile::descriptor(), Arc::new(WriteFile::new(workdir))),
    ]
}

/// Stock handler for a tool name, if there is one
pub fn stock_handler(name: &str, workdir: &Path) -> Option<Arc<dyn ToolHandler>> {
    stock_tools(workdir)
        .into_iter()
        .find(|(d, _)| d.name == name)
        .map(|(_, h)| h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_run_command_success() {
        let dir = TempDir::new().unwrap();
        let handler = RunCommand::new(dir.path());
        let out = handler.handle(args(json!({"command": "echo hello"}))).await.unwrap();
        assert_eq!(out["exit_code"], 0);
        assert!(out["output"].as_str().unwrap().contains("hello"));
    }

    #[tokio::test]
    async fn test_run_command_failure_is_handler_error() {
        let dir = TempDir::new().unwrap();
        let handler = RunCommand::new(dir.path());
        let err = handler
            .handle(args(json!({"command": "echo oops >&2; exit 3"})))
            .await
            .unwrap_err();
        assert!(err.message.contains("status 3"));
        assert!(err.message.contains("oops"));
    }

    #[tokio::test]
    async fn test_run_command_runs_in_workdir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let handler = RunCommand::new(dir.path());
        let out = handler.handle(args(json!({"command": "ls"}))).await.unwrap();
        assert!(out["output"].as_str().unwrap().contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_run_command_truncates() {
        let dir = TempDir::new().unwrap();
        let handler = RunCommand::new(dir.path()).with_max_output(10);
        let out = handler
            .handle(args(json!({"command": "printf 'abcdefghijklmnopqrstuvwxyz'"})))
            .await
            .unwrap();
        assert_eq!(out["output"], "abcdefghij\n... [output truncated]");
    }

    #[tokio::test]
    async fn test_read_file_with_offset_and_limit() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let handler = ReadFile::new(dir.path());

        let out = handler
            .handle(args(json!({"path": "a.txt", "offset": 1, "limit": 2})))
            .await
            .unwrap();
        assert_eq!(out, json!("     2  two\n     3  three"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = ReadFile::new(dir.path())
            .handle(args(json!({"path": "missing.txt"})))
            .await
            .unwrap_err();
        assert!(err.message.starts_with("Failed to read"));
    }

    #[tokio::test]
    async fn test_write_file_creates_parents() {
        let dir = TempDir::new().unwrap();
        let out = WriteFile::new(dir.path())
            .handle(args(json!({"path": "nested/dir/out.txt", "content": "hello"})))
            .await
            .unwrap();
        assert!(out.as_str().unwrap().starts_with("Successfully wrote 5 bytes"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nested/dir/out.txt")).unwrap(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_echo() {
        let out = Echo.handle(args(json!({"text": "ping"}))).await.unwrap();
        assert_eq!(out, json!("ping"));
    }

    #[test]
    fn test_stock_tools_have_unique_names() {
        let dir = TempDir::new().unwrap();
        let tools = stock_tools(dir.path());
        let names: std::collections::BTreeSet<_> = tools.iter().map(|(d, _)| d.name.clone()).collect();
        assert_eq!(names.len(), tools.len());
        assert!(stock_handler("read_file", dir.path()).is_some());
        assert!(stock_handler("deploy", dir.path()).is_none());
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let out = truncate_output("héllo".to_string(), 2);
        assert_eq!(out, "h\n... [output truncated]");
    }
}
