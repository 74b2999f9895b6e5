//! Test-double runner.
//!
//! Records every command and answers from preset rules, making it easy to
//! write deterministic tests for the steps without touching a real host.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::runner::{CommandOutput, CommandRunner, LocalHost, ShellCommand};
use crate::errors::DeployError;

/// A file written through [`CommandRunner::put_file`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
    pub mode: u32,
}

/// Runner that records commands and returns pre-configured responses.
///
/// A rule matches when its pattern is a substring of the command line; the
/// first matching rule wins. Unmatched commands succeed with empty output.
#[derive(Debug, Default)]
pub struct MockRunner {
    rules: Mutex<Vec<(String, CommandOutput)>>,
    commands: Mutex<Vec<String>>,
    files: Mutex<Vec<PutFile>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, builder style
    pub fn on(self, pattern: &str, output: CommandOutput) -> Self {
        self.respond(pattern, output);
        self
    }

    /// Add a rule
    pub fn respond(&self, pattern: &str, output: CommandOutput) {
        lock(&self.rules).push((pattern.to_string(), output));
    }

    /// Command lines run so far, in order
    pub fn executed_commands(&self) -> Vec<String> {
        lock(&self.commands).clone()
    }

    /// Whether any executed command line contains `pattern`
    pub fn ran(&self, pattern: &str) -> bool {
        lock(&self.commands).iter().any(|c| c.contains(pattern))
    }

    /// Files written so far, in order
    pub fn put_files(&self) -> Vec<PutFile> {
        lock(&self.files).clone()
    }

    fn answer(&self, command: &ShellCommand) -> CommandOutput {
        let line = command.command_line();
        lock(&self.commands).push(line.clone());
        lock(&self.rules)
            .iter()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn capture(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        Ok(self.answer(command))
    }

    async fn stream(&self, command: &ShellCommand) -> Result<CommandOutput, DeployError> {
        let output = self.answer(command);
        Ok(CommandOutput {
            status: output.status,
            ..Default::default()
        })
    }

    async fn put_file(&self, path: &Path, contents: &[u8], mode: u32) -> Result<(), DeployError> {
        lock(&self.files).push(PutFile {
            path: path.to_path_buf(),
            contents: contents.to_vec(),
            mode,
        });
        Ok(())
    }
}

impl LocalHost for MockRunner {}
