//! Test doubles for the command runner and PR source

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::Result;
use crate::git::{CommandOutput, CommandRunner, PullRequestSource};
use crate::types::{PullRequestDetail, PullRequestRecord};

/// Runner answering from a table keyed by the space-joined command line
///
/// Unscripted commands exit 1 with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    responses: HashMap<String, CommandOutput>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, command: impl Into<String>, output: CommandOutput) -> Self {
        self.responses.insert(command.into(), output);
        self
    }

    pub fn ok(self, command: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.respond(
            command,
            CommandOutput {
                exit_code: 0,
                stdout: stdout.into(),
                stderr: String::new(),
            },
        )
    }

    pub fn fail(self, command: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.respond(
            command,
            CommandOutput {
                exit_code: 1,
                stdout: String::new(),
                stderr: stderr.into(),
            },
        )
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn was_called(&self, command: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == command)
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, argv: &[&str]) -> Result<CommandOutput> {
        let line = argv.join(" ");
        self.calls.lock().unwrap().push(line.clone());
        Ok(self.responses.get(&line).cloned().unwrap_or(CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: format!("unscripted: {line}"),
        }))
    }
}

/// In-memory PR source
#[derive(Default)]
pub struct StaticPrSource {
    by_branch: HashMap<String, Vec<PullRequestRecord>>,
    details: HashMap<u64, PullRequestDetail>,
}

impl StaticPrSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prs(mut self, branch: &str, prs: Vec<PullRequestRecord>) -> Self {
        self.by_branch.insert(branch.to_string(), prs);
        self
    }

    pub fn with_detail(mut self, number: u64, detail: PullRequestDetail) -> Self {
        self.details.insert(number, detail);
        self
    }
}

#[async_trait]
impl PullRequestSource for StaticPrSource {
    async fn list_for_branch(&self, branch: &str) -> Vec<PullRequestRecord> {
        self.by_branch.get(branch).cloned().unwrap_or_default()
    }

    async fn get_detail(&self, number: u64) -> Option<PullRequestDetail> {
        self.details.get(&number).cloned()
    }
}
