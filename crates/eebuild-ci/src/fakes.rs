//! Scripted command runner (testing only)
//!
//! `ScriptedRunner` records every command it is asked to run and answers
//! from a list of rules, without starting any process.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::runner::{CommandOutput, CommandRunner, CommandSpec};

/// Canned answer for a matching command.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,

    /// Answer with a spawn error instead of an exit status.
    pub spawn_error: bool,

    /// File written before answering, to simulate tool side effects.
    pub writes: Option<(PathBuf, String)>,
}

impl ScriptedResponse {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn exit(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code: code,
            stderr: stderr.into(),
            ..Self::default()
        }
    }

    pub fn not_found() -> Self {
        Self {
            spawn_error: true,
            ..Self::default()
        }
    }

    pub fn writing(mut self, path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        self.writes = Some((path.into(), content.into()));
        self
    }
}

struct Rule {
    tokens: Vec<String>,
    response: ScriptedResponse,
}

impl Rule {
    /// Every token appears, in order, in `program args...`.
    fn matches(&self, spec: &CommandSpec) -> bool {
        let mut words = std::iter::once(&spec.program).chain(spec.args.iter());
        self.tokens
            .iter()
            .all(|token| words.by_ref().any(|w| w == token))
    }
}

/// In-memory [`CommandRunner`]. Unmatched commands succeed with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Vec<Rule>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `response` for commands containing `tokens` in order. Rules are
    /// checked in insertion order; the first match wins.
    pub fn on(mut self, tokens: &[&str], response: ScriptedResponse) -> Self {
        self.rules.push(Rule {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            response,
        });
        self
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Rendered command lines, in order.
    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(CommandSpec::display_line).collect()
    }

    /// Commands whose rendered line contains `needle`.
    pub fn calls_containing(&self, needle: &str) -> Vec<String> {
        self.command_lines()
            .into_iter()
            .filter(|line| line.contains(needle))
            .collect()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> std::io::Result<CommandOutput> {
        self.calls.lock().unwrap().push(spec.clone());

        let response = self
            .rules
            .iter()
            .find(|rule| rule.matches(spec))
            .map(|rule| rule.response.clone())
            .unwrap_or_default();

        if let Some((path, content)) = &response.writes {
            std::fs::write(path, content)?;
        }
        if response.spawn_error {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}: command not found", spec.program),
            ));
        }
        Ok(CommandOutput {
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
            duration_ms: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new()
            .on(&["push", "b"], ScriptedResponse::exit(1, "denied"))
            .on(&["push"], ScriptedResponse::ok("pushed"));

        let a = runner
            .run(&CommandSpec::new("podman").args(["push", "a"]))
            .await
            .unwrap();
        let b = runner
            .run(&CommandSpec::new("podman").args(["push", "b"]))
            .await
            .unwrap();

        assert!(a.success());
        assert_eq!(a.stdout, "pushed");
        assert_eq!(b.exit_code, 1);
        assert_eq!(runner.command_lines(), vec!["podman push a", "podman push b"]);
    }

    #[tokio::test]
    async fn test_tokens_must_appear_in_order() {
        let runner = ScriptedRunner::new().on(&["b", "a"], ScriptedResponse::exit(9, ""));
        let out = runner
            .run(&CommandSpec::new("x").args(["a", "b"]))
            .await
            .unwrap();
        assert!(out.success());
    }

    #[tokio::test]
    async fn test_not_found_is_spawn_error() {
        let runner = ScriptedRunner::new().on(&["trivy"], ScriptedResponse::not_found());
        assert!(runner.run(&CommandSpec::new("trivy")).await.is_err());
        assert_eq!(runner.calls().len(), 1);
    }
}
