//! In-memory fake of [`ToolExecutor`] (testing only).
//!
//! `ScriptedExecutor` answers each invocation from a script keyed by
//! subcommand, optionally narrowed to a module (the working directory's last
//! path component), and records every invocation for later inspection.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::HarnessResult;
use crate::executor::{CommandOutput, Invocation, ToolExecutor};

#[derive(Debug, Default)]
struct Script {
    queued: VecDeque<CommandOutput>,
    fallback: Option<CommandOutput>,
}

impl Script {
    fn next(&mut self) -> Option<CommandOutput> {
        self.queued.pop_front().or_else(|| self.fallback.clone())
    }
}

/// Scripted executor. Unscripted invocations succeed with empty output.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<Invocation>>,
}

fn key(module: Option<&str>, subcommand: &str) -> String {
    match module {
        Some(module) => format!("{module}:{subcommand}"),
        None => subcommand.to_string(),
    }
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for `subcommand`.
    pub fn respond(self, subcommand: &str, output: CommandOutput) -> Self {
        self.push(key(None, subcommand), output, false)
    }

    /// Response for `subcommand` once its queue is empty.
    pub fn respond_always(self, subcommand: &str, output: CommandOutput) -> Self {
        self.push(key(None, subcommand), output, true)
    }

    /// Queue one response for `subcommand` run inside `module`.
    pub fn respond_in(self, module: &str, subcommand: &str, output: CommandOutput) -> Self {
        self.push(key(Some(module), subcommand), output, false)
    }

    /// Response for `subcommand` inside `module` once its queue is empty.
    pub fn respond_always_in(self, module: &str, subcommand: &str, output: CommandOutput) -> Self {
        self.push(key(Some(module), subcommand), output, true)
    }

    fn push(self, key: String, output: CommandOutput, fallback: bool) -> Self {
        {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(key).or_default();
            if fallback {
                script.fallback = Some(output);
            } else {
                script.queued.push_back(output);
            }
        }
        self
    }

    /// Every invocation so far, in order.
    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of invocations of `subcommand`.
    pub fn count(&self, subcommand: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.subcommand() == subcommand)
            .count()
    }

    /// Number of invocations of `subcommand` inside `module`.
    pub fn count_in(&self, module: &str, subcommand: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|inv| inv.subcommand() == subcommand && module_of(inv) == Some(module))
            .count()
    }

    /// Subcommands in invocation order.
    pub fn subcommands(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|inv| inv.subcommand().to_string())
            .collect()
    }
}

fn module_of(inv: &Invocation) -> Option<&str> {
    inv.working_dir.file_name().and_then(|n| n.to_str())
}

#[async_trait]
impl ToolExecutor for ScriptedExecutor {
    async fn execute(&self, invocation: &Invocation) -> HarnessResult<CommandOutput> {
        self.calls.lock().unwrap().push(invocation.clone());

        let subcommand = invocation.subcommand();
        let mut scripts = self.scripts.lock().unwrap();

        let scoped = module_of(invocation)
            .map(|m| key(Some(m), subcommand))
            .and_then(|k| scripts.get_mut(&k).and_then(Script::next));
        let response = match scoped {
            Some(out) => Some(out),
            None => scripts
                .get_mut(&key(None, subcommand))
                .and_then(Script::next),
        };

        Ok(response.unwrap_or_else(|| CommandOutput::new(0, "", "")))
    }

    fn binary(&self) -> &str {
        "terraform"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inv(sub: &str, dir: &str) -> Invocation {
        Invocation::new(vec![sub.to_string()], dir)
    }

    #[tokio::test]
    async fn test_queue_then_fallback_then_default() {
        let fake = ScriptedExecutor::new()
            .respond("apply", CommandOutput::new(1, "", "Throttling"))
            .respond_always("apply", CommandOutput::new(0, "applied", ""));

        let first = fake.execute(&inv("apply", "/w/aws")).await.unwrap();
        let second = fake.execute(&inv("apply", "/w/aws")).await.unwrap();
        let third = fake.execute(&inv("apply", "/w/aws")).await.unwrap();
        let init = fake.execute(&inv("init", "/w/aws")).await.unwrap();

        assert_eq!(first.exit_code, 1);
        assert_eq!(second.stdout, "applied");
        assert_eq!(third.stdout, "applied");
        assert!(init.success());
        assert_eq!(fake.count("apply"), 3);
        assert_eq!(fake.subcommands(), vec!["apply", "apply", "apply", "init"]);
    }

    #[tokio::test]
    async fn test_module_scoped_script_wins() {
        let fake = ScriptedExecutor::new()
            .respond_always("validate", CommandOutput::new(0, "Success!", ""))
            .respond_always_in("gcp", "validate", CommandOutput::new(1, "", "Error"));

        let aws = fake.execute(&inv("validate", "/src/aws")).await.unwrap();
        let gcp = fake.execute(&inv("validate", "/src/gcp")).await.unwrap();

        assert!(aws.success());
        assert!(!gcp.success());
        assert_eq!(fake.count_in("gcp", "validate"), 1);
        assert_eq!(fake.count_in("azure", "validate"), 0);
    }
}
