//! Test doubles shared by the unit tests in this crate.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::exec::{CommandRunner, Step, StepError};

type Hook = Box<dyn Fn(&Step) + Send + Sync>;

/// Records every step instead of spawning it.
///
/// `outputs` maps a substring of the command line to canned stdout, `hooks`
/// run side effects (such as writing a file the real tool would create), and
/// `fail_on` makes the first matching step fail.
#[derive(Default)]
pub(crate) struct RecordingRunner {
    steps: Mutex<Vec<String>>,
    outputs: HashMap<String, String>,
    hooks: Vec<(String, Hook)>,
    fail_on: Option<String>,
}

impl RecordingRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_output(mut self, needle: &str, stdout: &str) -> Self {
        self.outputs.insert(needle.to_string(), stdout.to_string());
        self
    }

    pub(crate) fn with_hook(
        mut self,
        needle: &str,
        hook: impl Fn(&Step) + Send + Sync + 'static,
    ) -> Self {
        self.hooks.push((needle.to_string(), Box::new(hook)));
        self
    }

    pub(crate) fn failing_on(mut self, needle: &str) -> Self {
        self.fail_on = Some(needle.to_string());
        self
    }

    pub(crate) fn steps(&self) -> Vec<String> {
        self.steps.lock().unwrap().clone()
    }

    fn record(&self, step: &Step) -> Result<String, StepError> {
        let line = step.display();
        self.steps.lock().unwrap().push(line.clone());

        if let Some(needle) = &self.fail_on {
            if line.contains(needle.as_str()) {
                return Err(step.failure(Some(1)));
            }
        }
        for (needle, hook) in &self.hooks {
            if line.contains(needle.as_str()) {
                hook(step);
            }
        }
        Ok(self
            .outputs
            .iter()
            .find(|(needle, _)| line.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, step: &Step) -> Result<(), StepError> {
        self.record(step).map(|_| ())
    }

    fn output(&self, step: &Step) -> Result<String, StepError> {
        self.record(step)
    }
}
