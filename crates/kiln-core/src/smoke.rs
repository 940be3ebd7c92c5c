//! End-to-end check of an installed package (`kiln test`).

use std::path::Path;

use kiln_schema::SmokeTest;
use thiserror::Error;

use crate::exec::{CommandRunner, Step, StepError};
use crate::layout::InstalledLayout;

#[derive(Error, Debug)]
pub enum SmokeError {
    #[error(transparent)]
    Step(#[from] StepError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unexpected output: expected {expected:?}, got {actual:?}")]
    Mismatch { expected: String, actual: String },
}

fn with_env(mut step: Step, test: &SmokeTest, dir: &Path) -> Step {
    for key in &test.unset_env {
        step = step.env_remove(key);
    }
    for (key, value) in &test.env {
        step = step.env(key, value);
    }
    step.current_dir(dir)
}

/// The compile step: first element is an installed launcher.
pub fn compile_step(test: &SmokeTest, layout: &InstalledLayout, dir: &Path) -> Step {
    let (program, args) = test
        .compile
        .split_first()
        .map_or(("", &[][..]), |(p, a)| (p.as_str(), a));
    with_env(Step::new(layout.launcher(program)).args(args), test, dir)
}

/// The run step: first element is a host program.
pub fn run_step(test: &SmokeTest, dir: &Path) -> Step {
    let (program, args) = test
        .run
        .split_first()
        .map_or(("", &[][..]), |(p, a)| (p.as_str(), a));
    with_env(Step::new(program).args(args), test, dir)
}

/// Compile and run the test program in a scratch directory under
/// `scratch_root`, comparing its output with the expectation.
///
/// # Errors
///
/// Fails when either command fails or the output differs.
pub fn run_smoke_test(
    runner: &dyn CommandRunner,
    test: &SmokeTest,
    layout: &InstalledLayout,
    scratch_root: &Path,
) -> Result<String, SmokeError> {
    std::fs::create_dir_all(scratch_root)?;
    let scratch = tempfile::Builder::new()
        .prefix("kiln-test-")
        .tempdir_in(scratch_root)?;
    std::fs::write(scratch.path().join(&test.file), &test.content)?;

    runner.run(&compile_step(test, layout, scratch.path()))?;
    let stdout = runner.output(&run_step(test, scratch.path()))?;

    let actual = stdout.trim_end_matches(['\n', '\r']);
    if actual != test.expect_stdout {
        return Err(SmokeError::Mismatch {
            expected: test.expect_stdout.clone(),
            actual: actual.to_string(),
        });
    }
    Ok(actual.to_string())
}
