use std::{fs, path::PathBuf, time::Duration};

use crate::{
    compare::classify,
    compile::{CompileResult, CompiledProgram},
    config::{ImageConfig, JudgeConfig, ToolchainConfig},
    error::Result,
    sandbox::{EnvironmentGuard, EnvironmentProvider, EnvironmentSpec, SandboxExecutor},
    submission::Submission,
    JudgeResult, Verdict, PLACEHOLDER_OUTPUT,
};

/// Key of the single result reported when compilation fails.
pub const COMPILE_KEY: &str = "compile";

#[derive(Debug, Clone)]
pub struct JudgeSettings {
    pub work_dir: PathBuf,
    pub time_limit: Duration,
    pub watchdog_grace: Duration,
    /// Applied to jobs that do not carry a memory limit.
    pub memory_limit_mb: u64,
    pub images: ImageConfig,
    pub toolchain: ToolchainConfig,
}

impl From<&JudgeConfig> for JudgeSettings {
    fn from(config: &JudgeConfig) -> Self {
        Self {
            work_dir: config.work_dir.clone(),
            time_limit: config.time_limit(),
            watchdog_grace: config.watchdog_grace(),
            memory_limit_mb: config.limit.memory_limit,
            images: config.images.clone(),
            toolchain: config.toolchain.clone(),
        }
    }
}

/// Where a submission is in its judging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Compiling,
    Ready,
    /// About to run the case at this index.
    Running(usize),
    /// A limit tripped; cases from this index on are not executed.
    ShortCircuited(usize),
    Done,
}

pub struct Pipeline {
    provider: Box<dyn EnvironmentProvider + Send + Sync>,
    executor: SandboxExecutor,
    settings: JudgeSettings,
}

impl Pipeline {
    pub fn new(
        provider: Box<dyn EnvironmentProvider + Send + Sync>,
        mut settings: JudgeSettings,
    ) -> Result<Self> {
        // containers mount scratch dirs by absolute path
        fs::create_dir_all(&settings.work_dir)?;
        settings.work_dir = settings.work_dir.canonicalize()?;

        Ok(Self {
            provider,
            executor: SandboxExecutor::new(settings.watchdog_grace),
            settings,
        })
    }

    pub fn settings(&self) -> &JudgeSettings {
        &self.settings
    }

    /// Judges every test case of `submission`. The returned list always ends
    /// with the sentinel.
    pub fn judge(&self, submission: &Submission) -> Vec<JudgeResult> {
        log::info!(
            "judging submission {} ({}, {} cases)",
            submission.id,
            submission.language,
            submission.test_cases.len()
        );
        log::debug!("submission {}: {:?}", submission.id, Stage::Compiling);

        match self.compile(submission) {
            CompileResult::OK(program) => self.judge_program(program, submission),
            CompileResult::CompileError(msg) => {
                log::info!("submission {} failed to compile", submission.id);
                log::debug!("submission {}: {:?}", submission.id, Stage::Done);
                vec![
                    JudgeResult::new(COMPILE_KEY, Verdict::CompileError, msg, 0.0),
                    JudgeResult::sentinel(),
                ]
            }
        }
    }

    /// A missing toolchain or a scratch I/O failure is reported like a
    /// compile error.
    pub fn compile(&self, submission: &Submission) -> CompileResult {
        let result = submission
            .language
            .compiler(&self.settings.work_dir, &self.settings.toolchain)
            .and_then(|compiler| compiler.compile(&submission.source));

        match result {
            Ok(result) => result,
            Err(e) => {
                log::error!("compiler failed for submission {}: {}", submission.id, e);
                CompileResult::CompileError(e.to_string())
            }
        }
    }

    /// Runs the already compiled `program` over the cases of `submission`.
    /// The program and its scratch directory are gone when this returns.
    pub fn judge_program(
        &self,
        program: CompiledProgram,
        submission: &Submission,
    ) -> Vec<JudgeResult> {
        let cases = &submission.test_cases;
        let mut results = Vec::with_capacity(cases.len() + 1);
        log::debug!("submission {}: {:?}", submission.id, Stage::Ready);

        let spec = EnvironmentSpec {
            image: self.settings.images.image_for(submission.language).into(),
            memory_limit_mb: submission.memory_limit_mb,
            shared_dir: program.scratch_path().to_path_buf(),
        };
        let guard = match EnvironmentGuard::acquire(self.provider.as_ref(), &spec) {
            Ok(guard) => guard,
            Err(e) => {
                log::error!("no environment for submission {}: {}", submission.id, e);
                let fault = e.to_string();
                results.extend(
                    cases
                        .iter()
                        .map(|f| JudgeResult::new(&f.key, Verdict::WrongAnswer, fault.clone(), 0.0)),
                );
                results.push(JudgeResult::sentinel());
                return results;
            }
        };

        let mut stage = Stage::Running(0);
        loop {
            log::debug!("submission {}: {:?}", submission.id, stage);
            stage = match stage {
                Stage::Running(i) if i < cases.len() => {
                    let case = &cases[i];
                    let outcome = self.executor.run(
                        &case.input,
                        &program,
                        submission.memory_limit_mb,
                        self.settings.time_limit,
                        &guard,
                    );
                    let verdict = classify(&outcome, &case.expected_output);
                    log::info!(
                        "submission {} case {}: {} in {:?}",
                        submission.id,
                        case.key,
                        verdict.description(),
                        outcome.elapsed
                    );

                    if verdict.is_fatal() {
                        results.push(JudgeResult::new(
                            &case.key,
                            verdict,
                            PLACEHOLDER_OUTPUT.into(),
                            0.0,
                        ));
                        Stage::ShortCircuited(i + 1)
                    } else {
                        results.push(JudgeResult::new(
                            &case.key,
                            verdict,
                            outcome.output,
                            outcome.elapsed.as_secs_f64(),
                        ));
                        Stage::Running(i + 1)
                    }
                }
                Stage::ShortCircuited(i) => {
                    results.extend(cases[i..].iter().map(|f| JudgeResult::skipped(&f.key)));
                    Stage::Done
                }
                Stage::Done => break,
                _ => Stage::Done,
            };
        }

        drop(guard);
        drop(program);
        results.push(JudgeResult::sentinel());
        results
    }
}
