#![allow(dead_code)]

use std::{
    collections::VecDeque,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};

use judge_core::{
    config::{ImageConfig, ToolchainConfig, DEFAULT_MEMORY_LIMIT_MB},
    error::{Error, Result},
    judge::{JudgeSettings, Pipeline},
    sandbox::{Environment, EnvironmentProvider, EnvironmentSpec, ExecOutput},
    submission::{Language, Submission, TestCase},
};

pub enum Reply {
    /// Raw stdout of the worker shell, trailer included.
    Output(String),
    Fail(String),
    Hang(Duration),
}

pub fn exited(output: &str, code: i32) -> Reply {
    Reply::Output(format!("{}Exit Status: {}\n", output, code))
}

#[derive(Default)]
pub struct Script {
    replies: Mutex<VecDeque<Reply>>,
    memory_limits: Mutex<Vec<u64>>,
    pub created: AtomicUsize,
    pub execs: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl Script {
    pub fn new(replies: Vec<Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            ..Self::default()
        })
    }

    pub fn execs(&self) -> usize {
        self.execs.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Memory limit of every environment created so far.
    pub fn memory_limits(&self) -> Vec<u64> {
        self.memory_limits.lock().unwrap().clone()
    }
}

struct ScriptedEnvironment {
    script: Arc<Script>,
}

impl Environment for ScriptedEnvironment {
    fn id(&self) -> &str {
        "scripted"
    }

    fn start(&self) -> Result<()> {
        Ok(())
    }

    fn exec(&self, _argv: &[String]) -> Result<ExecOutput> {
        self.script.execs.fetch_add(1, Ordering::SeqCst);
        let reply = self.script.replies.lock().unwrap().pop_front();
        match reply {
            Some(Reply::Output(stdout)) => Ok(ExecOutput {
                stdout,
                stderr: String::new(),
                status: Some(0),
            }),
            Some(Reply::Fail(msg)) => Err(Error::Sandbox(msg)),
            Some(Reply::Hang(duration)) => {
                thread::sleep(duration);
                Ok(ExecOutput::default())
            }
            None => panic!("no scripted reply left"),
        }
    }

    fn destroy(&self) -> Result<()> {
        self.script.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct ScriptedProvider {
    pub script: Arc<Script>,
    pub unreachable: bool,
}

impl EnvironmentProvider for ScriptedProvider {
    fn create(&self, spec: &EnvironmentSpec) -> Result<Arc<dyn Environment>> {
        if self.unreachable {
            return Err(Error::Sandbox("environment unreachable".into()));
        }
        self.script.created.fetch_add(1, Ordering::SeqCst);
        self.script
            .memory_limits
            .lock()
            .unwrap()
            .push(spec.memory_limit_mb);
        Ok(Arc::new(ScriptedEnvironment {
            script: self.script.clone(),
        }))
    }
}

pub fn settings(work_dir: &Path) -> JudgeSettings {
    JudgeSettings {
        work_dir: work_dir.into(),
        time_limit: Duration::from_secs(2),
        watchdog_grace: Duration::from_secs(2),
        memory_limit_mb: DEFAULT_MEMORY_LIMIT_MB,
        images: ImageConfig::default(),
        toolchain: ToolchainConfig::default(),
    }
}

pub fn pipeline(work_dir: &Path, script: &Arc<Script>) -> Pipeline {
    pipeline_with(settings(work_dir), script)
}

pub fn pipeline_with(settings: JudgeSettings, script: &Arc<Script>) -> Pipeline {
    Pipeline::new(
        Box::new(ScriptedProvider {
            script: script.clone(),
            unreachable: false,
        }),
        settings,
    )
    .unwrap()
}

pub fn case(key: &str, input: &str, expected: &str) -> TestCase {
    TestCase {
        key: key.into(),
        input: input.into(),
        expected_output: expected.into(),
    }
}

pub fn python(source: &str, cases: Vec<TestCase>) -> Submission {
    Submission::new("job", Language::Python, source.into(), None, cases).unwrap()
}
