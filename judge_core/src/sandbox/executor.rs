use std::{
    fs,
    io::Write,
    os::unix::fs::PermissionsExt,
    path::Path,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::RecvTimeoutError;

use super::{EnvironmentGuard, ExecOutput, ExecutionOutcome, TerminationReason};
use crate::{
    compile::{shell_quote, CompiledProgram, MemoryCeiling},
    error::{Error, Result},
};

/// Exit status of `timeout` when the watchdog fired.
pub const TIMEOUT_EXIT: i32 = 124;
/// Exit status of a process killed by SIGABRT, which is what a failed
/// allocation under `ulimit -v` usually ends in.
pub const ABORT_EXIT: i32 = 134;

const STATUS_TRAILER: &str = "Exit Status: ";

const OOM_MARKERS: &[&str] = &[
    "std::bad_alloc",
    "MemoryError",
    "java.lang.OutOfMemoryError",
];

pub struct SandboxExecutor {
    grace: Duration,
}

impl SandboxExecutor {
    /// `grace` is how long past the time limit the caller waits for the
    /// worker before giving up on it.
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    /// Runs one test case. Never fails: faults come back as an outcome whose
    /// output is the fault description.
    pub fn run(
        &self,
        input: &str,
        program: &CompiledProgram,
        memory_limit_mb: u64,
        time_limit: Duration,
        env: &EnvironmentGuard,
    ) -> ExecutionOutcome {
        let started = Instant::now();
        let (output, reason) = match self.try_run(input, program, memory_limit_mb, time_limit, env)
        {
            Ok(v) => v,
            Err(e) => {
                log::warn!("sandbox fault: {}", e);
                (e.to_string(), TerminationReason::RuntimeError)
            }
        };

        ExecutionOutcome {
            output,
            reason,
            elapsed: started.elapsed(),
        }
    }

    fn try_run(
        &self,
        input: &str,
        program: &CompiledProgram,
        memory_limit_mb: u64,
        time_limit: Duration,
        env: &EnvironmentGuard,
    ) -> Result<(String, TerminationReason)> {
        let mut input_file = tempfile::Builder::new()
            .prefix("input-")
            .suffix(".txt")
            .tempfile_in(program.scratch_path())?;
        input_file.write_all(input.as_bytes())?;
        input_file.flush()?;
        fs::set_permissions(input_file.path(), fs::Permissions::from_mode(0o644))?;

        let argv = worker_command(input_file.path(), program, memory_limit_mb, time_limit)?;
        log::debug!("worker command {:?}", argv);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let env = env.environment();
        thread::Builder::new()
            .name("sandbox-worker".into())
            .spawn(move || {
                // the receiver is gone if the caller already gave up
                let _ = tx.send(env.exec(&argv));
            })?;

        match rx.recv_timeout(time_limit + self.grace) {
            Ok(result) => interpret(result?),
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("worker missed its deadline, treating as time out");
                Ok((String::new(), TerminationReason::TimedOut))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Sandbox("worker exited without a result".into()))
            }
        }
    }
}

/// Shell command that applies the memory ceiling and the watchdog, feeds the
/// input file to the program and reports its exit status on the last line.
pub fn worker_command(
    input_path: &Path,
    program: &CompiledProgram,
    memory_limit_mb: u64,
    time_limit: Duration,
) -> Result<Vec<String>> {
    let ulimit = match program.ceiling {
        MemoryCeiling::AddressSpace => {
            let kb = memory_limit_mb.checked_mul(1024).ok_or_else(|| {
                Error::Argument(format!("memory limit {} MB is too large", memory_limit_mb))
            })?;
            format!("ulimit -v {}; ", kb)
        }
        MemoryCeiling::JvmHeap => String::new(),
    };
    let script = format!(
        "{}cat {} | timeout --foreground {} {} 2>&1; echo \"{}$?\"",
        ulimit,
        shell_quote(&input_path.to_string_lossy()),
        time_limit.as_secs_f64(),
        program.limited_command_line(memory_limit_mb),
        STATUS_TRAILER,
    );
    Ok(vec!["/bin/sh".into(), "-c".into(), script])
}

/// Whether the output ends in an allocation failure report. Stack frames
/// after the report are skipped.
fn ends_in_oom(output: &str) -> bool {
    output
        .lines()
        .rev()
        .map(|f| f.trim())
        .find(|f| !f.is_empty() && !f.starts_with("at ") && !f.starts_with("File "))
        .map_or(false, |last| OOM_MARKERS.iter().any(|f| last.contains(f)))
}

fn interpret(raw: ExecOutput) -> Result<(String, TerminationReason)> {
    let idx = match raw.stdout.rfind(STATUS_TRAILER) {
        Some(idx) => idx,
        None => {
            let detail = if raw.stderr.trim().is_empty() {
                raw.stdout.trim()
            } else {
                raw.stderr.trim()
            };
            return Err(Error::Sandbox(format!(
                "no exit status reported (status {:?}): {}",
                raw.status, detail
            )));
        }
    };

    let code: i32 = raw.stdout[idx + STATUS_TRAILER.len()..]
        .trim()
        .parse()
        .map_err(|_| Error::Sandbox("unreadable exit status".into()))?;
    let output = raw.stdout[..idx].to_string();

    let reason = match code {
        TIMEOUT_EXIT => TerminationReason::TimedOut,
        ABORT_EXIT => TerminationReason::MemoryExceeded,
        0 => TerminationReason::Normal,
        _ if ends_in_oom(&output) => TerminationReason::MemoryExceeded,
        _ => TerminationReason::Normal,
    };

    Ok((output, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(stdout: &str) -> ExecOutput {
        ExecOutput {
            stdout: stdout.into(),
            stderr: String::new(),
            status: Some(0),
        }
    }

    #[test]
    fn trailer_is_stripped() -> Result<()> {
        let (output, reason) = interpret(raw("4\nExit Status: 0\n"))?;
        assert_eq!(output, "4\n");
        assert_eq!(reason, TerminationReason::Normal);
        Ok(())
    }

    #[test]
    fn trailer_without_newline_before_it() -> Result<()> {
        let (output, _) = interpret(raw("4Exit Status: 0\n"))?;
        assert_eq!(output, "4");
        Ok(())
    }

    #[test]
    fn watchdog_exit_is_timeout() -> Result<()> {
        let (_, reason) = interpret(raw("Exit Status: 124\n"))?;
        assert_eq!(reason, TerminationReason::TimedOut);
        Ok(())
    }

    #[test]
    fn abort_exit_is_memory() -> Result<()> {
        let (_, reason) = interpret(raw("Exit Status: 134\n"))?;
        assert_eq!(reason, TerminationReason::MemoryExceeded);
        Ok(())
    }

    #[test]
    fn allocation_failure_marker_is_memory() -> Result<()> {
        let (_, reason) = interpret(raw("Traceback ...\nMemoryError\nExit Status: 1\n"))?;
        assert_eq!(reason, TerminationReason::MemoryExceeded);
        Ok(())
    }

    #[test]
    fn java_heap_report_is_memory() -> Result<()> {
        let (_, reason) = interpret(raw(
            "Exception in thread \"main\" java.lang.OutOfMemoryError: Java heap space\n\tat Main.main(Main.java:3)\nExit Status: 1\n",
        ))?;
        assert_eq!(reason, TerminationReason::MemoryExceeded);
        Ok(())
    }

    #[test]
    fn printed_marker_is_not_memory() -> Result<()> {
        let (_, reason) = interpret(raw("MemoryError\ndone\nExit Status: 1\n"))?;
        assert_eq!(reason, TerminationReason::Normal);
        Ok(())
    }

    #[test]
    fn other_failures_are_normal() -> Result<()> {
        let (output, reason) = interpret(raw("boom\nExit Status: 1\n"))?;
        assert_eq!(output, "boom\n");
        assert_eq!(reason, TerminationReason::Normal);
        Ok(())
    }

    #[test]
    fn missing_trailer_is_a_fault() {
        let result = interpret(ExecOutput {
            stdout: String::new(),
            stderr: "Error: No such container: abc".into(),
            status: Some(1),
        });
        match result {
            Err(Error::Sandbox(msg)) => assert!(msg.contains("No such container")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn command_applies_limits() -> Result<()> {
        let scratch = tempfile::tempdir()?;
        let program = CompiledProgram::new(scratch, "/w/main".into());
        let argv = worker_command(
            Path::new("/w/input-1.txt"),
            &program,
            256,
            Duration::from_secs(2),
        )?;
        assert_eq!(argv[0], "/bin/sh");
        assert_eq!(argv[1], "-c");
        assert!(argv[2].starts_with("ulimit -v 262144;"));
        assert!(argv[2].contains("cat '/w/input-1.txt' | timeout --foreground 2 '/w/main' 2>&1"));
        assert!(argv[2].ends_with("echo \"Exit Status: $?\""));
        Ok(())
    }

    #[test]
    fn jvm_gets_heap_flag_instead_of_ulimit() -> Result<()> {
        let program = CompiledProgram::new_with_args(
            tempfile::tempdir()?,
            "java".into(),
            vec!["-classpath".into(), "/w".into(), "Main".into()],
        )
        .with_ceiling(MemoryCeiling::JvmHeap);
        let argv = worker_command(
            Path::new("/w/input-1.txt"),
            &program,
            256,
            Duration::from_secs(2),
        )?;
        assert!(!argv[2].contains("ulimit"));
        assert!(argv[2].starts_with("cat '/w/input-1.txt' | timeout --foreground 2 'java' '-Xmx256m' '-classpath'"));
        Ok(())
    }

    #[test]
    fn oversized_limit_is_rejected() -> Result<()> {
        let program = CompiledProgram::new(tempfile::tempdir()?, "/w/main".into());
        let result = worker_command(Path::new("/w/in"), &program, u64::MAX, Duration::from_secs(1));
        assert!(matches!(result, Err(Error::Argument(_))));
        Ok(())
    }
}
