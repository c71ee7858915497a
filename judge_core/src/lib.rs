pub mod compare;
pub mod compile;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod judge;
pub mod sandbox;
pub mod submission;

use serde::{ser::SerializeStruct, Serialize, Serializer};

/// Key of the terminal result that closes every result list.
pub const SENTINEL_KEY: &str = "stop";

/// Output recorded for test cases that were never executed.
pub const PLACEHOLDER_OUTPUT: &str = "Nothing";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JudgeResult {
    pub key: String,
    #[serde(rename = "status")]
    pub verdict: Verdict,
    pub stdout: String,
    #[serde(rename = "time")]
    pub elapsed_seconds: f64,
}

impl JudgeResult {
    pub fn new(key: &str, verdict: Verdict, stdout: String, elapsed_seconds: f64) -> Self {
        Self {
            key: key.into(),
            verdict,
            stdout,
            elapsed_seconds,
        }
    }

    /// A case that was not executed after a resource limit tripped.
    pub fn skipped(key: &str) -> Self {
        Self::new(key, Verdict::WrongAnswer, PLACEHOLDER_OUTPUT.into(), 0.0)
    }

    pub fn sentinel() -> Self {
        Self::new(SENTINEL_KEY, Verdict::ProcessingComplete, String::new(), 0.0)
    }

    /// Sentinel carrying the reason a job was dropped without judging.
    pub fn aborted(reason: String) -> Self {
        Self::new(SENTINEL_KEY, Verdict::ProcessingComplete, reason, 0.0)
    }

    pub fn is_sentinel(&self) -> bool {
        self.key == SENTINEL_KEY && self.verdict == Verdict::ProcessingComplete
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Accepted,
    WrongAnswer,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    CompileError,
    ProcessingComplete,
}

impl Verdict {
    /// Stable numeric code handed to external consumers.
    pub fn code(&self) -> u32 {
        match self {
            Verdict::Accepted => 1,
            Verdict::WrongAnswer => 2,
            Verdict::CompileError => 3,
            Verdict::TimeLimitExceeded => 4,
            Verdict::ProcessingComplete => 5,
            Verdict::MemoryLimitExceeded => 6,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Verdict::Accepted => "Accepted",
            Verdict::WrongAnswer => "Wrong Answer",
            Verdict::CompileError => "Compilation Error",
            Verdict::TimeLimitExceeded => "Time Limit Exceeded",
            Verdict::ProcessingComplete => "Processing complete",
            Verdict::MemoryLimitExceeded => "Memory Limit Exceeded",
        }
    }

    /// Resource-limit verdicts abandon the rest of the submission.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Verdict::TimeLimitExceeded | Verdict::MemoryLimitExceeded
        )
    }
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut status = serializer.serialize_struct("status", 2)?;
        status.serialize_field("description", self.description())?;
        status.serialize_field("id", &self.code())?;
        status.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let all = [
            Verdict::Accepted,
            Verdict::WrongAnswer,
            Verdict::TimeLimitExceeded,
            Verdict::MemoryLimitExceeded,
            Verdict::CompileError,
            Verdict::ProcessingComplete,
        ];
        let mut codes: Vec<u32> = all.iter().map(|f| f.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn result_wire_shape() {
        let value = serde_json::to_value(JudgeResult::new(
            "a",
            Verdict::TimeLimitExceeded,
            "Nothing".into(),
            0.0,
        ))
        .unwrap();
        assert_eq!(value["key"], "a");
        assert_eq!(value["status"]["id"], 4);
        assert_eq!(value["status"]["description"], "Time Limit Exceeded");
        assert_eq!(value["stdout"], "Nothing");
        assert_eq!(value["time"], 0.0);
    }

    #[test]
    fn sentinel_shape() {
        let stop = JudgeResult::sentinel();
        assert!(stop.is_sentinel());
        assert_eq!(stop.verdict.code(), 5);
        assert!(stop.stdout.is_empty());
    }
}
