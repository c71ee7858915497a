use crate::{
    sandbox::{ExecutionOutcome, TerminationReason},
    Verdict,
};

pub enum ComparisionResult {
    Same,
    Different,
}

impl From<ComparisionResult> for Verdict {
    fn from(v: ComparisionResult) -> Self {
        match v {
            ComparisionResult::Same => Verdict::Accepted,
            ComparisionResult::Different => Verdict::WrongAnswer,
        }
    }
}

/// Drop carriage returns and surrounding whitespace.
pub fn normalize(text: &str) -> String {
    text.replace('\r', "").trim().to_string()
}

pub fn compare(output: &str, answer: &str) -> ComparisionResult {
    if normalize(output) == normalize(answer) {
        ComparisionResult::Same
    } else {
        ComparisionResult::Different
    }
}

/// Maps a finished run to its verdict. Limit violations win over the
/// output comparison.
pub fn classify(outcome: &ExecutionOutcome, expected_output: &str) -> Verdict {
    match outcome.reason {
        TerminationReason::TimedOut => Verdict::TimeLimitExceeded,
        TerminationReason::MemoryExceeded => Verdict::MemoryLimitExceeded,
        TerminationReason::Normal | TerminationReason::RuntimeError => {
            compare(&outcome.output, expected_output).into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(output: &str, reason: TerminationReason) -> ExecutionOutcome {
        ExecutionOutcome {
            output: output.into(),
            reason,
            elapsed: Duration::from_millis(10),
        }
    }

    #[test]
    fn accepted_on_equal_output() {
        let v = classify(&outcome("4\n", TerminationReason::Normal), "4");
        assert_eq!(v, Verdict::Accepted);
    }

    #[test]
    fn wrong_answer_on_different_output() {
        let v = classify(&outcome("5\n", TerminationReason::Normal), "4");
        assert_eq!(v, Verdict::WrongAnswer);
    }

    #[test]
    fn crlf_and_trailing_whitespace_are_ignored() {
        let v = classify(
            &outcome("1 2\r\n3 4\r\n\r\n  ", TerminationReason::Normal),
            "1 2\n3 4",
        );
        assert_eq!(v, Verdict::Accepted);
    }

    #[test]
    fn inner_whitespace_still_matters() {
        let v = classify(&outcome("1  2", TerminationReason::Normal), "1 2");
        assert_eq!(v, Verdict::WrongAnswer);
    }

    #[test]
    fn limits_take_precedence_over_output() {
        let v = classify(&outcome("4", TerminationReason::TimedOut), "4");
        assert_eq!(v, Verdict::TimeLimitExceeded);
        let v = classify(&outcome("4", TerminationReason::MemoryExceeded), "4");
        assert_eq!(v, Verdict::MemoryLimitExceeded);
    }

    #[test]
    fn sandbox_fault_text_is_compared_like_output() {
        let v = classify(
            &outcome("cannot reach container", TerminationReason::RuntimeError),
            "4",
        );
        assert_eq!(v, Verdict::WrongAnswer);
    }

    #[test]
    fn classification_is_idempotent() {
        let o = outcome("4 \r\n", TerminationReason::Normal);
        assert_eq!(classify(&o, "4"), classify(&o, "4"));
    }
}
