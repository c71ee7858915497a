use std::{collections::HashSet, fmt, path::Path};

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    config::{DEFAULT_MEMORY_LIMIT_MB, MAX_MEMORY_LIMIT_MB},
    error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Java,
    #[serde(alias = "c++")]
    Cpp,
}

impl Language {
    pub fn all() -> [Language; 3] {
        [Language::Python, Language::Java, Language::Cpp]
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|f| f.support_sufix().contains(&ext))
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|f| f.to_str())
            .and_then(Self::from_extension)
    }

    pub fn support_sufix(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::Java => &["java"],
            Language::Cpp => &["cpp", "cc", "cxx"],
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
        };
        f.pad(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestCase {
    pub key: String,
    pub input: String,
    pub expected_output: String,
}

/// One unit of judging work. Immutable once parsed.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub language: Language,
    pub source: String,
    pub memory_limit_mb: u64,
    pub test_cases: Vec<TestCase>,
}

impl Submission {
    pub fn new(
        id: &str,
        language: Language,
        source: String,
        memory_limit_mb: Option<u64>,
        test_cases: Vec<TestCase>,
    ) -> Result<Self> {
        let memory_limit_mb = memory_limit_mb.unwrap_or(DEFAULT_MEMORY_LIMIT_MB);
        if memory_limit_mb == 0 {
            return Err(Error::Data("memory limit must be positive".into()));
        }
        if memory_limit_mb > MAX_MEMORY_LIMIT_MB {
            return Err(Error::Data(format!(
                "memory limit {} MB exceeds {} MB",
                memory_limit_mb, MAX_MEMORY_LIMIT_MB
            )));
        }

        let mut keys = HashSet::new();
        for case in test_cases.iter() {
            if !keys.insert(case.key.as_str()) {
                return Err(Error::Data(format!("duplicated test case key `{}`", case.key)));
            }
        }

        Ok(Self {
            id: id.into(),
            language,
            source,
            memory_limit_mb,
            test_cases,
        })
    }

    /// Parses an inbound job record. Both the camelCase field names and the
    /// older snake_case ones are accepted. Records without a memory limit get
    /// `default_memory_limit_mb`.
    pub fn from_json(id: &str, bytes: &[u8], default_memory_limit_mb: u64) -> Result<Self> {
        let record: SubmissionRecord = serde_json::from_slice(bytes)?;
        let test_cases = record
            .test_cases
            .into_iter()
            .map(|f| TestCase {
                key: f.key,
                input: f.input,
                expected_output: f.output,
            })
            .collect();

        Self::new(
            id,
            record.language,
            record.source,
            Some(record.memory_limit_mb.unwrap_or(default_memory_limit_mb)),
            test_cases,
        )
    }
}

#[derive(Debug, Deserialize)]
struct SubmissionRecord {
    #[serde(default = "default_language")]
    language: Language,
    #[serde(alias = "code")]
    source: String,
    #[serde(rename = "testCases", alias = "test_cases", default)]
    test_cases: Vec<TestCaseRecord>,
    #[serde(rename = "memoryLimitMB", alias = "memory_limit", default)]
    memory_limit_mb: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct TestCaseRecord {
    #[serde(deserialize_with = "scalar_text")]
    key: String,
    #[serde(deserialize_with = "scalar_text", default)]
    input: String,
    #[serde(alias = "expectedOutput", deserialize_with = "scalar_text", default)]
    output: String,
}

fn default_language() -> Language {
    Language::Python
}

/// Callers send numbers as often as strings for inputs and answers.
fn scalar_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}
