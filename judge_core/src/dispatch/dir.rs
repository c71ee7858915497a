use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    time::SystemTime,
};

use serde::Serialize;

use super::{JobQueue, QueuedJob, ResultSink};
use crate::{
    error::{Error, Result},
    JudgeResult,
};

const JOB_SUFFIX: &str = "json";

/// Durable queue where every pending job is a `<id>.json` file. Jobs are
/// served oldest first.
pub struct DirQueue {
    dir: PathBuf,
}

impl DirQueue {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.into() })
    }

    pub fn enqueue(&self, id: &str, payload: &[u8]) -> Result<PathBuf> {
        check_id(id)?;
        let path = self.job_path(id);
        write_atomically(&self.dir, &path, payload)?;
        log::debug!("queued job {}", id);
        Ok(path)
    }

    pub fn is_pending(&self, id: &str) -> bool {
        self.job_path(id).exists()
    }

    pub fn pending(&self) -> Result<Vec<String>> {
        let mut jobs: Vec<(SystemTime, String)> = vec![];
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|f| f.to_str()) != Some(JOB_SUFFIX) {
                continue;
            }
            let id = match path.file_stem().and_then(|f| f.to_str()) {
                Some(id) if check_id(id).is_ok() => id.to_string(),
                _ => continue,
            };
            let modified = fs::metadata(&path)
                .and_then(|f| f.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            jobs.push((modified, id));
        }
        jobs.sort();
        Ok(jobs.into_iter().map(|f| f.1).collect())
    }

    fn job_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, JOB_SUFFIX))
    }
}

impl JobQueue for DirQueue {
    fn poll(&mut self) -> Result<Option<QueuedJob>> {
        let id = match self.pending()?.into_iter().next() {
            Some(id) => id,
            None => return Ok(None),
        };

        // an unreadable job still goes through so it can be dropped
        let payload = match fs::read(self.job_path(&id)) {
            Ok(payload) => payload,
            Err(e) => {
                log::error!("cannot read job {}: {}", id, e);
                vec![]
            }
        };

        Ok(Some(QueuedJob { id, payload }))
    }

    fn complete(&mut self, id: &str) -> Result<()> {
        match fs::remove_file(self.job_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Serialize)]
struct ResultDocument<'a> {
    results: &'a [JudgeResult],
}

/// Result store keeping one `<id>.json` document per submission.
#[derive(Clone)]
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.into() })
    }

    pub fn document_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, JOB_SUFFIX))
    }
}

impl ResultSink for DirStore {
    fn publish(&mut self, id: &str, results: &[JudgeResult]) -> Result<()> {
        check_id(id)?;
        let body = serde_json::to_vec(&ResultDocument { results })?;
        write_atomically(&self.dir, &self.document_path(id), &body)
    }
}

/// Ids become file names.
pub fn check_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|f| f.is_ascii_alphanumeric() || f == '-' || f == '_' || f == '.');
    if valid {
        Ok(())
    } else {
        Err(Error::Argument(format!("invalid job id `{}`", id)))
    }
}

fn write_atomically(dir: &Path, path: &Path, body: &[u8]) -> Result<()> {
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(body)?;
    file.flush()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}
