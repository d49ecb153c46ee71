//! Job operations (C6): `submit`, `status`, `download`, `kill`, `delete`,
//! `list`, built atop the session manager (C3), queue resolver (C4), and
//! runtime installer (C5) using the wire contract of `spec.md` §4.6. Each
//! operation resolves the queue (installing it on `submit` if absent) and
//! invokes the corresponding remote command script; the script's exit
//! code is the primary channel, its stdout the secondary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::destination::Destination;
use crate::error::{Error, Result};
use crate::escape::{escape_queue, shell_escape};
use crate::job::JobId;
use crate::queue::{self, ResolvedQueue};
use crate::runtime::{self, Runtime, SetupOptions};
use crate::session::Session;

/// The state a job is observed to be in when queried with [`RemoteQueue::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// The job is still running.
    Running,
    /// The job has finished, with this exit code.
    Finished {
        /// The job script's exit code.
        exit_code: i32,
    },
}

/// One `list` record: a job id plus its `key: value` attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    /// The job's identifier.
    pub job_id: String,
    /// Attributes reported by `commands/list`, in file order.
    pub fields: BTreeMap<String, String>,
}

/// Where a downloaded file should land, mirroring `spec.md` §4.6's
/// `download`: exactly one of `Destination` (one file, one local path) or
/// `Directory` (any number of files, placed under the directory by
/// basename) must be used.
#[derive(Debug, Clone)]
pub enum DownloadTarget {
    /// Place a single downloaded file at this exact local path.
    Destination(PathBuf),
    /// Place each downloaded file under this directory, by basename.
    Directory(PathBuf),
}

/// A controller for one queue on one remote host. Owns a single SSH
/// session (§5: "not safe for concurrent use"); callers that want
/// parallelism construct independent instances, or go through
/// [`crate::cache`].
#[derive(Debug)]
pub struct RemoteQueue {
    session: Session,
    queue_path: String,
}

impl RemoteQueue {
    /// Connect to `destination` and bind to `queue_path`, without
    /// resolving it yet — resolution happens lazily on first use.
    pub async fn connect(destination: Destination, queue_path: String) -> Result<Self> {
        let session = Session::connect(destination).await?;
        Ok(RemoteQueue { session, queue_path })
    }

    /// The destination this controller is connected to.
    pub fn destination(&self) -> &Destination {
        self.session.destination()
    }

    /// The queue pathname this controller was bound to (as given, not
    /// necessarily resolved).
    pub fn queue_path(&self) -> &str {
        &self.queue_path
    }

    async fn resolved(&self, acceptable_runtimes: &[Runtime]) -> Result<ResolvedQueue> {
        queue::get_queue(&self.session, &self.queue_path, acceptable_runtimes).await
    }

    async fn command(&self, queue: &ResolvedQueue, script: &str, args: &[&str]) -> Result<(i32, Vec<u8>)> {
        let mut cmd = format!("/bin/sh {}/commands/{}", shell_escape(&queue.path), script);
        for arg in args {
            cmd.push(' ');
            cmd.push_str(&shell_escape(arg));
        }
        self.session.run(&cmd, true).await
    }

    /// Upload every entry of `directory` *into* `remote_dir`, which
    /// `commands/new_job` has already created. Uploading `directory`
    /// itself with `scp -r` would land the files one level too deep
    /// (`scp` nests an existing destination directory), so each entry is
    /// transferred individually instead, the way [`runtime::setup`]'s
    /// bundle upload already does.
    async fn upload_directory_contents(&self, directory: &Path, remote_dir: &str) -> Result<()> {
        for entry in std::fs::read_dir(directory).map_err(Error::Io)? {
            let entry = entry.map_err(Error::Io)?;
            let name = entry.file_name();
            let name = name.to_str().ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "{} has a non-UTF-8 name",
                    entry.path().display()
                ))
            })?;
            let is_dir = entry.file_type().map_err(Error::Io)?.is_dir();
            let remote_entry = format!("{remote_dir}/{name}");
            self.session
                .scp_put(&entry.path(), &remote_entry, is_dir)
                .await?;
        }
        Ok(())
    }

    /// Install the default runtime at this controller's queue path, the
    /// way `submit` does when the queue doesn't exist yet.
    pub async fn setup(&self, opts: &SetupOptions) -> Result<Option<ResolvedQueue>> {
        runtime::setup(&self.session, &self.queue_path, opts).await
    }

    /// `submit(job_id_or_nil, directory, script)`: upload `directory`'s
    /// contents as a new job and launch it. Returns the (possibly
    /// synthesized) job id.
    pub async fn submit(
        &self,
        job_id: Option<&str>,
        directory: &Path,
        script: &str,
    ) -> Result<JobId> {
        let job_id = match job_id {
            Some(id) => JobId::validate(id)?,
            None => {
                let basename = directory
                    .file_name()
                    .and_then(|n| n.to_str())
                    .ok_or_else(|| {
                        Error::InvalidArgument(format!(
                            "{} has no usable basename",
                            directory.display()
                        ))
                    })?;
                JobId::synthesize(basename, &whoami::username())
            }
        };

        let queue = match self.resolved(&[]).await {
            Ok(queue) => queue,
            Err(Error::QueueDoesntExist) => self
                .setup(&SetupOptions {
                    runtime: Some(Runtime::Default),
                    ..SetupOptions::default()
                })
                .await?
                .expect("setup without only_links always resolves a queue"),
            Err(other) => return Err(other),
        };

        let (code, stdout) = self.command(&queue, "new_job", &[job_id.as_str()]).await?;
        let remote_dir = match code {
            0 => String::from_utf8_lossy(&stdout).trim().to_string(),
            4 => return Err(Error::JobAlreadyExists),
            _ => return Err(Error::JobNotFound),
        };

        if let Err(err) = self.upload_directory_contents(directory, &remote_dir).await {
            let _ = self.delete(&job_id).await;
            return Err(err);
        }

        if let Err(err) = self
            .command(&queue, "submit", &[job_id.as_str(), &remote_dir, script])
            .await
            .and_then(|(code, _)| {
                if code == 0 {
                    Ok(())
                } else {
                    Err(Error::remote_failure(
                        format!("commands/submit {} {} {}", job_id, remote_dir, script),
                        code,
                    ))
                }
            })
        {
            let _ = self.delete(&job_id).await;
            return Err(err);
        }

        Ok(job_id)
    }

    /// `status(job_id)`: query a job's lifecycle state and server-side
    /// working directory.
    pub async fn status(&self, job_id: &JobId) -> Result<(JobStatus, String)> {
        let queue = self.resolved(&[]).await?;
        let (code, stdout) = self.command(&queue, "status", &[job_id.as_str()]).await?;
        let text = String::from_utf8_lossy(&stdout);
        let mut lines = text.lines();
        match code {
            0 => {
                let directory = lines.next().unwrap_or_default().to_string();
                let exit_code: i32 = lines
                    .next()
                    .and_then(|l| l.trim().parse().ok())
                    .ok_or_else(|| Error::remote_failure("commands/status", code))?;
                Ok((JobStatus::Finished { exit_code }, directory))
            }
            2 => {
                let directory = lines.next().unwrap_or_default().to_string();
                Ok((JobStatus::Running, directory))
            }
            3 => Err(Error::JobNotFound),
            _ => Err(Error::remote_failure(
                format!("commands/status {job_id}"),
                code,
            )),
        }
    }

    /// `download(job_id, files, destination)`: fetch one or more files
    /// out of a job's working directory.
    pub async fn download(
        &self,
        job_id: &JobId,
        files: &[String],
        destination: DownloadTarget,
    ) -> Result<()> {
        if let DownloadTarget::Destination(_) = &destination {
            if files.len() != 1 {
                return Err(Error::InvalidArgument(
                    "destination mode requires exactly one file".to_string(),
                ));
            }
        }

        let (_, directory) = self.status(job_id).await?;

        for file in files {
            let remote_path = format!("{directory}/{file}");
            let local_path = match &destination {
                DownloadTarget::Destination(path) => path.clone(),
                DownloadTarget::Directory(dir) => {
                    let basename = Path::new(file).file_name().ok_or_else(|| {
                        Error::InvalidArgument(format!("{file} has no usable basename"))
                    })?;
                    dir.join(basename)
                }
            };
            self.session.scp_get(&remote_path, &local_path, true).await?;
        }
        Ok(())
    }

    /// `kill(job_id)`: request termination of a running job. A no-op
    /// success on an already-finished job.
    pub async fn kill(&self, job_id: &JobId) -> Result<()> {
        let queue = self.resolved(&[]).await?;
        let (code, _) = self.command(&queue, "kill", &[job_id.as_str()]).await?;
        match code {
            0 => Ok(()),
            3 => Err(Error::JobNotFound),
            _ => Err(Error::remote_failure(format!("commands/kill {job_id}"), code)),
        }
    }

    /// `delete(job_id)`: remove a finished job's bookkeeping and
    /// uploaded files.
    pub async fn delete(&self, job_id: &JobId) -> Result<()> {
        let queue = self.resolved(&[]).await?;
        let (code, _) = self.command(&queue, "delete", &[job_id.as_str()]).await?;
        match code {
            0 => Ok(()),
            2 => Err(Error::JobStillRunning),
            3 => Err(Error::JobNotFound),
            _ => Err(Error::remote_failure(
                format!("commands/delete {job_id}"),
                code,
            )),
        }
    }

    /// `list()`: enumerate every job known to the queue.
    pub async fn list(&self) -> Result<Vec<JobRecord>> {
        let queue = self.resolved(&[]).await?;
        let (code, stdout) = self.command(&queue, "list", &[]).await?;
        if code != 0 {
            return Err(Error::remote_failure("commands/list", code));
        }
        Ok(parse_list_output(&String::from_utf8_lossy(&stdout)))
    }

    /// The underlying queue pathname, escaped for use as a shell word
    /// preserving a `~/` prefix. Exposed for callers building their own
    /// diagnostic commands against this queue.
    pub fn escaped_queue_path(&self) -> std::borrow::Cow<'_, str> {
        escape_queue(&self.queue_path)
    }

    /// Tear down the underlying SSH session.
    pub async fn close(self) -> Result<()> {
        self.session.close().await
    }
}

/// Parse `commands/list`'s output grammar: zero or more records, each a
/// leading job-id line followed by zero or more indented `    key: value`
/// continuation lines.
fn parse_list_output(text: &str) -> Vec<JobRecord> {
    let mut records = Vec::new();
    let mut current: Option<JobRecord> = None;

    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("    ") {
            if let Some(record) = current.as_mut() {
                if let Some((key, value)) = rest.split_once(": ") {
                    record.fields.insert(key.to_string(), value.to_string());
                }
            }
        } else if !line.is_empty() {
            if let Some(record) = current.take() {
                records.push(record);
            }
            current = Some(JobRecord {
                job_id: line.to_string(),
                fields: BTreeMap::new(),
            });
        }
    }
    if let Some(record) = current.take() {
        records.push(record);
    }
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_list_grammar() {
        let text = "job1\n    status: finished\n    exit_code: 0\njob2\n    status: running\n";
        let records = parse_list_output(text);

        let mut job1_fields = BTreeMap::new();
        job1_fields.insert("status".to_string(), "finished".to_string());
        job1_fields.insert("exit_code".to_string(), "0".to_string());

        let mut job2_fields = BTreeMap::new();
        job2_fields.insert("status".to_string(), "running".to_string());

        assert_eq!(
            records,
            vec![
                JobRecord {
                    job_id: "job1".to_string(),
                    fields: job1_fields,
                },
                JobRecord {
                    job_id: "job2".to_string(),
                    fields: job2_fields,
                },
            ]
        );
    }

    #[test]
    fn parses_empty_list() {
        assert!(parse_list_output("").is_empty());
    }
}
