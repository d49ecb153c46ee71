//! SSH session manager (C3).
//!
//! Grounded in the teacher crate's `process_impl` subsystem: a single
//! `ssh -M -f -N` control master is launched once per [`Session`] into a
//! `tempfile`-owned socket directory, and every subsequent command or file
//! transfer spawns a short-lived `ssh`/`scp` subprocess that reuses that
//! multiplexed connection (`-S <ctl>`). Unlike the teacher, `tej` doesn't
//! need a general-purpose `Command`/`RemoteChild` builder: its wire
//! contract is just "run one shell command, get back an exit code and
//! captured stdout" plus two file-transfer primitives, so that's the
//! whole surface here.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command as ProcessCommand;
use tokio::sync::Mutex;

use crate::destination::Destination;
use crate::error::{Error, Result};
use crate::escape::shell_escape;
use crate::queue::{Probe, ProbeAnswer};

struct ControlMaster {
    // Kept alive for as long as the control socket should exist; dropping
    // it removes the temporary directory.
    _dir: TempDir,
    ctl_path: std::path::PathBuf,
}

/// A single SSH session to a remote host, backed by an OpenSSH
/// `ControlMaster` connection.
///
/// Every [`run`](Session::run), [`scp_put`](Session::scp_put), and
/// [`scp_get`](Session::scp_get) call is independent — `tej`'s protocol is
/// a sequence of stateless round-trips — but they all reuse the one
/// multiplexed connection established by [`Session::connect`].
pub struct Session {
    destination: Destination,
    master: Mutex<ControlMaster>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("destination", &self.destination.format())
            .finish()
    }
}

fn target_arg(destination: &Destination) -> String {
    format!("{}@{}", destination.username, destination.hostname)
}

impl Session {
    /// Connect to `destination`, rejecting unknown host keys (spec §4.3:
    /// "never auto-accept"). This performs the controller's one eager
    /// connect.
    pub async fn connect(destination: Destination) -> Result<Self> {
        let master = Mutex::new(launch_master(&destination).await?);
        Ok(Session { destination, master })
    }

    /// The destination this session is connected to.
    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Probe the existing transport; if it has gone stale, close and
    /// reconnect transparently.
    async fn ensure_connected(&self) -> Result<()> {
        let mut master = self.master.lock().await;
        let alive = {
            let check = new_ssh_base(&self.destination, &master.ctl_path)
                .args(["-O", "check"])
                .output()
                .await
                .map_err(|e| connect_error(&self.destination, e))?;
            check.status.success()
        };
        if !alive {
            *master = launch_master(&self.destination).await?;
        }
        Ok(())
    }

    /// Run `cmd` through `/bin/sh -c` on the remote host. Returns the
    /// exit code and, if `capture_stdout`, the captured stdout with a
    /// trailing `\r\n` (or `\n`) stripped. Stderr is decoded as UTF-8
    /// (with replacement) and forwarded to the `tej::server` tracing
    /// target at `INFO`, never mixed with stdout.
    pub async fn run(&self, cmd: &str, capture_stdout: bool) -> Result<(i32, Vec<u8>)> {
        self.ensure_connected().await?;
        let master = self.master.lock().await;

        let escaped = shell_escape(cmd);
        let remote_cmd = format!("/bin/sh -c {escaped}");

        let mut command = new_ssh_base(&self.destination, &master.ctl_path);
        command.arg("--").arg(&remote_cmd);
        command.stdin(Stdio::null());

        let output = command.output().await.map_err(Error::Io)?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stderr = stderr.trim_end_matches(['\r', '\n']);
        if !stderr.is_empty() {
            tracing::info!(target: "tej::server", "{stderr}");
        }

        let code = output.status.code().unwrap_or(-1);

        let stdout = if capture_stdout {
            let mut bytes = output.stdout;
            strip_trailing_newline(&mut bytes);
            bytes
        } else {
            Vec::new()
        };

        Ok((code, stdout))
    }

    /// Run `cmd` and raise [`Error::RemoteCommandFailure`] on a non-zero
    /// exit code instead of returning the raw tuple, for callers that
    /// treat any non-zero exit as fatal.
    pub async fn check_output(&self, cmd: &str) -> Result<Vec<u8>> {
        let (code, stdout) = self.run(cmd, true).await?;
        if code != 0 {
            return Err(Error::remote_failure(cmd, code));
        }
        Ok(stdout)
    }

    /// Upload `local` to `remote` over the multiplexed connection.
    pub async fn scp_put(&self, local: &Path, remote: &str, recursive: bool) -> Result<()> {
        self.ensure_connected().await?;
        let master = self.master.lock().await;
        let remote_arg = format!("{}:{}", target_arg(&self.destination), remote);
        run_scp(&self.destination, &master.ctl_path, local, &remote_arg, recursive, true).await
    }

    /// Download `remote` to `local` over the multiplexed connection.
    pub async fn scp_get(&self, remote: &str, local: &Path, recursive: bool) -> Result<()> {
        self.ensure_connected().await?;
        let master = self.master.lock().await;
        let remote_arg = format!("{}:{}", target_arg(&self.destination), remote);
        run_scp(&self.destination, &master.ctl_path, local, &remote_arg, recursive, false).await
    }

    /// Tear down the control connection.
    pub async fn close(self) -> Result<()> {
        let master = self.master.into_inner();
        let _ = new_ssh_base(&self.destination, &master.ctl_path)
            .args(["-O", "exit"])
            .output()
            .await;
        Ok(())
    }
}

#[async_trait]
impl Probe for Session {
    async fn probe(&self, path: &str) -> Result<ProbeAnswer> {
        let escaped = shell_escape(path);
        let cmd = format!(
            "if [ -d {escaped} ]; then printf 'dir\\n'; cat {escaped}/version; \
             (cd {escaped} && pwd); elif [ -f {escaped} ]; then cat {escaped}; \
             else printf 'no\\n'; fi"
        );
        let (code, stdout) = self.run(&cmd, true).await?;
        if code != 0 {
            return Err(Error::remote_failure(format!("probe {path}"), code));
        }
        let text = String::from_utf8_lossy(&stdout);
        let mut lines = text.lines();
        match lines.next() {
            Some("no") | None => Ok(ProbeAnswer::Missing),
            Some("dir") => {
                let version = lines.next().unwrap_or_default().to_string();
                let runtime = lines.next().unwrap_or_default().to_string();
                let absolute_path = lines.next().unwrap_or_default().to_string();
                Ok(ProbeAnswer::Dir {
                    version,
                    runtime,
                    absolute_path,
                })
            }
            Some(_) => Ok(ProbeAnswer::File(text.into_owned())),
        }
    }
}

fn strip_trailing_newline(bytes: &mut Vec<u8>) {
    if bytes.ends_with(b"\r\n") {
        bytes.truncate(bytes.len() - 2);
    } else if bytes.ends_with(b"\n") {
        bytes.truncate(bytes.len() - 1);
    }
}

fn connect_error(destination: &Destination, source: std::io::Error) -> Error {
    Error::Connect {
        destination: destination.format(),
        source,
    }
}

fn new_ssh_base(destination: &Destination, ctl_path: &Path) -> ProcessCommand {
    let mut cmd = ProcessCommand::new("ssh");
    cmd.stdin(Stdio::null())
        .arg("-S")
        .arg(ctl_path)
        .arg("-o")
        .arg("BatchMode=yes")
        .arg(target_arg(destination));
    cmd
}

async fn launch_master(destination: &Destination) -> Result<ControlMaster> {
    let dir = tempfile::Builder::new()
        .prefix(".tej-ssh-")
        .tempdir()
        .map_err(Error::Io)?;
    let ctl_path = dir.path().join("master");
    let log_path = dir.path().join("log");

    let mut init = ProcessCommand::new("ssh");
    init.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .arg("-E")
        .arg(&log_path)
        .arg("-S")
        .arg(&ctl_path)
        .arg("-M")
        .arg("-f")
        .arg("-N")
        .arg("-o")
        .arg("ControlPersist=yes")
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg("StrictHostKeyChecking=yes");

    if let Some(port) = destination.port {
        init.arg("-p").arg(port.to_string());
    }

    init.arg(target_arg(destination));

    let status = init
        .status()
        .await
        .map_err(|e| connect_error(destination, e))?;

    if !status.success() {
        let log = tokio::fs::read_to_string(&log_path)
            .await
            .unwrap_or_default();
        return Err(connect_error(
            destination,
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, log.trim().to_string()),
        ));
    }

    Ok(ControlMaster { _dir: dir, ctl_path })
}

async fn run_scp(
    destination: &Destination,
    ctl_path: &Path,
    local: &Path,
    remote_arg: &str,
    recursive: bool,
    upload: bool,
) -> Result<()> {
    let mut cmd = ProcessCommand::new("scp");
    cmd.stdin(Stdio::null())
        .arg("-o")
        .arg(format!("ControlPath={}", ctl_path.display()))
        .arg("-o")
        .arg("BatchMode=yes")
        .arg("-o")
        .arg("StrictHostKeyChecking=yes");

    if let Some(port) = destination.port {
        cmd.arg("-P").arg(port.to_string());
    }
    if recursive {
        cmd.arg("-r");
    }

    if upload {
        cmd.arg(local_arg(local)).arg(remote_arg);
    } else {
        cmd.arg(remote_arg).arg(local_arg(local));
    }

    let output = cmd.output().await.map_err(Error::Io)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Transfer(stderr.trim().to_string()));
    }
    Ok(())
}

fn local_arg(path: &Path) -> &OsStr {
    path.as_os_str()
}
