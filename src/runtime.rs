//! Runtime installer (C5).
//!
//! A "runtime" is a named bundle of POSIX shell scripts implementing the
//! wire contract described by `commands/{new_job,submit,status,kill,delete,
//! list,setup}` and `commands/lib/utils.sh`. Both bundles this crate ships
//! (`default`, `pbs`) are embedded into the compiled binary with
//! `include_dir!`, the same way the rest of the retrieval pack bundles
//! static asset trees into a CLI binary, and installed onto the remote
//! host with `Session::scp_put`.

use std::path::Path;

use include_dir::{include_dir, Dir};

use crate::error::{Error, Result};
use crate::escape::shell_escape;
use crate::queue::{self, ResolvedQueue, PROTOCOL_VERSION};
use crate::session::Session;

static DEFAULT_BUNDLE: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/runtime/default");
static PBS_BUNDLE: Dir<'_> = include_dir!("$CARGO_MANIFEST_DIR/runtime/pbs");

/// The server-side backend a queue uses to actually run jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Runtime {
    /// POSIX-only backend: `nohup`, PID files, and signals.
    #[clap(name = "default")]
    Default,
    /// Backend that shells out to `qsub`/`qstat`/`qdel`.
    #[clap(name = "pbs")]
    Pbs,
}

impl Runtime {
    /// Parse the runtime marker from a queue's `version` file or the
    /// `--runtime` CLI flag.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Runtime::Default),
            "pbs" => Some(Runtime::Pbs),
            _ => None,
        }
    }

    fn bundle(&self) -> &'static Dir<'static> {
        match self {
            Runtime::Default => &DEFAULT_BUNDLE,
            Runtime::Pbs => &PBS_BUNDLE,
        }
    }
}

impl std::fmt::Display for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Runtime::Default => "default",
            Runtime::Pbs => "pbs",
        })
    }
}

/// Options controlling [`setup`], mirroring the `tej setup` CLI flags.
#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Overwrite an existing queue instead of failing.
    pub force: bool,
    /// Only (re)write link files; never touch the queue itself.
    pub only_links: bool,
    /// Force a specific runtime instead of auto-detecting one.
    pub runtime: Option<Runtime>,
    /// Pathnames to write `tejdir:` link files at, pointing to the queue.
    pub links: Vec<String>,
    /// Runtimes this call will tolerate when adopting an existing queue.
    pub acceptable_runtimes: Vec<Runtime>,
}

/// Install (or relink) a queue at `queue_path` on `session`, per
/// `spec.md` §4.5.
pub async fn setup(
    session: &Session,
    queue_path: &str,
    opts: &SetupOptions,
) -> Result<Option<ResolvedQueue>> {
    if opts.only_links {
        for link in &opts.links {
            write_link_file(session, link, queue_path).await?;
        }
        return Ok(None);
    }

    if opts.force {
        // `force` recovers from anything that already exists, including
        // an incompatible protocol version or a disallowed runtime
        // (`spec.md` §7: "caller passes force, or aligns version") --
        // `resolve_any` finds the queue to remove without enforcing that
        // gate.
        match queue::resolve_any(session, queue_path).await {
            Ok(Some(existing)) => remove_existing(session, &existing.path).await?,
            Ok(None) => {}
            Err(Error::QueueLinkBroken) => {
                // The endpoint is unreachable, but the link file itself
                // still needs clearing; best-effort remove the link root.
                remove_existing(session, queue_path).await?;
            }
            Err(other) => return Err(other),
        }
    } else {
        match queue::resolve(session, queue_path, &opts.acceptable_runtimes).await {
            Ok(Some(existing)) => {
                let reason = if existing.path == queue_path {
                    format!("queue already exists at {}", existing.path)
                } else {
                    format!(
                        "{} already resolves to an existing queue at {}",
                        queue_path, existing.path
                    )
                };
                return Err(Error::QueueExists(reason));
            }
            Ok(None) => {}
            Err(Error::QueueLinkBroken) => {
                return Err(Error::QueueExists(format!(
                    "{queue_path} is a link chain, but it is broken"
                )));
            }
            Err(other) => return Err(other),
        }
    }

    let absolute_path = expand_to_absolute(session, queue_path).await?;

    let runtime = match opts.runtime {
        Some(runtime) => runtime,
        None => detect_runtime(session).await?,
    };
    if !opts.acceptable_runtimes.is_empty() && !opts.acceptable_runtimes.contains(&runtime) {
        return Err(Error::QueueExists(format!(
            "detected runtime {runtime} is not in the accepted list"
        )));
    }

    upload_bundle(session, runtime.bundle(), &absolute_path).await?;
    run_setup_script(session, &absolute_path).await?;

    for link in &opts.links {
        write_link_file(session, link, &absolute_path).await?;
    }

    Ok(Some(ResolvedQueue {
        path: absolute_path,
        version: PROTOCOL_VERSION,
        runtime,
    }))
}

async fn run_setup_script(session: &Session, absolute_path: &str) -> Result<()> {
    let script = format!("{absolute_path}/commands/setup");
    session
        .check_output(&format!("/bin/sh {}", shell_escape(&script)))
        .await
        .map(|_| ())
}

async fn remove_existing(session: &Session, path: &str) -> Result<()> {
    session
        .check_output(&format!("rm -Rf {}", shell_escape(path)))
        .await
        .map(|_| ())
}

async fn expand_to_absolute(session: &Session, queue_path: &str) -> Result<String> {
    let escaped = shell_escape(queue_path);
    let cmd = format!("mkdir -p {escaped} && cd {escaped} && pwd");
    let stdout = session.check_output(&cmd).await?;
    let text = String::from_utf8_lossy(&stdout);
    let path = text.lines().next().unwrap_or_default().trim();
    if path.is_empty() {
        return Err(Error::remote_failure(cmd, 255));
    }
    Ok(path.to_string())
}

async fn detect_runtime(session: &Session) -> Result<Runtime> {
    let (code, _) = session.run("which qsub >/dev/null 2>&1", false).await?;
    Ok(if code == 0 { Runtime::Pbs } else { Runtime::Default })
}

async fn write_link_file(session: &Session, link_path: &str, target: &str) -> Result<()> {
    let cmd = format!(
        "printf 'tejdir: %s\\n' {} > {}",
        shell_escape(target),
        shell_escape(link_path)
    );
    session.check_output(&cmd).await.map(|_| ())
}

async fn upload_bundle(session: &Session, bundle: &Dir<'_>, remote_queue_path: &str) -> Result<()> {
    let local = tempfile::Builder::new()
        .prefix(".tej-bundle-")
        .tempdir()
        .map_err(Error::Io)?;
    materialize(bundle, local.path())?;

    for entry in bundle.entries() {
        let name = entry
            .path()
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidArgument("malformed runtime bundle entry".to_string()))?;
        let local_entry = local.path().join(name);
        let remote_entry = format!("{remote_queue_path}/{name}");
        session
            .scp_put(&local_entry, &remote_entry, entry.as_dir().is_some())
            .await?;
    }
    Ok(())
}

fn materialize(dir: &Dir<'_>, target: &Path) -> Result<()> {
    std::fs::create_dir_all(target).map_err(Error::Io)?;
    for entry in dir.entries() {
        match entry {
            include_dir::DirEntry::Dir(sub) => {
                let sub_target = target.join(sub.path().file_name().unwrap());
                materialize(sub, &sub_target)?;
            }
            include_dir::DirEntry::File(file) => {
                let file_target = target.join(file.path().file_name().unwrap());
                std::fs::write(&file_target, file.contents()).map_err(Error::Io)?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    let mut perms = std::fs::metadata(&file_target)
                        .map_err(Error::Io)?
                        .permissions();
                    perms.set_mode(0o755);
                    std::fs::set_permissions(&file_target, perms).map_err(Error::Io)?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_runtimes() {
        assert_eq!(Runtime::parse("default"), Some(Runtime::Default));
        assert_eq!(Runtime::parse("pbs"), Some(Runtime::Pbs));
        assert_eq!(Runtime::parse("bogus"), None);
    }

    #[test]
    fn displays_as_marker_string() {
        assert_eq!(Runtime::Default.to_string(), "default");
        assert_eq!(Runtime::Pbs.to_string(), "pbs");
    }
}
