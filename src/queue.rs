//! Queue resolver (C4).
//!
//! Resolves a queue pathname through a chain of `tejdir:` link files to a
//! real directory, validating the protocol version and runtime along the
//! way. The three-way probe described in `spec.md` §4.4 is expressed here
//! as a small [`Probe`] trait so the link-chain algorithm itself can be
//! unit-tested against a fake responder, independent of an actual SSH
//! session.

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::runtime::Runtime;

/// The protocol version this client speaks. A queue whose `version` file
/// names a different `(major, minor)` is treated as incompatible.
pub const PROTOCOL_VERSION: (u32, u32) = (0, 2);

/// A link chain longer than this is treated as a cycle.
pub const MAX_LINK_DEPTH: u32 = 32;

/// One hop's worth of information from the server-side probe script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeAnswer {
    /// The path is a directory: its `version` file's two lines, and its
    /// absolute path.
    Dir {
        /// Dotted `MAJOR.MINOR` as read from the first line of `version`.
        version: String,
        /// The runtime marker from `version`'s second line.
        runtime: String,
        /// The absolute path to the directory.
        absolute_path: String,
    },
    /// The path is a regular file; these are its contents.
    File(String),
    /// The path does not exist.
    Missing,
}

/// Anything that can answer the single-hop queue probe. Implemented by
/// [`crate::session::Session`] for real use, and by an in-memory fake in
/// tests.
#[async_trait]
pub trait Probe {
    /// Probe `path` (already resolved relative to whatever directory the
    /// previous hop's link file lived in, or the SSH session's home
    /// directory on the first hop).
    async fn probe(&self, path: &str) -> Result<ProbeAnswer>;
}

/// The parent directory of a link file's own path, used to resolve a
/// `tejdir:` link target that isn't itself absolute or `~`-rooted. This is
/// plain path arithmetic on the string the caller already has, not a
/// remote round-trip: a link's target is always relative to the link
/// file's own (already-known) location.
fn parent_of(path: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) if !parent.is_empty() => parent.to_string(),
        Some(_) => "/".to_string(),
        None => ".".to_string(),
    }
}

/// The outcome of fully resolving a queue pathname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedQueue {
    /// The absolute path of the real queue directory.
    pub path: String,
    /// The queue's protocol version, already checked for compatibility.
    pub version: (u32, u32),
    /// The queue's runtime.
    pub runtime: Runtime,
}

fn parse_version(s: &str) -> Option<(u32, u32)> {
    let (major, minor) = s.trim().split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Resolve `queue_path` through any chain of `tejdir:` links.
///
/// Returns `Ok(Some(resolved))` if a real queue directory was found,
/// `Ok(None)` if nothing exists at `queue_path` at all (depth 0 `no`), or
/// an error for a broken link chain, an incompatible version, a
/// disallowed runtime, or a chain longer than [`MAX_LINK_DEPTH`].
///
/// `acceptable_runtimes`, when non-empty, constrains which runtimes are
/// tolerated when adopting an existing queue.
pub async fn resolve<P: Probe + ?Sized>(
    probe: &P,
    queue_path: &str,
    acceptable_runtimes: &[Runtime],
) -> Result<Option<ResolvedQueue>> {
    resolve_inner(probe, queue_path, acceptable_runtimes, true).await
}

/// Like [`resolve`], but does not enforce the protocol-version or
/// runtime compatibility gate: a `Dir` answer is always returned as a
/// resolved queue, whatever its `version` file says. Used by `setup
/// --force` (`spec.md` §4.5/§7: "caller passes force" is the recovery
/// for an otherwise-incompatible `QueueExists`), which needs to *find*
/// an existing queue in order to remove it, not validate it.
pub(crate) async fn resolve_any<P: Probe + ?Sized>(
    probe: &P,
    queue_path: &str,
) -> Result<Option<ResolvedQueue>> {
    resolve_inner(probe, queue_path, &[], false).await
}

async fn resolve_inner<P: Probe + ?Sized>(
    probe: &P,
    queue_path: &str,
    acceptable_runtimes: &[Runtime],
    enforce_compat: bool,
) -> Result<Option<ResolvedQueue>> {
    let mut current = queue_path.to_string();
    let mut depth = 0u32;

    loop {
        if depth > MAX_LINK_DEPTH {
            return Err(Error::remote_failure(
                format!("resolve queue {queue_path}"),
                255,
            ));
        }

        match probe.probe(&current).await? {
            ProbeAnswer::Missing => {
                return if depth == 0 {
                    Ok(None)
                } else {
                    Err(Error::QueueLinkBroken)
                };
            }
            ProbeAnswer::Dir {
                version,
                runtime,
                absolute_path,
            } => {
                if !enforce_compat {
                    let version = parse_version(&version).unwrap_or(PROTOCOL_VERSION);
                    let runtime = Runtime::parse(runtime.trim()).unwrap_or(Runtime::Default);
                    return Ok(Some(ResolvedQueue {
                        path: absolute_path,
                        version,
                        runtime,
                    }));
                }
                let parsed_version = parse_version(&version).ok_or_else(|| {
                    Error::remote_failure(format!("read {current}/version"), 255)
                })?;
                if parsed_version != PROTOCOL_VERSION {
                    return Err(Error::QueueExists(format!(
                        "queue at {absolute_path} uses protocol version {}.{}, \
                         but this client speaks {}.{}",
                        parsed_version.0, parsed_version.1, PROTOCOL_VERSION.0, PROTOCOL_VERSION.1
                    )));
                }
                let runtime = Runtime::parse(runtime.trim()).ok_or_else(|| {
                    Error::remote_failure(format!("read {current}/version"), 255)
                })?;
                if !acceptable_runtimes.is_empty() && !acceptable_runtimes.contains(&runtime) {
                    return Err(Error::QueueExists(format!(
                        "queue at {absolute_path} uses runtime {runtime}, which is not \
                         in the accepted list"
                    )));
                }
                return Ok(Some(ResolvedQueue {
                    path: absolute_path,
                    version: parsed_version,
                    runtime,
                }));
            }
            ProbeAnswer::File(contents) => {
                let target = contents
                    .lines()
                    .next()
                    .and_then(|l| l.strip_prefix("tejdir: "))
                    .ok_or_else(|| Error::remote_failure(format!("read link {current}"), 255))?;
                let target = if target.starts_with('/') || target.starts_with('~') {
                    target.to_string()
                } else {
                    format!("{}/{}", parent_of(&current), target)
                };
                current = target;
                depth += 1;
            }
        }
    }
}

/// Like [`resolve`], but turns "nothing at all" into [`Error::QueueDoesntExist`]
/// rather than `Ok(None)`. Matches `get_queue`'s convenience wrapper in
/// `spec.md` §4.4.
pub async fn get_queue<P: Probe + ?Sized>(
    probe: &P,
    queue_path: &str,
    acceptable_runtimes: &[Runtime],
) -> Result<ResolvedQueue> {
    resolve(probe, queue_path, acceptable_runtimes)
        .await?
        .ok_or(Error::QueueDoesntExist)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// An in-memory stand-in for a queue resolver that never touches the
    /// network, so the link-chain algorithm can be tested in isolation.
    struct FakeProbe {
        answers: HashMap<String, ProbeAnswer>,
        calls: Mutex<u32>,
    }

    #[async_trait]
    impl Probe for FakeProbe {
        async fn probe(&self, path: &str) -> Result<ProbeAnswer> {
            *self.calls.lock().unwrap() += 1;
            Ok(self.answers.get(path).cloned().unwrap_or(ProbeAnswer::Missing))
        }
    }

    fn dir_answer(path: &str) -> ProbeAnswer {
        ProbeAnswer::Dir {
            version: "0.2".into(),
            runtime: "default".into(),
            absolute_path: path.into(),
        }
    }

    #[tokio::test]
    async fn missing_at_depth_zero_is_none() {
        let probe = FakeProbe {
            answers: HashMap::new(),
            calls: Mutex::new(0),
        };
        let resolved = resolve(&probe, "~/.tej", &[]).await.unwrap();
        assert!(resolved.is_none());
    }

    #[tokio::test]
    async fn direct_directory_resolves() {
        let mut answers = HashMap::new();
        answers.insert("~/.tej".to_string(), dir_answer("/home/me/.tej"));
        let probe = FakeProbe {
            answers,
            calls: Mutex::new(0),
        };
        let resolved = resolve(&probe, "~/.tej", &[]).await.unwrap().unwrap();
        assert_eq!(resolved.path, "/home/me/.tej");
        assert_eq!(resolved.runtime, Runtime::Default);
    }

    #[tokio::test]
    async fn single_link_hop_resolves() {
        let mut answers = HashMap::new();
        answers.insert(
            "~/link".to_string(),
            ProbeAnswer::File("tejdir: /home/me/.tej\n".into()),
        );
        answers.insert("/home/me/.tej".to_string(), dir_answer("/home/me/.tej"));
        let probe = FakeProbe {
            answers,
            calls: Mutex::new(0),
        };
        let resolved = resolve(&probe, "~/link", &[]).await.unwrap().unwrap();
        assert_eq!(resolved.path, "/home/me/.tej");
    }

    #[tokio::test]
    async fn broken_link_is_an_error() {
        let mut answers = HashMap::new();
        answers.insert(
            "~/link".to_string(),
            ProbeAnswer::File("tejdir: /home/me/gone\n".into()),
        );
        let probe = FakeProbe {
            answers,
            calls: Mutex::new(0),
        };
        let err = resolve(&probe, "~/link", &[]).await.unwrap_err();
        assert!(matches!(err, Error::QueueLinkBroken));
    }

    #[tokio::test]
    async fn version_mismatch_is_rejected() {
        let mut answers = HashMap::new();
        answers.insert(
            "~/.tej".to_string(),
            ProbeAnswer::Dir {
                version: "0.9".into(),
                runtime: "default".into(),
                absolute_path: "/home/me/.tej".into(),
            },
        );
        let probe = FakeProbe {
            answers,
            calls: Mutex::new(0),
        };
        let err = resolve(&probe, "~/.tej", &[]).await.unwrap_err();
        assert!(matches!(err, Error::QueueExists(_)));
    }

    #[tokio::test]
    async fn disallowed_runtime_is_rejected() {
        let mut answers = HashMap::new();
        answers.insert(
            "~/.tej".to_string(),
            ProbeAnswer::Dir {
                version: "0.2".into(),
                runtime: "pbs".into(),
                absolute_path: "/home/me/.tej".into(),
            },
        );
        let probe = FakeProbe {
            answers,
            calls: Mutex::new(0),
        };
        let err = resolve(&probe, "~/.tej", &[Runtime::Default])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QueueExists(_)));
    }

    #[tokio::test]
    async fn resolve_any_ignores_version_mismatch() {
        let mut answers = HashMap::new();
        answers.insert(
            "~/.tej".to_string(),
            ProbeAnswer::Dir {
                version: "0.9".into(),
                runtime: "pbs".into(),
                absolute_path: "/home/me/.tej".into(),
            },
        );
        let probe = FakeProbe {
            answers,
            calls: Mutex::new(0),
        };
        let resolved = resolve_any(&probe, "~/.tej").await.unwrap().unwrap();
        assert_eq!(resolved.path, "/home/me/.tej");
    }

    #[tokio::test]
    async fn cyclic_links_fail_with_remote_command_failure() {
        let mut answers = HashMap::new();
        answers.insert(
            "~/a".to_string(),
            ProbeAnswer::File("tejdir: /b\n".into()),
        );
        answers.insert("/b".to_string(), ProbeAnswer::File("tejdir: /a\n".into()));
        answers.insert("/a".to_string(), ProbeAnswer::File("tejdir: /b\n".into()));
        let probe = FakeProbe {
            answers,
            calls: Mutex::new(0),
        };
        let err = resolve(&probe, "~/a", &[]).await.unwrap_err();
        assert!(matches!(err, Error::RemoteCommandFailure { .. }));
    }

    #[tokio::test]
    async fn get_queue_turns_missing_into_queue_doesnt_exist() {
        let probe = FakeProbe {
            answers: HashMap::new(),
            calls: Mutex::new(0),
        };
        let err = get_queue(&probe, "~/.tej", &[]).await.unwrap_err();
        assert!(matches!(err, Error::QueueDoesntExist));
    }
}
