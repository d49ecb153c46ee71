//! `tej`: trivial, extensible remote job submission over SSH.
//!
//! A user on a workstation submits a directory containing a shell script
//! to a remote POSIX host over SSH; the remote side installs a small
//! "runtime" (a bundle of shell scripts) into a user-chosen queue
//! directory, launches the job detached, tracks its status across
//! reconnections, and lets the client query status, fetch results, list,
//! kill, or delete jobs. A pluggable backend runtime executes the jobs
//! (a POSIX `default` using `nohup` and PID files, and a `pbs` runtime
//! using `qsub`). Multiple logical queues on one host are supported via
//! `tejdir:` link-file indirection.
//!
//! The hard engineering lives in the client-side [`RemoteQueue`]
//! controller together with the wire-compatible remote protocol it
//! maintains with the server-side runtime: SSH session management with
//! reconnection ([`session`]), shell-escaping and command invocation
//! ([`escape`]), the queue resolution algorithm over a chain of
//! indirection files ([`queue`]), protocol-version negotiation and
//! runtime auto-detection ([`runtime`]), idempotent runtime installation,
//! and the state machine of a job as observed across stateless SSH calls
//! returning structured exit codes ([`remote_queue`]).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn run() -> tej::Result<()> {
//! use tej::{Destination, RemoteQueue};
//!
//! let destination = Destination::parse("me@cluster.example.com")?;
//! let queue = RemoteQueue::connect(destination, "~/.tej".to_string()).await?;
//! let job_id = queue.submit(None, std::path::Path::new("./job"), "start.sh").await?;
//! println!("submitted {job_id}");
//! # Ok(()) }
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rustdoc::broken_intra_doc_links,
    rust_2018_idioms,
    unreachable_pub
)]

#[cfg(not(unix))]
compile_error!("This crate can only be used on unix");

pub mod cache;
pub mod config;
pub mod destination;
pub mod error;
pub mod escape;
pub mod job;
pub mod logging;
pub mod queue;
pub mod remote_queue;
pub mod runtime;
pub mod session;

pub use destination::Destination;
pub use error::{Error, Result};
pub use job::JobId;
pub use remote_queue::{DownloadTarget, JobRecord, JobStatus, RemoteQueue};
pub use runtime::{Runtime, SetupOptions};
pub use session::Session;
