//! Error taxonomy for the `tej` client.
//!
//! Every fallible operation in this crate returns [`Error`]. Most variants
//! are plain leaves, but [`Error::QueueLinkBroken`] is conceptually a
//! refinement of "the queue doesn't exist", and [`Error::RemoteCommandFailure`]
//! signals an infrastructure failure rather than a modeled outcome.

use std::io;

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong when talking to a `tej` queue.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The destination string or record was malformed.
    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    /// The job identifier does not match the allowed alphabet.
    #[error("invalid job id: {0:?}")]
    InvalidJobId(String),

    /// An operation required an existing queue, but none was found.
    #[error("queue doesn't exist on the server")]
    QueueDoesntExist,

    /// The chain of `tejdir:` links is broken (a link points nowhere).
    #[error("queue link chain is broken")]
    QueueLinkBroken,

    /// `setup` was asked to create a queue that already exists, or the
    /// existing queue is incompatible (wrong protocol version or runtime).
    #[error("queue already exists: {0}")]
    QueueExists(String),

    /// `submit` collided with an existing job id.
    #[error("job already exists")]
    JobAlreadyExists,

    /// The job id is not known to the server.
    #[error("job not found")]
    JobNotFound,

    /// The operation requires the job to be finished, but it is still running.
    #[error("job is still running")]
    JobStillRunning,

    /// A caller error, e.g. both `destination` and `directory` modes
    /// requested for `download`, or neither.
    #[error("{0}")]
    InvalidArgument(String),

    /// The SSH control connection could not be established.
    #[error("failed to connect to {destination}")]
    Connect {
        /// The destination that could not be reached.
        destination: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The SSH connection was severed.
    #[error("the SSH connection was terminated")]
    Disconnected,

    /// A remote shell script exited with a status code this crate did not
    /// expect for that command. Infrastructure failure, not a modeled
    /// outcome: logged with the command and code.
    #[error("command {command:?} failed with status {code}")]
    RemoteCommandFailure {
        /// The command that was run on the remote host.
        command: String,
        /// Its exit code.
        code: i32,
    },

    /// Transferring files to or from the remote host failed.
    #[error("file transfer failed: {0}")]
    Transfer(String),

    /// A local I/O error (e.g. reading the job directory to upload).
    #[error("local I/O error")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn remote_failure(command: impl Into<String>, code: i32) -> Self {
        Error::RemoteCommandFailure {
            command: command.into(),
            code,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_nonempty() {
        let variants: Vec<Error> = vec![
            Error::InvalidDestination("x".into()),
            Error::QueueDoesntExist,
            Error::QueueLinkBroken,
            Error::QueueExists("already linked here".into()),
            Error::JobAlreadyExists,
            Error::JobNotFound,
            Error::JobStillRunning,
            Error::Disconnected,
            Error::remote_failure("commands/status job1", 17),
        ];
        for e in variants {
            assert!(!format!("{e}").is_empty());
        }
    }

    #[test]
    fn remote_command_failure_message() {
        let e = Error::remote_failure("commands/new_job job1", 4);
        assert_eq!(
            e.to_string(),
            "command \"commands/new_job job1\" failed with status 4"
        );
    }
}
