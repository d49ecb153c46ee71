//! CLI + logging adapter (C7). Translates the command line into
//! [`tej::RemoteQueue`] calls and formats results the way `spec.md`
//! §6.1 describes: `0` on success, `1` on any [`tej::Error`] (logged at
//! CRITICAL — `tracing`'s `ERROR`), human-readable one-liners for
//! `status`/`submit`/`list`.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};

use tej::runtime::{Runtime, SetupOptions};
use tej::{Destination, DownloadTarget, JobId, RemoteQueue};

/// Trivial Extensible Job-submission over SSH.
#[derive(Parser)]
#[command(name = "tej", version, about = "Trivial Extensible Job-submission over SSH")]
struct Cli {
    /// Increase logging verbosity; repeatable (WARNING → INFO → DEBUG).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Install (or relink) a queue on the remote host.
    Setup {
        /// SSH destination, `[ssh://][user[:password]@]host[:port]`.
        destination: String,
        /// Queue pathname on the remote host. Defaults to `~/.tej`.
        #[arg(long)]
        queue: Option<String>,
        /// Additional pathnames to write `tejdir:` link files at.
        #[arg(long = "make-link")]
        make_link: Vec<String>,
        /// Also link `~/.tej` at this queue.
        #[arg(long)]
        make_default_link: bool,
        /// Overwrite an existing queue instead of failing.
        #[arg(long)]
        force: bool,
        /// Only (re)write link files; never touch the queue itself.
        #[arg(long)]
        only_links: bool,
        /// Force a specific runtime instead of auto-detecting one.
        #[arg(short = 'r', long)]
        runtime: Option<Runtime>,
    },
    /// Upload a directory and launch it as a new job.
    Submit {
        /// SSH destination.
        destination: String,
        /// Queue pathname on the remote host.
        #[arg(long)]
        queue: Option<String>,
        /// Explicit job id; synthesized if omitted.
        #[arg(long)]
        id: Option<String>,
        /// Script to invoke inside the uploaded directory.
        #[arg(long)]
        script: Option<String>,
        /// Local directory to upload.
        directory: PathBuf,
    },
    /// Query a job's lifecycle state.
    Status {
        /// SSH destination.
        destination: String,
        /// Queue pathname on the remote host.
        #[arg(long)]
        queue: Option<String>,
        /// The job id to query.
        #[arg(long)]
        id: Option<String>,
    },
    /// Fetch one or more files out of a job's working directory.
    Download {
        /// SSH destination.
        destination: String,
        /// Queue pathname on the remote host.
        #[arg(long)]
        queue: Option<String>,
        /// The job id to download from.
        #[arg(long)]
        id: Option<String>,
        /// Place the single downloaded file at this local path instead
        /// of the current directory.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Files inside the job's working directory to fetch.
        files: Vec<String>,
    },
    /// Request termination of a running job.
    Kill {
        /// SSH destination.
        destination: String,
        /// Queue pathname on the remote host.
        #[arg(long)]
        queue: Option<String>,
        /// The job id to kill.
        #[arg(long)]
        id: Option<String>,
    },
    /// Remove a finished job's bookkeeping and uploaded files.
    Delete {
        /// SSH destination.
        destination: String,
        /// Queue pathname on the remote host.
        #[arg(long)]
        queue: Option<String>,
        /// The job id to delete.
        #[arg(long)]
        id: Option<String>,
    },
    /// Enumerate every job known to a queue.
    List {
        /// SSH destination.
        destination: String,
        /// Queue pathname on the remote host.
        #[arg(long)]
        queue: Option<String>,
    },
}

fn require_id(id: Option<String>) -> tej::Result<JobId> {
    let id = id.ok_or_else(|| tej::Error::InvalidArgument("--id is required".to_string()))?;
    JobId::validate(&id)
}

async fn connect(destination: &str, queue: Option<String>) -> tej::Result<RemoteQueue> {
    let destination = Destination::parse(destination)?;
    let queue_path = tej::config::queue_path(queue.as_deref());
    RemoteQueue::connect(destination, queue_path).await
}

async fn run(command: Command) -> tej::Result<()> {
    match command {
        Command::Setup {
            destination,
            queue,
            make_link,
            make_default_link,
            force,
            only_links,
            runtime,
        } => {
            let remote_queue = connect(&destination, queue).await?;
            let mut links = make_link;
            if make_default_link {
                links.push("~/.tej".to_string());
            }
            let opts = SetupOptions {
                force,
                only_links,
                runtime,
                links,
                acceptable_runtimes: Vec::new(),
            };
            remote_queue.setup(&opts).await?;
            Ok(())
        }
        Command::Submit {
            destination,
            queue,
            id,
            script,
            directory,
        } => {
            let remote_queue = connect(&destination, queue).await?;
            let script = tej::config::script_name(script.as_deref());
            let job_id = remote_queue.submit(id.as_deref(), &directory, &script).await?;
            println!("{job_id}");
            Ok(())
        }
        Command::Status { destination, queue, id } => {
            let remote_queue = connect(&destination, queue).await?;
            let job_id = require_id(id)?;
            match remote_queue.status(&job_id).await {
                Ok((tej::JobStatus::Finished { exit_code }, _)) => {
                    println!("finished {exit_code}");
                    Ok(())
                }
                Ok((tej::JobStatus::Running, _)) => {
                    println!("running");
                    Ok(())
                }
                Err(tej::Error::JobNotFound) => {
                    println!("not found");
                    Ok(())
                }
                Err(other) => Err(other),
            }
        }
        Command::Download {
            destination,
            queue,
            id,
            output,
            files,
        } => {
            let remote_queue = connect(&destination, queue).await?;
            let job_id = require_id(id)?;
            let target = match output {
                Some(path) => DownloadTarget::Destination(path),
                None => DownloadTarget::Directory(PathBuf::from(".")),
            };
            remote_queue.download(&job_id, &files, target).await
        }
        Command::Kill { destination, queue, id } => {
            let remote_queue = connect(&destination, queue).await?;
            let job_id = require_id(id)?;
            remote_queue.kill(&job_id).await
        }
        Command::Delete { destination, queue, id } => {
            let remote_queue = connect(&destination, queue).await?;
            let job_id = require_id(id)?;
            remote_queue.delete(&job_id).await
        }
        Command::List { destination, queue } => {
            let remote_queue = connect(&destination, queue).await?;
            for record in remote_queue.list().await? {
                let status = record
                    .fields
                    .get("status")
                    .map(String::as_str)
                    .unwrap_or("unknown");
                println!("{} {}", record.job_id, status);
            }
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tej::logging::init(cli.verbose);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
