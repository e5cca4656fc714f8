pub mod api;
pub mod config;
pub mod double;
pub mod errors;
pub mod logging;
pub mod proxy;
pub mod replay;
pub mod sqlite_store;
pub mod storage_key;
pub mod store;
pub mod target;

pub use api::{Impersonator, RecordingOptions};
pub use double::Double;
pub use errors::{ImpersonatorError, MethodInvocationError};
pub use proxy::Proxy;
pub use replay::method::{BlockInvocation, BlockSpy, MatchingConfiguration, Method, MethodInvocation};
pub use replay::recording::{Recording, RecordingState};
pub use storage_key::{key_for_label, label_to_key};
pub use store::{FileStore, InvocationStore, MemoryStore};
pub use target::{Callback, Impersonate};

use clap::{error::ErrorKind, Parser, Subcommand};
use config::{load_settings, CliOverrides};
use logging::append_run_log;
use serde_json::json;
use std::io::Write;

#[derive(Debug, Clone, Parser)]
#[command(name = "impersonator")]
#[command(about = "Inspect and manage recorded method invocations")]
pub struct Cli {
    #[arg(long, global = true)]
    pub config: Option<std::path::PathBuf>,
    #[arg(long, global = true)]
    pub working_dir: Option<std::path::PathBuf>,
    #[arg(long, global = true)]
    pub recordings_path: Option<std::path::PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the storage key derived from a recording label
    Key { label: String },
    /// List stored recordings
    List,
    /// Print the invocations stored for a recording label
    Show { label: String },
    /// Remove one recording, or every recording when no label is given
    Clear { label: Option<String> },
}

pub fn run() -> Result<i32, ImpersonatorError> {
    let args = std::env::args_os().collect::<Vec<_>>();
    let cwd = std::env::current_dir().map_err(|e| ImpersonatorError::Io(e.to_string()))?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_with_args(&args, &cwd, &mut out)
}

pub fn run_with_args(
    args: &[std::ffi::OsString],
    cwd: &std::path::Path,
    out: &mut dyn Write,
) -> Result<i32, ImpersonatorError> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => match error.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                write_out(out, error.to_string().trim_end())?;
                return Ok(0);
            }
            _ => return Err(ImpersonatorError::Cli(error.to_string())),
        },
    };

    match cli.command {
        Command::Key { ref label } => {
            write_out(out, &key_for_label(label)?)?;
            Ok(0)
        }
        Command::List => {
            let store = open_store(&cli, cwd)?;
            for key in store.keys()? {
                write_out(out, &key)?;
            }
            Ok(0)
        }
        Command::Show { ref label } => {
            let store = open_store(&cli, cwd)?;
            let key = key_for_label(label)?;
            if !store.try_exists(&key)? {
                return Err(ImpersonatorError::Storage(format!(
                    "no recording stored for `{label}` (key `{key}`)"
                )));
            }
            let invocations = store.read(&key)?;
            write_out(out, &format!("{key}: {} invocations", invocations.len()))?;
            for (position, invocation) in invocations.iter().enumerate() {
                write_out(out, &format!("{position:>4}  {invocation}"))?;
                if let Some(spy) = &invocation.method_instance.block_spy {
                    for block_invocation in &spy.block_invocations {
                        let arguments = serde_json::to_string(&block_invocation.arguments)
                            .map_err(|e| ImpersonatorError::Storage(e.to_string()))?;
                        write_out(out, &format!("        yields {arguments}"))?;
                    }
                }
            }
            Ok(0)
        }
        Command::Clear { ref label } => {
            let store = open_store(&cli, cwd)?;
            let keys = match label {
                Some(label) => vec![key_for_label(label)?],
                None => store.keys()?,
            };
            let mut removed = 0usize;
            for key in &keys {
                if store.remove(key)? {
                    removed += 1;
                }
            }
            append_run_log(
                "info",
                "cli.clear.completed",
                json!({ "requested": keys.len(), "removed": removed }),
            );
            write_out(out, &format!("removed {removed} recordings"))?;
            Ok(0)
        }
    }
}

/// Settings (defaults, config file, CLI flags) and the store they select.
/// Only subcommands that touch stored recordings load them.
fn open_store(
    cli: &Cli,
    cwd: &std::path::Path,
) -> Result<std::sync::Arc<dyn InvocationStore>, ImpersonatorError> {
    let overrides = CliOverrides {
        config_path: cli.config.clone(),
        working_dir: cli.working_dir.clone(),
        recordings_path: cli.recordings_path.clone(),
    };
    let settings = load_settings(&overrides, cwd)?;
    settings.init_logging();
    settings.open_store()
}

fn write_out(out: &mut dyn Write, line: &str) -> Result<(), ImpersonatorError> {
    writeln!(out, "{line}").map_err(|e| ImpersonatorError::Io(e.to_string()))
}
