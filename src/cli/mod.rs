pub mod args;
pub mod session;

pub use args::{Cli, CliCommand, SessionArgs};
pub use session::{handle_session_command, Injection};

use crate::app::{self, Runtime};
use crate::config::Config;
use anyhow::Result;

/// Dispatch a parsed command with the loaded config.
pub async fn run(command: CliCommand, config: Config) -> Result<()> {
    let (injection, session) = match command {
        CliCommand::Version => {
            println!("agent-audio {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        CliCommand::Serve { port } => return app::run_service(config, port).await,
        CliCommand::Tone { frequency, session } => (Injection::Tone { frequency }, session),
        CliCommand::Melody {
            notes,
            hold_ms,
            session,
        } => (Injection::Melody { notes, hold_ms }, session),
        CliCommand::Play { url, session } => (Injection::Play { url }, session),
        CliCommand::Mic { session } => (Injection::Mic, session),
    };

    let runtime = Runtime::new(config)?;
    handle_session_command(runtime, injection, session).await
}
