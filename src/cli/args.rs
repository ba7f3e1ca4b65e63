use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "agent-audio")]
#[command(about = "Inject synthesized or remote audio into a conference session", long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Attach a constant test tone
    Tone {
        /// Tone frequency in Hz
        #[arg(long, default_value_t = crate::audio::TEST_TONE_HZ)]
        frequency: f64,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Attach a repeating note sequence (C5-E5-G5-C6 by default)
    Melody {
        /// Note frequencies in Hz, comma separated
        #[arg(long, value_delimiter = ',')]
        notes: Vec<f64>,
        /// Hold per note in milliseconds (default: from config)
        #[arg(long)]
        hold_ms: Option<u64>,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Fetch remote audio and attach it
    Play {
        /// http(s), file or base64 data URL
        url: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Attach the default microphone
    Mic {
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Run the HTTP control API against a loopback session
    Serve {
        /// Override the configured API port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print version information
    Version,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct SessionArgs {
    /// How long to keep the track attached, in seconds
    #[arg(short, long, default_value_t = 5)]
    pub duration: u64,
    /// Write the outbound session mix to this WAV file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
