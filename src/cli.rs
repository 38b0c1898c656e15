//! Command-line surface exercising the three cores for manual and
//! integration testing. Grounded on `yaleman-goatns/src/cli.rs`'s
//! `Parser`/`Subcommand` shape, trimmed to subcommands that make sense
//! for a library with no persistent service state of its own.

use clap::{Parser, Subcommand};

#[derive(Parser, Clone)]
pub struct SharedOpts {
    #[arg(short, long, help = "Configuration file")]
    pub config: Option<String>,
    #[arg(short, long)]
    pub debug: bool,
}

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Run a minimal HTTP/1.1 echo server on the configured listen address.
    EchoServer {
        #[clap(flatten)]
        sopt: SharedOpts,
    },
    /// Replay a journal's checkpoint and operation log, printing a summary.
    JournalDump {
        #[clap(flatten)]
        sopt: SharedOpts,
        /// Directory holding the journal's `.ops`/`.ckpt` files.
        dir: String,
        /// Base name passed to `FileStorage::open`.
        name: String,
    },
    /// Parse an address or CIDR subnet and print its canonical form.
    AddrInfo {
        #[clap(flatten)]
        sopt: SharedOpts,
        /// An IPv4/IPv6 address or `address/prefix` subnet.
        value: String,
    },
    /// Print the default configuration as JSON.
    ExportConfig {
        #[clap(flatten)]
        sopt: SharedOpts,
    },
}

#[derive(Parser)]
#[command(arg_required_else_help(true))]
/// Foundation library CLI: exercise the journal, HTTP, and address cores.
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn config(&self) -> Option<String> {
        match &self.command {
            Commands::EchoServer { sopt }
            | Commands::JournalDump { sopt, .. }
            | Commands::AddrInfo { sopt, .. }
            | Commands::ExportConfig { sopt } => sopt.config.clone(),
        }
    }

    pub fn debug(&self) -> bool {
        match &self.command {
            Commands::EchoServer { sopt }
            | Commands::JournalDump { sopt, .. }
            | Commands::AddrInfo { sopt, .. }
            | Commands::ExportConfig { sopt } => sopt.debug,
        }
    }
}

/// Output a default configuration file, based on [`crate::config::ConfigFile`].
pub fn default_config() {
    let output = serde_json::to_string_pretty(&crate::config::ConfigFile::default())
        .expect("ConfigFile always serializes");
    println!("{output}");
}
