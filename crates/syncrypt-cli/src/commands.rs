use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use syncrypt_core::config::LogLevel;
use syncrypt_core::AppConfig;

#[derive(Debug, Parser)]
#[command(name = "syncrypt")]
#[command(about = "Mirror a directory tree into an encrypted tree", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Source tree (or artifact tree for `decrypt`)
    #[arg(short, long, global = true)]
    pub input: Option<PathBuf>,

    /// Destination tree
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Directory holding the key files
    #[arg(short, long, global = true)]
    pub key_path: Option<PathBuf>,

    /// Passphrase for the private key
    #[arg(short, long, global = true)]
    pub passphrase: Option<String>,

    /// Public key filename
    #[arg(long, global = true)]
    pub public_key: Option<String>,

    /// Private key filename
    #[arg(long, global = true)]
    pub private_key: Option<String>,

    /// Ledger database file
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,

    /// Only print errors to the console
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Print nothing to the console
    #[arg(long, global = true)]
    pub very_quiet: bool,

    /// Also write warnings to the log file
    #[arg(long, global = true)]
    pub log_warnings: bool,

    /// Write warnings and info to the log file
    #[arg(long, global = true)]
    pub log_info: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Encrypt new and changed files into the destination tree
    Sync {
        /// Keep running, one pass per interval
        #[arg(short = 'D', long)]
        daemon: bool,

        /// Milliseconds between passes in daemon mode
        #[arg(short = 't', long)]
        interval: Option<u64>,

        /// Delete artifacts of removed files at the end of every pass
        #[arg(long)]
        propagate_deletions: bool,
    },
    /// Decrypt every artifact under the input tree into the output tree
    Decrypt,
    /// Generate a new key pair
    Keygen,
    /// List files pending deletion
    ReviewDeletions,
    /// Delete verified artifacts of files pending deletion
    ApplyDeletions,
    /// Print configuration values
    PrintConfig,
}

impl GlobalArgs {
    /// Command-line values win over file and environment settings.
    pub fn apply_to(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input_dir = Some(input.clone());
        }
        if let Some(output) = &self.output {
            config.output_dir = Some(output.clone());
        }
        if let Some(key_path) = &self.key_path {
            config.key_path = key_path.clone();
        }
        if let Some(passphrase) = &self.passphrase {
            config.passphrase = passphrase.clone();
        }
        if let Some(public_key) = &self.public_key {
            config.public_key = public_key.clone();
        }
        if let Some(private_key) = &self.private_key {
            config.private_key = private_key.clone();
        }
        if let Some(ledger) = &self.ledger {
            config.ledger_path = ledger.clone();
        }
        config.quiet |= self.quiet;
        config.very_quiet |= self.very_quiet;
        if self.log_info {
            config.log_level = LogLevel::Info;
        } else if self.log_warnings {
            config.log_level = LogLevel::Warning;
        }
    }
}
