//! CLI definition and execution
//!
//! s3crypt has a single command: copy SOURCE to DEST, encrypting or
//! decrypting on the way depending on which side is remote.

use clap::Parser;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};

pub mod transfer;

/// s3crypt - encrypted streaming transfers for S3
///
/// Uploads encrypt with AES-128-CTR and store the IV in the first 16
/// bytes of the object; downloads decrypt with range reads. Local to
/// local transfers need --encrypt or --decrypt.
#[derive(Parser, Debug)]
#[command(name = "s3crypt")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format: human-readable or JSON
    #[arg(long, default_value = "false")]
    pub json: bool,

    /// Disable colored output
    #[arg(long, default_value = "false")]
    pub no_color: bool,

    /// Disable progress bar
    #[arg(long, default_value = "false")]
    pub no_progress: bool,

    /// Suppress non-error output
    #[arg(short, long, default_value = "false")]
    pub quiet: bool,

    /// Log every chunk of the transfer
    #[arg(short, long, default_value = "false")]
    pub verbose: bool,

    #[command(flatten)]
    pub transfer: transfer::TransferArgs,
}

impl Cli {
    fn output_config(&self) -> OutputConfig {
        OutputConfig {
            json: self.json,
            no_color: self.no_color,
            no_progress: self.no_progress,
            quiet: self.quiet,
        }
    }
}

/// Execute the CLI command and return an exit code
pub async fn execute(cli: Cli) -> ExitCode {
    let output_config = cli.output_config();
    let formatter = Formatter::new(output_config.clone());

    match transfer::execute(&cli.transfer, output_config).await {
        Ok(summary) => {
            formatter.summary(&summary);
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e);
            ExitCode::from_error(&e)
        }
    }
}
