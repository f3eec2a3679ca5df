//! checkline - run check stages concurrently and report every failure
//!
//! ## Commands
//!
//! - `checkline run` - Execute every stage and print the report
//! - `checkline validate` - Validate the check file
//! - `checkline plan` - Show what `run` would launch
//! - `checkline completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Run the checks declared in ./checkline.yml
//! checkline run
//!
//! # Run two stages at most at once, with a JSON report
//! checkline run -j 2 --format json
//!
//! # Generate shell completions
//! checkline completions bash > /etc/bash_completion.d/checkline
//! ```

use clap::Parser;
use std::process::ExitCode;

mod cli;

fn main() -> ExitCode {
    let args = cli::Args::parse();
    checkline::init_logging(&args.log_level);

    match cli::run(args) {
        Ok(status) => status.exit_code(),
        Err(e) => {
            eprintln!("Error: {e:#}");
            tracing::debug!(error = ?e, "Command failed");
            ExitCode::from(cli::exit_code_for(&e))
        }
    }
}
