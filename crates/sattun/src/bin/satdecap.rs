//! Receives GSE frames over UDP and writes the reassembled packets to a TAP interface.

use std::process;

use tracing::error;

use sattun::cli::{self, DecapCli};

fn main() {
    let cli: DecapCli = cli::parse_or_exit();
    cli::init_logging(cli.common.verbose);

    if let Err(err) = sattun::run_decap(&cli.config()) {
        error!("{}", err);
        process::exit(err.exit_code());
    }
}
