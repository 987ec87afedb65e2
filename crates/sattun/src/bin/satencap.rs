//! Reads packets from a TAP interface and sends them as GSE frames over UDP.

use std::process;

use tracing::error;

use sattun::cli::{self, EncapCli};

fn main() {
    let cli: EncapCli = cli::parse_or_exit();
    cli::init_logging(cli.common.verbose);

    if let Err(err) = sattun::run_encap(&cli.config()) {
        error!("{}", err);
        process::exit(err.exit_code());
    }
}
