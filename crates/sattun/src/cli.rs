use std::{net::SocketAddrV4, process, time::Duration};

use clap::{Args, Parser};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sattun_core::config::{DEFAULT_BUFFER_LENGTH, DEFAULT_PAYLOAD_LENGTH};
use sattun_core::Config;

/// Exit code of a rejected command line.
pub const USAGE_EXIT_CODE: i32 = -1;

fn endpoint(value: &str) -> Result<SocketAddrV4, String> {
    sattun_utilities::parse_endpoint(value).map_err(|err| err.to_string())
}

/// Options shared by both directions.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// TAP interface name
    #[arg(short = 'i', long = "iface", value_name = "TAP_IFACE")]
    pub tap_interface: String,

    /// Local UDP endpoint
    #[arg(short, long, value_name = "LOCAL_ADDR_PORT", value_parser = endpoint)]
    pub local: SocketAddrV4,

    /// Remote UDP endpoint, the only peer traffic is exchanged with
    #[arg(short, long, value_name = "REMOTE_ADDR_PORT", value_parser = endpoint)]
    pub remote: SocketAddrV4,

    /// Max size of one incoming packet, in bytes
    #[arg(
        short,
        long = "buffer",
        value_name = "BUFFER_LEN",
        default_value_t = DEFAULT_BUFFER_LENGTH
    )]
    pub buffer_len: usize,

    /// Readiness wait timeout, in milliseconds
    #[arg(short = 't', long = "timeout", value_name = "READ_TIMEOUT_MS", default_value_t = 100)]
    pub read_timeout_ms: u64,

    /// UDP socket receive buffer size (SO_RCVBUF), in bytes; system default if omitted
    #[arg(long, value_name = "BYTES")]
    pub recv_buffer_size: Option<usize>,

    /// UDP socket send buffer size (SO_SNDBUF), in bytes; system default if omitted
    #[arg(long, value_name = "BYTES")]
    pub send_buffer_size: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl CommonArgs {
    fn config(&self) -> Config {
        Config {
            tap_interface: self.tap_interface.clone(),
            local: self.local,
            remote: self.remote,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            buffer_len: self.buffer_len,
            socket_recv_buffer_size: self.recv_buffer_size,
            socket_send_buffer_size: self.send_buffer_size,
            ..Config::default()
        }
    }
}

/// `satencap`: read packets from a TAP interface and send them as GSE frames over UDP.
#[derive(Parser, Debug)]
#[command(
    name = "satencap",
    version,
    about = "Encapsulate TAP packets into GSE frames sent over UDP"
)]
pub struct EncapCli {
    /// Shared options
    #[command(flatten)]
    pub common: CommonArgs,

    /// Constant UDP payload length in bytes; 0 sends one variable-size frame per packet
    #[arg(
        short,
        long = "payload",
        value_name = "PAYLOAD_LEN",
        default_value_t = DEFAULT_PAYLOAD_LENGTH
    )]
    pub payload_len: usize,
}

impl EncapCli {
    /// Builds the process configuration. Validation happens in the runner.
    pub fn config(&self) -> Config {
        Config { payload_len: self.payload_len, ..self.common.config() }
    }
}

/// `satdecap`: receive GSE frames over UDP and write the reassembled packets to a TAP interface.
#[derive(Parser, Debug)]
#[command(
    name = "satdecap",
    version,
    about = "Decapsulate GSE frames received over UDP into TAP packets"
)]
pub struct DecapCli {
    /// Shared options
    #[command(flatten)]
    pub common: CommonArgs,
}

impl DecapCli {
    /// Builds the process configuration. Validation happens in the runner.
    pub fn config(&self) -> Config {
        self.common.config()
    }
}

/// Parses the command line, exiting with 0 on `--help`/`--version` and
/// [`USAGE_EXIT_CODE`] on a usage error.
pub fn parse_or_exit<P: Parser>() -> P {
    match P::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() { USAGE_EXIT_CODE } else { 0 };
            let _ = err.print();
            process::exit(code);
        }
    }
}

/// Installs the stderr log subscriber.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `--verbose`.
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init()
        .ok();
}
