use clap::Parser;
use llsd_peer::PeerConfig;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Disposable LLSD-over-HTTP test double.
///
/// Starts a local server on the first free candidate port, exports that
/// port to the subject command as $PORT, runs the command to completion
/// while answering requests, and exits with the command's status.
#[derive(Parser, Debug)]
#[command(name = "llsd-peer", version)]
struct Args {
    /// Interface to bind.
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// First candidate port.
    #[arg(long, default_value_t = 8000)]
    port_base: u16,

    /// Number of sequential candidate ports to try.
    #[arg(long, default_value_t = 20)]
    port_span: u16,

    /// Echo decoded requests (also enabled by LLSD_PEER_VERBOSE).
    #[arg(short, long)]
    verbose: bool,

    /// Subject command and its arguments, run with $PORT set.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let verbose = args.verbose || llsd_peer::verbose_from_env();

    // Logs go to stderr so the subject's own output stays clean.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = PeerConfig {
        host: args.host,
        port_base: args.port_base,
        port_span: args.port_span,
        echo_requests: verbose,
    };

    let code = match llsd_peer::run(&config, &args.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "harness failed");
            e.exit_code()
        }
    };
    std::process::exit(code);
}
