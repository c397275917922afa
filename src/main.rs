use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use hako::start::{self, DEFAULT_PORT, StartConfig};

#[derive(Parser)]
#[command(name = "hako", version)]
#[command(about = "HTTP echo server for exercising clients, proxies and load balancers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the echo server and run until SIGINT or SIGTERM
    Start(StartArgs),
}

#[derive(Args)]
struct StartArgs {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Extra path to echo on, next to /echo
    #[arg(long, default_value = "")]
    path: String,

    /// Minimum response delay in milliseconds
    #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
    delay: i32,

    /// Log request bodies
    #[arg(short, long)]
    verbose: bool,

    /// Log request headers
    #[arg(long)]
    verbose_headers: bool,

    /// Log as JSON
    #[arg(long)]
    json: bool,
}

impl From<StartArgs> for StartConfig {
    fn from(args: StartArgs) -> Self {
        StartConfig::from_args(
            args.port,
            args.delay,
            &args.path,
            args.verbose,
            args.verbose_headers,
            args.json,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    match cli.command {
        Commands::Start(args) => {
            let config = StartConfig::from(args);
            hako::logging::init(config.json_log).wrap_err("Failed to initialize logging")?;
            start::run(config).await.wrap_err("Failed to run echo server")?;
        }
    }

    Ok(())
}
