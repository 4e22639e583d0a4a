use gumdrop::Options;

/// Receive push webhooks and mirror the pushed repository onto local directories.
#[derive(Debug, Options)]
pub struct Args {
    /// The directory to deploy the branches into (default: the current directory).
    #[options(free)]
    pub directory: Option<String>,

    /// The configuration file (default: deploy.toml).
    #[options(meta = "FILE")]
    pub config: Option<String>,

    /// Runs an HTTP server on the address, receiving the webhooks (e.g. "0.0.0.0:8000").
    #[options(no_short)]
    pub http: Option<String>,

    /// Deploy the payload in a file ("-" for stdin) once and exit.
    #[options(no_short, meta = "FILE")]
    pub payload: Option<String>,

    /// The file to append the log to.
    #[options(no_short, meta = "FILE", default = "debug.log")]
    pub log_file: String,

    /// Log every step to the log file, overriding the configuration.
    #[options(no_short)]
    pub debug: bool,

    /// Only print errors to the terminal.
    #[options()]
    pub quiet: bool,

    /// Increase verbosity, can be set multiple times (-v debug, -vv tracing)
    #[options(count)]
    pub verbose: u8,

    /// Print the current version.
    #[options(short = "V")]
    pub version: bool,

    /// Print this help.
    #[options()]
    pub help: bool,
}

pub fn parse_args() -> Args {
    Args::parse_args_default_or_exit()
}
