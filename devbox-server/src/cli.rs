use clap::{Parser, Subcommand};

/// Devbox release control plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Run the API server
    Serve {
        /// API port (default: SERVER_PORT, then 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// List the releases of a devbox
    Releases {
        /// Devbox name
        name: String,

        /// Output format (table or json)
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// Release a devbox under a new tag
    Release {
        /// Devbox name
        name: String,

        /// Release tag, unique per devbox
        #[arg(short, long)]
        tag: String,

        /// Release notes
        #[arg(short, long, default_value = "")]
        description: String,

        /// Start the devbox once the release succeeded
        #[arg(long)]
        start: bool,
    },
}
