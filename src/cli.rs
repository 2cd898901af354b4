use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tubegrab")]
#[command(author, version, about = "Download videos in selected formats, several at a time", long_about = None)]
pub struct Cli {
    /// Page URL of the video
    pub url: String,

    /// Format id to download; repeat for several. Defaults to the first listed format
    #[arg(short = 'f', long = "format", value_name = "FORMAT_ID")]
    pub formats: Vec<String>,

    /// List available formats and exit
    #[arg(short = 'F', long)]
    pub list_formats: bool,

    /// Destination directory (defaults to the last used or the standard download directory)
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Number of parallel downloads
    #[arg(short = 'j', long, value_name = "WORKERS")]
    pub jobs: Option<usize>,

    /// Log at debug level regardless of settings and RUST_LOG
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
