use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tiltvault")]
#[command(version)]
#[command(about = "Inspect and extract Tilt Brush sketch containers", long_about = None)]
#[command(after_help = "Examples:\n  \
  tiltvault sketch.tilt -l                list members of a sketch\n  \
  tiltvault sketch.tilt -c                validate the container header\n  \
  tiltvault sketch.tilt -m                print upgraded metadata as JSON\n  \
  tiltvault sketch.tilt -T cover.png      save the embedded thumbnail\n  \
  tiltvault https://example.com/a.tilt -l list a remote sketch via Range requests")]
pub struct Cli {
    /// Sketch container path (file or directory) or HTTP URL
    #[arg(value_name = "SKETCH")]
    pub file: String,

    /// List members
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely (sizes and compression)
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Check the container header and mandatory members
    #[arg(short = 'c')]
    pub check: bool,

    /// Print metadata as JSON, upgraded to the current schema
    #[arg(short = 'm')]
    pub metadata: bool,

    /// Write the embedded thumbnail to a file
    #[arg(short = 'T', value_name = "OUT")]
    pub thumbnail: Option<String>,

    /// Extract a member to stdout
    #[arg(short = 'x', value_name = "MEMBER")]
    pub extract: Option<String>,

    /// Quiet mode
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }
}
