use clap::Parser;

/// Target that selects local mode: package the current working directory.
pub const LOCAL_TARGET: &str = ".";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Package source code context for language models.",
    long_about = "ctxpack packages a repository as model-ready context. \nGiven a repository URL it downloads the zipball and prints every Python file in a framed report. \nGiven '.' it walks the current directory and prints an XML document with the directory tree and file contents.",
    help_template = "{about-section}\nUsage: {usage}\n\n{all-args}{after-help}",
    after_help = "EXAMPLES:\n  ctxpack https://github.com/acme/widgets\n  ctxpack https://github.com/acme/widgets/tree/dev\n  ctxpack . > context.xml\n  ctxpack --batch --config ~/ctxpack.toml"
)]
pub struct Cli {
    #[arg(
        value_name = "TARGET",
        help = "Repository URL for remote mode, or '.' to package the current directory."
    )]
    pub target: Option<String>,

    #[arg(
        short,
        long,
        value_name = "BRANCH",
        help = "Branch to fetch in remote mode (overrides the URL and config).",
        help_heading = "Remote"
    )]
    pub branch: Option<String>,

    #[arg(
        long,
        conflicts_with = "target",
        help = "Fetch every repository listed under [[repositories]] in the config file.",
        help_heading = "Remote"
    )]
    pub batch: bool,

    #[arg(
        long,
        value_name = "FILE",
        conflicts_with = "no_config",
        help = "Path to the TOML config file (default: ./ctxpack.toml).",
        help_heading = "Configuration"
    )]
    pub config: Option<String>,

    #[arg(
        long,
        conflicts_with = "config",
        help = "Disable loading any TOML config file.",
        help_heading = "Configuration"
    )]
    pub no_config: bool,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase message verbosity (-v, -vv, -vvv).")]
    pub verbose: u8,

    #[arg(short, long, help = "Silence warnings and informational messages.")]
    pub quiet: bool,
}

impl Cli {
    pub fn is_local(&self) -> bool {
        self.target.as_deref() == Some(LOCAL_TARGET)
    }
}
