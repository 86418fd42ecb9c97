use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pocforge_core::Severity;

#[derive(Parser, Debug)]
#[command(name = "pocforge", version, about = "CVE evidence collector and Nuclei template forge")]
pub struct Cli {
    /// Raise log verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file.
    #[arg(long, global = true, default_value = "pocforge.ron")]
    pub config: PathBuf,

    /// Where log output goes.
    #[arg(long, global = true, value_enum, default_value_t = LogTarget::Terminal)]
    pub log: LogTarget,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Terminal,
    File,
    Both,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Gather evidence for a CVE without calling the model.
    Collect {
        cve_id: String,
        /// Write the collected text here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Collect, ask the model for a template and write it to the POC directory.
    Generate {
        cve_id: String,
        /// Replace the default generation prompt with this file's content.
        #[arg(long)]
        prompt_file: Option<PathBuf>,
        /// Record the written template in the catalog.
        #[arg(long)]
        catalog: bool,
    },
    /// Render a template from a JSON field set.
    Assemble {
        input: PathBuf,
        #[arg(long)]
        catalog: bool,
    },
    #[command(subcommand)]
    Catalog(CatalogCommand),
    /// Run the scanner with one template against one target.
    Scan(ScanArgs),
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    List,
    Search {
        #[arg(long)]
        keyword: Option<String>,
        /// Match entries carrying any of these tags.
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long, value_parser = parse_severity)]
        severity: Option<Severity>,
    },
    Show {
        id: String,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_parser = parse_severity)]
        severity: Option<Severity>,
        /// Comma separated.
        #[arg(long, value_delimiter = ',')]
        tags: Option<Vec<String>>,
        #[arg(long = "reference")]
        references: Option<Vec<String>>,
    },
    /// Remove the record. The template file is kept.
    Delete {
        id: String,
    },
    /// Record an existing template file.
    Import {
        file: PathBuf,
    },
    /// Copy every recorded template file into a directory.
    Export {
        dir: PathBuf,
    },
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[arg(long, short = 't')]
    pub template: PathBuf,
    #[arg(long, short = 'u')]
    pub target: String,
    /// Per-request timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u32>,
    /// Pass -v to the scanner.
    #[arg(long)]
    pub scan_verbose: bool,
    #[arg(long)]
    pub debug: bool,
    #[arg(long)]
    pub no_color: bool,
    /// Print the command line and exit.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    Show,
    SetKey { key: String },
    SetPocDir { dir: PathBuf },
    SetScanner { exe: String },
}

fn parse_severity(raw: &str) -> Result<Severity, String> {
    raw.parse().map_err(|err: pocforge_core::UnknownSeverity| err.to_string())
}
