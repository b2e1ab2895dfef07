use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::error;
use tracing_subscriber::EnvFilter;

use citetidy::{CrossrefLookup, IssnPolicy, Lookup, LookupCache, NoLookup, Options, Page, TemplateReport};

#[derive(Clone, Copy, ValueEnum)]
enum IssnPolicyArg {
    /// Keep `issn` only beside a journal name written in the input
    KeepWithOriginalJournal,
    /// Drop `issn` whenever a journal is named
    DropWithJournal,
    /// Never drop `issn`
    Keep,
}

impl From<IssnPolicyArg> for IssnPolicy {
    fn from(arg: IssnPolicyArg) -> Self {
        match arg {
            IssnPolicyArg::KeepWithOriginalJournal => IssnPolicy::KeepWithOriginalJournal,
            IssnPolicyArg::DropWithJournal => IssnPolicy::DropWithJournal,
            IssnPolicyArg::Keep => IssnPolicy::Keep,
        }
    }
}

#[derive(Parser)]
#[command(name = "citetidy", about = "Tidy citation templates in wiki text")]
struct Cli {
    /// Document to process (stdin when absent)
    file: Option<PathBuf>,

    /// What to do with `issn` once a journal is named
    #[arg(long, value_enum, default_value = "keep-with-original-journal")]
    issn_policy: IssnPolicyArg,

    /// Give up on normalization after this many passes
    #[arg(long, default_value_t = 10)]
    max_passes: usize,

    /// Look DOIs up on CrossRef
    #[arg(long)]
    crossref: bool,

    /// Override the lookup cache directory
    #[arg(long, env = "CITETIDY_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Print per-template JSON reports instead of the document
    #[arg(long)]
    json: bool,

    /// Pretty-print JSON output
    #[arg(long)]
    pretty: bool,
}

fn main() {
    init_tracing();

    if let Err(err) = run() {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let text = read_input(&cli.file)?;
    let options = Options {
        issn_policy: cli.issn_policy.into(),
        max_passes: cli.max_passes,
        ..Options::default()
    };
    let lookup: Box<dyn Lookup> = if cli.crossref {
        let cache = LookupCache::open(cli.cache_dir.clone()).context("Failed to open lookup cache")?;
        Box::new(CrossrefLookup::new(Some(cache)))
    } else {
        Box::new(NoLookup)
    };

    let mut page = Page::parse_text(&text);
    page.expand_with(lookup.as_ref(), &options);

    if cli.json {
        print_reports(&page.reports(), cli.pretty)
    } else {
        print!("{}", page.parsed_text());
        Ok(())
    }
}

fn read_input(file: &Option<PathBuf>) -> Result<String> {
    match file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn print_reports(reports: &[TemplateReport], pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(reports)?
    } else {
        serde_json::to_string(reports)?
    };
    println!("{json}");
    Ok(())
}
