use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod export;
mod gerrit;
mod git;
mod github;
mod models;
mod page;
mod patchwork;

use config::Config;
use github::{GithubAuth, GithubCrawler};

const SUPPORT_ACTIONS: [&str; 4] = ["gerrit", "git", "github", "patchwork"];

/// Aggregate contributions by tracked users across gerrit, git, github and
/// patchwork into per-platform CSV and spreadsheet reports.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// action to do: empty or "all" runs every platform, otherwise a
    /// space-separated subset of "gerrit git github patchwork"
    #[arg(default_value = "")]
    action: String,

    /// config file
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// github username
    #[arg(short, long)]
    user_name: Option<String>,

    /// github token
    #[arg(short, long)]
    token: Option<String>,
}

/// Expand and validate the action argument, including the github
/// credentials it implies.
fn validate_actions(args: &Args) -> Result<Vec<&'static str>> {
    let actions: Vec<&'static str> = if args.action.is_empty() || args.action == "all" {
        SUPPORT_ACTIONS.to_vec()
    } else {
        let mut selected = Vec::new();

        for action in args.action.split_whitespace() {
            match SUPPORT_ACTIONS.iter().find(|known| **known == action) {
                Some(known) => selected.push(*known),
                None => bail!("invalid action '{}'", action),
            }
        }

        selected
    };

    if actions.contains(&"github") {
        if args.user_name.is_none() {
            bail!("missing github username");
        }
        if args.token.is_none() {
            bail!("missing github token");
        }
    }

    Ok(actions)
}

/// Pick a fresh `<config-stem>-<timestamp>` directory, waiting out clashes
/// with an earlier run in the same minute.
fn find_report_directory(config_file: &Path) -> PathBuf {
    let stem = config_file
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("report");

    loop {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M");
        let directory = PathBuf::from(format!("{}-{}", stem, timestamp));

        if !directory.exists() {
            return directory;
        }

        std::thread::sleep(std::time::Duration::from_secs(1));
    }
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let actions = validate_actions(&args)?;

    let Some(config_file) = args.config_file.as_deref() else {
        bail!("missing config file");
    };
    if !config_file.is_file() {
        bail!("invalid config file {:?}", config_file);
    }

    // any configuration error aborts before network or repository activity
    let config = Config::load(config_file)?;

    let report_directory = find_report_directory(config_file);
    std::fs::create_dir(&report_directory)
        .with_context(|| format!("failed to create {:?}", report_directory))?;

    if actions.contains(&"gerrit") {
        let records = gerrit::GerritCrawler::new(&config)?.fetch();

        if records.is_empty() {
            tracing::warn!("fail to get changes from gerrit server");
        } else {
            export::export_csv(&report_directory, gerrit::REPORT_NAME, &records)?;
            export::export_xlsx(&report_directory, gerrit::REPORT_NAME, config.users(), &records)?;
        }
    }

    if actions.contains(&"git") {
        let records = git::GitCrawler::new(&config, "./repo")?.fetch();

        if records.is_empty() {
            tracing::warn!("fail to get commits from git repo");
        } else {
            export::export_csv(&report_directory, git::REPORT_NAME, &records)?;
            export::export_xlsx(&report_directory, git::REPORT_NAME, config.users(), &records)?;
        }
    }

    if actions.contains(&"github") {
        let auth = GithubAuth {
            username: args.user_name.clone().unwrap_or_default(),
            token: args.token.clone().unwrap_or_default(),
        };
        let records = GithubCrawler::new(&config, auth)?.fetch();

        if records.is_empty() {
            tracing::warn!("fail to get pulls from github repo");
        } else {
            export::export_csv(&report_directory, github::REPORT_NAME, &records)?;
            export::export_xlsx(&report_directory, github::REPORT_NAME, config.users(), &records)?;
        }
    }

    if actions.contains(&"patchwork") {
        let records = patchwork::PatchworkCrawler::new(&config)?.fetch();

        if records.is_empty() {
            tracing::warn!("fail to get patches from patchwork server");
        } else {
            export::export_csv(&report_directory, patchwork::REPORT_NAME, &records)?;
            export::export_xlsx(
                &report_directory,
                patchwork::REPORT_NAME,
                config.users(),
                &records,
            )?;
        }
    }

    Ok(())
}
