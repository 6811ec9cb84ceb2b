mod cli_args;
mod output;

use anyhow::{Context, Result, bail};
use clap::{CommandFactory, Parser};
use colored::*;
use std::env;
use std::process;

use cli_args::Cli;
use ctxpack_core::{
    ARCHIVE_EXTENSIONS, AppError, ArchiveFetcher, Config, RepoRef, package_project,
};

fn main() {
    let cli_args = Cli::parse();

    setup_logging(cli_args.quiet, cli_args.verbose);
    log::debug!("CLI args parsed: {:?}", cli_args);

    let exit_code = match run_app(&cli_args) {
        Ok(()) => {
            log::info!("Application finished successfully.");
            0
        }
        Err(e) => {
            let exit_code = exit_code_for(&e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            exit_code
        }
    };
    log::debug!("Exiting with code {}", exit_code);
    process::exit(exit_code);
}

fn setup_logging(quiet: bool, verbose: u8) {
    let log_level = if quiet {
        log::LevelFilter::Off
    } else {
        match verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();
    log::trace!("Logger initialized with level: {:?}", log_level);
}

fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<AppError>() {
        Some(AppError::Config(_)) | Some(AppError::TomlParse(_)) => 1,
        Some(AppError::Io(_)) | Some(AppError::FilesystemAccess { .. }) => 2,
        Some(AppError::Fetch { .. }) | Some(AppError::Http(_)) => 3,
        Some(AppError::ArchiveFormat(_)) | Some(AppError::Decode { .. }) => 4,
        Some(AppError::InvalidArgument(_)) => 5,
        Some(AppError::XmlSerialize(_)) | Some(AppError::XmlParse(_)) => 6,
        Some(_) => 1,
        None => 1,
    }
}

fn run_app(cli: &Cli) -> Result<()> {
    if cli.target.is_none() && !cli.batch {
        Cli::command().print_help()?;
        return Ok(());
    }

    let cwd = env::current_dir().context("Failed to determine current directory")?;
    let config = Config::load(&cwd, cli.config.as_ref(), cli.no_config)
        .context("Failed to load configuration")?;
    log::trace!("Effective config: {:?}", config);

    if cli.batch {
        return run_batch(cli, &config);
    }
    match cli.target.as_deref() {
        Some(_) if cli.is_local() => run_local(&cwd, &config),
        Some(url) => run_remote(url, cli, &config),
        None => Ok(()),
    }
}

fn run_local(cwd: &std::path::Path, config: &Config) -> Result<()> {
    log::debug!("Local mode in {}", cwd.display());
    let document = package_project(cwd, config.general.project_name.as_deref())?;
    let xml = document.to_xml_with_indent(config.output.indent)?;
    output::write_to_stdout(&xml)
}

fn run_remote(url: &str, cli: &Cli, config: &Config) -> Result<()> {
    let mut repo = RepoRef::parse_url(url, &config.remote.default_branch)?;
    if let Some(branch) = &cli.branch {
        repo.branch = branch.clone();
    }
    log::debug!("Remote mode for {}", repo);

    let fetcher = ArchiveFetcher::from_config(&config.remote)?;
    let report = fetcher.fetch_report(&repo, ARCHIVE_EXTENSIONS)?;
    output::write_to_stdout(&report.render())
}

fn run_batch(cli: &Cli, config: &Config) -> Result<()> {
    let repos = config.batch_repositories();
    if repos.is_empty() {
        return Err(AppError::Config(
            "--batch needs at least one [[repositories]] entry in the config file".to_string(),
        )
        .into());
    }

    let fetcher = ArchiveFetcher::from_config(&config.remote)?;
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    for mut repo in repos {
        if let Some(branch) = &cli.branch {
            repo.branch = branch.clone();
        }
        match fetcher.fetch_report(&repo, ARCHIVE_EXTENSIONS) {
            Ok(report) => {
                output::write_to_stdout(&report.render())?;
                succeeded.push(repo);
            }
            Err(e) => {
                log::error!("Failed to package {}: {}", repo, e);
                failed.push((repo, e.to_string()));
            }
        }
    }

    output::print_batch_summary(&succeeded, &failed, cli.quiet);
    if succeeded.is_empty() {
        bail!("All {} repositories failed", failed.len());
    }
    Ok(())
}
