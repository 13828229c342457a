mod cancel;
mod crawler;
mod error;
mod fetch;
mod html;
mod opt;
mod payloads;
mod probe;
mod report;
mod scanner;
mod surface;
mod ui;
mod utils;

use cancel::CancelSignal;
use error::Error;
use fetch::HttpFetcher;
use opt::{Opt, ScanConfig, ScanOpt, SummaryOpt};
use payloads::PayloadCatalog;
use report::Report;
use scanner::Scanner;

use log::warn;
use structopt::StructOpt;

#[tokio::main]
async fn main() {
    let opt = Opt::from_args();
    let verbose = matches!(&opt, Opt::Scan(scan) if scan.verbose);

    env_logger::Builder::new()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .parse_default_env()
        .init();

    match opt {
        Opt::Scan(scan) => scan_command(scan).await,
        Opt::Summary(summary) => summary_command(summary),
    }
}

async fn scan_command(scan: ScanOpt) {
    let config = match ScanConfig::try_from(scan) {
        Ok(config) => config,
        Err(e) => {
            ui::error("Invalid arguments", &e);
            std::process::exit(2);
        }
    };

    ui::banner();

    if let Err(e) = run(config).await {
        ui::error("Scan failed", &e);
        std::process::exit(1);
    }
}

fn summary_command(opt: SummaryOpt) {
    match Report::load(&opt.input) {
        Ok(report) => {
            ui::info(&format!(
                "{} report for {} taken {}",
                report.tool, report.target, report.time
            ));
            ui::summary(&report.summary());
        }
        Err(e) => {
            ui::error(&format!("Could not read {}", opt.input.display()), &e);
            std::process::exit(1);
        }
    }
}

async fn run(config: ScanConfig) -> Result<(), Error> {
    let catalog = match &config.payloads {
        Some(path) => PayloadCatalog::from_file(path)?,
        None => PayloadCatalog::default(),
    };
    let fetcher = HttpFetcher::new(config.timeout).map_err(Error::Client)?;

    let cancel = CancelSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, finishing with partial results");
                cancel.cancel();
            }
        });
    }

    let outcome = Scanner::new(&fetcher, &config, &catalog, cancel).run().await;
    ui::scan_finished(outcome.pages, outcome.targets.len(), outcome.probes);
    ui::summary(&outcome.report.summary());

    match &config.report {
        Some(path) => {
            outcome.report.save(path)?;
            ui::report_saved(path);
        }
        None => ui::no_report(),
    }

    Ok(())
}
