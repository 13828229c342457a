//! Runs a whole scan: crawl, extract, probe, aggregate.

use std::collections::HashSet;

use log::info;

use crate::cancel::CancelSignal;
use crate::crawler::crawl;
use crate::fetch::Fetch;
use crate::opt::ScanConfig;
use crate::payloads::PayloadCatalog;
use crate::probe::ProbeEngine;
use crate::report::{Aggregator, Finding, Report};
use crate::surface::{extract, Target};
use crate::ui;

/// What a finished (or cancelled) scan produced.
pub struct ScanOutcome {
    pub pages: usize,
    pub targets: Vec<Target>,
    /// Probes attempted, failed ones included.
    pub probes: usize,
    pub report: Report,
}

pub struct Scanner<'a, F> {
    fetcher: &'a F,
    config: &'a ScanConfig,
    catalog: &'a PayloadCatalog,
    cancel: CancelSignal,
}

impl<'a, F: Fetch> Scanner<'a, F> {
    pub fn new(
        fetcher: &'a F,
        config: &'a ScanConfig,
        catalog: &'a PayloadCatalog,
        cancel: CancelSignal,
    ) -> Self {
        Self {
            fetcher,
            config,
            catalog,
            cancel,
        }
    }

    /// Runs the scan to completion, or until the signal fires or the
    /// configured `max_time` runs out.
    pub async fn run(&self) -> ScanOutcome {
        let budget = self.config.max_time.map(|t| self.cancel.cancel_after(t));
        let aggregator = Aggregator::new(self.config.seed.clone());

        ui::info("Crawling target...");
        let pages = crawl(
            self.fetcher,
            &self.config.seed,
            self.config.max_pages,
            self.config.concurrency,
            &self.cancel,
        )
        .await;
        ui::info(&format!("Discovered {} pages", pages.len()));

        let targets = discover_targets(pages.iter().map(|p| (p.body.as_str(), &p.url)));
        let total = self.catalog.len() * targets.len();
        aggregator.set_total(total);
        ui::info(&format!(
            "{} injectable targets, {} probes queued",
            targets.len(),
            total
        ));

        let engine = ProbeEngine::new(
            self.fetcher,
            self.catalog,
            &self.cancel,
            self.config.concurrency,
        );
        let verbose = self.config.verbose;
        let render = |outcome: Option<&Finding>| {
            ui::progress(aggregator.tick());
            if let Some(finding) = outcome {
                ui::finding(finding, verbose);
            }
        };
        engine.probe_all(&targets, &aggregator, &render).await;

        let done = aggregator.progress();
        if self.cancel.is_cancelled() {
            ui::warn(&format!(
                "Scan interrupted after {}/{} probes, keeping partial results",
                done.completed, done.total
            ));
        }

        if let Some(budget) = budget {
            budget.abort();
        }
        let report = aggregator.finish();
        info!(
            "scan of {} done: {} findings",
            self.config.seed,
            report.results.len()
        );

        ScanOutcome {
            pages: pages.len(),
            targets,
            probes: done.completed,
            report,
        }
    }
}

/// Extracts targets from every page, dropping repeats seen on earlier pages.
pub fn discover_targets<'p, I>(pages: I) -> Vec<Target>
where
    I: IntoIterator<Item = (&'p str, &'p url::Url)>,
{
    let mut seen = HashSet::new();
    let mut targets = Vec::new();
    for (body, url) in pages {
        for target in extract(body, url) {
            if seen.insert(target.clone()) {
                targets.push(target);
            }
        }
    }
    targets
}
