//! Payload injection and reflection checks.

use std::ops::Range;
use std::sync::{Arc, LazyLock};

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use regex::Regex;
use similar::{capture_diff_slices, Algorithm, DiffOp, TextDiff};
use tokio::sync::Semaphore;

use crate::cancel::CancelSignal;
use crate::error::FetchError;
use crate::fetch::{fetch_or_cancel, Fetch, FetchRequest};
use crate::payloads::{PayloadCatalog, BASELINE_MARKER};
use crate::report::{Aggregator, Finding, Reflection};
use crate::surface::Target;

static SCRIPT_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<script").unwrap_or_else(|e| panic!("invalid built-in pattern: {e}"))
});

/// Pages with more lines than this (both sides together) are not aligned.
const LINE_LIMIT: usize = 20_000;

/// Changed blocks with more chars than this (both sides together, common
/// prefix and suffix excluded) are not aligned.
const BLOCK_CHAR_LIMIT: usize = 20_000;

/// Classifies how `payload` shows up in `body`.
pub fn detect_context(payload: &str, body: &str) -> Option<Reflection> {
    if !body.contains(payload) {
        return None;
    }
    if SCRIPT_OPEN.is_match(body) {
        Some(Reflection::Script)
    } else {
        Some(Reflection::Reflected)
    }
}

/// Character-level alignment ratio in [0, 1]; 1.0 for identical inputs.
///
/// Lines are aligned first, then every changed block is aligned char by char.
/// Returns `None` instead of a guess when the inputs exceed `LINE_LIMIT` or a
/// changed block exceeds `BLOCK_CHAR_LIMIT`.
pub fn similarity(a: &str, b: &str) -> Option<f64> {
    // a fixed argument order keeps the result symmetric
    let (a, b) = if a <= b { (a, b) } else { (b, a) };
    let total = a.chars().count() + b.chars().count();
    if total == 0 {
        return Some(1.0);
    }

    let lines = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(a, b);
    let (old, new) = (lines.old_slices(), lines.new_slices());
    if old.len() + new.len() > LINE_LIMIT {
        debug!("{} lines to align, similarity skipped", old.len() + new.len());
        return None;
    }

    let mut matched = 0;
    let mut changed: Option<(Range<usize>, Range<usize>)> = None;
    for op in lines.ops() {
        if let DiffOp::Equal { old_index, len, .. } = *op {
            if let Some((o, n)) = changed.take() {
                matched += block_matches(&old[o].concat(), &new[n].concat())?;
            }
            matched += old[old_index..old_index + len]
                .iter()
                .map(|line| line.chars().count())
                .sum::<usize>();
        } else {
            changed = Some(match changed.take() {
                Some((o, n)) => (o.start..op.old_range().end, n.start..op.new_range().end),
                None => (op.old_range(), op.new_range()),
            });
        }
    }
    if let Some((o, n)) = changed {
        matched += block_matches(&old[o].concat(), &new[n].concat())?;
    }

    Some((2 * matched) as f64 / total as f64)
}

/// Length of a longest common char subsequence of a changed block.
fn block_matches(a: &str, b: &str) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];
    if a_mid.is_empty() || b_mid.is_empty() {
        return Some(prefix + suffix);
    }
    if a_mid.len() + b_mid.len() > BLOCK_CHAR_LIMIT {
        debug!(
            "changed block of {}+{} chars, similarity skipped",
            a_mid.len(),
            b_mid.len()
        );
        return None;
    }

    let common: usize = capture_diff_slices(Algorithm::Myers, a_mid, b_mid)
        .iter()
        .map(|op| match *op {
            DiffOp::Equal { len, .. } => len,
            _ => 0,
        })
        .sum();
    Some(prefix + suffix + common)
}

/// Runs `similarity` on the blocking pool so a long alignment does not hold
/// up the requests being polled next to it.
async fn measure(baseline: Arc<str>, body: String) -> Option<f64> {
    match tokio::task::spawn_blocking(move || similarity(&baseline, &body)).await {
        Ok(ratio) => ratio,
        Err(e) => {
            warn!("similarity computation failed: {e}");
            None
        }
    }
}

pub struct ProbeEngine<'a, F> {
    fetcher: &'a F,
    catalog: &'a PayloadCatalog,
    cancel: &'a CancelSignal,
    concurrency: usize,
    limiter: Semaphore,
}

impl<'a, F: Fetch> ProbeEngine<'a, F> {
    /// `concurrency` bounds the number of requests in flight across all
    /// targets.
    pub fn new(
        fetcher: &'a F,
        catalog: &'a PayloadCatalog,
        cancel: &'a CancelSignal,
        concurrency: usize,
    ) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            fetcher,
            catalog,
            cancel,
            concurrency,
            limiter: Semaphore::new(concurrency),
        }
    }

    async fn send(&self, request: &FetchRequest) -> Result<String, FetchError> {
        let Ok(_permit) = self.limiter.acquire().await else {
            return Err(FetchError::Cancelled {
                url: request.url.to_string(),
            });
        };
        fetch_or_cancel(self.fetcher, request, self.cancel).await
    }

    /// Sends the baseline, then every catalog payload into all params of
    /// `target`. Findings come back in catalog order; failed probes are
    /// skipped. `observe` runs after each attempt, with `None` on failure.
    pub async fn probe<O>(&self, target: &Target, observe: &O) -> Vec<Finding>
    where
        O: Fn(Option<&Finding>),
    {
        if self.cancel.is_cancelled() {
            return Vec::new();
        }

        let baseline: Option<Arc<str>> = match self.send(&target.request(BASELINE_MARKER)).await {
            Ok(body) => Some(body.into()),
            Err(e) if e.is_cancelled() => return Vec::new(),
            Err(e) => {
                warn!(
                    "baseline failed for {} {}, findings will carry no diff: {e}",
                    target.method, target.endpoint
                );
                None
            }
        };

        let outcomes: Vec<Option<Finding>> = stream::iter(self.catalog.iter())
            .map(|payload| {
                let baseline = &baseline;
                async move {
                    let request = target.request(payload);
                    let finding = match self.send(&request).await {
                        Ok(body) => {
                            let similarity = match baseline {
                                Some(base) => measure(Arc::clone(base), body.clone()).await,
                                None => None,
                            };
                            Some(Finding {
                                endpoint: target.endpoint.clone(),
                                method: target.method,
                                params: target.params.clone(),
                                payload: payload.to_string(),
                                context: detect_context(payload, &body),
                                similarity,
                                raw_response: body,
                            })
                        }
                        Err(e) if e.is_cancelled() => return None,
                        Err(e) => {
                            warn!("probe {payload:?} against {} failed: {e}", target.endpoint);
                            None
                        }
                    };
                    observe(finding.as_ref());
                    finding
                }
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        outcomes.into_iter().flatten().collect()
    }

    /// Probes every target, up to `concurrency` targets at a time, and hands
    /// the findings to `aggregator` keyed by target index.
    pub async fn probe_all<O>(&self, targets: &[Target], aggregator: &Aggregator, observe: &O)
    where
        O: Fn(Option<&Finding>),
    {
        stream::iter(targets.iter().enumerate())
            .map(|(index, target)| async move {
                let findings = self.probe(target, observe).await;
                debug!("{} findings for {}", findings.len(), target.endpoint);
                aggregator.append(index, findings);
            })
            .buffer_unordered(self.concurrency)
            .for_each(|_| async {})
            .await;
    }
}
