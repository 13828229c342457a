//! Same-host breadth-first crawler.

use std::collections::{HashSet, VecDeque};

use futures::stream::{FuturesUnordered, StreamExt};
use log::{debug, info, warn};
use url::Url;

use crate::cancel::CancelSignal;
use crate::fetch::{fetch_or_cancel, Fetch, FetchRequest};
use crate::html;

/// A page that was fetched successfully during the crawl.
#[derive(Clone, Debug, PartialEq)]
pub struct Page {
    pub url: Url,
    pub body: String,
}

/// Pending and visited URLs for one crawl.
pub struct Frontier {
    scope: Option<String>,
    queue: VecDeque<Url>,
    /// Everything ever enqueued, so a URL is queued at most once.
    seen: HashSet<Url>,
    visited: usize,
    max_pages: usize,
}

impl Frontier {
    pub fn new(seed: &Url, max_pages: usize) -> Self {
        let seed = strip_fragment(seed);
        let mut frontier = Self {
            scope: seed.host_str().map(str::to_string),
            queue: VecDeque::new(),
            seen: HashSet::new(),
            visited: 0,
            max_pages,
        };
        frontier.seen.insert(seed.clone());
        frontier.queue.push_back(seed);
        frontier
    }

    pub fn in_scope(&self, url: &Url) -> bool {
        self.scope.is_some() && url.host_str() == self.scope.as_deref()
    }

    /// Queues `url` if it is in scope and new. Returns whether it was queued.
    pub fn push(&mut self, url: &Url) -> bool {
        let url = strip_fragment(url);
        if !self.in_scope(&url) || self.seen.contains(&url) {
            return false;
        }
        self.seen.insert(url.clone());
        self.queue.push_back(url);
        true
    }

    /// Dequeues the next URL and counts it as visited, unless the page budget
    /// is spent or nothing is queued.
    pub fn pop(&mut self) -> Option<Url> {
        if self.visited >= self.max_pages {
            return None;
        }
        let url = self.queue.pop_front()?;
        self.visited += 1;
        Some(url)
    }

    pub fn visited(&self) -> usize {
        self.visited
    }
}

fn strip_fragment(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_fragment(None);
    url
}

/// Crawls from `seed`, keeping up to `concurrency` fetches in flight.
///
/// Pages are returned in dequeue order. Pages that fail to load are left out
/// but still count against `max_pages`. On cancellation the pages fetched so
/// far are returned.
pub async fn crawl<F: Fetch>(
    fetcher: &F,
    seed: &Url,
    max_pages: usize,
    concurrency: usize,
    cancel: &CancelSignal,
) -> Vec<Page> {
    let mut frontier = Frontier::new(seed, max_pages);
    let mut in_flight = FuturesUnordered::new();
    let mut pages: Vec<(usize, Page)> = Vec::new();
    let mut order = 0usize;

    loop {
        while in_flight.len() < concurrency.max(1) && !cancel.is_cancelled() {
            let Some(url) = frontier.pop() else { break };
            let slot = order;
            order += 1;
            in_flight.push(async move {
                let request = FetchRequest::get(url);
                let result = fetch_or_cancel(fetcher, &request, cancel).await;
                (slot, request.url, result)
            });
        }

        let Some((slot, url, result)) = in_flight.next().await else {
            break;
        };

        match result {
            Ok(body) => {
                let mut queued = 0;
                for href in html::parse(&body).anchors {
                    match url.join(&href) {
                        Ok(link) => {
                            if frontier.push(&link) {
                                queued += 1;
                            }
                        }
                        Err(e) => debug!("skipping link {href:?} on {url}: {e}"),
                    }
                }
                debug!("crawled {url}, {queued} new links");
                pages.push((slot, Page { url, body }));
            }
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!("crawler dropped {url}: {e}"),
        }
    }

    if cancel.is_cancelled() {
        info!("crawl cancelled after {} pages", frontier.visited());
    }

    pages.sort_by_key(|(slot, _)| *slot);
    pages.into_iter().map(|(_, page)| page).collect()
}
