//! Crawl frontier for site-mode jobs
//!
//! The frontier is a FIFO queue of `(url, depth)` entries plus the set of
//! every URL ever enqueued. It enforces the crawl boundaries:
//! - a URL is enqueued at most once (first-discovered depth wins)
//! - nothing deeper than `max_depth` is enqueued (the root is depth 0)
//! - nothing on another host is enqueued when `same_origin_only` is set;
//!   a redirected root adds its final host via [`CrawlFrontier::rebase`]
//! - at most `max_pages` entries are ever handed out

use crate::config::ScrapeOptions;
use crate::url::{normalize, same_host};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting to be fetched, with its link distance from the root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
}

/// Visited set and FIFO queue for one site crawl
#[derive(Debug)]
pub struct CrawlFrontier {
    /// URLs whose hosts count as in-site
    anchors: Vec<Url>,
    seen: HashSet<String>,
    queue: VecDeque<FrontierEntry>,
    max_depth: u32,
    max_pages: u32,
    same_origin_only: bool,
    dequeued: u32,
}

impl CrawlFrontier {
    /// Creates a frontier seeded with `root` at depth 0
    pub fn new(root: &Url, options: &ScrapeOptions) -> Self {
        let root = normalize(root.clone()).unwrap_or_else(|_| root.clone());
        let mut frontier = Self {
            anchors: vec![root.clone()],
            seen: HashSet::new(),
            queue: VecDeque::new(),
            max_depth: options.max_depth,
            max_pages: options.max_pages,
            same_origin_only: options.same_origin_only,
            dequeued: 0,
        };
        frontier.seen.insert(root.as_str().to_string());
        frontier.queue.push_back(FrontierEntry {
            url: root,
            depth: 0,
        });
        frontier
    }

    /// Accepts the host a fetched URL finally landed on
    ///
    /// Called with the root's post-redirect URL so links resolved against
    /// it stay in-site. The final URL is marked seen.
    pub fn rebase(&mut self, final_url: &Url) {
        let Ok(url) = normalize(final_url.clone()) else {
            return;
        };
        if !self.anchors.iter().any(|anchor| same_host(anchor, &url)) {
            tracing::debug!("Site root redirected to {}, following its host", url);
            self.anchors.push(url.clone());
        }
        self.seen.insert(url.as_str().to_string());
    }

    fn in_site(&self, url: &Url) -> bool {
        self.anchors.iter().any(|anchor| same_host(anchor, url))
    }

    /// Returns true once nothing more will be handed out
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() || self.dequeued >= self.max_pages
    }

    /// Number of entries handed out so far
    pub fn dequeued(&self) -> u32 {
        self.dequeued
    }

    /// Number of entries waiting
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Takes the next entry in FIFO order
    pub fn next(&mut self) -> Option<FrontierEntry> {
        if self.dequeued >= self.max_pages {
            self.queue.clear();
            return None;
        }
        let entry = self.queue.pop_front()?;
        self.dequeued += 1;
        Some(entry)
    }

    /// Takes up to `k` entries in FIFO order
    pub fn next_batch(&mut self, k: usize) -> Vec<FrontierEntry> {
        let mut batch = Vec::with_capacity(k);
        while batch.len() < k {
            match self.next() {
                Some(entry) => batch.push(entry),
                None => break,
            }
        }
        batch
    }

    /// Offers links discovered on a page at `from_depth`
    ///
    /// Candidates are normalized and silently dropped when already seen,
    /// too deep, off-site (if restricted) or not http(s). Returns the
    /// number of entries actually enqueued.
    pub fn offer<'a, I>(&mut self, candidates: I, from_depth: u32) -> usize
    where
        I: IntoIterator<Item = &'a Url>,
    {
        if self.dequeued >= self.max_pages {
            self.queue.clear();
            return 0;
        }

        let depth = from_depth.saturating_add(1);
        if depth > self.max_depth {
            return 0;
        }

        let mut accepted = 0;
        for candidate in candidates {
            let url = match normalize(candidate.clone()) {
                Ok(url) => url,
                Err(_) => continue,
            };
            if self.same_origin_only && !self.in_site(&url) {
                continue;
            }
            if !self.seen.insert(url.as_str().to_string()) {
                continue;
            }
            self.queue.push_back(FrontierEntry { url, depth });
            accepted += 1;
        }
        accepted
    }
}
