//! Crawl frontier
//!
//! Breadth-first queue of pages to visit. Every URL is queued at most once per run
//! and the number of pages handed out is capped, so a crawl always terminates.

use super::parser::resolve_links;
use crate::extract::HtmlPage;
use crate::url::same_site;
use std::collections::{HashSet, VecDeque};
use url::Url;

/// Outcome of expanding the frontier from one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Acceptable links found on the page
    pub found: usize,

    /// Links that were new and got queued
    pub added: usize,
}

/// FIFO queue of URLs with a visited cap
#[derive(Debug)]
pub struct CrawlFrontier {
    queue: VecDeque<Url>,
    seen: HashSet<String>,
    pages_visited: usize,
    max_pages: usize,
}

impl CrawlFrontier {
    /// Creates a frontier holding the seed URLs
    ///
    /// Seeds count as seen, so later links to them are not queued again.
    pub fn new<I>(seeds: I, max_pages: usize) -> Self
    where
        I: IntoIterator<Item = Url>,
    {
        let mut frontier = Self {
            queue: VecDeque::new(),
            seen: HashSet::new(),
            pages_visited: 0,
            max_pages,
        };
        for seed in seeds {
            frontier.enqueue(seed);
        }
        frontier
    }

    fn enqueue(&mut self, url: Url) -> bool {
        if self.seen.insert(url.as_str().to_string()) {
            self.queue.push_back(url);
            true
        } else {
            false
        }
    }

    /// Hands out the next page to visit
    ///
    /// # Returns
    ///
    /// * `Some(url)` - The oldest queued URL; counts as one visited page
    /// * `None` - The queue is empty or the page cap is reached
    pub fn next(&mut self) -> Option<Url> {
        if self.is_exhausted() {
            return None;
        }
        let url = self.queue.pop_front()?;
        self.pages_visited += 1;
        tracing::trace!("Frontier pop {} ({} visited)", url, self.pages_visited);
        Some(url)
    }

    /// Queues the links a fetched page points at
    ///
    /// # Arguments
    ///
    /// * `base_url` - URL the page was fetched from
    /// * `html` - Page markup
    /// * `link_selectors` - CSS selectors for link elements
    /// * `same_domain_only` - Drop links to other hosts
    pub fn ingest_page(
        &mut self,
        base_url: &Url,
        html: &str,
        link_selectors: &[String],
        same_domain_only: bool,
    ) -> IngestReport {
        let links: Vec<Url> = {
            let page = HtmlPage::parse(html);
            let mut links: Vec<Url> = Vec::new();
            for selector in link_selectors {
                for link in resolve_links(&page, base_url, selector) {
                    if !links.contains(&link) {
                        links.push(link);
                    }
                }
            }
            links
        };

        let mut report = IngestReport::default();
        for link in links {
            if same_domain_only && !same_site(&link, base_url) {
                tracing::trace!("Frontier skip cross-site {}", link);
                continue;
            }
            report.found += 1;
            if self.enqueue(link) {
                report.added += 1;
            }
        }

        tracing::debug!(
            "Ingested {}: {} links, {} new, {} queued",
            base_url,
            report.found,
            report.added,
            self.queue.len()
        );
        report
    }

    /// URLs waiting in the queue
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() || self.pages_visited >= self.max_pages
    }

    pub fn pages_visited(&self) -> usize {
        self.pages_visited
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
}
