//! URL frontier
//!
//! Deduplicated queue of URLs waiting to be fetched. Entries are keyed by
//! canonical URL; once a canonical form has been accepted it is never
//! accepted again for the rest of the session.

use crate::checkpoint::QueuedUrl;
use crate::url::{canonicalize, normalize_url, FilterDecision, UrlFilter};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet, VecDeque};
use tracing::trace;
use url::Url;

/// A URL waiting in the frontier
#[derive(Debug, Clone, PartialEq)]
pub struct FrontierEntry {
    /// URL used for the request (original query order kept)
    pub url: Url,

    /// Dedup key
    pub canonical: String,

    /// Link distance from a start URL; start URLs and sitemap entries are 0
    pub depth: u32,

    /// Page the link was found on
    pub discovered_from: Option<String>,

    /// Sitemap priority, higher first when priority ordering is on
    pub priority: f64,
}

impl FrontierEntry {
    pub fn to_queued(&self) -> QueuedUrl {
        QueuedUrl {
            url: self.url.to_string(),
            depth: self.depth,
            discovered_from: self.discovered_from.clone(),
            priority: self.priority,
        }
    }
}

/// Heap wrapper: descending priority, then insertion order
#[derive(Debug)]
struct Prioritized {
    seq: u64,
    entry: FrontierEntry,
}

impl Ord for Prioritized {
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .priority
            .total_cmp(&other.entry.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Prioritized {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Prioritized {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Prioritized {}

#[derive(Debug)]
enum Queue {
    Fifo(VecDeque<FrontierEntry>),
    Priority(BinaryHeap<Prioritized>),
}

/// Counts of URLs the frontier turned away
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrontierStats {
    pub accepted: u64,
    pub duplicate: u64,
    pub too_deep: u64,
    pub filtered: u64,
    pub invalid: u64,
}

/// The crawl frontier
///
/// Owned by the coordinator task; workers hand discovered links back to it
/// rather than touching it directly.
#[derive(Debug)]
pub struct Frontier {
    filter: UrlFilter,
    depth_limit: Option<u32>,
    queue: Queue,
    seen: HashSet<String>,
    seq: u64,
    stats: FrontierStats,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `filter` - Domain allow-list and include/exclude rules
    /// * `depth_limit` - Deepest link depth accepted, `None` for unlimited
    /// * `by_priority` - Order by descending priority instead of FIFO
    pub fn new(filter: UrlFilter, depth_limit: Option<u32>, by_priority: bool) -> Self {
        let queue = if by_priority {
            Queue::Priority(BinaryHeap::new())
        } else {
            Queue::Fifo(VecDeque::new())
        };
        Self {
            filter,
            depth_limit,
            queue,
            seen: HashSet::new(),
            seq: 0,
            stats: FrontierStats::default(),
        }
    }

    /// Offers a URL to the frontier
    ///
    /// # Returns
    ///
    /// `false` if the URL is filtered out, already seen, or deeper than the
    /// depth limit
    pub fn enqueue(&mut self, url: &Url, depth: u32, parent: Option<&str>) -> bool {
        self.enqueue_with_priority(url, depth, parent, 0.0)
    }

    /// Like [`Frontier::enqueue`] with an explicit sitemap priority
    pub fn enqueue_with_priority(
        &mut self,
        url: &Url,
        depth: u32,
        parent: Option<&str>,
        priority: f64,
    ) -> bool {
        if let Some(limit) = self.depth_limit {
            if depth > limit {
                self.stats.too_deep += 1;
                return false;
            }
        }

        let decision = self.filter.decide(url);
        if decision != FilterDecision::Accept {
            trace!(url = %url, ?decision, "Filtered");
            self.stats.filtered += 1;
            return false;
        }

        let mut request_url = url.clone();
        request_url.set_fragment(None);
        let canonical = canonicalize(&request_url);
        if !self.seen.insert(canonical.clone()) {
            self.stats.duplicate += 1;
            return false;
        }

        let entry = FrontierEntry {
            url: request_url,
            canonical,
            depth,
            discovered_from: parent.map(str::to_string),
            priority,
        };
        self.push(entry);
        self.stats.accepted += 1;
        true
    }

    /// Parses and offers a URL string
    pub fn enqueue_str(&mut self, url: &str, depth: u32, parent: Option<&str>) -> bool {
        match normalize_url(url) {
            Ok(parsed) => self.enqueue(&parsed, depth, parent),
            Err(e) => {
                trace!(url, error = %e, "Invalid URL");
                self.stats.invalid += 1;
                false
            }
        }
    }

    /// Restores a persisted queue entry
    pub fn restore(&mut self, queued: &QueuedUrl) -> bool {
        match normalize_url(&queued.url) {
            Ok(parsed) => self.enqueue_with_priority(
                &parsed,
                queued.depth,
                queued.discovered_from.as_deref(),
                queued.priority,
            ),
            Err(_) => {
                self.stats.invalid += 1;
                false
            }
        }
    }

    fn push(&mut self, entry: FrontierEntry) {
        match &mut self.queue {
            Queue::Fifo(queue) => queue.push_back(entry),
            Queue::Priority(heap) => {
                heap.push(Prioritized {
                    seq: self.seq,
                    entry,
                });
                self.seq += 1;
            }
        }
    }

    /// Removes the next entry, or `None` when the frontier is exhausted
    pub fn dequeue(&mut self) -> Option<FrontierEntry> {
        match &mut self.queue {
            Queue::Fifo(queue) => queue.pop_front(),
            Queue::Priority(heap) => heap.pop().map(|p| p.entry),
        }
    }

    /// Marks a canonical URL as seen without queueing it
    pub fn mark_seen(&mut self, canonical: &str) {
        self.seen.insert(canonical.to_string());
    }

    pub fn is_seen(&self, canonical: &str) -> bool {
        self.seen.contains(canonical)
    }

    pub fn len(&self) -> usize {
        match &self.queue {
            Queue::Fifo(queue) => queue.len(),
            Queue::Priority(heap) => heap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of distinct canonical URLs ever accepted or marked seen
    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    pub fn stats(&self) -> &FrontierStats {
        &self.stats
    }

    /// Snapshot of waiting entries in dequeue order, for the checkpoint
    pub fn pending_entries(&self) -> Vec<QueuedUrl> {
        match &self.queue {
            Queue::Fifo(queue) => queue.iter().map(FrontierEntry::to_queued).collect(),
            Queue::Priority(heap) => {
                let mut entries: Vec<&Prioritized> = heap.iter().collect();
                entries.sort_by(|a, b| b.cmp(a));
                entries.iter().map(|p| p.entry.to_queued()).collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PathPattern;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn frontier(depth_limit: Option<u32>, by_priority: bool) -> Frontier {
        let filter = UrlFilter::new(vec!["example.com".to_string()], &[], &[]).unwrap();
        Frontier::new(filter, depth_limit, by_priority)
    }

    #[test]
    fn test_dedup_on_canonical_form() {
        let mut f = frontier(None, false);
        assert!(f.enqueue(&url("https://example.com/p?b=2&a=1"), 0, None));
        assert!(!f.enqueue(&url("https://EXAMPLE.com:443/p?a=1&b=2#frag"), 0, None));
        assert_eq!(f.len(), 1);
        assert_eq!(f.stats().duplicate, 1);
    }

    #[test]
    fn test_request_url_keeps_query_order() {
        let mut f = frontier(None, false);
        f.enqueue(&url("https://example.com/p?b=2&a=1#x"), 0, None);
        let entry = f.dequeue().unwrap();
        assert_eq!(entry.url.as_str(), "https://example.com/p?b=2&a=1");
        assert_eq!(entry.canonical, "https://example.com/p?a=1&b=2");
    }

    #[test]
    fn test_dequeued_url_not_reaccepted() {
        let mut f = frontier(None, false);
        f.enqueue(&url("https://example.com/a"), 0, None);
        f.dequeue().unwrap();
        assert!(!f.enqueue(&url("https://example.com/a"), 1, None));
        assert!(f.is_empty());
    }

    #[test]
    fn test_depth_limit() {
        let mut f = frontier(Some(1), false);
        assert!(f.enqueue(&url("https://example.com/1"), 1, None));
        assert!(!f.enqueue(&url("https://example.com/2"), 2, None));
        assert_eq!(f.stats().too_deep, 1);
    }

    #[test]
    fn test_filter_applied() {
        let filter = UrlFilter::new(
            vec!["example.com".to_string()],
            &[PathPattern::prefix("/docs/")],
            &[PathPattern::glob("*.pdf")],
        )
        .unwrap();
        let mut f = Frontier::new(filter, None, false);

        assert!(!f.enqueue(&url("https://example.com/docs/x.pdf"), 0, None));
        assert!(f.enqueue(&url("https://example.com/docs/x.html"), 0, None));
        assert!(!f.enqueue(&url("https://example.com/other/x.html"), 0, None));
        assert!(!f.enqueue(&url("https://other.org/docs/y.html"), 0, None));
        assert_eq!(f.stats().filtered, 3);
    }

    #[test]
    fn test_fifo_order() {
        let mut f = frontier(None, false);
        for path in ["a", "b", "c"] {
            f.enqueue(&url(&format!("https://example.com/{}", path)), 0, None);
        }
        let order: Vec<String> = std::iter::from_fn(|| f.dequeue())
            .map(|e| e.url.path().to_string())
            .collect();
        assert_eq!(order, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn test_priority_order_with_fifo_tiebreak() {
        let mut f = frontier(None, true);
        f.enqueue_with_priority(&url("https://example.com/low"), 0, None, 0.1);
        f.enqueue_with_priority(&url("https://example.com/first-high"), 0, None, 0.9);
        f.enqueue_with_priority(&url("https://example.com/mid"), 0, None, 0.5);
        f.enqueue_with_priority(&url("https://example.com/second-high"), 0, None, 0.9);

        let snapshot: Vec<String> = f.pending_entries().into_iter().map(|q| q.url).collect();
        let order: Vec<String> = std::iter::from_fn(|| f.dequeue())
            .map(|e| e.url.to_string())
            .collect();
        assert_eq!(
            order,
            vec![
                "https://example.com/first-high",
                "https://example.com/second-high",
                "https://example.com/mid",
                "https://example.com/low",
            ]
        );
        assert_eq!(snapshot, order);
    }

    #[test]
    fn test_mark_seen_blocks_enqueue() {
        let mut f = frontier(None, false);
        f.mark_seen("https://example.com/done");
        assert!(!f.enqueue(&url("https://example.com/done"), 0, None));
        assert_eq!(f.seen_count(), 1);
    }

    #[test]
    fn test_restore_keeps_depth_and_parent() {
        let mut f = frontier(None, false);
        let queued = QueuedUrl {
            url: "https://example.com/x".to_string(),
            depth: 3,
            discovered_from: Some("https://example.com/".to_string()),
            priority: 0.0,
        };
        assert!(f.restore(&queued));
        let entry = f.dequeue().unwrap();
        assert_eq!(entry.depth, 3);
        assert_eq!(entry.discovered_from.as_deref(), Some("https://example.com/"));
    }

    #[test]
    fn test_invalid_url_string_rejected() {
        let mut f = frontier(None, false);
        assert!(!f.enqueue_str("ftp://example.com/file", 0, None));
        assert!(!f.enqueue_str("not a url", 0, None));
        assert_eq!(f.stats().invalid, 2);
    }
}
