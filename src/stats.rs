//! Usage reporting. Nothing here takes a page lock: values are peeked from the
//! page atomics and may be slightly out of date under concurrent traffic.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

const MIB: f64 = 1024.0 * 1024.0;

/// Usage of one backed page.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PageUsage {
    pub index: usize,
    pub used_bytes: usize,
    pub free_bytes: usize,
    pub percent_free: f64,
}

/// Snapshot of the pool produced by [`crate::Pool::report_usage`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UsageReport {
    /// Backed pages, in index order.
    pub pages: Vec<PageUsage>,
    /// Backed pages without a single chunk in use.
    pub unused_pages: usize,
    pub total_bytes: usize,
    pub used_bytes: usize,
    pub unused_bytes: usize,
    pub percent_used: f64,
}

impl UsageReport {
    /// Builds the report from `(index, free_bytes)` of every backed page.
    pub(crate) fn from_pages(page_size: usize, backed: impl IntoIterator<Item = (usize, usize)>) -> Self {
        let mut report = Self::default();

        for (index, free_bytes) in backed {
            let used_bytes = page_size - free_bytes;

            report.used_bytes += used_bytes;
            report.total_bytes += page_size;

            if free_bytes == page_size {
                report.unused_pages += 1;
            }

            report.pages.push(PageUsage {
                index,
                used_bytes,
                free_bytes,
                percent_free: percent(free_bytes, page_size),
            });
        }

        report.unused_bytes = report.unused_pages * page_size;
        report.percent_used = percent(report.used_bytes, report.total_bytes);

        report
    }

    #[inline]
    pub fn backed_pages(&self) -> usize {
        self.pages.len()
    }
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }

    part as f64 * 100.0 / whole as f64
}

impl fmt::Display for UsageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "total pages: {} unused pages: {} total bytes: {:.2} used: {:.2} ({:.2}%) unused: {:.2}",
            self.backed_pages(),
            self.unused_pages,
            self.total_bytes as f64 / MIB,
            self.used_bytes as f64 / MIB,
            self.percent_used,
            self.unused_bytes as f64 / MIB,
        )?;

        // Full pages are left out.
        write!(f, "page usage (page #/% free):")?;
        for page in self.pages.iter().filter(|page| page.free_bytes > 0) {
            write!(f, " {}/{:.1}", page.index, page.percent_free)?;
        }

        writeln!(f)
    }
}

/// Monotonic counters of the decisions taken by the dispatcher. All updates
/// are relaxed, they are only meant for diagnostics.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pool_allocs: AtomicU64,
    fallback_ineligible: AtomicU64,
    fallback_exhausted: AtomicU64,
    fallback_inactive: AtomicU64,
    pool_frees: AtomicU64,
    fallback_frees: AtomicU64,
    migrations: AtomicU64,
}

/// Why a request ended up on the fallback heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fallback {
    /// Bigger than a chunk or more aligned than a chunk.
    Ineligible,
    /// Every page full, busy or impossible to back.
    Exhausted,
    /// Pool not started or already shut down.
    Inactive,
}

impl Counters {
    #[inline]
    pub fn pool_alloc(&self) {
        self.pool_allocs.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn fallback_alloc(&self, reason: Fallback) {
        let counter = match reason {
            Fallback::Ineligible => &self.fallback_ineligible,
            Fallback::Exhausted => &self.fallback_exhausted,
            Fallback::Inactive => &self.fallback_inactive,
        };

        counter.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn pool_free(&self) {
        self.pool_frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn fallback_free(&self) {
        self.fallback_frees.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn migration(&self) {
        self.migrations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PoolCounters {
        PoolCounters {
            pool_allocs: self.pool_allocs.load(Ordering::Relaxed),
            fallback_ineligible: self.fallback_ineligible.load(Ordering::Relaxed),
            fallback_exhausted: self.fallback_exhausted.load(Ordering::Relaxed),
            fallback_inactive: self.fallback_inactive.load(Ordering::Relaxed),
            pool_frees: self.pool_frees.load(Ordering::Relaxed),
            fallback_frees: self.fallback_frees.load(Ordering::Relaxed),
            migrations: self.migrations.load(Ordering::Relaxed),
        }
    }
}

/// Copy of the dispatcher counters, see [`crate::Pool::counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolCounters {
    /// Requests served from a pool chunk.
    pub pool_allocs: u64,
    /// Requests too big or too aligned for a chunk, and reallocations of
    /// null.
    pub fallback_ineligible: u64,
    /// Eligible requests that found no page with room.
    pub fallback_exhausted: u64,
    /// Requests made while the pool was not active.
    pub fallback_inactive: u64,
    pub pool_frees: u64,
    pub fallback_frees: u64,
    /// Pool chunks moved to the fallback heap by a reallocation.
    pub migrations: u64,
}

impl PoolCounters {
    /// Blocks handed out by the fallback heap, migrated chunks included.
    ///
    /// Once everything has been freed,
    /// `pool_allocs + fallback_allocs() == pool_frees + fallback_frees`.
    /// Reallocating a heap block replaces it in place and counts on neither
    /// side.
    pub fn fallback_allocs(&self) -> u64 {
        self.fallback_ineligible + self.fallback_exhausted + self.fallback_inactive + self.migrations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_report() {
        let report = UsageReport::from_pages(64, Vec::<(usize, usize)>::new());

        assert_eq!(report.backed_pages(), 0);
        assert_eq!(report.total_bytes, 0);
        assert_eq!(report.percent_used, 0.0);
    }

    #[test]
    fn aggregates_pages() {
        let report = UsageReport::from_pages(64, [(0, 16), (2, 64)]);

        assert_eq!(report.backed_pages(), 2);
        assert_eq!(report.unused_pages, 1);
        assert_eq!(report.total_bytes, 128);
        assert_eq!(report.used_bytes, 48);
        assert_eq!(report.unused_bytes, 64);
        assert_eq!(report.percent_used, 37.5);
        assert_eq!(report.pages[0].percent_free, 25.0);
        assert_eq!(report.pages[1].index, 2);
        assert_eq!(report.pages[1].percent_free, 100.0);
    }

    #[test]
    fn display_format() {
        let report = UsageReport::from_pages(1024 * 1024, [(0, 512 * 1024)]);

        assert_eq!(
            report.to_string(),
            "total pages: 1 unused pages: 0 total bytes: 1.00 used: 0.50 (50.00%) unused: 0.00\n\
             page usage (page #/% free): 0/50.0\n"
        );
    }

    #[test]
    fn display_skips_full_pages() {
        let report = UsageReport::from_pages(64, [(0, 0), (1, 16), (2, 0), (3, 64)]);

        let usage = report.to_string();
        let usage = usage.lines().nth(1).unwrap();

        assert_eq!(usage, "page usage (page #/% free): 1/25.0 3/100.0");
        assert_eq!(report.backed_pages(), 4);
    }

    #[test]
    fn counters_split_fallback_reasons() {
        let counters = Counters::default();

        counters.pool_alloc();
        counters.fallback_alloc(Fallback::Ineligible);
        counters.fallback_alloc(Fallback::Exhausted);
        counters.fallback_alloc(Fallback::Exhausted);
        counters.fallback_alloc(Fallback::Inactive);
        counters.migration();

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.pool_allocs, 1);
        assert_eq!(snapshot.fallback_exhausted, 2);
        assert_eq!(snapshot.fallback_allocs(), 5);
    }
}
