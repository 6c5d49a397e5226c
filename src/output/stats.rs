//! Run statistics
//!
//! This module provides the end-of-run summary of a harvest.

use std::time::Duration;

/// Harvest run statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HarvestStats {
    /// Follow-up requests in the pagination plan
    pub requests_planned: u64,

    /// Listing responses received (pages or days)
    pub listings_fetched: u64,

    /// Detail responses received
    pub details_fetched: u64,

    /// Data rows written to the sink
    pub records_written: u64,

    /// Requests that ended in a terminal failure
    pub failures: u64,

    /// Responses served from the local cache
    pub cache_hits: u64,

    /// Network attempts made, including retries
    pub attempts: u64,

    /// Retries made
    pub retries: u64,

    /// Whether the run was cancelled before finishing its plan
    pub interrupted: bool,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

impl HarvestStats {
    /// Returns the share of responses served from cache as a percentage
    pub fn cache_hit_rate(&self) -> f64 {
        let responses = self.listings_fetched + self.details_fetched;
        if responses == 0 {
            return 0.0;
        }
        (self.cache_hits as f64 / responses as f64) * 100.0
    }
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &HarvestStats) {
    println!("=== Harvest Statistics ===\n");

    println!("Requests:");
    println!("  Planned: {}", stats.requests_planned);
    println!("  Listings fetched: {}", stats.listings_fetched);
    if stats.details_fetched > 0 {
        println!("  Details fetched: {}", stats.details_fetched);
    }
    println!(
        "  Cache hits: {} ({:.1}%)",
        stats.cache_hits,
        stats.cache_hit_rate()
    );
    println!("  Network attempts: {}", stats.attempts);
    println!("  Retries: {}", stats.retries);
    println!("  Failures: {}", stats.failures);
    println!();

    println!("Output:");
    println!("  Records written: {}", stats.records_written);
    println!("  Elapsed: {:.1}s", stats.elapsed.as_secs_f64());

    if stats.interrupted {
        println!("\n⚠ Run was interrupted before the plan completed");
    }
}
