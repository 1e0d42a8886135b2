// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::obs::{CacheOperation, CacheOutcome};

/// Records an operation outcome via the global metrics recorder (when enabled).
pub fn record_operation_outcome(operation: CacheOperation, outcome: CacheOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"identity_cache_operation_total",
			"operation" => operation.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (operation, outcome);
	}
}

/// Thread-safe counters owned by the application and shared with the engines it builds.
#[derive(Debug, Default)]
pub struct CacheMetrics {
	hits: AtomicU64,
	extended_hits: AtomicU64,
	misses: AtomicU64,
	saves: AtomicU64,
	evicted_access_tokens: AtomicU64,
	removals: AtomicU64,
	notification_failures: AtomicU64,
}
impl CacheMetrics {
	/// Access token lookups served from cache, extended-lifetime hits included.
	pub fn hits(&self) -> u64 {
		self.hits.load(Ordering::Relaxed)
	}

	/// Hits that relied on the extended expiry.
	pub fn extended_hits(&self) -> u64 {
		self.extended_hits.load(Ordering::Relaxed)
	}

	/// Access token lookups that found nothing usable.
	pub fn misses(&self) -> u64 {
		self.misses.load(Ordering::Relaxed)
	}

	/// Token responses written.
	pub fn saves(&self) -> u64 {
		self.saves.load(Ordering::Relaxed)
	}

	/// Access tokens removed by intersecting-scope eviction.
	pub fn evicted_access_tokens(&self) -> u64 {
		self.evicted_access_tokens.load(Ordering::Relaxed)
	}

	/// Accounts removed.
	pub fn removals(&self) -> u64 {
		self.removals.load(Ordering::Relaxed)
	}

	/// Notification hooks that returned an error.
	pub fn notification_failures(&self) -> u64 {
		self.notification_failures.load(Ordering::Relaxed)
	}

	pub(crate) fn record_hit(&self, extended: bool) {
		self.hits.fetch_add(1, Ordering::Relaxed);

		if extended {
			self.extended_hits.fetch_add(1, Ordering::Relaxed);
		}
	}

	pub(crate) fn record_miss(&self) {
		self.misses.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_save(&self, evicted: usize) {
		self.saves.fetch_add(1, Ordering::Relaxed);
		self.evicted_access_tokens.fetch_add(evicted as u64, Ordering::Relaxed);
	}

	pub(crate) fn record_removal(&self) {
		self.removals.fetch_add(1, Ordering::Relaxed);
	}

	pub(crate) fn record_notification_failure(&self) {
		self.notification_failures.fetch_add(1, Ordering::Relaxed);
	}
}
