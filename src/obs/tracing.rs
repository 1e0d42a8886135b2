// self
use crate::{_prelude::*, obs::CacheOperation};

/// Future wrapped in a cache operation span.
pub type InstrumentedOperation<F> = tracing::instrument::Instrumented<F>;

/// A span builder used by cache operations.
#[derive(Clone, Debug)]
pub struct CacheSpan {
	span: tracing::Span,
}
impl CacheSpan {
	/// Creates a new span tagged with the provided operation + stage.
	pub fn new(operation: CacheOperation, stage: &'static str) -> Self {
		let span =
			tracing::debug_span!("identity_cache.operation", operation = operation.as_str(), stage);

		Self { span }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> CacheSpanGuard {
		CacheSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedOperation<Fut>
	where
		Fut: Future,
	{
		use tracing::Instrument;

		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`CacheSpan::entered`].
pub struct CacheSpanGuard {
	_guard: tracing::span::EnteredSpan,
}
impl Debug for CacheSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("CacheSpanGuard(..)")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn span_guard_enters_without_subscriber() {
		let guard = CacheSpan::new(CacheOperation::Clear, "test").entered();

		assert_eq!(format!("{guard:?}"), "CacheSpanGuard(..)");
	}

	#[tokio::test]
	async fn instrument_wraps_future() {
		let span = CacheSpan::new(CacheOperation::FindAccessToken, "instrument_wraps_future");
		let value = span.instrument(async { 42 }).await;

		assert_eq!(value, 42);
	}
}
