use std::collections::HashMap;

use time::OffsetDateTime;

use crate::model::{AggregatedResult, SearchResult};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
	pub inserted: usize,
	pub merged: usize,
}

/// URL-keyed result set in first-insertion order.
///
/// A URL is stored once. Merging it again only unions the source queries; title, rank and
/// `first_seen_at` keep the values from the first insertion.
#[derive(Clone, Debug, Default)]
pub struct ResultAggregator {
	results: Vec<AggregatedResult>,
	index: HashMap<String, usize>,
}
impl ResultAggregator {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn merge(
		&mut self,
		source_query: &str,
		results: &[SearchResult],
		now: OffsetDateTime,
	) -> MergeStats {
		let mut stats = MergeStats::default();

		for result in results {
			let url = result.url.trim();

			if url.is_empty() {
				continue;
			}

			if let Some(position) = self.index.get(url).copied() {
				let existing = &mut self.results[position];

				if !existing.source_queries.iter().any(|query| query == source_query) {
					existing.source_queries.push(source_query.to_string());
				}

				stats.merged += 1;

				continue;
			}

			self.index.insert(url.to_string(), self.results.len());
			self.results.push(AggregatedResult {
				url: url.to_string(),
				title: result.title.clone(),
				description: result.description.clone(),
				result_type: result.result_type.clone(),
				rank: result.rank,
				source_queries: vec![source_query.to_string()],
				first_seen_at: now,
			});

			stats.inserted += 1;
		}

		stats
	}

	pub fn len(&self) -> usize {
		self.results.len()
	}

	pub fn is_empty(&self) -> bool {
		self.results.is_empty()
	}

	pub fn get(&self, url: &str) -> Option<&AggregatedResult> {
		self.index.get(url.trim()).map(|position| &self.results[*position])
	}

	pub fn results(&self) -> &[AggregatedResult] {
		&self.results
	}

	pub fn into_results(self) -> Vec<AggregatedResult> {
		self.results
	}
}

#[cfg(test)]
mod tests {
	use time::macros::datetime;

	use super::*;

	fn result(url: &str, rank: u32) -> SearchResult {
		SearchResult {
			url: url.to_string(),
			title: format!("Title {rank}"),
			description: String::new(),
			result_type: "profile".to_string(),
			rank,
		}
	}

	#[test]
	fn duplicate_url_unions_sources_and_keeps_first_seen() {
		let mut aggregator = ResultAggregator::new();
		let first = datetime!(2026-01-01 00:00 UTC);
		let later = datetime!(2026-01-02 00:00 UTC);

		let stats = aggregator.merge("q1", &[result("https://a.example", 1)], first);

		assert_eq!(stats, MergeStats { inserted: 1, merged: 0 });

		let stats = aggregator.merge("q2", &[result("https://a.example", 7)], later);

		assert_eq!(stats, MergeStats { inserted: 0, merged: 1 });
		assert_eq!(aggregator.len(), 1);

		let entry = aggregator.get("https://a.example").expect("Entry must exist.");

		assert_eq!(entry.source_queries, vec!["q1".to_string(), "q2".to_string()]);
		assert_eq!(entry.first_seen_at, first);
		assert_eq!(entry.rank, 1);
	}

	#[test]
	fn same_query_is_not_listed_twice() {
		let mut aggregator = ResultAggregator::new();
		let now = datetime!(2026-01-01 00:00 UTC);

		aggregator.merge("q1", &[result("https://a.example", 1)], now);
		aggregator.merge("q1", &[result("https://a.example", 1)], now);

		assert_eq!(aggregator.results()[0].source_queries, vec!["q1".to_string()]);
	}

	#[test]
	fn keeps_insertion_order_and_skips_empty_urls() {
		let mut aggregator = ResultAggregator::new();
		let now = datetime!(2026-01-01 00:00 UTC);

		aggregator.merge(
			"q1",
			&[result("https://b.example", 1), result("  ", 2), result("https://a.example", 3)],
			now,
		);

		let urls = aggregator.results().iter().map(|r| r.url.as_str()).collect::<Vec<_>>();

		assert_eq!(urls, vec!["https://b.example", "https://a.example"]);
	}
}
