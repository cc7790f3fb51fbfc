use crate::model::{CandidateQuery, ItemStatus, QueryContext};

/// Top `k` queries that passed Pass-2 with all three scores present, by composite descending.
/// Ties keep their input order.
pub fn select_context<'a, I>(queries: I, k: usize) -> Vec<QueryContext>
where
	I: IntoIterator<Item = &'a CandidateQuery>,
{
	let mut eligible = queries
		.into_iter()
		.filter(|query| query.pass2_status == ItemStatus::Passed)
		.filter_map(|query| {
			Some(QueryContext {
				query: query.query.clone(),
				pass1_score: query.pass1_score()?,
				pass2_score: query.pass2_score()?,
				composite_score: query.composite_score?,
			})
		})
		.collect::<Vec<_>>();

	// Stable sort keeps input order for equal composites.
	eligible.sort_by(|a, b| b.composite_score.total_cmp(&a.composite_score));
	eligible.truncate(k);

	eligible
}
