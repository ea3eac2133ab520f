use crate::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
	pub column: String,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
	pub column: String,
	pub ascending: bool,
}

/// A single-table read: equality filters, optional ordering and an inclusive
/// row range (`from..=to`) for pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
	pub table: Table,
	pub columns: Option<String>,
	pub filters: Vec<Filter>,
	pub order: Option<Order>,
	pub range: Option<(usize, usize)>,
}

impl Query {
	pub fn table(table: Table) -> Self {
		Self {
			table,
			columns: None,
			filters: vec![],
			order: None,
			range: None,
		}
	}

	pub fn columns(mut self, columns: impl Into<String>) -> Self {
		self.columns = Some(columns.into());
		self
	}

	pub fn eq(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
		self.filters.push(Filter {
			column: column.into(),
			value: value.into(),
		});
		self
	}

	pub fn order_by(mut self, column: impl Into<String>, ascending: bool) -> Self {
		self.order = Some(Order {
			column: column.into(),
			ascending,
		});
		self
	}

	pub fn range(mut self, from: usize, to: usize) -> Self {
		self.range = Some((from, to));
		self
	}

	pub fn limit(self, count: usize) -> Self {
		self.range(0, count.saturating_sub(1))
	}

	/// Rows per page implied by the range, if any.
	pub fn page_len(&self) -> Option<usize> {
		self.range.map(|(from, to)| to + 1 - from)
	}

	/// PostgREST-style query string parameters.
	pub fn to_params(&self) -> Vec<(String, String)> {
		let mut params = vec![(
			"select".to_string(),
			self.columns.clone().unwrap_or_else(|| "*".to_string()),
		)];

		params.extend(
			self.filters
				.iter()
				.map(|Filter { column, value }| (column.clone(), format!("eq.{value}"))),
		);

		if let Some(Order { column, ascending }) = &self.order {
			params.push((
				"order".to_string(),
				format!("{column}.{}", if *ascending { "asc" } else { "desc" }),
			));
		}

		if let Some((from, to)) = self.range {
			params.push(("offset".to_string(), from.to_string()));
			params.push(("limit".to_string(), (to + 1 - from).to_string()));
		}

		params
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn builds_paginated_params() {
		let query = Query::table(Table::Scans)
			.eq("vessel_id", "v-1")
			.order_by("created_at", true)
			.range(10, 19);

		assert_eq!(query.page_len(), Some(10));
		assert_eq!(
			query.to_params(),
			vec![
				("select".to_string(), "*".to_string()),
				("vessel_id".to_string(), "eq.v-1".to_string()),
				("order".to_string(), "created_at.asc".to_string()),
				("offset".to_string(), "10".to_string()),
				("limit".to_string(), "10".to_string()),
			]
		);
	}

	#[test]
	fn limit_is_a_range_from_zero() {
		let query = Query::table(Table::Assets).columns("id").limit(1);
		assert_eq!(query.range, Some((0, 0)));
	}
}
