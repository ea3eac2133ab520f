//! Last-write-wins merge of downloaded entities into the local tree.
//!
//! A remote entity replaces the scalar fields of its local counterpart only if
//! it was modified strictly later. Children are merged recursively. Local
//! entities missing remotely are kept: they may still be waiting in the sync
//! queue. Remote entities whose local deletion is still queued are skipped,
//! together with everything below them.

use chrono::{DateTime, Utc};
use hs_cloud_api::Table;

use crate::{
	domain::{Asset, Document, Scan, Strake, Vessel},
	service::sync_queue::PendingDeletes,
};

fn merge_by_id<T>(
	local: &mut Vec<T>,
	remote: Vec<T>,
	table: Table,
	pending: &PendingDeletes,
	id: impl Fn(&T) -> &str,
	mut merge: impl FnMut(&mut T, T),
) {
	for incoming in remote {
		if pending.contains(table, id(&incoming)) {
			continue;
		}

		match local.iter_mut().find(|existing| id(existing) == id(&incoming)) {
			Some(existing) => merge(existing, incoming),
			None => local.push(incoming),
		}
	}
}

fn is_newer(remote: DateTime<Utc>, local: DateTime<Utc>) -> bool {
	remote > local
}

/// Merges `remote` assets into their organization buckets.
pub(crate) fn merge_assets(
	document: &mut Document,
	remote: Vec<Asset>,
	pending: &PendingDeletes,
) {
	for incoming in remote {
		if pending.contains(Table::Assets, &incoming.id) {
			continue;
		}

		let bucket = document
			.entry(incoming.organization_id.clone())
			.or_default();

		match bucket.asset_mut(&incoming.id) {
			Some(local) => merge_asset(local, incoming, pending),
			None => bucket.assets.push(incoming),
		}
	}
}

fn merge_asset(local: &mut Asset, remote: Asset, pending: &PendingDeletes) {
	if is_newer(remote.last_modified(), local.last_modified()) {
		local.name = remote.name;
		local.created_by = remote.created_by;
		local.updated_at = remote.updated_at;
	}

	merge_by_id(
		&mut local.vessels,
		remote.vessels,
		Table::Vessels,
		pending,
		|v| &v.id,
		|local, remote| merge_vessel(local, remote, pending),
	);
}

fn merge_vessel(local: &mut Vessel, remote: Vessel, pending: &PendingDeletes) {
	if is_newer(remote.last_modified(), local.last_modified()) {
		local.name = remote.name;
		if remote.model3d.is_some() {
			local.model3d = remote.model3d;
		}
	}

	merge_by_id(
		&mut local.strakes,
		remote.strakes,
		Table::Strakes,
		pending,
		|s| &s.id,
		merge_strake,
	);
	merge_by_id(
		&mut local.scans,
		remote.scans,
		Table::Scans,
		pending,
		|s| &s.id,
		merge_scan,
	);
	merge_by_id(
		&mut local.images,
		remote.images,
		Table::VesselImages,
		pending,
		|i| &i.id,
		|_, _| {},
	);
	merge_by_id(
		&mut local.scanning_log,
		remote.scanning_log,
		Table::ScanningLogEntries,
		pending,
		|e| &e.id,
		|_, _| {},
	);
	merge_by_id(
		&mut local.reports,
		remote.reports,
		Table::VesselReports,
		pending,
		|r| &r.id,
		|_, _| {},
	);
}

fn merge_strake(local: &mut Strake, remote: Strake) {
	if is_newer(remote.last_modified(), local.last_modified()) {
		local.name = remote.name;
		local.total_area = remote.total_area;
		local.required_coverage = remote.required_coverage;
		local.updated_at = remote.updated_at;
	}
}

fn merge_scan(local: &mut Scan, remote: Scan) {
	if !is_newer(remote.last_modified(), local.last_modified()) {
		return;
	}

	local.name = remote.name;
	local.tool_type = remote.tool_type;
	local.strake_id = remote.strake_id;

	// An externalized remote payload does not erase a local inline copy.
	if remote.data.is_some() {
		local.data = remote.data;
	}
	if remote.data_url.is_some() {
		local.data_url = remote.data_url;
	}
	if remote.thumbnail.is_some() {
		local.thumbnail = remote.thumbnail;
	}
	if remote.heatmap_only.is_some() {
		local.heatmap_only = remote.heatmap_only;
	}
}

#[cfg(test)]
mod tests {
	use chrono::Duration;

	use super::*;
	use crate::{
		domain::{OrgData, ToolType},
		infra::remote::SyncOperation,
		service::sync_queue::SyncQueueItem,
	};

	fn asset(id: &str, name: &str, at: DateTime<Utc>) -> Asset {
		Asset {
			id: id.into(),
			name: name.into(),
			organization_id: "org".into(),
			created_by: None,
			created_at: at,
			updated_at: None,
			vessels: vec![],
		}
	}

	fn scan(id: &str, name: &str, at: DateTime<Utc>) -> Scan {
		Scan {
			id: id.into(),
			name: name.into(),
			tool_type: ToolType::Pec,
			timestamp: at,
			updated_at: None,
			data: None,
			data_url: None,
			thumbnail: None,
			heatmap_only: None,
			strake_id: None,
		}
	}

	#[test]
	fn newer_remote_overwrites_and_older_is_ignored() {
		let now = Utc::now();
		let mut document = Document::new();
		document.insert(
			"org".into(),
			OrgData {
				assets: vec![asset("a", "local", now), asset("b", "local", now)],
			},
		);

		let mut newer = asset("a", "remote", now);
		newer.updated_at = Some(now + Duration::seconds(5));
		let older = asset("b", "remote", now - Duration::seconds(5));

		merge_assets(&mut document, vec![newer, older], &PendingDeletes::default());

		let assets = &document["org"].assets;
		assert_eq!(assets[0].name, "remote");
		assert_eq!(assets[1].name, "local");
	}

	#[test]
	fn unknown_entities_are_materialized_and_local_ones_kept() {
		let now = Utc::now();
		let mut local = asset("a", "Tanker", now);
		let mut vessel = Vessel::new("v".into(), "Hull".into(), now);
		vessel.scans.push(scan("local-only", "pending upload", now));
		local.vessels.push(vessel);

		let mut document = Document::new();
		document.insert("org".into(), OrgData { assets: vec![local] });

		let mut remote = asset("a", "Tanker", now);
		let mut remote_vessel = Vessel::new("v".into(), "Hull".into(), now);
		remote_vessel.scans.push(scan("s2", "from backend", now));
		remote.vessels.push(remote_vessel);

		let mut foreign = asset("x", "Other org", now);
		foreign.organization_id = "org-2".into();

		merge_assets(&mut document, vec![remote, foreign], &PendingDeletes::default());

		let scans = &document["org"].assets[0].vessels[0].scans;
		assert_eq!(
			scans.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(),
			vec!["local-only", "s2"]
		);
		assert_eq!(document["org-2"].assets[0].id, "x");
	}

	#[test]
	fn externalized_payload_keeps_local_data() {
		let now = Utc::now();
		let mut local = scan("s", "old", now);
		local.data = Some(serde_json::json!({ "stats": { "validArea": 5 } }));

		let mut remote = scan("s", "new", now + Duration::seconds(1));
		remote.data_url = Some("memory://scan-data/s.json".into());

		merge_scan(&mut local, remote);

		assert_eq!(local.name, "new");
		assert!(local.data.is_some());
		assert_eq!(local.data_url.as_deref(), Some("memory://scan-data/s.json"));
	}

	#[test]
	fn queued_deletes_are_not_resurrected() {
		let now = Utc::now();
		let mut local = asset("a", "Tanker", now);
		local
			.vessels
			.push(Vessel::new("v".into(), "Hull".into(), now));

		let mut document = Document::new();
		document.insert("org".into(), OrgData { assets: vec![local] });

		let mut remote = asset("a", "Tanker", now);
		let mut remote_vessel = Vessel::new("v".into(), "Hull".into(), now);
		remote_vessel.scans.push(scan("s1", "deleted here", now));
		remote_vessel.scans.push(scan("s2", "kept", now));
		remote.vessels.push(remote_vessel);
		let gone = asset("b", "Deleted asset", now);

		let queued = [
			SyncQueueItem::new(SyncOperation::delete(Table::Scans, "s1")),
			SyncQueueItem::new(SyncOperation::delete(Table::Assets, "b")),
		];
		let pending = queued.iter().collect::<PendingDeletes>();

		merge_assets(&mut document, vec![remote, gone], &pending);

		let assets = &document["org"].assets;
		assert_eq!(assets.len(), 1);
		assert_eq!(
			assets[0].vessels[0]
				.scans
				.iter()
				.map(|s| s.id.as_str())
				.collect::<Vec<_>>(),
			vec!["s2"]
		);
	}
}
