//! Shared fixtures for the integration tests

#![allow(dead_code)]

use hs_core::{
	domain::ToolType,
	infra::event::SyncEvent,
	store::{NewAsset, NewScan, NewVessel},
	testing::TestHarness,
};
use serde_json::{json, Value};
use tokio::sync::broadcast;

pub const ORG: &str = "org-1";
pub const ASSET: &str = "asset-1";
pub const VESSEL: &str = "vessel-1";

/// Creates `ASSET` with one vessel `VESSEL` through the local store.
pub async fn local_vessel(harness: &TestHarness) {
	let store = &harness.core.store;

	store
		.create_asset(NewAsset {
			id: Some(ASSET.into()),
			name: "MV Northern Star".into(),
			organization_id: None,
		})
		.await
		.unwrap();
	store
		.create_vessel(
			ASSET,
			NewVessel {
				id: Some(VESSEL.into()),
				name: "Main hull".into(),
			},
		)
		.await
		.unwrap();
}

pub fn scan_with_area(id: &str, valid_area_mm2: f64) -> NewScan {
	NewScan {
		id: Some(id.into()),
		data: Some(json!({ "stats": { "validArea": valid_area_mm2 } })),
		..NewScan::new(format!("Scan {id}"), ToolType::Pec)
	}
}

pub fn asset_row(id: &str, organization_id: &str, name: &str) -> Value {
	json!({
		"id": id,
		"name": name,
		"organization_id": organization_id,
		"created_by": "user-9",
		"created_at": "2025-01-01T00:00:00Z",
	})
}

pub fn vessel_row(id: &str, asset_id: &str) -> Value {
	json!({
		"id": id,
		"asset_id": asset_id,
		"name": "Remote hull",
		"created_at": "2025-01-01T00:00:00Z",
	})
}

/// `count` scan rows with increasing `created_at`.
pub fn scan_rows(vessel_id: &str, count: usize) -> Vec<Value> {
	(0..count)
		.map(|i| {
			json!({
				"id": format!("scan-{i:03}"),
				"vessel_id": vessel_id,
				"name": format!("Scan {i}"),
				"tool_type": "cscan",
				"created_at": format!("2025-01-01T00:{:02}:{:02}Z", i / 60, i % 60),
			})
		})
		.collect()
}

pub fn drain_events(rx: &mut broadcast::Receiver<SyncEvent>) -> Vec<SyncEvent> {
	let mut events = vec![];
	while let Ok(event) = rx.try_recv() {
		events.push(event);
	}
	events
}
