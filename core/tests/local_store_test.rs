//! Local store: tenant isolation, idempotent creates, cloud-first rollback,
//! strake coverage and persistence

mod helpers;

use std::time::Duration;

use hs_cloud_api::{Bucket, Error, Table};
use hs_core::{
	access::AccessError,
	domain::{BlobRef, SYSTEM_ORGANIZATION},
	infra::{event::SyncEvent, storage::StorageKey},
	store::{
		AssetPatch, EntityKind, LogEntryPatch, NewAsset, NewLogEntry, NewReport, NewScan,
		NewStrake, NewVesselImage, StoreError,
	},
	testing::{MemoryBlobStore, TestHarness},
};
use serde_json::json;
use tokio::time::Instant;
use tracing_test::traced_test;

use helpers::*;

fn strake(id: &str, total_area: f64, required_coverage: f64) -> NewStrake {
	NewStrake {
		id: Some(id.into()),
		name: format!("Strake {id}"),
		total_area,
		required_coverage,
	}
}

fn hull_photo(id: &str) -> NewVesselImage {
	NewVesselImage {
		id: Some(id.into()),
		name: "Bow".into(),
		filename: Some("bow.jpg".into()),
		image: BlobRef::inline(vec![0xff, 0xd8, 0xff], "image/jpeg"),
	}
}

fn on_strake(scan: NewScan, strake_id: &str) -> NewScan {
	NewScan {
		strake_id: Some(strake_id.into()),
		..scan
	}
}

#[tokio::test]
async fn organizations_only_see_their_own_assets() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;

	harness
		.identity
		.sign_in(TestHarness::session("user-2", "org-2", "Baltic Survey"));

	let store = &harness.core.store;
	assert!(store.assets().unwrap().is_empty());
	assert!(store.asset(ASSET).unwrap().is_none());
	assert!(store.get_org_data(ORG).is_err());

	let err = store
		.update_asset(
			ASSET,
			AssetPatch {
				name: Some("Hijacked".into()),
			},
		)
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		StoreError::Access(AccessError::TenantMismatch { .. })
	));

	// Creating into another organization is refused as well.
	let err = store
		.create_asset(NewAsset {
			id: None,
			name: "Elsewhere".into(),
			organization_id: Some(ORG.into()),
		})
		.await
		.unwrap_err();
	assert!(matches!(err, StoreError::Access(_)));
}

#[tokio::test]
async fn system_members_see_every_organization() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;

	harness
		.identity
		.sign_in(TestHarness::session("user-2", "org-2", "Baltic Survey"));
	harness
		.core
		.store
		.create_asset(NewAsset {
			id: Some("asset-2".into()),
			name: "MV Baltic".into(),
			organization_id: None,
		})
		.await
		.unwrap();

	harness
		.identity
		.sign_in(TestHarness::session("admin", "org-sys", SYSTEM_ORGANIZATION));

	let mut ids = harness
		.core
		.store
		.assets()
		.unwrap()
		.into_iter()
		.map(|asset| asset.id)
		.collect::<Vec<_>>();
	ids.sort();
	assert_eq!(ids, vec!["asset-1", "asset-2"]);

	let asset = harness
		.core
		.store
		.update_asset(
			"asset-2",
			AssetPatch {
				name: Some("MV Baltic II".into()),
			},
		)
		.await
		.unwrap();
	assert_eq!(asset.organization_id, "org-2");
}

#[tokio::test]
async fn reads_and_writes_need_a_session() {
	let harness = TestHarness::new().await.unwrap();
	harness.identity.sign_out();

	let store = &harness.core.store;
	assert!(matches!(
		store.assets().unwrap_err(),
		StoreError::Access(AccessError::Unauthenticated)
	));
	assert!(matches!(
		store
			.create_asset(NewAsset {
				id: None,
				name: "Orphan".into(),
				organization_id: None,
			})
			.await
			.unwrap_err(),
		StoreError::Access(AccessError::Unauthenticated)
	));
	assert!(harness.core.queue.is_empty().await);
}

#[tokio::test]
async fn creating_an_existing_id_is_a_no_op() {
	let harness = TestHarness::new().await.unwrap();
	let store = &harness.core.store;

	let input = NewAsset {
		id: Some(ASSET.into()),
		name: "MV Northern Star".into(),
		organization_id: None,
	};
	let first = store.create_asset(input.clone()).await.unwrap();
	let second = store
		.create_asset(NewAsset {
			name: "Renamed".into(),
			..input
		})
		.await
		.unwrap();

	assert_eq!(first, second);
	assert_eq!(store.assets().unwrap().len(), 1);
	assert_eq!(harness.core.queue.len().await, 1);
}

#[tokio::test]
async fn strake_coverage_sums_member_scans() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	let store = &harness.core.store;

	store
		.create_strake(ASSET, VESSEL, strake("k1", 10.0, 50.0))
		.await
		.unwrap();
	assert!(harness.backend.row(Table::Strakes, "k1").is_some());

	for id in ["s1", "s2"] {
		store
			.create_scan(ASSET, VESSEL, on_strake(scan_with_area(id, 3_000_000.0), "k1"))
			.await
			.unwrap();
	}
	store
		.create_scan(ASSET, VESSEL, scan_with_area("s3", 9_000_000.0))
		.await
		.unwrap();

	let coverage = store.strake_coverage("k1").unwrap();
	assert_eq!(coverage.scan_count, 2);
	assert_eq!(coverage.scanned_area, 6.0);
	assert!((coverage.raw_percentage - 120.0).abs() < 1e-9);
	assert_eq!(coverage.percentage, 100.0);
	assert!(coverage.is_complete);

	assert_eq!(store.strake_scans(ASSET, VESSEL, "k1").unwrap().len(), 2);
	assert!(matches!(
		store.strake_coverage("missing").unwrap_err(),
		StoreError::NotFound { .. }
	));
}

#[tokio::test]
async fn scans_cannot_reference_a_strake_of_another_vessel() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;

	let err = harness
		.core
		.store
		.create_scan(ASSET, VESSEL, on_strake(scan_with_area("s1", 1.0), "nope"))
		.await
		.unwrap_err();

	assert!(matches!(err, StoreError::InvalidReference { .. }));
	assert!(harness
		.core
		.store
		.vessel(ASSET, VESSEL)
		.unwrap()
		.unwrap()
		.scans
		.is_empty());
}

#[tokio::test]
#[traced_test]
async fn rejected_cloud_first_writes_leave_no_local_trace() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	let mut events = harness.core.events.subscribe();

	harness.backend.fail_table(
		Table::Strakes,
		Error::PermissionDenied("row level security".into()),
	);

	let err = harness
		.core
		.store
		.create_strake(ASSET, VESSEL, strake("k1", 10.0, 50.0))
		.await
		.unwrap_err();
	assert!(matches!(err, StoreError::CloudFirst { .. }));

	let vessel = harness.core.store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert!(vessel.strakes.is_empty());

	// Only the asset and vessel inserts were queued.
	assert_eq!(harness.core.queue.len().await, 2);
	assert!(drain_events(&mut events)
		.iter()
		.any(|event| matches!(event, SyncEvent::CloudFirstRolledBack { record_id, .. } if record_id == "k1")));
	assert!(logs_contain("Cloud-first write rejected"));
}

#[tokio::test]
async fn deleting_a_strake_unassigns_its_scans() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	let store = &harness.core.store;

	store
		.create_strake(ASSET, VESSEL, strake("k1", 10.0, 50.0))
		.await
		.unwrap();
	store
		.create_scan(ASSET, VESSEL, on_strake(scan_with_area("s1", 1_000.0), "k1"))
		.await
		.unwrap();

	// The scan must exist remotely before the cloud-first unassignment.
	harness.core.queue.drain().await;

	store.delete_strake(ASSET, VESSEL, "k1").await.unwrap();

	let vessel = store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert!(vessel.strakes.is_empty());
	assert_eq!(vessel.scan("s1").unwrap().strake_id, None);
	assert!(harness.backend.row(Table::Strakes, "k1").is_none());
	assert_eq!(
		harness.backend.row(Table::Scans, "s1").unwrap()["strake_id"],
		serde_json::Value::Null
	);
}

#[tokio::test]
async fn local_data_survives_a_restart() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;

	let harness = harness.restart().await.unwrap();

	let asset = harness.core.store.asset(ASSET).unwrap().unwrap();
	assert_eq!(asset.name, "MV Northern Star");
	assert_eq!(asset.organization_id, ORG);
	assert_eq!(asset.vessels.len(), 1);
	assert_eq!(harness.core.queue.len().await, 2);
}

#[tokio::test]
async fn corrupted_local_data_starts_empty() {
	let harness = TestHarness::new().await.unwrap();
	harness
		.storage
		.insert_raw(StorageKey::InspectionData, "{ \"org-1\": [ broken");

	let harness = harness.restart().await.unwrap();

	assert!(harness.core.store.assets().unwrap().is_empty());
	local_vessel(&harness).await;
	assert_eq!(harness.core.store.assets().unwrap().len(), 1);
}

#[tokio::test]
async fn images_are_uploaded_before_the_row_is_written() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;

	let image = harness
		.core
		.store
		.add_vessel_image(ASSET, VESSEL, hull_photo("img-1"))
		.await
		.unwrap();

	let url = MemoryBlobStore::url(Bucket::VesselImages, "org-1/asset-1/vessel-1/img-1_bow.jpg");
	assert_eq!(image.image, BlobRef::remote(url.clone()));
	assert_eq!(harness.blobs.object(&url).unwrap(), vec![0xff, 0xd8, 0xff]);
	assert_eq!(
		harness.backend.row(Table::VesselImages, "img-1").unwrap()["image_url"],
		json!(url)
	);

	let vessel = harness.core.store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert_eq!(vessel.images, vec![image]);
}

#[tokio::test]
#[traced_test]
async fn rejected_image_rows_roll_back_and_remove_the_upload() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	harness.backend.fail_table(
		Table::VesselImages,
		Error::PermissionDenied("row level security".into()),
	);

	let err = harness
		.core
		.store
		.add_vessel_image(ASSET, VESSEL, hull_photo("img-1"))
		.await
		.unwrap_err();

	assert!(matches!(
		err,
		StoreError::CloudFirst {
			kind: EntityKind::VesselImage,
			..
		}
	));
	let vessel = harness.core.store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert!(vessel.images.is_empty());
	assert!(harness.blobs.is_empty());
	assert!(logs_contain("Removed uploaded object after rollback"));
}

#[tokio::test]
async fn failed_image_uploads_change_nothing() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	harness
		.blobs
		.fail_uploads(Some(Error::Network("offline".into())));

	let err = harness
		.core
		.store
		.add_vessel_image(ASSET, VESSEL, hull_photo("img-1"))
		.await
		.unwrap_err();

	assert!(matches!(err, StoreError::CloudFirst { .. }));
	let vessel = harness.core.store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert!(vessel.images.is_empty());
	assert!(harness.backend.rows(Table::VesselImages).is_empty());
}

#[tokio::test]
async fn scans_are_assigned_to_strakes_remotely_first() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	let store = &harness.core.store;

	store
		.create_strake(ASSET, VESSEL, strake("k1", 10.0, 50.0))
		.await
		.unwrap();
	store
		.create_scan(ASSET, VESSEL, scan_with_area("s1", 1_000.0))
		.await
		.unwrap();
	harness.core.queue.drain().await;

	let scan = store
		.assign_scan_to_strake(ASSET, VESSEL, "s1", Some("k1"))
		.await
		.unwrap();
	assert_eq!(scan.strake_id.as_deref(), Some("k1"));
	assert_eq!(
		harness.backend.row(Table::Scans, "s1").unwrap()["strake_id"],
		json!("k1")
	);
	assert_eq!(store.strake_scans(ASSET, VESSEL, "k1").unwrap().len(), 1);

	// Unknown strakes are refused before anything is sent.
	let err = store
		.assign_scan_to_strake(ASSET, VESSEL, "s1", Some("nope"))
		.await
		.unwrap_err();
	assert!(matches!(err, StoreError::InvalidReference { .. }));

	harness
		.backend
		.fail_table(Table::Scans, Error::PermissionDenied("locked".into()));
	let err = store
		.assign_scan_to_strake(ASSET, VESSEL, "s1", None)
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		StoreError::CloudFirst {
			kind: EntityKind::ScanStrakeAssignment,
			..
		}
	));

	let vessel = store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert_eq!(vessel.scan("s1").unwrap().strake_id.as_deref(), Some("k1"));
	assert!(harness.core.queue.is_empty().await);
}

#[tokio::test]
async fn scanning_log_entries_follow_the_backend() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	let store = &harness.core.store;

	let entry = store
		.add_scanning_log_entry(
			ASSET,
			VESSEL,
			NewLogEntry {
				id: Some("log-1".into()),
				operator: Some("J. Doe".into()),
				method: Some("PEC".into()),
				notes: None,
			},
		)
		.await
		.unwrap();
	assert_eq!(entry.operator.as_deref(), Some("J. Doe"));
	assert!(harness.backend.row(Table::ScanningLogEntries, "log-1").is_some());

	let entry = store
		.update_scanning_log_entry(
			ASSET,
			VESSEL,
			"log-1",
			LogEntryPatch {
				notes: Some("Frame 12 to 18".into()),
				..Default::default()
			},
		)
		.await
		.unwrap();
	assert_eq!(entry.method.as_deref(), Some("PEC"));
	assert_eq!(
		harness.backend.row(Table::ScanningLogEntries, "log-1").unwrap()["notes"],
		json!("Frame 12 to 18")
	);

	// A rejected update keeps the previous notes.
	harness.backend.reject_id("log-1");
	let err = store
		.update_scanning_log_entry(
			ASSET,
			VESSEL,
			"log-1",
			LogEntryPatch {
				notes: Some("Overwritten".into()),
				..Default::default()
			},
		)
		.await
		.unwrap_err();
	assert!(matches!(err, StoreError::CloudFirst { .. }));
	let vessel = store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert_eq!(vessel.scanning_log[0].notes.as_deref(), Some("Frame 12 to 18"));

	harness.backend.clear_failures();
	store
		.delete_scanning_log_entry(ASSET, VESSEL, "log-1")
		.await
		.unwrap();
	assert!(harness.backend.row(Table::ScanningLogEntries, "log-1").is_none());
	let vessel = store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert!(vessel.scanning_log.is_empty());

	assert!(matches!(
		store
			.delete_scanning_log_entry(ASSET, VESSEL, "log-1")
			.await
			.unwrap_err(),
		StoreError::NotFound { .. }
	));
}

#[tokio::test]
async fn reports_are_written_remotely_before_they_appear() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	let store = &harness.core.store;

	let report = store
		.add_vessel_report(
			ASSET,
			VESSEL,
			NewReport {
				id: Some("rep-1".into()),
				title: "Annual survey".into(),
				data: json!({ "pages": 3 }),
			},
		)
		.await
		.unwrap();
	assert_eq!(report.title, "Annual survey");
	assert!(harness.backend.row(Table::VesselReports, "rep-1").is_some());

	harness.backend.fail_table(
		Table::VesselReports,
		Error::Backend {
			status: 400,
			message: "bad payload".into(),
		},
	);
	let err = store
		.add_vessel_report(
			ASSET,
			VESSEL,
			NewReport {
				id: Some("rep-2".into()),
				title: "Draft".into(),
				data: json!({}),
			},
		)
		.await
		.unwrap_err();
	assert!(matches!(err, StoreError::CloudFirst { .. }));
	let vessel = store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert_eq!(vessel.reports, vec![report]);

	harness.backend.clear_failures();
	store
		.delete_vessel_report(ASSET, VESSEL, "rep-1")
		.await
		.unwrap();
	assert!(harness.backend.rows(Table::VesselReports).is_empty());
	let vessel = store.vessel(ASSET, VESSEL).unwrap().unwrap();
	assert!(vessel.reports.is_empty());
}

#[tokio::test(start_paused = true)]
async fn a_pending_cloud_first_write_blocks_writers_but_not_readers() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	let store = &harness.core.store;
	let started = Instant::now();

	// The existence check before the strake insert never answers.
	harness.backend.stall_selects_after(0);

	let read = async {
		tokio::time::sleep(Duration::from_millis(100)).await;
		let vessel = store.vessel(ASSET, VESSEL).unwrap().unwrap();
		(vessel, started.elapsed())
	};
	let rename = async {
		tokio::time::sleep(Duration::from_millis(100)).await;
		store
			.update_asset(
				ASSET,
				AssetPatch {
					name: Some("MV Northern Light".into()),
				},
			)
			.await
			.unwrap();
		started.elapsed()
	};

	let (created, (vessel, read_after), renamed_after) = tokio::join!(
		store.create_strake(ASSET, VESSEL, strake("k1", 10.0, 50.0)),
		read,
		rename,
	);

	assert!(matches!(
		created.unwrap_err(),
		StoreError::CloudFirst {
			source: Error::Timeout(_),
			..
		}
	));
	assert!(vessel.strakes.is_empty());
	assert!(read_after < Duration::from_millis(500));
	assert!(renamed_after >= Duration::from_millis(500));
	assert_eq!(store.asset(ASSET).unwrap().unwrap().name, "MV Northern Light");
}
