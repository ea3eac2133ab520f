//! Sync queue delivery: ordering, retries, permanent failures, persistence

mod helpers;

use std::time::Duration;

use hs_cloud_api::{Error, Table};
use hs_core::{
	infra::{
		event::SyncEvent,
		remote::SyncOperation,
		storage::StorageKey,
	},
	service::{
		sync_queue::{DrainOutcome, ItemStatus},
		Service,
	},
	store::NewAsset,
	testing::{BackendCall, TestHarness},
};

use helpers::*;

fn new_asset(id: &str) -> NewAsset {
	NewAsset {
		id: Some(id.into()),
		name: format!("Asset {id}"),
		organization_id: None,
	}
}

#[tokio::test]
async fn queued_writes_reach_the_backend_in_order() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	harness
		.core
		.store
		.create_scan(ASSET, VESSEL, scan_with_area("s1", 1_000.0))
		.await
		.unwrap();

	assert_eq!(harness.core.queue.len().await, 3);
	assert!(harness.backend.calls().is_empty());

	assert_eq!(harness.core.queue.drain().await, DrainOutcome::Drained);

	assert_eq!(
		harness.backend.writes(),
		vec![
			BackendCall::Insert {
				table: Table::Assets,
				id: ASSET.into()
			},
			BackendCall::Insert {
				table: Table::Vessels,
				id: VESSEL.into()
			},
			BackendCall::Insert {
				table: Table::Scans,
				id: "s1".into()
			},
		]
	);
	assert!(harness.core.queue.is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_backoff() {
	let harness = TestHarness::new().await.unwrap();
	let mut events = harness.core.events.subscribe();

	harness.core.store.create_asset(new_asset(ASSET)).await.unwrap();

	harness
		.backend
		.fail_next(Error::Network("connection reset".into()));
	harness
		.backend
		.fail_next(Error::Timeout(Duration::from_secs(1)));

	assert_eq!(harness.core.queue.drain().await, DrainOutcome::Drained);
	assert!(harness.backend.row(Table::Assets, ASSET).is_some());

	let events = drain_events(&mut events);
	let retries = events
		.iter()
		.filter_map(|event| match event {
			SyncEvent::QueueItemRetrying {
				attempt, delay_ms, ..
			} => Some((*attempt, *delay_ms)),
			_ => None,
		})
		.collect::<Vec<_>>();

	assert_eq!(retries, vec![(1, 10), (2, 20)]);
	assert!(events
		.iter()
		.any(|event| matches!(event, SyncEvent::QueueItemSucceeded { .. })));
}

#[tokio::test(start_paused = true)]
async fn items_are_dropped_once_retries_run_out() {
	let harness = TestHarness::new().await.unwrap();
	let mut events = harness.core.events.subscribe();

	harness.core.store.create_asset(new_asset(ASSET)).await.unwrap();
	harness
		.backend
		.fail_table(Table::Assets, Error::Network("unreachable".into()));

	assert_eq!(harness.core.queue.drain().await, DrainOutcome::Drained);

	let events = drain_events(&mut events);
	let retrying = events
		.iter()
		.filter(|event| matches!(event, SyncEvent::QueueItemRetrying { .. }))
		.count();
	let failed = events
		.iter()
		.filter_map(|event| match event {
			SyncEvent::QueueItemFailed { retries, .. } => Some(*retries),
			_ => None,
		})
		.collect::<Vec<_>>();

	assert_eq!(retrying, 5);
	assert_eq!(failed, vec![6]);
	assert_eq!(harness.backend.select_count(), 6);
	assert!(harness.core.queue.is_empty().await);

	// The local record stays, the divergence is recorded.
	assert!(harness.core.store.asset(ASSET).unwrap().is_some());
	let records = harness.core.queue.divergence().records().await;
	assert_eq!(records.len(), 1);
	assert_eq!(records[0].item.status, ItemStatus::Failed);
}

#[tokio::test]
async fn permanent_errors_fail_without_retrying() {
	let harness = TestHarness::new().await.unwrap();
	let mut events = harness.core.events.subscribe();

	harness.core.store.create_asset(new_asset("a1")).await.unwrap();
	harness.core.store.create_asset(new_asset("a2")).await.unwrap();
	harness.backend.reject_id("a1");

	assert_eq!(harness.core.queue.drain().await, DrainOutcome::Drained);

	let events = drain_events(&mut events);
	assert!(!events
		.iter()
		.any(|event| matches!(event, SyncEvent::QueueItemRetrying { .. })));
	assert_eq!(
		events
			.iter()
			.filter(|event| matches!(event, SyncEvent::QueueItemFailed { retries: 1, .. }))
			.count(),
		1
	);

	// The failure does not block the items behind it.
	assert!(harness.backend.row(Table::Assets, "a1").is_none());
	assert!(harness.backend.row(Table::Assets, "a2").is_some());
	assert_eq!(harness.core.queue.stats().await.diverged, 1);
}

#[tokio::test]
async fn nothing_is_sent_without_a_session() {
	let harness = TestHarness::new().await.unwrap();
	harness.core.store.create_asset(new_asset(ASSET)).await.unwrap();

	harness.identity.sign_out();

	assert_eq!(harness.core.queue.drain().await, DrainOutcome::Interrupted);
	assert!(harness.backend.calls().is_empty());
	assert_eq!(harness.core.queue.len().await, 1);
}

#[tokio::test]
async fn queue_survives_a_restart_and_resets_in_flight_items() {
	let harness = TestHarness::new().await.unwrap();
	harness.storage.insert_raw(
		StorageKey::SyncQueue,
		r#"[{
			"id": "q1",
			"operation": { "type": "delete", "table": "assets", "id": "gone" },
			"enqueued_at": "2025-01-01T00:00:00Z",
			"retries": 2,
			"status": "processing"
		}]"#,
	);

	let harness = harness.restart().await.unwrap();

	let items = harness.core.queue.pending_items().await;
	assert_eq!(items.len(), 1);
	assert_eq!(items[0].status, ItemStatus::Pending);
	assert_eq!(items[0].retries, 2);

	// Deleting a row that is already gone counts as delivered.
	assert_eq!(harness.core.queue.drain().await, DrainOutcome::Drained);
	assert!(harness.core.queue.is_empty().await);
	assert_eq!(harness.core.queue.stats().await.diverged, 0);
}

#[tokio::test]
async fn corrupted_queue_is_cleared_at_start_up() {
	let harness = TestHarness::new().await.unwrap();
	harness
		.storage
		.insert_raw(StorageKey::SyncQueue, "[{ not json");

	let harness = harness.restart().await.unwrap();

	assert!(harness.core.queue.is_empty().await);
	assert!(harness.storage.raw(StorageKey::SyncQueue).is_none());
}

#[tokio::test]
async fn oldest_items_are_dropped_when_the_quota_is_hit() {
	let mut config = TestHarness::fast_config();
	config.queue.max_persisted_items = 2;

	let harness = TestHarness::with_config(config).await.unwrap();
	let mut events = harness.core.events.subscribe();
	let queue = &harness.core.queue;

	queue.add(SyncOperation::delete(Table::Assets, "a1")).await;
	queue.add(SyncOperation::delete(Table::Assets, "a2")).await;

	let two_items = harness
		.storage
		.raw(StorageKey::SyncQueue)
		.unwrap()
		.len() as u64;
	harness.storage.set_quota(Some(two_items + 40));

	queue.add(SyncOperation::delete(Table::Assets, "a3")).await;

	let remaining = queue
		.pending_items()
		.await
		.into_iter()
		.map(|item| item.operation.summary())
		.collect::<Vec<_>>();
	assert_eq!(remaining, vec!["delete assets/a2", "delete assets/a3"]);

	let events = drain_events(&mut events);
	assert!(events.contains(&SyncEvent::QueueTruncated {
		dropped: 1,
		kept: 2
	}));
	assert!(events.iter().any(|event| matches!(
		event,
		SyncEvent::QueueItemFailed { operation, error, .. }
			if operation == "delete assets/a1" && error.contains("storage quota")
	)));

	// The dropped delete is kept for the operator like any other lost write.
	let diverged = queue.divergence().records().await;
	assert_eq!(diverged.len(), 1);
	assert_eq!(diverged[0].item.operation.summary(), "delete assets/a1");
	assert_eq!(diverged[0].item.status, ItemStatus::Failed);
	assert_eq!(queue.stats().await.diverged, 1);
}

#[tokio::test(start_paused = true)]
async fn the_worker_drains_as_soon_as_an_item_is_added() {
	let mut config = TestHarness::fast_config();
	// Far beyond the test: only the wake-up can trigger the drain.
	config.queue.drain_interval_ms = 60_000;

	let harness = TestHarness::with_config(config).await.unwrap();
	let queue = &harness.core.queue;
	queue.start().await.unwrap();
	assert!(queue.is_running());

	// Let the immediate first tick pass on the empty queue.
	tokio::time::sleep(Duration::from_millis(1)).await;

	harness
		.core
		.store
		.create_asset(new_asset("a1"))
		.await
		.unwrap();
	tokio::time::sleep(Duration::from_millis(10)).await;

	assert!(harness.backend.row(Table::Assets, "a1").is_some());
	assert!(queue.is_empty().await);

	queue.stop().await.unwrap();
	assert!(!queue.is_running());
}

#[tokio::test(start_paused = true)]
async fn the_worker_timer_waits_for_a_session() {
	let harness = TestHarness::new().await.unwrap();
	local_vessel(&harness).await;
	harness.identity.sign_out();

	let queue = &harness.core.queue;
	queue.start().await.unwrap();

	// Several 50ms ticks without a session.
	tokio::time::sleep(Duration::from_millis(300)).await;
	assert!(harness.backend.rows(Table::Assets).is_empty());
	assert_eq!(queue.len().await, 2);

	harness
		.identity
		.sign_in(TestHarness::session("user-1", "org-1", "Acme Marine"));
	tokio::time::sleep(Duration::from_millis(100)).await;

	assert!(harness.backend.row(Table::Assets, ASSET).is_some());
	assert!(harness.backend.row(Table::Vessels, VESSEL).is_some());
	assert!(queue.is_empty().await);

	queue.stop().await.unwrap();
}
