//! Integration tests for full vApp reconcile cycles
//!
//! These tests verify the end-to-end behavior of:
//! - Create: location, attach, metadata, gated power-on
//! - Update: added/removed/modified entities, power transitions, metadata scope
//! - Delete: power off, detach back to provenance, destroy
//! - Read: refresh and vanished containers
//! - Resuming a cycle after a mid-sequence fault

use std::sync::Arc;
use std::time::Duration;

use inventory_client_interface::mock::{MockCall, MockInventory, MockOperation};
use inventory_client_interface::InventoryClient;
use state_store_interface::{InMemoryStateStore, StateStore};
use vapp_core::{ReconcileOptions, VAppReconciler, WaitPolicy};
use vapp_shared_types::{
    DeclaredContainer, EntityDescriptor, EntityKind, EntityOrdering, FaultKind, MetadataScope,
    MoRef, StartAction, TaskFault, VAppError,
};

// ============================================================================
// Fixture
// ============================================================================

struct Harness {
    mock: MockInventory,
    store: Arc<InMemoryStateStore>,
    reconciler: VAppReconciler,
}

async fn harness_with(scope: MetadataScope) -> Harness {
    let mock = MockInventory::new();
    mock.add_datacenter("dc1").await;
    let pool = mock.add_cluster("dc1", "c1").await;
    mock.add_folder("dc1", "apps").await;
    mock.add_folder("dc1", "db").await;
    mock.add_datastore("dc1", "ds1").await;
    mock.add_vm("dc1", "", "web-1", &pool).await;
    mock.add_vm("dc1", "", "web-2", &pool).await;
    mock.add_vm("dc1", "db", "db-1", &pool).await;

    let store = Arc::new(InMemoryStateStore::new());
    let options = ReconcileOptions::default()
        .with_metadata_scope(scope)
        .with_wait_policy(WaitPolicy::fixed(Duration::from_millis(1)));
    let reconciler = VAppReconciler::new(Arc::new(mock.clone()), store.clone(), options);
    Harness {
        mock,
        store,
        reconciler,
    }
}

async fn harness() -> Harness {
    harness_with(MetadataScope::ChangedOnly).await
}

fn vm(name: &str, start_order: i32) -> EntityDescriptor {
    EntityDescriptor::new(name, EntityKind::VirtualMachine).with_ordering(EntityOrdering {
        start_order,
        start_action: Some(StartAction::PowerOn),
        ..Default::default()
    })
}

fn db(start_order: i32) -> EntityDescriptor {
    vm("db-1", start_order).with_folder("db")
}

fn declaration(entities: Vec<EntityDescriptor>) -> DeclaredContainer {
    let mut declared = DeclaredContainer::new("web");
    declared.description = "three tier".to_string();
    declared.placement.folder = Some("apps".to_string());
    declared.entities = entities;
    declared
}

fn count(calls: &[MockCall], pred: impl Fn(&MockCall) -> bool) -> usize {
    calls.iter().filter(|c| pred(c)).count()
}

async fn start_order_of(mock: &MockInventory, vapp: &MoRef, entity: &MoRef) -> Option<i32> {
    mock.entity_config(vapp)
        .await
        .into_iter()
        .find(|r| &r.key == entity)
        .map(|r| r.start_order)
}

// ============================================================================
// Create
// ============================================================================

#[tokio::test]
async fn test_create_attaches_entities_and_powers_on() {
    let h = harness().await;
    let stored = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 1), db(2)]))
        .await
        .unwrap();

    assert_eq!(stored.id, "apps/web");
    assert!(stored.instance_uuid.is_some());
    assert!(stored.entities.iter().all(|e| e.is_attached()));
    let db_provenance = stored.entities[1].computed.as_ref().unwrap();
    assert_eq!(db_provenance.folder_path, "/dc1/vm/db");
    assert_eq!(db_provenance.resource_pool_path, "/dc1/host/c1/Resources");

    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    assert!(h.mock.is_powered_on(&vapp).await);
    assert_eq!(h.mock.annotation(&vapp).await.as_deref(), Some("three tier"));
    assert!(h.mock.lookup("/dc1/vm/apps/web/db-1").await.is_some());

    let db_ref = stored.entities[1].reference().unwrap();
    assert_eq!(start_order_of(&h.mock, &vapp, &db_ref).await, Some(2));

    assert_eq!(h.store.get_vapp("apps/web").await.unwrap(), Some(stored));
    assert!(h.store.get_journal("apps/web").await.unwrap().is_none());
}

#[tokio::test]
async fn test_create_empty_container_is_never_powered_on() {
    let h = harness().await;
    h.reconciler.create(&declaration(vec![])).await.unwrap();

    let calls = h.mock.calls().await;
    assert_eq!(count(&calls, |c| matches!(c, MockCall::PowerOn(_))), 0);
    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    assert!(!h.mock.is_powered_on(&vapp).await);
}

#[tokio::test]
async fn test_create_rejects_managed_container() {
    let h = harness().await;
    let declared = declaration(vec![vm("web-1", 0)]);
    h.reconciler.create(&declared).await.unwrap();

    let err = h.reconciler.create(&declared).await.unwrap_err();
    assert!(matches!(err, VAppError::Configuration(_)));
}

#[tokio::test]
async fn test_create_with_unknown_entity_leaves_empty_container() {
    let h = harness().await;
    let err = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 0), vm("missing", 0)]))
        .await
        .unwrap_err();

    // The container exists, nothing was moved.
    assert!(matches!(err, VAppError::PartialApplication { ref completed, .. } if completed.contains("created")));
    let calls = h.mock.calls().await;
    assert_eq!(
        count(&calls, |c| matches!(c, MockCall::MoveIntoResourcePool { .. })),
        0
    );
    assert!(h.mock.lookup("/dc1/vm/web-1").await.is_some());
}

#[tokio::test]
async fn test_create_resumes_after_metadata_fault() {
    let h = harness().await;
    h.mock
        .fail_next(
            MockOperation::UpdateVAppConfig,
            TaskFault::new(FaultKind::Other, "vApp is busy"),
        )
        .await;
    let declared = declaration(vec![vm("web-1", 1)]);

    let err = h.reconciler.create(&declared).await.unwrap_err();
    match err {
        VAppError::PartialApplication { completed, source, .. } => {
            assert!(completed.contains("attached web-1"));
            assert!(matches!(*source, VAppError::RemoteTaskFault { .. }));
        }
        other => panic!("expected partial application, got {other:?}"),
    }
    assert!(h.store.get_vapp("apps/web").await.unwrap().is_none());

    let stored = h.reconciler.create(&declared).await.unwrap();
    let calls = h.mock.calls().await;
    assert_eq!(count(&calls, |c| matches!(c, MockCall::CreateVApp { .. })), 1);
    assert_eq!(
        count(&calls, |c| matches!(c, MockCall::MoveIntoResourcePool { .. })),
        1
    );

    // Provenance is the one captured before the first move, not the container.
    let provenance = stored.entities[0].computed.as_ref().unwrap();
    assert_eq!(provenance.resource_pool_path, "/dc1/host/c1/Resources");
    assert_eq!(provenance.folder_path, "/dc1/vm");
}

// ============================================================================
// Update
// ============================================================================

#[tokio::test]
async fn test_update_adds_removes_and_modifies() {
    let h = harness().await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 1), db(2)]))
        .await
        .unwrap();
    let db_ref = created.entities[1].reference().unwrap();
    let web1_moid = created.entities[0].computed.as_ref().unwrap().moid.clone();

    let stored = h
        .reconciler
        .update("apps/web", &declaration(vec![vm("web-1", 3), vm("web-2", 4)]))
        .await
        .unwrap();

    // db-1 is back where it came from.
    assert_eq!(h.mock.path_of(&db_ref).await.unwrap(), "/dc1/vm/db/db-1");
    let pool = h.mock.pool_of(&db_ref).await.unwrap();
    assert_eq!(h.mock.path_of(&pool).await.unwrap(), "/dc1/host/c1/Resources");

    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    let members = h.mock.entity_config(&vapp).await;
    assert_eq!(members.len(), 2);

    assert_eq!(stored.entities.len(), 2);
    assert_eq!(stored.entities[0].computed.as_ref().unwrap().moid, web1_moid);
    let web1_ref = stored.entities[0].reference().unwrap();
    let web2_ref = stored.entities[1].reference().unwrap();
    assert_eq!(start_order_of(&h.mock, &vapp, &web1_ref).await, Some(3));
    assert_eq!(start_order_of(&h.mock, &vapp, &web2_ref).await, Some(4));
}

#[tokio::test]
async fn test_update_changed_only_drops_untouched_ordering() {
    let h = harness_with(MetadataScope::ChangedOnly).await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 3), db(5)]))
        .await
        .unwrap();
    let db_ref = created.entities[1].reference().unwrap();

    h.reconciler
        .update(
            "apps/web",
            &declaration(vec![vm("web-1", 3), db(5), vm("web-2", 1)]),
        )
        .await
        .unwrap();

    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    assert_eq!(start_order_of(&h.mock, &vapp, &db_ref).await, Some(0));
}

#[tokio::test]
async fn test_update_all_declared_keeps_untouched_ordering() {
    let h = harness_with(MetadataScope::AllDeclared).await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 3), db(5)]))
        .await
        .unwrap();
    let db_ref = created.entities[1].reference().unwrap();

    h.reconciler
        .update(
            "apps/web",
            &declaration(vec![vm("web-1", 3), db(5), vm("web-2", 1)]),
        )
        .await
        .unwrap();

    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    assert_eq!(start_order_of(&h.mock, &vapp, &db_ref).await, Some(5));
}

#[tokio::test]
async fn test_update_removing_last_entity_powers_off() {
    let h = harness().await;
    h.reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    assert!(h.mock.is_powered_on(&vapp).await);

    let stored = h
        .reconciler
        .update("apps/web", &declaration(vec![]))
        .await
        .unwrap();
    assert!(stored.entities.is_empty());
    assert!(!h.mock.is_powered_on(&vapp).await);
    assert!(h.mock.entity_config(&vapp).await.is_empty());
    assert!(h.mock.lookup("/dc1/vm/web-1").await.is_some());
}

#[tokio::test]
async fn test_update_adding_to_empty_container_powers_on() {
    let h = harness().await;
    h.reconciler.create(&declaration(vec![])).await.unwrap();
    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();

    h.reconciler
        .update("apps/web", &declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    assert!(h.mock.is_powered_on(&vapp).await);
}

#[tokio::test]
async fn test_update_description_only() {
    let h = harness().await;
    h.reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    h.mock.clear_calls().await;

    let mut declared = declaration(vec![vm("web-1", 0)]);
    declared.description = "two tier".to_string();
    h.reconciler.update("apps/web", &declared).await.unwrap();

    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    assert_eq!(h.mock.annotation(&vapp).await.as_deref(), Some("two tier"));
    let calls = h.mock.calls().await;
    assert_eq!(
        count(&calls, |c| matches!(c, MockCall::MoveIntoResourcePool { .. })),
        0
    );
    let spec = calls
        .iter()
        .find_map(|c| match c {
            MockCall::UpdateVAppConfig { spec, .. } => Some(spec.clone()),
            _ => None,
        })
        .unwrap();
    assert!(spec.entity_config.is_none());
}

#[tokio::test]
async fn test_update_without_changes_makes_no_remote_calls() {
    let h = harness().await;
    let declared = declaration(vec![vm("web-1", 0)]);
    h.reconciler.create(&declared).await.unwrap();
    h.mock.clear_calls().await;

    h.reconciler.update("apps/web", &declared).await.unwrap();
    assert!(h.mock.calls().await.is_empty());
}

#[tokio::test]
async fn test_update_without_baseline_is_state_error() {
    let h = harness().await;
    let err = h
        .reconciler
        .update("apps/web", &declaration(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, VAppError::State(_)));
}

// ============================================================================
// Delete
// ============================================================================

#[tokio::test]
async fn test_delete_restores_entities_and_destroys() {
    let h = harness().await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 0), db(1)]))
        .await
        .unwrap();
    let db_ref = created.entities[1].reference().unwrap();

    h.reconciler.delete("apps/web").await.unwrap();

    assert!(h.mock.lookup("/dc1/vm/apps/web").await.is_none());
    assert!(h.mock.lookup("/dc1/vm/web-1").await.is_some());
    assert_eq!(h.mock.path_of(&db_ref).await.unwrap(), "/dc1/vm/db/db-1");
    assert!(h.store.get_vapp("apps/web").await.unwrap().is_none());
    assert!(h.store.get_journal("apps/web").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_power_off_fault_keeps_container() {
    let h = harness().await;
    h.reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    h.mock
        .fail_next(
            MockOperation::PowerOff,
            TaskFault::new(FaultKind::Other, "host not responding"),
        )
        .await;

    let err = h.reconciler.delete("apps/web").await.unwrap_err();
    assert!(matches!(err, VAppError::RemoteTaskFault { .. }));
    let calls = h.mock.calls().await;
    assert_eq!(count(&calls, |c| matches!(c, MockCall::Destroy(_))), 0);
    assert!(h.mock.lookup("/dc1/vm/apps/web").await.is_some());
    assert!(h.store.get_vapp("apps/web").await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_vanished_container_succeeds() {
    let h = harness().await;
    h.reconciler.create(&declaration(vec![])).await.unwrap();
    let vapp = h.mock.lookup("/dc1/vm/apps/web").await.unwrap();
    h.mock.destroy(&vapp).await.unwrap();

    h.reconciler.delete("apps/web").await.unwrap();
    assert!(h.store.get_vapp("apps/web").await.unwrap().is_none());
}

#[tokio::test]
async fn test_delete_after_failed_update_rescues_stranded_entity() {
    let h = harness().await;
    h.reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    h.mock
        .fail_next(
            MockOperation::UpdateVAppConfig,
            TaskFault::new(FaultKind::Other, "vApp is busy"),
        )
        .await;
    h.reconciler
        .update(
            "apps/web",
            &declaration(vec![vm("web-1", 0), vm("web-2", 0)]),
        )
        .await
        .unwrap_err();
    assert!(h.mock.lookup("/dc1/vm/apps/web/web-2").await.is_some());

    h.reconciler.delete("apps/web").await.unwrap();
    assert!(h.mock.lookup("/dc1/vm/web-1").await.is_some());
    assert!(h.mock.lookup("/dc1/vm/web-2").await.is_some());
}

#[tokio::test]
async fn test_update_detaches_entity_left_by_failed_update_and_dropped_from_declaration() {
    let h = harness().await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    let vapp = created.reference.unwrap();
    h.mock
        .fail_next(
            MockOperation::UpdateVAppConfig,
            TaskFault::new(FaultKind::Other, "vApp is busy"),
        )
        .await;
    h.reconciler
        .update(
            "apps/web",
            &declaration(vec![vm("web-1", 0), vm("web-2", 0)]),
        )
        .await
        .unwrap_err();
    let web2 = h.mock.lookup("/dc1/vm/apps/web/web-2").await.unwrap();

    // The user gives up on web-2.
    let stored = h
        .reconciler
        .update("apps/web", &declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    assert_eq!(stored.entities.len(), 1);
    assert_eq!(h.mock.path_of(&web2).await.unwrap(), "/dc1/vm/web-2");
    let pool = h.mock.pool_of(&web2).await.unwrap();
    assert_eq!(h.mock.path_of(&pool).await.unwrap(), "/dc1/host/c1/Resources");
    assert_eq!(h.mock.entity_config(&vapp).await.len(), 1);
    assert!(h.mock.is_powered_on(&vapp).await);
    assert!(h.store.get_journal("apps/web").await.unwrap().is_none());

    h.reconciler.delete("apps/web").await.unwrap();
    assert!(h.mock.lookup("/dc1/vm/web-1").await.is_some());
    assert_eq!(h.mock.path_of(&web2).await.unwrap(), "/dc1/vm/web-2");
}

#[tokio::test]
async fn test_update_with_unknown_entity_changes_nothing() {
    let h = harness().await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    let vapp = created.reference.clone().unwrap();
    let web1 = created.entities[0].reference().unwrap();
    h.mock.clear_calls().await;

    let err = h
        .reconciler
        .update("apps/web", &declaration(vec![vm("web-typo", 0)]))
        .await
        .unwrap_err();
    assert!(matches!(err, VAppError::NotFound { .. }));
    assert!(h.mock.calls().await.is_empty());
    assert_eq!(h.mock.path_of(&web1).await.unwrap(), "/dc1/vm/apps/web/web-1");
    assert_eq!(h.mock.entity_config(&vapp).await.len(), 1);
    assert!(h.mock.is_powered_on(&vapp).await);
    assert_eq!(h.store.get_vapp("apps/web").await.unwrap(), Some(created));
}

#[tokio::test]
async fn test_update_replacing_every_entity_keeps_power() {
    let h = harness().await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();
    let vapp = created.reference.unwrap();
    h.mock.clear_calls().await;

    h.reconciler
        .update("apps/web", &declaration(vec![vm("web-2", 0)]))
        .await
        .unwrap();
    let calls = h.mock.calls().await;
    assert_eq!(count(&calls, |c| matches!(c, MockCall::PowerOff { .. })), 0);
    assert!(h.mock.is_powered_on(&vapp).await);
    assert!(h.mock.lookup("/dc1/vm/apps/web/web-2").await.is_some());
    assert!(h.mock.lookup("/dc1/vm/web-1").await.is_some());
}

// ============================================================================
// Read
// ============================================================================

#[tokio::test]
async fn test_read_refreshes_and_drops_vanished() {
    let h = harness().await;
    let created = h
        .reconciler
        .create(&declaration(vec![vm("web-1", 0)]))
        .await
        .unwrap();

    let read = h.reconciler.read("apps/web").await.unwrap().unwrap();
    assert_eq!(read.instance_uuid, created.instance_uuid);
    assert_eq!(read.reference, created.reference);

    let vapp = created.reference.unwrap();
    h.mock.set_powered_on(&vapp, false).await;
    h.mock.destroy(&vapp).await.unwrap();

    assert!(h.reconciler.read("apps/web").await.unwrap().is_none());
    assert!(h.store.get_vapp("apps/web").await.unwrap().is_none());
    assert!(h.reconciler.read("apps/web").await.unwrap().is_none());
}
