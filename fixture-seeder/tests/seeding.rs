mod common;

use std::collections::HashSet;

use fixture_seeder::content::PAYLOAD_ALPHABET;
use fixture_seeder::store::{BlobConnection, Connector, MemoryConnector, ObjectStatus};
use fixture_seeder::{
    audit, BootstrapError, ContentGenerator, FailureReason, NodeFailure, NodeState, Role, SeedTarget, Seeder,
    StoreError,
};

use crate::common::{endpoints, PRIMARY_PORT, SECONDARY_PORT};

#[tokio::test]
async fn test_two_nodes_five_files_each() {
    let connector = MemoryConnector::with_chunk_size(256);
    let mut seeder = Seeder::new(connector.clone()).generator(ContentGenerator::seeded(2024));

    let report = seeder.seed(endpoints(), 5).await.unwrap();

    assert_eq!(report.entries.len(), 10);
    for role in Role::ALL {
        let entries: Vec<_> = report.entries_for(role).collect();
        assert_eq!(entries.len(), 5);
        for entry in entries {
            let object = entry.stored_object().expect("every put should succeed");
            assert_eq!(object.location, role);
            assert_eq!(object.status, ObjectStatus::Active);
            assert_eq!(Some(object.object_id), entry.object_id);
        }
        assert_eq!(
            report.node(role).unwrap().state,
            NodeState::Done { stored: 5, failed: 0 }
        );
    }

    let ids: HashSet<_> = report.entries.iter().map(|e| e.object_id.unwrap()).collect();
    assert_eq!(ids.len(), 10);
    assert!(!report.has_failures());
}

#[tokio::test]
async fn test_location_matches_physical_node() {
    let connector = MemoryConnector::new();
    let mut seeder = Seeder::new(connector.clone()).payload_size(64);
    seeder.seed(endpoints(), 4).await.unwrap();

    for object in connector.objects(PRIMARY_PORT).await {
        assert_eq!(object.location, Role::Primary);
    }
    for object in connector.objects(SECONDARY_PORT).await {
        assert_eq!(object.location, Role::Secondary);
    }
    assert_eq!(connector.objects(PRIMARY_PORT).await.len(), 4);
    assert_eq!(connector.objects(SECONDARY_PORT).await.len(), 4);
}

#[tokio::test]
async fn test_round_trip_matches_generated_payload() {
    let connector = MemoryConnector::with_chunk_size(100);
    let mut seeder = Seeder::new(connector.clone())
        .generator(ContentGenerator::seeded(9))
        .payload_size(1000);
    let report = seeder.seed(endpoints(), 3).await.unwrap();

    // the same seed regenerates the primary batch, which is drawn first
    let expected = ContentGenerator::seeded(9).generate(3, 1000).unwrap();

    let conn = connector.connect(&endpoints_primary()).await.unwrap();
    for (entry, file) in report.entries_for(Role::Primary).zip(&expected) {
        assert_eq!(entry.filename, file.name);
        let payload = conn.get(&entry.object_id.unwrap()).await.unwrap();
        assert_eq!(payload, file.payload);
        assert!(payload.iter().all(|b| PAYLOAD_ALPHABET.contains(b)));
    }
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_refused_node_does_not_stop_the_other() {
    let connector = MemoryConnector::new();
    connector.refuse(PRIMARY_PORT);
    let mut seeder = Seeder::new(connector.clone());

    let report = seeder.seed(endpoints(), 5).await.unwrap();

    assert_eq!(report.entries_for(Role::Primary).count(), 0);
    assert!(matches!(
        report.node(Role::Primary).unwrap().state,
        NodeState::Failed { reason: FailureReason::Store(StoreError::ConnectionRefused { .. }) }
    ));
    assert_eq!(report.entries_for(Role::Secondary).filter(|e| e.is_stored()).count(), 5);
    assert_eq!(
        report.node(Role::Secondary).unwrap().state,
        NodeState::Done { stored: 5, failed: 0 }
    );
    assert!(!report.is_total_failure());
}

#[tokio::test]
async fn test_unavailable_secondary_is_marked_not_seeded() {
    let connector = MemoryConnector::new();
    let mut seeder = Seeder::new(connector.clone());
    let failure = NodeFailure::bootstrap(
        Role::Secondary,
        BootstrapError::ProcessLaunchFailed { reason: "mongod: No such file or directory".to_string() },
    );
    let targets = vec![endpoints().remove(0), SeedTarget::Unavailable(failure)];

    let report = seeder.seed(targets, 5).await.unwrap();

    assert_eq!(report.entries.len(), 5);
    assert!(report.entries.iter().all(|e| e.role == Role::Primary && e.is_stored()));
    assert!(matches!(
        report.node(Role::Secondary).unwrap().state,
        NodeState::Failed { reason: FailureReason::Bootstrap(BootstrapError::ProcessLaunchFailed { .. }) }
    ));
    assert!(connector.objects(SECONDARY_PORT).await.is_empty());
}

#[tokio::test]
async fn test_both_nodes_unreachable_is_total_failure() {
    let connector = MemoryConnector::new();
    connector.refuse(PRIMARY_PORT);
    connector.refuse(SECONDARY_PORT);
    let mut seeder = Seeder::new(connector);

    let report = seeder.seed(endpoints(), 2).await.unwrap();
    assert!(report.entries.is_empty());
    assert!(report.is_total_failure());
}

#[tokio::test]
async fn test_seeded_nodes_audit_clean() {
    let connector = MemoryConnector::with_chunk_size(50);
    let mut seeder = Seeder::new(connector.clone()).payload_size(333);
    seeder.seed(endpoints(), 5).await.unwrap();

    for target in endpoints() {
        let SeedTarget::Ready(endpoint) = target else { unreachable!() };
        let conn = connector.connect(&endpoint).await.unwrap();
        let node_audit = audit(&conn).await.unwrap();
        assert_eq!(node_audit.objects, 5);
        assert!(node_audit.is_clean(), "{node_audit:?}");
        conn.close().await.unwrap();
    }
}

fn endpoints_primary() -> fixture_seeder::NodeEndpoint {
    match endpoints().remove(0) {
        SeedTarget::Ready(endpoint) => endpoint,
        SeedTarget::Unavailable(_) => unreachable!(),
    }
}
