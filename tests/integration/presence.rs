use std::time::Duration;

use lcg_services::presence::expiry_loop;
use lcg_services::{
    MemoryRegistry, NodePresence, PresencePatch, PresencePublisher, PresenceRegistry,
    PresenceSettings,
};

const FQDN: &str = "de1-gateway.example.net";

#[tokio::test(start_paused = true)]
async fn record_stays_alive_while_publisher_runs() {
    let registry = MemoryRegistry::new();
    let _expiry = tokio::spawn(expiry_loop(registry.clone()));
    let publisher =
        PresencePublisher::new(registry.clone(), PresenceSettings::new(FQDN, "DE")).spawn();

    // Well past several TTLs; every check must see the record.
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_secs(10)).await;
        let remaining = registry
            .ttl_remaining(FQDN)
            .expect("record should stay registered");
        assert!(remaining > Duration::from_secs(35 - 15 - 1));
    }

    publisher.abort();
    tokio::time::sleep(Duration::from_secs(36)).await;
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn nodes_publish_independently() {
    let registry = MemoryRegistry::new();
    let de = PresencePublisher::new(registry.clone(), PresenceSettings::new(FQDN, "DE")).spawn();
    let fr = PresencePublisher::new(
        registry.clone(),
        PresenceSettings::new("fr1-gateway.example.net", "FR"),
    )
    .spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    let nodes: Vec<(String, String)> = registry
        .live_nodes()
        .into_iter()
        .map(|(n, _)| (n.fqdn, n.country))
        .collect();
    assert_eq!(
        nodes,
        vec![
            (FQDN.to_string(), "DE".to_string()),
            ("fr1-gateway.example.net".to_string(), "FR".to_string()),
        ]
    );

    // One node going away leaves the other alone.
    fr.abort();
    tokio::time::sleep(Duration::from_secs(40)).await;
    let nodes = registry.live_nodes();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].0.fqdn, FQDN);
    de.abort();
}

#[tokio::test(start_paused = true)]
async fn external_drift_is_corrected_on_next_tick() {
    let registry = MemoryRegistry::new();
    let publisher =
        PresencePublisher::new(registry.clone(), PresenceSettings::new(FQDN, "DE")).spawn();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // Another writer reports load and, wrongly, a different country.
    registry
        .update(
            FQDN,
            &PresencePatch {
                country: Some("US".to_string()),
                load: Some(42),
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_secs(15)).await;
    assert_eq!(
        registry.get(FQDN).await.unwrap(),
        Some(NodePresence {
            fqdn: FQDN.to_string(),
            country: "DE".to_string(),
            load: 42,
        })
    );
    publisher.abort();
}
