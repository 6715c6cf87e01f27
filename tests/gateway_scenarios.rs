//! End-to-end gateway scenarios against in-memory collaborators

use std::sync::Arc;

use portico::auth::Identity;
use portico::dispatch::RecordingPublisher;
use portico::ipfs::{MockConnector, MockEndpoint};
use portico::naming::NamingRecordRequest;
use portico::networks::RegisterNetwork;
use portico::store::MemoryStore;
use portico::types::{CompletedEffect, ErrorKind};
use portico::Gateway;

const ADMIN: &str = "0xadmin";
const NODE: &str = "/ip4/10.0.0.1/tcp/4001/p2p/QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";
const BOOTSTRAP: &str =
    "/ip4/10.0.0.2/tcp/4001/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa";
const CONTENT: &str = "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";

struct Harness {
    gateway: Gateway,
    store: Arc<MemoryStore>,
    endpoint: Arc<MockEndpoint>,
    publisher: Arc<RecordingPublisher>,
    admin: Identity,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let endpoint = Arc::new(MockEndpoint::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let gateway = Gateway::with_store(
            store.clone(),
            Arc::new(MockConnector::new(endpoint.clone())),
            publisher.clone(),
            ADMIN,
        );
        Self {
            gateway,
            store,
            endpoint,
            publisher,
            admin: Identity::admin(ADMIN),
        }
    }

    async fn user(&self, address: &str) -> Identity {
        self.gateway
            .create_account(address, &format!("{}@example.com", address), "secret", false)
            .await
            .unwrap();
        Identity::user(address)
    }

    async fn register_alpha(&self, users: Vec<String>) {
        self.gateway
            .register_network(
                &self.admin,
                RegisterNetwork {
                    name: "alpha".into(),
                    api_url: "http://10.0.0.5:5001".into(),
                    swarm_key: "/key/swarm/psk/1.0.0/".into(),
                    local_node_addresses: vec![NODE.into()],
                    bootstrap_peer_addresses: vec![BOOTSTRAP.into()],
                    users,
                },
            )
            .await
            .unwrap();
    }
}

fn publish_request(key: &str, lifetime: &str) -> NamingRecordRequest {
    NamingRecordRequest {
        network_name: "alpha".into(),
        content_hash: "Qm123".into(),
        lifetime: lifetime.into(),
        ttl: "1h".into(),
        key_name: key.into(),
        resolve: "true".into(),
    }
}

#[tokio::test]
async fn registering_without_grantees_grants_the_admin_only() {
    let h = Harness::new();
    h.register_alpha(Vec::new()).await;

    let view = h.gateway.get_network(&h.admin, "alpha").await.unwrap();
    assert_eq!(view.authorized_users, vec![ADMIN.to_string()]);
    assert_eq!(view.local_node_addresses.len(), view.bootstrap_peer_addresses.len());
    assert_eq!(view.local_node_addresses, vec![NODE.to_string()]);
}

#[tokio::test]
async fn registration_rejects_mismatched_or_invalid_addresses() {
    let h = Harness::new();

    let mismatched = RegisterNetwork {
        name: "beta".into(),
        api_url: "http://10.0.0.6:5001".into(),
        swarm_key: "psk".into(),
        local_node_addresses: vec![NODE.into()],
        bootstrap_peer_addresses: Vec::new(),
        users: Vec::new(),
    };
    let err = h
        .gateway
        .register_network(&h.admin, mismatched)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);

    let no_peer = "/ip4/10.0.0.3/tcp/4001";
    let invalid = RegisterNetwork {
        name: "beta".into(),
        api_url: "http://10.0.0.6:5001".into(),
        swarm_key: "psk".into(),
        local_node_addresses: vec![NODE.into()],
        bootstrap_peer_addresses: vec![no_peer.into()],
        users: Vec::new(),
    };
    let err = h
        .gateway
        .register_network(&h.admin, invalid)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert!(err.to_string().contains(no_peer));

    let err = h.gateway.get_network(&h.admin, "beta").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn pin_without_grant_is_forbidden_and_enqueues_nothing() {
    let h = Harness::new();
    h.register_alpha(Vec::new()).await;
    let user = h.user("0xuser").await;

    let err = h.gateway.pin(&user, "alpha", CONTENT, 12).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert!(h.publisher.messages().is_empty());
}

#[tokio::test]
async fn grant_is_monotonic_and_rejects_regrant() {
    let h = Harness::new();
    h.register_alpha(Vec::new()).await;
    let user = h.user("0xuser").await;

    h.gateway
        .grant_network(&h.admin, "0xuser", "alpha")
        .await
        .unwrap();
    let receipt = h.gateway.pin(&user, "alpha", CONTENT, 12).await.unwrap();
    assert!(!receipt.request_id.is_empty());

    let err = h
        .gateway
        .grant_network(&h.admin, "0xuser", "alpha")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);
    assert_eq!(
        h.gateway.authorized_networks(&user).await.unwrap(),
        vec!["alpha".to_string()]
    );

    let view = h.gateway.get_network(&h.admin, "alpha").await.unwrap();
    assert!(view.authorized_users.contains(&"0xuser".to_string()));
}

#[tokio::test]
async fn owned_key_publish_persists_entry_and_enqueues_update() {
    let h = Harness::new();
    let user = h.user("0xuser").await;
    h.register_alpha(vec!["0xuser".into()]).await;
    h.gateway.create_key(&user, "alpha", "k1").await.unwrap();

    let published = h
        .gateway
        .publish_naming_record(&user, publish_request("k1", "24h"))
        .await
        .unwrap();
    assert!(!published.record_name.is_empty());
    assert_eq!(published.record_value, "/ipfs/Qm123");

    let entry = h
        .gateway
        .naming_record(&user, &published.record_name)
        .await
        .unwrap();
    assert_eq!(entry.content_hash, "Qm123");
    assert_eq!(entry.lifetime, "24h0m0s");
    assert_eq!(entry.ttl, "1h0m0s");
    assert!(entry.last_published.is_some());

    let sent = h.endpoint.published_records();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].key_name, "k1");
    assert_eq!(sent[0].lifetime, std::time::Duration::from_secs(86_400));

    let updates = h.publisher.messages_on("portico.requests.ipns_update");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].message_id, published.request_id);
    assert_eq!(updates[0].payload["record_name"], published.record_name.as_str());
    assert_eq!(updates[0].payload["record_value"], "/ipfs/Qm123");
    assert_eq!(updates[0].payload["resolve"], true);
}

#[tokio::test]
async fn unowned_key_publish_has_no_side_effects() {
    let h = Harness::new();
    let user = h.user("0xuser").await;
    h.register_alpha(vec!["0xuser".into()]).await;
    let other = h.user("0xother").await;
    h.gateway
        .grant_network(&h.admin, "0xother", "alpha")
        .await
        .unwrap();
    h.gateway.create_key(&other, "alpha", "k1").await.unwrap();

    let err = h
        .gateway
        .publish_naming_record(&user, publish_request("k1", "24h"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(h.endpoint.calls_to("publish_record"), 0);
    assert_eq!(h.store.record_count().await, 0);
    assert!(h.publisher.messages().is_empty());
}

#[tokio::test]
async fn enqueue_failure_reports_published_record() {
    let h = Harness::new();
    let user = h.user("0xuser").await;
    h.register_alpha(vec!["0xuser".into()]).await;
    h.gateway.create_key(&user, "alpha", "k1").await.unwrap();
    h.publisher.set_failing(true);

    let err = h
        .gateway
        .publish_naming_record(&user, publish_request("k1", "24h"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportError);
    match err.completed() {
        Some(CompletedEffect::RecordPublished {
            entry_persisted, ..
        }) => assert!(*entry_persisted),
        other => panic!("expected record_published, got {:?}", other),
    }
    assert_eq!(h.store.record_count().await, 1);
    assert!(h.publisher.messages().is_empty());
}

#[tokio::test]
async fn malformed_lifetime_fails_before_any_endpoint_call() {
    let h = Harness::new();
    let user = h.user("0xuser").await;
    h.register_alpha(vec!["0xuser".into()]).await;

    let err = h
        .gateway
        .publish_naming_record(&user, publish_request("k1", "notaduration"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationError);
    assert_eq!(h.endpoint.call_count(), 0);
    assert!(h.publisher.messages().is_empty());
}

#[tokio::test]
async fn key_grants_stay_aligned() {
    let h = Harness::new();
    let user = h.user("0xuser").await;
    h.register_alpha(vec!["0xuser".into()]).await;

    for name in ["a", "b", "c"] {
        h.gateway.create_key(&user, "alpha", name).await.unwrap();
    }
    let err = h.gateway.create_key(&user, "alpha", "b").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    let keys = h.gateway.list_keys(&user).await.unwrap();
    let names: Vec<&str> = keys.iter().map(|k| k.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(keys.iter().all(|k| !k.id.is_empty()));
}

#[tokio::test]
async fn sign_in_yields_admin_role_for_configured_admin() {
    let h = Harness::new();
    h.user(ADMIN).await;
    h.user("0xuser").await;

    let admin = h.gateway.sign_in(ADMIN, "secret").await.unwrap();
    assert!(admin.is_admin());
    let user = h.gateway.sign_in("0xuser", "secret").await.unwrap();
    assert!(!user.is_admin());

    let err = h.gateway.sign_in("0xuser", "wrong").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}
