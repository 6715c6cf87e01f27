//! IPFS HTTP API client against a mocked endpoint

use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::sync::Arc;

use portico::auth::Identity;
use portico::dispatch::RecordingPublisher;
use portico::ipfs::{HttpConnector, HttpEndpoint, RecordPublish, StorageEndpoint};
use portico::networks::RegisterNetwork;
use portico::store::MemoryStore;
use portico::types::ErrorKind;
use portico::Gateway;

fn endpoint(server: &MockServer) -> HttpEndpoint {
    HttpEndpoint::new(reqwest::Client::new(), &server.uri(), Duration::from_secs(5))
}

#[tokio::test]
async fn add_returns_root_hash_from_last_line() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/add"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            "{\"Name\":\"file\",\"Hash\":\"QmChild\",\"Size\":\"12\"}\n\
             {\"Name\":\"file\",\"Hash\":\"QmRoot\",\"Size\":\"20\"}\n",
        ))
        .expect(1)
        .mount(&server)
        .await;

    let hash = endpoint(&server)
        .add(Bytes::from_static(b"hello"))
        .await
        .unwrap();
    assert_eq!(hash, "QmRoot");
}

#[tokio::test]
async fn object_size_reads_cumulative_size() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/object/stat"))
        .and(query_param("arg", "QmRoot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Hash": "QmRoot",
            "NumLinks": 2,
            "BlockSize": 88,
            "LinksSize": 86,
            "DataSize": 2,
            "CumulativeSize": 4242
        })))
        .mount(&server)
        .await;

    let endpoint = endpoint(&server);
    let stat = endpoint.object_stat("QmRoot").await.unwrap();
    assert_eq!(stat.num_links, 2);
    assert_eq!(endpoint.object_size("QmRoot").await.unwrap(), 4242);
}

#[tokio::test]
async fn download_length_comes_from_file_size_not_dag_size() {
    const HASH: &str = "QmNnooDu7bfjPFoTZYxMNLWUQJyrVwtbZg5gBMjTezGAJN";
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/object/stat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Hash": HASH,
            "NumLinks": 0,
            "BlockSize": 21,
            "LinksSize": 2,
            "DataSize": 19,
            "CumulativeSize": 21
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/files/stat"))
        .and(query_param("arg", format!("/ipfs/{}", HASH).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Hash": HASH,
            "Size": 13,
            "CumulativeSize": 21,
            "Blocks": 0,
            "Type": "file"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .and(query_param("arg", HASH))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello portico".to_vec()))
        .mount(&server)
        .await;

    let gateway = Gateway::with_store(
        Arc::new(MemoryStore::new()),
        Arc::new(HttpConnector::new(Duration::from_secs(5)).unwrap()),
        Arc::new(RecordingPublisher::new()),
        "0xadmin",
    );
    let admin = Identity::admin("0xadmin");
    gateway
        .register_network(
            &admin,
            RegisterNetwork {
                name: "alpha".into(),
                api_url: server.uri(),
                swarm_key: "/key/swarm/psk/1.0.0/".into(),
                local_node_addresses: vec![format!("/ip4/10.0.0.1/tcp/4001/p2p/{}", HASH)],
                bootstrap_peer_addresses: vec![
                    "/ip4/10.0.0.2/tcp/4001/p2p/QmQCU2EcMqAqQPR2i9bChDtGNJchTbq5TbXJJ16u19uLTa"
                        .into(),
                ],
                users: Vec::new(),
            },
        )
        .await
        .unwrap();

    assert_eq!(gateway.object_size(&admin, "alpha", HASH).await.unwrap(), 21);

    let download = gateway
        .download(&admin, "alpha", HASH, None, Vec::new())
        .await
        .unwrap();
    assert_eq!(download.size, 13);
    let body: Vec<u8> = download.body.map(|c| c.unwrap().to_vec()).concat().await;
    assert_eq!(body.len() as u64, download.size);
}

#[tokio::test]
async fn local_pins_are_sorted_and_membership_is_local() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/pin/ls"))
        .and(query_param("type", "recursive"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Keys": {
                "QmB": { "Type": "recursive" },
                "QmA": { "Type": "recursive" }
            }
        })))
        .mount(&server)
        .await;

    let endpoint = endpoint(&server);
    let pins = endpoint.local_pins().await.unwrap();
    let hashes: Vec<&str> = pins.iter().map(|p| p.hash.as_str()).collect();
    assert_eq!(hashes, vec!["QmA", "QmB"]);

    assert!(endpoint.is_pinned("QmA").await.unwrap());
    assert!(!endpoint.is_pinned("QmZ").await.unwrap());
}

#[tokio::test]
async fn publish_record_sends_go_durations() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/name/publish"))
        .and(query_param("arg", "/ipfs/Qm123"))
        .and(query_param("key", "k1"))
        .and(query_param("lifetime", "24h0m0s"))
        .and(query_param("ttl", "1h0m0s"))
        .and(query_param("resolve", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Name": "k51qzi5uqu5dlvj2",
            "Value": "/ipfs/Qm123"
        })))
        .mount(&server)
        .await;

    let record = endpoint(&server)
        .publish_record(&RecordPublish {
            content_hash: "Qm123".into(),
            key_name: "k1".into(),
            lifetime: Duration::from_secs(24 * 3600),
            ttl: Duration::from_secs(3600),
            resolve: true,
        })
        .await
        .unwrap();
    assert_eq!(record.name, "k51qzi5uqu5dlvj2");
    assert_eq!(record.value, "/ipfs/Qm123");
}

#[tokio::test]
async fn missing_keystore_key_is_key_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/name/publish"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "Message": "no key by the given name was found",
            "Code": 0,
            "Type": "error"
        })))
        .mount(&server)
        .await;

    let err = endpoint(&server)
        .publish_record(&RecordPublish {
            content_hash: "Qm123".into(),
            key_name: "ghost".into(),
            lifetime: Duration::from_secs(60),
            ttl: Duration::from_secs(60),
            resolve: false,
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyNotFound);
}

#[tokio::test]
async fn keystore_generate_and_list() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/key/gen"))
        .and(query_param("arg", "blog"))
        .and(query_param("type", "ed25519"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Name": "blog",
            "Id": "k51blog"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/v0/key/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "Keys": [
                { "Name": "self", "Id": "k51self" },
                { "Name": "blog", "Id": "k51blog" }
            ]
        })))
        .mount(&server)
        .await;

    let endpoint = endpoint(&server);
    let key = endpoint.generate_key("blog").await.unwrap();
    assert_eq!(key.id, "k51blog");

    let keys = endpoint.list_keys().await.unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[1].name, "blog");
}

#[tokio::test]
async fn cat_streams_the_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/cat"))
        .and(query_param("arg", "QmRoot"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"streamed content".to_vec()))
        .mount(&server)
        .await;

    let stream = endpoint(&server).cat("QmRoot").await.unwrap();
    let body: Vec<u8> = stream.map(|c| c.unwrap().to_vec()).concat().await;
    assert_eq!(body, b"streamed content");
}

#[tokio::test]
async fn pubsub_topic_is_multibase_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/pubsub/pub"))
        .and(query_param("arg", "ubmV3cw"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    endpoint(&server).pubsub_publish("news", "hello").await.unwrap();
}

#[tokio::test]
async fn malformed_response_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v0/key/list"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let err = endpoint(&server).list_keys().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ProtocolError);
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let endpoint = HttpEndpoint::new(reqwest::Client::new(), &uri, Duration::from_secs(2));
    let err = endpoint.local_pins().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransportError);
}
