//! Cloudflare DNS adapter against a mock API

use rdpgate_cloudflare::CloudflareDns;
use rdpgate_session::{DnsProvider, ProviderError, Removal};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ZONE: &str = "023e105f4ecef8ad9ca31a8372d0c353";
const FQDN: &str = "rdp-0011aabb.rdp.example.com";

fn records_path() -> String {
    format!("/zones/{}/dns_records", ZONE)
}

fn client(server: &MockServer) -> CloudflareDns {
    CloudflareDns::new("test-token", ZONE)
        .unwrap()
        .with_api_base(server.uri())
}

#[tokio::test]
async fn test_create_cname_is_proxied() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(records_path()))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(json!({
            "type": "CNAME",
            "name": FQDN,
            "content": "6ff42ae2.cfargotunnel.com",
            "proxied": true
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "messages": [],
            "result": {
                "id": "372e67954025e0ba6aaa6d586b9e0b59",
                "type": "CNAME",
                "name": FQDN,
                "content": "6ff42ae2.cfargotunnel.com",
                "proxied": true
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = client(&server)
        .create_cname(FQDN, "6ff42ae2.cfargotunnel.com")
        .await
        .unwrap();
    assert_eq!(record.id, "372e67954025e0ba6aaa6d586b9e0b59");
    assert_eq!(record.content, "6ff42ae2.cfargotunnel.com");
}

#[tokio::test]
async fn test_create_conflict_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(records_path()))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false,
            "errors": [{"code": 81053, "message": "An A, AAAA, or CNAME record with that host already exists."}],
            "messages": [],
            "result": null
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create_cname(FQDN, "6ff42ae2.cfargotunnel.com")
        .await
        .unwrap_err();
    match err {
        ProviderError::Rejected(message) => assert!(message.contains("81053")),
        other => panic!("expected rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unauthorized_token_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "success": false,
            "errors": [{"code": 10000, "message": "Authentication error"}],
            "result": null
        })))
        .mount(&server)
        .await;

    let err = client(&server).list(FQDN).await.unwrap_err();
    assert!(matches!(err, ProviderError::Rejected(_)));
}

#[tokio::test]
async fn test_list_filters_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(records_path()))
        .and(query_param("name", FQDN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": [
                {"id": "a1", "type": "CNAME", "name": FQDN, "content": "x.cfargotunnel.com"},
                {"id": "b2", "type": "TXT", "name": FQDN, "content": "note"}
            ],
            "result_info": {"page": 1, "per_page": 100, "count": 2, "total_count": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = client(&server).list(FQDN).await.unwrap();
    let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "b2"]);
}

#[tokio::test]
async fn test_delete_missing_record_is_already_absent() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/present", records_path())))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "errors": [],
            "result": {"id": "present"}
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path(format!("{}/gone", records_path())))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "success": false,
            "errors": [{"code": 81044, "message": "Record does not exist."}],
            "result": null
        })))
        .mount(&server)
        .await;

    let dns = client(&server);
    assert_eq!(dns.delete("present").await.unwrap(), Removal::Removed);
    assert_eq!(dns.delete("gone").await.unwrap(), Removal::AlreadyAbsent);
}

#[tokio::test]
async fn test_server_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
        .mount(&server)
        .await;

    let err = client(&server).delete("any").await.unwrap_err();
    assert!(matches!(err, ProviderError::Transport(_)));
}
