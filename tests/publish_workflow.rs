// Publish workflow scenarios against a canned-response registry stub
//
// Each stub connection serves one prepared response and records the
// request body it received, so the tests can assert both the workflow's
// outcome and exactly which mutations reached the registry.

use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use dao_publish::artifacts::DeploymentRecord;
use dao_publish::config::DaoConfig;
use dao_publish::registry::auth::AuthClient;
use dao_publish::registry::publish::{Publisher, PublishOutcome};
use dao_publish::registry::RegistryClient;
use dao_publish::PipelineError;

/// Serve one canned `(status, body)` response per connection, recording
/// request bodies in arrival order
async fn stub_registry(responses: Vec<(u16, Value)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&bodies);
    tokio::spawn(async move {
        for (status, payload) in responses {
            let (mut socket, _) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(_) => return,
            };
            let body = read_request_body(&mut socket).await;
            recorded.lock().unwrap().push(body);
            let payload = payload.to_string();
            let reply = format!(
                "HTTP/1.1 {} STUB\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                payload.len(),
                payload
            );
            let _ = socket.write_all(reply.as_bytes()).await;
        }
    });
    (endpoint, bodies)
}

async fn read_request_body(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let read = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(read) => read,
        };
        buf.extend_from_slice(&chunk[..read]);
        if let Some(split) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..split]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            let body_start = split + 4;
            while buf.len() < body_start + length {
                let read = match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(read) => read,
                };
                buf.extend_from_slice(&chunk[..read]);
            }
            return String::from_utf8_lossy(&buf[body_start..]).to_string();
        }
    }
    String::new()
}

fn deployment_record() -> DeploymentRecord {
    serde_json::from_value(json!({
        "transactions": [
            {
                "contractName": "UngovernableERC20",
                "transactionType": "CREATE",
                "contractAddress": "0xT000000000000000000000000000000000000001",
                "arguments": ["Foo", "FOO"],
                "blockNumber": 99
            },
            {
                "contractName": "UngovernableGovernor",
                "transactionType": "CREATE",
                "contractAddress": "0xG000000000000000000000000000000000000002",
                "arguments": [],
                "blockNumber": 100
            }
        ]
    }))
    .unwrap()
}

async fn publish_against(endpoint: &str) -> Result<PublishOutcome, PipelineError> {
    let registry = RegistryClient::new(endpoint, "registry-key");
    // A supplied token keeps the login exchange out of these scenarios
    let mut auth = AuthClient::new(None, Some("stub-token".to_string()));
    let mut publisher = Publisher::new(&registry, &mut auth);
    let dao = DaoConfig {
        name: "Foo DAO".to_string(),
        description: "On-chain governance for the Foo token (FOO)".to_string(),
    };
    publisher
        .publish(
            &deployment_record(),
            "1",
            "UngovernableGovernor",
            "UngovernableERC20",
            &dao,
        )
        .await
}

#[tokio::test]
async fn probe_exists_reports_existing_without_authoritative_create() {
    let (endpoint, bodies) = stub_registry(vec![
        (
            200,
            json!({"errors": [{"message": "create dao: governor already exists"}]}),
        ),
        (
            200,
            json!({"data": {"governor": {
                "id": "eip155:1:0xG000000000000000000000000000000000000002",
                "organization": {"id": "org-7", "name": "Existing DAO"}
            }}}),
        ),
    ])
    .await;

    let outcome = publish_against(&endpoint).await.unwrap();
    assert!(outcome.existing);
    assert_eq!(
        outcome.governor_id,
        "eip155:1:0xG000000000000000000000000000000000000002"
    );
    assert_eq!(outcome.dao_id.as_deref(), Some("org-7"));
    assert_eq!(outcome.dao_name.as_deref(), Some("Existing DAO"));

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    // The only create mutation sent is the placeholder probe
    assert_eq!(
        bodies.iter().filter(|body| body.contains("createDao")).count(),
        1
    );
    let probe: Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(probe["variables"]["name"], "tmp");
    assert!(bodies[1].contains("governor(input"));
}

#[tokio::test]
async fn clean_create_reports_new_registration() {
    let (endpoint, bodies) = stub_registry(vec![
        (
            200,
            json!({"errors": [{"message": "placeholder name rejected"}]}),
        ),
        (
            200,
            json!({"data": {"createDao": {"id": "dao-42", "name": "Foo DAO"}}}),
        ),
    ])
    .await;

    let outcome = publish_against(&endpoint).await.unwrap();
    assert!(!outcome.existing);
    assert_eq!(
        outcome.governor_id,
        "eip155:1:0xG000000000000000000000000000000000000002"
    );
    assert_eq!(outcome.dao_id.as_deref(), Some("dao-42"));
    assert_eq!(outcome.dao_name.as_deref(), Some("Foo DAO"));

    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 2);
    let create: Value = serde_json::from_str(&bodies[1]).unwrap();
    assert_eq!(create["variables"]["name"], "Foo DAO");
    let governor = &create["variables"]["governors"][0];
    assert_eq!(
        governor["id"],
        "eip155:1:0xG000000000000000000000000000000000000002"
    );
    assert_eq!(governor["startBlock"], 100);
    assert_eq!(
        governor["token"]["id"],
        "eip155:1/erc20:0xT000000000000000000000000000000000000001"
    );
    assert_eq!(governor["token"]["startBlock"], 99);
}

#[tokio::test]
async fn create_losing_the_race_resolves_to_existing() {
    let (endpoint, bodies) = stub_registry(vec![
        (
            200,
            json!({"errors": [{"message": "placeholder name rejected"}]}),
        ),
        (
            200,
            json!({"errors": [{"message": "create dao: governor already exists"}]}),
        ),
        // Both detail lookups come back not-found; still not an error
        (422, json!({})),
        (422, json!({})),
    ])
    .await;

    let outcome = publish_against(&endpoint).await.unwrap();
    assert!(outcome.existing);
    assert!(outcome.dao_id.is_none());
    assert!(outcome.dao_name.is_none());
    assert_eq!(bodies.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn unrelated_create_error_is_publish_failed_with_payload() {
    let (endpoint, _bodies) = stub_registry(vec![
        (
            200,
            json!({"errors": [{"message": "placeholder name rejected"}]}),
        ),
        (
            200,
            json!({"errors": [{"message": "description too long"}]}),
        ),
    ])
    .await;

    let err = publish_against(&endpoint).await.unwrap_err();
    match err {
        PipelineError::PublishFailed { payload, .. } => {
            assert!(payload.to_string().contains("description too long"));
        }
        other => panic!("unexpected error: {}", other),
    }
}
