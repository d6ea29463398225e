//! RPC client against a mock node

use mockito::{Matcher, Server, ServerGuard};
use serde_json::json;
use std::time::Duration;
use zano_sync_rpc::{ChainSource, Error, RetryConfig, RpcClient, RpcClientConfig};

fn client(server: &ServerGuard) -> RpcClient {
    RpcClient::new(server.url()).unwrap()
}

fn rpc_body(result: serde_json::Value) -> String {
    json!({ "id": 1, "jsonrpc": "2.0", "result": result }).to_string()
}

fn method(name: &str) -> Matcher {
    Matcher::PartialJson(json!({ "jsonrpc": "2.0", "method": name }))
}

#[tokio::test]
async fn test_current_height() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/getheight")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"height": 2812345, "status": "OK"}"#)
        .create_async()
        .await;

    assert_eq!(client(&server).current_height().await.unwrap(), 2_812_345);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_json_rpc_suffix_is_stripped() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/json_rpc")
        .match_body(method("get_blocks_details"))
        .with_body(rpc_body(json!({ "blocks": [] })))
        .create_async()
        .await;

    let client = RpcClient::new(format!("{}/json_rpc/", server.url())).unwrap();
    assert_eq!(client.endpoint(), server.url());
    assert!(client.block_range(0, 10).await.unwrap().is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_block_range_parses_blocks() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/json_rpc")
        .match_body(Matcher::PartialJson(json!({
            "method": "get_blocks_details",
            "params": { "height_start": 100, "count": 2, "ignore_transactions": false }
        })))
        .with_body(rpc_body(json!({
            "blocks": [
                {
                    "id": "aa",
                    "height": 100,
                    "timestamp": 1_700_000_000,
                    "total_fee": "10000000000",
                    "type": 1,
                    "miner_text_info": "hello",
                    "unknown_field": [1, 2, 3],
                    "transactions_details": [
                        { "id": "t1", "keeper_block": 100, "timestamp": 1_700_000_000,
                          "ins": [], "outs": [{ "amount": 5 }], "extra": [] }
                    ]
                },
                { "id": "bb", "height": "101", "timestamp": "1700000120" }
            ]
        })))
        .create_async()
        .await;

    let blocks = client(&server).block_range(100, 2).await.unwrap();
    mock.assert_async().await;

    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].height, 100);
    assert_eq!(blocks[0].total_fee.as_deref(), Some("10000000000"));
    assert_eq!(blocks[0].transactions_details.len(), 1);
    assert_eq!(blocks[0].transactions_details[0].outs, Some(json!([{ "amount": 5 }])));
    assert_eq!(blocks[1].height, 101);
    assert_eq!(blocks[1].timestamp, 1_700_000_120);
    assert!(blocks[1].transactions_details.is_empty());
}

#[tokio::test]
async fn test_json_rpc_error_object() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/json_rpc")
        .with_body(
            json!({ "id": 1, "jsonrpc": "2.0", "error": { "code": -2, "message": "busy" } })
                .to_string(),
        )
        .create_async()
        .await;

    let err = client(&server).block_range(0, 1).await.unwrap_err();
    match err {
        Error::RpcUnavailable(msg) => assert!(msg.contains("busy")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_http_error_status() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/getheight")
        .with_status(500)
        .create_async()
        .await;

    let err = client(&server).current_height().await.unwrap_err();
    assert!(matches!(err, Error::RpcUnavailable(_)));
}

#[tokio::test]
async fn test_malformed_response() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/json_rpc")
        .with_body("not json")
        .create_async()
        .await;

    let err = client(&server).tx_details("abc").await.unwrap_err();
    assert!(matches!(err, Error::RpcUnavailable(_)));
}

#[tokio::test]
async fn test_tx_details() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/json_rpc")
        .match_body(Matcher::PartialJson(json!({
            "method": "get_tx_details",
            "params": { "tx_hash": "abc" }
        })))
        .with_body(rpc_body(json!({
            "tx_info": { "id": "abc", "keeper_block": "77", "ins": [{ "k": 1 }], "fee": 10 }
        })))
        .create_async()
        .await;

    let tx = client(&server).tx_details("abc").await.unwrap();
    assert_eq!(tx.id, "abc");
    assert_eq!(tx.keeper_block, Some(77));
    assert_eq!(tx.fee.as_deref(), Some("10"));
    assert!(!tx.is_missing_payload());
}

#[tokio::test]
async fn test_getinfo_fields() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/json_rpc")
        .match_body(Matcher::PartialJson(json!({
            "method": "getinfo",
            "params": { "flags": 1_048_575 }
        })))
        .with_body(rpc_body(json!({
            "alias_count": 1234,
            "pos_difficulty": "3850000000000000000",
            "total_coins": "14460000000000000000"
        })))
        .expect(2)
        .create_async()
        .await;

    let client = client(&server);
    assert_eq!(client.alias_count().await.unwrap(), 1234);
    let staking = client.staking_snapshot().await.unwrap();
    assert_eq!(staking.pos_difficulty, 3.85e18);
    assert_eq!(staking.total_coins, 1.446e19);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_alias_names() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/json_rpc")
        .match_body(method("get_all_alias_details"))
        .with_body(rpc_body(json!({
            "aliases": [
                { "alias": "zano", "address": "Zx1" },
                { "alias": "longalias", "address": "Zx2" }
            ]
        })))
        .create_async()
        .await;

    let names = client(&server).alias_names().await.unwrap();
    assert_eq!(names, vec!["zano".to_string(), "longalias".to_string()]);
}

#[tokio::test]
async fn test_asset_count_pages() {
    let mut server = Server::new_async().await;
    let full_page: Vec<_> = (0..100).map(|i| json!({ "asset_id": i })).collect();
    let short_page: Vec<_> = (0..30).map(|i| json!({ "asset_id": i })).collect();

    let first = server
        .mock("POST", "/json_rpc")
        .match_body(Matcher::PartialJson(json!({
            "method": "get_assets_list",
            "params": { "offset": 0, "count": 100 }
        })))
        .with_body(rpc_body(json!({ "assets": full_page })))
        .create_async()
        .await;
    let second = server
        .mock("POST", "/json_rpc")
        .match_body(Matcher::PartialJson(json!({
            "method": "get_assets_list",
            "params": { "offset": 100, "count": 100 }
        })))
        .with_body(rpc_body(json!({ "assets": short_page })))
        .create_async()
        .await;

    assert_eq!(client(&server).asset_count().await.unwrap(), 130);
    first.assert_async().await;
    second.assert_async().await;
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/getheight")
        .with_status(503)
        .expect(3)
        .create_async()
        .await;

    let client = RpcClient::with_config(RpcClientConfig {
        endpoint: server.url(),
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        },
        ..Default::default()
    })
    .unwrap();

    assert!(client.current_height().await.is_err());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_default_client_does_not_retry() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/getheight")
        .with_status(503)
        .expect(1)
        .create_async()
        .await;

    assert!(client(&server).current_height().await.is_err());
    mock.assert_async().await;
}
