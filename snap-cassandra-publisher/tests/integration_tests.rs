//! Integration tests for the Cassandra publisher
//!
//! These tests require a running Cassandra instance reachable at
//! `SNAP_CASSANDRA_HOST`. Run with:
//!
//! SNAP_CASSANDRA_HOST=127.0.0.1 cargo test --test integration_tests -- --ignored

use chrono::Utc;
use serde_json::json;
use snap_cassandra_core::{PublishError, JSON_CONTENT_TYPE};
use snap_cassandra_publisher::{
    config::{ConfigMap, ConfigValue, KEYSPACE_NAME_KEY, SERVER_KEY, TAG_INDEX_KEY},
    Publisher,
};

fn live_config() -> ConfigMap {
    let host = std::env::var("SNAP_CASSANDRA_HOST")
        .expect("SNAP_CASSANDRA_HOST must point at a Cassandra node");

    let mut config = ConfigMap::new();
    config.insert(SERVER_KEY.to_string(), ConfigValue::from(host));
    config.insert(KEYSPACE_NAME_KEY.to_string(), ConfigValue::from("snap_it"));
    config.insert(TAG_INDEX_KEY.to_string(), ConfigValue::from("zone"));
    config
}

fn batch(data: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&json!([{
        "namespace": ["foo"],
        "version": 1,
        "source": "integration",
        "timestamp": Utc::now().to_rfc3339(),
        "tags": {"zone": "red"},
        "data": data
    }]))
    .unwrap()
}

#[tokio::test]
#[ignore = "requires a Cassandra instance at SNAP_CASSANDRA_HOST"]
async fn test_publish_scalar_metrics() {
    let publisher = Publisher::cassandra();
    let config = live_config();

    for data in [json!(99), json!(3.14), json!("bar"), json!(true)] {
        publisher
            .publish(JSON_CONTENT_TYPE, &batch(data), &config)
            .await
            .unwrap();
    }

    let stats = publisher.stats();
    assert_eq!(stats.rows_written_total, 4);
    assert_eq!(stats.tag_rows_written_total, 4);

    let store_stats = publisher.store_stats().unwrap();
    assert_eq!(store_stats.failed_queries, 0);

    publisher.close().await;
}

#[tokio::test]
#[ignore = "requires a Cassandra instance at SNAP_CASSANDRA_HOST"]
async fn test_publish_rejects_composite_value() {
    let publisher = Publisher::cassandra();

    let err = publisher
        .publish(JSON_CONTENT_TYPE, &batch(json!({"a": 1})), &live_config())
        .await
        .unwrap_err();
    assert!(matches!(err, PublishError::Batch(_)));
    assert_eq!(publisher.stats().rows_written_total, 0);

    publisher.close().await;
}
