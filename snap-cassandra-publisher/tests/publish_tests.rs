//! End-to-end publish tests against the in-memory store
//!
//! These tests drive [`Publisher`] through decoding, configuration, session
//! initialization and row writes without a Cassandra instance.

use futures::future::join_all;
use serde_json::json;
use snap_cassandra_core::{PublishError, JSON_CONTENT_TYPE};
use snap_cassandra_publisher::{
    config::{
        ConfigMap, ConfigValue, CA_PATH_KEY, PORT_KEY, SERVER_KEY, SSL_KEY, TAG_INDEX_KEY,
    },
    mock_client::MockConnector,
    Publisher,
};
use std::sync::Arc;
use std::time::Duration;

fn config() -> ConfigMap {
    let mut config = ConfigMap::new();
    config.insert(SERVER_KEY.to_string(), ConfigValue::from("127.0.0.1"));
    config
}

fn metric(ns: &[&str], data: serde_json::Value) -> serde_json::Value {
    json!({
        "namespace": ns,
        "version": 1,
        "source": "host-1",
        "timestamp": "2016-06-01T10:00:00Z",
        "data": data
    })
}

fn payload(metrics: Vec<serde_json::Value>) -> Vec<u8> {
    serde_json::to_vec(&metrics).unwrap()
}

fn setup() -> (Arc<MockConnector>, Publisher) {
    let connector = Arc::new(MockConnector::new());
    let publisher = Publisher::new(connector.clone());
    (connector, publisher)
}

#[cfg(test)]
mod scenario_tests {
    use super::*;

    #[tokio::test]
    async fn test_integer_metric_without_tag_index() {
        let (connector, publisher) = setup();
        let batch = payload(vec![metric(&["intel", "psutil", "load", "load1"], json!(103))]);

        publisher
            .publish(JSON_CONTENT_TYPE, &batch, &config())
            .await
            .unwrap();

        let store = connector.store().unwrap();
        let rows = store.metric_rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].ns, "intel/psutil/load/load1");
        assert_eq!(rows[0].double_val(), Some(103.0));
        assert_eq!(rows[0].str_val(), None);
        assert_eq!(rows[0].bool_val(), None);
        assert!(store.tag_rows().is_empty());
    }

    #[tokio::test]
    async fn test_map_value_is_rejected_without_rows() {
        let (connector, publisher) = setup();
        let batch = payload(vec![metric(&["intel", "map"], json!({"a": 1}))]);

        let err = publisher
            .publish(JSON_CONTENT_TYPE, &batch, &config())
            .await
            .unwrap_err();

        match err {
            PublishError::Batch(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("Invalid data type value found"));
            }
            other => panic!("Expected Batch, got {:?}", other),
        }

        let store = connector.store().unwrap();
        assert!(store.metric_rows().is_empty());
        assert!(store.tag_rows().is_empty());
        assert_eq!(publisher.stats().invalid_values_total, 1);
    }

    #[tokio::test]
    async fn test_tag_index_writes_only_present_keys() {
        let (connector, publisher) = setup();
        let mut config = config();
        config.insert(TAG_INDEX_KEY.to_string(), ConfigValue::from("experimentId,year"));

        let mut m = metric(&["intel", "psutil", "load", "load1"], json!(1.5));
        m["tags"] = json!({"experimentId": "101"});

        publisher
            .publish(JSON_CONTENT_TYPE, &payload(vec![m]), &config)
            .await
            .unwrap();

        let store = connector.store().unwrap();
        assert_eq!(store.metric_rows().len(), 1);

        let tag_rows = store.tag_rows();
        assert_eq!(tag_rows.len(), 1);
        assert_eq!(tag_rows[0].key, "experimentId");
        assert_eq!(tag_rows[0].val, "101");
        assert_eq!(tag_rows[0].row.ns, "intel/psutil/load/load1");
        assert_eq!(publisher.stats().tag_rows_written_total, 1);
    }

    #[tokio::test]
    async fn test_mixed_batch_keeps_going_in_order() {
        let (connector, publisher) = setup();
        let batch = payload(vec![
            metric(&["a"], json!(1)),
            metric(&["b"], json!([1, 2])),
            metric(&["c"], json!("up")),
            metric(&["d"], json!(null)),
            metric(&["e"], json!(true)),
        ]);

        let err = publisher
            .publish(JSON_CONTENT_TYPE, &batch, &config())
            .await
            .unwrap_err();

        // one message per rejected metric, joined with ';'
        assert_eq!(
            err.to_string(),
            "Invalid data type value found - [1,2];Invalid data type value found - null"
        );

        let rows = connector.store().unwrap().metric_rows();
        let namespaces: Vec<&str> = rows.iter().map(|r| r.ns.as_str()).collect();
        assert_eq!(namespaces, vec!["a", "c", "e"]);
        assert_eq!(rows[1].value_type().label(), "strval");
        assert_eq!(rows[2].value_type().label(), "boolval");
    }
}

#[cfg(test)]
mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_decode_error_short_circuits() {
        let (connector, publisher) = setup();

        let err = publisher
            .publish(JSON_CONTENT_TYPE, b"[{\"namespace\":", &config())
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Decode(_)));
        assert_eq!(connector.connect_calls(), 0);
        assert_eq!(publisher.stats().decode_errors_total, 1);
    }

    #[tokio::test]
    async fn test_unknown_content_type() {
        let (connector, publisher) = setup();

        let err = publisher
            .publish("snap.gob", &payload(vec![metric(&["a"], json!(1))]), &config())
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::UnknownContentType(ref ct) if ct == "snap.gob"));
        assert_eq!(connector.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_ssl_without_ca_fails_before_connecting() {
        let (connector, publisher) = setup();
        let mut config = config();
        config.insert(SSL_KEY.to_string(), ConfigValue::Bool(true));
        let batch = payload(vec![metric(&["a"], json!(1))]);

        let err = publisher
            .publish(JSON_CONTENT_TYPE, &batch, &config)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Configuration(_)));
        assert!(!err.is_fatal());
        assert_eq!(connector.connect_calls(), 0);
        assert!(!publisher.is_initialized());

        // corrected configuration initializes on the next call
        config.insert(CA_PATH_KEY.to_string(), ConfigValue::from("/etc/cassandra/ca.pem"));
        publisher
            .publish(JSON_CONTENT_TYPE, &batch, &config)
            .await
            .unwrap();
        assert_eq!(connector.connect_calls(), 1);
        let ssl = connector.last_options().unwrap().ssl.unwrap();
        assert_eq!(ssl.ca_path.unwrap().to_str(), Some("/etc/cassandra/ca.pem"));
    }

    #[tokio::test]
    async fn test_port_as_string_is_configuration_error() {
        let (connector, publisher) = setup();
        let mut config = config();
        config.insert(PORT_KEY.to_string(), ConfigValue::from("9042"));

        let err = publisher
            .publish(JSON_CONTENT_TYPE, b"[]", &config)
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Configuration(_)));
        assert_eq!(connector.connect_calls(), 0);
    }

    #[tokio::test]
    async fn test_session_failure_is_fatal() {
        let connector = Arc::new(MockConnector::new().with_connect_failure());
        let publisher = Publisher::new(connector.clone());

        let err = publisher
            .publish(JSON_CONTENT_TYPE, &payload(vec![metric(&["a"], json!(1))]), &config())
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(!publisher.is_initialized());
    }

    #[tokio::test]
    async fn test_write_failures_are_collected() {
        let connector = Arc::new(MockConnector::new().with_failing_namespace("bad"));
        let publisher = Publisher::new(connector.clone());
        let mut config = config();
        config.insert(TAG_INDEX_KEY.to_string(), ConfigValue::from("rack"));

        let mut bad = metric(&["bad"], json!(1));
        bad["tags"] = json!({"rack": "r1"});
        let good = metric(&["good"], json!(2));

        let err = publisher
            .publish(JSON_CONTENT_TYPE, &payload(vec![bad, good]), &config)
            .await
            .unwrap_err();

        // the primary and the tag row of "bad" both fail
        match err {
            PublishError::Batch(errors) => assert_eq!(errors.len(), 2),
            other => panic!("Expected Batch, got {:?}", other),
        }

        let store = connector.store().unwrap();
        assert_eq!(store.metric_rows().len(), 1);
        assert_eq!(store.metric_rows()[0].ns, "good");
        assert_eq!(publisher.stats().store_errors_total, 2);
        assert_eq!(publisher.store_stats().unwrap().failed_queries, 2);
    }
}

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_calls_open_one_session() {
        let connector =
            Arc::new(MockConnector::new().with_connect_delay(Duration::from_millis(50)));
        let publisher = Arc::new(Publisher::new(connector.clone()));
        let config = config();

        let calls = (0..8).map(|i| {
            let publisher = publisher.clone();
            let config = config.clone();
            let name = i.to_string();
            let batch = payload(vec![metric(&["load", name.as_str()], json!(i))]);
            tokio::spawn(async move { publisher.publish(JSON_CONTENT_TYPE, &batch, &config).await })
        });

        for result in join_all(calls).await {
            result.unwrap().unwrap();
        }

        assert_eq!(connector.connect_calls(), 1);
        assert_eq!(connector.stores().len(), 1);
        assert_eq!(connector.store().unwrap().metric_rows().len(), 8);
        assert_eq!(publisher.stats().batches_total, 8);
    }

    #[tokio::test]
    async fn test_first_configuration_wins() {
        let (connector, publisher) = setup();
        publisher
            .publish(JSON_CONTENT_TYPE, b"[]", &config())
            .await
            .unwrap();

        let mut other = config();
        other.insert(SERVER_KEY.to_string(), ConfigValue::from("10.9.9.9"));
        other.insert(TAG_INDEX_KEY.to_string(), ConfigValue::from("rack"));

        let mut m = metric(&["a"], json!(1));
        m["tags"] = json!({"rack": "r1"});
        publisher
            .publish(JSON_CONTENT_TYPE, &payload(vec![m]), &other)
            .await
            .unwrap();

        assert_eq!(connector.connect_calls(), 1);
        assert_eq!(publisher.settings().unwrap().options.server, "127.0.0.1");
        assert!(connector.store().unwrap().tag_rows().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        // closing before anything was published
        let (_, idle) = setup();
        idle.close().await;
        idle.close().await;

        let (connector, publisher) = setup();
        publisher
            .publish(JSON_CONTENT_TYPE, b"[]", &config())
            .await
            .unwrap();

        publisher.close().await;
        publisher.close().await;
        assert!(connector.store().unwrap().is_closed());

        let err = publisher
            .publish(JSON_CONTENT_TYPE, b"[]", &config())
            .await
            .unwrap_err();
        assert!(matches!(err, PublishError::Closed));
    }
}
