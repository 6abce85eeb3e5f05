use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::{json, Value};
use sitewatch::core::Config;
use sitewatch::engine::{ScraperRegistry, StatusEngine};
use sitewatch::gateway::config::GatewayConfig;
use sitewatch::gateway::serve_listener;
use tokio::net::TcpListener;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "shared-secret";

async fn prometheus_up() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(path("/api/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "data": {"resultType": "vector", "result": [{"metric": {}, "value": [0, "1"]}]}
        })))
        .mount(&server)
        .await;
    server
}

fn instance(name: &str, peer_name: &str, peer_url: &str, prom_url: &str, app: &str) -> Config {
    let document: Value = json!({
        "locations": [
            {"name": "paris", "latitude": 48.85, "longitude": 2.35},
            {"name": "tokyo", "latitude": 35.68, "longitude": 139.69}
        ],
        "sources": [
            {"name": "prom", "type": "prometheus", "labels": {"env": "prod"}, "config": {
                "url": prom_url,
                "apps": [{"name": app, "location": "paris", "query": "up"}]
            }},
            {"name": peer_name, "type": "site", "config": {
                "url": peer_url, "token": TOKEN, "interval": "1h", "timeout": "2s"
            }}
        ],
        "server_settings": {
            "name": name,
            "token": TOKEN,
            "sync_enable": true,
            "scrape_interval": "1h"
        }
    });
    serde_json::from_value(document).unwrap()
}

#[tokio::test]
async fn mutual_sync_stabilises() -> anyhow::Result<()> {
    let prom = prometheus_up().await;
    let listener_x = TcpListener::bind("127.0.0.1:0").await?;
    let listener_y = TcpListener::bind("127.0.0.1:0").await?;
    let url_x = format!("http://{}", listener_x.local_addr()?);
    let url_y = format!("http://{}", listener_y.local_addr()?);

    let x = StatusEngine::from_config(
        &instance("node-x", "node-y", &url_y, &prom.uri(), "api"),
        ScraperRegistry::with_defaults(),
    )?;
    let y = StatusEngine::from_config(
        &instance("node-y", "node-x", &url_x, &prom.uri(), "web"),
        ScraperRegistry::with_defaults(),
    )?;
    let gateway_x = serve_listener(listener_x, x.handle(), GatewayConfig::for_tests())?;
    let gateway_y = serve_listener(listener_y, y.handle(), GatewayConfig::for_tests())?;

    let mut sizes = Vec::new();
    for _ in 0..5 {
        x.scrape_now().await;
        y.scrape_now().await;
        x.sync_now("node-y").await?;
        y.sync_now("node-x").await?;
        sizes.push((x.handle().cache().len(), y.handle().cache().len()));
    }

    assert!(sizes.windows(2).all(|pair| pair[0] == pair[1]), "{sizes:?}");
    assert_eq!(sizes[0], (2, 2));

    for engine in [&x, &y] {
        let keys: Vec<_> = engine
            .handle()
            .cache()
            .apps()
            .iter()
            .map(|app| (app.origin.clone(), app.name.clone()))
            .collect();
        let unique: BTreeSet<_> = keys.iter().cloned().collect();
        assert_eq!(keys.len(), unique.len());
    }

    let federated = x
        .handle()
        .cache()
        .apps()
        .into_iter()
        .find(|app| app.origin == "node-y")
        .expect("node-y app present on node-x");
    assert_eq!(federated.name, "web");
    assert_eq!(federated.labels["env"], "prod");

    gateway_x.shutdown();
    gateway_y.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;
    Ok(())
}

#[tokio::test]
async fn failed_sync_keeps_cached_entries() -> anyhow::Result<()> {
    let prom = prometheus_up().await;
    let peer = MockServer::start().await;
    Mock::given(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "node-y/prom/web": {
                "name": "web",
                "location": "tokyo",
                "status": "up",
                "source": "prom",
                "originURL": "node-y",
                "labels": {"env": "prod"},
                "lastSynced": "2026-10-19T12:00:00Z",
                "syncEnabled": true
            }
        })))
        .up_to_n_times(1)
        .mount(&peer)
        .await;
    Mock::given(path("/sync"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&peer)
        .await;

    let x = StatusEngine::from_config(
        &instance("node-x", "node-y", &peer.uri(), &prom.uri(), "api"),
        ScraperRegistry::with_defaults(),
    )?;

    assert_eq!(x.sync_now("node-y").await?, 1);
    assert_eq!(x.handle().cache().origins()["node-y"], 1);

    assert!(x.sync_now("node-y").await.is_err());
    assert_eq!(x.handle().cache().origins()["node-y"], 1);

    let report = x.handle().sites().get("node-y").unwrap().report();
    assert_eq!(report.error_count, 1);
    assert!(report.last_error.is_some());
    assert!(report.last_sync.is_some());
    assert!(!report.is_healthy());
    Ok(())
}

#[tokio::test]
async fn unnamed_instance_keeps_peer_statuses() -> anyhow::Result<()> {
    let host = sitewatch::core::ServerSettings::default().instance_name()?;
    let peer = MockServer::start().await;
    Mock::given(path("/sync"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            format!("{host}/prom/web"): {
                "name": "web",
                "location": "tokyo",
                "status": "up",
                "source": "prom",
                "originURL": host,
                "labels": {},
                "lastSynced": "2026-10-19T12:00:00Z",
                "syncEnabled": true
            }
        })))
        .mount(&peer)
        .await;

    let document: Value = json!({
        "locations": [{"name": "tokyo", "latitude": 35.68, "longitude": 139.69}],
        "sources": [
            {"name": "node-y", "type": "site", "config": {"url": peer.uri()}}
        ]
    });
    let config: Config = serde_json::from_value(document)?;
    let engine = StatusEngine::from_config(&config, ScraperRegistry::with_defaults())?;
    assert_eq!(engine.handle().origin(), host);

    assert_eq!(engine.sync_now("node-y").await?, 1);
    let apps = engine.handle().cache().apps();
    assert_eq!(apps.len(), 1);
    assert_eq!(apps[0].origin, "node-y");
    Ok(())
}
