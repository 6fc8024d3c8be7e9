// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `discovery.rs`

#[cfg(test)]
mod tests {
    use crate::discovery::{derive_status, ensure_dynamic, list_servers, resolve, selector_matches};
    use crate::errors::ServerError;
    use crate::labels::RESTARTED_AT_ANNOTATION;
    use crate::protocol::Protocol;
    use crate::test_support::{
        ftp_request, gateway, manager, seed_static_ftp, seed_static_ftp_in, settings,
    };
    use crate::types::ServerStatus;
    use chrono::{Duration, Utc};
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStatus};
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    fn deployment(replicas: i32, ready: i32) -> Deployment {
        Deployment {
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_static_server_classified_by_label() {
        let gw = gateway();
        seed_static_ftp(&gw, "ts-ftp", "primary", 30021);

        let servers = list_servers(&*gw, &settings()).await.unwrap();
        assert_eq!(servers.len(), 1);
        let server = &servers[0];
        assert_eq!(server.name, "primary");
        assert_eq!(server.protocol, Protocol::Ftp);
        assert!(!server.is_dynamic);
        assert_eq!(server.managed_by, "Helm");
        assert_eq!(server.node_port, Some(30021));
        assert_eq!(server.port, Some(21));
        assert_eq!(server.cluster_ip.as_deref(), Some("10.96.100.1"));
        assert_eq!(server.status, ServerStatus::Running);

        let config = server.config.as_ref().unwrap();
        assert_eq!(config.username.as_deref(), Some("static-user"));
        assert_eq!(config.password.as_deref(), Some("static-pass"));
    }

    #[tokio::test]
    async fn test_static_servers_sharing_release_instance_keep_their_services() {
        let gw = gateway();
        seed_static_ftp_in(&gw, "ts", "ts-ftp-one", "one", 30021);
        seed_static_ftp_in(&gw, "ts", "ts-ftp-two", "two", 30022);

        let servers = list_servers(&*gw, &settings()).await.unwrap();
        assert_eq!(servers.len(), 2);
        let one = servers.iter().find(|s| s.name == "one").unwrap();
        let two = servers.iter().find(|s| s.name == "two").unwrap();
        assert_eq!(one.service_name.as_deref(), Some("ts-ftp-one"));
        assert_eq!(one.node_port, Some(30021));
        assert_eq!(two.service_name.as_deref(), Some("ts-ftp-two"));
        assert_eq!(two.node_port, Some(30022));
    }

    #[test]
    fn test_selector_matches() {
        let pod_labels = BTreeMap::from([
            ("app".to_string(), "ftp".to_string()),
            ("tier".to_string(), "server".to_string()),
        ]);
        let subset = BTreeMap::from([("app".to_string(), "ftp".to_string())]);
        let other = BTreeMap::from([("app".to_string(), "sftp".to_string())]);

        assert!(selector_matches(Some(&subset), &pod_labels));
        assert!(selector_matches(Some(&pod_labels), &pod_labels));
        assert!(!selector_matches(Some(&other), &pod_labels));
        assert!(!selector_matches(Some(&BTreeMap::new()), &pod_labels));
        assert!(!selector_matches(None, &pod_labels));
    }

    #[tokio::test]
    async fn test_dynamic_server_config_comes_from_annotation() {
        let gw = gateway();
        let mgr = manager(&gw);
        mgr.create_server(Protocol::Ftp, ftp_request("a", None))
            .await
            .unwrap();

        let servers = list_servers(&*gw, &settings()).await.unwrap();
        let config = servers[0].config.as_ref().unwrap();
        assert_eq!(config.name.as_deref(), Some("a"));
        assert_eq!(config.username.as_deref(), Some("alice"));
        // Assigned port is recorded for export
        assert_eq!(config.node_port, servers[0].node_port);
    }

    #[tokio::test]
    async fn test_consecutive_scans_are_identical() {
        let gw = gateway();
        let mgr = manager(&gw);
        seed_static_ftp(&gw, "ts-ftp", "primary", 30021);
        mgr.create_server(Protocol::Ftp, ftp_request("a", None))
            .await
            .unwrap();
        mgr.create_server(Protocol::Http, ftp_request("web", None))
            .await
            .unwrap();

        let first: BTreeSet<String> = list_servers(&*gw, &settings())
            .await
            .unwrap()
            .into_iter()
            .map(|s| serde_json::to_string(&s).unwrap())
            .collect();
        let second: BTreeSet<String> = list_servers(&*gw, &settings())
            .await
            .unwrap()
            .into_iter()
            .map(|s| serde_json::to_string(&s).unwrap())
            .collect();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_resolve_by_resource_then_logical_name() {
        let gw = gateway();
        let mgr = manager(&gw);
        mgr.create_server(Protocol::Ftp, ftp_request("a", None))
            .await
            .unwrap();
        mgr.create_server(Protocol::Http, ftp_request("a", None))
            .await
            .unwrap();
        let servers = mgr.list_servers().await.unwrap();

        let by_resource = resolve(servers.clone(), "ts-http-a", None).unwrap();
        assert_eq!(by_resource.protocol, Protocol::Http);

        let err = resolve(servers.clone(), "a", None).unwrap_err();
        assert!(matches!(err, ServerError::Validation(_)), "{err:?}");

        let by_protocol = resolve(servers.clone(), "a", Some(Protocol::Ftp)).unwrap();
        assert_eq!(by_protocol.resource_name, "ts-ftp-a");

        assert!(matches!(
            resolve(servers, "zzz", None),
            Err(ServerError::NotFound(_))
        ));
    }

    #[test]
    fn test_derive_status() {
        let now = Utc::now();
        assert_eq!(derive_status(&deployment(1, 1), now), ServerStatus::Running);
        assert_eq!(derive_status(&deployment(0, 0), now), ServerStatus::Stopped);
        assert_eq!(derive_status(&deployment(1, 0), now), ServerStatus::Creating);

        let mut restarting = deployment(1, 0);
        restarting.metadata.annotations = Some(BTreeMap::from([(
            RESTARTED_AT_ANNOTATION.to_string(),
            (now - Duration::seconds(5)).to_rfc3339(),
        )]));
        assert_eq!(derive_status(&restarting, now), ServerStatus::Restarting);

        let mut stale_restart = deployment(1, 0);
        stale_restart.metadata.annotations = Some(BTreeMap::from([(
            RESTARTED_AT_ANNOTATION.to_string(),
            (now - Duration::seconds(600)).to_rfc3339(),
        )]));
        assert_eq!(derive_status(&stale_restart, now), ServerStatus::Creating);

        let mut deleting = deployment(1, 1);
        deleting.metadata.deletion_timestamp =
            serde_json::from_value(serde_json::json!("2025-01-01T00:00:00Z")).unwrap();
        assert_eq!(derive_status(&deleting, now), ServerStatus::Deleting);
    }

    #[tokio::test]
    async fn test_ensure_dynamic() {
        let gw = gateway();
        seed_static_ftp(&gw, "ts-ftp", "primary", 30021);
        let servers = list_servers(&*gw, &settings()).await.unwrap();
        match ensure_dynamic(&servers[0]) {
            Err(ServerError::Protection { name, managed_by }) => {
                assert_eq!(name, "primary");
                assert_eq!(managed_by, "Helm");
            }
            other => panic!("expected protection error, got {other:?}"),
        }
    }
}
