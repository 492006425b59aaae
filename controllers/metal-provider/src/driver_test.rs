//! Unit tests for the machine provisioning driver

#[cfg(test)]
mod tests {
    use crate::api::{CreateMachineRequest, PROVIDER_NAME};
    use crate::config::PollConfig;
    use crate::allocator::MAX_NAME_LENGTH;
    use crate::driver::{Driver, IGNITION_DATA_KEY, ignition_secret_name, provider_id};
    use crate::error::{AllocationError, Code, DriverError};
    use crate::test_utils::*;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use crds::Power;
    use metal_client::{ClientProvider, MockClientFactory, MockMetalApi, MockOperation};
    use serde_json::{Value, json};
    use std::collections::HashSet;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn ignition_bytes(document: &Value, path: &str) -> Option<Vec<u8>> {
        let file = document["storage"]["files"]
            .as_array()?
            .iter()
            .find(|f| f["path"] == path)?;
        let encoded = file["contents"]["source"].as_str()?.strip_prefix("data:;base64,")?;
        STANDARD.decode(encoded).ok()
    }

    fn ignition_file(document: &Value, path: &str) -> Option<String> {
        String::from_utf8(ignition_bytes(document, path)?).ok()
    }

    fn rendered_document(api: &MockMetalApi, machine: &str) -> Value {
        let secret = api
            .secret(TEST_NAMESPACE, &ignition_secret_name(machine))
            .expect("ignition secret applied");
        let data = secret.data.expect("ignition secret has data");
        serde_json::from_slice(&data[IGNITION_DATA_KEY].0).unwrap()
    }

    #[tokio::test]
    async fn test_create_machine_end_to_end() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 1));
        let driver = create_test_driver(&api);

        let response = driver
            .create_machine(&create_valid_request("m1"), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(response.node_name, "m1");
        assert_eq!(response.provider_id, "ironcore-metal://metal/m1");
        assert_eq!(
            api.applied(),
            vec![
                "IPAddressClaim metal/m1-eth0".to_string(),
                "Secret metal/m1-ignition".to_string(),
                "ServerClaim metal/m1".to_string(),
            ]
        );

        let document = rendered_document(&api, "m1");
        let metadata: Value =
            serde_json::from_str(&ignition_file(&document, "/var/lib/metal-cloud-config/metadata").unwrap()).unwrap();
        assert_eq!(
            metadata,
            json!({
                "foo": "bar",
                "eth0": {"ip": "10.0.0.5", "prefix": 24, "gateway": "10.0.0.1"}
            })
        );
        assert_eq!(ignition_file(&document, "/etc/hostname").unwrap(), "m1");

        let claim = api.server_claim(TEST_NAMESPACE, "m1").unwrap();
        assert_eq!(claim.spec.power, Power::On);
        assert_eq!(claim.spec.image, "gardenlinux:1443.3");
        assert_eq!(claim.spec.ignition_secret_ref.unwrap().name, "m1-ignition");
        assert_eq!(
            claim.spec.server_selector.unwrap().match_labels.get("instance-type").map(String::as_str),
            Some("bx2-metal")
        );
        assert_eq!(
            claim.metadata.labels.unwrap().get("shoot").map(String::as_str),
            Some("ci")
        );
    }

    #[tokio::test]
    async fn test_create_machine_is_idempotent() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 0));
        let driver = create_test_driver(&api);
        let request = create_valid_request("m1");

        let first = driver.create_machine(&request, &CancellationToken::new()).await.unwrap();
        let second = driver.create_machine(&request, &CancellationToken::new()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(api.applied_count("IPAddressClaim"), 1, "bound claim must not be written again");
        assert_eq!(api.applied_count("Secret"), 2);
        assert_eq!(api.applied_count("ServerClaim"), 2);
    }

    #[tokio::test]
    async fn test_create_machine_rejects_other_provider() {
        let api = MockMetalApi::new("mock");
        let driver = create_test_driver(&api);
        let request = create_test_request("m1", "aws", create_test_provider_spec());

        let err = driver.create_machine(&request, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(&err, DriverError::InvalidArgument(msg) if msg.contains("'aws'")));
        assert_eq!(err.code(), Code::InvalidArgument);
        assert!(api.applied().is_empty());
        assert_eq!(api.call_count(MockOperation::GetIPAddressClaim), 0);
    }

    #[tokio::test]
    async fn test_create_machine_rejects_empty_request() {
        let api = MockMetalApi::new("mock");
        let driver = create_test_driver(&api);
        let valid = create_valid_request("m1");

        let requests = [
            CreateMachineRequest::default(),
            CreateMachineRequest {
                machine: None,
                ..valid.clone()
            },
            CreateMachineRequest {
                machine_class: None,
                ..valid.clone()
            },
            CreateMachineRequest {
                secret: None,
                ..valid.clone()
            },
        ];
        for request in &requests {
            let err = driver.create_machine(request, &CancellationToken::new()).await.unwrap_err();
            assert!(matches!(&err, DriverError::InvalidArgument(msg) if msg == "received empty request"));
        }
        assert!(api.applied().is_empty());
    }

    #[tokio::test]
    async fn test_create_machine_undecodable_provider_spec() {
        let api = MockMetalApi::new("mock");
        let driver = create_test_driver(&api);
        let request = create_test_request("m1", PROVIDER_NAME, json!({"image": 42}));

        let err = driver.create_machine(&request, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, DriverError::Configuration(_)));
        assert!(api.applied().is_empty());
    }

    #[tokio::test]
    async fn test_create_machine_invalid_provider_spec() {
        let api = MockMetalApi::new("mock");
        let driver = create_test_driver(&api);
        let mut spec = create_test_provider_spec();
        spec["image"] = json!("");
        spec["dnsServers"] = json!(["not-an-ip"]);

        let err = driver
            .create_machine(&create_test_request("m1", PROVIDER_NAME, spec), &CancellationToken::new())
            .await
            .unwrap_err();

        let DriverError::Configuration(message) = &err else {
            panic!("expected a configuration error, got {err:?}");
        };
        assert!(message.contains("providerSpec.image"));
        assert!(message.contains("providerSpec.dnsServers[0]"));
        assert!(api.applied().is_empty());
    }

    #[tokio::test]
    async fn test_create_machine_poll_timeout_skips_server_claim() {
        let api = MockMetalApi::new("mock");
        let driver = create_test_driver(&api);

        let err = driver
            .create_machine(&create_valid_request("m1"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(&err, DriverError::Allocation(AllocationError::Timeout { claim, .. }) if claim == "m1-eth0"));
        assert_eq!(err.code(), Code::DeadlineExceeded);
        assert_eq!(api.applied(), vec!["IPAddressClaim metal/m1-eth0".to_string()]);
        assert!(api.server_claim(TEST_NAMESPACE, "m1").is_none());
    }

    #[tokio::test]
    async fn test_create_machine_missing_user_data() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 0));
        let driver = create_test_driver(&api);
        let mut request = create_valid_request("m1");
        request.secret = Some(create_test_secret(None));

        let err = driver.create_machine(&request, &CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, DriverError::MissingPayload { .. }));
        assert_eq!(api.applied_count("Secret"), 0);
        assert_eq!(api.applied_count("ServerClaim"), 0);
    }

    #[tokio::test]
    async fn test_create_machine_keeps_binary_user_data() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 0));
        let driver = create_test_driver(&api);
        let payload = vec![0x1f, 0x8b, 0x08, 0x00, 0xff, 0xfe, 0x41];
        let mut request = create_valid_request("m1");
        request.secret = Some(create_test_secret_bytes(&payload));

        driver.create_machine(&request, &CancellationToken::new()).await.unwrap();

        let document = rendered_document(&api, "m1");
        assert_eq!(
            ignition_bytes(&document, "/var/lib/metal-cloud-config/user-data").unwrap(),
            payload
        );
    }

    #[tokio::test]
    async fn test_create_machine_long_name_bounds_ignition_secret() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 0));
        let driver = create_test_driver(&api);
        let machine = "m".repeat(250);

        driver
            .create_machine(&create_valid_request(&machine), &CancellationToken::new())
            .await
            .unwrap();

        let secret_name = ignition_secret_name(&machine);
        assert_eq!(secret_name.len(), MAX_NAME_LENGTH);
        assert!(secret_name.starts_with(&machine));
        assert!(api.secret(TEST_NAMESPACE, &secret_name).is_some());
        let claim = api.server_claim(TEST_NAMESPACE, &machine).unwrap();
        assert_eq!(claim.spec.ignition_secret_ref.unwrap().name, secret_name);
    }

    #[tokio::test]
    async fn test_create_machine_render_failure() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 0));
        let driver = create_test_driver(&api);
        let mut spec = create_test_provider_spec();
        spec["ignition"] = json!("- not\n- a mapping\n");

        let err = driver
            .create_machine(&create_test_request("m1", PROVIDER_NAME, spec), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(&err, DriverError::Render { machine, .. } if machine == "m1"));
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(api.applied_count("Secret"), 0);
    }

    #[tokio::test]
    async fn test_create_machine_server_claim_failure_keeps_secret() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 0));
        api.fail_on(MockOperation::ApplyServerClaim, "quota exceeded");
        let driver = create_test_driver(&api);

        let err = driver
            .create_machine(&create_valid_request("m1"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(&err, DriverError::Apply(e) if e.target == "ServerClaim metal/m1"));
        assert!(err.to_string().contains("quota exceeded"));
        assert!(api.secret(TEST_NAMESPACE, "m1-ignition").is_some());
    }

    #[tokio::test]
    async fn test_create_machine_cancelled_while_waiting_for_address() {
        let api = MockMetalApi::new("mock");
        let provider = ClientProvider::with_client(
            "/nonexistent/kubeconfig",
            Arc::new(MockClientFactory::new()),
            Arc::new(api.clone()),
        );
        let poll = PollConfig {
            interval: Duration::from_millis(10),
            timeout: Duration::from_secs(30),
        };
        let driver = Driver::new(Arc::new(provider), TEST_NAMESPACE, poll);
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            driver.create_machine(&create_valid_request("m1"), &cancel),
        )
        .await
        .expect("cancellation did not stop the request")
        .unwrap_err();

        assert_eq!(err.code(), Code::Canceled);
        assert!(api.server_claim(TEST_NAMESPACE, "m1").is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_do_not_block_each_other() {
        let api = MockMetalApi::new("mock");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 3));
        let driver = Arc::new(create_test_driver(&api));

        let handles: Vec<_> = (0..20)
            .map(|i| {
                let driver = Arc::clone(&driver);
                tokio::spawn(async move {
                    driver
                        .create_machine(&create_valid_request(&format!("m{i}")), &CancellationToken::new())
                        .await
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            let response = handle.await.unwrap().unwrap();
            assert_eq!(response.provider_id, provider_id(TEST_NAMESPACE, &format!("m{i}")));
        }
        assert_eq!(api.applied_count("ServerClaim"), 20);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_requests_succeed_while_kubeconfig_rotates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kubeconfig");
        std::fs::write(&path, metal_kubeconfig("http://gen-0")).unwrap();
        let api = MockMetalApi::new("http://gen-0");
        api.set_pool_allocation("pool-a", allocation("10.0.0.5", 24, "10.0.0.1", 1));
        let shutdown = CancellationToken::new();
        let (provider, namespace, _watcher) =
            ClientProvider::new_with_namespace(&path, Arc::new(MockClientFactory::sharing(&api)), shutdown.clone())
                .await
                .unwrap();
        let driver = Arc::new(Driver::new(Arc::clone(&provider), namespace, fast_poll()));
        let seen = Arc::new(Mutex::new(HashSet::new()));

        let requests: Vec<_> = (0..100)
            .map(|i| {
                let driver = Arc::clone(&driver);
                let provider = Arc::clone(&provider);
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    seen.lock().unwrap().insert(provider.acquire().endpoint().to_string());
                    driver
                        .create_machine(&create_valid_request(&format!("m{i}")), &CancellationToken::new())
                        .await
                })
            })
            .collect();

        for generation in 1..=10 {
            let staging = dir.path().join("..kubeconfig.tmp");
            std::fs::write(&staging, metal_kubeconfig(&format!("http://gen-{generation}"))).unwrap();
            std::fs::rename(&staging, &path).unwrap();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        for (i, request) in requests.into_iter().enumerate() {
            let response = request.await.unwrap().unwrap();
            assert_eq!(response.provider_id, provider_id(TEST_NAMESPACE, &format!("m{i}")));
        }
        assert_eq!(api.applied_count("ServerClaim"), 100);
        assert_eq!(api.applied_count("Secret"), 100);
        for endpoint in seen.lock().unwrap().iter() {
            assert!(endpoint.starts_with("http://gen-"), "incomplete handle {endpoint:?}");
        }

        let settled = tokio::time::timeout(Duration::from_secs(5), async {
            while provider.acquire().endpoint() != "http://gen-10" {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await;
        assert!(settled.is_ok(), "provider ended on {}", provider.acquire().endpoint());
        shutdown.cancel();
    }
}
