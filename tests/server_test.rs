//! Integration tests for the inference HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use failure_horizon::model::{FailureClassifier, LogisticRegression, RiskTier, TrainOptions};
    use failure_horizon::server::{run, ServerConfig};
    use failure_horizon::source::{self, GeneratorConfig};
    use failure_horizon::{pipeline, FeatureSchema, PipelineConfig};
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;

    /// Classifier returning a constant probability.
    struct Constant {
        names: Vec<String>,
        p: f64,
    }

    impl FailureClassifier for Constant {
        fn feature_names(&self) -> &[String] {
            &self.names
        }

        fn predict_proba(&self, _features: &[f64]) -> f64 {
            self.p
        }
    }

    fn constant(p: f64) -> Arc<dyn FailureClassifier> {
        Arc::new(Constant {
            names: FeatureSchema::from_config(&PipelineConfig::default())
                .names()
                .to_vec(),
            p,
        })
    }

    fn full_request(model: &dyn FailureClassifier) -> serde_json::Value {
        let features: HashMap<String, f64> = model
            .feature_names()
            .iter()
            .map(|name| (name.clone(), 1.0))
            .collect();
        serde_json::json!({ "features": features })
    }

    async fn start(model: Arc<dyn FailureClassifier>) -> (SocketAddr, tokio::sync::oneshot::Sender<()>) {
        let (addr, shutdown_tx) = run(ServerConfig::new(0, model))
            .await
            .expect("Failed to start server");

        // Give server time to start
        tokio::time::sleep(Duration::from_millis(100)).await;
        (addr, shutdown_tx)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = start(constant(0.5)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_root_reports_feature_count() {
        let (addr, shutdown_tx) = start(constant(0.5)).await;

        let body: serde_json::Value = reqwest::get(format!("http://{}/", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        assert_eq!(body["model_features_count"], 46);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_sample_payload_lists_model_features() {
        let model = constant(0.5);
        let expected: Vec<String> = model.feature_names()[..10].to_vec();
        let (addr, shutdown_tx) = start(model).await;

        let body: serde_json::Value = reqwest::get(format!("http://{}/sample_payload", addr))
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");

        let example = body["features_example"].as_object().unwrap();
        assert_eq!(example.len(), 10);
        for name in &expected {
            assert_eq!(example[name], 0.0);
        }

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_predict_full_request() {
        let model = constant(0.4567);
        let payload = full_request(model.as_ref());
        let (addr, shutdown_tx) = start(model).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/predict_24h", addr))
            .json(&payload)
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["failure_probability_24h"], 0.457);
        assert_eq!(body["recommendation"], RiskTier::Moderate.recommendation());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_predict_missing_feature_is_rejected() {
        let model = constant(0.9);
        let mut payload = full_request(model.as_ref());
        let removed = "vibration_ms2_mean_24h";
        payload["features"]
            .as_object_mut()
            .unwrap()
            .remove(removed)
            .expect("feature present in schema");
        payload["features"]["unused_extra"] = serde_json::json!(3.0);
        let (addr, shutdown_tx) = start(model).await;

        let response = reqwest::Client::new()
            .post(format!("http://{}/predict_24h", addr))
            .json(&payload)
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "MISSING_FEATURES");
        assert_eq!(body["missing"], serde_json::json!([removed]));

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_predict_malformed_body_is_rejected() {
        let model = constant(0.5);
        let mut null_value = full_request(model.as_ref());
        null_value["features"]["temp_c_mean_6h"] = serde_json::Value::Null;
        let (addr, shutdown_tx) = start(model).await;

        let client = reqwest::Client::new();
        let payloads = [null_value, serde_json::json!({ "values": {} })];
        for payload in &payloads {
            let response = client
                .post(format!("http://{}/predict_24h", addr))
                .json(payload)
                .send()
                .await
                .expect("Failed to send request");

            assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
            let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
            assert_eq!(body["code"], "MALFORMED_REQUEST");
            assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
        }

        let response = client
            .post(format!("http://{}/predict_24h", addr))
            .header("Content-Type", "application/json")
            .body("{\"features\": ")
            .send()
            .await
            .expect("Failed to send request");

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "MALFORMED_REQUEST");

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_fitted_model_end_to_end() {
        let series = source::generate(&GeneratorConfig {
            machines: 3,
            days: 40,
            ..GeneratorConfig::default()
        })
        .expect("Failed to generate series");
        let output = pipeline::run(&series, &PipelineConfig::default()).expect("Pipeline failed");
        let model = LogisticRegression::fit(
            &output.schema,
            &output.sampled.records,
            &TrainOptions {
                epochs: 50,
                ..TrainOptions::default()
            },
        )
        .expect("Failed to fit model");

        let mut features = serde_json::Map::new();
        let row = &output.records[output.records.len() / 2];
        for (name, value) in output.schema.names().iter().zip(&row.features) {
            features.insert(name.clone(), serde_json::json!(value));
        }
        let payload = serde_json::json!({ "features": features });

        let (addr, shutdown_tx) = start(Arc::new(model)).await;
        let response = reqwest::Client::new()
            .post(format!("http://{}/predict_24h", addr))
            .json(&payload)
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        let p = body["failure_probability_24h"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&p));
        let tiers = [RiskTier::Low, RiskTier::Moderate, RiskTier::High];
        assert!(tiers
            .iter()
            .any(|t| body["recommendation"] == t.recommendation()));

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = start(constant(0.5)).await;

        // Send OPTIONS request to check CORS
        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/predict_24h", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "POST")
            .send()
            .await
            .expect("Failed to send request");

        // CORS preflight should succeed
        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
