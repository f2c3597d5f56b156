use super::*;

fn stats_request() -> Request<Body> {
    Request::builder()
        .uri("/queue/stats")
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_queue_stats_on_idle_dispatcher() {
    let (app, _dispatcher, _log_path, _temp_dir) = test_app(Arc::new(ScriptedClient::new()));

    let response = app.oneshot(stats_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats = json_body(response).await;
    assert_eq!(stats["max_concurrent"], 3);
    assert_eq!(stats["active"], 0);
    assert_eq!(stats["pending"], 0);
    assert_eq!(stats["submitted"], 0);
    assert_eq!(stats["accepting_new"], true);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_queue_stats_reflects_backlog() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let client = Arc::new(ScriptedClient::new().with_gate(gate.clone()));
    let (app, dispatcher, _log_path, _temp_dir) = test_app(client);

    let residents: Vec<Value> = (0..5).map(|i| draft_json(&format!("r-{i}"))).collect();
    let response = app
        .clone()
        .oneshot(generate_request(
            &json!({ "residents": residents }),
            Some("Bearer tok"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    wait_for_stats(&dispatcher, |s| s.active == 3).await;

    let stats = json_body(app.oneshot(stats_request()).await.unwrap()).await;
    assert_eq!(stats["active"], 3);
    assert_eq!(stats["pending"], 2);
    assert_eq!(stats["submitted"], 5);

    gate.add_permits(5);
    dispatcher.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_queue_stats_after_dispatcher_stopped() {
    let (app, dispatcher, _log_path, _temp_dir) = test_app(Arc::new(ScriptedClient::new()));
    dispatcher.shutdown().await.unwrap();

    let response = app.oneshot(stats_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        json_body(response).await["error"]["code"],
        "dispatcher_unavailable"
    );
}
