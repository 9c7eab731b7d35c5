//! End-to-end tests over a real WebSocket connection

mod common;

use common::{login_result, MockWsServer};
use modelwire_client::{SessionBuilder, SessionState};
use modelwire_core::{Credentials, ErrorKind, ErrorPayload, Operation, ProtocolGeneration, ResponseFrame};
use serde_json::{json, Value};
use std::time::Duration;

async fn controller() -> MockWsServer {
    MockWsServer::with_handler(|request| match (request.facade.as_str(), request.method.as_str()) {
        ("Admin", "Login") => Some(ResponseFrame::success(
            request.request_id,
            login_result(ProtocolGeneration::V2),
        )),
        ("Application", "Get") => Some(ResponseFrame::success(
            request.request_id,
            json!({"application": request.params["application"], "charm": "mysql"}),
        )),
        ("Application", "Destroy") => Some(ResponseFrame::error(
            request.request_id,
            ErrorPayload::new("application \"ghost\" not found", "not found"),
        )),
        // Anything else is left unanswered
        _ => None,
    })
    .await
}

#[tokio::test]
async fn test_login_and_call_over_websocket() {
    let mut server = controller().await;

    let session = SessionBuilder::new(server.address())
        .insecure()
        .connect()
        .await
        .unwrap();
    assert_eq!(session.state().await, SessionState::Unauthenticated);

    let info = session
        .login(Credentials::new("admin", "secret"))
        .await
        .unwrap();
    assert_eq!(info.model_uuid.as_deref(), Some("deadbeef"));

    let login = server.wait_for_request().await.unwrap();
    assert_eq!(login.version, Some(3));

    let app: Value = session
        .call(Operation::ApplicationGet, json!({"application": "mysql"}))
        .await
        .unwrap();
    assert_eq!(app["application"], "mysql");

    let error = session
        .call::<_, Value>(Operation::DestroyApplication, json!({"application": "ghost"}))
        .await
        .unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Permanent);
    assert_eq!(error.code(), "not found");

    session.close().await;
    assert_eq!(session.state().await, SessionState::Closed);
    server.shutdown().await;
}

#[tokio::test]
async fn test_unanswered_call_is_bounded_by_caller_timeout() {
    let server = controller().await;

    let session = SessionBuilder::new(server.address())
        .insecure()
        .connect()
        .await
        .unwrap();
    session.login(Credentials::new("admin", "secret")).await.unwrap();

    let result = tokio::time::timeout(
        Duration::from_millis(200),
        session.call::<_, Value>(Operation::ModelInfo, json!({})),
    )
    .await;
    assert!(result.is_err());

    // The abandoned call keeps its slot until the connection closes
    assert_eq!(session.pending_calls().await, 1);
    session.close().await;
    assert_eq!(session.pending_calls().await, 0);
    server.shutdown().await;
}
