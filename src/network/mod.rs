//! Per-node HTTP surface
//!
//! Each node is addressable at `127.0.0.1:{base_port + index}` and exposes
//! the request/response API: `/status`, `/message`, `/start`, `/stop`,
//! `/getState`. Response bodies follow the reference wire format (plain
//! text acknowledgments, JSON state with `null` for unset fields).

pub mod transport;

pub use transport::{HttpTransport, Transport};

use crate::consensus::ConsensusMessage;
use crate::node::{NodeProcess, ReadinessGate};
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde_json::json;
use std::sync::Arc;
use tracing::info;

async fn status(node: web::Data<Arc<NodeProcess>>) -> impl Responder {
    if node.is_healthy() {
        HttpResponse::Ok().body("live")
    } else {
        HttpResponse::InternalServerError().body("faulty")
    }
}

/// Receipt is always acknowledged for well-formed input, even when the node
/// is faulty or killed and discards the message internally.
async fn receive_message(
    node: web::Data<Arc<NodeProcess>>,
    msg: web::Json<ConsensusMessage>,
) -> impl Responder {
    match node.handle_message(&msg).await {
        Ok(()) => HttpResponse::Ok().body("Message received and processed."),
        Err(e) => HttpResponse::BadRequest().json(json!({ "error": e.to_string() })),
    }
}

async fn start(node: web::Data<Arc<NodeProcess>>) -> impl Responder {
    node.start().await;
    HttpResponse::Ok().body("Consensus algorithm started.")
}

async fn stop(node: web::Data<Arc<NodeProcess>>) -> impl Responder {
    node.stop();
    HttpResponse::Ok().body("killed")
}

async fn get_state(node: web::Data<Arc<NodeProcess>>) -> impl Responder {
    HttpResponse::Ok().json(node.state())
}

/// Route table, shared between the real server and tests.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/status", web::get().to(status))
        .route("/message", web::post().to(receive_message))
        .route("/start", web::get().to(start))
        .route("/stop", web::get().to(stop))
        .route("/getState", web::get().to(get_state));
}

/// Bind the node's listener and register with the readiness gate once the
/// socket is up. Runs until the server is shut down.
pub async fn start_server(node: Arc<NodeProcess>, gate: ReadinessGate) -> std::io::Result<()> {
    let node_id = node.config().node_id;
    let port = node.config().port();
    let data = web::Data::new(node);

    let server = HttpServer::new(move || App::new().app_data(data.clone()).configure(routes))
        .workers(1)
        .bind(("127.0.0.1", port))?;

    info!(node = node_id, port, "node listening");
    gate.mark_ready(node_id);

    server.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{NodeState, Value};
    use crate::node::NodeConfig;
    use actix_web::test;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _target: usize, _message: &ConsensusMessage) {}
        async fn broadcast(&self, _message: &ConsensusMessage) {}
    }

    fn test_node(faulty: bool) -> Arc<NodeProcess> {
        let gate = ReadinessGate::new(4);
        for i in 0..4 {
            gate.mark_ready(i);
        }
        Arc::new(NodeProcess::new(
            NodeConfig {
                node_id: 0,
                total_nodes: 4,
                faulty_bound: 1,
                initial_value: Value::Zero,
                faulty,
                base_port: 9300,
                max_round: None,
                coin_seed: Some(1),
            },
            Arc::new(NullTransport),
            gate,
        ))
    }

    #[actix_web::test]
    async fn status_reflects_fault_model() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_node(false)))
                .configure(routes),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/status").to_request()).await;
        assert!(resp.status().is_success());

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_node(true)))
                .configure(routes),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/status").to_request()).await;
        assert_eq!(resp.status().as_u16(), 500);
    }

    #[actix_web::test]
    async fn message_is_acknowledged_even_when_discarded() {
        let node = test_node(true);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(node.clone()))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/message")
            .set_json(json!({ "k": 1, "x": 1, "messageType": "propose" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        // Discarded: the faulty node's state never moves.
        assert_eq!(node.state().k, None);
    }

    #[actix_web::test]
    async fn malformed_message_is_rejected() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_node(false)))
                .configure(routes),
        )
        .await;

        // Out-of-domain value.
        let req = test::TestRequest::post()
            .uri("/message")
            .set_json(json!({ "k": 1, "x": 7, "messageType": "propose" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);

        // Zero round.
        let req = test::TestRequest::post()
            .uri("/message")
            .set_json(json!({ "k": 0, "x": 1, "messageType": "vote" }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status().as_u16(), 400);
    }

    #[actix_web::test]
    async fn get_state_serializes_unset_fields_as_null() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_node(true)))
                .configure(routes),
        )
        .await;
        let req = test::TestRequest::get().uri("/getState").to_request();
        let state: NodeState = test::call_and_read_body_json(&app, req).await;
        assert_eq!(state, NodeState::unset());

        let raw = serde_json::to_value(state).unwrap();
        assert_eq!(raw, json!({ "killed": false, "x": null, "decided": null, "k": null }));
    }

    #[actix_web::test]
    async fn stop_then_get_state_reports_killed() {
        let node = test_node(false);
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(node))
                .configure(routes),
        )
        .await;

        let resp =
            test::call_service(&app, test::TestRequest::get().uri("/stop").to_request()).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get().uri("/getState").to_request();
        let state: NodeState = test::call_and_read_body_json(&app, req).await;
        assert!(state.killed);
    }
}
