use rust_benor_sim::network::{start_server, HttpTransport};
use rust_benor_sim::node::{NodeConfig, NodeProcess, ReadinessGate};
use rust_benor_sim::{logger, NodeState, Value};
use std::env;
use std::error::Error;
use std::str::FromStr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

fn flag_value<T: FromStr>(args: &[String], name: &str) -> Option<T> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .and_then(|v| v.parse().ok())
}

fn parse_index_list(args: &[String], name: &str) -> Vec<usize> {
    args.iter()
        .position(|a| a == name)
        .and_then(|i| args.get(i + 1))
        .map(|v| v.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default()
}

fn parse_initial_values(args: &[String], total_nodes: usize) -> Vec<Value> {
    let bits: Vec<u8> = args
        .iter()
        .position(|a| a == "--values")
        .and_then(|i| args.get(i + 1))
        .map(|v| v.split(',').filter_map(|s| s.trim().parse().ok()).collect())
        .unwrap_or_default();
    (0..total_nodes)
        .map(|i| match bits.get(i) {
            Some(1) => Value::One,
            Some(_) => Value::Zero,
            None => Value::One,
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logger::init_logger();

    let args: Vec<String> = env::args().collect();
    let total_nodes: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(4);
    let faulty_bound: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(1);
    let base_port: u16 = flag_value(&args, "--base-port").unwrap_or(3000);
    let faulty_ids = parse_index_list(&args, "--faulty");
    let initial_values = parse_initial_values(&args, total_nodes);
    let coin_seed: Option<u64> = flag_value(&args, "--seed");
    let max_round: Option<u64> = flag_value(&args, "--max-round");

    info!(
        total_nodes,
        faulty_bound,
        base_port,
        faulty = ?faulty_ids,
        "launching consensus run"
    );
    if total_nodes < 3 * faulty_bound + 1 {
        warn!(
            total_nodes,
            faulty_bound, "N < 3F+1: safety is not guaranteed for this run"
        );
    }

    let gate = ReadinessGate::new(total_nodes);
    let transport = Arc::new(HttpTransport::new(base_port, total_nodes));

    for node_id in 0..total_nodes {
        let config = NodeConfig {
            node_id,
            total_nodes,
            faulty_bound,
            initial_value: initial_values[node_id],
            faulty: faulty_ids.contains(&node_id),
            base_port,
            max_round,
            coin_seed,
        };
        let node = Arc::new(NodeProcess::new(config, transport.clone(), gate.clone()));
        let gate = gate.clone();
        thread::spawn(move || {
            actix_rt::System::new().block_on(async {
                if let Err(e) = start_server(node, gate).await {
                    warn!(node = node_id, error = %e, "node server exited");
                }
            });
        });
    }

    gate.wait_all_ready().await;
    info!("all nodes listening, starting consensus");

    let client = reqwest::Client::new();
    let mut starts = Vec::new();
    for node_id in 0..total_nodes {
        let client = client.clone();
        let url = format!("http://127.0.0.1:{}/start", base_port + node_id as u16);
        starts.push(tokio::spawn(async move {
            if let Err(e) = client.get(&url).send().await {
                warn!(node = node_id, error = %e, "start request failed");
            }
        }));
    }
    for handle in starts {
        let _ = handle.await;
    }

    let correct: Vec<usize> = (0..total_nodes)
        .filter(|id| !faulty_ids.contains(id))
        .collect();

    // Poll until every correct node reports a decision, with a budget so a
    // stalled round (lost messages, round ceiling) still terminates the run.
    let mut decided = false;
    for _ in 0..200 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let mut states = Vec::new();
        for &node_id in &correct {
            let url = format!("http://127.0.0.1:{}/getState", base_port + node_id as u16);
            match client.get(&url).send().await {
                Ok(resp) => match resp.json::<NodeState>().await {
                    Ok(state) => states.push((node_id, state)),
                    Err(e) => warn!(node = node_id, error = %e, "bad getState body"),
                },
                Err(e) => warn!(node = node_id, error = %e, "getState failed"),
            }
        }
        if states.len() == correct.len() && states.iter().all(|(_, s)| s.decided == Some(true)) {
            for (node_id, state) in &states {
                info!(
                    node = *node_id,
                    value = %state.x.map(|v| v.to_string()).unwrap_or_else(|| "unset".into()),
                    round = state.k,
                    "node decided"
                );
            }
            decided = true;
            break;
        }
    }

    if decided {
        info!("all correct nodes decided");
    } else {
        warn!("run ended without a full decision (stalled round or budget hit)");
    }

    // Stop every node so the listeners wind down cleanly.
    for node_id in 0..total_nodes {
        let url = format!("http://127.0.0.1:{}/stop", base_port + node_id as u16);
        let _ = client.get(&url).send().await;
    }

    Ok(())
}
