//! `wifiman serve`: JSON-line request loop.
//!
//! One request object per stdin line, one response object per stdout
//! line. Requests run concurrently so `cancelConnect` can reach a
//! connect that is still in flight; an optional `"id"` member is echoed
//! back so callers can pair responses. With `--events`, service events
//! are interleaved as `{"event": ...}` lines.

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use wifiman_core::{Request, Response, Service};

use crate::error::CliError;

const OUTBOX_CAPACITY: usize = 64;

/// Parse, run and encode one request line. Blank lines yield nothing.
pub async fn answer(service: &Service, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (id, response) = match serde_json::from_str::<Value>(line) {
        Ok(Value::Object(mut obj)) => {
            let id = obj.remove("id");
            let response = match serde_json::from_value::<Request>(Value::Object(obj)) {
                Ok(request) => service.execute(request).await,
                Err(e) => Response::malformed(format!("unrecognized request: {e}")),
            };
            (id, response)
        }
        Ok(_) => (None, Response::malformed("request must be a JSON object")),
        Err(e) => (None, Response::malformed(format!("invalid JSON: {e}"))),
    };

    let mut encoded = serde_json::to_value(&response).ok()?;
    if let (Some(id), Value::Object(map)) = (id, &mut encoded) {
        map.insert("id".into(), id);
    }
    Some(encoded.to_string())
}

pub async fn run(service: Service, events: bool) -> Result<(), CliError> {
    let (tx, mut rx) = mpsc::channel::<String>(OUTBOX_CAPACITY);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let forwarder = events.then(|| {
        let mut events = service.events();
        let tx = tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Ok(line) = serde_json::to_string(&event) else {
                            continue;
                        };
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "event consumer lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    });

    info!("serving JSON-line requests on stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut requests = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let service = service.clone();
                let tx = tx.clone();
                requests.spawn(async move {
                    if let Some(reply) = answer(&service, &line).await {
                        let _ = tx.send(reply).await;
                    }
                });
            }
        }
    }

    while requests.join_next().await.is_some() {}
    service.shutdown().await;
    if let Some(handle) = forwarder {
        handle.abort();
    }
    drop(tx);
    let _ = writer.await;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use wifiman_core::{CredentialStore, ManagerConfig, SimulatedNetwork, SimulatedRadio};

    use super::*;

    async fn service() -> Service {
        let config = ManagerConfig::oneshot();
        let radio = Arc::new(SimulatedRadio::new(vec![
            SimulatedNetwork::open("Cafe", -40),
            SimulatedNetwork::secured("Office", -30, "pw1"),
        ]));
        let credentials = Arc::new(CredentialStore::in_memory(&config).await.unwrap());
        let service = Service::simulated(config, radio, credentials);
        service.start().await;
        service
    }

    fn parse(reply: Option<String>) -> Value {
        serde_json::from_str(&reply.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn echoes_request_id() {
        let service = service().await;
        let reply = parse(answer(&service, r#"{"id":7,"command":"listNetworks"}"#).await);
        assert_eq!(reply["id"], 7);
        assert_eq!(reply["ok"], true);
        assert_eq!(reply["data"][0]["ssid"], "Office");
    }

    #[tokio::test]
    async fn malformed_lines_get_invalid_request() {
        let service = service().await;
        let reply = parse(answer(&service, "not json").await);
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "INVALID_REQUEST");

        let reply = parse(answer(&service, r#"{"command":"selfDestruct","id":"a"}"#).await);
        assert_eq!(reply["error"]["code"], "INVALID_REQUEST");
        assert_eq!(reply["id"], "a");
    }

    #[tokio::test]
    async fn blank_lines_are_ignored() {
        let service = service().await;
        assert!(answer(&service, "   ").await.is_none());
    }

    #[tokio::test]
    async fn password_required_is_reported_by_code() {
        let service = service().await;
        let reply = parse(
            answer(&service, r#"{"command":"connect","params":{"ssid":"Office"}}"#).await,
        );
        assert_eq!(reply["error"]["code"], "PASSWORD_REQUIRED");
    }
}
