//! ComfyUI HTTP client.
//!
//! Jobs are queued with `POST /prompt`. Events come from the server's
//! `/ws?clientId=` socket (step progress, completion, execution errors), with
//! `GET /history/{id}` supplying the outputs. When the socket is disabled or
//! cannot be opened, events are derived by polling `GET /history/{id}` and
//! `GET /queue`, emitting an event whenever the job's observed state changes.

use crate::config::TransportSettings;
use crate::error::TransportError;
use crate::transport::{EventStream, JobEvent, JobRequest, Submission, Transport};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// Consecutive failed polls tolerated before the event stream gives up.
const MAX_POLL_FAILURES: u32 = 3;

/// History lookups after the socket reports completion; the server records
/// history shortly after it announces the end of execution.
const HISTORY_ATTEMPTS: u32 = 10;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

pub struct ComfyClient {
    client: Client,
    base_url: String,
    client_id: String,
    poll_interval: Duration,
    connect_timeout: Duration,
    websocket: bool,
}

impl ComfyClient {
    pub fn new(base_url: impl Into<String>, settings: &TransportSettings) -> Result<Self, TransportError> {
        let client = Client::builder()
            .no_proxy()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| TransportError::Protocol(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client_id: uuid::Uuid::new_v4().to_string(),
            poll_interval: Duration::from_millis(settings.poll_interval_ms),
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            websocket: settings.websocket,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    async fn open_socket(&self) -> Result<Socket, TransportError> {
        let url = socket_url(&self.base_url, &self.client_id);
        let connect = tokio_tungstenite::connect_async(url.as_str());
        match tokio::time::timeout(self.connect_timeout, connect).await {
            Ok(Ok((socket, _response))) => Ok(socket),
            Ok(Err(e)) => Err(TransportError::Protocol(format!(
                "event socket {}: {}",
                url, e
            ))),
            Err(_) => Err(TransportError::Timeout(format!(
                "event socket {} did not open",
                url
            ))),
        }
    }
}

/// `http(s)://host` becomes `ws(s)://host/ws?clientId=<id>`.
fn socket_url(base_url: &str, client_id: &str) -> String {
    let origin = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        format!("ws://{}", base_url)
    };
    format!("{}/ws?clientId={}", origin, client_id)
}

#[derive(Deserialize)]
struct PromptResponse {
    prompt_id: Option<String>,
    number: Option<u64>,
    #[serde(default)]
    node_errors: Value,
}

fn map_http_error(base_url: &str, error: reqwest::Error) -> TransportError {
    if error.is_connect() {
        TransportError::Unreachable {
            url: base_url.to_string(),
            message: error.to_string(),
        }
    } else if error.is_timeout() {
        TransportError::Timeout(error.to_string())
    } else {
        TransportError::Protocol(format!("HTTP error: {}", error))
    }
}

/// Pull a readable message out of a ComfyUI error body.
fn rejection_message(body: &Value, fallback: &str) -> String {
    let mut message = match body.get("error") {
        Some(Value::Object(err)) => err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or(fallback)
            .to_string(),
        Some(Value::String(s)) => s.clone(),
        _ => fallback.to_string(),
    };
    if let Some(Value::Object(node_errors)) = body.get("node_errors") {
        if !node_errors.is_empty() {
            let nodes: Vec<&str> = node_errors.keys().map(String::as_str).collect();
            message.push_str(&format!(" (node errors on: {})", nodes.join(", ")));
        }
    }
    message
}

#[async_trait]
impl Transport for ComfyClient {
    async fn submit(&self, request: &JobRequest) -> Result<Submission, TransportError> {
        let url = format!("{}/prompt", self.base_url);
        let body = json!({
            "prompt": request.prompt,
            "client_id": self.client_id,
            "extra_data": { "extra_pnginfo": request.extra_pnginfo },
        });
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_http_error(&self.base_url, e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| map_http_error(&self.base_url, e))?;
        let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&parsed, &text),
            });
        }

        let ack: PromptResponse = serde_json::from_value(parsed.clone())
            .map_err(|e| TransportError::Protocol(format!("Failed to parse /prompt response: {}", e)))?;
        if matches!(&ack.node_errors, Value::Object(errs) if !errs.is_empty()) {
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                message: rejection_message(&parsed, "workflow has node errors"),
            });
        }
        let job_id = ack.prompt_id.filter(|id| !id.is_empty()).ok_or_else(|| {
            TransportError::Protocol("Server did not return a prompt_id".to_string())
        })?;
        debug!(job_id = %job_id, queue_number = ?ack.number, "Job accepted");
        Ok(Submission {
            job_id,
            queue_number: ack.number,
        })
    }

    async fn events(&self, job_id: &str) -> Result<EventStream, TransportError> {
        if self.websocket {
            match self.open_socket().await {
                Ok(socket) => {
                    debug!(job_id, "Following event socket");
                    let state = SocketState {
                        socket,
                        client: self.client.clone(),
                        base_url: self.base_url.clone(),
                        job_id: job_id.to_string(),
                        interval: self.poll_interval,
                        checked_history: false,
                        done: false,
                    };
                    return Ok(Box::pin(futures::stream::unfold(state, socket_next)));
                }
                Err(err) => warn!(job_id, error = %err, "Event socket unavailable; polling instead"),
            }
        }

        let state = PollState {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            job_id: job_id.to_string(),
            interval: self.poll_interval,
            first: true,
            last: None,
            done: false,
        };
        Ok(Box::pin(futures::stream::unfold(state, poll_next)))
    }

    fn endpoint(&self) -> &str {
        &self.base_url
    }
}

struct SocketState {
    socket: Socket,
    client: Client,
    base_url: String,
    job_id: String,
    interval: Duration,
    checked_history: bool,
    done: bool,
}

/// What one socket message means for the watched job.
#[derive(Debug, PartialEq)]
enum SocketUpdate {
    Progress { value: u64, max: u64 },
    Finished,
    Failed(String),
    Ignore,
}

fn socket_update(text: &str, job_id: &str) -> SocketUpdate {
    let Ok(message) = serde_json::from_str::<Value>(text) else {
        return SocketUpdate::Ignore;
    };
    let data = message.get("data").cloned().unwrap_or(Value::Null);
    let prompt_id = data.get("prompt_id").and_then(Value::as_str);
    // Older servers omit prompt_id on progress messages.
    let ours = prompt_id == Some(job_id);

    match message.get("type").and_then(Value::as_str) {
        Some("progress") if ours || prompt_id.is_none() => SocketUpdate::Progress {
            value: data.get("value").and_then(Value::as_u64).unwrap_or(0),
            max: data.get("max").and_then(Value::as_u64).unwrap_or(0),
        },
        Some("executing") if ours && data.get("node").map_or(false, Value::is_null) => {
            SocketUpdate::Finished
        }
        Some("execution_success") if ours => SocketUpdate::Finished,
        Some("execution_error") if ours => SocketUpdate::Failed(
            error_text(&data).unwrap_or_else(|| "execution error".to_string()),
        ),
        Some("execution_interrupted") if ours => {
            SocketUpdate::Failed("execution interrupted".to_string())
        }
        _ => SocketUpdate::Ignore,
    }
}

/// Read the socket until the job progresses or finishes.
async fn socket_next(
    mut state: SocketState,
) -> Option<(Result<JobEvent, TransportError>, SocketState)> {
    use futures::StreamExt;

    if state.done {
        return None;
    }

    // The job may have finished before the socket opened.
    if !state.checked_history {
        state.checked_history = true;
        match fetch_history(&state.client, &state.base_url, &state.job_id).await {
            Ok(Some(entry)) => {
                if let Some(event) = history_event(&entry) {
                    state.done = true;
                    return Some((Ok(event), state));
                }
            }
            Ok(None) => {}
            Err(err) => warn!(job_id = %state.job_id, error = %err, "History check failed"),
        }
    }

    loop {
        let text = match state.socket.next().await {
            Some(Ok(Message::Text(text))) => text,
            // Binary preview frames and control frames carry no job state.
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                state.done = true;
                return Some((
                    Err(TransportError::Protocol(format!("event socket error: {}", e))),
                    state,
                ));
            }
            None => {
                state.done = true;
                return Some((
                    Err(TransportError::Protocol(
                        "event socket closed before the job finished".to_string(),
                    )),
                    state,
                ));
            }
        };

        match socket_update(&text, &state.job_id) {
            SocketUpdate::Progress { value, max } => {
                return Some((Ok(JobEvent::Running { value, max }), state))
            }
            SocketUpdate::Failed(message) => {
                state.done = true;
                return Some((Ok(JobEvent::Failed { message }), state));
            }
            SocketUpdate::Finished => {
                state.done = true;
                let event =
                    finished_event(&state.client, &state.base_url, &state.job_id, state.interval)
                        .await;
                return Some((event, state));
            }
            SocketUpdate::Ignore => continue,
        }
    }
}

/// Terminal event once the socket reports the end of execution.
async fn finished_event(
    client: &Client,
    base_url: &str,
    job_id: &str,
    interval: Duration,
) -> Result<JobEvent, TransportError> {
    for attempt in 0..HISTORY_ATTEMPTS {
        if attempt > 0 {
            tokio::time::sleep(interval).await;
        }
        if let Some(entry) = fetch_history(client, base_url, job_id).await? {
            return Ok(history_event(&entry).unwrap_or_else(|| JobEvent::Completed {
                outputs: output_paths(&entry),
            }));
        }
    }
    debug!(job_id, "No history recorded for finished job");
    Ok(JobEvent::Completed {
        outputs: Vec::new(),
    })
}

struct PollState {
    client: Client,
    base_url: String,
    job_id: String,
    interval: Duration,
    first: bool,
    last: Option<JobEvent>,
    done: bool,
}

/// Poll until the observed state changes, then yield it.
async fn poll_next(mut state: PollState) -> Option<(Result<JobEvent, TransportError>, PollState)> {
    if state.done {
        return None;
    }
    let mut failures = 0u32;
    loop {
        if !state.first {
            tokio::time::sleep(state.interval).await;
        }
        state.first = false;

        match observe(&state.client, &state.base_url, &state.job_id).await {
            Ok(Some(event)) => {
                failures = 0;
                if state.last.as_ref() == Some(&event) {
                    continue;
                }
                state.done = event.is_terminal();
                state.last = Some(event.clone());
                return Some((Ok(event), state));
            }
            Ok(None) => failures = 0,
            Err(err) => {
                failures += 1;
                if failures >= MAX_POLL_FAILURES {
                    state.done = true;
                    return Some((Err(err), state));
                }
                warn!(job_id = %state.job_id, error = %err, "Event poll failed; retrying");
            }
        }
    }
}

/// Current state of a job, or `None` when the server does not know about it yet.
async fn observe(client: &Client, base_url: &str, job_id: &str) -> Result<Option<JobEvent>, TransportError> {
    if let Some(entry) = fetch_history(client, base_url, job_id).await? {
        if let Some(event) = history_event(&entry) {
            return Ok(Some(event));
        }
    }

    let url = format!("{}/queue", base_url);
    let queue: Value = client
        .get(&url)
        .send()
        .await
        .map_err(|e| map_http_error(base_url, e))?
        .json()
        .await
        .map_err(|e| TransportError::Protocol(format!("Failed to parse /queue response: {}", e)))?;

    if queue_contains(&queue, "queue_running", job_id) {
        Ok(Some(JobEvent::Running { value: 0, max: 0 }))
    } else if queue_contains(&queue, "queue_pending", job_id) {
        Ok(Some(JobEvent::Queued))
    } else {
        Ok(None)
    }
}

async fn fetch_history(client: &Client, base_url: &str, job_id: &str) -> Result<Option<Value>, TransportError> {
    let url = format!("{}/history/{}", base_url, job_id);
    let response = client
        .get(&url)
        .send()
        .await
        .map_err(|e| map_http_error(base_url, e))?;
    if response.status().as_u16() == 404 {
        return Ok(None);
    }
    if !response.status().is_success() {
        return Err(TransportError::Protocol(format!(
            "GET /history returned status {}",
            response.status()
        )));
    }
    let mut history: Value = response
        .json()
        .await
        .map_err(|e| TransportError::Protocol(format!("Failed to parse /history response: {}", e)))?;
    Ok(history.get_mut(job_id).map(Value::take))
}

/// Queue entries are `[number, prompt_id, prompt, extra_data, outputs]` arrays.
fn queue_contains(queue: &Value, key: &str, job_id: &str) -> bool {
    queue
        .get(key)
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .any(|entry| entry.get(1).and_then(Value::as_str) == Some(job_id))
        })
        .unwrap_or(false)
}

/// Terminal event for a history entry, or `None` if it is not finished.
fn history_event(entry: &Value) -> Option<JobEvent> {
    let status = entry.get("status");
    let status_str = status
        .and_then(|s| s.get("status_str"))
        .and_then(Value::as_str);
    if status_str == Some("error") {
        return Some(JobEvent::Failed {
            message: execution_error(status).unwrap_or_else(|| "execution error".to_string()),
        });
    }
    let completed = status
        .and_then(|s| s.get("completed"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let outputs = output_paths(entry);
    if completed || status_str == Some("success") || (status.is_none() && !outputs.is_empty()) {
        return Some(JobEvent::Completed { outputs });
    }
    None
}

fn execution_error(status: Option<&Value>) -> Option<String> {
    status?
        .get("messages")?
        .as_array()?
        .iter()
        .filter_map(|msg| {
            let pair = msg.as_array()?;
            if pair.first()?.as_str()? != "execution_error" {
                return None;
            }
            error_text(pair.get(1)?)
        })
        .last()
}

/// `node_type: exception_message` from an execution_error payload.
fn error_text(data: &Value) -> Option<String> {
    let text = data.get("exception_message").and_then(Value::as_str)?;
    match data.get("node_type").and_then(Value::as_str) {
        Some(node) => Some(format!("{}: {}", node, text.trim())),
        None => Some(text.trim().to_string()),
    }
}

/// `subfolder/filename` for every image the job recorded, in output order.
pub fn output_paths(entry: &Value) -> Vec<String> {
    let Some(outputs) = entry.get("outputs").and_then(Value::as_object) else {
        return Vec::new();
    };
    outputs
        .values()
        .filter_map(|node_output| node_output.get("images").and_then(Value::as_array))
        .flatten()
        .filter_map(|image| {
            let filename = image.get("filename").and_then(Value::as_str)?;
            match image.get("subfolder").and_then(Value::as_str) {
                Some(sub) if !sub.is_empty() => {
                    Some(Path::new(sub).join(filename).to_string_lossy().into_owned())
                }
                _ => Some(filename.to_string()),
            }
        })
        .collect()
}
