//! Browser-level connection: endpoint discovery, the WebSocket reader and
//! matching of command replies.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, trace, warn};

use crate::error::CdpError;
use crate::protocol::{BrowserVersion, CdpRequest, CdpResponse, PageInfo};
use crate::session::PageSession;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type SocketSink = SplitSink<Socket, Message>;
type SocketSource = SplitStream<Socket>;

/// One-shot reply slot of an in-flight command.
type Responder = oneshot::Sender<Result<Value, CdpError>>;
pub(crate) type PendingMap = Arc<Mutex<HashMap<u64, Responder>>>;
/// Event channels keyed by session id.
pub(crate) type SessionRoutes = Arc<RwLock<HashMap<String, mpsc::UnboundedSender<CdpResponse>>>>;

/// How long a single command may wait for its reply.
pub(crate) const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Write half of the browser socket, shared by the client and its sessions.
#[derive(Clone)]
pub(crate) struct Transport {
    sink: Arc<tokio::sync::Mutex<SocketSink>>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
}

impl Transport {
    fn new(sink: SocketSink, pending: PendingMap) -> Self {
        Self {
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            pending,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Send `method` and wait for the matching reply.
    pub(crate) async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        session_id: Option<&str>,
    ) -> Result<Value, CdpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = serde_json::to_string(&CdpRequest {
            id,
            method: method.to_string(),
            params,
            session_id: session_id.map(str::to_string),
        })?;

        let reply = self.register(id);
        if let Err(e) = self.write(frame).await {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(CALL_TIMEOUT, reply).await {
            Ok(Ok(outcome)) => outcome,
            // The reader dropped every responder: the socket is gone.
            Ok(Err(_)) => Err(CdpError::SessionClosed),
            Err(_) => {
                self.pending.lock().remove(&id);
                Err(CdpError::Timeout(format!(
                    "{} got no reply within {}s",
                    method,
                    CALL_TIMEOUT.as_secs()
                )))
            }
        }
    }

    fn register(&self, id: u64) -> oneshot::Receiver<Result<Value, CdpError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        rx
    }

    async fn write(&self, frame: String) -> Result<(), CdpError> {
        trace!(">> {}", frame);
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(frame.into())).await?;
        Ok(())
    }
}

/// Connection to a Chrome started with `--remote-debugging-port`.
pub struct CdpClient {
    http_endpoint: String,
    browser_ws_url: String,
    transport: Transport,
    routes: SessionRoutes,
    reader: JoinHandle<()>,
}

impl CdpClient {
    /// Discover the browser socket behind `endpoint` and connect to it.
    ///
    /// ```rust,ignore
    /// let client = CdpClient::connect("http://localhost:9222").await?;
    /// ```
    pub async fn connect(endpoint: &str) -> Result<Self, CdpError> {
        let base = url::Url::parse(endpoint)?;
        let http_endpoint = base.as_str().trim_end_matches('/').to_string();

        let version = discover(&http_endpoint).await?;
        debug!(
            "{} at {} (protocol {})",
            version.browser, http_endpoint, version.protocol_version
        );

        let browser_ws_url = version.web_socket_debugger_url;
        let (socket, _) = tokio_tungstenite::connect_async(browser_ws_url.as_str())
            .await
            .map_err(|e| CdpError::ConnectionFailed(format!("{}: {}", browser_ws_url, e)))?;
        let (sink, source) = socket.split();

        let pending = PendingMap::default();
        let routes = SessionRoutes::default();
        let reader = tokio::spawn(read_frames(source, pending.clone(), routes.clone()));

        Ok(Self {
            http_endpoint,
            browser_ws_url,
            transport: Transport::new(sink, pending),
            routes,
            reader,
        })
    }

    /// Send a browser-level command.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, CdpError> {
        self.transport.call(method, params, None).await
    }

    pub fn browser_ws_url(&self) -> &str {
        &self.browser_ws_url
    }

    /// Every target the HTTP endpoint knows about, service workers included.
    pub async fn list_pages(&self) -> Result<Vec<PageInfo>, CdpError> {
        let url = format!("{}/json/list", self.http_endpoint);
        Ok(reqwest::get(&url).await?.json().await?)
    }

    /// First regular tab whose URL contains `filter`.
    pub async fn find_page(&self, filter: &str) -> Result<PageInfo, CdpError> {
        let pages = self.list_pages().await?;
        select_page(&pages, filter).cloned().ok_or_else(|| {
            CdpError::PageNotFound(format!("no tab with a URL containing '{}'", filter))
        })
    }

    /// Open a flattened session on `target_id` with its domains enabled.
    pub async fn attach_page(&self, target_id: &str) -> Result<PageSession, CdpError> {
        let reply = self
            .call(
                "Target.attachToTarget",
                Some(json!({ "targetId": target_id, "flatten": true })),
            )
            .await?;

        let session_id = reply["sessionId"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                CdpError::InvalidResponse(format!("no sessionId when attaching to {}", target_id))
            })?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.routes.write().await.insert(session_id.clone(), events_tx);

        let session = PageSession::new(
            target_id.to_string(),
            session_id,
            self.transport.clone(),
            events_rx,
        );
        session.enable_domains().await?;

        debug!("Session {} open on {}", session.session_id(), target_id);
        Ok(session)
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// First page in `pages` matching `filter`.
pub fn select_page<'a>(pages: &'a [PageInfo], filter: &str) -> Option<&'a PageInfo> {
    pages.iter().find(|page| page.matches(filter))
}

async fn discover(http_endpoint: &str) -> Result<BrowserVersion, CdpError> {
    let unavailable = |e: reqwest::Error| CdpError::ChromeNotAvailable(format!("{}: {}", http_endpoint, e));
    reqwest::get(format!("{}/json/version", http_endpoint))
        .await
        .map_err(unavailable)?
        .json()
        .await
        .map_err(unavailable)
}

async fn read_frames(mut source: SocketSource, pending: PendingMap, routes: SessionRoutes) {
    loop {
        let frame = match source.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(close))) => {
                debug!("Browser closed the connection: {:?}", close);
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => {
                error!("Browser connection failed: {}", e);
                break;
            }
            None => break,
        };

        trace!("<< {}", frame);
        match serde_json::from_str::<CdpResponse>(&frame) {
            Ok(message) => route(message, &pending, &routes).await,
            Err(e) => warn!("Unreadable CDP frame: {}", e),
        }
    }

    // Dropping the responders and senders fails waiting calls and ends
    // every session's event stream.
    pending.lock().clear();
    routes.write().await.clear();
}

/// Hand a reply to its waiting call, or an event to its session.
async fn route(message: CdpResponse, pending: &PendingMap, routes: &SessionRoutes) {
    if let Some(id) = message.id {
        let Some(responder) = pending.lock().remove(&id) else {
            trace!("Reply {} has no waiting call", id);
            return;
        };
        let outcome = match message.error {
            Some(e) => Err(CdpError::Protocol {
                code: e.code,
                message: e.message,
            }),
            None => Ok(message.result.unwrap_or(Value::Null)),
        };
        let _ = responder.send(outcome);
        return;
    }

    if message.method.is_none() {
        return;
    }
    let key = message.session_id.clone().unwrap_or_default();
    if let Some(events) = routes.read().await.get(&key) {
        let _ = events.send(message);
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
