use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{ AtomicBool, Ordering };
use std::time::Duration;

use futures::{ SinkExt, StreamExt };
use log::{ debug, error, info, warn };
use tokio::io::{ AsyncRead, AsyncWrite };
use tokio::sync::{ broadcast, mpsc };
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{ connect_async, WebSocketStream };
use url::Url;

use super::{ RealtimeChannel, EVENT_BUFFER };
use crate::error::{ ChatError, ChatResult };
use crate::models::realtime::{ ClientEvent, ServerEvent };

const MAX_FRAME_SIZE: usize = 1 * 1024 * 1024;
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket connection to the real-time service.
///
/// One writer task drains an outbound queue, one reader task fans parsed
/// frames out to every subscriber. Both live until `close` or drop.
pub struct RealtimeClient {
    url: String,
    outbound: mpsc::UnboundedSender<Message>,
    inbound: broadcast::Sender<ServerEvent>,
    connected: Arc<AtomicBool>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    pub async fn connect(url: &str, token: Option<&str>) -> ChatResult<Self> {
        Url::parse(url)?;
        let mut request = url.into_client_request()?;
        if let Some(token) = token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token)).map_err(|e|
                ChatError::Credential(format!("token is not a valid header value: {}", e))
            )?;
            request.headers_mut().insert("Authorization", value);
        }

        let (websocket, _) = connect_async(request).await?;
        info!("Connected to real-time service at {}", url);
        Ok(Self::from_stream(url, websocket))
    }

    pub fn from_stream<S>(url: &str, websocket: WebSocketStream<S>) -> Self
        where S: AsyncRead + AsyncWrite + Unpin + Send + 'static
    {
        let (mut sink, mut stream) = websocket.split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound, _) = broadcast::channel(EVENT_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));

        let writer_url = url.to_string();
        let writer_connected = Arc::clone(&connected);
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = matches!(frame, Message::Close(_));
                if let Err(e) = sink.send(frame).await {
                    error!("Error sending frame to {}: {}", writer_url, e);
                    break;
                }
                if closing {
                    break;
                }
            }
            writer_connected.store(false, Ordering::SeqCst);
            debug!("Writer for {} stopped", writer_url);
        });

        let reader_url = url.to_string();
        let reader_connected = Arc::clone(&connected);
        let reader_inbound = inbound.clone();
        let pong_tx = outbound.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if text.len() > MAX_FRAME_SIZE {
                            warn!(
                                "Frame from {} exceeds size limit ({} > {})",
                                reader_url,
                                text.len(),
                                MAX_FRAME_SIZE
                            );
                            continue;
                        }
                        match ServerEvent::from_frame(&text) {
                            Ok(Some(event)) => {
                                // No subscribers is fine: nothing is mounted.
                                let _ = reader_inbound.send(event);
                            }
                            Ok(None) => debug!("Ignoring unhandled event from {}", reader_url),
                            Err(e) => error!("Failed to parse frame from {}: {}", reader_url, e),
                        }
                    }
                    Ok(Message::Ping(data)) => {
                        if pong_tx.send(Message::Pong(data)).is_err() {
                            error!("Failed to queue pong for {}", reader_url);
                            break;
                        }
                    }
                    Ok(Message::Close(_)) => {
                        info!("Received close frame from {}", reader_url);
                        break;
                    }
                    Ok(Message::Pong(_)) => {}
                    Ok(Message::Binary(_)) => {
                        warn!("Ignoring binary frame from {}", reader_url);
                    }
                    Ok(Message::Frame(_)) => {}
                    Err(e) => {
                        match e {
                            | tokio_tungstenite::tungstenite::Error::ConnectionClosed
                            | tokio_tungstenite::tungstenite::Error::Protocol(_)
                            | tokio_tungstenite::tungstenite::Error::Utf8 => {
                                info!("Connection to {} closed or protocol error: {}", reader_url, e);
                            }
                            tokio_tungstenite::tungstenite::Error::Io(ref io_err) if
                                io_err.kind() == std::io::ErrorKind::ConnectionReset
                            => {
                                info!("Connection reset by {}", reader_url);
                            }
                            _ => {
                                error!("Error receiving frame from {}: {}", reader_url, e);
                            }
                        }
                        break;
                    }
                }
            }
            reader_connected.store(false, Ordering::SeqCst);
            info!("Real-time connection to {} ended", reader_url);
        });

        Self {
            url: url.to_string(),
            outbound,
            inbound,
            connected,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Sends a close frame, waits briefly for it to be flushed and stops
    /// reading. Later emits fail.
    pub async fn close(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!("Closing real-time connection to {}", self.url);
            let _ = self.outbound.send(Message::Close(None));
        }
        if let Some(reader) = take_task(&self.reader) {
            reader.abort();
        }
        // The writer exits on its own once the close frame is out.
        if let Some(writer) = take_task(&self.writer) {
            if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await.is_err() {
                warn!("Close frame to {} not flushed within {:?}", self.url, CLOSE_FLUSH_TIMEOUT);
            }
        }
    }
}

fn take_task(slot: &Mutex<Option<JoinHandle<()>>>) -> Option<JoinHandle<()>> {
    slot.lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .take()
}

impl RealtimeChannel for RealtimeClient {
    fn emit(&self, event: ClientEvent) -> ChatResult<()> {
        if !self.is_connected() {
            return Err(ChatError::ChannelClosed);
        }
        let text = serde_json::to_string(&event)?;
        debug!("emit {} to {}", event.name(), self.url);
        self.outbound.send(Message::Text(text)).map_err(|_| ChatError::ChannelClosed)
    }

    fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.inbound.subscribe()
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        for slot in [&self.writer, &self.reader] {
            if let Some(task) = take_task(slot) {
                task.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserId;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let join = loop {
                match ws.next().await {
                    Some(Ok(Message::Text(text))) => {
                        break text;
                    }
                    Some(Ok(_)) => {
                        continue;
                    }
                    other => panic!("client went away: {:?}", other),
                }
            };
            let online = ServerEvent::OnlineUsers(vec![UserId::from("42")]);
            ws.send(Message::Text(online.to_frame().unwrap())).await.unwrap();
            join
        });

        let client = RealtimeClient::connect(&format!("ws://{}", addr), Some("tok")).await.unwrap();
        let mut rx = client.subscribe();
        client.emit(ClientEvent::Join { user_id: UserId::from("7") }).unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event, ServerEvent::OnlineUsers(vec![UserId::from("42")]));

        let join: ClientEvent = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(join, ClientEvent::Join { user_id: UserId::from("7") });
    }

    #[tokio::test]
    async fn close_frame_reaches_server_before_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) => {
                        break true;
                    }
                    Some(Ok(_)) => {
                        continue;
                    }
                    _ => {
                        break false;
                    }
                }
            }
        });

        let client = RealtimeClient::connect(&format!("ws://{}", addr), None).await.unwrap();
        client.close().await;
        drop(client);

        assert!(server.await.unwrap());
    }

    #[tokio::test]
    async fn emit_after_close_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client = RealtimeClient::connect(&format!("ws://{}", addr), None).await.unwrap();
        assert!(client.is_connected());
        client.close().await;
        assert!(!client.is_connected());
        assert!(matches!(
            client.emit(ClientEvent::Typing { receiver_id: UserId::from("1") }),
            Err(ChatError::ChannelClosed)
        ));
    }
}
