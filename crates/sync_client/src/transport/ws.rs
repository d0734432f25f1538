use crate::connection::{Endpoint, LinkSink, PushLink, PushTransport};
use crate::errors::TransportError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Push links over WebSocket, at `{base}/ws/{room_id}/{player_id}`.
pub struct WsPushTransport {
    base_url: String,
}

impl WsPushTransport {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn url_for(&self, endpoint: &Endpoint) -> String {
        format!(
            "{}/ws/{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.room_id,
            endpoint.player_id
        )
    }
}

#[async_trait]
impl PushTransport for WsPushTransport {
    async fn open(
        &self,
        endpoint: &Endpoint,
        sink: LinkSink,
    ) -> Result<Box<dyn PushLink>, TransportError> {
        let url = self.url_for(endpoint);
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut writer, mut reader) = stream.split();
        let (outgoing, mut queue) = mpsc::unbounded_channel::<Message>();

        let generation = sink.generation();
        let writer_task = tokio::spawn(async move {
            while let Some(message) = queue.recv().await {
                let closing = matches!(message, Message::Close(_));
                if let Err(error) = writer.send(message).await {
                    debug!(generation, %error, "push write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        let reader_task = tokio::spawn(async move {
            // No close frame at all counts as an abnormal close.
            let mut code = None;
            let mut reason = String::new();
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => {
                        if !sink.frame(text) {
                            return;
                        }
                    }
                    Ok(Message::Close(frame)) => {
                        match frame {
                            Some(frame) => {
                                code = Some(u16::from(frame.code));
                                reason = frame.reason.into_owned();
                            }
                            None => code = Some(1005),
                        }
                        break;
                    }
                    Ok(_) => {}
                    Err(error) => {
                        reason = error.to_string();
                        break;
                    }
                }
            }
            sink.closed(code, reason);
        });

        Ok(Box::new(WsLink {
            outgoing,
            reader_task,
            writer_task: Some(writer_task),
        }))
    }
}

struct WsLink {
    outgoing: mpsc::UnboundedSender<Message>,
    reader_task: JoinHandle<()>,
    writer_task: Option<JoinHandle<()>>,
}

impl PushLink for WsLink {
    fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.outgoing
            .send(Message::Text(text))
            .map_err(|_| TransportError::NotConnected)
    }

    fn close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        };
        if self.outgoing.send(Message::Close(Some(frame))).is_err() {
            if let Some(task) = self.writer_task.take() {
                task.abort();
            }
        }
    }
}

impl Drop for WsLink {
    fn drop(&mut self) {
        // The writer is left to flush a queued close frame.
        self.reader_task.abort();
    }
}
