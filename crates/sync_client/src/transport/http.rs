use crate::action_stream::{ActionTransport, LineStream};
use crate::errors::{LookupError, TransportError};
use crate::roster::ActorDirectory;
use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use reqwest::StatusCode;
use std::fmt::Display;
use std::pin::Pin;
use sync_core::{ActionRequest, Actor};

/// Chunked action exchange: `POST {api}/api/action`, newline-delimited body.
pub struct HttpActionTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpActionTransport {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!("{}/api/action", api_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ActionTransport for HttpActionTransport {
    async fn open(&self, request: &ActionRequest) -> Result<LineStream, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(split_lines(response.bytes_stream()))
    }
}

/// Actor lookups: `GET {api}/api/actors/{id}`.
pub struct HttpActorDirectory {
    client: reqwest::Client,
    base: String,
}

impl HttpActorDirectory {
    pub fn new(api_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("{}/api/actors", api_url.trim_end_matches('/')),
        }
    }
}

#[async_trait]
impl ActorDirectory for HttpActorDirectory {
    async fn lookup(&self, actor_id: &str) -> Result<Actor, LookupError> {
        let url = format!("{}/{}", self.base, actor_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(LookupError::NotFound(actor_id.to_string())),
            status if !status.is_success() => {
                Err(LookupError::Transport(format!("status {}", status.as_u16())))
            }
            _ => response.json::<Actor>().await.map_err(|e| LookupError::Invalid {
                id: actor_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

struct LineState<S> {
    body: Pin<Box<S>>,
    buffer: Vec<u8>,
    finished: bool,
}

/// Re-chunk a byte stream into lines. A trailing line without a newline is
/// still yielded; a read error is yielded once and ends the stream.
pub fn split_lines<S, B, E>(body: S) -> LineStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = LineState {
        body: Box::pin(body),
        buffer: Vec::new(),
        finished: false,
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(pos) = state.buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = state.buffer.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line[..pos])
                    .trim_end_matches('\r')
                    .to_string();
                return Some((Ok(text), state));
            }
            if state.finished {
                if state.buffer.is_empty() {
                    return None;
                }
                let rest = std::mem::take(&mut state.buffer);
                return Some((Ok(String::from_utf8_lossy(&rest).into_owned()), state));
            }
            match state.body.next().await {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(bytes.as_ref()),
                Some(Err(error)) => {
                    state.finished = true;
                    state.buffer.clear();
                    return Some((Err(TransportError::Stream(error.to_string())), state));
                }
                None => state.finished = true,
            }
        }
    })
    .boxed()
}
