//! Line-delimited live transport.
//!
//! Each non-empty line is one serialized batch. The reader can be consumed
//! once: end of input closes the connection, and every later connect fails
//! so the channel keeps retrying quietly.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use url::Url;
use wittr_client::channel::{ChannelError, Connection, Connector};

pub struct LineConnector<R> {
    lines: Mutex<Option<Lines<R>>>,
}

impl LineConnector<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LineConnector<R> {
    pub fn new(reader: R) -> Self {
        Self { lines: Mutex::new(Some(reader.lines())) }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> Connector for LineConnector<R> {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Connection>, ChannelError> {
        match self.lines.lock().await.take() {
            Some(lines) => {
                tracing::info!(%url, "reading live batches from input");
                Ok(Box::new(LineConnection { lines }))
            }
            None => Err(ChannelError::ConnectFailed("input already closed".into())),
        }
    }
}

struct LineConnection<R> {
    lines: Lines<R>,
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> Connection for LineConnection<R> {
    async fn recv(&mut self) -> Option<String> {
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => return Some(line),
                Ok(None) => return None,
                Err(e) => {
                    tracing::warn!(error = %e, "input read failed");
                    return None;
                }
            }
        }
    }
}
