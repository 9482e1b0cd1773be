use futures::TryStreamExt;
use reqwest::header::{HeaderValue, ACCEPT};
use std::io;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio_util::io::StreamReader;

/// Transport failure. Ends the current session only.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("event stream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("event stream returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("event stream read failed: {0}")]
    Io(#[from] io::Error),
    #[error("no data on event stream for {0:?}")]
    IdleTimeout(Duration),
}

/// Newline-delimited view of a long-lived HTTP response.
pub struct EventStream {
    lines: Lines<Pin<Box<dyn AsyncBufRead + Send>>>,
}

impl EventStream {
    /// Issues the GET. Waiting longer than `idle_timeout` for the response
    /// headers is an error, same as a silent body.
    pub async fn connect(
        client: &reqwest::Client,
        url: &str,
        idle_timeout: Duration,
    ) -> Result<Self, StreamError> {
        let request = client
            .get(url)
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .send();
        let resp = tokio::time::timeout(idle_timeout, request)
            .await
            .map_err(|_| StreamError::IdleTimeout(idle_timeout))??;
        let status = resp.status();
        if !status.is_success() {
            return Err(StreamError::Status(status));
        }
        let body = resp
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Self::from_reader(StreamReader::new(body)))
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Send + 'static,
    {
        let reader: Pin<Box<dyn AsyncBufRead + Send>> = Box::pin(reader);
        Self {
            lines: reader.lines(),
        }
    }

    /// Next line without its terminator; `Ok(None)` once the server closes
    /// the stream. Waiting longer than `idle_timeout` is an error.
    pub async fn next_line(&mut self, idle_timeout: Duration) -> Result<Option<String>, StreamError> {
        match tokio::time::timeout(idle_timeout, self.lines.next_line()).await {
            Ok(line) => Ok(line?),
            Err(_) => Err(StreamError::IdleTimeout(idle_timeout)),
        }
    }
}

impl std::fmt::Debug for EventStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream").finish_non_exhaustive()
    }
}
