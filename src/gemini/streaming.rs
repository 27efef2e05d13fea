//! Server-Sent Events decoding for `streamGenerateContent?alt=sse`.
//!
//! The body is read line by line; each blank-line-terminated event carries
//! one JSON `GenerateContentResponse` in its `data:` field(s). Events are
//! turned into a lazy stream of [`Fragment`]s, pulled one at a time.

use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio_util::io::StreamReader;

use super::error::{UpstreamError, UpstreamResult};
use super::types::{Fragment, GenerateContentResponse};

/// Split a byte stream into SSE event payloads (joined `data:` lines).
///
/// A trailing event without a terminating blank line is still emitted.
pub fn sse_data<S>(bytes: S) -> impl Stream<Item = UpstreamResult<String>> + Send + 'static
where
    S: Stream<Item = std::io::Result<Bytes>> + Send + Unpin + 'static,
{
    let lines = BufReader::new(StreamReader::new(bytes)).lines();

    stream::try_unfold((lines, String::new()), |(mut lines, mut data)| async move {
        next_event(&mut lines, &mut data)
            .await
            .map(|next| next.map(|event| (event, (lines, data))))
    })
}

/// Read lines until one full event is buffered in `data`, then take it.
async fn next_event<R>(lines: &mut Lines<R>, data: &mut String) -> UpstreamResult<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let Some(line) = lines.next_line().await? else {
            if data.is_empty() {
                return Ok(None);
            }
            return Ok(Some(std::mem::take(data)));
        };

        if line.is_empty() {
            if data.is_empty() {
                continue;
            }
            return Ok(Some(std::mem::take(data)));
        }

        // Other fields (event:, id:, retry:, comments) carry nothing we use.
        if let Some(payload) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(payload.strip_prefix(' ').unwrap_or(payload));
        }
    }
}

/// Decode one event payload into a fragment. Empty text yields `None`.
///
/// # Errors
/// Returns an error if the payload is not valid JSON or the prompt was blocked.
pub fn decode_event(data: &str) -> UpstreamResult<Option<Fragment>> {
    let response: GenerateContentResponse = serde_json::from_str(data)?;

    if let Some(reason) = response.block_reason() {
        return Err(UpstreamError::Blocked(reason.to_string()));
    }

    let text = response.text();
    if text.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Fragment::new(text)))
    }
}

/// Map SSE payloads to non-empty fragments, preserving order.
pub fn fragments<S>(events: S) -> impl Stream<Item = UpstreamResult<Fragment>> + Send + 'static
where
    S: Stream<Item = UpstreamResult<String>> + Send + 'static,
{
    events.try_filter_map(|data| futures::future::ready(decode_event(&data)))
}
