//! The notification channel over server-sent events.
//!
//! [`SseOpener`] plugs the API's `/notifications/stream` endpoint into the
//! shared [`SubscriptionManager`](georeport_core::realtime::SubscriptionManager):
//! the manager decides when a channel is opened or torn down, this module
//! only knows how to read one.

use std::time::Duration;

use georeport_core::{notification::NotificationEvent, realtime::ChannelOpener};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::client::ApiClient;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

// ─── Decoder ──────────────────────────────────────────────────────────────────

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseMessage {
  pub event: Option<String>,
  pub data:  String,
}

/// Incremental `text/event-stream` decoder. Chunks may split lines or even
/// UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
  buf: Vec<u8>,
}

impl SseDecoder {
  pub fn push(&mut self, chunk: &[u8]) -> Vec<SseMessage> {
    self.buf.extend_from_slice(chunk);
    let mut out = Vec::new();
    while let Some((end, skip)) = frame_end(&self.buf) {
      let frame: Vec<u8> = self.buf.drain(..end + skip).take(end).collect();
      if let Some(msg) = parse_frame(&String::from_utf8_lossy(&frame)) {
        out.push(msg);
      }
    }
    out
  }
}

/// Position of the first blank line, and the length of the terminator.
fn frame_end(buf: &[u8]) -> Option<(usize, usize)> {
  (0..buf.len()).find_map(|i| {
    if buf[i..].starts_with(b"\r\n\r\n") {
      Some((i, 4))
    } else if buf[i..].starts_with(b"\n\n") {
      Some((i, 2))
    } else {
      None
    }
  })
}

fn parse_frame(frame: &str) -> Option<SseMessage> {
  let mut event = None;
  let mut data: Vec<&str> = Vec::new();
  for line in frame.lines() {
    if line.is_empty() || line.starts_with(':') {
      continue;
    }
    let (field, value) = line.split_once(':').unwrap_or((line, ""));
    let value = value.strip_prefix(' ').unwrap_or(value);
    match field {
      "event" => event = Some(value.to_string()),
      "data" => data.push(value),
      _ => {}
    }
  }
  if data.is_empty() {
    return None;
  }
  Some(SseMessage { event, data: data.join("\n") })
}

// ─── Opener ───────────────────────────────────────────────────────────────────

/// Opens notification channels on the API's SSE endpoint. Reconnects after a
/// dropped connection until the manager aborts the task.
pub struct SseOpener {
  client: ApiClient,
}

impl SseOpener {
  pub fn new(client: ApiClient) -> Self { Self { client } }
}

impl ChannelOpener for SseOpener {
  fn open(&self, user_id: Uuid, sink: broadcast::Sender<NotificationEvent>) -> JoinHandle<()> {
    let client = self.client.clone();
    tokio::spawn(async move {
      loop {
        match pump(&client, user_id, &sink).await {
          Ok(()) => debug!(%user_id, "notification stream ended"),
          Err(e) => warn!(%user_id, error = %e, "notification stream failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
      }
    })
  }
}

async fn pump(
  client: &ApiClient,
  user_id: Uuid,
  sink: &broadcast::Sender<NotificationEvent>,
) -> anyhow::Result<()> {
  let mut resp = client.open_stream().await?;
  debug!(%user_id, "notification stream connected");
  let mut decoder = SseDecoder::default();
  while let Some(chunk) = resp.chunk().await? {
    for msg in decoder.push(&chunk) {
      match serde_json::from_str::<NotificationEvent>(&msg.data) {
        // The server filters too; this keeps a shared sink clean if it
        // ever does not.
        Ok(event) if event.user_id == user_id => {
          let _ = sink.send(event);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, event = ?msg.event, "undecodable notification event"),
      }
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn decodes_named_events() {
    let mut d = SseDecoder::default();
    let msgs = d.push(b"event: INSERT\ndata: {\"a\":1}\n\n");
    assert_eq!(
      msgs,
      vec![SseMessage { event: Some("INSERT".into()), data: "{\"a\":1}".into() }]
    );
  }

  #[test]
  fn frames_may_span_chunks() {
    let mut d = SseDecoder::default();
    assert!(d.push(b"event: UPD").is_empty());
    assert!(d.push(b"ATE\ndata: x").is_empty());
    let msgs = d.push(b"y\n\nevent: DELETE\ndata: z\n\n");
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0].data, "xy");
    assert_eq!(msgs[1].event.as_deref(), Some("DELETE"));
  }

  #[test]
  fn split_utf8_is_reassembled() {
    let mut d = SseDecoder::default();
    let bytes = "data: caído\n\n".as_bytes();
    let (a, b) = bytes.split_at(9);
    assert!(d.push(a).is_empty());
    assert_eq!(d.push(b)[0].data, "caído");
  }

  #[test]
  fn keep_alives_and_crlf() {
    let mut d = SseDecoder::default();
    assert!(d.push(b":\n\n").is_empty());
    let msgs = d.push(b"data: one\r\ndata: two\r\n\r\n");
    assert_eq!(msgs[0].data, "one\ntwo");
    assert_eq!(msgs[0].event, None);
  }

  #[test]
  fn decodes_notification_payload() {
    let user = Uuid::new_v4();
    let json = serde_json::json!({
      "event": "INSERT",
      "user_id": user,
      "new": {
        "id": Uuid::new_v4(),
        "user_id": user,
        "type": "reporte_asignado",
        "title": "Reporte asignado",
        "message": "Se te asignó: Bache",
        "data": {},
        "read": false,
        "created_at": "2024-06-01T12:00:00Z",
      },
      "old": null,
    });
    let mut d = SseDecoder::default();
    let frame = format!("event: INSERT\ndata: {json}\n\n");
    let msg = d.push(frame.as_bytes()).remove(0);
    let event: NotificationEvent = serde_json::from_str(&msg.data).unwrap();
    assert_eq!(event.inserted().unwrap().title, "Reporte asignado");
  }
}
