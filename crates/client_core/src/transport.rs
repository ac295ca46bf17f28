//! Websocket carrier for push frames and outbound commands.

use futures::{SinkExt, StreamExt};
use shared::protocol::{OutboundCommand, PushFrame};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

const FRAME_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid push channel url: {0}")]
    Url(#[from] url::ParseError),
    #[error("push channel url must start with ws://, wss://, http:// or https://, got {0}")]
    Scheme(String),
    #[error("failed to connect websocket {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: tokio_tungstenite::tungstenite::Error,
    },
}

/// Both directions of one logical push connection.
pub struct ChannelHandle {
    pub outbound: mpsc::UnboundedSender<OutboundCommand>,
    pub frames: mpsc::Receiver<PushFrame>,
}

/// Accepts ws/wss urls as-is and maps http/https onto them.
pub fn websocket_url(raw: &str) -> Result<Url, TransportError> {
    let mut url = Url::parse(raw.trim())?;
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => return Err(TransportError::Scheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|()| TransportError::Scheme(raw.to_string()))?;
    Ok(url)
}

pub fn encode_frame(command: &OutboundCommand) -> serde_json::Result<String> {
    serde_json::to_string(&command.to_frame()?)
}

pub fn decode_frame(text: &str) -> serde_json::Result<PushFrame> {
    serde_json::from_str(text)
}

/// Opens the push connection and spawns its reader and writer tasks.
///
/// Frames that do not decode are logged and dropped; the connection stays up.
pub async fn connect_websocket(raw_url: &str) -> Result<ChannelHandle, TransportError> {
    let url = websocket_url(raw_url)?;
    let (stream, _) = connect_async(url.as_str())
        .await
        .map_err(|source| TransportError::Connect {
            url: url.to_string(),
            source,
        })?;
    info!(%url, "push channel connected");
    let (mut writer, mut reader) = stream.split();

    let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<OutboundCommand>();
    let (frames_tx, frames) = mpsc::channel(FRAME_BUFFER);

    tokio::spawn(async move {
        while let Some(command) = outbound_rx.recv().await {
            let text = match encode_frame(&command) {
                Ok(text) => text,
                Err(err) => {
                    warn!(command = %command.name, %err, "failed to encode outbound command");
                    continue;
                }
            };
            if let Err(err) = writer.send(Message::Text(text)).await {
                warn!(%err, "websocket send failed");
                break;
            }
        }
        let _ = writer.close().await;
    });

    tokio::spawn(async move {
        while let Some(msg) = reader.next().await {
            match msg {
                Ok(Message::Text(text)) => match decode_frame(&text) {
                    Ok(frame) => {
                        if frames_tx.send(frame).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(%err, "dropping undecodable push frame"),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(err) => {
                    warn!(%err, "websocket receive failed");
                    break;
                }
            }
        }
        debug!("push channel reader finished");
    });

    Ok(ChannelHandle { outbound, frames })
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shared::{domain::CommandId, protocol::CommandEnvelope};

    use super::*;

    #[test]
    fn http_urls_map_to_websocket_schemes() {
        assert_eq!(
            websocket_url("http://127.0.0.1:5000/socket").expect("url").as_str(),
            "ws://127.0.0.1:5000/socket"
        );
        assert_eq!(
            websocket_url("https://daq.example.org").expect("url").scheme(),
            "wss"
        );
        assert_eq!(
            websocket_url("ws://localhost:9001").expect("url").as_str(),
            "ws://localhost:9001/"
        );
        assert!(matches!(
            websocket_url("tcp://127.0.0.1:5550"),
            Err(TransportError::Scheme(_))
        ));
    }

    #[test]
    fn encodes_command_as_named_frame() {
        let command = OutboundCommand::new(
            "run_routine",
            CommandEnvelope {
                id: CommandId(7),
                params: vec![json!({"name": "leakage", "params": []})],
            },
        );
        let frame = decode_frame(&encode_frame(&command).expect("encode")).expect("decode");
        assert_eq!(frame.event, "command/run_routine");
        assert_eq!(frame.data["id"], json!(7));
    }

    #[test]
    fn frame_without_data_decodes_to_null() {
        let frame = decode_frame(r#"{"event": "state-update"}"#).expect("decode");
        assert!(frame.data.is_null());
        assert!(decode_frame("not json").is_err());
    }
}
