use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::AdapterError;

/// mpv JSON IPC client over a UNIX-domain socket, newline-delimited
/// JSON in both directions. Commands carry a monotonically increasing
/// `request_id`.
pub struct MpvIpc {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
}

impl MpvIpc {
    pub async fn connect(path: &str) -> std::io::Result<Self> {
        let stream = UnixStream::connect(path).await?;
        Ok(Self::from_stream(stream))
    }

    fn from_stream(stream: UnixStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            lines: BufReader::new(reader).lines(),
            writer,
            next_request_id: 0,
        }
    }

    async fn send_command(&mut self, command: Value) -> Result<u64, AdapterError> {
        self.next_request_id += 1;
        let mut line = command_frame(&command, self.next_request_id)?;
        line.push('\n');
        self.writer.write_all(line.as_bytes()).await?;
        Ok(self.next_request_id)
    }

    pub async fn observe_property(&mut self, id: u64, name: &str) -> Result<u64, AdapterError> {
        self.send_command(json!(["observe_property", id, name])).await
    }

    pub async fn set_property(&mut self, name: &str, value: Value) -> Result<u64, AdapterError> {
        self.send_command(json!(["set_property", name, value])).await
    }

    /// Next message from the player. Cancel-safe: an interrupted read
    /// leaves any partial line buffered.
    pub async fn recv(&mut self) -> Result<MpvMessage, AdapterError> {
        match self.lines.next_line().await? {
            Some(line) => Ok(serde_json::from_str(&line)?),
            None => Err(AdapterError::IpcClosed),
        }
    }
}

fn command_frame(command: &Value, request_id: u64) -> Result<String, serde_json::Error> {
    serde_json::to_string(&json!({"command": command, "request_id": request_id}))
}

/// One line from the player: either a command response or an event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MpvMessage {
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub request_id: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Player telemetry the bridge reacts to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerSignal {
    PauseChanged(bool),
    /// `None` while the player has no position (idle / between files).
    TimePos(Option<f64>),
    Seek,
}

impl MpvMessage {
    pub fn signal(&self) -> Option<PlayerSignal> {
        match self.event.as_deref() {
            Some("property-change") => match self.name.as_deref() {
                Some("pause") => self
                    .data
                    .as_ref()
                    .and_then(Value::as_bool)
                    .map(PlayerSignal::PauseChanged),
                Some("time-pos") => Some(PlayerSignal::TimePos(
                    self.data.as_ref().and_then(Value::as_f64),
                )),
                _ => None,
            },
            Some("seek") => Some(PlayerSignal::Seek),
            _ => None,
        }
    }
}
