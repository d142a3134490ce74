use tokio_tungstenite::tungstenite;

#[derive(Debug)]
pub enum AdapterError {
    /// Player IPC transport failure.
    Ipc(std::io::Error),
    /// Player closed its IPC socket.
    IpcClosed,
    /// Session channel transport failure.
    Session(tungstenite::Error),
    /// Server closed the session channel.
    SessionClosed,
    /// A frame or IPC line that could not be encoded or decoded.
    Codec(serde_json::Error),
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ipc(e) => write!(f, "player IPC error: {e}"),
            Self::IpcClosed => write!(f, "player IPC socket closed"),
            Self::Session(e) => write!(f, "session channel error: {e}"),
            Self::SessionClosed => write!(f, "session channel closed"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
        }
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(e: std::io::Error) -> Self {
        Self::Ipc(e)
    }
}

impl From<tungstenite::Error> for AdapterError {
    fn from(e: tungstenite::Error) -> Self {
        Self::Session(e)
    }
}

impl From<serde_json::Error> for AdapterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Codec(e)
    }
}
