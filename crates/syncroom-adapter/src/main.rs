mod error;
mod mpv;
mod session;
mod sync;

use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Bridge a local mpv instance into a syncroom playback session.
#[derive(Parser, Debug)]
#[command(name = "syncroom-adapter", version)]
pub struct Args {
    /// WebSocket URL of the session server.
    #[arg(long, default_value = "ws://localhost:8999/ws")]
    pub ws: String,

    /// Room id to create or join.
    #[arg(long)]
    pub room: String,

    /// Display name shown to other participants.
    #[arg(long, default_value = "MPV")]
    pub name: String,

    /// Client id override; generated when absent.
    #[arg(long)]
    pub client_id: Option<String>,

    /// Path of mpv's JSON IPC socket.
    #[arg(long, default_value = "/tmp/mpv-socket")]
    pub mpv_socket: String,

    /// Create the room and act as host.
    #[arg(long)]
    pub host: bool,

    /// Media URL recorded at room creation (host only).
    #[arg(long)]
    pub media_url: Option<String>,

    /// JWT auth token.
    #[arg(long)]
    pub auth_token: Option<String>,

    /// Invite token accepted in place of an auth token when joining.
    #[arg(long)]
    pub invite_token: Option<String>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(e) = session::run(args).await {
        tracing::error!(error = %e, "Adapter terminated");
        std::process::exit(1);
    }
}
