use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use futures::{SinkExt, StreamExt};
use shared::{
    domain::BoardId,
    protocol::{ClientRequest, Envelope},
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, warn};
use url::Url;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:3000")]
    server_url: String,
    /// Session id to present; the server issues one when omitted.
    #[arg(long)]
    session: Option<String>,
    /// Register this display name before running the command.
    #[arg(long)]
    name: Option<String>,
    /// How long to keep printing broadcasts after the last request.
    #[arg(long, default_value_t = 2)]
    listen_seconds: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Boards,
    Roster {
        name: Option<String>,
    },
    Create {
        name: String,
    },
    Join {
        board_id: String,
    },
    Move {
        board_id: String,
        x: usize,
        y: usize,
    },
    Leave {
        board_id: String,
    },
    Announce {
        /// `lobby`, `roster` or a board id.
        target: String,
        message: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().init();
    let cli = Cli::parse();

    let ws_url = ws_url(&cli.server_url, cli.session.as_deref())?;
    let requests = requests_for(cli.name.clone(), cli.command);

    let (ws_stream, _) = connect_async(ws_url.as_str())
        .await
        .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
    let (mut writer, mut reader) = ws_stream.split();

    for request in &requests {
        let text = serde_json::to_string(request)?;
        debug!(%text, "sending request");
        writer.send(Message::Text(text)).await?;
    }

    let listen = Duration::from_secs(cli.listen_seconds);
    while let Ok(Some(frame)) = tokio::time::timeout(listen, reader.next()).await {
        match frame? {
            Message::Text(text) => match serde_json::from_str::<Envelope>(&text) {
                Ok(envelope) => println!("{}", serde_json::to_string_pretty(&envelope)?),
                Err(err) => warn!(%err, %text, "unrecognised envelope"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    writer.send(Message::Close(None)).await.ok();
    Ok(())
}

fn ws_url(server_url: &str, session: Option<&str>) -> Result<Url> {
    let mut url = Url::parse(server_url).with_context(|| format!("invalid url: {server_url}"))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(anyhow!("unsupported scheme '{other}' in server_url")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("cannot switch {server_url} to {scheme}"))?;
    url.set_path("/ws");
    url.set_query(None);
    if let Some(session) = session {
        url.query_pairs_mut().append_pair("session_id", session);
    }
    Ok(url)
}

fn requests_for(name: Option<String>, command: Command) -> Vec<ClientRequest> {
    let mut requests: Vec<_> = name
        .map(|name| ClientRequest::Register { name })
        .into_iter()
        .collect();
    let last = match command {
        Command::Boards => ClientRequest::LobbySubscribe,
        Command::Roster { name } => ClientRequest::RosterSubscribe { name },
        Command::Create { name } => ClientRequest::CreateBoard { name },
        Command::Join { board_id } => ClientRequest::BoardSubscribe {
            board_id: BoardId::new(board_id),
        },
        Command::Move { board_id, x, y } => {
            let board_id = BoardId::new(board_id);
            requests.push(ClientRequest::BoardSubscribe {
                board_id: board_id.clone(),
            });
            ClientRequest::Move { board_id, x, y }
        }
        Command::Leave { board_id } => ClientRequest::Leave {
            board_id: BoardId::new(board_id),
        },
        Command::Announce { target, message } => match target.as_str() {
            "lobby" => ClientRequest::LobbyAnnounce { message },
            "roster" => ClientRequest::RosterAnnounce { message },
            board_id => ClientRequest::BoardAnnounce {
                board_id: BoardId::new(board_id),
                message,
            },
        },
    };
    requests.push(last);
    requests
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_urls_become_websocket_urls() {
        let url = ws_url("http://localhost:3000/ignored?x=1", Some("s 1")).expect("url");
        assert_eq!(url.as_str(), "ws://localhost:3000/ws?session_id=s+1");
        let url = ws_url("https://lobby.example", None).expect("url");
        assert_eq!(url.as_str(), "wss://lobby.example/ws");
        assert!(ws_url("ftp://lobby.example", None).is_err());
    }

    #[test]
    fn moves_rejoin_the_board_first() {
        let requests = requests_for(
            Some("Ann".into()),
            Command::Move {
                board_id: "b-1".into(),
                x: 1,
                y: 2,
            },
        );
        assert_eq!(
            requests,
            vec![
                ClientRequest::Register { name: "Ann".into() },
                ClientRequest::BoardSubscribe {
                    board_id: BoardId::new("b-1")
                },
                ClientRequest::Move {
                    board_id: BoardId::new("b-1"),
                    x: 1,
                    y: 2
                },
            ]
        );
    }
}
