//! Client side of the pair: one connection per operation, driven as a
//! strictly ordered pipeline of resolve, connect, send, receive, and
//! close steps. The close step runs whether the exchange succeeded or
//! failed, so no connection is left half-open.

use std::{collections::HashMap, io};

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{lookup_host, TcpStream},
};
use tracing::{debug, info};

use crate::{
    cli::ClientArgs,
    comic::{Comic, ComicId, ComicStore},
    http::{self, Request, Response},
};

/// Port the comic store server is expected to listen on.
pub const REMOTE_PORT: u16 = 8000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("server closed the connection before responding")]
    ConnectionClosed,
    #[error("invalid record in response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("server answered {code}: {body}")]
    Status { code: u16, body: String },
    #[error("local comic {0} has no remote mapping; create it remotely first")]
    UnmappedLocalId(ComicId),
}

/// Typed operations against a remote comic store, plus the
/// local-to-remote id map needed because "create" lets the server assign
/// the id under which the record must be addressed later.
pub struct ComicClient {
    host: String,
    port: u16,
    remote_ids: HashMap<ComicId, ComicId>,
}

impl ComicClient {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            remote_ids: HashMap::new(),
        }
    }

    /// Remote id previously recorded for a local record, if any.
    pub fn remote_id(&self, local_id: ComicId) -> Option<ComicId> {
        self.remote_ids.get(&local_id).copied()
    }

    /// Fetches the remote record under `id`. Mutates nothing; the caller
    /// decides where the result goes.
    pub async fn fetch(&self, id: ComicId) -> Result<Comic, ClientError> {
        let response = self.round_trip(Request::get(format!("/comic/{id}"))).await?;
        decode_comic(check_success(response)?)
    }

    /// Overwrites the remote record under `id` and returns the server's
    /// canonical view of it.
    pub async fn push(&self, id: ComicId, comic: &Comic) -> Result<Comic, ClientError> {
        let body = serde_json::to_string(comic)?;
        let response = self
            .round_trip(Request::put(format!("/comic/{id}"), body))
            .await?;
        decode_comic(check_success(response)?)
    }

    /// Creates `comic` remotely (PUT with no id), records the
    /// server-assigned id under `local_id`, and returns it.
    pub async fn create_remote(
        &mut self,
        local_id: ComicId,
        comic: &Comic,
    ) -> Result<ComicId, ClientError> {
        let body = serde_json::to_string(comic)?;
        let response = self.round_trip(Request::put("/comic", body)).await?;
        let created = decode_comic(check_success(response)?)?;
        self.remote_ids.insert(local_id, created.id);
        Ok(created.id)
    }

    /// Pushes `comic` to the remote id previously recorded for
    /// `local_id`. A missing mapping is a caller error and fails before
    /// any request is emitted.
    pub async fn update_by_local_id(
        &self,
        local_id: ComicId,
        comic: &Comic,
    ) -> Result<Comic, ClientError> {
        let remote_id = self
            .remote_id(local_id)
            .ok_or(ClientError::UnmappedLocalId(local_id))?;
        self.push(remote_id, comic).await
    }

    /// One full pipeline run. Steps are strictly ordered and each awaits
    /// exactly one operation; the shutdown step is unconditional.
    async fn round_trip(&self, request: Request) -> Result<Response, ClientError> {
        let mut request = request;
        // One connection per round trip, so ask the server to close it.
        request.keep_alive = false;

        // Resolving
        let mut addrs = lookup_host((self.host.as_str(), self.port)).await?;
        let addr = addrs.next().ok_or_else(|| {
            ClientError::Transport(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", self.host),
            ))
        })?;

        // Connecting
        let stream = TcpStream::connect(addr).await?;
        debug!(%addr, method = %request.method, target = %request.target, "connected");
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        // Sending, then AwaitingResponse
        let exchange = async {
            http::write_request(&mut writer, &request, &self.host).await?;
            http::read_response(&mut reader)
                .await?
                .ok_or(ClientError::ConnectionClosed)
        };
        let outcome = exchange.await;

        // Closing, on success and failure alike
        if let Err(err) = writer.shutdown().await {
            debug!(error = ?err, "failed to shut down connection cleanly");
        }

        outcome
    }
}

fn check_success(response: Response) -> Result<Response, ClientError> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::Status {
            code: response.code,
            body: response.body,
        })
    }
}

fn decode_comic(response: Response) -> Result<Comic, ClientError> {
    Ok(serde_json::from_str(&response.body)?)
}

/// Demo scenario run by the `client` subcommand: re-letter the server's
/// first comic, then round-trip a brand new record through the
/// local-to-remote id map.
pub async fn run(args: ClientArgs) -> Result<()> {
    let mut client = ComicClient::new(args.server.clone(), args.port);
    let mut local = ComicStore::new();

    let fetched = client.fetch(0).await.context("fetch comic 0")?;
    write_stdout(&format!(
        "fetched comic 0: {} by {}",
        fetched.title, fetched.writer
    ))
    .await?;
    info!(title = %fetched.title, "stored server comic locally");

    let mut relettered = local.create(fetched).clone();
    relettered.letterer = "Brad Templeton".to_string();
    local.update(relettered.id, relettered.clone());
    let canonical = client.push(0, &relettered).await.context("update comic 0")?;
    write_stdout(&format!(
        "updated comic 0: letterer is now {}",
        canonical.letterer
    ))
    .await?;

    let draft = Comic {
        id: 0,
        title: "Crisis on Infinite Earths #1".to_string(),
        writer: "Marv Wolfman".to_string(),
        artist: "George Perez".to_string(),
        letterer: "John Costanza".to_string(),
    };
    let local_id = local.create(draft.clone()).id;
    let remote_id = client
        .create_remote(local_id, &draft)
        .await
        .context("create remote comic")?;
    write_stdout(&format!(
        "created remote comic {remote_id} from local draft {local_id}"
    ))
    .await?;

    let mut amended = draft;
    amended.letterer = "Todd Klein".to_string();
    local.update(local_id, amended.clone());
    let canonical = client
        .update_by_local_id(local_id, &amended)
        .await
        .context("update remote comic through the id map")?;
    write_stdout(&format!(
        "updated remote comic {remote_id}: letterer is now {}",
        canonical.letterer
    ))
    .await?;

    Ok(())
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
