//! Connection acceptor and per-connection session state machine.

use std::{future::Future, io, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
    select,
};
use tracing::{debug, info, warn};

use crate::{comic::SharedStore, http, router};

/// Accepts connections on a bound listener and spawns one [`Session`]
/// task per connection. Accepting never waits on a running session.
pub struct Server {
    listener: TcpListener,
    store: SharedStore,
}

impl Server {
    pub fn new(listener: TcpListener, store: SharedStore) -> Self {
        Self { listener, store }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, store } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &store);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: io::Result<(TcpStream, SocketAddr)>, store: &SharedStore) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, store),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, store: &SharedStore) {
    let store = Arc::clone(store);
    tokio::spawn(async move {
        debug!(peer = %peer, "session opened");
        match Session::new(stream, store).run().await {
            Ok(()) => debug!(peer = %peer, "session closed"),
            // A failed session never reaches the acceptor or its peers.
            Err(err) => debug!(peer = %peer, error = ?err, "session closed with error"),
        }
    });
}

/// One accepted connection. The session loops reading a request, routing
/// it, and writing the response, until the peer disconnects, a transport
/// step fails, or a response carries the must-close condition.
struct Session {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    store: SharedStore,
}

impl Session {
    fn new(stream: TcpStream, store: SharedStore) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
            store,
        }
    }

    async fn run(mut self) -> io::Result<()> {
        let outcome = self.serve_requests().await;
        // Graceful half-close on every exit path: stop sending, let any
        // remaining peer data drain.
        if let Err(err) = self.writer.shutdown().await {
            debug!(error = ?err, "failed to shut down session writer cleanly");
        }
        outcome
    }

    async fn serve_requests(&mut self) -> io::Result<()> {
        loop {
            // Each iteration starts from a fresh request; a read failure
            // closes the session without attempting a write.
            let request = match http::read_request(&mut self.reader).await? {
                Some(request) => request,
                None => return Ok(()),
            };

            let response = router::respond(&self.store, &request).await;
            let close = response.must_close();
            http::write_response(&mut self.writer, &response).await?;

            if close {
                return Ok(());
            }
        }
    }
}
