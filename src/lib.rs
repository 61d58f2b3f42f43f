//! Client/server pair exchanging CRUD operations on a small comic store
//! over HTTP/1.1, with every socket interaction expressed as chained
//! async/await steps on a Tokio reactor.
//!
//! See `README.md` for usage and the wire protocol. Each module focuses
//! on a concrete responsibility:
//!
//! - [`cli`] parses the command-line interface for server and client modes.
//! - [`comic`] holds the `Comic` record and the in-memory store shared by
//!   server sessions.
//! - [`http`] provides the HTTP/1.1 wire codec plus helpers for async
//!   reads and writes of requests and responses.
//! - [`router`] maps an inbound method and target onto a store operation
//!   and builds the response, including the error surface.
//! - [`server`] accepts TCP connections and runs one keep-alive session
//!   state machine per connection.
//! - [`client`] drives one round trip per operation (resolve, connect,
//!   send, receive, close) and keeps the local-to-remote id map.
//!
//! Integration and unit tests use this crate directly to exercise the
//! session state machines and the wire protocol.

pub mod cli;
pub mod client;
pub mod comic;
pub mod http;
pub mod router;
pub mod server;
