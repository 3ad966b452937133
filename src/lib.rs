//! SRT (Simple Reliable Transport): a unidirectional reliable byte-stream
//! transport layered over an existing ordered, lossless byte channel.
//!
//! This crate multiplexes many logical connections over a single overlay
//! channel, frames segments with a two-byte-marker codec, simulates loss and
//! corruption for testing, and recovers via checksums, sequence numbers,
//! cumulative acknowledgments, and Go-Back-N retransmission. Signaling
//! (connect/disconnect) is bidirectional; application data flows only from
//! client to server.
//!
//! A [`client::ClientEndpoint`] opens connections and streams bytes to a
//! [`server::ServerEndpoint`], which accepts them and hands back the
//! reassembled stream through [`server::ServerEndpoint::recv`]. Both sides
//! are generic over any `Read + Write` overlay channel (see [`channel`]); a
//! `std::net::TcpStream` is the typical choice.

pub mod channel;
pub mod client;
pub mod config;
pub mod err;
pub mod segment;
pub mod server;

pub use config::Config;
pub use err::Error;
