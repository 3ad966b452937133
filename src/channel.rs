//! The overlay channel SRT runs on top of.
//!
//! The core only needs a blocking *send N bytes* and a blocking *receive 1
//! byte* primitive from the underlying channel, and exactly one thread ever
//! reads from it. Rather than bundling both directions behind a single
//! handle shared under one lock (fine for a lone device handle, but it
//! forces a lock around every write once more than one thread needs to
//! send), endpoints here take a read half and a write half separately:
//! `R: Read + Send + 'static` for the demux thread's exclusive use,
//! `W: Write + Send + 'static` shared behind a mutex for the application,
//! timer, and close-wait threads that all emit segments. A `TcpStream`,
//! conceptually a connection to an overlay network, splits into exactly
//! such a pair via `try_clone`, which is what [`tcp_duplex`] does for the
//! demonstration binaries.

use std::io;
use std::net::{TcpStream, ToSocketAddrs};

/// Connects to `addr` and returns independent read/write handles onto the
/// same socket, suitable for an endpoint's `init`.
pub fn tcp_connect<A: ToSocketAddrs>(addr: A) -> io::Result<(TcpStream, TcpStream)> {
    let stream = TcpStream::connect(addr)?;
    tcp_duplex(stream)
}

/// Splits an already-connected `TcpStream` into independent read/write
/// handles onto the same socket.
pub fn tcp_duplex(stream: TcpStream) -> io::Result<(TcpStream, TcpStream)> {
    let write_half = stream.try_clone()?;
    Ok((stream, write_half))
}
