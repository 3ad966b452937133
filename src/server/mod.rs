//! Server connection table, FSM, and socket API.

mod closewait;
mod demux;

mod tcb;
pub use tcb::ServerState;
use tcb::ServerTcb;

use std::io::{Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use crate::config::Config;
use crate::err::Error;

pub(crate) struct ServerSocket {
    tcb: Mutex<ServerTcb>,
    cvar: Condvar,
}

/// A server-side endpoint: one connection table, one demultiplexer thread,
/// shared writer half of the overlay channel.
pub struct ServerEndpoint<W: Write + Send + 'static> {
    table: Arc<Mutex<Vec<Option<Arc<ServerSocket>>>>>,
    writer: Arc<Mutex<W>>,
    cfg: Config,
    _demux: thread::JoinHandle<()>,
}

impl<W: Write + Send + 'static> ServerEndpoint<W> {
    /// Zeroes the connection table, records the channel, and spawns the
    /// demultiplexer thread.
    pub fn init<R: Read + Send + 'static>(reader: R, writer: W, cfg: Config) -> Result<Self, Error> {
        let table = Arc::new(Mutex::new(
            (0..cfg.max_transport_connections).map(|_| None).collect(),
        ));
        let writer = Arc::new(Mutex::new(writer));

        let demux_table = table.clone();
        let demux_writer = writer.clone();
        let handle = thread::Builder::new()
            .name("srt-server-demux".into())
            .spawn(move || demux::run(reader, demux_writer, demux_table, cfg))
            .map_err(Error::ThreadSpawn)?;

        Ok(ServerEndpoint {
            table,
            writer,
            cfg,
            _demux: handle,
        })
    }

    /// Allocates a TCB with state CLOSED, a fresh receive buffer, and a
    /// fresh mutex. Returns the slot index.
    pub fn sock(&self, server_port: u16) -> Result<usize, Error> {
        let mut table = self.table.lock().unwrap();
        let slot = table.iter().position(Option::is_none).ok_or(Error::NoFreeSlot)?;
        table[slot] = Some(Arc::new(ServerSocket {
            tcb: Mutex::new(ServerTcb::new(server_port, self.cfg.receive_buf_size)),
            cvar: Condvar::new(),
        }));
        Ok(slot)
    }

    fn socket(&self, sock: usize) -> Result<Arc<ServerSocket>, Error> {
        let table = self.table.lock().unwrap();
        table
            .get(sock)
            .and_then(|slot| slot.clone())
            .ok_or(Error::NoSuchSocket(sock))
    }

    /// Sets state to LISTENING and blocks until the demultiplexer moves it
    /// to CONNECTED.
    pub fn accept(&self, sock: usize) -> Result<(), Error> {
        let socket = self.socket(sock)?;
        let mut tcb = socket.tcb.lock().unwrap();
        tcb.state = ServerState::Listening;

        let tcb = socket
            .cvar
            .wait_while(tcb, |tcb| tcb.state == ServerState::Listening)
            .unwrap();

        if tcb.state == ServerState::Connected {
            log::info!("accepted connection from client port {:?}", tcb.client_port);
            Ok(())
        } else {
            Err(Error::InvalidState(sock))
        }
    }

    /// Blocks until at least `out.len()` bytes are buffered, then copies
    /// them out and shifts the remainder down.
    pub fn recv(&self, sock: usize, out: &mut [u8]) -> Result<(), Error> {
        let socket = self.socket(sock)?;
        let tcb = socket.tcb.lock().unwrap();

        let mut tcb = socket
            .cvar
            .wait_while(tcb, |tcb| tcb.buffer.len() < out.len())
            .unwrap();

        for slot in out.iter_mut() {
            *slot = tcb.buffer.pop_front().expect("checked length above");
        }

        Ok(())
    }

    /// Blocks until state becomes CLOSED, then frees the receive buffer and
    /// clears the table slot.
    pub fn close(&self, sock: usize) -> Result<(), Error> {
        let socket = self.socket(sock)?;
        {
            let tcb = socket.tcb.lock().unwrap();
            let _tcb = socket
                .cvar
                .wait_while(tcb, |tcb| tcb.state != ServerState::Closed)
                .unwrap();
        }

        let mut table = self.table.lock().unwrap();
        table[sock] = None;
        Ok(())
    }
}
