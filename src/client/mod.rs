//! Client connection table, FSM, and socket API.

mod demux;
mod timer;

mod tcb;
pub use tcb::ClientState;
use tcb::{ClientTcb, SendEntry};

use std::io::{Read, Write};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Instant;

use crate::config::Config;
use crate::err::Error;
use crate::segment::{send_segment, SegmentHeader, SegmentType};

pub(crate) struct ClientSocket {
    tcb: Mutex<ClientTcb>,
    cvar: Condvar,
}

/// A client-side endpoint: one connection table, one demultiplexer thread,
/// shared writer half of the overlay channel. An ordinary owned value
/// rather than a process-wide singleton, so multiple endpoints can coexist
/// in one process.
pub struct ClientEndpoint<W: Write + Send + 'static> {
    table: Arc<Mutex<Vec<Option<Arc<ClientSocket>>>>>,
    writer: Arc<Mutex<W>>,
    cfg: Config,
    _demux: thread::JoinHandle<()>,
}

impl<W: Write + Send + 'static> ClientEndpoint<W> {
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
            .name("srt-client-demux".into())
            .spawn(move || demux::run(reader, demux_writer, demux_table, cfg))
            .map_err(Error::ThreadSpawn)?;

        Ok(ClientEndpoint {
            table,
            writer,
            cfg,
            _demux: handle,
        })
    }

    /// Allocates the first empty TCB slot. Returns the slot index.
    pub fn sock(&self, client_port: u16) -> Result<usize, Error> {
        let mut table = self.table.lock().unwrap();
        let slot = table.iter().position(Option::is_none).ok_or(Error::NoFreeSlot)?;
        table[slot] = Some(Arc::new(ClientSocket {
            tcb: Mutex::new(ClientTcb::new(client_port)),
            cvar: Condvar::new(),
        }));
        Ok(slot)
    }

    fn socket(&self, sock: usize) -> Result<Arc<ClientSocket>, Error> {
        let table = self.table.lock().unwrap();
        table
            .get(sock)
            .and_then(|slot| slot.clone())
            .ok_or(Error::NoSuchSocket(sock))
    }

    /// Valid only from CLOSED. Sends SYN, waits `syn_timeout`, retries up to
    /// `syn_max_retry` times; on exhaustion resets to CLOSED and fails.
    pub fn connect(&self, sock: usize, server_port: u16) -> Result<(), Error> {
        let socket = self.socket(sock)?;

        {
            let mut tcb = socket.tcb.lock().unwrap();
            if tcb.state != ClientState::Closed {
                return Err(Error::InvalidState(sock));
            }
            tcb.server_port = Some(server_port);
        }

        for attempt in 0..self.cfg.syn_max_retry {
            let client_port = {
                let mut tcb = socket.tcb.lock().unwrap();
                tcb.state = ClientState::SynSent;
                tcb.client_port
            };

            let header = SegmentHeader {
                src_port: client_port,
                dest_port: server_port,
                seq_num: 0,
                ack_num: 0,
                length: 0,
                checksum: 0,
                segment_type: SegmentType::Syn,
            };
            send_segment(&mut *self.writer.lock().unwrap(), header, &[])?;
            log::debug!("sent SYN, attempt {}/{}", attempt + 1, self.cfg.syn_max_retry);

            let tcb = socket.tcb.lock().unwrap();
            let (tcb, wait_result) = socket
                .cvar
                .wait_timeout_while(tcb, self.cfg.syn_timeout, |tcb| tcb.state == ClientState::SynSent)
                .unwrap();

            if !wait_result.timed_out() && tcb.state == ClientState::Connected {
                log::info!("connection established to server port {server_port}");
                return Ok(());
            }
        }

        let mut tcb = socket.tcb.lock().unwrap();
        tcb.state = ClientState::Closed;
        tcb.server_port = None;
        Err(Error::ConnectTimedOut(server_port))
    }

    /// Valid in CONNECTED. Chops `bytes` into `max_seg_len`-sized segments,
    /// enqueues them, spawns a timer if the buffer had been empty, then
    /// transmits while `unacked_count < gbn_window`, all under the TCB lock.
    pub fn send(&self, sock: usize, bytes: &[u8]) -> Result<(), Error> {
        let socket = self.socket(sock)?;
        let mut tcb = socket.tcb.lock().unwrap();

        if tcb.state != ClientState::Connected {
            return Err(Error::InvalidState(sock));
        }

        let was_empty = tcb.buffer.is_empty();
        let dest_port = tcb.server_port.ok_or(Error::InvalidState(sock))?;
        let src_port = tcb.client_port;

        for chunk in bytes.chunks(self.cfg.max_seg_len.max(1)) {
            let seq_num = tcb.next_seq;
            tcb.next_seq = tcb.next_seq.wrapping_add(chunk.len() as u32);

            let header = SegmentHeader {
                src_port,
                dest_port,
                seq_num,
                ack_num: 0,
                length: chunk.len() as u16,
                checksum: 0,
                segment_type: SegmentType::Data,
            };

            tcb.buffer.push_back(SendEntry {
                header,
                payload: chunk.to_vec(),
                last_sent: Instant::now(),
            });
        }

        while tcb.unacked_count < self.cfg.gbn_window && tcb.unacked_count < tcb.buffer.len() {
            let now = Instant::now();
            let idx = tcb.unacked_count;
            let (header, payload) = {
                let entry = &mut tcb.buffer[idx];
                entry.last_sent = now;
                (entry.header, entry.payload.clone())
            };
            send_segment(&mut *self.writer.lock().unwrap(), header, &payload)?;
            tcb.unacked_count += 1;
        }

        let needs_timer = was_empty && !tcb.buffer.is_empty();
        drop(tcb);

        if needs_timer {
            timer::spawn(socket, self.writer.clone(), self.cfg);
        }

        Ok(())
    }

    /// Valid in CONNECTED. Waits for the send buffer to drain, then sends
    /// FIN up to `fin_max_retry` times; on exhaustion forces CLOSED and
    /// fails.
    pub fn disconnect(&self, sock: usize) -> Result<(), Error> {
        let socket = self.socket(sock)?;

        let tcb = socket.tcb.lock().unwrap();
        if tcb.state != ClientState::Connected {
            return Err(Error::InvalidState(sock));
        }

        let mut tcb = socket
            .cvar
            .wait_while(tcb, |tcb| {
                !tcb.buffer.is_empty() && tcb.state == ClientState::Connected
            })
            .unwrap();

        if tcb.state != ClientState::Connected {
            return Err(Error::InvalidState(sock));
        }

        let (client_port, server_port) = (tcb.client_port, tcb.server_port.unwrap());

        for attempt in 0..self.cfg.fin_max_retry {
            let header = SegmentHeader {
                src_port: client_port,
                dest_port: server_port,
                seq_num: tcb.next_seq,
                ack_num: 0,
                length: 0,
                checksum: 0,
                segment_type: SegmentType::Fin,
            };
            send_segment(&mut *self.writer.lock().unwrap(), header, &[])?;
            tcb.state = ClientState::FinWait;
            log::debug!("sent FIN, attempt {}/{}", attempt + 1, self.cfg.fin_max_retry);

            let (new_tcb, wait_result) = socket
                .cvar
                .wait_timeout_while(tcb, self.cfg.fin_timeout, |tcb| tcb.state == ClientState::FinWait)
                .unwrap();
            tcb = new_tcb;

            if !wait_result.timed_out() && tcb.state == ClientState::Closed {
                tcb.buffer.clear();
                return Ok(());
            }
        }

        tcb.state = ClientState::Closed;
        tcb.buffer.clear();
        Err(Error::DisconnectTimedOut)
    }

    /// Valid in CLOSED. Frees the TCB and clears the table slot.
    pub fn close(&self, sock: usize) -> Result<(), Error> {
        let socket = self.socket(sock)?;
        {
            let tcb = socket.tcb.lock().unwrap();
            if tcb.state != ClientState::Closed {
                return Err(Error::InvalidState(sock));
            }
        }
        let mut table = self.table.lock().unwrap();
        table[sock] = None;
        Ok(())
    }
}
