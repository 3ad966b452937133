use std::io::{Read, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::config::Config;
use crate::segment::{recv_segment, send_segment, Segment, SegmentHeader, SegmentType};

use super::tcb::{ClientState, ClientTcb};
use super::ClientSocket;

/// Side effects `handle_segment` wants the caller to perform once the TCB
/// lock is released: whether to wake waiters on the socket's condvar, and
/// which segments (if any) to transmit. Flattened to a struct since a
/// client TCB never needs more than one kind of side effect at a time.
#[derive(Debug, Default)]
pub(crate) struct ClientAction {
    pub(crate) notify: bool,
    pub(crate) transmit: Vec<(SegmentHeader, Vec<u8>)>,
}

/// Pure FSM step, dispatched by current state and arriving segment type.
/// Takes no locks itself so it can be unit tested directly against a
/// `ClientTcb`.
pub(crate) fn handle_segment(tcb: &mut ClientTcb, segment: &Segment) -> ClientAction {
    let mut action = ClientAction::default();

    match (tcb.state, segment.header.segment_type) {
        (ClientState::Closed, _) => {}

        (ClientState::SynSent, SegmentType::SynAck) => {
            tcb.state = ClientState::Connected;
            action.notify = true;
        }

        (ClientState::Connected, SegmentType::DataAck) => {
            let ack = segment.header.ack_num;

            while tcb.unacked_count > 0 {
                let fully_acked = tcb
                    .buffer
                    .front()
                    .map_or(false, |entry| entry.header.seq_num < ack);
                if !fully_acked {
                    break;
                }

                tcb.buffer.pop_front();
                tcb.unacked_count -= 1;

                if tcb.unacked_count < tcb.buffer.len() {
                    let now = Instant::now();
                    let entry = &mut tcb.buffer[tcb.unacked_count];
                    entry.last_sent = now;
                    action.transmit.push((entry.header, entry.payload.clone()));
                    tcb.unacked_count += 1;
                }
            }

            action.notify = true;
        }

        (ClientState::FinWait, SegmentType::FinAck) => {
            tcb.state = ClientState::Closed;
            action.notify = true;
        }

        _ => {}
    }

    action
}

/// The client's single demultiplexer thread: one blocking read loop per
/// endpoint, the only thread that ever reads the underlying channel.
pub(crate) fn run<R: Read, W: Write>(
    mut reader: R,
    writer: Arc<Mutex<W>>,
    table: Arc<Mutex<Vec<Option<Arc<ClientSocket>>>>>,
    cfg: Config,
) {
    let mut rng = rand::thread_rng();

    loop {
        let segment = match recv_segment(&mut reader, &cfg, &mut rng) {
            Ok(segment) => segment,
            Err(err) => {
                log::warn!("client demultiplexer stopping: {err}");
                return;
            }
        };

        let socket = {
            let table = table.lock().unwrap();
            table
                .iter()
                .flatten()
                .find(|socket| {
                    let tcb = socket.tcb.lock().unwrap();
                    tcb.client_port == segment.header.dest_port
                        && tcb.server_port == Some(segment.header.src_port)
                })
                .cloned()
        };

        let Some(socket) = socket else {
            log::debug!("no client socket matches segment for port {}", segment.header.dest_port);
            continue;
        };

        let action = {
            let mut tcb = socket.tcb.lock().unwrap();
            handle_segment(&mut tcb, &segment)
        };

        if action.notify {
            socket.cvar.notify_all();
        }

        if !action.transmit.is_empty() {
            let mut w = writer.lock().unwrap();
            for (header, payload) in action.transmit {
                if let Err(err) = send_segment(&mut *w, header, &payload) {
                    log::warn!("failed to slide send window: {err}");
                }
            }
        }
    }
}
