use std::io::{Read, Write};
use std::sync::{Arc, Mutex};

use crate::config::Config;
use crate::segment::{recv_segment, send_segment, Segment, SegmentHeader, SegmentType};

use super::closewait;
use super::tcb::{ServerState, ServerTcb};
use super::ServerSocket;

/// Side effects `handle_segment` wants the caller to perform once the TCB
/// lock is released. Mirrors the client side's `ClientAction`.
#[derive(Debug, Default)]
pub(crate) struct ServerAction {
    pub(crate) notify: bool,
    pub(crate) reply: Option<SegmentHeader>,
    pub(crate) spawn_closewait: bool,
}

/// Pure FSM step, dispatched by current state and arriving segment type.
/// Takes no locks itself so it can be unit tested directly against a
/// `ServerTcb`.
pub(crate) fn handle_segment(tcb: &mut ServerTcb, segment: &Segment) -> ServerAction {
    let mut action = ServerAction::default();
    let client_port = segment.header.src_port;
    let server_port = tcb.server_port;

    match (tcb.state, segment.header.segment_type) {
        (ServerState::Closed, _) => {}

        (ServerState::Listening, SegmentType::Syn) => {
            tcb.client_port = Some(client_port);
            tcb.expect_seq = 1;
            tcb.state = ServerState::Connected;
            action.notify = true;
            action.reply = Some(synack(server_port, client_port));
        }

        (ServerState::Connected, SegmentType::Syn) => {
            action.reply = Some(synack(server_port, client_port));
        }

        (ServerState::Connected, SegmentType::Fin) => {
            tcb.state = ServerState::CloseWait;
            action.notify = true;
            action.reply = Some(finack(server_port, client_port));
            action.spawn_closewait = true;
        }

        (ServerState::Connected, SegmentType::Data) => {
            let length = segment.payload.len();
            if segment.header.seq_num == tcb.expect_seq && tcb.buffer.len() + length <= tcb.capacity {
                tcb.buffer.extend(segment.payload.iter().copied());
                tcb.expect_seq = tcb.expect_seq.wrapping_add(length as u32);
                action.notify = true;
            }
            action.reply = Some(dataack(server_port, client_port, tcb.expect_seq));
        }

        (ServerState::CloseWait, SegmentType::Fin) => {
            action.reply = Some(finack(server_port, client_port));
        }

        _ => {}
    }

    action
}

/// The server's single demultiplexer thread. Routes each arriving segment
/// by `dest_port`, learns `client_port` from the first matching segment's
/// `src_port`, and drives the per-socket FSM under its own TCB mutex.
pub(crate) fn run<R: Read, W: Write>(
    mut reader: R,
    writer: Arc<Mutex<W>>,
    table: Arc<Mutex<Vec<Option<Arc<ServerSocket>>>>>,
    cfg: Config,
) {
    let mut rng = rand::thread_rng();

    loop {
        let segment = match recv_segment(&mut reader, &cfg, &mut rng) {
            Ok(segment) => segment,
            Err(err) => {
                log::warn!("server demultiplexer stopping: {err}");
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
                    tcb.server_port == segment.header.dest_port
                        && (tcb.client_port.is_none() || tcb.client_port == Some(segment.header.src_port))
                })
                .cloned()
        };

        let Some(socket) = socket else {
            log::debug!("no server socket bound to port {}", segment.header.dest_port);
            continue;
        };

        let action = {
            let mut tcb = socket.tcb.lock().unwrap();
            handle_segment(&mut tcb, &segment)
        };

        if action.notify {
            socket.cvar.notify_all();
        }

        if let Some(header) = action.reply {
            if let Err(err) = send_segment(&mut *writer.lock().unwrap(), header, &[]) {
                log::warn!("failed to send reply segment: {err}");
            }
        }

        if action.spawn_closewait {
            closewait::spawn(socket.clone(), cfg.closewait_timeout);
        }
    }
}

fn synack(server_port: u16, client_port: u16) -> SegmentHeader {
    SegmentHeader {
        src_port: server_port,
        dest_port: client_port,
        seq_num: 0,
        ack_num: 1,
        length: 0,
        checksum: 0,
        segment_type: SegmentType::SynAck,
    }
}

fn finack(server_port: u16, client_port: u16) -> SegmentHeader {
    SegmentHeader {
        src_port: server_port,
        dest_port: client_port,
        seq_num: 0,
        ack_num: 0,
        length: 0,
        checksum: 0,
        segment_type: SegmentType::FinAck,
    }
}

fn dataack(server_port: u16, client_port: u16, ack_num: u32) -> SegmentHeader {
    SegmentHeader {
        src_port: server_port,
        dest_port: client_port,
        seq_num: 0,
        ack_num,
        length: 0,
        checksum: 0,
        segment_type: SegmentType::DataAck,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syn(src_port: u16, dest_port: u16) -> Segment {
        Segment {
            header: SegmentHeader {
                src_port,
                dest_port,
                seq_num: 0,
                ack_num: 0,
                length: 0,
                checksum: 0,
                segment_type: SegmentType::Syn,
            },
            payload: Vec::new(),
        }
    }

    fn data(src_port: u16, dest_port: u16, seq_num: u32, payload: &[u8]) -> Segment {
        Segment {
            header: SegmentHeader {
                src_port,
                dest_port,
                seq_num,
                ack_num: 0,
                length: payload.len() as u16,
                checksum: 0,
                segment_type: SegmentType::Data,
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn listening_syn_binds_client_port_and_replies_synack() {
        let mut tcb = ServerTcb::new(9000, 100);
        tcb.state = ServerState::Listening;

        let action = handle_segment(&mut tcb, &syn(7000, 9000));

        assert_eq!(tcb.state, ServerState::Connected);
        assert_eq!(tcb.client_port, Some(7000));
        assert_eq!(tcb.expect_seq, 1);
        assert!(action.notify);
        assert_eq!(action.reply.unwrap().segment_type, SegmentType::SynAck);
    }

    #[test]
    fn duplicate_syn_while_connected_resends_synack_without_resetting_state() {
        let mut tcb = ServerTcb::new(9000, 100);
        tcb.state = ServerState::Connected;
        tcb.client_port = Some(7000);
        tcb.expect_seq = 5;

        let action = handle_segment(&mut tcb, &syn(7000, 9000));

        assert_eq!(tcb.state, ServerState::Connected);
        assert_eq!(tcb.expect_seq, 5);
        assert!(!action.notify);
        assert_eq!(action.reply.unwrap().segment_type, SegmentType::SynAck);
    }

    #[test]
    fn in_order_data_is_appended_and_acked() {
        let mut tcb = ServerTcb::new(9000, 100);
        tcb.state = ServerState::Connected;
        tcb.client_port = Some(7000);
        tcb.expect_seq = 1;

        let action = handle_segment(&mut tcb, &data(7000, 9000, 1, b"abc"));

        assert_eq!(tcb.buffer.iter().copied().collect::<Vec<u8>>(), b"abc");
        assert_eq!(tcb.expect_seq, 4);
        assert!(action.notify);
        let reply = action.reply.unwrap();
        assert_eq!(reply.segment_type, SegmentType::DataAck);
        assert_eq!(reply.ack_num, 4);
    }

    #[test]
    fn out_of_order_data_is_dropped_but_still_acked_with_old_expect_seq() {
        let mut tcb = ServerTcb::new(9000, 100);
        tcb.state = ServerState::Connected;
        tcb.client_port = Some(7000);
        tcb.expect_seq = 4;

        let action = handle_segment(&mut tcb, &data(7000, 9000, 7, b"xyz"));

        assert!(tcb.buffer.is_empty());
        assert_eq!(tcb.expect_seq, 4);
        assert!(!action.notify);
        let reply = action.reply.unwrap();
        assert_eq!(reply.ack_num, 4);
    }

    #[test]
    fn data_exceeding_receive_buffer_capacity_is_dropped() {
        let mut tcb = ServerTcb::new(9000, 2);
        tcb.state = ServerState::Connected;
        tcb.client_port = Some(7000);
        tcb.expect_seq = 1;

        let action = handle_segment(&mut tcb, &data(7000, 9000, 1, b"abc"));

        assert!(tcb.buffer.is_empty());
        assert_eq!(tcb.expect_seq, 1);
        assert!(!action.notify);
    }

    #[test]
    fn fin_while_connected_enters_closewait_and_schedules_timer() {
        let mut tcb = ServerTcb::new(9000, 100);
        tcb.state = ServerState::Connected;
        tcb.client_port = Some(7000);

        let fin = Segment {
            header: SegmentHeader {
                src_port: 7000,
                dest_port: 9000,
                seq_num: 0,
                ack_num: 0,
                length: 0,
                checksum: 0,
                segment_type: SegmentType::Fin,
            },
            payload: Vec::new(),
        };
        let action = handle_segment(&mut tcb, &fin);

        assert_eq!(tcb.state, ServerState::CloseWait);
        assert!(action.notify);
        assert!(action.spawn_closewait);
        assert_eq!(action.reply.unwrap().segment_type, SegmentType::FinAck);
    }
}
