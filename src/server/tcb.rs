use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Closed,
    Listening,
    Connected,
    CloseWait,
}

/// Per-socket server TCB. `buffer` is capped at `receive_buf_size`; its
/// current length stands in for a separate used-length counter.
#[derive(Debug)]
pub struct ServerTcb {
    pub(crate) server_port: u16,
    pub(crate) client_port: Option<u16>,
    pub(crate) state: ServerState,
    pub(crate) expect_seq: u32,
    pub(crate) capacity: usize,
    pub(crate) buffer: VecDeque<u8>,
}

impl ServerTcb {
    pub(crate) fn new(server_port: u16, capacity: usize) -> Self {
        ServerTcb {
            server_port,
            client_port: None,
            state: ServerState::Closed,
            expect_seq: 0,
            capacity,
            buffer: VecDeque::with_capacity(capacity),
        }
    }
}
