use std::time::Duration;

/// Tunable parameters shared by the client and server endpoints.
///
/// These mirror the `#define` constants of the original C reference
/// (`constant.h`, not present in the retrieved source but referenced
/// throughout `client/srt_client.c` and `server/srt_srt.c`). They are kept as
/// a plain struct rather than read from a file or environment, matching how
/// the rest of this crate's lineage treats protocol tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    /// Size of each endpoint's connection table.
    pub max_transport_connections: usize,
    /// Maximum payload bytes per DATA segment.
    pub max_seg_len: usize,
    /// Go-Back-N window size, in segments.
    pub gbn_window: usize,
    /// Wait between SYN retransmissions.
    pub syn_timeout: Duration,
    /// Wait between FIN retransmissions.
    pub fin_timeout: Duration,
    /// Idle time after which an unacked DATA segment is retransmitted.
    pub data_timeout: Duration,
    /// Maximum SYN retransmissions before `connect` gives up.
    pub syn_max_retry: u32,
    /// Maximum FIN retransmissions before `disconnect` gives up.
    pub fin_max_retry: u32,
    /// Granularity at which the send timer re-checks the buffer.
    pub sendbuf_polling_interval: Duration,
    /// Granularity at which `recv` re-checks the receive buffer.
    pub recvbuf_polling_interval: Duration,
    /// Capacity, in bytes, of a server socket's receive buffer.
    pub receive_buf_size: usize,
    /// How long a server TCB lingers in CLOSEWAIT before becoming CLOSED.
    pub closewait_timeout: Duration,
    /// Probability in [0, 1] that an arriving segment is dropped or corrupted.
    pub pkt_loss_rate: f64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_transport_connections: 10,
            max_seg_len: 1000,
            gbn_window: 10,
            syn_timeout: Duration::from_millis(200),
            fin_timeout: Duration::from_millis(200),
            data_timeout: Duration::from_millis(200),
            syn_max_retry: 5,
            fin_max_retry: 5,
            sendbuf_polling_interval: Duration::from_millis(100),
            recvbuf_polling_interval: Duration::from_millis(100),
            receive_buf_size: 10_000,
            closewait_timeout: Duration::from_millis(200),
            pkt_loss_rate: 0.0,
        }
    }
}
