use std::io::Write;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Instant;

use crate::config::Config;
use crate::segment::send_segment;

use super::ClientSocket;

/// Spawned whenever `send` finds the buffer was empty before enqueueing.
/// Sleeps `sendbuf_polling_interval`, then retransmits the whole in-flight
/// region if the head segment has aged past `data_timeout`. Exits the first
/// time it observes an empty buffer at the top of the loop.
pub(crate) fn spawn<W: Write + Send + 'static>(
    socket: Arc<ClientSocket>,
    writer: Arc<Mutex<W>>,
    cfg: Config,
) {
    thread::spawn(move || loop {
        thread::sleep(cfg.sendbuf_polling_interval);

        let mut tcb = socket.tcb.lock().unwrap();
        if tcb.buffer.is_empty() {
            return;
        }

        let should_retransmit = tcb
            .buffer
            .front()
            .map_or(false, |entry| entry.last_sent.elapsed() > cfg.data_timeout);

        if !should_retransmit {
            continue;
        }

        let now = Instant::now();
        let unacked = tcb.unacked_count;
        let mut to_resend = Vec::with_capacity(unacked);
        for entry in tcb.buffer.iter_mut().take(unacked) {
            entry.last_sent = now;
            to_resend.push((entry.header, entry.payload.clone()));
        }
        drop(tcb);

        let mut w = writer.lock().unwrap();
        for (header, payload) in to_resend {
            if let Err(err) = send_segment(&mut *w, header, &payload) {
                log::warn!("retransmit failed: {err}");
            }
        }
    });
}
