use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::tcb::ServerState;
use super::ServerSocket;

/// One-shot, fire-and-forget timer spawned on entering CLOSEWAIT. Supports
/// no cancellation; it simply sleeps and transitions the TCB to CLOSED.
pub(crate) fn spawn(socket: Arc<ServerSocket>, closewait_timeout: Duration) {
    thread::spawn(move || {
        thread::sleep(closewait_timeout);

        let mut tcb = socket.tcb.lock().unwrap();
        if tcb.state == ServerState::CloseWait {
            tcb.state = ServerState::Closed;
            drop(tcb);
            socket.cvar.notify_all();
        }
    });
}
