#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("underlying channel error: {0}")]
    Channel(#[from] std::io::Error),

    #[error("no free socket slot in connection table")]
    NoFreeSlot,

    #[error("socket {0} is not in a valid state for this operation")]
    InvalidState(usize),

    #[error("socket {0} does not exist")]
    NoSuchSocket(usize),

    #[error("connect to server port {0} timed out after max retries")]
    ConnectTimedOut(u16),

    #[error("disconnect timed out after max retries")]
    DisconnectTimedOut,

    #[error("demultiplexer thread could not be spawned: {0}")]
    ThreadSpawn(std::io::Error),
}
