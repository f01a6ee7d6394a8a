use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Client(#[from] crate::client::Error),

    #[error("writing snapshot: {0}")]
    Snapshot(#[from] std::io::Error),

    #[error("encoding snapshot: {0}")]
    SnapshotEncoding(#[from] serde_json::Error),
}
