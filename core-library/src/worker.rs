//! Dedicated task owning the cache connection
//!
//! Every cache operation is sent to the worker as a command and executed in
//! arrival order, one at a time. No two transactions ever interleave on the
//! connection.

use crate::db::DatabaseConfig;
use crate::transaction::{self, QueryResults, SqlTransaction, TransactionOptions};
use crate::{LibraryError, Result};
use sqlx::{Connection, SqliteConnection};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Commands waiting for the worker before senders are back-pressured.
const COMMAND_QUEUE_CAPACITY: usize = 64;

enum Command {
    Execute {
        transaction: SqlTransaction,
        options: TransactionOptions,
        reply: oneshot::Sender<Result<QueryResults>>,
    },
    Close {
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Cloneable submission side of the worker.
#[derive(Clone, Debug)]
pub(crate) struct WorkerHandle {
    sender: mpsc::Sender<Command>,
}

impl WorkerHandle {
    pub(crate) async fn execute(
        &self,
        transaction: SqlTransaction,
        options: TransactionOptions,
    ) -> Result<QueryResults> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Command::Execute {
                transaction,
                options,
                reply,
            })
            .await
            .map_err(|_| LibraryError::Closed)?;
        response.await.map_err(|_| LibraryError::Closed)?
    }
}

/// A running worker and its task.
pub(crate) struct Worker {
    handle: WorkerHandle,
    task: JoinHandle<()>,
}

impl Worker {
    /// Open the connection and start the worker task.
    pub(crate) async fn spawn(config: &DatabaseConfig) -> Result<Self> {
        let connection = config.open_connection().await?;
        let (sender, receiver) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let task = tokio::spawn(run(connection, receiver));
        info!(location = %config.location(), "Media cache worker started");

        Ok(Self {
            handle: WorkerHandle { sender },
            task,
        })
    }

    pub(crate) fn handle(&self) -> WorkerHandle {
        self.handle.clone()
    }

    /// Drain queued commands, close the connection and join the task.
    pub(crate) async fn shutdown(self) -> Result<()> {
        let (reply, response) = oneshot::channel();
        let result = match self.handle.sender.send(Command::Close { reply }).await {
            Ok(()) => response.await.unwrap_or(Err(LibraryError::Closed)),
            Err(_) => Err(LibraryError::Closed),
        };

        drop(self.handle);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Media cache worker task ended abnormally");
        }
        info!("Media cache worker stopped");
        result
    }
}

async fn run(mut connection: SqliteConnection, mut receiver: mpsc::Receiver<Command>) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Execute {
                transaction,
                options,
                reply,
            } => {
                let result = transaction::execute(&mut connection, &transaction, options).await;
                if reply.send(result).is_err() {
                    debug!("Transaction caller went away before the result was ready");
                }
            }
            Command::Close { reply } => {
                let result = connection.close().await.map_err(LibraryError::from);
                let _ = reply.send(result);
                return;
            }
        }
    }
    debug!("All worker handles dropped; closing connection");
}
