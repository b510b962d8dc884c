//! Background execution of sessions and checksum runs.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use filetally_scan::WalkProgress;

use crate::engine::{ChecksumEngine, ChecksumJob, EngineReport};
use crate::error::{EngineError, SessionError};
use crate::progress::ChecksumProgress;
use crate::session::{ScanSession, SessionMode, SessionOutcome};

/// Channel buffer size for background events.
pub const EVENT_CHANNEL_SIZE: usize = 100;

/// Events sent while a session runs in the background.
#[derive(Debug)]
pub enum SessionEvent {
    /// Walk progress update.
    Walk(WalkProgress),
    /// Checksum progress update.
    Checksum(ChecksumProgress),
    /// The session finished, paused or failed.
    Complete(Result<SessionOutcome, SessionError>),
}

/// Events sent while a single checksum run executes in the background.
#[derive(Debug)]
pub enum ChecksumEvent {
    /// Progress update.
    Progress(ChecksumProgress),
    /// The run finished, paused or failed.
    Complete(Result<EngineReport, EngineError>),
}

/// Start a session on a blocking worker.
///
/// Cancelling `cancel` pauses the session; the final event is always
/// [`SessionEvent::Complete`].
pub fn start_session(
    session: Arc<ScanSession>,
    mode: SessionMode,
    cancel: CancellationToken,
) -> mpsc::Receiver<SessionEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

    tokio::spawn(async move {
        let mut forwarders = Vec::new();

        if let Some(walker) = session.walker() {
            let mut walk_rx = walker.subscribe();
            let tx_walk = tx.clone();
            forwarders.push(tokio::spawn(async move {
                while let Ok(progress) = walk_rx.recv().await {
                    if tx_walk.send(SessionEvent::Walk(progress)).await.is_err() {
                        break;
                    }
                }
            }));
        }

        let mut checksum_rx = session.engine().subscribe();
        let tx_checksum = tx.clone();
        forwarders.push(tokio::spawn(async move {
            while let Ok(progress) = checksum_rx.recv().await {
                if tx_checksum
                    .send(SessionEvent::Checksum(progress))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }));

        let result = tokio::task::spawn_blocking(move || session.run(mode, &cancel))
            .await
            .unwrap_or_else(|e| {
                Err(SessionError::Worker {
                    message: e.to_string(),
                })
            });

        for task in forwarders {
            task.abort();
        }
        let _ = tx.send(SessionEvent::Complete(result)).await;
    });

    rx
}

/// Start a single checksum run on a blocking worker.
pub fn start_checksum(
    engine: Arc<ChecksumEngine>,
    job: ChecksumJob,
    cancel: CancellationToken,
) -> mpsc::Receiver<ChecksumEvent> {
    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);

    tokio::spawn(async move {
        let mut progress_rx = engine.subscribe();
        let tx_progress = tx.clone();
        let progress_task = tokio::spawn(async move {
            while let Ok(progress) = progress_rx.recv().await {
                if tx_progress
                    .send(ChecksumEvent::Progress(progress))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        });

        let result = tokio::task::spawn_blocking(move || engine.run(&job, &cancel))
            .await
            .unwrap_or_else(|e| {
                Err(EngineError::Worker {
                    message: e.to_string(),
                })
            });

        progress_task.abort();
        let _ = tx.send(ChecksumEvent::Complete(result)).await;
    });

    rx
}
