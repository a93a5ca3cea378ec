use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use qbot_logging::{LogEvent, Logger};

use crate::{Transcript, TranscriptSink};

/// Background hand-off of completed transcripts to export sinks.
///
/// Enqueueing never blocks. Sinks run on the blocking pool one transcript at
/// a time; their failures are logged and dropped.
pub struct ArchiveQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<Transcript>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ArchiveQueue {
    /// Start the worker. Must be called from within a Tokio runtime.
    pub fn start(sinks: Vec<Arc<dyn TranscriptSink>>, logger: Arc<Logger>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(drain(receiver, sinks, logger));
        Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a transcript for export. Returns false once the queue is shut down.
    pub fn enqueue(&self, transcript: Transcript) -> bool {
        let sender = self.sender.lock().expect("Archive queue lock poisoned");
        match sender.as_ref() {
            Some(tx) => {
                let session_id = transcript.session_id.clone();
                if tx.send(transcript).is_err() {
                    warn!(session_id = %session_id, "Archive worker has stopped");
                    return false;
                }
                debug!(session_id = %session_id, "Transcript queued for archive");
                true
            }
            None => {
                warn!(
                    session_id = %transcript.session_id,
                    "Archive queue is shut down, transcript not exported"
                );
                false
            }
        }
    }

    /// Stop accepting transcripts and wait for queued ones to finish
    pub async fn shutdown(&self) {
        drop(self.sender.lock().expect("Archive queue lock poisoned").take());
        let worker = self.worker.lock().expect("Archive queue lock poisoned").take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                warn!(error = %e, "Archive worker ended abnormally");
            }
        }
    }
}

async fn drain(
    mut receiver: mpsc::UnboundedReceiver<Transcript>,
    sinks: Vec<Arc<dyn TranscriptSink>>,
    logger: Arc<Logger>,
) {
    while let Some(transcript) = receiver.recv().await {
        let transcript = Arc::new(transcript);
        for sink in &sinks {
            let name = sink.name().to_string();
            let task_sink = Arc::clone(sink);
            let task_transcript = Arc::clone(&transcript);
            let result = tokio::task::spawn_blocking(move || task_sink.deliver(&task_transcript)).await;

            let error = match result {
                Ok(Ok(())) => {
                    debug!(sink = %name, session_id = %transcript.session_id, "Transcript archived");
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            };

            warn!(sink = %name, session_id = %transcript.session_id, error = %error, "Transcript archive failed");
            logger.log(&LogEvent::ArchiveFailed {
                session_id: transcript.session_id.clone(),
                sink: name,
                error,
            });
        }
    }
}
