//! Human approval channels

use crate::collaborators::{ApprovalChannel, ApprovalDecision, ApprovalRequest, CollaboratorError};
use async_trait::async_trait;
use console::style;
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

type PendingKey = (Uuid, String);
type PendingMap = Arc<Mutex<HashMap<PendingKey, oneshot::Sender<ApprovalDecision>>>>;

/// Removes a request's entry when its waiter goes away, decided or not
struct PendingGuard {
    pending: PendingMap,
    key: PendingKey,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            if pending.remove(&self.key).is_some() {
                debug!("Dropped undecided approval for {} / {}", self.key.0, self.key.1);
            }
        }
    }
}

fn poisoned() -> CollaboratorError {
    CollaboratorError::Internal("approval state lock poisoned".to_string())
}

/// In-process approval channel
///
/// `request` parks the run on a oneshot receiver; the paired
/// [`ApprovalHandle`] sees each request and delivers the decision.
pub struct ChannelApproval {
    pending: PendingMap,
    notify: mpsc::UnboundedSender<ApprovalRequest>,
}

/// Decision side of a [`ChannelApproval`]
pub struct ApprovalHandle {
    pending: PendingMap,
    requests: tokio::sync::Mutex<mpsc::UnboundedReceiver<ApprovalRequest>>,
}

impl ChannelApproval {
    pub fn new() -> (Self, ApprovalHandle) {
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (notify, requests) = mpsc::unbounded_channel();
        (
            Self {
                pending: pending.clone(),
                notify,
            },
            ApprovalHandle {
                pending,
                requests: tokio::sync::Mutex::new(requests),
            },
        )
    }
}

#[async_trait]
impl ApprovalChannel for ChannelApproval {
    async fn request(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, CollaboratorError> {
        let (tx, rx) = oneshot::channel();
        let key = (request.run_id, request.stage.clone());
        self.pending.lock().map_err(|_| poisoned())?.insert(key.clone(), tx);
        let _guard = PendingGuard {
            pending: self.pending.clone(),
            key,
        };

        // A missing listener is fine; decisions can still arrive by key
        let _ = self.notify.send(request.clone());
        info!("Awaiting approval for {} / {}", request.pipeline, request.stage);

        rx.await.map_err(|_| {
            CollaboratorError::Closed(format!("approval for stage '{}' was abandoned", request.stage))
        })
    }
}

impl ApprovalHandle {
    /// Wait for the next approval request
    pub async fn next_request(&self) -> Option<ApprovalRequest> {
        self.requests.lock().await.recv().await
    }

    /// Requests currently awaiting a decision
    pub async fn pending(&self) -> Vec<(Uuid, String)> {
        self.pending
            .lock()
            .map(|pending| pending.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver a decision for a run's gate stage
    pub async fn decide(
        &self,
        run_id: Uuid,
        stage: &str,
        decision: ApprovalDecision,
    ) -> Result<(), CollaboratorError> {
        let sender = self
            .pending
            .lock()
            .map_err(|_| poisoned())?
            .remove(&(run_id, stage.to_string()))
            .ok_or_else(|| {
                CollaboratorError::Internal(format!("no pending approval for {} / {}", run_id, stage))
            })?;

        sender
            .send(decision)
            .map_err(|_| CollaboratorError::Closed("run stopped waiting".to_string()))
    }
}

/// Prompts on the terminal and reads the decision from stdin
#[derive(Debug, Clone, Default)]
pub struct TerminalApproval;

impl TerminalApproval {
    pub fn new() -> Self {
        Self
    }

    fn parse(line: &str) -> Option<bool> {
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" | "approve" | "approved" => Some(true),
            "n" | "no" | "reject" | "rejected" => Some(false),
            _ => None,
        }
    }
}

#[async_trait]
impl ApprovalChannel for TerminalApproval {
    async fn request(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, CollaboratorError> {
        println!();
        println!("{} {}", style("Approval required:").bold().yellow(), style(&request.stage).cyan());
        println!("  {}", request.info);
        println!("  Review: {}", style(&request.link).underlined());

        let reviewer = std::env::var("USER").ok();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("  Approve promotion? [y/n] ");
            std::io::stdout().flush()?;

            let line = lines
                .next_line()
                .await?
                .ok_or_else(|| CollaboratorError::Closed("stdin closed before a decision".to_string()))?;

            match Self::parse(&line) {
                Some(true) => {
                    return Ok(ApprovalDecision::Approved {
                        reviewer,
                        comment: None,
                    })
                }
                Some(false) => {
                    return Ok(ApprovalDecision::Rejected {
                        reviewer,
                        comment: None,
                    })
                }
                None => println!("  Please answer 'y' or 'n'"),
            }
        }
    }
}
