//! Command dispatcher.
//!
//! This module provides the [`Dispatcher`] that receives boundary
//! [`Command`]s and maps each one onto the typed [`ShareClient`] call,
//! producing a [`Response`] or an [`ErrorMessage`].

use protocol::messages::{
    Command, Envelope, ErrorCode, ErrorMessage, Message, Progress, Response,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::client::ShareClient;
use crate::error::ShareError;
use crate::files::MoveOutcome;

/// Result type for dispatcher operations.
pub type DispatchResult = Result<Response, DispatchError>;

/// Errors that can occur while dispatching a command.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The remote operation failed.
    #[error(transparent)]
    Share(#[from] ShareError),

    /// The message was not a command.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl DispatchError {
    /// Convert the error to a protocol ErrorMessage.
    pub fn to_error_message(&self, context: Option<String>) -> ErrorMessage {
        match self {
            DispatchError::Share(e) => e.to_error_message(context),
            DispatchError::InvalidRequest(_) => ErrorMessage {
                code: ErrorCode::InvalidRequest,
                message: self.to_string(),
                context,
                recoverable: false,
            },
        }
    }
}

/// Dispatches commands to a [`ShareClient`].
#[derive(Clone)]
pub struct Dispatcher {
    client: ShareClient,
}

impl Dispatcher {
    /// Create a dispatcher over `client`.
    pub fn new(client: ShareClient) -> Self {
        Self { client }
    }

    /// The client commands are dispatched to.
    pub fn client(&self) -> &ShareClient {
        &self.client
    }

    /// Execute a command, discarding transfer progress.
    pub async fn dispatch(&self, command: Command) -> DispatchResult {
        self.dispatch_with_progress(command, |_| {}).await
    }

    /// Execute a command. `on_progress` receives transfer fractions for
    /// uploads and downloads and is called on a worker thread.
    pub async fn dispatch_with_progress<F>(&self, command: Command, on_progress: F) -> DispatchResult
    where
        F: FnMut(f64) + Send + 'static,
    {
        debug!(command = command.name(), "Dispatching command");

        match command {
            Command::Auth { username, password } => {
                self.client.set_credential(&username, &password);
                Ok(Response::Done)
            }
            Command::List { path } => {
                let entries = self.client.list(&path).await?;
                Ok(Response::Entries(entries.map(|list| {
                    list.iter().map(|e| e.to_protocol()).collect()
                })))
            }
            Command::ReadText { path, encoding } => {
                Ok(Response::Text(self.client.read_text(&path, encoding).await?))
            }
            Command::ReadByteArray { path } => {
                Ok(Response::Bytes(self.client.read_all(&path).await?))
            }
            Command::CreateFile { path } => {
                let entry = self.client.create_file(&path).await?;
                Ok(Response::Entry(entry.to_protocol()))
            }
            Command::CreateDirectory { path } => {
                let entry = self.client.create_directory(&path).await?;
                Ok(Response::Entry(entry.to_protocol()))
            }
            Command::Delete { path } => {
                self.client.delete(&path).await?;
                Ok(Response::Done)
            }
            Command::Rename { path, new_path } => {
                self.client.rename(&path, &new_path).await?;
                Ok(Response::Done)
            }
            Command::Copy { path, new_path } => {
                self.client.copy(&path, &new_path).await?;
                Ok(Response::Done)
            }
            Command::Move { path, new_path } => {
                match self.client.move_entry(&path, &new_path).await? {
                    MoveOutcome::Moved => Ok(Response::Moved {
                        complete: true,
                        detail: None,
                    }),
                    MoveOutcome::CopiedSourceRemains { cause } => {
                        warn!(from = %path, to = %new_path, error = %cause, "Move left source in place");
                        Ok(Response::Moved {
                            complete: false,
                            detail: Some(cause.to_string()),
                        })
                    }
                }
            }
            Command::Upload {
                local_path,
                remote_path,
            } => {
                let report = self
                    .client
                    .upload(local_path, &remote_path, on_progress)
                    .await?;
                Ok(Response::Transferred {
                    bytes: report.bytes,
                    sha256: report.sha256,
                })
            }
            Command::Download {
                remote_path,
                local_path,
            } => {
                let report = self
                    .client
                    .download(&remote_path, local_path, on_progress)
                    .await?;
                Ok(Response::Transferred {
                    bytes: report.bytes,
                    sha256: report.sha256,
                })
            }
        }
    }

    /// Route an envelope carrying a command.
    ///
    /// Progress for transfers is sent on `progress` as envelopes with the
    /// request's sequence number. The returned envelope carries either the
    /// response or the error.
    pub async fn route(
        &self,
        envelope: Envelope,
        progress: mpsc::UnboundedSender<Envelope>,
    ) -> Envelope {
        let sequence = envelope.sequence;
        let command = match envelope.payload {
            Message::Request(command) => command,
            other => {
                let err = DispatchError::InvalidRequest(format!(
                    "expected a request, got {}",
                    message_kind(&other)
                ));
                return Envelope::new(sequence, Message::Error(err.to_error_message(None)));
            }
        };

        let name = command.name();
        let on_progress = move |fraction: f64| {
            let _ = progress.send(Envelope::new(
                sequence,
                Message::Progress(Progress { fraction }),
            ));
        };

        match self.dispatch_with_progress(command, on_progress).await {
            Ok(response) => {
                info!(sequence, command = name, "Command completed");
                Envelope::new(sequence, Message::Response(response))
            }
            Err(e) => {
                warn!(sequence, command = name, error = %e, "Command failed");
                Envelope::new(
                    sequence,
                    Message::Error(e.to_error_message(Some(name.to_string()))),
                )
            }
        }
    }
}

fn message_kind(message: &Message) -> &'static str {
    match message {
        Message::Request(_) => "request",
        Message::Response(_) => "response",
        Message::Progress(_) => "progress",
        Message::Error(_) => "error",
    }
}
