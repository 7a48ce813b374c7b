use crate::api::{ApiError, AuthResponse, Backend, RemoteBuffer, SaveOutcome};
use crate::buffer::is_builtin;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;

#[derive(Debug)]
pub enum SyncEvent {
    LoggedIn(Result<AuthResponse, ApiError>),
    Registered(Result<AuthResponse, ApiError>),
    EmailRegistered {
        email: String,
        result: Result<String, ApiError>,
    },
    CodeVerified(Result<(), ApiError>),
    Saved {
        id: String,
        result: Result<SaveOutcome, ApiError>,
    },
    Deleted {
        id: String,
        result: Result<(), ApiError>,
    },
    Pulled(Result<Vec<RemoteBuffer>, ApiError>),
}

pub struct SyncBridge {
    backend: Arc<dyn Backend>,
    sender: Sender<SyncEvent>,
    receiver: Receiver<SyncEvent>,
}

impl SyncBridge {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            backend,
            sender,
            receiver,
        }
    }

    fn spawn<F>(&self, label: &'static str, job: F)
    where
        F: FnOnce(&dyn Backend) -> SyncEvent + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        let sender = self.sender.clone();
        tracing::debug!("Starting {label} request");
        thread::spawn(move || {
            let event = job(backend.as_ref());
            // The receiver is gone once the UI has shut down.
            let _ = sender.send(event);
        });
    }

    pub fn login(&self, username: String, password: String) {
        self.spawn("login", move |backend| {
            SyncEvent::LoggedIn(backend.login(&username, &password))
        });
    }

    pub fn register(&self, username: String, password: String, email: String) {
        self.spawn("register", move |backend| {
            SyncEvent::Registered(backend.register(&username, &password, &email))
        });
    }

    pub fn register_email(&self, code: String, email: String, name: String) {
        self.spawn("register-email", move |backend| {
            let result = backend
                .verify_registration_code(&code)
                .map_err(|err| match err {
                    ApiError::Unauthorized => {
                        ApiError::Validation("Invalid registration code".to_string())
                    }
                    other => other,
                })
                .and_then(|()| backend.register_email(&email, &name));
            SyncEvent::EmailRegistered { email, result }
        });
    }

    pub fn verify_code(&self, code: String) {
        self.spawn("verify-code", move |backend| {
            SyncEvent::CodeVerified(backend.verify_registration_code(&code))
        });
    }

    pub fn save(
        &self,
        token: String,
        id: String,
        remote_id: String,
        name: String,
        content: String,
    ) {
        self.spawn("save", move |backend| {
            let result = backend.save_buffer(&token, &remote_id, &name, &content);
            SyncEvent::Saved { id, result }
        });
    }

    pub fn delete(&self, token: String, id: String) {
        self.spawn("delete", move |backend| {
            let result = backend.delete_buffer(&token, &id);
            SyncEvent::Deleted { id, result }
        });
    }

    pub fn pull(&self, known: Vec<String>) {
        self.spawn("pull", move |backend| {
            SyncEvent::Pulled(fetch_unknown(backend, &known))
        });
    }

    pub fn try_recv_all(&self) -> Vec<SyncEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    #[cfg(test)]
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<SyncEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

fn fetch_unknown(backend: &dyn Backend, known: &[String]) -> Result<Vec<RemoteBuffer>, ApiError> {
    let summaries = backend.list_buffers()?;
    let mut fetched = Vec::new();
    for summary in summaries {
        if is_builtin(&summary.id) || known.iter().any(|id| id == &summary.id) {
            continue;
        }
        match backend.get_buffer(&summary.id) {
            Ok(buffer) => fetched.push(buffer),
            Err(err) => tracing::warn!("Skipping remote buffer {}: {err}", summary.id),
        }
    }
    Ok(fetched)
}
