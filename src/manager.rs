use crate::buffer::{
    builtin_buffers, is_builtin, Buffer, Freshness, Origin, ViewedLedger, DEFAULT_BUFFER,
    SCRATCH_ID,
};
use crate::edit::EditSession;
use crate::fold::{has_headings, Outline};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("Buffer name cannot be empty")]
    EmptyName,
    #[error("Buffer '{0}' already exists")]
    Duplicate(String),
    #[error("No buffer '{0}'")]
    UnknownBuffer(String),
    #[error("{0} is read-only")]
    ReadOnly(String),
    #[error("Only {0} can edit this buffer")]
    NotOwner(String),
    #[error("Already editing")]
    AlreadyEditing,
    #[error("Not editing")]
    NotEditing,
    #[error("Cannot delete {0}")]
    Undeletable(String),
    #[error("Exit edit mode first (C-s to save, Esc to discard)")]
    EditInProgress,
    #[error("Login required")]
    LoginRequired,
}

#[derive(Debug, Clone, Default)]
pub enum EditState {
    #[default]
    Navigating,
    Editing(EditSession),
}

pub struct BufferManager {
    buffers: Vec<Buffer>,
    active: usize,
    edit: EditState,
    viewed: ViewedLedger,
    outline: Outline,
}

impl BufferManager {
    pub fn new(users: Vec<Buffer>, scratch: Option<&str>, viewed: ViewedLedger) -> Self {
        let mut buffers = builtin_buffers(scratch);
        for buffer in users {
            if buffers.iter().any(|b| b.id == buffer.id) {
                tracing::warn!("Ignoring duplicate buffer id {}", buffer.id);
                continue;
            }
            buffers.push(buffer);
        }
        let active = buffers
            .iter()
            .position(|b| b.id == DEFAULT_BUFFER)
            .unwrap_or(0);
        let mut manager = Self {
            buffers,
            active,
            edit: EditState::Navigating,
            viewed,
            outline: Outline::default(),
        };
        manager.rebuild_outline();
        manager
    }

    pub fn list(&self) -> &[Buffer] {
        &self.buffers
    }

    pub fn get(&self, id: &str) -> Option<&Buffer> {
        self.buffers.iter().find(|b| b.id == id)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.buffers.iter().position(|b| b.id == id)
    }

    pub fn active(&self) -> &Buffer {
        &self.buffers[self.active]
    }

    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn user_buffers(&self) -> Vec<Buffer> {
        self.buffers
            .iter()
            .filter(|b| b.origin == Origin::User)
            .cloned()
            .collect()
    }

    pub fn scratch_content(&self) -> Option<String> {
        self.get(SCRATCH_ID).map(|b| b.content.clone())
    }

    pub fn viewed(&self) -> &ViewedLedger {
        &self.viewed
    }

    pub fn classify(&self, buffer: &Buffer, last_visit: Option<DateTime<Utc>>) -> Freshness {
        self.viewed.classify(buffer, last_visit)
    }

    pub fn outline(&self) -> &Outline {
        &self.outline
    }

    pub fn outline_mut(&mut self) -> &mut Outline {
        &mut self.outline
    }

    fn rebuild_outline(&mut self) {
        let content = &self.buffers[self.active].content;
        self.outline = if has_headings(content) {
            Outline::from_content(content)
        } else {
            Outline::default()
        };
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.edit, EditState::Editing(_))
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        match &self.edit {
            EditState::Editing(session) => Some(session),
            EditState::Navigating => None,
        }
    }

    pub fn edit_session_mut(&mut self) -> Option<&mut EditSession> {
        match &mut self.edit {
            EditState::Editing(session) => Some(session),
            EditState::Navigating => None,
        }
    }

    pub fn create(
        &mut self,
        name: &str,
        author: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<String, Rejection> {
        if name.trim().is_empty() {
            return Err(Rejection::EmptyName);
        }
        let buffer = Buffer::user(name, author, now);
        if self.get(&buffer.id).is_some() {
            return Err(Rejection::Duplicate(buffer.id));
        }
        let id = buffer.id.clone();
        tracing::info!("Created buffer {id}");
        self.buffers.push(buffer);
        Ok(id)
    }

    // Unsaved edits are dropped without asking.
    pub fn switch_to(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), Rejection> {
        let idx = self
            .position(id)
            .ok_or_else(|| Rejection::UnknownBuffer(id.to_string()))?;
        self.discard_edit();
        self.active = idx;
        self.viewed.mark(id, now);
        self.rebuild_outline();
        tracing::debug!("Switched to buffer {id}");
        Ok(())
    }

    pub fn next_buffer(&mut self, now: DateTime<Utc>) {
        let idx = (self.active + 1) % self.buffers.len();
        let id = self.buffers[idx].id.clone();
        let _ = self.switch_to(&id, now);
    }

    pub fn previous_buffer(&mut self, now: DateTime<Utc>) {
        let idx = self
            .active
            .checked_sub(1)
            .unwrap_or(self.buffers.len() - 1);
        let id = self.buffers[idx].id.clone();
        let _ = self.switch_to(&id, now);
    }

    pub fn enter_edit(&mut self, user: Option<&str>) -> Result<(), Rejection> {
        if self.is_editing() {
            return Err(Rejection::AlreadyEditing);
        }
        let buffer = self.active();
        if !buffer.origin.is_editable() {
            return Err(Rejection::ReadOnly(buffer.display_name()));
        }
        if let Some(author) = buffer.author.as_deref() {
            if user != Some(author) {
                return Err(Rejection::NotOwner(author.to_string()));
            }
        }
        let session = EditSession::new(&buffer.id, &buffer.content);
        tracing::debug!("Editing buffer {}", buffer.id);
        self.edit = EditState::Editing(session);
        Ok(())
    }

    pub fn exit_edit(&mut self, save: bool, now: DateTime<Utc>) -> Result<Option<Buffer>, Rejection> {
        let session = match std::mem::take(&mut self.edit) {
            EditState::Editing(session) => session,
            EditState::Navigating => return Err(Rejection::NotEditing),
        };
        if !save {
            tracing::debug!("Discarded edits to {}", session.buffer_id);
            return Ok(None);
        }
        // The buffer may have been replaced while editing.
        let Some(idx) = self.position(&session.buffer_id) else {
            return Ok(None);
        };
        let buffer = &mut self.buffers[idx];
        buffer.content = session.text();
        buffer.updated_at = now;
        let saved = buffer.clone();
        self.viewed.mark(&saved.id, now);
        if idx == self.active {
            self.rebuild_outline();
        }
        tracing::info!("Saved buffer {}", saved.id);
        Ok(Some(saved))
    }

    fn discard_edit(&mut self) {
        if let EditState::Editing(session) = std::mem::take(&mut self.edit) {
            if session.is_dirty() {
                tracing::debug!("Dropping unsaved edits to {}", session.buffer_id);
            }
        }
    }

    pub fn check_deletable(&self, id: &str) -> Result<&Buffer, Rejection> {
        let buffer = self
            .get(id)
            .ok_or_else(|| Rejection::UnknownBuffer(id.to_string()))?;
        if !buffer.origin.is_deletable() {
            return Err(Rejection::Undeletable(buffer.display_name()));
        }
        Ok(buffer)
    }

    pub fn delete(&mut self, id: &str, now: DateTime<Utc>) -> Result<Buffer, Rejection> {
        self.check_deletable(id)?;
        let idx = self
            .position(id)
            .ok_or_else(|| Rejection::UnknownBuffer(id.to_string()))?;
        let was_active = idx == self.active;
        if self.edit_session().map(|s| s.buffer_id == id).unwrap_or(false) {
            self.discard_edit();
        }
        let removed = self.buffers.remove(idx);
        self.viewed.forget(id);
        if was_active {
            self.active = 0;
            let _ = self.switch_to(DEFAULT_BUFFER, now);
        } else if idx < self.active {
            self.active -= 1;
        }
        tracing::info!("Deleted buffer {id}");
        Ok(removed)
    }

    pub fn clear_scratch(&mut self, now: DateTime<Utc>) {
        if self.edit_session().map(|s| s.buffer_id == SCRATCH_ID).unwrap_or(false) {
            self.discard_edit();
        }
        let Some(idx) = self.position(SCRATCH_ID) else {
            return;
        };
        self.buffers[idx].content.clear();
        self.buffers[idx].updated_at = now;
        if idx == self.active {
            self.rebuild_outline();
        }
    }

    pub fn set_remote_id(&mut self, id: &str, remote_id: String) -> bool {
        let Some(idx) = self.position(id) else {
            return false;
        };
        let buffer = &mut self.buffers[idx];
        if buffer.remote_key() == remote_id {
            return false;
        }
        tracing::info!("Buffer {id} is filed remotely as {remote_id}");
        buffer.remote_id = Some(remote_id);
        true
    }

    pub fn upsert_remote(&mut self, buffer: Buffer) -> bool {
        let known = self
            .buffers
            .iter()
            .any(|b| b.id == buffer.id || b.remote_key() == buffer.id);
        if is_builtin(&buffer.id) || known {
            return false;
        }
        tracing::debug!("Pulled remote buffer {}", buffer.id);
        self.buffers.push(buffer);
        true
    }
}
