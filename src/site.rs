use crate::api::{ApiError, Backend, RemoteBuffer, SaveOutcome};
use crate::buffer::{Buffer, Freshness, Origin, ViewedLedger, BUILTINS, DEFAULT_BUFFER};
use crate::commands;
use crate::completion::{Candidate, Completion};
use crate::config::Config;
use crate::edit::EditSession;
use crate::fold::VisibleLine;
use crate::keymap::{self, FollowUp, PendingChord};
use crate::manager::{BufferManager, Rejection};
use crate::minibuffer::{
    parse_yes_no, Answer, ConfirmAction, Continuation, Minibuffer, Palette, Pick, Source,
    TextPrompt, REPROMPT_DELAY,
};
use crate::registry::CommandRegistry;
use crate::store::{Session, Store, StoredState, STATE_VERSION};
use crate::sync::{SyncBridge, SyncEvent};
use crate::usage::UsageLedger;
use crate::workflow::{
    Ask, Credentials, EmailRegistration, LoginFlow, RegisterEmailFlow, RegisterFlow,
    Registration, Step,
};
use chrono::{DateTime, Utc};
use crossterm::event::KeyEvent;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    Sidebar { selected: usize },
    Help,
}

#[derive(Debug, Clone)]
struct Message {
    text: String,
    expires_at: Instant,
}

#[derive(Debug, Clone, Default)]
struct Search {
    query: String,
    lines: Vec<usize>,
    current: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewLine {
    pub source: usize,
    pub text: String,
    pub heading_level: Option<usize>,
    pub folded: bool,
    pub is_match: bool,
}

pub struct Site {
    config: Config,
    registry: CommandRegistry,
    minibuffer: Minibuffer,
    manager: BufferManager,
    overlay: Overlay,
    usage: UsageLedger,
    session: Option<Session>,
    store: Box<dyn Store>,
    sync: Option<SyncBridge>,
    message: Option<Message>,
    reprompt: Option<(Instant, TextPrompt)>,
    pending_chord: Option<PendingChord>,
    scroll: usize,
    view_height: usize,
    search: Search,
    last_visit: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    // Never written over until a load succeeds.
    load_failed: bool,
    now: Instant,
    quit: bool,
}

impl Site {
    pub fn new(config: Config, store: Box<dyn Store>, backend: Option<Arc<dyn Backend>>) -> Self {
        let mut site = Self {
            config,
            registry: commands::builtin_registry(),
            minibuffer: Minibuffer::Closed,
            manager: BufferManager::new(Vec::new(), None, ViewedLedger::default()),
            overlay: Overlay::None,
            usage: UsageLedger::default(),
            session: None,
            store,
            sync: backend.map(SyncBridge::new),
            message: None,
            reprompt: None,
            pending_chord: None,
            scroll: 0,
            view_height: 20,
            search: Search::default(),
            last_visit: None,
            started_at: Utc::now(),
            load_failed: false,
            now: Instant::now(),
            quit: false,
        };
        site.load_state(true);
        if site.config.show_sidebar && site.is_authenticated() {
            site.overlay = Overlay::Sidebar {
                selected: site.manager.active_index(),
            };
        }
        site.pull_remote();
        site
    }

    fn load_state(&mut self, initial: bool) {
        let loaded = self.store.load();
        self.load_failed = loaded.is_err();
        let mut state = match loaded {
            Ok(Some(state)) => state,
            Ok(None) => StoredState::default(),
            Err(err) => {
                tracing::warn!("Failed to load state from {}: {err}", self.store.describe());
                self.set_message(format!(
                    "Could not load saved state ({err}); changes will not be saved"
                ));
                StoredState::default()
            }
        };
        let report = state.migrate(self.registry.names());
        tracing::debug!(
            "Loaded state from {}: {} commands, {} usage records, {report:?}",
            self.store.describe(),
            self.registry.len(),
            state.usage.len()
        );

        if initial {
            self.last_visit = state.last_visit;
        }
        self.usage = state.usage;
        self.session = state.session;
        self.manager = BufferManager::new(state.buffers, state.scratch.as_deref(), state.viewed);
        let target = state
            .active
            .filter(|id| self.manager.get(id).is_some())
            .unwrap_or_else(|| DEFAULT_BUFFER.to_string());
        let _ = self.manager.switch_to(&target, Utc::now());
        self.reset_view();
        self.persist();
    }

    pub fn persist(&mut self) {
        if self.load_failed {
            tracing::debug!("Not saving over unreadable {}", self.store.describe());
            return;
        }
        let state = StoredState {
            version: STATE_VERSION,
            buffers: self.manager.user_buffers(),
            scratch: self.manager.scratch_content(),
            usage: self.usage.clone(),
            viewed: self.manager.viewed().clone(),
            last_visit: Some(self.started_at),
            session: self.session.clone(),
            active: Some(self.manager.active().id.clone()),
        };
        if let Err(err) = self.store.save(&state) {
            tracing::warn!("Failed to save state to {}: {err}", self.store.describe());
            self.set_message(format!("Could not save state: {err}"));
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn minibuffer(&self) -> &Minibuffer {
        &self.minibuffer
    }

    pub fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub fn manager(&self) -> &BufferManager {
        &self.manager
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_ref().map(|m| m.text.as_str())
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn is_authenticated(&self) -> bool {
        !self.config.require_auth || self.session.is_some()
    }

    pub fn is_editing(&self) -> bool {
        self.manager.is_editing()
    }

    pub fn edit_session(&self) -> Option<&EditSession> {
        self.manager.edit_session()
    }

    pub fn edit_session_mut(&mut self) -> Option<&mut EditSession> {
        self.manager.edit_session_mut()
    }

    pub fn view_height(&self) -> usize {
        self.view_height
    }

    pub fn set_view_height(&mut self, height: usize) {
        self.view_height = height.max(1);
    }

    pub fn tab_width(&self) -> usize {
        self.config.tab_width
    }

    pub fn current_heading(&self) -> Option<&str> {
        if !self.is_authenticated() {
            return None;
        }
        self.manager
            .outline()
            .heading_at_or_above(self.top_source())
            .map(|h| h.title.as_str())
    }

    pub fn search_status(&self) -> Option<(usize, usize)> {
        if self.search.lines.is_empty() {
            None
        } else {
            Some((self.search.current + 1, self.search.lines.len()))
        }
    }

    pub fn set_message(&mut self, text: impl Into<String>) {
        let text = text.into();
        tracing::debug!("Message: {text}");
        self.message = Some(Message {
            text,
            expires_at: self.now + Duration::from_millis(self.config.message_timeout_ms),
        });
    }

    pub fn clear_message(&mut self) {
        self.message = None;
    }

    fn reject(&mut self, rejection: Rejection) {
        tracing::debug!("Rejected: {rejection}");
        self.set_message(rejection.to_string());
    }

    pub fn handle_key(&mut self, key: KeyEvent) {
        self.handle_key_at(key, Instant::now());
    }

    pub fn handle_key_at(&mut self, key: KeyEvent, now: Instant) {
        self.now = now;
        keymap::dispatch(self, key, now);
    }

    pub fn tick(&mut self, now: Instant) {
        self.now = now;
        if self.message.as_ref().map(|m| now >= m.expires_at).unwrap_or(false) {
            self.message = None;
        }
        if self.pending_chord.map(|c| c.is_expired(now)).unwrap_or(false) {
            tracing::trace!("Chord expired");
            self.pending_chord = None;
        }
        let reprompt_due = self
            .reprompt
            .as_ref()
            .map(|(due, _)| now >= *due)
            .unwrap_or(false);
        if reprompt_due {
            if let Some((_, prompt)) = self.reprompt.take() {
                self.open_prompt(prompt);
            }
        }
        let events = match &self.sync {
            Some(sync) => sync.try_recv_all(),
            None => Vec::new(),
        };
        for event in events {
            self.handle_sync_event(event);
        }
    }

    pub fn execute(&mut self, name: &str) -> bool {
        let Some(command) = self.registry.find(name).copied() else {
            self.set_message(format!("Unknown command: {name}"));
            return false;
        };
        if !command.public && !self.is_authenticated() {
            self.reject(Rejection::LoginRequired);
            return false;
        }
        tracing::info!("Running command {name}");
        self.usage.record_invocation(command.name, Utc::now());
        (command.action)(self);
        self.persist();
        true
    }

    pub fn begin_chord(&mut self, prefix: &'static str, follow_ups: &'static [FollowUp]) {
        self.pending_chord = Some(PendingChord {
            prefix,
            follow_ups,
            deadline: self.now + Duration::from_millis(self.config.chord_timeout_ms),
        });
        self.set_message(format!("{prefix}-"));
    }

    pub fn take_pending_chord(&mut self) -> Option<PendingChord> {
        self.pending_chord.take()
    }

    // Minibuffer

    fn command_candidates(&self) -> Vec<Candidate<Pick>> {
        let authed = self.is_authenticated();
        let mut commands: Vec<_> = self
            .registry
            .list()
            .iter()
            .filter(|c| authed || c.public)
            .collect();
        self.usage.rank(&mut commands, |c| c.name, Utc::now());
        commands
            .into_iter()
            .map(|c| Candidate {
                key: c.name.to_string(),
                label: c.name.to_string(),
                description: c.description.to_string(),
                action: Pick::Command(c.name),
            })
            .collect()
    }

    fn buffer_candidates(&self, only_unseen: bool) -> Vec<Candidate<Pick>> {
        self.manager
            .list()
            .iter()
            .filter_map(|buffer| {
                let freshness = self.manager.classify(buffer, self.last_visit);
                if only_unseen && freshness == Freshness::Seen {
                    return None;
                }
                Some(Candidate {
                    key: buffer.id.clone(),
                    label: format!("{} {}", freshness.marker(), buffer.display_name()),
                    description: buffer_description(buffer),
                    action: Pick::Buffer(buffer.id.clone()),
                })
            })
            .collect()
    }

    pub fn open_command_palette(&mut self) {
        if self.is_editing() {
            self.reject(Rejection::EditInProgress);
            return;
        }
        let completion = Completion::new(self.command_candidates());
        self.open_palette(Source::Commands, completion);
    }

    pub fn open_buffer_palette(&mut self, only_unseen: bool) {
        if self.is_editing() {
            self.reject(Rejection::EditInProgress);
            return;
        }
        let candidates = self.buffer_candidates(only_unseen);
        if only_unseen && candidates.is_empty() {
            self.set_message("Nothing new");
            return;
        }
        self.open_palette(Source::Buffers, Completion::new(candidates));
    }

    fn open_palette(&mut self, source: Source, completion: Completion<Pick>) {
        tracing::debug!("Opened {source:?} palette");
        self.overlay = Overlay::None;
        self.reprompt = None;
        self.minibuffer = Minibuffer::Command(Palette { source, completion });
    }

    fn open_prompt(&mut self, prompt: TextPrompt) {
        if self.is_editing() {
            self.reject(Rejection::EditInProgress);
            return;
        }
        tracing::debug!("Prompting {:?}", prompt.prompt);
        self.overlay = Overlay::None;
        self.reprompt = None;
        self.minibuffer = Minibuffer::TextInput(prompt);
    }

    fn open_step(&mut self, ask: Ask, error: Option<&str>, continuation: Continuation) {
        if let Some(error) = error {
            self.set_message(error);
        }
        self.open_prompt(TextPrompt::from_ask(&ask, continuation));
    }

    pub fn cancel_minibuffer(&mut self) {
        if self.minibuffer.take().is_open() {
            tracing::debug!("Minibuffer cancelled");
        }
        self.reprompt = None;
    }

    fn rerank_palette(&mut self) {
        let is_commands = self
            .minibuffer
            .palette()
            .map(|p| p.source == Source::Commands)
            .unwrap_or(false);
        if !is_commands {
            return;
        }
        let candidates = self.command_candidates();
        if let Minibuffer::Command(palette) = &mut self.minibuffer {
            palette.completion.replace_candidates(candidates);
        }
    }

    pub fn minibuffer_insert(&mut self, c: char) {
        match &mut self.minibuffer {
            Minibuffer::Command(palette) => palette.completion.push_char(c),
            Minibuffer::TextInput(prompt) => {
                prompt.input.push(c);
                return;
            }
            Minibuffer::Closed => return,
        }
        self.rerank_palette();
    }

    pub fn minibuffer_backspace(&mut self) {
        match &mut self.minibuffer {
            Minibuffer::Command(palette) => palette.completion.pop_char(),
            Minibuffer::TextInput(prompt) => {
                prompt.input.pop();
                return;
            }
            Minibuffer::Closed => return,
        }
        self.rerank_palette();
    }

    pub fn minibuffer_select(&mut self, delta: isize) {
        if let Minibuffer::Command(palette) = &mut self.minibuffer {
            if delta < 0 {
                palette.completion.select_prev();
            } else {
                palette.completion.select_next();
            }
        }
    }

    pub fn minibuffer_complete(&mut self) {
        if let Minibuffer::Command(palette) = &mut self.minibuffer {
            palette.completion.complete();
        }
    }

    pub fn minibuffer_commit(&mut self) {
        match self.minibuffer.take() {
            Minibuffer::Command(palette) => match palette.completion.commit() {
                Some(Pick::Command(name)) => {
                    self.execute(name);
                }
                Some(Pick::Buffer(id)) => self.switch_buffer(&id),
                None => {
                    self.minibuffer = Minibuffer::Command(palette);
                    self.set_message("[No match]");
                }
            },
            Minibuffer::TextInput(prompt) => self.submit_prompt(prompt),
            Minibuffer::Closed => {}
        }
    }

    fn submit_prompt(&mut self, prompt: TextPrompt) {
        let TextPrompt {
            prompt: question,
            input,
            continuation,
            ..
        } = prompt;
        match continuation {
            Continuation::CreateBuffer => self.create_buffer(&input),
            Continuation::Search => self.run_search(&input),
            Continuation::Confirm(action) => match parse_yes_no(&input) {
                Answer::Yes => self.confirm(action),
                Answer::No => self.set_message("Cancelled"),
                Answer::Invalid => {
                    self.set_message("Please answer yes or no");
                    let again = TextPrompt::new(question, Continuation::Confirm(action));
                    self.reprompt = Some((self.now + REPROMPT_DELAY, again));
                }
            },
            Continuation::Login(flow) => match flow.advance(&input) {
                Step::Next { flow, ask, error } => {
                    self.open_step(ask, error, Continuation::Login(flow))
                }
                Step::Done(credentials) => self.submit_login(credentials),
            },
            Continuation::Register(flow) => match flow.advance(&input) {
                Step::Next { flow, ask, error } => {
                    self.open_step(ask, error, Continuation::Register(flow))
                }
                Step::Done(registration) => self.submit_registration(registration),
            },
            Continuation::RegisterEmail(flow) => match flow.advance(&input) {
                Step::Next { flow, ask, error } => {
                    self.open_step(ask, error, Continuation::RegisterEmail(flow))
                }
                Step::Done(registration) => self.submit_email_registration(registration),
            },
            Continuation::VerifyCode => {
                let code = input.trim().to_string();
                if code.is_empty() {
                    self.set_message("Registration code required");
                    return;
                }
                if let Some(sync) = &self.sync {
                    sync.verify_code(code);
                    self.set_message("Checking code...");
                } else {
                    self.set_message("No backend configured");
                }
            }
        }
    }

    fn confirm(&mut self, action: ConfirmAction) {
        let now = Utc::now();
        match action {
            ConfirmAction::DeleteBuffer(id) => match self.manager.delete(&id, now) {
                Ok(removed) => {
                    self.reset_view();
                    self.persist();
                    self.set_message(format!("Deleted {}", removed.display_name()));
                    if let (Some(session), Some(sync)) = (&self.session, &self.sync) {
                        if removed.origin.syncs() {
                            sync.delete(session.token.clone(), removed.remote_key().to_string());
                        }
                    }
                }
                Err(rejection) => self.reject(rejection),
            },
            ConfirmAction::ClearScratch => {
                self.manager.clear_scratch(now);
                self.reset_view();
                self.persist();
                self.set_message("*scratch* cleared");
            }
        }
    }

    // Buffers

    pub fn switch_buffer(&mut self, id: &str) {
        match self.manager.switch_to(id, Utc::now()) {
            Ok(()) => {
                self.reset_view();
                self.persist();
                let name = self.manager.active().display_name();
                self.set_message(format!("Switched to {name}"));
            }
            Err(rejection) => self.reject(rejection),
        }
    }

    pub fn next_buffer(&mut self) {
        self.manager.next_buffer(Utc::now());
        self.reset_view();
        self.persist();
    }

    pub fn previous_buffer(&mut self) {
        self.manager.previous_buffer(Utc::now());
        self.reset_view();
        self.persist();
    }

    pub fn prompt_create_buffer(&mut self) {
        self.open_prompt(TextPrompt::new("Buffer name: ", Continuation::CreateBuffer));
    }

    fn create_buffer(&mut self, name: &str) {
        let author = self.session.as_ref().map(|s| s.username.clone());
        let id = match self.manager.create(name, author, Utc::now()) {
            Ok(id) => id,
            Err(rejection) => {
                self.reject(rejection);
                return;
            }
        };
        let _ = self.manager.switch_to(&id, Utc::now());
        self.reset_view();
        self.persist();
        let buffer = self.manager.active().clone();
        self.set_message(format!("Created {}", buffer.display_name()));
        if let (Some(session), Some(sync)) = (&self.session, &self.sync) {
            let remote_id = buffer.remote_key().to_string();
            sync.save(
                session.token.clone(),
                buffer.id,
                remote_id,
                buffer.name,
                buffer.content,
            );
        }
    }

    pub fn edit_buffer(&mut self) {
        let user = self.session.as_ref().map(|s| s.username.clone());
        match self.manager.enter_edit(user.as_deref()) {
            Ok(()) => {
                self.search = Search::default();
                let name = self.manager.active().display_name();
                self.set_message(format!("Editing {name} (C-s to save, Esc to discard)"));
            }
            Err(rejection) => self.reject(rejection),
        }
    }

    pub fn save_edit(&mut self) {
        match self.manager.exit_edit(true, Utc::now()) {
            Ok(Some(buffer)) => {
                self.clamp_scroll();
                self.persist();
                self.sync_saved(buffer);
            }
            Ok(None) => self.set_message("Buffer no longer exists"),
            Err(rejection) => self.reject(rejection),
        }
    }

    pub fn discard_edit(&mut self) {
        match self.manager.exit_edit(false, Utc::now()) {
            Ok(_) => self.set_message("Changes discarded"),
            Err(rejection) => self.reject(rejection),
        }
    }

    fn sync_saved(&mut self, buffer: Buffer) {
        if !buffer.origin.syncs() {
            self.set_message(format!("Saved {}", buffer.display_name()));
            return;
        }
        match (&self.session, &self.sync) {
            (Some(session), Some(sync)) => {
                let remote_id = buffer.remote_key().to_string();
                sync.save(
                    session.token.clone(),
                    buffer.id,
                    remote_id,
                    buffer.name,
                    buffer.content,
                );
                self.set_message("Saving...");
            }
            (None, _) => self.set_message("Saved locally only (not logged in)"),
            (_, None) => self.set_message("Saved locally only (no backend configured)"),
        }
    }

    pub fn prompt_delete_buffer(&mut self) {
        let id = self.manager.active().id.clone();
        let question = match self.manager.check_deletable(&id) {
            Ok(buffer) => format!("Delete buffer {}? (yes/no) ", buffer.display_name()),
            Err(rejection) => {
                self.reject(rejection);
                return;
            }
        };
        self.open_prompt(TextPrompt::new(
            question,
            Continuation::Confirm(ConfirmAction::DeleteBuffer(id)),
        ));
    }

    pub fn prompt_clear_scratch(&mut self) {
        self.open_prompt(TextPrompt::new(
            "Clear *scratch*? (yes/no) ",
            Continuation::Confirm(ConfirmAction::ClearScratch),
        ));
    }

    pub fn reload(&mut self) {
        self.minibuffer = Minibuffer::Closed;
        self.overlay = Overlay::None;
        self.reprompt = None;
        self.load_state(false);
        if !self.load_failed {
            self.set_message("Reloaded");
        }
    }

    pub fn quit(&mut self) {
        self.quit = true;
    }

    // Overlays

    pub fn toggle_sidebar(&mut self) {
        self.overlay = match self.overlay {
            Overlay::Sidebar { .. } => Overlay::None,
            _ => Overlay::Sidebar {
                selected: self.manager.active_index(),
            },
        };
    }

    pub fn show_help(&mut self) {
        self.overlay = Overlay::Help;
    }

    pub fn close_overlay(&mut self) {
        self.overlay = Overlay::None;
    }

    pub fn sidebar_rows(&self) -> Vec<String> {
        self.manager
            .list()
            .iter()
            .map(|buffer| {
                let freshness = self.manager.classify(buffer, self.last_visit);
                format!("{} {}", freshness.marker(), buffer.display_name())
            })
            .collect()
    }

    pub fn sidebar_move(&mut self, delta: isize) {
        let last = self.manager.list().len().saturating_sub(1);
        if let Overlay::Sidebar { selected } = &mut self.overlay {
            *selected = selected.saturating_add_signed(delta).min(last);
        }
    }

    pub fn sidebar_select(&mut self) {
        let Overlay::Sidebar { selected } = self.overlay else {
            return;
        };
        let Some(id) = self.manager.list().get(selected).map(|b| b.id.clone()) else {
            return;
        };
        self.overlay = Overlay::None;
        self.switch_buffer(&id);
    }

    // View

    fn rows(&self) -> Vec<VisibleLine> {
        let outline = self.manager.outline();
        if outline.is_empty() {
            (0..self.manager.active().content.lines().count())
                .map(|source| VisibleLine {
                    source,
                    folded: false,
                })
                .collect()
        } else {
            outline.visible_lines()
        }
    }

    pub fn visible_content(&self) -> Option<Vec<ViewLine>> {
        if !self.is_authenticated() {
            return None;
        }
        let lines: Vec<&str> = self.manager.active().content.lines().collect();
        let headings = self.manager.outline().headings();
        let rows = self
            .rows()
            .into_iter()
            .map(|row| ViewLine {
                source: row.source,
                text: lines.get(row.source).copied().unwrap_or("").to_string(),
                heading_level: headings
                    .iter()
                    .find(|h| h.line == row.source)
                    .map(|h| h.level),
                folded: row.folded,
                is_match: self.search.lines.contains(&row.source),
            })
            .collect();
        Some(rows)
    }

    fn reset_view(&mut self) {
        self.scroll = 0;
        self.search = Search::default();
    }

    fn clamp_scroll(&mut self) {
        let last = self.rows().len().saturating_sub(1);
        self.scroll = self.scroll.min(last);
    }

    fn row_of(&self, source: usize) -> Option<usize> {
        self.rows().iter().position(|r| r.source == source)
    }

    fn top_source(&self) -> usize {
        self.rows()
            .get(self.scroll)
            .map(|r| r.source)
            .unwrap_or(0)
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(delta);
        self.clamp_scroll();
    }

    pub fn page(&mut self, direction: isize) {
        self.scroll_by(direction * self.view_height as isize);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.scroll = self.rows().len().saturating_sub(self.view_height);
    }

    pub fn jump_heading(&mut self, delta: isize) {
        let headings: Vec<usize> = self.manager.outline().headings().iter().map(|h| h.line).collect();
        let rows = self.rows();
        let is_heading = |idx: &usize| headings.contains(&rows[*idx].source);
        let target = if delta < 0 {
            (0..self.scroll).rev().find(is_heading)
        } else {
            (self.scroll + 1..rows.len()).find(is_heading)
        };
        if let Some(row) = target {
            self.scroll = row;
        }
    }

    pub fn toggle_fold(&mut self) {
        let top = self.top_source();
        let Some(line) = self.manager.outline().heading_at_or_above(top).map(|h| h.line) else {
            self.set_message("No heading here");
            return;
        };
        self.manager.outline_mut().toggle(line);
        self.scroll = self.row_of(line).unwrap_or(0);
    }

    pub fn toggle_fold_all(&mut self) {
        if self.manager.outline().any_folded() {
            self.unfold_all();
        } else {
            self.fold_all();
        }
    }

    pub fn fold_all(&mut self) {
        if self.manager.outline().is_empty() {
            self.set_message("No headings");
            return;
        }
        let anchor = self
            .manager
            .outline()
            .heading_at_or_above(self.top_source())
            .map(|h| h.line);
        self.manager.outline_mut().fold_all();
        self.scroll = anchor.and_then(|line| self.row_of(line)).unwrap_or(0);
    }

    pub fn unfold_all(&mut self) {
        let top = self.top_source();
        self.manager.outline_mut().unfold_all();
        self.scroll = self.row_of(top).unwrap_or(0);
    }

    pub fn prompt_search(&mut self) {
        let last = self.search.query.clone();
        self.open_prompt(TextPrompt::new("Search: ", Continuation::Search).with_default(&last));
    }

    fn run_search(&mut self, query: &str) {
        let needle = query.trim().to_lowercase();
        self.search = Search::default();
        if needle.is_empty() {
            return;
        }
        let content = &self.manager.active().content;
        let visible: Vec<usize> = self.rows().iter().map(|r| r.source).collect();
        let lines: Vec<usize> = content
            .lines()
            .enumerate()
            .filter(|(idx, line)| visible.contains(idx) && line.to_lowercase().contains(&needle))
            .map(|(idx, _)| idx)
            .collect();
        if lines.is_empty() {
            self.set_message("No matches");
            return;
        }
        let total = lines.len();
        self.search = Search {
            query: needle,
            lines,
            current: 0,
        };
        self.scroll_to_match();
        self.set_message(format!("Match 1/{total} for \"{}\"", self.search.query));
    }

    pub fn jump_match(&mut self, delta: isize) {
        let total = self.search.lines.len();
        if total == 0 {
            self.set_message("No matches");
            return;
        }
        let idx = self.search.current as isize + delta;
        self.search.current = idx.rem_euclid(total as isize) as usize;
        self.scroll_to_match();
        self.set_message(format!("Match {}/{total}", self.search.current + 1));
    }

    fn scroll_to_match(&mut self) {
        if let Some(&line) = self.search.lines.get(self.search.current) {
            if let Some(row) = self.row_of(line) {
                self.scroll = row;
            }
        }
    }

    // Accounts and sync

    fn start_flow(&mut self, ask: Ask, continuation: Continuation) {
        if self.sync.is_none() {
            self.set_message("No backend configured");
            return;
        }
        self.open_prompt(TextPrompt::from_ask(&ask, continuation));
    }

    pub fn login(&mut self) {
        let (flow, ask) = LoginFlow::start();
        self.start_flow(ask, Continuation::Login(flow));
    }

    pub fn register(&mut self) {
        let (flow, ask) = RegisterFlow::start();
        self.start_flow(ask, Continuation::Register(flow));
    }

    pub fn register_email(&mut self) {
        let (flow, ask) = RegisterEmailFlow::start();
        self.start_flow(ask, Continuation::RegisterEmail(flow));
    }

    pub fn verify_code(&mut self) {
        let ask = Ask {
            prompt: "Registration code: ",
            masked: true,
        };
        self.start_flow(ask, Continuation::VerifyCode);
    }

    pub fn logout(&mut self) {
        if self.is_editing() {
            let _ = self.manager.exit_edit(false, Utc::now());
        }
        self.session = None;
        self.overlay = Overlay::None;
        self.minibuffer = Minibuffer::Closed;
        self.reset_view();
        self.persist();
        tracing::info!("Logged out");
        self.set_message("Logged out");
    }

    pub fn sync_buffers(&mut self) {
        if self.sync.is_none() {
            self.set_message("No backend configured");
            return;
        }
        if self.session.is_none() {
            self.reject(Rejection::LoginRequired);
            return;
        }
        self.pull_remote();
        self.set_message("Fetching buffers...");
    }

    fn pull_remote(&mut self) {
        if let (Some(_), Some(sync)) = (&self.session, &self.sync) {
            let known = self
                .manager
                .list()
                .iter()
                .flat_map(|b| [b.id.clone(), b.remote_key().to_string()])
                .collect();
            sync.pull(known);
        }
    }

    fn submit_login(&mut self, credentials: Credentials) {
        if let Some(sync) = &self.sync {
            sync.login(credentials.username, credentials.password);
            self.set_message("Logging in...");
        }
    }

    fn submit_registration(&mut self, registration: Registration) {
        if let Some(sync) = &self.sync {
            sync.register(registration.username, registration.password, registration.email);
            self.set_message("Registering...");
        }
    }

    fn submit_email_registration(&mut self, registration: EmailRegistration) {
        if let Some(sync) = &self.sync {
            sync.register_email(registration.code, registration.email, registration.name);
            self.set_message("Registering...");
        }
    }

    fn expire_session(&mut self) {
        tracing::info!("Session rejected by server");
        if self.is_editing() {
            let _ = self.manager.exit_edit(false, Utc::now());
        }
        self.session = None;
        self.overlay = Overlay::None;
        self.persist();
        self.set_message("Session expired, please log in");
    }

    fn start_session(&mut self, token: String, username: String, greeting: String) {
        tracing::info!("Session started for {username}");
        self.set_message(greeting);
        self.session = Some(Session { token, username });
        self.persist();
        self.pull_remote();
    }

    pub fn handle_sync_event(&mut self, event: SyncEvent) {
        tracing::debug!("Sync event: {event:?}");
        match event {
            SyncEvent::LoggedIn(Ok(auth)) => {
                let greeting = format!("Logged in as {}", auth.username);
                self.start_session(auth.token, auth.username, greeting)
            }
            SyncEvent::Registered(Ok(auth)) => {
                let greeting = format!("Registered as {}", auth.username);
                self.start_session(auth.token, auth.username, greeting)
            }
            SyncEvent::LoggedIn(Err(ApiError::Unauthorized)) => {
                self.set_message("Invalid username or password")
            }
            SyncEvent::LoggedIn(Err(err)) => self.set_message(format!("Login failed: {err}")),
            SyncEvent::Registered(Err(ApiError::Conflict)) => {
                self.set_message("Username already taken")
            }
            SyncEvent::Registered(Err(err)) => {
                self.set_message(format!("Registration failed: {err}"))
            }
            SyncEvent::EmailRegistered { email, result } => match result {
                Ok(_) => self.set_message(format!("Password sent to {email}")),
                Err(ApiError::Conflict) => self.set_message("Email already registered"),
                Err(err) => self.set_message(format!("Registration failed: {err}")),
            },
            SyncEvent::CodeVerified(Ok(())) => {
                self.set_message("Code accepted, use register-email to continue")
            }
            SyncEvent::CodeVerified(Err(ApiError::Unauthorized)) => {
                self.set_message("Invalid registration code")
            }
            SyncEvent::CodeVerified(Err(err)) => {
                self.set_message(format!("Could not check code: {err}"))
            }
            SyncEvent::Saved { id, result: Ok(_) } if self.manager.get(&id).is_none() => {
                tracing::debug!("Dropping save result for deleted buffer {id}");
            }
            SyncEvent::Saved { id, result } => match result {
                Ok(SaveOutcome::Updated) => {
                    tracing::info!("Synced {id}");
                    self.set_message("Saved");
                }
                Ok(SaveOutcome::Created(remote_id)) => {
                    tracing::info!("Published {id} as {remote_id}");
                    if self.manager.set_remote_id(&id, remote_id) {
                        self.persist();
                    }
                    self.set_message("Saved and published");
                }
                Err(ApiError::Unauthorized) => self.expire_session(),
                Err(err) => {
                    tracing::warn!("Sync of {id} failed: {err}");
                    self.set_message(format!("Saved locally only ({err})"));
                }
            },
            SyncEvent::Deleted { id, result } => match result {
                Ok(()) | Err(ApiError::NotFound) => tracing::debug!("Remote copy of {id} gone"),
                Err(ApiError::Unauthorized) => self.expire_session(),
                Err(err) => {
                    tracing::warn!("Remote delete of {id} failed: {err}");
                    self.set_message(format!("Deleted locally only ({err})"));
                }
            },
            SyncEvent::Pulled(Ok(remote)) => {
                let now = Utc::now();
                let mut added = 0;
                for buffer in remote {
                    if self.manager.upsert_remote(remote_buffer(buffer, now)) {
                        added += 1;
                    }
                }
                if added > 0 {
                    self.persist();
                    self.set_message(format!("Fetched {added} buffer(s)"));
                }
            }
            SyncEvent::Pulled(Err(err)) => {
                tracing::warn!("Fetching remote buffers failed: {err}");
                self.set_message(format!("Sync failed: {err}"));
            }
        }
    }

    #[cfg(test)]
    pub fn wait_for_sync(&mut self) -> bool {
        let event = self
            .sync
            .as_ref()
            .and_then(|sync| sync.recv_timeout(Duration::from_secs(5)));
        match event {
            Some(event) => {
                self.handle_sync_event(event);
                true
            }
            None => false,
        }
    }
}

fn buffer_description(buffer: &Buffer) -> String {
    match buffer.origin {
        Origin::User => match &buffer.author {
            Some(author) => format!("by {author}"),
            None => String::new(),
        },
        _ => BUILTINS
            .iter()
            .find(|b| b.id == buffer.id)
            .map(|b| b.description.to_string())
            .unwrap_or_default(),
    }
}

fn remote_buffer(remote: RemoteBuffer, now: DateTime<Utc>) -> Buffer {
    let created_at = remote.created_at.unwrap_or(now);
    Buffer {
        id: remote.id,
        name: remote.name,
        content: remote.content,
        origin: Origin::User,
        author: remote.created_by,
        created_at,
        updated_at: remote.updated_at.unwrap_or(created_at),
        remote_id: None,
    }
}
