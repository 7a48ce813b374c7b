use crate::api::{ApiError, AuthResponse, Backend, BufferSummary, RemoteBuffer};
use crate::config::Config;
use crate::minibuffer::Minibuffer;
use crate::site::{Overlay, Site};
use crate::store::{MemoryStore, Store};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use pretty_assertions::assert_eq;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Scripted {
    remote: Mutex<Vec<RemoteBuffer>>,
    saves: Mutex<Vec<(String, String)>>,
    save_error: Option<ApiError>,
}

// Per character, without collapsing runs.
fn server_id(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' })
        .collect()
}

impl Scripted {
    fn with_remote(id: &str, name: &str, content: &str) -> Self {
        let scripted = Self::default();
        scripted.remote.lock().unwrap().push(RemoteBuffer {
            id: id.to_string(),
            name: name.to_string(),
            content: content.to_string(),
            created_at: None,
            updated_at: None,
            created_by: Some("bea".to_string()),
        });
        scripted
    }

    fn failing_saves(error: ApiError) -> Self {
        Self {
            save_error: Some(error),
            ..Self::default()
        }
    }

    fn saves(&self) -> Vec<(String, String)> {
        self.saves.lock().unwrap().clone()
    }
}

impl Backend for Scripted {
    fn list_buffers(&self) -> Result<Vec<BufferSummary>, ApiError> {
        Ok(self
            .remote
            .lock()
            .unwrap()
            .iter()
            .map(|b| BufferSummary {
                id: b.id.clone(),
                name: b.name.clone(),
                created_at: None,
                updated_at: None,
                created_by: b.created_by.clone(),
            })
            .collect())
    }

    fn get_buffer(&self, id: &str) -> Result<RemoteBuffer, ApiError> {
        self.remote
            .lock()
            .unwrap()
            .iter()
            .find(|b| b.id == id)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    fn create_buffer(&self, _: &str, name: &str, content: &str) -> Result<String, ApiError> {
        if let Some(error) = &self.save_error {
            return Err(error.clone());
        }
        self.saves
            .lock()
            .unwrap()
            .push((name.to_string(), content.to_string()));
        Ok(server_id(name))
    }

    fn update_buffer(&self, _: &str, id: &str, content: &str) -> Result<(), ApiError> {
        let known = self
            .saves
            .lock()
            .unwrap()
            .iter()
            .any(|(name, _)| server_id(name) == id);
        if !known {
            return Err(ApiError::NotFound);
        }
        self.saves
            .lock()
            .unwrap()
            .push((id.to_string(), content.to_string()));
        Ok(())
    }

    fn delete_buffer(&self, _: &str, _: &str) -> Result<(), ApiError> {
        Ok(())
    }

    fn register(&self, username: &str, _: &str, _: &str) -> Result<AuthResponse, ApiError> {
        if username == "taken" {
            return Err(ApiError::Conflict);
        }
        Ok(AuthResponse {
            token: format!("token-{username}"),
            username: username.to_string(),
        })
    }

    fn register_email(&self, _: &str, name: &str) -> Result<String, ApiError> {
        Ok(name.to_lowercase())
    }

    fn verify_registration_code(&self, code: &str) -> Result<(), ApiError> {
        if code == "letmein" {
            Ok(())
        } else {
            Err(ApiError::Unauthorized)
        }
    }

    fn login(&self, username: &str, password: &str) -> Result<AuthResponse, ApiError> {
        if password != "correct horse" {
            return Err(ApiError::Unauthorized);
        }
        Ok(AuthResponse {
            token: format!("token-{username}"),
            username: username.to_string(),
        })
    }
}

struct Harness {
    site: Site,
    now: Instant,
}

impl Harness {
    fn open(config: Config, store: &MemoryStore, backend: Option<Arc<dyn Backend>>) -> Self {
        Self {
            site: Site::new(config, Box::new(store.clone()), backend),
            now: Instant::now(),
        }
    }

    // Timers and sync results only move on `advance` and `sync`.
    fn press(&mut self, key: KeyEvent) {
        self.site.handle_key_at(key, self.now);
    }

    fn key(&mut self, code: KeyCode) {
        self.press(KeyEvent::new(code, KeyModifiers::NONE));
    }

    fn ctrl(&mut self, c: char) {
        self.press(KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL));
    }

    fn alt(&mut self, c: char) {
        self.press(KeyEvent::new(KeyCode::Char(c), KeyModifiers::ALT));
    }

    fn type_str(&mut self, text: &str) {
        for c in text.chars() {
            self.key(KeyCode::Char(c));
        }
    }

    fn answer(&mut self, text: &str) {
        self.type_str(text);
        self.key(KeyCode::Enter);
    }

    fn run(&mut self, command: &str) {
        self.alt('x');
        self.answer(command);
    }

    fn advance(&mut self, ms: u64) {
        self.now += Duration::from_millis(ms);
        self.site.tick(self.now);
    }

    fn sync(&mut self) {
        assert!(self.site.wait_for_sync(), "expected a sync result");
    }

    fn active_id(&self) -> String {
        self.site.manager().active().id.clone()
    }

    fn palette_keys(&self) -> Vec<String> {
        self.site
            .minibuffer()
            .palette()
            .map(|p| p.completion.matches().map(|c| c.key.clone()).collect())
            .unwrap_or_default()
    }

    fn prompt(&self) -> Option<String> {
        self.site.minibuffer().prompt().map(|p| p.prompt.clone())
    }
}

const SIGNED_IN: &str = r#"{"version": 2, "session": {"token": "t", "username": "ana"}}"#;

fn open_site() -> Config {
    Config {
        require_auth: false,
        ..Config::default()
    }
}

fn login(h: &mut Harness, username: &str) {
    h.run("login");
    assert_eq!(h.prompt().as_deref(), Some("Username: "));
    h.answer(username);
    assert_eq!(h.prompt().as_deref(), Some("Password: "));
    assert!(h.site.minibuffer().prompt().unwrap().masked);
    h.answer("correct horse");
    assert_eq!(h.site.message(), Some("Logging in..."));
    h.sync();
    assert_eq!(h.site.session().map(|s| s.username.as_str()), Some(username));
}

#[test]
fn created_buffer_survives_reload() {
    let store = MemoryStore::new();
    let backend = Arc::new(Scripted::default());
    let mut h = Harness::open(
        Config::default(),
        &store,
        Some(backend.clone() as Arc<dyn Backend>),
    );
    login(&mut h, "ana");
    // Post-login pull finds nothing new.
    h.sync();

    h.ctrl('x');
    h.ctrl('f');
    assert_eq!(h.prompt().as_deref(), Some("Buffer name: "));
    h.answer("Notes For Later");
    assert_eq!(h.active_id(), "notes-for-later");
    assert_eq!(h.site.message(), Some("Created Notes For Later"));
    h.sync();

    h.key(KeyCode::Char('e'));
    assert!(h.site.is_editing());
    for _ in 0..3 {
        h.key(KeyCode::Down);
    }
    h.type_str("Remember the milk.");
    h.ctrl('s');
    assert!(!h.site.is_editing());
    assert_eq!(h.site.message(), Some("Saving..."));
    h.sync();
    assert_eq!(h.site.message(), Some("Saved"));

    let saved = h.site.manager().active().content.clone();
    assert!(saved.contains("Remember the milk."));
    assert_eq!(backend.saves().last().map(|(_, c)| c.clone()), Some(saved.clone()));

    let reopened = Harness::open(Config::default(), &store, None);
    assert_eq!(reopened.active_id(), "notes-for-later");
    assert_eq!(reopened.site.manager().active().content, saved);
    assert_eq!(
        reopened.site.manager().active().author.as_deref(),
        Some("ana")
    );
    assert!(reopened.site.is_authenticated());
}

#[test]
fn palette_filters_to_help_and_runs_it() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);

    h.alt('x');
    assert!(h.palette_keys().len() > 20);
    h.type_str("hel");
    let keys = h.palette_keys();
    assert!(keys.iter().all(|k| k.contains("hel")), "{keys:?}");
    assert_eq!(keys.first().map(String::as_str), Some("help"));

    h.key(KeyCode::Enter);
    assert!(!h.site.minibuffer().is_open());
    assert_eq!(*h.site.overlay(), Overlay::Help);

    // Any key closes help without acting.
    h.key(KeyCode::Char('j'));
    assert_eq!(*h.site.overlay(), Overlay::None);
}

#[test]
fn frequent_commands_rise_in_the_palette() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.run("contact");
    h.run("contact");
    assert_eq!(h.active_id(), "contact");

    h.alt('x');
    assert_eq!(h.palette_keys().first().map(String::as_str), Some("contact"));
    h.ctrl('g');
    assert!(!h.site.minibuffer().is_open());
}

#[test]
fn logged_out_site_reaches_no_content() {
    let store = MemoryStore::new();
    let mut h = Harness::open(Config::default(), &store, None);
    assert!(!h.site.is_authenticated());
    assert!(h.site.visible_content().is_none());

    h.alt('x');
    let keys = h.palette_keys();
    assert_eq!(
        keys,
        vec!["help", "login", "quit", "register", "register-email", "verify-code"]
    );
    h.ctrl('g');

    for chord in ['b', 'k'] {
        h.ctrl('x');
        h.key(KeyCode::Char(chord));
        assert_eq!(h.site.message(), Some("Login required"));
        assert!(!h.site.minibuffer().is_open());
    }
    h.ctrl('b');
    assert_eq!(*h.site.overlay(), Overlay::None);
    h.key(KeyCode::Char('l'));
    assert_eq!(h.active_id(), "home");
    assert!(h.site.visible_content().is_none());
}

#[test]
fn wrong_password_keeps_user_logged_out() {
    let store = MemoryStore::new();
    let backend: Arc<dyn Backend> = Arc::new(Scripted::default());
    let mut h = Harness::open(Config::default(), &store, Some(backend));
    h.run("login");
    h.answer("ana");
    h.answer("hunter22");
    h.sync();
    assert_eq!(h.site.message(), Some("Invalid username or password"));
    assert!(h.site.session().is_none());
}

#[test]
fn register_flow_validates_each_step() {
    let store = MemoryStore::new();
    let backend: Arc<dyn Backend> = Arc::new(Scripted::with_remote(
        "shared-notes",
        "Shared Notes",
        "* Shared\n",
    ));
    let mut h = Harness::open(Config::default(), &store, Some(backend));
    h.run("register");
    assert_eq!(h.prompt().as_deref(), Some("Choose a username: "));
    h.answer("cam");
    h.answer("short");
    assert_eq!(h.site.message(), Some("Password must be at least 8 characters"));
    assert_eq!(h.prompt().as_deref(), Some("Password: "));
    h.answer("long enough");
    h.answer("not-an-email");
    assert_eq!(h.site.message(), Some("Invalid email address"));
    h.answer("cam@example.org");
    assert_eq!(h.prompt().as_deref(), Some("Confirm password: "));
    h.answer("long enough");
    h.sync();
    assert_eq!(h.site.message(), Some("Registered as cam"));

    // Login pulls buffers the server has and the client lacks.
    h.sync();
    let pulled = h.site.manager().get("shared-notes").expect("pulled buffer");
    assert_eq!(pulled.author.as_deref(), Some("bea"));
    assert_eq!(h.site.message(), Some("Fetched 1 buffer(s)"));
}

#[test]
fn switching_buffers_drops_unsaved_edits() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.site.execute("scratch");
    let before = h.site.manager().active().content.clone();
    h.key(KeyCode::Char('e'));
    assert!(h.site.is_editing());
    h.type_str("draft");
    assert!(h.site.edit_session().unwrap().is_dirty());

    // Palette and prompts are refused mid-edit.
    h.alt('x');
    assert!(!h.site.minibuffer().is_open());

    h.ctrl('x');
    h.key(KeyCode::Char('b'));
    assert!(h.site.is_editing());
    assert_eq!(h.site.message(), Some("Exit edit mode first (C-s to save, Esc to discard)"));

    h.site.switch_buffer("home");
    assert!(!h.site.is_editing());
    assert_eq!(h.site.manager().get("scratch").unwrap().content, before);
}

#[test]
fn escape_discards_an_edit() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.site.execute("scratch");
    let before = h.site.manager().active().content.clone();
    h.key(KeyCode::Char('e'));
    h.type_str("gone");
    h.key(KeyCode::Esc);
    assert!(!h.site.is_editing());
    assert_eq!(h.site.message(), Some("Changes discarded"));
    assert_eq!(h.site.manager().active().content, before);
}

#[test]
fn built_in_buffers_cannot_be_deleted_or_edited() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.key(KeyCode::Char('d'));
    assert_eq!(h.site.message(), Some("Cannot delete *Home*"));
    assert!(!h.site.minibuffer().is_open());
    h.key(KeyCode::Char('e'));
    assert_eq!(h.site.message(), Some("*Home* is read-only"));
    assert!(!h.site.is_editing());
}

#[test]
fn duplicate_names_are_rejected() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.run("create-buffer");
    h.answer("Reading List");
    assert_eq!(h.active_id(), "reading-list");
    h.run("home");

    h.run("create-buffer");
    h.answer("reading list");
    assert_eq!(h.site.message(), Some("Buffer 'reading-list' already exists"));
    assert_eq!(h.active_id(), "home");
    let count = h
        .site
        .manager()
        .list()
        .iter()
        .filter(|b| b.id == "reading-list")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn delete_confirmation_reprompts_on_bad_answer() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.run("create-buffer");
    h.answer("Temp");

    h.key(KeyCode::Char('d'));
    assert_eq!(h.prompt().as_deref(), Some("Delete buffer Temp? (yes/no) "));
    h.answer("maybe");
    assert_eq!(h.site.message(), Some("Please answer yes or no"));
    assert!(!h.site.minibuffer().is_open());

    h.advance(500);
    assert!(!h.site.minibuffer().is_open());
    h.advance(400);
    assert_eq!(h.prompt().as_deref(), Some("Delete buffer Temp? (yes/no) "));

    h.answer("YES");
    assert!(h.site.manager().get("temp").is_none());
    assert_eq!(h.active_id(), "home");
}

#[test]
fn declining_leaves_scratch_alone() {
    let store = MemoryStore::with_raw(
        r#"{"version": 2, "scratch": "keep me", "active": "scratch"}"#,
    );
    let mut h = Harness::open(open_site(), &store, None);
    assert_eq!(h.active_id(), "scratch");
    h.run("clear-scratch");
    h.answer("n");
    assert_eq!(h.site.message(), Some("Cancelled"));
    assert_eq!(h.site.manager().active().content, "keep me");

    h.run("clear-scratch");
    h.answer("y");
    assert_eq!(h.site.message(), Some("*scratch* cleared"));
    assert_eq!(h.site.manager().active().content, "");
}

#[test]
fn chord_follow_up_must_arrive_in_time() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);

    h.ctrl('x');
    assert_eq!(h.site.message(), Some("C-x-"));
    h.now += Duration::from_millis(1500);
    h.key(KeyCode::Char('b'));
    assert!(!h.site.minibuffer().is_open());

    h.ctrl('x');
    h.key(KeyCode::Char('b'));
    assert!(matches!(h.site.minibuffer(), Minibuffer::Command(_)));
}

#[test]
fn unknown_follow_up_falls_through() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.ctrl('x');
    h.key(KeyCode::Char('l'));
    assert_eq!(h.site.message(), None);
    assert_eq!(h.active_id(), "research");
    h.key(KeyCode::Char('b'));
    assert!(!h.site.minibuffer().is_open());
}

#[test]
fn sidebar_swallows_keys_until_closed() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.ctrl('b');
    assert!(matches!(h.site.overlay(), Overlay::Sidebar { selected: 0 }));

    h.key(KeyCode::Char('q'));
    assert!(!h.site.should_quit());
    h.key(KeyCode::Char('l'));
    assert_eq!(h.active_id(), "home");

    h.key(KeyCode::Down);
    h.key(KeyCode::Down);
    h.key(KeyCode::Enter);
    assert_eq!(*h.site.overlay(), Overlay::None);
    assert_eq!(h.active_id(), h.site.manager().list()[2].id);

    h.ctrl('b');
    h.key(KeyCode::Esc);
    assert_eq!(*h.site.overlay(), Overlay::None);
}

#[test]
fn search_counts_and_cycles_matches() {
    let store = MemoryStore::with_raw(
        r#"{"version": 2, "scratch": "alpha\nbeta\nalphabet\ngamma", "active": "scratch"}"#,
    );
    let mut h = Harness::open(open_site(), &store, None);
    h.key(KeyCode::Char('/'));
    h.answer("ALPHA");
    assert_eq!(h.site.search_status(), Some((1, 2)));
    h.key(KeyCode::Char('n'));
    assert_eq!(h.site.search_status(), Some((2, 2)));
    assert_eq!(h.site.scroll(), 2);
    h.key(KeyCode::Char('n'));
    assert_eq!(h.site.search_status(), Some((1, 2)));
    h.key(KeyCode::Char('N'));
    assert_eq!(h.site.search_status(), Some((2, 2)));

    h.key(KeyCode::Char('/'));
    let input = h.site.minibuffer().prompt().map(|p| p.input.clone());
    assert_eq!(input.as_deref(), Some("alpha"));
    for _ in 0..5 {
        h.key(KeyCode::Backspace);
    }
    h.answer("zeta");
    assert_eq!(h.site.message(), Some("No matches"));
    assert_eq!(h.site.search_status(), None);
}

#[test]
fn folding_hides_sections() {
    let store = MemoryStore::with_raw(
        r#"{"version": 2, "scratch": "* One\na\nb\n* Two\nc", "active": "scratch"}"#,
    );
    let mut h = Harness::open(open_site(), &store, None);
    assert_eq!(h.site.visible_content().unwrap().len(), 5);

    h.key(KeyCode::Tab);
    let rows = h.site.visible_content().unwrap();
    let texts: Vec<_> = rows.iter().map(|r| r.text.as_str()).collect();
    assert_eq!(texts, vec!["* One", "* Two", "c"]);
    assert!(rows[0].folded);

    h.press(KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT));
    assert_eq!(h.site.visible_content().unwrap().len(), 5);
    h.press(KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT));
    let texts: Vec<_> = h
        .site
        .visible_content()
        .unwrap()
        .into_iter()
        .map(|r| r.text)
        .collect();
    assert_eq!(texts, vec!["* One", "* Two"]);
}

#[test]
fn messages_expire() {
    let store = MemoryStore::new();
    let mut h = Harness::open(open_site(), &store, None);
    h.run("nonsense");
    assert_eq!(h.site.message(), Some("[No match]"));
    h.ctrl('g');
    h.site.execute("no-such-command");
    assert_eq!(h.site.message(), Some("Unknown command: no-such-command"));
    h.advance(1999);
    assert!(h.site.message().is_some());
    h.advance(2);
    assert!(h.site.message().is_none());
}

#[test]
fn unreadable_state_is_never_overwritten() {
    let newer = r#"{"version": 3, "buffers": [{"id": "notes", "name": "Notes"}]}"#;
    let malformed = r#"{"version": 2, "buffers": [
        {"id": "keep", "name": "Keep", "content": "kept", "origin": "user",
         "created_at": "2026-01-01T00:00:00Z", "updated_at": "2026-01-01T00:00:00Z"},
        {"id": "bad", "name": "Bad", "content": "", "origin": "user",
         "created_at": "garbage", "updated_at": "2026-01-01T00:00:00Z"}
    ]}"#;
    for raw in [newer, malformed] {
        let store = MemoryStore::with_raw(raw);
        let mut h = Harness::open(open_site(), &store, None);
        let message = h.site.message().unwrap_or_default().to_string();
        assert!(message.starts_with("Could not load saved state"), "{message}");
        assert!(message.ends_with("changes will not be saved"), "{message}");
        assert_eq!(h.active_id(), "home");

        h.run("create-buffer");
        h.answer("Scribbles");
        h.run("contact");
        h.run("reload");
        h.site.persist();
        assert_eq!(store.raw().as_deref(), Some(raw));
    }
}

#[test]
fn saving_resumes_once_state_loads_again() {
    let store = MemoryStore::with_raw(r#"{"version": 99}"#);
    let mut h = Harness::open(open_site(), &store, None);
    store.save(&crate::store::StoredState::default()).unwrap();
    h.run("reload");
    assert_eq!(h.site.message(), Some("Reloaded"));

    h.run("create-buffer");
    h.answer("Scribbles");
    let saved = store.load().unwrap().unwrap();
    assert!(saved.buffers.iter().any(|b| b.id == "scribbles"));
}

#[test]
fn failed_syncs_keep_the_local_save() {
    let failures = [
        (ApiError::Forbidden, "Saved locally only (not permitted)"),
        (ApiError::Conflict, "Saved locally only (already exists)"),
        (
            ApiError::Transport("connection refused".into()),
            "Saved locally only (network error: connection refused)",
        ),
    ];
    for (error, expected) in failures {
        let store = MemoryStore::with_raw(SIGNED_IN);
        let backend: Arc<dyn Backend> = Arc::new(Scripted::failing_saves(error));
        let mut h = Harness::open(Config::default(), &store, Some(backend));
        // Startup pull.
        h.sync();

        h.run("create-buffer");
        h.answer("Field Notes");
        h.sync();
        assert_eq!(h.site.message(), Some(expected));
        assert!(h.site.is_authenticated());

        let reopened = Harness::open(Config::default(), &store, None);
        let kept = reopened.site.manager().get("field-notes").map(|b| b.content.clone());
        assert_eq!(kept, Some(crate::buffer::template("Field Notes")));
    }
}

#[test]
fn rejected_token_ends_the_session() {
    let store = MemoryStore::with_raw(SIGNED_IN);
    let backend: Arc<dyn Backend> = Arc::new(Scripted::failing_saves(ApiError::Unauthorized));
    let mut h = Harness::open(Config::default(), &store, Some(backend));
    h.sync();

    h.run("create-buffer");
    h.answer("Field Notes");
    h.sync();
    assert_eq!(h.site.message(), Some("Session expired, please log in"));
    assert!(h.site.session().is_none());
    assert!(h.site.visible_content().is_none());

    let saved = store.load().unwrap().unwrap();
    assert_eq!(saved.session, None);
    assert!(saved.buffers.iter().any(|b| b.id == "field-notes"));
}

#[test]
fn late_save_result_for_a_deleted_buffer_is_dropped() {
    let store = MemoryStore::with_raw(SIGNED_IN);
    let backend: Arc<dyn Backend> = Arc::new(Scripted::default());
    let mut h = Harness::open(Config::default(), &store, Some(backend));
    h.sync();

    h.run("create-buffer");
    h.answer("Temp");
    h.key(KeyCode::Char('d'));
    h.answer("yes");
    assert_eq!(h.site.message(), Some("Deleted Temp"));

    // The save and the delete results, in whatever order they land.
    h.sync();
    h.sync();
    assert_eq!(h.site.message(), Some("Deleted Temp"));
    assert!(h.site.manager().get("temp").is_none());
    let saved = store.load().unwrap().unwrap();
    assert!(saved.buffers.is_empty());
}

#[test]
fn later_saves_use_the_id_the_server_assigned() {
    let store = MemoryStore::with_raw(SIGNED_IN);
    let backend = Arc::new(Scripted::default());
    let mut h = Harness::open(
        Config::default(),
        &store,
        Some(backend.clone() as Arc<dyn Backend>),
    );
    h.sync();

    h.run("create-buffer");
    h.answer("a -- b");
    assert_eq!(h.active_id(), "a-b");
    h.sync();
    assert_eq!(h.site.message(), Some("Saved and published"));
    assert_eq!(h.site.manager().active().remote_key(), "a----b");

    h.key(KeyCode::Char('e'));
    h.type_str("x");
    h.ctrl('s');
    h.sync();
    assert_eq!(h.site.message(), Some("Saved"));
    let last = backend.saves().last().map(|(id, _)| id.clone());
    assert_eq!(last.as_deref(), Some("a----b"));

    let reopened = Harness::open(Config::default(), &store, None);
    let remote = reopened.site.manager().get("a-b").map(|b| b.remote_key().to_string());
    assert_eq!(remote.as_deref(), Some("a----b"));
}

#[test]
fn logout_returns_to_the_auth_view() {
    let store = MemoryStore::with_raw(SIGNED_IN);
    let mut h = Harness::open(Config::default(), &store, None);
    assert!(h.site.is_authenticated());
    h.run("logout");
    assert!(!h.site.is_authenticated());
    assert!(h.site.visible_content().is_none());
    assert_eq!(store.load().unwrap().unwrap().session, None);
}
