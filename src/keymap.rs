use crate::site::{Overlay, Site};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::time::Instant;

pub struct FollowUp {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
    pub command: &'static str,
}

pub const CTRL_X_FOLLOW_UPS: &[FollowUp] = &[
    FollowUp {
        code: KeyCode::Char('b'),
        modifiers: KeyModifiers::NONE,
        command: "switch-buffer",
    },
    FollowUp {
        code: KeyCode::Char('k'),
        modifiers: KeyModifiers::NONE,
        command: "delete-buffer",
    },
    FollowUp {
        code: KeyCode::Char('f'),
        modifiers: KeyModifiers::CONTROL,
        command: "create-buffer",
    },
    FollowUp {
        code: KeyCode::Char('c'),
        modifiers: KeyModifiers::CONTROL,
        command: "quit",
    },
];

#[derive(Clone, Copy)]
pub struct PendingChord {
    pub prefix: &'static str,
    pub follow_ups: &'static [FollowUp],
    pub deadline: Instant,
}

impl PendingChord {
    pub fn is_expired(&self, now: Instant) -> bool {
        now > self.deadline
    }

    fn command_for(&self, key: &KeyEvent) -> Option<&'static str> {
        self.follow_ups
            .iter()
            .find(|f| f.code == key.code && f.modifiers == key.modifiers)
            .map(|f| f.command)
    }
}

pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&Site, &KeyEvent) -> bool,
    pub run: fn(&mut Site, KeyEvent),
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "edit-local",
        applies: edit_local_applies,
        run: edit_local,
    },
    Rule {
        name: "global",
        applies: global_applies,
        run: global,
    },
    Rule {
        name: "single-key",
        applies: single_key_applies,
        run: single_key,
    },
    Rule {
        name: "modal",
        applies: modal_applies,
        run: modal,
    },
    Rule {
        name: "sidebar",
        applies: sidebar_applies,
        run: sidebar,
    },
    Rule {
        name: "minibuffer",
        applies: minibuffer_applies,
        run: minibuffer,
    },
    Rule {
        name: "edit-input",
        applies: edit_input_applies,
        run: edit_input,
    },
];

pub fn dispatch(site: &mut Site, key: KeyEvent, now: Instant) -> bool {
    if let Some(pending) = site.take_pending_chord() {
        if !pending.is_expired(now) {
            if let Some(command) = pending.command_for(&key) {
                site.clear_message();
                site.execute(command);
                return true;
            }
        }
        // Expired or not a follow-up: drop the chord, handle the key below.
        tracing::debug!("Dropped {} chord on {:?}", pending.prefix, key.code);
        site.clear_message();
    }
    for rule in RULES {
        if (rule.applies)(site, &key) {
            tracing::trace!("Key {:?} handled by {}", key.code, rule.name);
            (rule.run)(site, key);
            return true;
        }
    }
    false
}

fn ctrl(key: &KeyEvent, c: char) -> bool {
    key.modifiers == KeyModifiers::CONTROL && key.code == KeyCode::Char(c)
}

fn plain(key: &KeyEvent) -> bool {
    !key.modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
}

fn is_cancel(key: &KeyEvent) -> bool {
    key.code == KeyCode::Esc || ctrl(key, 'g')
}

fn unobstructed(site: &Site) -> bool {
    matches!(site.overlay(), Overlay::None) && !site.minibuffer().is_open()
}

fn edit_local_applies(site: &Site, key: &KeyEvent) -> bool {
    site.is_editing() && unobstructed(site) && (ctrl(key, 's') || key.code == KeyCode::Esc)
}

fn edit_local(site: &mut Site, key: KeyEvent) {
    if ctrl(&key, 's') {
        site.save_edit();
    } else {
        site.discard_edit();
    }
}

struct Chord {
    code: KeyCode,
    modifiers: KeyModifiers,
    run: fn(&mut Site),
}

const GLOBAL_CHORDS: &[Chord] = &[
    Chord {
        code: KeyCode::Char('x'),
        modifiers: KeyModifiers::ALT,
        run: |site| site.open_command_palette(),
    },
    Chord {
        code: KeyCode::Char('b'),
        modifiers: KeyModifiers::CONTROL,
        run: |site| {
            site.execute("toggle-sidebar");
        },
    },
    Chord {
        code: KeyCode::Char('x'),
        modifiers: KeyModifiers::CONTROL,
        run: |site| site.begin_chord("C-x", CTRL_X_FOLLOW_UPS),
    },
];

fn global_chord(key: &KeyEvent) -> Option<&'static Chord> {
    GLOBAL_CHORDS
        .iter()
        .find(|c| c.code == key.code && c.modifiers == key.modifiers)
}

fn global_applies(_: &Site, key: &KeyEvent) -> bool {
    global_chord(key).is_some()
}

fn global(site: &mut Site, key: KeyEvent) {
    if let Some(chord) = global_chord(&key) {
        (chord.run)(site);
    }
}

struct SingleKey {
    code: KeyCode,
    run: fn(&mut Site),
}

const SINGLE_KEYS: &[SingleKey] = &[
    SingleKey {
        code: KeyCode::Char('j'),
        run: |site| site.scroll_by(1),
    },
    SingleKey {
        code: KeyCode::Down,
        run: |site| site.scroll_by(1),
    },
    SingleKey {
        code: KeyCode::Char('k'),
        run: |site| site.scroll_by(-1),
    },
    SingleKey {
        code: KeyCode::Up,
        run: |site| site.scroll_by(-1),
    },
    SingleKey {
        code: KeyCode::PageDown,
        run: |site| site.page(1),
    },
    SingleKey {
        code: KeyCode::PageUp,
        run: |site| site.page(-1),
    },
    SingleKey {
        code: KeyCode::Char('g'),
        run: |site| site.scroll_to_top(),
    },
    SingleKey {
        code: KeyCode::Char('G'),
        run: |site| site.scroll_to_bottom(),
    },
    SingleKey {
        code: KeyCode::Char('['),
        run: |site| site.jump_heading(-1),
    },
    SingleKey {
        code: KeyCode::Char(']'),
        run: |site| site.jump_heading(1),
    },
    SingleKey {
        code: KeyCode::Tab,
        run: |site| site.toggle_fold(),
    },
    SingleKey {
        code: KeyCode::BackTab,
        run: |site| site.toggle_fold_all(),
    },
    SingleKey {
        code: KeyCode::Char('h'),
        run: |site| site.previous_buffer(),
    },
    SingleKey {
        code: KeyCode::Char('l'),
        run: |site| site.next_buffer(),
    },
    SingleKey {
        code: KeyCode::Char('e'),
        run: |site| {
            site.execute("edit-buffer");
        },
    },
    SingleKey {
        code: KeyCode::Char('c'),
        run: |site| {
            site.execute("create-buffer");
        },
    },
    SingleKey {
        code: KeyCode::Char('d'),
        run: |site| {
            site.execute("delete-buffer");
        },
    },
    SingleKey {
        code: KeyCode::Char('/'),
        run: |site| {
            site.execute("search");
        },
    },
    SingleKey {
        code: KeyCode::Char('n'),
        run: |site| site.jump_match(1),
    },
    SingleKey {
        code: KeyCode::Char('N'),
        run: |site| site.jump_match(-1),
    },
    SingleKey {
        code: KeyCode::Char('?'),
        run: |site| {
            site.execute("help");
        },
    },
    SingleKey {
        code: KeyCode::Char('q'),
        run: |site| {
            site.execute("quit");
        },
    },
];

fn single_key_for(key: &KeyEvent) -> Option<&'static SingleKey> {
    if !plain(key) {
        return None;
    }
    SINGLE_KEYS.iter().find(|s| s.code == key.code)
}

fn single_key_applies(site: &Site, key: &KeyEvent) -> bool {
    !site.is_editing()
        && unobstructed(site)
        && site.is_authenticated()
        && single_key_for(key).is_some()
}

fn single_key(site: &mut Site, key: KeyEvent) {
    if let Some(binding) = single_key_for(&key) {
        (binding.run)(site);
    }
}

fn modal_applies(site: &Site, key: &KeyEvent) -> bool {
    match site.overlay() {
        Overlay::Help => true,
        Overlay::Sidebar { .. } => is_cancel(key),
        Overlay::None => site.minibuffer().is_open() && is_cancel(key),
    }
}

fn modal(site: &mut Site, _: KeyEvent) {
    if matches!(site.overlay(), Overlay::None) {
        site.cancel_minibuffer();
    } else {
        site.close_overlay();
    }
}

fn sidebar_applies(site: &Site, _: &KeyEvent) -> bool {
    matches!(site.overlay(), Overlay::Sidebar { .. })
}

fn sidebar(site: &mut Site, key: KeyEvent) {
    match key.code {
        KeyCode::Up => site.sidebar_move(-1),
        KeyCode::Down => site.sidebar_move(1),
        KeyCode::Enter => site.sidebar_select(),
        _ => {}
    }
}

fn minibuffer_applies(site: &Site, _: &KeyEvent) -> bool {
    site.minibuffer().is_open()
}

fn minibuffer(site: &mut Site, key: KeyEvent) {
    let command_mode = site.minibuffer().palette().is_some();
    match key.code {
        KeyCode::Enter => site.minibuffer_commit(),
        KeyCode::Backspace => site.minibuffer_backspace(),
        KeyCode::Up if command_mode => site.minibuffer_select(-1),
        KeyCode::Down if command_mode => site.minibuffer_select(1),
        KeyCode::Tab if command_mode => site.minibuffer_complete(),
        KeyCode::Char('p') if command_mode && ctrl(&key, 'p') => site.minibuffer_select(-1),
        KeyCode::Char('n') if command_mode && ctrl(&key, 'n') => site.minibuffer_select(1),
        KeyCode::Char(c) if plain(&key) => site.minibuffer_insert(c),
        _ => {}
    }
}

fn edit_input_applies(site: &Site, _: &KeyEvent) -> bool {
    site.is_editing() && unobstructed(site)
}

fn edit_input(site: &mut Site, key: KeyEvent) {
    let height = site.view_height();
    let tab_width = site.tab_width();
    let Some(session) = site.edit_session_mut() else {
        return;
    };
    match key.code {
        KeyCode::Char(c) if plain(&key) => session.insert_char(c),
        KeyCode::Enter => session.insert_char('\n'),
        KeyCode::Tab => session.insert_str(&" ".repeat(tab_width)),
        KeyCode::Backspace => session.backspace(),
        KeyCode::Delete => session.delete(),
        KeyCode::Left => session.move_left(),
        KeyCode::Right => session.move_right(),
        KeyCode::Up => session.move_up(),
        KeyCode::Down => session.move_down(),
        KeyCode::Home => session.move_line_start(),
        KeyCode::End => session.move_line_end(),
        KeyCode::PageUp => session.move_page(-(height as isize)),
        KeyCode::PageDown => session.move_page(height as isize),
        _ => return,
    }
    session.ensure_cursor_visible(height as u16);
}
