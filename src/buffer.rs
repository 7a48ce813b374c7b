use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_BUFFER: &str = "home";
pub const SCRATCH_ID: &str = "scratch";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    BuiltIn,
    Scratch,
    User,
}

impl Origin {
    pub fn is_editable(self) -> bool {
        matches!(self, Origin::Scratch | Origin::User)
    }

    pub fn is_deletable(self) -> bool {
        self == Origin::User
    }

    pub fn syncs(self) -> bool {
        self == Origin::User
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buffer {
    pub id: String,
    pub name: String,
    pub content: String,
    pub origin: Origin,
    #[serde(default)]
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
}

impl Buffer {
    pub fn user(name: &str, author: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: slugify(name.trim()),
            name: name.trim().to_string(),
            content: template(name.trim()),
            origin: Origin::User,
            author,
            created_at: now,
            updated_at: now,
            remote_id: None,
        }
    }

    pub fn remote_key(&self) -> &str {
        self.remote_id.as_deref().unwrap_or(&self.id)
    }

    pub fn display_name(&self) -> String {
        match BUILTINS.iter().find(|b| b.id == self.id) {
            Some(builtin) if self.origin != Origin::User => builtin.display.to_string(),
            _ => self.name.clone(),
        }
    }
}

pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut in_gap = false;
    for ch in name.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            slug.push(ch);
            in_gap = false;
        } else if !in_gap {
            slug.push('-');
            in_gap = true;
        }
    }
    slug
}

pub fn template(name: &str) -> String {
    format!("* {name}\n\nNew buffer. Press e to edit.\n")
}

pub struct BuiltIn {
    pub id: &'static str,
    pub display: &'static str,
    pub description: &'static str,
    pub content: &'static str,
}

pub const BUILTINS: &[BuiltIn] = &[
    BuiltIn {
        id: "home",
        display: "*Home*",
        description: "Welcome and introduction",
        content: include_str!("builtin/home.org"),
    },
    BuiltIn {
        id: "research",
        display: "*Research*",
        description: "Bhagavad Gita textual analysis",
        content: include_str!("builtin/research.org"),
    },
    BuiltIn {
        id: "philosophy",
        display: "*Philosophy*",
        description: "Philosophical questions and comparative analysis",
        content: include_str!("builtin/philosophy.org"),
    },
    BuiltIn {
        id: "projects",
        display: "*Projects*",
        description: "Software projects and tools",
        content: include_str!("builtin/projects.org"),
    },
    BuiltIn {
        id: "espanol",
        display: "*Español*",
        description: "Contenido en idioma español",
        content: include_str!("builtin/espanol.org"),
    },
    BuiltIn {
        id: "writings",
        display: "*Writings*",
        description: "Articles, essays, and publications",
        content: include_str!("builtin/writings.org"),
    },
    BuiltIn {
        id: "contact",
        display: "*Contact*",
        description: "Contact information",
        content: include_str!("builtin/contact.org"),
    },
    BuiltIn {
        id: SCRATCH_ID,
        display: "*scratch*",
        description: "Scratch buffer for notes",
        content: include_str!("builtin/scratch.org"),
    },
];

pub fn is_builtin(id: &str) -> bool {
    BUILTINS.iter().any(|b| b.id == id)
}

pub fn builtin_buffers(scratch: Option<&str>) -> Vec<Buffer> {
    BUILTINS
        .iter()
        .map(|b| {
            let (origin, content) = if b.id == SCRATCH_ID {
                (Origin::Scratch, scratch.unwrap_or(b.content))
            } else {
                (Origin::BuiltIn, b.content)
            };
            Buffer {
                id: b.id.to_string(),
                name: b.display.trim_matches('*').to_string(),
                content: content.to_string(),
                origin,
                author: None,
                created_at: DateTime::default(),
                updated_at: DateTime::default(),
                remote_id: None,
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    New,
    Unread,
    Seen,
}

impl Freshness {
    pub fn marker(self) -> &'static str {
        match self {
            Freshness::New => "●",
            Freshness::Unread => "○",
            Freshness::Seen => " ",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewedLedger {
    entries: BTreeMap<String, DateTime<Utc>>,
}

impl ViewedLedger {
    pub fn mark(&mut self, id: &str, now: DateTime<Utc>) {
        self.entries.insert(id.to_string(), now);
    }

    pub fn get(&self, id: &str) -> Option<DateTime<Utc>> {
        self.entries.get(id).copied()
    }

    pub fn forget(&mut self, id: &str) {
        self.entries.remove(id);
    }

    pub fn retain_known<'a>(&mut self, known: impl IntoIterator<Item = &'a str>) -> usize {
        let known: Vec<&str> = known.into_iter().collect();
        let before = self.entries.len();
        self.entries.retain(|id, _| known.contains(&id.as_str()));
        before - self.entries.len()
    }

    pub fn classify(&self, buffer: &Buffer, last_visit: Option<DateTime<Utc>>) -> Freshness {
        match self.get(&buffer.id) {
            None => match last_visit {
                Some(visit) if buffer.created_at <= visit => Freshness::Unread,
                _ => Freshness::New,
            },
            Some(viewed) if viewed < buffer.updated_at => Freshness::Unread,
            Some(_) => Freshness::Seen,
        }
    }
}
