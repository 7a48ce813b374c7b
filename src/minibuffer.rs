use crate::completion::Completion;
use crate::workflow::{Ask, LoginFlow, RegisterEmailFlow, RegisterFlow};
use std::time::Duration;

pub const REPROMPT_DELAY: Duration = Duration::from_millis(800);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Commands,
    Buffers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pick {
    Command(&'static str),
    Buffer(String),
}

#[derive(Debug, Clone)]
pub struct Palette {
    pub source: Source,
    pub completion: Completion<Pick>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmAction {
    DeleteBuffer(String),
    ClearScratch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    CreateBuffer,
    Search,
    Confirm(ConfirmAction),
    Login(LoginFlow),
    Register(RegisterFlow),
    RegisterEmail(RegisterEmailFlow),
    VerifyCode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextPrompt {
    pub prompt: String,
    pub input: String,
    pub masked: bool,
    pub continuation: Continuation,
}

impl TextPrompt {
    pub fn new(prompt: impl Into<String>, continuation: Continuation) -> Self {
        Self {
            prompt: prompt.into(),
            input: String::new(),
            masked: false,
            continuation,
        }
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.input = value.to_string();
        self
    }

    pub fn from_ask(ask: &Ask, continuation: Continuation) -> Self {
        Self {
            masked: ask.masked,
            ..Self::new(ask.prompt, continuation)
        }
    }

    pub fn shown_input(&self) -> String {
        if self.masked {
            "*".repeat(self.input.chars().count())
        } else {
            self.input.clone()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub enum Minibuffer {
    #[default]
    Closed,
    Command(Palette),
    TextInput(TextPrompt),
}

impl Minibuffer {
    pub fn is_open(&self) -> bool {
        !matches!(self, Minibuffer::Closed)
    }

    pub fn palette(&self) -> Option<&Palette> {
        match self {
            Minibuffer::Command(palette) => Some(palette),
            _ => None,
        }
    }

    pub fn prompt(&self) -> Option<&TextPrompt> {
        match self {
            Minibuffer::TextInput(prompt) => Some(prompt),
            _ => None,
        }
    }

    pub fn take(&mut self) -> Minibuffer {
        std::mem::take(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Invalid,
}

pub fn parse_yes_no(input: &str) -> Answer {
    match input.trim().to_lowercase().as_str() {
        "y" | "yes" => Answer::Yes,
        "n" | "no" => Answer::No,
        _ => Answer::Invalid,
    }
}
