use crate::site::Site;

pub type CommandFn = fn(&mut Site);

#[derive(Clone, Copy)]
pub struct Command {
    pub name: &'static str,
    pub description: &'static str,
    pub action: CommandFn,
    pub public: bool,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("public", &self.public)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Duplicate names panic.
    pub fn register(&mut self, name: &'static str, description: &'static str, action: CommandFn) {
        self.insert(name, description, action, false);
    }

    pub fn register_public(
        &mut self,
        name: &'static str,
        description: &'static str,
        action: CommandFn,
    ) {
        self.insert(name, description, action, true);
    }

    fn insert(&mut self, name: &'static str, description: &'static str, action: CommandFn, public: bool) {
        assert!(
            self.find(name).is_none(),
            "command `{name}` registered twice"
        );
        self.commands.push(Command {
            name,
            description,
            action,
            public,
        });
    }

    pub fn list(&self) -> &[Command] {
        &self.commands
    }

    pub fn find(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|c| c.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.iter().map(|c| c.name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }
}
