use crate::buffer::BUILTINS;
use crate::registry::CommandRegistry;

fn builtin_description(id: &str) -> &'static str {
    BUILTINS
        .iter()
        .find(|b| b.id == id)
        .map(|b| b.description)
        .unwrap_or("")
}

pub fn builtin_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    registry.register("switch-buffer", "Switch to another buffer", |site| {
        site.open_buffer_palette(false)
    });
    registry.register("list-buffers", "List all available buffers", |site| {
        site.open_buffer_palette(false)
    });
    registry.register("whats-new", "List new and unread buffers", |site| {
        site.open_buffer_palette(true)
    });

    registry.register("home", builtin_description("home"), |site| {
        site.switch_buffer("home")
    });
    registry.register("research", builtin_description("research"), |site| {
        site.switch_buffer("research")
    });
    registry.register("philosophy", builtin_description("philosophy"), |site| {
        site.switch_buffer("philosophy")
    });
    registry.register("projects", builtin_description("projects"), |site| {
        site.switch_buffer("projects")
    });
    registry.register("espanol", builtin_description("espanol"), |site| {
        site.switch_buffer("espanol")
    });
    registry.register("writings", builtin_description("writings"), |site| {
        site.switch_buffer("writings")
    });
    registry.register("contact", builtin_description("contact"), |site| {
        site.switch_buffer("contact")
    });
    registry.register("scratch", builtin_description("scratch"), |site| {
        site.switch_buffer("scratch")
    });
    registry.register("next-buffer", "Switch to the next buffer", |site| site.next_buffer());
    registry.register("previous-buffer", "Switch to the previous buffer", |site| {
        site.previous_buffer()
    });

    registry.register("create-buffer", "Create a new buffer", |site| {
        site.prompt_create_buffer()
    });
    registry.register("edit-buffer", "Edit the current buffer", |site| site.edit_buffer());
    registry.register("delete-buffer", "Delete the current buffer", |site| {
        site.prompt_delete_buffer()
    });
    registry.register("clear-scratch", "Empty the *scratch* buffer", |site| {
        site.prompt_clear_scratch()
    });

    registry.register("search", "Search the current buffer", |site| site.prompt_search());
    registry.register("toggle-sidebar", "Show or hide the buffer list", |site| {
        site.toggle_sidebar()
    });
    registry.register("fold-all", "Fold every heading", |site| site.fold_all());
    registry.register("unfold-all", "Unfold every heading", |site| site.unfold_all());
    registry.register("sync-buffers", "Fetch buffers from the server", |site| {
        site.sync_buffers()
    });
    registry.register("reload", "Reload saved state", |site| site.reload());
    registry.register("logout", "Log out", |site| site.logout());

    registry.register_public("help", "Show available commands", |site| site.show_help());
    registry.register_public("login", "Log in", |site| site.login());
    registry.register_public("register", "Create an account", |site| site.register());
    registry.register_public("register-email", "Register with an email address", |site| {
        site.register_email()
    });
    registry.register_public("verify-code", "Check a registration code", |site| {
        site.verify_code()
    });
    registry.register_public("quit", "Quit", |site| site.quit());

    registry
}
