use std::str::FromStr;

use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

/// Commands that can be invoked by starting a message with a leading slash.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, EnumIter, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "kebab-case")]
pub enum SlashCommand {
    /// Fetch the stored conversation again
    Reload,
    /// Sign out and return to the sign-in form
    Logout,
    /// Show help
    Help,
    /// Exit the application
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: SlashCommand,
    pub argument: Option<String>,
}

impl SlashCommand {
    /// User-visible description shown in help.
    pub fn description(self) -> &'static str {
        match self {
            SlashCommand::Reload => "reload your saved conversation",
            SlashCommand::Logout => "sign out",
            SlashCommand::Help => "show available commands",
            SlashCommand::Quit => "exit the application",
        }
    }

    /// Command string without the leading '/'.
    pub fn command(self) -> &'static str {
        self.into()
    }

    /// Whether this command can run while a reply is pending.
    pub fn available_while_busy(self) -> bool {
        match self {
            SlashCommand::Help | SlashCommand::Quit | SlashCommand::Logout => true,
            SlashCommand::Reload => false,
        }
    }

    /// Whether the command only makes sense with cloud history on.
    pub fn needs_account(self) -> bool {
        matches!(self, SlashCommand::Reload | SlashCommand::Logout)
    }
}

/// Parse a slash command from user input
pub fn parse_slash_command(input: &str) -> Option<ParsedCommand> {
    let rest = input.trim().strip_prefix('/')?;

    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    let tail: Vec<&str> = parts.collect();

    let command = SlashCommand::from_str(&head.to_lowercase()).ok().or_else(|| {
        match head.to_lowercase().as_str() {
            "q" | "exit" | "bye" => Some(SlashCommand::Quit),
            "r" | "retry" | "refresh" => Some(SlashCommand::Reload),
            "signout" | "sign-out" | "logoff" => Some(SlashCommand::Logout),
            "h" | "?" => Some(SlashCommand::Help),
            _ => None,
        }
    })?;

    let argument = if tail.is_empty() {
        None
    } else {
        Some(tail.join(" "))
    };

    Some(ParsedCommand { command, argument })
}

/// Get help text for the commands available in this session
pub fn get_help_text(with_account: bool) -> String {
    let mut help = String::from("Available commands:\n");
    for command in SlashCommand::iter() {
        if command.needs_account() && !with_account {
            continue;
        }
        help.push_str(&format!("/{} - {}\n", command.command(), command.description()));
    }
    help.push_str("Aliases: /q for /quit, /r for /reload. Enter sends, Shift+Enter adds a line, PgUp/PgDn scrolls.");
    help
}
