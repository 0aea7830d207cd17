use crate::messaging::types::{BotCommand, IncomingMessage};

/// One-shot admin commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AdminCommand {
    Start,
    SetWelcome,
    SetButtons,
    Broadcast,
    ListBlocked,
    Stats,
}

const ADMIN_COMMANDS: [(AdminCommand, &str, &str); 6] = [
    (AdminCommand::Start, "start", "Show the welcome message"),
    (AdminCommand::SetWelcome, "setwelcome", "Set the welcome text"),
    (AdminCommand::SetButtons, "setbuttons", "Set the welcome buttons"),
    (AdminCommand::Broadcast, "broadcast", "Create a broadcast"),
    (AdminCommand::ListBlocked, "listblocked", "List blocked users"),
    (AdminCommand::Stats, "stats", "Show user statistics"),
];

impl AdminCommand {
    pub fn parse(msg: &IncomingMessage) -> Option<Self> {
        let (name, _) = msg.command()?;
        ADMIN_COMMANDS
            .iter()
            .find(|(_, n, _)| *n == name)
            .map(|(c, _, _)| *c)
    }
}

pub fn is_start(msg: &IncomingMessage) -> bool {
    matches!(msg.command(), Some((name, _)) if name == "start")
}

pub fn admin_menu() -> Vec<BotCommand> {
    ADMIN_COMMANDS
        .iter()
        .map(|(_, name, desc)| BotCommand::new(*name, *desc))
        .collect()
}

pub fn user_menu() -> Vec<BotCommand> {
    vec![BotCommand::new("start", "Get the welcome message")]
}
