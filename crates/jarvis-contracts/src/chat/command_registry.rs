#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub action: &'static str,
}

pub(crate) const NO_ARG_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "stats",
        action: "show_stats",
    },
    CommandSpec {
        command: "capabilities",
        action: "list_capabilities",
    },
    CommandSpec {
        command: "detach",
        action: "clear_attachments",
    },
    CommandSpec {
        command: "help",
        action: "help",
    },
    CommandSpec {
        command: "quit",
        action: "quit",
    },
    CommandSpec {
        command: "exit",
        action: "quit",
    },
];

pub(crate) const RAW_ARG_COMMANDS: &[CommandSpec] = &[CommandSpec {
    command: "split",
    action: "split_tasks",
}];

pub(crate) const SINGLE_PATH_COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "attach",
        action: "attach_image",
    },
    CommandSpec {
        command: "listen",
        action: "attach_audio",
    },
];

pub const CHAT_HELP_COMMANDS: &[&str] = &[
    "/stats",
    "/capabilities",
    "/split",
    "/attach",
    "/listen",
    "/detach",
    "/help",
    "/quit",
];
