mod command_registry;
mod decision_parser;
mod intent_parser;
mod prompt;

pub use command_registry::CHAT_HELP_COMMANDS;
pub use decision_parser::{extract_decision, extract_task_list, DecisionDraft, RoutingDecision};
pub use intent_parser::{parse_intent, Intent};
pub use prompt::{build_routing_prompt, SPLIT_PROMPT};
