use std::fmt::Write as _;

use crate::capabilities::CapabilityRegistry;

const ROUTING_RULES: &[&str] = &[
    "Select exactly one capability, the single best fit for the request.",
    "Never infer context the user did not provide.",
    "Answer with only a JSON object: {\"selected_agent\": \"NAME\", \"inputs\": \"text for that capability\"}.",
    "The inputs value is the request rephrased for the selected capability, or the request verbatim.",
];

pub const SPLIT_PROMPT: &str = "The user may have asked for several things in one sentence. \
Split the request into distinct atomic tasks, preserving the order they were asked in. \
Answer with only a JSON object: {\"tasks\": [\"first task\", \"second task\"]}. \
If the request is a single task, return it alone in the list.";

/// Build the classification system prompt from the capability registry.
///
/// Built once per router instance and reused for every call, never rebuilt
/// per request.
pub fn build_routing_prompt(registry: &CapabilityRegistry) -> String {
    let mut prompt = String::from(
        "You route user requests for a personal assistant to exactly one capability.\n\nCapabilities:\n",
    );
    for capability in registry.list() {
        let _ = writeln!(prompt, "- {}: {}", capability.name, capability.description);
        for example in &capability.examples {
            let _ = writeln!(prompt, "  example: {example}");
        }
        if !capability.keywords.is_empty() {
            let _ = writeln!(prompt, "  cues: {}", capability.keywords.join(", "));
        }
    }
    prompt.push_str("\nRules:\n");
    for rule in ROUTING_RULES {
        let _ = writeln!(prompt, "- {rule}");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use crate::capabilities::CapabilityRegistry;

    use super::{build_routing_prompt, SPLIT_PROMPT};

    #[test]
    fn prompt_lists_every_capability_once() {
        let registry = CapabilityRegistry::new(None);
        let prompt = build_routing_prompt(&registry);
        for name in registry.names() {
            assert_eq!(
                prompt.matches(&format!("- {name}: ")).count(),
                1,
                "capability {name} should appear exactly once"
            );
        }
    }

    #[test]
    fn prompt_documents_the_json_contract() {
        let prompt = build_routing_prompt(&CapabilityRegistry::new(None));
        assert!(prompt.contains("selected_agent"));
        assert!(prompt.contains("inputs"));
    }

    #[test]
    fn split_prompt_documents_the_tasks_contract() {
        assert!(SPLIT_PROMPT.contains("\"tasks\""));
    }
}
