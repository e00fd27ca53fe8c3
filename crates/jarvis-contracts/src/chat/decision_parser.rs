use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of one classification: which capability handles the request and
/// what text it receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub selected_capability: String,
    pub tailored_input: String,
}

/// Raw shape pulled out of classifier output before the caller applies its
/// defaulting rules. `inputs` is optional on the wire; the router substitutes
/// the cleaned user text when it is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionDraft {
    pub selected_agent: String,
    pub inputs: Option<String>,
}

pub fn extract_decision(raw_text: &str) -> Option<DecisionDraft> {
    let value = first_json_object(raw_text)?;
    let object = value.as_object()?;
    let selected = object
        .get("selected_agent")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())?;
    let inputs = object
        .get("inputs")
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(DecisionDraft {
        selected_agent: selected.to_string(),
        inputs,
    })
}

pub fn extract_task_list(raw_text: &str) -> Option<Vec<String>> {
    let value = first_json_object(raw_text)?;
    let tasks = value.get("tasks")?.as_array()?;
    let collected: Vec<String> = tasks
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|task| !task.is_empty())
        .map(str::to_string)
        .collect();
    if collected.is_empty() {
        return None;
    }
    Some(collected)
}

/// First strictly-parseable JSON object embedded in noisy model output.
///
/// Each `{` is tried as a candidate start; the span runs to its
/// depth-balanced close (string contents and escapes do not count toward
/// the depth). Candidates that fail a strict parse are skipped.
fn first_json_object(raw_text: &str) -> Option<Value> {
    for (start, _) in raw_text.char_indices().filter(|(_, ch)| *ch == '{') {
        let Some(end) = balanced_close(raw_text, start) else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&raw_text[start..=end]) {
            if value.is_object() {
                return Some(value);
            }
        }
    }
    None
}

fn balanced_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::{extract_decision, extract_task_list, DecisionDraft};

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let raw = "Sure! Here you go: {\"selected_agent\": \"GENERAL\", \"inputs\": \"hello\"}. Hope that helps!";
        assert_eq!(
            extract_decision(raw),
            Some(DecisionDraft {
                selected_agent: "GENERAL".to_string(),
                inputs: Some("hello".to_string()),
            })
        );
    }

    #[test]
    fn returns_none_without_braces() {
        assert_eq!(extract_decision("I cannot comply."), None);
        assert_eq!(extract_decision(""), None);
    }

    #[test]
    fn returns_none_without_selected_agent() {
        assert_eq!(extract_decision("{\"inputs\": \"hello\"}"), None);
        assert_eq!(extract_decision("{\"selected_agent\": \"  \"}"), None);
    }

    #[test]
    fn missing_inputs_stays_unset() {
        let draft = extract_decision("{\"selected_agent\": \"SENSOR\"}").expect("draft");
        assert_eq!(draft.selected_agent, "SENSOR");
        assert_eq!(draft.inputs, None);
    }

    #[test]
    fn extracts_object_with_nested_braces() {
        let raw = "result: {\"selected_agent\": \"MEMORY\", \"inputs\": \"note\", \"extra\": {\"nested\": true}} done";
        let draft = extract_decision(raw).expect("draft");
        assert_eq!(draft.selected_agent, "MEMORY");
        assert_eq!(draft.inputs.as_deref(), Some("note"));
    }

    #[test]
    fn skips_unparseable_candidate_before_valid_object() {
        let raw = "{broken {\"selected_agent\": \"BROWSER\", \"inputs\": \"open youtube\"} tail";
        let draft = extract_decision(raw).expect("draft");
        assert_eq!(draft.selected_agent, "BROWSER");
    }

    #[test]
    fn braces_inside_strings_do_not_change_depth() {
        let raw = "{\"selected_agent\": \"GENERAL\", \"inputs\": \"say {hi}\"}";
        let draft = extract_decision(raw).expect("draft");
        assert_eq!(draft.inputs.as_deref(), Some("say {hi}"));
    }

    #[test]
    fn task_list_roundtrip() {
        let raw = "Splitting now: {\"tasks\": [\"set a reminder\", \"tell me the weather\"]}";
        assert_eq!(
            extract_task_list(raw),
            Some(vec![
                "set a reminder".to_string(),
                "tell me the weather".to_string(),
            ])
        );
    }

    #[test]
    fn empty_or_blank_task_list_is_a_failure() {
        assert_eq!(extract_task_list("{\"tasks\": []}"), None);
        assert_eq!(extract_task_list("{\"tasks\": [\"  \", \"\"]}"), None);
        assert_eq!(extract_task_list("no json here"), None);
    }
}
