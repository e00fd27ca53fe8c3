use indexmap::IndexMap;

pub const GENERAL_CAPABILITY: &str = "GENERAL";
pub const VISION_CAPABILITY: &str = "VISION";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub description: String,
    pub examples: Vec<String>,
    pub keywords: Vec<String>,
}

/// Static set of selectable capabilities, fixed at construction.
///
/// Names are unique and case-sensitive; insertion order is preserved so the
/// classification prompt always enumerates capabilities the same way.
#[derive(Debug, Clone)]
pub struct CapabilityRegistry {
    capabilities: IndexMap<String, CapabilityDescriptor>,
}

impl CapabilityRegistry {
    pub fn new(capabilities: Option<IndexMap<String, CapabilityDescriptor>>) -> Self {
        Self {
            capabilities: capabilities.unwrap_or_else(default_capabilities),
        }
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityDescriptor> {
        self.capabilities.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    pub fn list(&self) -> impl Iterator<Item = &CapabilityDescriptor> {
        self.capabilities.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

fn default_capabilities() -> IndexMap<String, CapabilityDescriptor> {
    let mut map = IndexMap::new();

    let mut insert = |name: &str, description: &str, examples: &[&str], keywords: &[&str]| {
        map.insert(
            name.to_string(),
            CapabilityDescriptor {
                name: name.to_string(),
                description: description.to_string(),
                examples: examples.iter().map(|item| (*item).to_string()).collect(),
                keywords: keywords.iter().map(|item| (*item).to_string()).collect(),
            },
        );
    };

    insert(
        "VISION",
        "Analyze camera frames, screenshots, or attached images and describe or answer questions about them.",
        &[
            "what is in this picture",
            "describe what you can see right now",
            "read the text on that screenshot",
        ],
        &["image", "picture", "photo", "camera", "see", "look", "screenshot"],
    );
    insert(
        "GENERAL",
        "Answer general-knowledge questions and hold open-ended conversation.",
        &[
            "who wrote moby dick",
            "explain how tides work",
            "tell me a joke",
        ],
        &["explain", "question", "joke", "story", "fact"],
    );
    insert(
        "MEMORY",
        "Store and recall facts the user asked to be remembered.",
        &[
            "remember that my locker code is 4812",
            "what did I tell you about sarah's birthday",
            "forget what I said about the meeting",
        ],
        &["remember", "recall", "forget", "note", "memory"],
    );
    insert(
        "PERSONAL",
        "Manage reminders, todo items, shopping lists, and calendar entries.",
        &[
            "set a reminder for 6pm to call mum",
            "add milk to my shopping list",
            "what is on my calendar tomorrow",
        ],
        &["reminder", "remind", "task", "todo", "list", "calendar", "schedule", "appointment"],
    );
    insert(
        "SOFTWARE",
        "Install, update, or remove software on the host machine.",
        &[
            "install firefox",
            "update my packages",
            "remove the old java runtime",
        ],
        &["install", "update", "upgrade", "uninstall", "remove", "package", "software"],
    );
    insert(
        "BROWSER",
        "Drive the web browser: open pages, search the web, fill forms.",
        &[
            "open youtube",
            "search the web for rust tutorials",
            "go to my bank's website",
        ],
        &["open", "browse", "website", "web", "search", "url", "page"],
    );
    insert(
        "SENSOR",
        "Report readings from connected home sensors and device state.",
        &[
            "what is the temperature in the living room",
            "is the front door locked",
            "how humid is it inside",
        ],
        &["temperature", "humidity", "sensor", "door", "window", "light", "battery"],
    );
    insert(
        "CONSCIOUSNESS",
        "Report on the assistant's own state, mood, and current activity.",
        &[
            "how are you feeling",
            "what are you working on right now",
            "are you busy",
        ],
        &["feeling", "mood", "yourself", "busy", "state", "status"],
    );

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_all_capabilities() {
        let registry = CapabilityRegistry::new(None);
        for name in [
            "VISION",
            "GENERAL",
            "MEMORY",
            "PERSONAL",
            "SOFTWARE",
            "BROWSER",
            "SENSOR",
            "CONSCIOUSNESS",
        ] {
            assert!(registry.contains(name), "missing capability {name}");
        }
        assert_eq!(registry.len(), 8);
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let registry = CapabilityRegistry::new(None);
        assert!(registry.contains("GENERAL"));
        assert!(!registry.contains("general"));
        assert!(!registry.contains("Nonexistent"));
    }

    #[test]
    fn names_preserve_insertion_order() {
        let registry = CapabilityRegistry::new(None);
        let names = registry.names();
        assert_eq!(names.first().map(String::as_str), Some("VISION"));
        assert_eq!(names.last().map(String::as_str), Some("CONSCIOUSNESS"));
    }

    #[test]
    fn descriptors_carry_examples_and_keywords() {
        let registry = CapabilityRegistry::new(None);
        let sensor = registry.get("SENSOR").expect("sensor capability");
        assert!(!sensor.examples.is_empty());
        assert!(sensor.keywords.iter().any(|word| word == "temperature"));
    }
}
