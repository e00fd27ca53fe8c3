use std::collections::{BTreeMap, VecDeque};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use jarvis_contracts::capabilities::{
    CapabilityDescriptor, CapabilityRegistry, GENERAL_CAPABILITY, VISION_CAPABILITY,
};
use jarvis_contracts::chat::{
    build_routing_prompt, extract_decision, extract_task_list, RoutingDecision, SPLIT_PROMPT,
};
use jarvis_contracts::config::RouterConfig;
use jarvis_contracts::errors::{snippet, RouteError};
use jarvis_contracts::events::{EventPayload, EventWriter};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub trait ClassifierGateway: Send + Sync {
    fn name(&self) -> &str;
    /// Exactly one external call; no retry at this layer. Output is raw,
    /// untrusted model text.
    fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String>;
}

/// Offline deterministic gateway: keyword-scores the registry and answers
/// with well-formed decision JSON, so the full pipeline runs with no
/// network or credentials.
pub struct DryrunGateway {
    registry: CapabilityRegistry,
}

impl DryrunGateway {
    pub fn new(registry: CapabilityRegistry) -> Self {
        Self { registry }
    }

    fn score(capability: &CapabilityDescriptor, words: &[String]) -> usize {
        capability
            .keywords
            .iter()
            .filter(|keyword| words.iter().any(|word| word == *keyword))
            .count()
    }
}

impl ClassifierGateway for DryrunGateway {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        if system_prompt.contains("\"tasks\"") {
            return Ok(json!({ "tasks": split_conjunctions(user_text) }).to_string());
        }

        let words: Vec<String> = user_text
            .to_ascii_lowercase()
            .split_whitespace()
            .map(|word| {
                word.trim_matches(|ch: char| !ch.is_ascii_alphanumeric())
                    .to_string()
            })
            .filter(|word| !word.is_empty())
            .collect();

        let mut best: Option<(&CapabilityDescriptor, usize)> = None;
        for capability in self.registry.list() {
            let score = Self::score(capability, &words);
            if score > 0 && best.map(|(_, top)| score > top).unwrap_or(true) {
                best = Some((capability, score));
            }
        }
        let selected = best
            .map(|(capability, _)| capability.name.as_str())
            .unwrap_or(GENERAL_CAPABILITY);
        Ok(json!({ "selected_agent": selected, "inputs": user_text }).to_string())
    }
}

fn split_conjunctions(text: &str) -> Vec<String> {
    let mut tasks: Vec<String> = text
        .split(" and then ")
        .flat_map(|part| part.split(", then "))
        .flat_map(|part| part.split("; "))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect();
    if tasks.is_empty() {
        tasks.push(text.trim().to_string());
    }
    tasks
}

/// OpenAI-compatible chat-completions gateway. Credentials and endpoint are
/// configuration; the router owns retry policy.
pub struct OpenAiGateway {
    http: HttpClient,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl OpenAiGateway {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http: HttpClient::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout,
        }
    }

    pub fn from_env(
        base_url: Option<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")?;
        Ok(Self::new(
            base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            api_key,
            model,
            timeout,
        ))
    }
}

impl ClassifierGateway for OpenAiGateway {
    fn name(&self) -> &str {
        "openai"
    }

    fn complete(&self, system_prompt: &str, user_text: &str) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_text},
            ],
            "temperature": 0,
        });
        let response = self
            .http
            .post(format!(
                "{}/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .context("classifier request failed")?;
        let status = response.status();
        let body: Value = response
            .json()
            .context("classifier response was not JSON")?;
        if !status.is_success() {
            bail!(
                "classifier request returned {status}: {}",
                snippet(&body.to_string())
            );
        }
        let content = body
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|choices| choices.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(Value::as_str);
        let Some(content) = content else {
            bail!("classifier response had no message content");
        };
        Ok(content.to_string())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub image_inputs: Vec<PathBuf>,
    pub audio_input: Option<PathBuf>,
    pub metadata: Map<String, Value>,
}

pub trait CapabilityExecutor: Send + Sync {
    fn name(&self) -> &str;
    fn execute(&self, tailored_input: &str, context: &ExecutionContext) -> Result<String>;
}

#[derive(Default)]
pub struct ExecutorRegistry {
    executors: BTreeMap<String, Box<dyn CapabilityExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<E: CapabilityExecutor + 'static>(&mut self, executor: E) {
        self.executors
            .insert(executor.name().to_string(), Box::new(executor));
    }

    pub fn get(&self, name: &str) -> Option<&dyn CapabilityExecutor> {
        self.executors.get(name).map(|executor| executor.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.executors.keys().cloned().collect()
    }
}

/// Offline stand-in for the real downstream handlers; echoes the tailored
/// input so end-to-end runs work with no external services.
struct EchoExecutor {
    capability: String,
}

impl CapabilityExecutor for EchoExecutor {
    fn name(&self) -> &str {
        &self.capability
    }

    fn execute(&self, tailored_input: &str, context: &ExecutionContext) -> Result<String> {
        if self.capability == VISION_CAPABILITY && !context.image_inputs.is_empty() {
            let names: Vec<String> = context
                .image_inputs
                .iter()
                .map(|path| {
                    path.file_name()
                        .map(|name| name.to_string_lossy().to_string())
                        .unwrap_or_else(|| path.to_string_lossy().to_string())
                })
                .collect();
            return Ok(format!(
                "[{}] {} (images: {})",
                self.capability,
                tailored_input,
                names.join(", ")
            ));
        }
        Ok(format!("[{}] {}", self.capability, tailored_input))
    }
}

pub fn default_executor_registry(registry: &CapabilityRegistry) -> ExecutorRegistry {
    let mut executors = ExecutorRegistry::new();
    for name in registry.names() {
        executors.register(EchoExecutor { capability: name });
    }
    executors
}

/// Trim, drop NUL bytes, collapse other control characters to spaces, then
/// truncate on a char boundary. The cache key and duplicate check both work
/// on this cleaned form so stray whitespace does not fragment them.
pub fn clean_input(raw: &str, max_length: usize) -> String {
    let sanitized: String = raw
        .chars()
        .filter(|ch| *ch != '\0')
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect();
    let truncated: String = sanitized.trim().chars().take(max_length).collect();
    truncated.trim_end().to_string()
}

pub fn decision_key(cleaned_text: &str) -> String {
    hex::encode(Sha256::digest(cleaned_text.as_bytes()))
}

#[derive(Debug)]
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            timestamps: VecDeque::with_capacity(limit.max(1)),
        }
    }

    /// Sliding-window admission: entries older than the window are purged
    /// lazily, then the call is admitted only below the limit. Bursts up to
    /// the limit inside any window span are allowed.
    pub fn check_and_record(&mut self, now: Instant) -> bool {
        while let Some(oldest) = self.timestamps.front() {
            if now.duration_since(*oldest) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() >= self.limit {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    pub fn oldest(&self) -> Option<Instant> {
        self.timestamps.front().copied()
    }

    pub fn in_window(&self) -> usize {
        self.timestamps.len()
    }
}

#[derive(Debug)]
pub struct DecisionCache {
    capacity: usize,
    entries: IndexMap<String, RoutingDecision>,
}

impl DecisionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: IndexMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<RoutingDecision> {
        self.entries.get(key).cloned()
    }

    /// FIFO eviction at capacity; lookups do not refresh recency. This
    /// matches the fixed-size memoizer the routing layer always sat on.
    pub fn insert(&mut self, key: String, decision: RoutingDecision) {
        if self.entries.contains_key(&key) {
            self.entries.insert(key, decision);
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, decision);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub recorded_at: Instant,
    pub cleaned_text: String,
    pub decision: RoutingDecision,
    pub latency: Duration,
}

#[derive(Debug)]
pub struct HistoryRing {
    capacity: usize,
    entries: VecDeque<HistoryEntry>,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    pub fn append(&mut self, entry: HistoryEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// O(capacity) scan over retained entries, newest first.
    pub fn find_exact_duplicate(&self, cleaned_text: &str) -> Option<&HistoryEntry> {
        self.entries
            .iter()
            .rev()
            .find(|entry| entry.cleaned_text == cleaned_text)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct StatsInner {
    total_requests: u64,
    errors: u64,
    cache_hits: u64,
    per_capability: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RouterMetrics {
    pub total_requests: u64,
    pub errors: u64,
    pub cache_hits: u64,
    pub per_capability: BTreeMap<String, u64>,
    pub approx_requests_per_second: f64,
}

// A poisoned lock still holds consistent data for these structures; keep
// serving rather than propagating the panic.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Intent dispatcher: cleans input, short-circuits exact duplicates, applies
/// the rate limit, classifies with cache and bounded retry, validates the
/// selected capability, and records history and stats.
///
/// Safe to call from multiple threads; each internal structure serializes its
/// own mutation, and the gateway is never called while a lock is held.
pub struct Router {
    config: RouterConfig,
    registry: CapabilityRegistry,
    gateway: Arc<dyn ClassifierGateway>,
    system_prompt: String,
    limiter: Mutex<RateLimiter>,
    cache: Mutex<DecisionCache>,
    history: Mutex<HistoryRing>,
    stats: Mutex<StatsInner>,
    events: Option<EventWriter>,
}

impl Router {
    pub fn new(
        config: RouterConfig,
        registry: CapabilityRegistry,
        gateway: Arc<dyn ClassifierGateway>,
        events: Option<EventWriter>,
    ) -> Self {
        let system_prompt = build_routing_prompt(&registry);
        let limiter = RateLimiter::new(config.request_limit, config.request_window);
        let cache = DecisionCache::new(config.cache_capacity);
        let history = HistoryRing::new(config.history_capacity);
        Self {
            config,
            registry,
            gateway,
            system_prompt,
            limiter: Mutex::new(limiter),
            cache: Mutex::new(cache),
            history: Mutex::new(history),
            stats: Mutex::new(StatsInner::default()),
            events,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn route(&self, raw_input: &str) -> Result<RoutingDecision, RouteError> {
        lock(&self.stats).total_requests += 1;
        let started = Instant::now();
        match self.route_inner(raw_input, started) {
            Ok(decision) => Ok(decision),
            Err(err) => {
                lock(&self.stats).errors += 1;
                let event_type = match &err {
                    RouteError::RateLimited { .. } => "route_rate_limited",
                    _ => "route_failed",
                };
                self.emit(event_type, map_object(json!({ "error": err.to_string() })));
                Err(err)
            }
        }
    }

    fn route_inner(
        &self,
        raw_input: &str,
        started: Instant,
    ) -> Result<RoutingDecision, RouteError> {
        let cleaned = clean_input(raw_input, self.config.max_input_length);
        if cleaned.is_empty() {
            return Err(RouteError::EmptyInput);
        }

        // Identical recent turns bypass both the limiter and the classifier.
        let duplicate = lock(&self.history)
            .find_exact_duplicate(&cleaned)
            .map(|entry| entry.decision.clone());
        if let Some(decision) = duplicate {
            lock(&self.stats).cache_hits += 1;
            self.emit(
                "route_cached",
                map_object(json!({
                    "source": "history",
                    "capability": decision.selected_capability,
                })),
            );
            return Ok(decision);
        }

        if !lock(&self.limiter).check_and_record(Instant::now()) {
            return Err(RouteError::RateLimited {
                limit: self.config.request_limit,
                window_seconds: self.config.request_window.as_secs(),
            });
        }

        let key = decision_key(&cleaned);
        let cached = lock(&self.cache).get(&key);
        let (decision, cached_hit) = match cached {
            Some(decision) => (decision, true),
            // The gateway call blocks on external I/O; no router lock is
            // held across it. Two threads may classify the same key
            // concurrently; last write wins.
            None => (self.classify_with_retry(&cleaned)?, false),
        };

        if !self.registry.contains(&decision.selected_capability) {
            return Err(RouteError::UnknownCapability {
                name: decision.selected_capability,
            });
        }

        if cached_hit {
            lock(&self.stats).cache_hits += 1;
        } else {
            lock(&self.cache).insert(key, decision.clone());
        }

        lock(&self.history).append(HistoryEntry {
            recorded_at: started,
            cleaned_text: cleaned,
            decision: decision.clone(),
            latency: started.elapsed(),
        });
        {
            let mut stats = lock(&self.stats);
            *stats
                .per_capability
                .entry(decision.selected_capability.clone())
                .or_insert(0) += 1;
        }
        self.emit(
            "route_completed",
            map_object(json!({
                "capability": decision.selected_capability,
                "cached": cached_hit,
                "latency_ms": started.elapsed().as_millis() as u64,
            })),
        );
        Ok(decision)
    }

    fn classify_with_retry(&self, cleaned: &str) -> Result<RoutingDecision, RouteError> {
        let attempts = self.config.classify_retry_attempts.max(1);
        let mut last_raw = String::new();
        let mut last_gateway_error: Option<String> = None;
        for attempt in 0..attempts {
            if attempt > 0 {
                thread::sleep(self.config.classify_retry_delay);
            }
            match self.gateway.complete(&self.system_prompt, cleaned) {
                Ok(raw) => {
                    if let Some(draft) = extract_decision(&raw) {
                        return Ok(RoutingDecision {
                            selected_capability: draft.selected_agent,
                            tailored_input: draft
                                .inputs
                                .unwrap_or_else(|| cleaned.to_string()),
                        });
                    }
                    last_raw = raw;
                    last_gateway_error = None;
                }
                Err(err) => {
                    last_gateway_error = Some(format!("{err:#}"));
                }
            }
        }
        match last_gateway_error {
            Some(detail) => Err(RouteError::Gateway {
                detail: snippet(&detail),
            }),
            None => Err(RouteError::ClassificationParse {
                attempts,
                snippet: snippet(&last_raw),
            }),
        }
    }

    pub fn metrics(&self) -> RouterMetrics {
        let stats = lock(&self.stats);
        // Advisory only; noisy when the limiter deque is sparse.
        let approx_requests_per_second = lock(&self.limiter)
            .oldest()
            .map(|oldest| {
                let span = oldest.elapsed().as_secs_f64();
                if span > 0.0 {
                    stats.total_requests as f64 / span
                } else {
                    0.0
                }
            })
            .unwrap_or(0.0);
        RouterMetrics {
            total_requests: stats.total_requests,
            errors: stats.errors,
            cache_hits: stats.cache_hits,
            per_capability: stats.per_capability.clone(),
            approx_requests_per_second,
        }
    }

    // Telemetry is best effort and never fails a route.
    fn emit(&self, event_type: &str, payload: EventPayload) {
        if let Some(events) = &self.events {
            let _ = events.emit(event_type, payload);
        }
    }
}

pub struct TaskSplitter {
    gateway: Arc<dyn ClassifierGateway>,
}

impl TaskSplitter {
    pub fn new(gateway: Arc<dyn ClassifierGateway>) -> Self {
        Self { gateway }
    }

    /// Decomposition failure never loses the request, it only fails to
    /// subdivide it: any gateway or parse failure returns the input as the
    /// single task, untouched.
    pub fn split(&self, raw_input: &str) -> Vec<String> {
        if let Ok(raw) = self.gateway.complete(SPLIT_PROMPT, raw_input) {
            if let Some(tasks) = extract_task_list(&raw) {
                return tasks;
            }
        }
        vec![raw_input.to_string()]
    }
}

/// Stages of one task's path through the machine. Every task that enters
/// `Route` reaches `Synthesize`; there is no terminating path that skips it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Route,
    Execute(String),
    Synthesize,
}

impl Stage {
    pub fn label(&self) -> String {
        match self {
            Stage::Route => "ROUTE".to_string(),
            Stage::Execute(capability) => format!("EXECUTE:{capability}"),
            Stage::Synthesize => "SYNTHESIZE".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskOutcome {
    pub request: String,
    pub capability: Option<String>,
    pub stages: Vec<String>,
    pub output: Option<String>,
    pub vision_output: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionOutcome {
    pub results: Vec<TaskOutcome>,
    pub merged_response: String,
}

pub struct OrchestrationMachine {
    router: Arc<Router>,
    splitter: TaskSplitter,
    executors: Arc<ExecutorRegistry>,
    events: Option<EventWriter>,
}

impl OrchestrationMachine {
    pub fn new(
        router: Arc<Router>,
        splitter: TaskSplitter,
        executors: Arc<ExecutorRegistry>,
        events: Option<EventWriter>,
    ) -> Self {
        Self {
            router,
            splitter,
            executors,
            events,
        }
    }

    pub fn run(
        &self,
        initial_input: &str,
        image_inputs: &[PathBuf],
        audio_input: Option<&Path>,
    ) -> SessionOutcome {
        let context = ExecutionContext {
            image_inputs: image_inputs.to_vec(),
            audio_input: audio_input.map(Path::to_path_buf),
            metadata: Map::new(),
        };
        let tasks = self.splitter.split(initial_input);
        let mut results = Vec::with_capacity(tasks.len());
        // Sub-tasks run in list order; only the text/vision fan-out inside a
        // single task is parallel.
        for task in &tasks {
            results.push(self.run_task(task, &context));
        }
        let merged_response = merge_results(&results);
        self.emit(
            "synthesis_ready",
            map_object(json!({ "tasks": results.len() })),
        );
        SessionOutcome {
            results,
            merged_response,
        }
    }

    fn run_task(&self, task: &str, context: &ExecutionContext) -> TaskOutcome {
        let mut stages = vec![Stage::Route.label()];
        self.emit(
            "task_started",
            map_object(json!({ "request": snippet(task) })),
        );

        let decision = match self.router.route(task) {
            Ok(decision) => decision,
            Err(RouteError::UnknownCapability { name }) => {
                // The router never guesses; a single bad classification
                // degrades to a best-effort general answer here, and only
                // here.
                self.emit(
                    "route_fallback",
                    map_object(json!({ "unknown_capability": name })),
                );
                RoutingDecision {
                    selected_capability: GENERAL_CAPABILITY.to_string(),
                    tailored_input: clean_input(task, self.router.config().max_input_length),
                }
            }
            Err(err) => {
                stages.push(Stage::Synthesize.label());
                return TaskOutcome {
                    request: task.to_string(),
                    capability: None,
                    stages,
                    output: None,
                    vision_output: None,
                    error: Some(err.to_string()),
                };
            }
        };

        let stage = self.next_stage(&decision);
        stages.push(stage.label());
        let Stage::Execute(capability) = stage else {
            unreachable!("routing always advances to an execute stage")
        };

        let (output, vision_output) = self.execute_with_fanout(&capability, &decision, task, context);
        stages.push(Stage::Synthesize.label());
        TaskOutcome {
            request: task.to_string(),
            capability: Some(capability),
            stages,
            output: Some(output),
            vision_output,
            error: None,
        }
    }

    /// Transition out of `Route`: always the state named by the decision,
    /// with GENERAL as the explicit fallback for names outside the registry.
    fn next_stage(&self, decision: &RoutingDecision) -> Stage {
        if self.router.registry().contains(&decision.selected_capability) {
            Stage::Execute(decision.selected_capability.clone())
        } else {
            Stage::Execute(GENERAL_CAPABILITY.to_string())
        }
    }

    fn execute_with_fanout(
        &self,
        capability: &str,
        decision: &RoutingDecision,
        task: &str,
        context: &ExecutionContext,
    ) -> (String, Option<String>) {
        let wants_vision = !context.image_inputs.is_empty() && capability != VISION_CAPABILITY;
        if !wants_vision {
            let primary = execute_on(
                self.executors.as_ref(),
                capability,
                &decision.tailored_input,
                context,
            );
            return (self.branch_text(capability, primary), None);
        }

        // Fan out: the routed capability and vision run on independent
        // executions with no shared mutable state, then join.
        let executors = Arc::clone(&self.executors);
        let vision_input = task.to_string();
        let vision_context = context.clone();
        let handle = thread::spawn(move || {
            execute_on(
                executors.as_ref(),
                VISION_CAPABILITY,
                &vision_input,
                &vision_context,
            )
        });
        let primary = execute_on(
            self.executors.as_ref(),
            capability,
            &decision.tailored_input,
            context,
        );
        let vision = match handle.join() {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("vision branch panicked")),
        };
        (
            self.branch_text(capability, primary),
            Some(self.branch_text(VISION_CAPABILITY, vision)),
        )
    }

    // A failed branch becomes an inline marker; the join never aborts.
    fn branch_text(&self, capability: &str, result: Result<String>) -> String {
        match result {
            Ok(output) => output,
            Err(err) => {
                self.emit(
                    "branch_failed",
                    map_object(json!({
                        "capability": capability,
                        "error": snippet(&format!("{err:#}")),
                    })),
                );
                format!("[{capability} failed: {err:#}]")
            }
        }
    }

    fn emit(&self, event_type: &str, payload: EventPayload) {
        if let Some(events) = &self.events {
            let _ = events.emit(event_type, payload);
        }
    }
}

fn execute_on(
    executors: &ExecutorRegistry,
    capability: &str,
    input: &str,
    context: &ExecutionContext,
) -> Result<String> {
    let Some(executor) = executors.get(capability) else {
        bail!("no executor registered for capability '{capability}'");
    };
    executor.execute(input, context)
}

fn merge_results(results: &[TaskOutcome]) -> String {
    let mut sections = Vec::new();
    for outcome in results {
        if let Some(error) = &outcome.error {
            sections.push(format!("[request not routed: {error}]"));
            continue;
        }
        let mut section = outcome.output.clone().unwrap_or_default();
        if let Some(vision) = &outcome.vision_output {
            if !section.is_empty() {
                section.push('\n');
            }
            section.push_str(vision);
        }
        sections.push(section);
    }
    sections.join("\n\n")
}

fn map_object(value: Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}
