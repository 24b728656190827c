//! Command dispatch for the element panel.
//!
//! The window forwards every user action as a [`PanelCommand`]; [`Panel::dispatch`]
//! runs the matching handler against the injected store, completion service and
//! build step and answers with the [`PanelEvent`]s the window should act on.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use crate::build::{BuildError, BuildStep};
use crate::config::{DEFAULT_ENDPOINT_URL, DEFAULT_MODEL};
use crate::ollama::{CompletionError, CompletionService};
use crate::prefs::{PrefKey, PreferenceStore, Preferences};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCommand {
    Startup,
    Create(String),
    CopyElement,
    SetEndpointUrl(String),
    SetModelName(String),
    SetupModalExit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn info(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelEvent {
    Notify(Notice),
    DisplayElement(String),
    CopyToClipboard(String),
    Reload,
}

/// Everything a panel action can fail with. None of it is fatal.
#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("CSS build failed: {0}")]
    Build(#[from] BuildError),
}

impl PanelError {
    fn notice(&self) -> Notice {
        match self {
            PanelError::Completion(_) => Notice::error(format!("Error: {}", self)),
            PanelError::Build(_) => Notice::warning(format!("Warning: {}", self)),
        }
    }
}

/// The store sits behind its own lock, taken only for the duration of a
/// read or write. A slow completion never holds it, so settings edits land
/// while a request is outstanding.
pub struct Panel<S, C, B> {
    store: Arc<Mutex<S>>,
    completion: Arc<C>,
    build: Arc<B>,
    default_endpoint_url: String,
    default_model: String,
}

impl<S, C, B> Clone for Panel<S, C, B> {
    fn clone(&self) -> Self {
        Panel {
            store: self.store.clone(),
            completion: self.completion.clone(),
            build: self.build.clone(),
            default_endpoint_url: self.default_endpoint_url.clone(),
            default_model: self.default_model.clone(),
        }
    }
}

impl<S, C, B> Panel<S, C, B>
where
    S: PreferenceStore,
    C: CompletionService,
    B: BuildStep,
{
    pub fn new(store: S, completion: C, build: B) -> Self {
        Panel {
            store: Arc::new(Mutex::new(store)),
            completion: Arc::new(completion),
            build: Arc::new(build),
            default_endpoint_url: DEFAULT_ENDPOINT_URL.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
        }
    }

    /// Endpoint and model used while the corresponding preference is unset.
    pub fn with_defaults(mut self, endpoint_url: String, model: String) -> Self {
        self.default_endpoint_url = endpoint_url;
        self.default_model = model;
        self
    }

    fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut store)
    }

    pub fn preferences(&self) -> Preferences {
        self.with_store(|store| store.load())
    }

    pub fn preference(&self, key: PrefKey) -> Option<String> {
        self.with_store(|store| store.get(key))
    }

    pub async fn dispatch(&self, command: PanelCommand) -> Vec<PanelEvent> {
        match command {
            PanelCommand::Startup => self.startup().await,
            PanelCommand::Create(prompt) => self.create(&prompt).await,
            PanelCommand::CopyElement => self.copy_element(),
            PanelCommand::SetEndpointUrl(url) => {
                self.with_store(|store| store.set(PrefKey::EndpointUrl, &url));
                Vec::new()
            }
            PanelCommand::SetModelName(model) => {
                self.with_store(|store| store.set(PrefKey::ModelName, &model));
                Vec::new()
            }
            PanelCommand::SetupModalExit => vec![
                PanelEvent::Notify(Notice::info("Setup modal exited.")),
                PanelEvent::Reload,
            ],
        }
    }

    async fn startup(&self) -> Vec<PanelEvent> {
        match self.build.build().await {
            Ok(()) => built_events(),
            Err(e) => {
                warn!("startup build failed: {}", e);
                vec![PanelEvent::Notify(Notice::error(format!("Error: {}", e)))]
            }
        }
    }

    async fn create(&self, prompt: &str) -> Vec<PanelEvent> {
        if prompt.is_empty() {
            return Vec::new();
        }

        let mut events = vec![PanelEvent::Notify(Notice::info("Creating element..."))];

        match self.generate(prompt).await {
            Ok(element) => {
                events.push(PanelEvent::Notify(Notice::info("Element created.")));
                match self.build.publish(&element).await {
                    Ok(()) => events.extend(built_events()),
                    Err(e) => {
                        let e = PanelError::from(e);
                        warn!("{}", e);
                        events.push(PanelEvent::Notify(e.notice()));
                    }
                }
                events.push(PanelEvent::DisplayElement(element));
            }
            Err(e) => {
                let e = PanelError::from(e);
                warn!("element request failed: {}", e);
                events.push(PanelEvent::Notify(e.notice()));
            }
        }

        events
    }

    /// Requests a new element and stores it. The stored element is only
    /// replaced once a response has been parsed successfully.
    pub async fn generate(&self, prompt: &str) -> Result<String, CompletionError> {
        let prefs = self.preferences();
        let endpoint_url = prefs
            .endpoint_url
            .unwrap_or_else(|| self.default_endpoint_url.clone());
        let model_name = prefs
            .model_name
            .unwrap_or_else(|| self.default_model.clone());

        let element = self
            .completion
            .request_element(prompt, &endpoint_url, &model_name)
            .await?;

        info!(bytes = element.len(), "element created");
        self.with_store(|store| store.set(PrefKey::Element, &element));
        Ok(element)
    }

    fn copy_element(&self) -> Vec<PanelEvent> {
        match self.preference(PrefKey::Element) {
            Some(element) if !element.is_empty() => vec![
                PanelEvent::Notify(Notice::info("Element copied to clipboard.")),
                PanelEvent::CopyToClipboard(element),
            ],
            _ => vec![PanelEvent::Notify(Notice::info("No element to copy."))],
        }
    }
}

fn built_events() -> Vec<PanelEvent> {
    vec![
        PanelEvent::Notify(Notice::info("Tailwind CSS built successfully!")),
        PanelEvent::Reload,
    ]
}
