use aria_core::Plugin;
use std::collections::HashMap;
use std::sync::Arc;

/// What the controller decided an utterance is asking for.
///
/// `route` evaluates matchers in a fixed, documented order; the first match
/// wins. Learned custom commands are not routed here — the controller checks
/// the learning store between the exit stage and the plugin stages, so a
/// custom pattern outranks every plugin intent but never a mode toggle or
/// exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    TextMode,
    VoiceMode,
    Exit,
    OpenApp,
    CloseApp,
    Weather,
    WebSearch,
    SystemPower,
    VisualQuery,
    Music,
    Learn,
    SelfUpdate,
    KnowledgeQuery,
    General,
}

impl Intent {
    /// Human-readable name used in "feature unavailable" replies.
    pub fn describe(&self) -> &'static str {
        match self {
            Intent::OpenApp => "application launcher",
            Intent::CloseApp => "application closer",
            Intent::Weather => "weather",
            Intent::WebSearch => "web search",
            Intent::SystemPower => "system power control",
            Intent::VisualQuery => "screen analysis",
            Intent::Music => "music",
            _ => "requested",
        }
    }
}

/// Ordered first-match-wins routing. The order mirrors the execution
/// precedence: mode toggles, exit, plugin intents, learning, update,
/// knowledge query, then the general Q&A fallback.
pub fn route(text: &str) -> Intent {
    let text = text.to_lowercase();

    let matchers: [(&[&str], Intent); 13] = [
        (&["switch to text", "write on screen"], Intent::TextMode),
        (&["switch to voice", "speak aloud"], Intent::VoiceMode),
        (&["stop", "exit", "quit"], Intent::Exit),
        (&["open", "launch"], Intent::OpenApp),
        (&["close"], Intent::CloseApp),
        (&["weather"], Intent::Weather),
        (&["search", "look up"], Intent::WebSearch),
        (
            &["shutdown", "shut down", "turn off", "power off", "restart", "reboot"],
            Intent::SystemPower,
        ),
        (
            &["on the screen", "what do you see", "screenshot"],
            Intent::VisualQuery,
        ),
        (&["play music", "some music"], Intent::Music),
        (&["learn", "remember"], Intent::Learn),
        (&["update yourself", "update your knowledge"], Intent::SelfUpdate),
        (
            &["what do you know about", "tell me about"],
            Intent::KnowledgeQuery,
        ),
    ];

    for (keywords, intent) in matchers {
        if keywords.iter().any(|k| text.contains(k)) {
            return intent;
        }
    }

    Intent::General
}

/// Intent → handler table for the fixed plugin intents.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<Intent, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, intent: Intent, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(intent, plugin);
    }

    pub fn get(&self, intent: Intent) -> Option<&Arc<dyn Plugin>> {
        self.plugins.get(&intent)
    }
}
