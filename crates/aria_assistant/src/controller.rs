use crate::dispatch::{route, Intent, PluginRegistry};
use crate::session::{Phase, Session, SessionStats};
use crate::update::UpdateManager;
use anyhow::{Context, Result};
use aria_core::security::is_affirmative;
use aria_core::{
    AriaConfig, AssistantError, Generator, InteractionKind, Listener, SecurityClassifier,
    SecurityLevel, SecurityVerdict, Speaker,
};
use aria_memory::{ContextComposer, KnowledgeStore, LearningStore, Metadata};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// How long one listening pass waits for a command before the loop re-checks
/// session state.
const COMMAND_LISTEN_SECS: u64 = 5;
/// How long the teaching flow waits for the command sentence.
const TEACH_LISTEN_SECS: u64 = 10;

/// The finite-state control loop driving one utterance at a time end to end.
///
/// Transitions: Inactive → Listening on start; Listening → Processing once an
/// open session captures a command; Processing → Responding always (success
/// and failure alike), passing through Learning while a teach command waits
/// for its sentence; Responding → Listening after delivery; any phase →
/// Error on an unhandled fault; Error → Listening after a fixed backoff.
/// At most one command is in flight; concurrency lives only in the external
/// collaborators this loop awaits.
pub struct Controller {
    config: AriaConfig,
    classifier: SecurityClassifier,
    listener: Arc<dyn Listener>,
    speaker: Arc<dyn Speaker>,
    generator: Arc<dyn Generator>,
    plugins: PluginRegistry,
    updates: UpdateManager,
    learning: Arc<LearningStore>,
    knowledge: Arc<KnowledgeStore>,
    composer: ContextComposer,
    session: Arc<RwLock<Session>>,
    stats: Arc<RwLock<SessionStats>>,
    /// Pending auto-close of the activation session. A new command must cancel
    /// it before a new one is scheduled, never race with it.
    idle_timer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Controller {
    pub fn new(
        config: AriaConfig,
        listener: Arc<dyn Listener>,
        speaker: Arc<dyn Speaker>,
        generator: Arc<dyn Generator>,
        plugins: PluginRegistry,
        learning: Arc<LearningStore>,
        knowledge: Arc<KnowledgeStore>,
    ) -> Result<Self> {
        let classifier = SecurityClassifier::from_config(&config.security)
            .context("Failed to build security classifier")?;
        let composer = ContextComposer::new(
            knowledge.clone(),
            config.retrieval.top_k,
            config.retrieval.max_context_chars,
        );

        Ok(Self {
            config,
            classifier,
            listener,
            speaker,
            generator,
            plugins,
            updates: UpdateManager::new(),
            learning,
            knowledge,
            composer,
            session: Arc::new(RwLock::new(Session::default())),
            stats: Arc::new(RwLock::new(SessionStats::default())),
            idle_timer: tokio::sync::Mutex::new(None),
        })
    }

    pub fn set_update_manager(&mut self, updates: UpdateManager) {
        self.updates = updates;
    }

    pub fn session(&self) -> Arc<RwLock<Session>> {
        self.session.clone()
    }

    pub async fn stats_snapshot(&self) -> (u64, u64, u64, u64, u64) {
        let stats = self.stats.read().await;
        (
            stats.total_interactions,
            stats.successful_commands,
            stats.failed_commands,
            stats.learning_sessions,
            stats.uptime_secs(),
        )
    }

    // ========================================================================
    // Loop
    // ========================================================================

    /// Inactive → Listening.
    pub async fn start(&self) {
        let mut session = self.session.write().await;
        session.active = true;
        session.phase = Phase::Listening;
        tracing::info!("Assistant started, waiting for activation phrase");
    }

    /// Drive the loop until an exit command deactivates the session.
    pub async fn run(&self) -> Result<()> {
        self.start().await;
        loop {
            self.step().await;
            {
                // The exit path finishes in Responding (farewell delivered),
                // then lands in Inactive.
                let session = self.session.read().await;
                if !session.active && session.phase == Phase::Inactive {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        self.shutdown().await;
        Ok(())
    }

    /// Execute exactly one phase handler. An unhandled fault moves the loop to
    /// the Error phase; it never escapes.
    pub async fn step(&self) {
        let phase = self.session.read().await.phase;
        let result = match phase {
            Phase::Inactive => Ok(()),
            Phase::Listening => self.handle_listening().await,
            Phase::Processing => self.handle_processing().await,
            Phase::Responding => self.handle_responding().await,
            Phase::Learning => {
                // Transient bookkeeping phase; return to listening.
                self.session.write().await.phase = Phase::Listening;
                Ok(())
            }
            Phase::Error => self.handle_error().await,
        };

        if let Err(e) = result {
            tracing::error!("Fault in {:?} phase: {}", phase, e);
            self.session.write().await.phase = Phase::Error;
        }
    }

    async fn handle_listening(&self) -> Result<()> {
        let listening = self.session.read().await.listening;

        if !listening {
            let heard = self
                .listener
                .listen_for_activation()
                .await
                .map_err(|e| AssistantError::external("listener", e))?;
            if let Some(text) = heard {
                if self.is_activation_phrase(&text) {
                    self.activate().await?;
                }
            }
        } else {
            let heard = self
                .listener
                .listen(Duration::from_secs(COMMAND_LISTEN_SECS))
                .await
                .map_err(|e| AssistantError::external("listener", e))?;
            if let Some(text) = heard {
                {
                    let mut session = self.session.write().await;
                    session.current_command = text;
                    session.phase = Phase::Processing;
                }
                // A captured command cancels the pending auto-close before
                // the processing step runs; the timer task additionally
                // refuses to close once the phase has left Listening.
                self.cancel_idle_timer().await;
            }
        }
        Ok(())
    }

    async fn handle_processing(&self) -> Result<()> {
        let command = self.session.read().await.current_command.clone();

        let verdict = self.classifier.classify(&command);

        if verdict.level == SecurityLevel::Blocked {
            tracing::warn!("Blocked command refused: {}", command);
            self.learning
                .log_interaction(&command, InteractionKind::Command, "", false)
                .await;
            let mut stats = self.stats.write().await;
            stats.total_interactions += 1;
            stats.failed_commands += 1;
            drop(stats);
            self.finish_processing(verdict.message).await;
            return Ok(());
        }

        if verdict.requires_confirmation() {
            let confirmed = match self.confirm(&command, &verdict).await {
                Ok(confirmed) => confirmed,
                Err(e) => {
                    // A collaborator fault mid-confirmation still marks the
                    // command as failed before the loop recovers.
                    tracing::error!("Confirmation exchange failed: {:#}", e);
                    self.learning
                        .log_interaction(&command, InteractionKind::Command, "", false)
                        .await;
                    let mut stats = self.stats.write().await;
                    stats.total_interactions += 1;
                    stats.failed_commands += 1;
                    drop(stats);
                    self.finish_processing("I couldn't complete that command.".to_string())
                        .await;
                    return Ok(());
                }
            };
            if !confirmed {
                tracing::info!("Command cancelled by user: {}", command);
                self.learning
                    .log_interaction(&command, InteractionKind::Command, "", false)
                    .await;
                let mut stats = self.stats.write().await;
                stats.total_interactions += 1;
                stats.failed_commands += 1;
                drop(stats);
                self.finish_processing("Command cancelled.".to_string()).await;
                return Ok(());
            }
        }

        self.learning
            .log_interaction(&command, InteractionKind::Command, "", true)
            .await;
        self.stats.write().await.total_interactions += 1;

        let response = match self.execute(&command).await {
            Ok(response) => {
                self.stats.write().await.successful_commands += 1;
                response
            }
            Err(e) => {
                // Execution faults surface as a generic failure message,
                // never as the raw fault.
                tracing::error!("Command execution failed: {:#}", e);
                self.stats.write().await.failed_commands += 1;
                "I couldn't complete that command.".to_string()
            }
        };

        self.finish_processing(response).await;
        Ok(())
    }

    /// Processing always terminates in Responding.
    async fn finish_processing(&self, response: String) {
        let mut session = self.session.write().await;
        session.current_response = response;
        session.phase = Phase::Responding;
    }

    async fn handle_responding(&self) -> Result<()> {
        let (command, response, on_screen) = {
            let session = self.session.read().await;
            (
                session.current_command.clone(),
                session.current_response.clone(),
                session.show_on_screen,
            )
        };

        self.learning
            .log_interaction(&command, InteractionKind::Response, &response, true)
            .await;

        // Index the exchange for later retrieval. A persistence fault here
        // degrades to a warning; the response is still delivered.
        if let Err(e) = self.knowledge.add_interaction(&command, &response).await {
            tracing::warn!("Failed to index interaction: {}", e);
        }

        if on_screen {
            println!("aria: {}", response);
        } else {
            self.speaker
                .speak(&response)
                .await
                .map_err(|e| AssistantError::external("speaker", e))?;
        }

        let mut session = self.session.write().await;
        session.current_command.clear();
        session.current_response.clear();
        if session.active {
            session.phase = Phase::Listening;
        } else {
            // An exit command deactivated the session during execution.
            session.phase = Phase::Inactive;
            session.listening = false;
        }
        let still_listening = session.listening;
        drop(session);

        // The idle window restarts from the end of this command.
        if still_listening {
            self.arm_idle_timer().await;
        }
        Ok(())
    }

    async fn handle_error(&self) -> Result<()> {
        tokio::time::sleep(Duration::from_secs(self.config.activation.error_backoff_secs)).await;
        self.session.write().await.phase = Phase::Listening;
        Ok(())
    }

    async fn shutdown(&self) {
        self.cancel_idle_timer().await;
        let mut session = self.session.write().await;
        session.active = false;
        session.listening = false;
        session.phase = Phase::Inactive;
        drop(session);

        let stats = self.stats.read().await;
        tracing::info!(
            "Assistant stopped after {}: {} interactions, {} ok, {} failed, {} learning sessions",
            stats.format_uptime(),
            stats.total_interactions,
            stats.successful_commands,
            stats.failed_commands,
            stats.learning_sessions,
        );
    }

    // ========================================================================
    // Activation session
    // ========================================================================

    fn is_activation_phrase(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.config
            .activation
            .phrases
            .iter()
            .any(|p| text.contains(&p.to_lowercase()))
    }

    async fn activate(&self) -> Result<()> {
        self.session.write().await.listening = true;

        let greeting = self
            .config
            .activation
            .greetings
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| "Yes?".to_string());
        self.speaker
            .speak(&greeting)
            .await
            .map_err(|e| AssistantError::external("speaker", e))?;

        self.arm_idle_timer().await;
        Ok(())
    }

    /// Schedule the session auto-close, cancelling any pending one first.
    async fn arm_idle_timer(&self) {
        let mut guard = self.idle_timer.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
        }

        let session = self.session.clone();
        let speaker = self.speaker.clone();
        let timeout = Duration::from_secs(self.config.activation.idle_timeout_secs);
        *guard = Some(tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut session = session.write().await;
            // A command in flight keeps the session open even when the abort
            // has not landed yet.
            if session.listening && session.phase == Phase::Listening {
                session.listening = false;
                drop(session);
                tracing::info!("Activation session closed after idle timeout");
                let _ = speaker.speak("Going back to standby.").await;
            }
        }));
    }

    async fn cancel_idle_timer(&self) {
        if let Some(handle) = self.idle_timer.lock().await.take() {
            handle.abort();
        }
    }

    // ========================================================================
    // Confirmation protocol
    // ========================================================================

    /// Ask for confirmation of a dangerous/caution command. Anything but an
    /// affirmative reply within the timeout cancels; a timeout is a normal
    /// outcome, never a retry.
    async fn confirm(&self, command: &str, verdict: &SecurityVerdict) -> Result<bool> {
        let prompt = self.classifier.confirmation_prompt(command, verdict);
        self.speaker
            .speak(&prompt)
            .await
            .map_err(|e| AssistantError::external("speaker", e))?;

        let reply = self
            .listener
            .listen(Duration::from_secs(
                self.config.security.confirmation_timeout_secs,
            ))
            .await
            .map_err(|e| AssistantError::external("listener", e))?;

        Ok(match reply {
            Some(text) => is_affirmative(&text, &self.config.security.confirmation_tokens),
            None => false,
        })
    }

    // ========================================================================
    // Dispatch (fixed precedence)
    // ========================================================================

    async fn execute(&self, command: &str) -> Result<String> {
        match route(command) {
            Intent::TextMode => {
                self.session.write().await.show_on_screen = true;
                Ok("Switched to text mode.".to_string())
            }
            Intent::VoiceMode => {
                self.session.write().await.show_on_screen = false;
                Ok("Back to voice mode.".to_string())
            }
            Intent::Exit => {
                self.session.write().await.active = false;
                Ok(self.config.activation.farewell.clone())
            }
            intent => {
                // Learned commands outrank every plugin intent.
                if let Some(custom) = self.learning.lookup(command).await? {
                    return Ok(custom);
                }
                self.dispatch(intent, command).await
            }
        }
    }

    async fn dispatch(&self, intent: Intent, command: &str) -> Result<String> {
        match intent {
            Intent::OpenApp
            | Intent::CloseApp
            | Intent::Weather
            | Intent::WebSearch
            | Intent::SystemPower
            | Intent::VisualQuery
            | Intent::Music => match self.plugins.get(intent) {
                Some(plugin) => plugin.handle(command).await,
                None => Ok(format!(
                    "The {} feature is not available right now.",
                    intent.describe()
                )),
            },
            Intent::Learn => self.handle_learning_command().await,
            Intent::SelfUpdate => Ok(self.updates.run_all().await.summary()),
            Intent::KnowledgeQuery => self.handle_knowledge_query(command).await,
            _ => self.handle_general_question(command).await,
        }
    }

    // ========================================================================
    // Learning / knowledge handlers
    // ========================================================================

    async fn handle_learning_command(&self) -> Result<String> {
        self.session.write().await.phase = Phase::Learning;
        self.stats.write().await.learning_sessions += 1;

        self.speaker
            .speak("I'm listening. Say: when I say '<your phrase>', followed by what I should do.")
            .await
            .map_err(|e| AssistantError::external("speaker", e))?;

        let sentence = self
            .listener
            .listen(Duration::from_secs(TEACH_LISTEN_SECS))
            .await
            .map_err(|e| AssistantError::external("listener", e))?;

        let sentence = match sentence {
            Some(s) => s,
            None => return Ok("I didn't catch a command to learn.".to_string()),
        };

        if self.learning.learn(&sentence).await? {
            // Also index the taught sentence so knowledge queries can find it.
            let mut metadata = Metadata::new();
            metadata.insert("type".into(), "custom_command".into());
            if let Err(e) = self.knowledge.add(&sentence, metadata).await {
                tracing::warn!("Failed to index learned command: {}", e);
            }
            Ok("Learned it and added it to my knowledge base.".to_string())
        } else {
            Ok("I couldn't parse that as a command to learn.".to_string())
        }
    }

    async fn handle_knowledge_query(&self, command: &str) -> Result<String> {
        let context = self.composer.topic_context(command).await;
        self.generator
            .generate(command, &context)
            .await
            .map_err(|e| AssistantError::external("generator", e).into())
    }

    async fn handle_general_question(&self, command: &str) -> Result<String> {
        let context = self.composer.compose(command).await;
        self.generator
            .generate(command, &context)
            .await
            .map_err(|e| AssistantError::external("generator", e).into())
    }
}
