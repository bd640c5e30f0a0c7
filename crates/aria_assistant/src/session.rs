use std::time::Instant;

/// Controller finite-state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Inactive,
    Listening,
    Processing,
    Responding,
    Learning,
    Error,
}

/// The single per-process session. Mutated only by the controller (the idle
/// auto-close timer is part of the controller).
#[derive(Debug)]
pub struct Session {
    pub phase: Phase,
    /// The assistant loop is running.
    pub active: bool,
    /// An activation session is open: commands are accepted without a fresh
    /// activation phrase until the idle timeout closes it.
    pub listening: bool,
    /// Responses are printed instead of spoken.
    pub show_on_screen: bool,
    pub current_command: String,
    pub current_response: String,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            phase: Phase::Inactive,
            active: false,
            listening: false,
            show_on_screen: false,
            current_command: String::new(),
            current_response: String::new(),
        }
    }
}

/// Counters for the lifetime of the assistant process.
#[derive(Debug)]
pub struct SessionStats {
    pub total_interactions: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    pub learning_sessions: u64,
    started_at: Instant,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self {
            total_interactions: 0,
            successful_commands: 0,
            failed_commands: 0,
            learning_sessions: 0,
            started_at: Instant::now(),
        }
    }
}

impl SessionStats {
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn format_uptime(&self) -> String {
        let secs = self.uptime_secs();
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_starts_inactive() {
        let s = Session::default();
        assert_eq!(s.phase, Phase::Inactive);
        assert!(!s.active);
        assert!(!s.listening);
    }

    #[test]
    fn test_uptime_format() {
        let stats = SessionStats::default();
        assert_eq!(stats.format_uptime(), "00:00:00");
    }
}
