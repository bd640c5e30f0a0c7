use anyhow::Result;
use aria_core::{Listener, Speaker};
use async_trait::async_trait;
use std::io::Write;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Terminal stand-in for the microphone. One dedicated thread owns stdin and
/// feeds lines through a channel, so a timed-out wait never leaves a blocked
/// reader holding the next line.
pub struct ConsoleListener {
    lines: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ConsoleListener {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            let mut input = String::new();
            loop {
                input.clear();
                match stdin.read_line(&mut input) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let line = input.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self {
            lines: Mutex::new(rx),
        }
    }
}

impl Default for ConsoleListener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Listener for ConsoleListener {
    async fn listen_for_activation(&self) -> Result<Option<String>> {
        prompt();
        Ok(self.lines.lock().await.recv().await)
    }

    async fn listen(&self, timeout: Duration) -> Result<Option<String>> {
        prompt();
        let mut rx = self.lines.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(line) => Ok(line),
            Err(_) => Ok(None),
        }
    }
}

fn prompt() {
    print!("> ");
    let _ = std::io::stdout().flush();
}

/// Terminal stand-in for the voice output.
pub struct ConsoleSpeaker;

#[async_trait]
impl Speaker for ConsoleSpeaker {
    async fn speak(&self, text: &str) -> Result<()> {
        println!("\nAria: {}\n", text);
        Ok(())
    }
}
