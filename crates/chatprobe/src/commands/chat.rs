use async_trait::async_trait;
use chrono::{DateTime, Local};
use eyre::{Result, WrapErr};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::warn;

use super::Command;
use chatprobe_core::chat::{DriverOptions, LANGUAGES, SessionDriver, Turn};
use chatprobe_core::config::ProbeConfig;

pub struct ChatCommand {
    pub app_id: String,
    pub config: ProbeConfig,
}

#[async_trait]
impl Command for ChatCommand {
    async fn execute(&self) -> Result<()> {
        if !LANGUAGES.contains(&self.config.language.as_str()) {
            warn!(target: "chatprobe::chat", language = %self.config.language, "Language not among {:?}", LANGUAGES);
        }

        let platform = crate::connect_platform(&self.config)?;
        let mut driver = SessionDriver::connect(
            platform,
            self.app_id.clone(),
            DriverOptions {
                timing: self.config.polling.timing(),
                default_language: self.config.language.clone(),
            },
        )
        .await
        .wrap_err_with(|| format!("Failed to subscribe to {}", self.app_id))?;

        let session_id = driver.start(None).await?;
        println!(
            "Chatting with {} at {} (session {session_id}, {}). Ctrl-D to quit.",
            self.app_id,
            self.config.base_url,
            driver.language()
        );
        print_turns(&driver.await_response().await);

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print_turns(&driver.poll_response());
            if driver.is_done() {
                println!("Session closed by the platform.");
                break;
            }

            print!("> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                _ = signal::ctrl_c() => break,
                line = lines.next_line() => line?,
            };
            let Some(line) = line else {
                break;
            };
            let text = line.trim();
            if text.is_empty() {
                continue;
            }

            driver.send(text, None).await?;
            let turns = tokio::select! {
                _ = signal::ctrl_c() => break,
                turns = driver.await_response() => turns,
            };
            print_turns(&turns);
        }
        Ok(())
    }
}

fn print_turns(turns: &[Turn]) {
    for turn in turns {
        let time = DateTime::<Local>::from(turn.ts).format("%H:%M:%S");
        println!("[{}] {time} {}", turn.actor, turn.text);
        for buttons in turn.button_lists() {
            for (index, button) in buttons.iter().enumerate() {
                println!("    {index}. {}", button.reply_text().unwrap_or_default());
            }
        }
    }
}
