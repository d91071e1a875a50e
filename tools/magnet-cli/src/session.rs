//! Session loop: the game-side owner of a peer connection
//!
//! Runs a fixed ~60 Hz update, drains inbound messages, sends heartbeats and
//! chat, and decides when a silent peer is gone.

use std::io::BufRead;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use magnet_core::{ConnectionState, Greeting, Message, PeerConnection};
use tokio::sync::mpsc;

use crate::messages::{Chat, Heartbeat};

/// Update period of the session loop
pub const FRAME: Duration = Duration::from_micros(16_667);

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub name: String,
    pub sync_rate: Duration,
    pub disconnect_after: Duration,
    pub close_after: Duration,
}

/// Outcome of a liveness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Alive,
    Disconnected,
    Lost,
}

/// Silence-based disconnect policy.
///
/// A peer silent for longer than `disconnect_after` is flagged
/// disconnected. If it stays that way for `close_after`, the session gives
/// up. Any traffic clears the flag.
#[derive(Debug, Clone)]
pub struct Liveness {
    disconnect_after: Duration,
    close_after: Duration,
    disconnected_since: Option<Instant>,
}

impl Liveness {
    pub fn new(disconnect_after: Duration, close_after: Duration) -> Self {
        Self {
            disconnect_after,
            close_after,
            disconnected_since: None,
        }
    }

    pub fn check(&mut self, idle_for: Option<Duration>, now: Instant) -> Verdict {
        let silent = idle_for.is_some_and(|idle| idle > self.disconnect_after);
        if !silent {
            self.disconnected_since = None;
            return Verdict::Alive;
        }

        let since = *self.disconnected_since.get_or_insert(now);
        if now.saturating_duration_since(since) >= self.close_after {
            Verdict::Lost
        } else {
            Verdict::Disconnected
        }
    }
}

/// What to do when stdin reaches end of file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputClosed {
    /// Close the connection and end the session
    Leave,
    /// Stop reading input and keep the session running
    Headless,
}

impl InputClosed {
    /// EOF ends a live chat. Before a peer has arrived it only means there
    /// is no input, as with `magnet await </dev/null`.
    pub fn decide(connected: bool) -> Self {
        if connected { Self::Leave } else { Self::Headless }
    }
}

/// Forward stdin lines to the session without blocking its loop
fn spawn_stdin_reader() -> Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    thread::Builder::new()
        .name("magnet-stdin".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Drive a connection until stdin closes while connected, or the peer is lost
pub fn run(mut conn: PeerConnection, settings: SessionSettings) -> Result<()> {
    let mut lines = Some(spawn_stdin_reader()?);
    let mut liveness = Liveness::new(settings.disconnect_after, settings.close_after);
    let mut last_state = conn.state();
    let mut last_heartbeat = Instant::now();
    let mut heartbeat_seq = 0u64;
    let mut heartbeats_seen = 0u64;

    println!("{} waiting for a peer on {}", settings.name, conn.local_addr());

    loop {
        let frame_start = Instant::now();

        let state = conn.state();
        if state != last_state {
            if state == ConnectionState::Connected
                && let Some(remote) = conn.remote_addr()
            {
                println!("connected to {}", remote);
            }
            last_state = state;
        }
        if !conn.active() {
            bail!("connection closed");
        }

        for message in conn.drain() {
            if message.is::<Heartbeat>() {
                heartbeats_seen += 1;
                tracing::trace!(heartbeats_seen, "Heartbeat from peer");
            } else {
                print_message(&*message);
            }
        }

        if conn.connected() {
            match liveness.check(conn.idle_for(), frame_start) {
                Verdict::Alive => {
                    if conn.disconnected() {
                        tracing::info!("Peer traffic resumed");
                        conn.set_disconnected(false);
                    }
                }
                Verdict::Disconnected => {
                    if !conn.disconnected() {
                        tracing::warn!(idle = ?conn.idle_for(), "Peer went quiet");
                        conn.set_disconnected(true);
                    }
                }
                Verdict::Lost => {
                    conn.close();
                    bail!("connection lost");
                }
            }

            if frame_start.duration_since(last_heartbeat) >= settings.sync_rate {
                heartbeat_seq += 1;
                if let Err(e) = conn.send(&Heartbeat { seq: heartbeat_seq }) {
                    tracing::warn!(error = %e, "Failed to send heartbeat");
                }
                last_heartbeat = frame_start;
            }
        }

        while let Some(input) = lines.as_mut() {
            match input.try_recv() {
                Ok(text) => {
                    let chat = Chat {
                        from: settings.name.clone(),
                        text,
                    };
                    if let Err(e) = conn.send(&chat) {
                        println!("not sent: {}", e);
                    }
                }
                Err(mpsc::error::TryRecvError::Empty) => break,
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    match InputClosed::decide(conn.connected()) {
                        InputClosed::Leave => {
                            tracing::info!("Input closed, leaving session");
                            conn.close();
                            return Ok(());
                        }
                        InputClosed::Headless => {
                            tracing::info!("Input closed, continuing without it");
                            lines = None;
                        }
                    }
                }
            }
        }

        if let Some(rest) = FRAME.checked_sub(frame_start.elapsed()) {
            thread::sleep(rest);
        }
    }
}

fn print_message(message: &dyn Message) {
    if let Some(chat) = message.downcast_ref::<Chat>() {
        println!("<{}> {}", chat.from, chat.text);
    } else if let Some(greeting) = message.downcast_ref::<Greeting>() {
        println!("* {}", greeting.text);
    } else {
        tracing::debug!(message_type = %message.message_type(), "Unhandled message");
    }
}
