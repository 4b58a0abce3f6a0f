use std::time::Duration;

use crossterm::event::{self, Event as CrosstermEvent, KeyEvent};
use futures::StreamExt;
use tokio::sync::mpsc;

#[derive(Clone, Debug)]
pub enum Event {
    Key(KeyEvent),
    Tick,
    Resize,
}

/// Multiplexes the tick timer and terminal input into one stream. The tick
/// interval is anchored to the stream's start, so a slow render delays one
/// tick without shifting every later tick (no cumulative drift).
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    _task: Option<tokio::task::JoinHandle<()>>,
}

impl EventHandler {
    /// Build a handler fed from an external channel instead of the terminal.
    /// Used by tests to script tick/key sequences.
    pub fn scripted(rx: mpsc::UnboundedReceiver<Event>) -> Self {
        Self { rx, _task: None }
    }

    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Event>();

        let task = tokio::spawn(async move {
            let mut reader = event::EventStream::new();
            let mut tick_interval = tokio::time::interval(tick_rate);
            // First tick fires immediately; consume it so the caller's
            // startup render is not doubled.
            tick_interval.tick().await;

            loop {
                tokio::select! {
                    maybe_event = reader.next() => {
                        match maybe_event {
                            Some(Ok(evt)) => {
                                let mapped = match evt {
                                    CrosstermEvent::Key(key) => Some(Event::Key(key)),
                                    CrosstermEvent::Resize(_, _) => Some(Event::Resize),
                                    _ => None,
                                };
                                if let Some(e) = mapped
                                    && tx.send(e).is_err()
                                {
                                    break;
                                }
                            }
                            Some(Err(_)) => break,
                            None => break,
                        }
                    }
                    _ = tick_interval.tick() => {
                        if tx.send(Event::Tick).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            rx,
            _task: Some(task),
        }
    }

    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}
