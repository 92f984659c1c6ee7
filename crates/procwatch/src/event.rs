use std::sync::mpsc::Sender;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event as TermEvent, KeyEvent, KeyEventKind};

use crate::sampler::ProcessSnapshot;

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Everything the main loop reacts to, funneled through one channel:
/// keyboard input, the periodic tick, completed sampling cycles, and
/// shutdown.
pub enum Event {
    Input(KeyEvent),
    Resize,
    Tick,
    SampleDone(Result<ProcessSnapshot>),
    Quit,
}

/// Poll the terminal on a dedicated thread and forward key presses and
/// resizes. Exits when the receiving side hangs up.
pub fn spawn_input_thread(tx: Sender<Event>) {
    thread::spawn(move || {
        loop {
            let ready = event::poll(INPUT_POLL_INTERVAL).unwrap_or(false);
            if !ready {
                continue;
            }
            let forwarded = match event::read() {
                Ok(TermEvent::Key(key)) if key.kind == KeyEventKind::Press => {
                    tx.send(Event::Input(key))
                }
                Ok(TermEvent::Resize(_, _)) => tx.send(Event::Resize),
                Ok(_) => continue,
                Err(_) => break,
            };
            if forwarded.is_err() {
                break;
            }
        }
    });
}
