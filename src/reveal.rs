use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::models::{ChatEvent, MessagePayload, SessionState};
use crate::session::SessionShared;

/// Handle to the in-flight typing effect. Owned by the session controller;
/// cancelling freezes the revealed prefix as the final payload.
pub struct RevealHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl RevealHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RevealHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Reveal `text` into the bot message `message_id`, one character per
/// `speed` tick. The full text never appears at once: the message starts
/// empty and grows until the last tick or until cancellation, whichever
/// comes first. On natural completion the session returns to `Idle`.
pub fn start(
    shared: Arc<Mutex<SessionShared>>,
    events: UnboundedSender<ChatEvent>,
    message_id: u64,
    text: String,
    speed: Duration,
) -> RevealHandle {
    let token = CancellationToken::new();
    let task_token = token.clone();

    let task = tokio::spawn(async move {
        for ch in text.chars() {
            tokio::select! {
                _ = task_token.cancelled() => return,
                _ = tokio::time::sleep(speed) => {}
            }

            let mut state = shared.lock().expect("session state mutex poisoned");
            if let Some(message) = state.messages.iter_mut().find(|m| m.id == message_id) {
                if let MessagePayload::Text(ref mut body) = message.payload {
                    body.push(ch);
                }
            }
            drop(state);
            let _ = events.send(ChatEvent::RevealDelta {
                id: message_id,
                chunk: ch.to_string(),
            });
        }

        let mut state = shared.lock().expect("session state mutex poisoned");
        state.state = SessionState::Idle;
        drop(state);
        let _ = events.send(ChatEvent::StateChanged {
            state: SessionState::Idle,
        });
        let _ = events.send(ChatEvent::RevealDone { id: message_id });
    });

    RevealHandle { token, task }
}
