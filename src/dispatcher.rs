//! Dispatcher: routes every inbound message through one place.
//!
//! Routing order for one message:
//! 1. `/notify` arms a broadcast (admins) or is refused.
//! 2. The dialogue engine, if it has a handler for the user's state
//!    (`/start` always has one).
//! 3. An armed admin's text or photo is broadcast.
//! 4. Anything else is dropped silently.
//!
//! Each user gets a worker queue so their messages are handled in arrival
//! order while other users proceed concurrently. Queues idle for
//! `WORKER_IDLE` are closed and their workers exit once drained.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::broadcast::{self, BroadcastContent};
use crate::channels::{IncomingMessage, MessageStream, OutgoingMessage};
use crate::context::AppContext;
use crate::dialogue::{DialogueEngine, Effect, Event, SessionGuard, Transition, prompts};
use crate::error::Error;
use crate::store::UserRecord;

/// How long a user's queue may sit without new messages before it is closed.
const WORKER_IDLE: Duration = Duration::from_secs(600);

/// How often idle queues are looked for.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Sending half of one user's worker queue.
struct UserQueue {
    tx: mpsc::UnboundedSender<IncomingMessage>,
    last_used: Instant,
}

/// Close queues unused since `now - idle`. Returns how many were closed.
fn close_idle(queues: &mut HashMap<i64, UserQueue>, now: Instant, idle: Duration) -> usize {
    let before = queues.len();
    queues.retain(|_, q| now.duration_since(q.last_used) < idle);
    before - queues.len()
}

/// Routes messages to the dialogue engine or the broadcast handler.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<AppContext>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    /// Handle one message. Failures are logged and answered with a generic
    /// error reply; the user's state is left where it was.
    pub async fn handle(&self, msg: &IncomingMessage) {
        if let Err(e) = self.process(msg).await {
            tracing::error!(
                user_id = msg.user_id,
                chat_id = msg.chat_id,
                payload = ?msg.payload,
                error = %e,
                "Error handling message"
            );
            let reply = OutgoingMessage::text(prompts::INTERNAL_ERROR);
            if let Err(e) = self.ctx.channel.send(msg.chat_id, reply).await {
                tracing::error!(chat_id = msg.chat_id, error = %e, "Failed to send error reply");
            }
        }
    }

    async fn process(&self, msg: &IncomingMessage) -> Result<(), Error> {
        let event = Event::from(&msg.payload);
        let user_id = msg.user_id;

        let mut session = self.ctx.sessions.lock(user_id).await;
        let record = self.ctx.store.get(user_id).await;
        let state = match session.state {
            Some(state) => state,
            None => {
                let state = DialogueEngine::initial_state(&record);
                session.set_state(state);
                state
            }
        };

        if event == Event::Notify {
            return self.arm_broadcast(msg).await;
        }

        if let Some(transition) = self.ctx.engine.transition(state, &event, &record) {
            return self.apply(msg, &mut session, record, transition).await;
        }

        if self.ctx.config.is_admin(user_id) && self.ctx.broadcasts.is_armed(user_id).await {
            if let Some(content) = BroadcastContent::from_event(&event) {
                return self.broadcast(msg, content).await;
            }
        }

        tracing::debug!(user_id, %state, ?event, "No handler, dropping event");
        Ok(())
    }

    /// Write the patch, deliver the effects, then commit the new state.
    async fn apply(
        &self,
        msg: &IncomingMessage,
        session: &mut SessionGuard,
        mut record: UserRecord,
        transition: Transition,
    ) -> Result<(), Error> {
        let user_id = msg.user_id;

        if let Some(patch) = &transition.patch {
            let exists = self.ctx.store.contains(user_id).await;
            if !patch.fields.is_empty() || !exists {
                record.apply(patch);
                // Memory stays authoritative if the disk write fails.
                if let Err(e) = self.ctx.store.put(user_id, record).await {
                    tracing::error!(user_id, error = %e, "Failed to persist user record");
                }
            }
        }

        self.deliver(msg.chat_id, &transition.effects).await?;

        tracing::debug!(
            user_id,
            from = ?session.state,
            to = %transition.next,
            "Conversation transition"
        );
        session.set_state(transition.next);
        Ok(())
    }

    /// Run effects in order against one chat.
    async fn deliver(&self, chat_id: i64, effects: &[Effect]) -> Result<(), Error> {
        for effect in effects {
            match effect {
                Effect::Send(OutgoingMessage::Typing) => {
                    if let Err(e) = self.ctx.channel.send(chat_id, OutgoingMessage::Typing).await {
                        tracing::warn!(chat_id, error = %e, "Typing indicator failed");
                    }
                }
                Effect::Send(message) => {
                    self.ctx.channel.send(chat_id, message.clone()).await?;
                }
                Effect::Pause(delay) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(*delay).await;
                    }
                }
            }
        }
        Ok(())
    }

    async fn arm_broadcast(&self, msg: &IncomingMessage) -> Result<(), Error> {
        let user_id = msg.user_id;
        if !self.ctx.config.is_admin(user_id) {
            tracing::info!(user_id, "Broadcast refused for non-admin");
            self.ctx
                .channel
                .send(msg.chat_id, OutgoingMessage::text(prompts::NOTIFY_DENIED))
                .await?;
            return Ok(());
        }

        self.ctx.broadcasts.arm(user_id).await;
        tracing::info!(user_id, "Broadcast armed");
        self.ctx
            .channel
            .send(msg.chat_id, OutgoingMessage::text(prompts::NOTIFY_ASK_CONTENT))
            .await?;
        Ok(())
    }

    async fn broadcast(&self, msg: &IncomingMessage, content: BroadcastContent) -> Result<(), Error> {
        // Disarm before sending so a failure cannot broadcast twice.
        if !self.ctx.broadcasts.take(msg.user_id).await {
            return Ok(());
        }

        tracing::info!(admin_id = msg.user_id, "Broadcasting");
        let sent = broadcast::fan_out(
            self.ctx.channel.as_ref(),
            &self.ctx.store,
            &self.ctx.config.admin_ids,
            &content,
        )
        .await;

        self.ctx
            .channel
            .send(msg.chat_id, OutgoingMessage::text(prompts::broadcast_report(sent)))
            .await?;
        Ok(())
    }

    /// Consume the inbound stream until it ends or Ctrl+C.
    pub async fn run(self, mut stream: MessageStream) -> Result<(), Error> {
        let mut queues: HashMap<i64, UserQueue> = HashMap::new();
        let mut workers = JoinSet::new();
        let mut sweep = tokio::time::interval(SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(channel = self.ctx.channel.name(), "Dispatcher ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
                _ = sweep.tick() => {
                    let closed = close_idle(&mut queues, Instant::now(), WORKER_IDLE);
                    reap_finished(&mut workers);
                    if closed > 0 {
                        tracing::debug!(closed, active = queues.len(), "Closed idle user queues");
                    }
                    continue;
                }
            };

            let user_id = message.user_id;
            let now = Instant::now();
            let queue = queues.entry(user_id).or_insert_with(|| UserQueue {
                tx: self.spawn_worker(&mut workers, user_id),
                last_used: now,
            });
            queue.last_used = now;

            if let Err(mpsc::error::SendError(message)) = queue.tx.send(message) {
                tracing::warn!(user_id, "User worker gone, restarting");
                let tx = self.spawn_worker(&mut workers, user_id);
                let _ = tx.send(message);
                queues.insert(user_id, UserQueue { tx, last_used: now });
            }
        }

        // Closing the queues lets workers finish what they already have.
        drop(queues);
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "User worker panicked");
            }
        }

        self.ctx.channel.shutdown().await?;
        Ok(())
    }

    fn spawn_worker(
        &self,
        workers: &mut JoinSet<()>,
        user_id: i64,
    ) -> mpsc::UnboundedSender<IncomingMessage> {
        let (tx, mut rx) = mpsc::unbounded_channel::<IncomingMessage>();
        let dispatcher = self.clone();
        workers.spawn(async move {
            while let Some(msg) = rx.recv().await {
                dispatcher.handle(&msg).await;
            }
            tracing::debug!(user_id, "User worker stopped");
        });
        tx
    }
}

/// Collect workers that already exited.
fn reap_finished(workers: &mut JoinSet<()>) {
    while let Some(result) = workers.try_join_next() {
        if let Err(e) = result {
            tracing::error!(error = %e, "User worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn idle_queues_are_closed() {
        let start = Instant::now();
        let (stale_tx, mut stale_rx) = mpsc::unbounded_channel();
        let (fresh_tx, mut fresh_rx) = mpsc::unbounded_channel();

        let mut queues = HashMap::from([
            (
                1,
                UserQueue {
                    tx: stale_tx,
                    last_used: start,
                },
            ),
            (
                2,
                UserQueue {
                    tx: fresh_tx,
                    last_used: start + Duration::from_secs(590),
                },
            ),
        ]);

        let closed = close_idle(&mut queues, start + WORKER_IDLE, WORKER_IDLE);
        assert_eq!(closed, 1);
        assert!(queues.contains_key(&2));
        assert!(!queues.contains_key(&1));

        // The worker side sees its queue end.
        assert!(stale_rx.recv().await.is_none());

        queues[&2]
            .tx
            .send(IncomingMessage::text("test", 2, 2, "/start"))
            .unwrap();
        assert!(fresh_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn queued_messages_drain_after_close() {
        let start = Instant::now();
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(IncomingMessage::text("test", 1, 1, "G4150")).unwrap();
        let mut queues = HashMap::from([(
            1,
            UserQueue {
                tx,
                last_used: start,
            },
        )]);

        assert_eq!(close_idle(&mut queues, start + WORKER_IDLE, WORKER_IDLE), 1);
        assert!(rx.recv().await.is_some());
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn finished_workers_are_reaped() {
        let mut workers = JoinSet::new();
        workers.spawn(async {});
        while !workers.is_empty() {
            tokio::task::yield_now().await;
            reap_finished(&mut workers);
        }
        assert!(workers.is_empty());
    }
}
