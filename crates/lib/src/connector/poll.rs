//! Notification poll loop: fetch, translate, pass the ordering gate, deliver.

use crate::connector::api::LiveChatApi;
use crate::connector::gate::OrderingGate;
use crate::connector::inbound::{translate_batch, BotReply, HandledSet, TranslateScope};
use crate::error::PollError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Page size requested on every fetch.
pub const FETCH_PAGE_SIZE: u32 = 1000;

/// Everything one session's poll loop needs.
pub(crate) struct PollContext {
    pub api: Arc<dyn LiveChatApi>,
    pub gate: Arc<OrderingGate>,
    pub replies: mpsc::Sender<BotReply>,
    pub session_token: String,
    pub conversation_id: String,
    pub user_id: String,
    pub interval: Duration,
}

/// Handle to a running poll loop. The loop exits at its next cycle boundary after `stop`.
pub(crate) struct PollLoop {
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl PollLoop {
    /// Spawn the loop. The first fetch is issued immediately.
    pub fn start(ctx: PollContext) -> Self {
        let running = Arc::new(AtomicBool::new(true));
        log::info!(
            "poll loop: starting for conversation {} every {:?}",
            ctx.conversation_id,
            ctx.interval
        );
        let task = tokio::spawn(run_poll_loop(ctx, Arc::clone(&running)));
        Self { running, task }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && !self.task.is_finished()
    }

    /// Leave `polling`. In-flight requests are not aborted; their results are discarded.
    pub fn stop(self) -> JoinHandle<()> {
        self.running.store(false, Ordering::SeqCst);
        self.task
    }
}

async fn run_poll_loop(ctx: PollContext, running: Arc<AtomicBool>) {
    let polling = || running.load(Ordering::SeqCst);
    let scope = TranslateScope {
        conversation_id: &ctx.conversation_id,
        user_id: &ctx.user_id,
    };
    let mut handled = HandledSet::new();
    let mut cursor: Option<String> = None;

    while polling() {
        let fetched = ctx
            .api
            .fetch_notifications(&ctx.session_token, FETCH_PAGE_SIZE, cursor.as_deref())
            .await;
        if !polling() {
            log::debug!("poll loop: stopped while fetch was in flight, discarding result");
            break;
        }

        let replies: Vec<BotReply> = match fetched {
            Ok(page) => {
                if !page.results.is_empty() {
                    log::debug!(
                        "poll loop: {} notifications polled hasMore: {}, afterCursor: {:?}, beforeCursor: {:?}",
                        page.results.len(),
                        page.has_more,
                        page.after_cursor(),
                        page.before_cursor()
                    );
                }
                if let Some(next) = page.after_cursor() {
                    cursor = Some(next);
                }
                translate_batch(page.notifications(), scope, &mut handled)
                    .into_iter()
                    .map(BotReply::Message)
                    .collect()
            }
            Err(e) => {
                let err = PollError::Fetch(e);
                log::debug!("poll loop: {}", err);
                vec![BotReply::Text(err.to_string())]
            }
        };

        for reply in replies {
            // Slot first, gate second: no await between the last stop check and the send.
            let Ok(permit) = ctx.replies.reserve().await else {
                log::debug!("poll loop: reply channel closed, stopping");
                return;
            };
            ctx.gate.acquire().wait().await;
            if !polling() {
                log::debug!("poll loop: stopped before delivery, dropping remaining replies");
                break;
            }
            if let BotReply::Message(ref m) = reply {
                log::debug!("poll loop: bot message: {:?}", m.message_text);
            }
            permit.send(reply);
        }

        if polling() {
            tokio::time::sleep(ctx.interval).await;
        }
    }
    log::info!("poll loop: deactivated");
}
