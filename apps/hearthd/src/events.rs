//! Event loop that runs a command while logging its events

use std::future::Future;

use hearth_events::EventReceiver;

use crate::logging::log_event_with_tracing;

/// Drive `command` to completion, logging every event it emits
///
/// Events still queued when the command finishes are drained before the
/// result is returned.
pub async fn run_with_events<F, T>(command: F, receiver: &mut EventReceiver) -> T
where
    F: Future<Output = T>,
{
    tokio::pin!(command);
    let mut open = true;
    loop {
        tokio::select! {
            result = &mut command => {
                while let Ok(event) = receiver.try_recv() {
                    log_event_with_tracing(&event);
                }
                return result;
            }
            event = receiver.recv(), if open => match event {
                Some(event) => log_event_with_tracing(&event),
                None => open = false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_events::{AppEvent, EventEmitter, EventSender, NotificationEvent};

    struct Emitter(Option<EventSender>);

    impl EventEmitter for Emitter {
        fn event_sender(&self) -> Option<&EventSender> {
            self.0.as_ref()
        }
    }

    #[tokio::test]
    async fn drains_events_left_after_the_command() {
        let (tx, mut rx) = hearth_events::channel();
        let emitter = Emitter(Some(tx));
        let value = run_with_events(
            async {
                emitter.emit(AppEvent::Notification(NotificationEvent::RunPortReconciliation));
                7
            },
            &mut rx,
        )
        .await;
        assert_eq!(value, 7);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_does_not_stall_the_command() {
        let (tx, mut rx) = hearth_events::channel();
        drop(tx);
        let value = run_with_events(
            async {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                "done"
            },
            &mut rx,
        )
        .await;
        assert_eq!(value, "done");
    }
}
