//! Integration tests for events

#[cfg(test)]
mod tests {
    use hearth_events::*;

    #[tokio::test]
    async fn test_event_sender_emitter() {
        let (tx, mut rx) = channel();

        tx.emit_error("test error");
        tx.emit_debug("test debug");

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, AppEvent::General(GeneralEvent::Error { .. })));
        assert_eq!(event1.log_level(), tracing::Level::ERROR);

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(
            event2,
            AppEvent::General(GeneralEvent::DebugLog { .. })
        ));
    }

    #[tokio::test]
    async fn test_dropped_receiver() {
        let (tx, rx) = channel();
        drop(rx);

        // Should not panic when receiver is dropped
        tx.emit_warning("ignored");
    }

    #[test]
    fn test_absent_sender_drops_events() {
        let sender: Option<EventSender> = None;
        sender.emit_warning("nobody listens");
    }

    #[test]
    fn test_notification_serialization() {
        let event = AppEvent::Notification(NotificationEvent::PackagesChanged {
            names: vec!["a".to_string()],
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["domain"], "notification");
        assert_eq!(json["event"]["type"], "PackagesChanged");
        assert_eq!(json["event"]["names"][0], "a");
        assert_eq!(event.log_target(), "hearth::events::notification");
    }

    #[test]
    fn test_core_verification_failure_is_a_warning() {
        let event = AppEvent::Install(InstallEvent::CoreVerificationFailed {
            package: "core".into(),
            failure: FailureContext::new(None::<String>, "bad", None::<String>, false),
        });
        assert_eq!(event.log_level(), tracing::Level::WARN);
    }
}
