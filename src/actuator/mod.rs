//! Actuation seam between the command channel and the drive hardware.

use tracing::info;

/// Consumer of accepted steering command tokens.
///
/// The command listener hands every accepted token to exactly one sink; a
/// robot integration implements this with its gait or motor controller.
pub trait CommandSink: Send + Sync {
    fn apply(&self, token: &str);
}

/// Placeholder sink that only records the command.
#[derive(Debug, Default)]
pub struct LogActuator;

impl CommandSink for LogActuator {
    fn apply(&self, token: &str) {
        // TODO: wire up the drive controller once the gait interface lands
        info!(command = %token, "Command received");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        applied: Mutex<Vec<String>>,
    }

    impl CommandSink for RecordingSink {
        fn apply(&self, token: &str) {
            self.applied.lock().unwrap().push(token.to_string());
        }
    }

    #[test]
    fn test_sink_receives_tokens() {
        let sink = RecordingSink::default();
        sink.apply("FORWARD");
        sink.apply("STOP");
        assert_eq!(*sink.applied.lock().unwrap(), vec!["FORWARD", "STOP"]);
    }
}
