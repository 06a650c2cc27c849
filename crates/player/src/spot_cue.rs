//! Avatar cues tied to a sightseeing spot.

use std::sync::Arc;

use kanko_shared::Command;

use crate::bridge::HostBridge;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MotionCue {
    pub group: String,
    pub index: u32,
}

/// Expression and motion the avatar shows while a spot is on screen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpotCue {
    pub expression: Option<String>,
    pub motion: Option<MotionCue>,
}

impl SpotCue {
    pub fn new(expression: Option<&str>, motion: Option<(&str, u32)>) -> Self {
        Self {
            expression: expression.map(str::to_string),
            motion: motion.map(|(group, index)| MotionCue {
                group: group.to_string(),
                index,
            }),
        }
    }

    /// Send the cue. The returned guard resets the expression when dropped.
    pub fn enter(&self, bridge: Arc<HostBridge>) -> SpotVisit {
        if let Some(expression) = self.expression.as_deref().filter(|e| !e.is_empty()) {
            bridge.send_command(Command::set_expression(expression));
        }
        if let Some(motion) = &self.motion {
            bridge.send_command(Command::play_motion(
                motion.group.clone(),
                Some(motion.index),
                None,
            ));
        }
        SpotVisit { bridge }
    }
}

/// Lives as long as the spot is shown.
#[must_use = "dropping the visit immediately resets the expression"]
pub struct SpotVisit {
    bridge: Arc<HostBridge>,
}

impl SpotVisit {
    /// Leave the spot now.
    pub fn leave(self) {}
}

impl Drop for SpotVisit {
    fn drop(&mut self) {
        self.bridge.send_command(Command::set_expression(""));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockGuestChannel;
    use kanko_shared::Codec;
    use mockall::Sequence;

    fn expect_command(channel: &mut MockGuestChannel, seq: &mut Sequence, expected: Command) {
        channel
            .expect_invoke()
            .withf(move |_, payload| {
                Codec::decode(payload)
                    .ok()
                    .and_then(|e| e.into_command())
                    .as_ref()
                    == Some(&expected)
            })
            .times(1)
            .in_sequence(seq)
            .returning(|_, _| Ok(()));
    }

    #[test]
    fn test_enter_and_leave_sequence() {
        let mut channel = MockGuestChannel::new();
        let mut seq = Sequence::new();
        expect_command(&mut channel, &mut seq, Command::set_expression("f02"));
        expect_command(&mut channel, &mut seq, Command::play_motion("Tap", Some(0), None));
        expect_command(&mut channel, &mut seq, Command::set_expression(""));

        let bridge = Arc::new(HostBridge::default());
        bridge.attach(Arc::new(channel));

        let cue = SpotCue::new(Some("f02"), Some(("Tap", 0)));
        let visit = cue.enter(bridge.clone());
        visit.leave();
    }

    #[test]
    fn test_empty_cue_only_resets() {
        let mut channel = MockGuestChannel::new();
        let mut seq = Sequence::new();
        expect_command(&mut channel, &mut seq, Command::set_expression(""));

        let bridge = Arc::new(HostBridge::default());
        bridge.attach(Arc::new(channel));

        drop(SpotCue::default().enter(bridge));
    }
}
