//! Media transport and volume actions.

use tracing::warn;

use super::{Action, ActionContext};
use crate::config::ActionSpec;
use crate::platform::{MediaCommand, VolumeCommand};

/// Sends `command` (play_pause, next, previous, stop) to the media player.
#[derive(Default)]
pub struct MediaAction;

impl Action for MediaAction {
    fn execute(&self, ctx: &ActionContext<'_>, action: &ActionSpec) -> bool {
        let command = match action.param_str("command").map(str::parse::<MediaCommand>) {
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                warn!("media action: {}", e);
                return false;
            }
            None => {
                warn!("media action requires 'command'");
                return false;
            }
        };
        ctx.platform.media_command(command)
    }
}

/// Adjusts output volume: `action` is up, down, mute or set, with an
/// optional `amount` in percent.
#[derive(Default)]
pub struct VolumeAction;

impl Action for VolumeAction {
    fn execute(&self, ctx: &ActionContext<'_>, action: &ActionSpec) -> bool {
        let Some(name) = action.param_str("action") else {
            warn!("volume action requires 'action'");
            return false;
        };
        match VolumeCommand::parse(name, action.param_int("amount")) {
            Ok(command) => ctx.platform.volume_command(command),
            Err(e) => {
                warn!("volume action: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::tests::{action, run, RecordingController, RecordingPlatform};
    use crate::platform::NullPlatform;

    #[test]
    fn test_media() {
        let controller = RecordingController::default();
        let platform = RecordingPlatform::default();
        assert!(run(
            &controller,
            &platform,
            &action("type = \"media\"\ncommand = \"play_pause\"")
        ));
        assert!(!run(
            &controller,
            &platform,
            &action("type = \"media\"\ncommand = \"eject\"")
        ));
        assert_eq!(*platform.media.lock(), vec![MediaCommand::PlayPause]);

        // No platform support
        assert!(!run(
            &controller,
            &NullPlatform,
            &action("type = \"media\"\ncommand = \"next\"")
        ));
    }

    #[test]
    fn test_volume() {
        let controller = RecordingController::default();
        let platform = RecordingPlatform::default();
        assert!(run(
            &controller,
            &platform,
            &action("type = \"volume\"\naction = \"down\"\namount = 10")
        ));
        assert!(run(&controller, &platform, &action("type = \"volume\"\naction = \"mute\"")));
        assert!(!run(&controller, &platform, &action("type = \"volume\"")));
        assert_eq!(
            *platform.volume.lock(),
            vec![VolumeCommand::Down(10), VolumeCommand::ToggleMute]
        );
    }
}
