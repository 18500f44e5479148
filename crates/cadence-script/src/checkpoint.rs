//! Session checkpoints as RON
//!
//! Only mutable state is saved. Rules and timers are reloaded from their
//! sources, then the checkpoint is restored over them.

use crate::error::Result;
use cadence_core::Checkpoint;
use ron::ser::PrettyConfig;
use std::fs;
use std::path::Path;

pub fn checkpoint_to_ron(checkpoint: &Checkpoint) -> Result<String> {
    Ok(ron::ser::to_string_pretty(checkpoint, PrettyConfig::default())?)
}

pub fn checkpoint_from_ron(content: &str) -> Result<Checkpoint> {
    Ok(ron::from_str(content)?)
}

pub fn save_checkpoint(checkpoint: &Checkpoint, path: impl AsRef<Path>) -> Result<()> {
    let text = checkpoint_to_ron(checkpoint)?;
    fs::write(path.as_ref(), text)?;
    tracing::info!(path = %path.as_ref().display(), "checkpoint saved");
    Ok(())
}

pub fn load_checkpoint(path: impl AsRef<Path>) -> Result<Checkpoint> {
    let content = fs::read_to_string(path.as_ref())?;
    checkpoint_from_ron(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use cadence_core::{
        ClockConfig, Engine, Interval, Session, TimeMode, TimerRule, TurnFacts, Value,
        VariableScope,
    };
    use std::time::Duration;

    fn candle() -> TimerRule {
        TimerRule::new("candle", TimeMode::GameTime, Interval::range(30.0, 90.0))
    }

    #[test]
    fn test_checkpoint_survives_ron() {
        let mut session = Session::with_seed(&ClockConfig::new(4.0, Default::default()), 5).unwrap();
        session.add_actor("Mira");
        session.variables.set_global("weather", "fog");
        session
            .variables
            .set(VariableScope::Character, "Mira", "trust", 3i64);
        session.replace_timers(vec![candle()]);
        Engine::new().tick(&mut session, Duration::from_secs(45), &TurnFacts::new(), None);

        let saved = session.checkpoint();
        let text = checkpoint_to_ron(&saved).unwrap();
        let loaded = checkpoint_from_ron(&text).unwrap();
        assert_eq!(loaded, saved);

        let mut resumed = Session::new(&ClockConfig::default()).unwrap();
        resumed.replace_timers(vec![candle()]);
        resumed.restore(&loaded);
        assert_eq!(resumed.variables.get_global("weather"), Some(&Value::from("fog")));
        assert_eq!(resumed.clock.multiplier(), 4.0);
        assert_eq!(
            resumed.timers.next_fire_at("candle"),
            session.timers.next_fire_at("candle")
        );
        assert_eq!(resumed.rng, session.rng);
    }

    #[test]
    fn test_garbage_checkpoint_is_an_error() {
        assert!(matches!(checkpoint_from_ron("(nope"), Err(Error::Ron(_))));
    }
}
