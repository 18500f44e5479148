//! Host-supplied facts for one evaluation pass
//!
//! The engine never queries the host mid-pass. Everything conditions may
//! read besides variables and the clock arrives here, once per call.

use crate::ActorId;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Scene facts the host provides at the start of a turn phase or tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnFacts {
    pub location: Option<String>,
    pub region: Option<String>,
    pub world: Option<String>,
    /// Scene counter
    pub scene: u32,
    /// Character currently speaking or in focus
    pub character: Option<ActorId>,
    /// Player whose turn is being processed
    pub player: Option<ActorId>,
    /// Dialogue topics detected in the current exchange
    pub dialogue: IndexSet<String>,
}

impl TurnFacts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_world(mut self, world: impl Into<String>) -> Self {
        self.world = Some(world.into());
        self
    }

    pub fn with_scene(mut self, scene: u32) -> Self {
        self.scene = scene;
        self
    }

    pub fn with_character(mut self, character: impl Into<ActorId>) -> Self {
        self.character = Some(character.into());
        self
    }

    pub fn with_player(mut self, player: impl Into<ActorId>) -> Self {
        self.player = Some(player.into());
        self
    }

    /// Mark a dialogue topic as detected
    pub fn with_dialogue(mut self, topic: impl Into<String>) -> Self {
        self.dialogue.insert(topic.into());
        self
    }

    /// Ask a probe which of `topics` occur in `text` and record the hits
    pub fn probe_dialogue<'t>(
        &mut self,
        probe: &dyn DialogueProbe,
        topics: impl IntoIterator<Item = &'t str>,
        text: &str,
    ) {
        for topic in topics {
            if probe.detect(topic, text) {
                self.dialogue.insert(topic.to_string());
            }
        }
    }

    pub fn dialogue_detected(&self, topic: &str) -> bool {
        self.dialogue.contains(topic)
    }
}

/// Capability that decides whether a dialogue topic came up
///
/// Hosts may back this with a language model; the engine only ever sees the
/// resulting booleans in [`TurnFacts::dialogue`].
pub trait DialogueProbe {
    fn detect(&self, topic: &str, text: &str) -> bool;
}

/// Case-insensitive keyword matcher
#[derive(Debug, Clone, Default)]
pub struct KeywordProbe {
    keywords: IndexMap<String, Vec<String>>,
}

impl KeywordProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register keywords that signal a topic
    pub fn topic<I, S>(mut self, topic: impl Into<String>, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(|k| k.into().to_lowercase())
            .collect();
        self.keywords.insert(topic.into(), keywords);
        self
    }

    /// Topics this probe knows about
    pub fn topics(&self) -> impl Iterator<Item = &str> {
        self.keywords.keys().map(String::as_str)
    }
}

impl DialogueProbe for KeywordProbe {
    fn detect(&self, topic: &str, text: &str) -> bool {
        let Some(keywords) = self.keywords.get(topic) else {
            return false;
        };
        let text = text.to_lowercase();
        keywords.iter().any(|k| text.contains(k.as_str()))
    }
}
