//! Tavern Night Demo
//!
//! One evening at the Rusty Anchor. A heartbeat thread ticks the timer
//! scheduler while the main thread plays three turns; both share the
//! session through a mutex so they never mutate it at the same time.
//!
//! Run with `RUST_LOG=cadence_core=debug` to watch rules and timers fire.

use cadence_core::{
    visible_events, ActorId, EffectBatch, EffectRequest, Engine, KeywordProbe, NarrativeEvent,
    Phase, PromptTarget, Session, TurnFacts, VariableScope, Visibility,
};
use cadence_script::{checkpoint_to_ron, Loader};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HEARTBEATS: usize = 8;
const HEARTBEAT_WALL: Duration = Duration::from_secs(30);

fn lock(session: &Mutex<Session>) -> MutexGuard<'_, Session> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn tavern_facts(scene: u32) -> TurnFacts {
    TurnFacts::new()
        .with_location("Rusty Anchor")
        .with_region("Harbor District")
        .with_world("Aldmere")
        .with_scene(scene)
        .with_character("Mira")
        .with_player("Alice")
}

fn describe(label: &str, batch: &EffectBatch) {
    for request in &batch.requests {
        match request {
            EffectRequest::InjectPrompt { source, tag, text, .. } => {
                println!("  [{}] {} injects <{}>: {}", label, source, tag, text)
            }
            EffectRequest::TriggerEvent { source, event, payload } => {
                println!("  [{}] {} triggers {} {:?}", label, source, event, payload)
            }
            EffectRequest::ScreenEffect { source, effect, .. } => {
                println!("  [{}] {} screen effect {}", label, source, effect)
            }
            EffectRequest::PlaySound { source, sound } => {
                println!("  [{}] {} plays {}", label, source, sound)
            }
        }
    }
    for flag in &batch.flags {
        println!("  [{}] flagged: {:?}", label, flag);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_core=info,cadence_script=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!("=== Cadence Tavern Night ===\n");

    let mut loader = Loader::new();
    loader.load_directory(Path::new(env!("CARGO_MANIFEST_DIR")).join("content"))?;
    let report = loader.finish();
    tracing::info!(
        rules = report.rules.len(),
        timers = report.timers.len(),
        rejected = report.rejections.len(),
        "content loaded"
    );
    for rejection in &report.rejections {
        println!("Rejected at load: {}", rejection);
    }

    let mut session = report.into_session(42)?;
    for actor in ["Mira", "Alice", "Bob"] {
        session.add_actor(actor);
    }
    session.variables.set_global("weather", "drizzling");
    session
        .variables
        .set(VariableScope::Character, "Mira", "trust", 1i64);
    println!(
        "Loaded {} rules and {} timers; fiction time {}\n",
        session.rules.len(),
        session.timers.len(),
        session.clock.current_fiction_time()
    );

    let session = Arc::new(Mutex::new(session));
    let engine = Engine::new();

    let heartbeat = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            for _ in 0..HEARTBEATS {
                thread::sleep(Duration::from_millis(20));
                let mut session = lock(&session);
                let batch = engine.tick(&mut session, HEARTBEAT_WALL, &tavern_facts(0), None);
                if !batch.is_empty() {
                    println!("Heartbeat at {}:", session.clock.current_fiction_time());
                    describe("tick", &batch);
                }
            }
        })
    };

    let probe = KeywordProbe::new()
        .topic("bribe", ["coin", "gold", "silver"])
        .topic("threat", ["or else", "knife"]);
    let lines = [
        "Evening. What's the news from the docks?",
        "I slide a silver coin across the bar. Who was asking about the ship?",
        "Another round, and keep the coin.",
    ];

    for (scene, line) in (1u32..).zip(lines) {
        thread::sleep(Duration::from_millis(45));
        let mut session = lock(&session);
        let mut facts = tavern_facts(scene);
        let topics: Vec<&str> = probe.topics().collect();
        facts.probe_dialogue(&probe, topics, line);

        println!("Turn {} at {}", scene, session.clock.current_fiction_time());
        let before = engine.run_phase(&mut session, Phase::BeforeSend, &facts, None);
        describe("before", &before);
        println!(
            "  Prompt sent:\n    {}",
            before
                .compose_prompt(PromptTarget::UserMessage, line)
                .replace('\n', "\n    ")
        );

        let mut consumer: Vec<EffectRequest> = Vec::new();
        let after = engine.run_phase(&mut session, Phase::AfterReceive, &facts, Some(&mut consumer));
        describe("after", &after);
        println!("  Consumer received {} effect(s) after the reply\n", consumer.len());
    }

    heartbeat
        .join()
        .map_err(|_| std::io::Error::other("heartbeat thread panicked"))?;

    let session = lock(&session);
    let trust = session
        .variables
        .get(VariableScope::Character, "Mira", "trust")
        .map(|v| v.to_string())
        .unwrap_or_else(|| "unset".to_string());
    println!("Mira's trust in the party: {}", trust);

    let events = vec![
        NarrativeEvent::new("narrator", "The fire pops and settles.", 3),
        NarrativeEvent::new("narrator", "Mira presses a folded note into your palm.", 3)
            .with_visibility(Visibility::only_to(["Alice"])),
        NarrativeEvent::new("narrator", "Alice pockets something from Mira.", 3)
            .with_visibility(Visibility::hidden_from(["Alice"])),
    ];
    let snap = session.snapshot(&tavern_facts(3));
    for name in ["Alice", "Bob"] {
        let observer = ActorId::new(name);
        println!("{} sees:", name);
        for event in visible_events(&events, &observer, &snap) {
            println!("  - {}", event.text);
        }
    }

    let saved = checkpoint_to_ron(&session.checkpoint())?;
    println!("\nCheckpoint is {} bytes of RON", saved.len());

    Ok(())
}
