//! RON loader for rule, timer and clock documents
//!
//! Documents look like `(rules: [...])`, `(timers: [...])` or
//! `(multiplier: 60.0, start: "1320-04-02T06:00:00")`. A document that is
//! not valid RON is a file-level [`Error`]. Each rule or timer record is
//! parsed and validated on its own: a record with an unknown kind, a missing
//! field or a failed check is rejected and the rest of the load continues.

use crate::error::{Error, Result};
use cadence_core::{ClockConfig, ConfigError, DefId, Rejection, Rule, Session, TimerRule};
use indexmap::IndexSet;
use ron::value::RawValue;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Accepted records plus everything that was turned away
#[derive(Debug, Default)]
pub struct LoadReport {
    pub rules: Vec<Rule>,
    pub timers: Vec<TimerRule>,
    pub clock: Option<ClockConfig>,
    pub rejections: Vec<Rejection>,
}

impl LoadReport {
    /// Build a fresh session from the loaded content
    ///
    /// Falls back to the default clock when no clock document was loaded.
    pub fn into_session(mut self, seed: u64) -> Result<Session> {
        let clock = self.clock.take().unwrap_or_default();
        let mut session = Session::with_seed(&clock, seed)?;
        self.install(&mut session);
        Ok(session)
    }

    /// Hot reload: replace a running session's rules and timers
    ///
    /// A loaded clock document only updates the multiplier; fiction time
    /// already elapsed is kept.
    pub fn apply_to(self, session: &mut Session) -> Result<()> {
        if let Some(clock) = &self.clock {
            session.clock.reconfigure(clock.multiplier)?;
        }
        self.install(session);
        Ok(())
    }

    fn install(self, session: &mut Session) {
        // Records were validated while loading; the session logs anything else
        session.replace_rules(self.rules);
        session.replace_timers(self.timers);
    }
}

#[derive(serde::Deserialize)]
struct RuleFile {
    rules: Vec<Box<RawValue>>,
}

#[derive(serde::Deserialize)]
struct TimerFile {
    timers: Vec<Box<RawValue>>,
}

/// Just enough of a record to name it in a rejection
#[derive(serde::Deserialize)]
struct RecordHead {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Rules,
    Timers,
    Clock,
}

impl DocumentKind {
    fn from_file_name(name: &str) -> Option<Self> {
        if name.contains("timer") {
            Some(Self::Timers)
        } else if name.contains("rule") {
            Some(Self::Rules)
        } else if name.contains("clock") {
            Some(Self::Clock)
        } else {
            None
        }
    }

    /// The earliest top-level marker wins
    fn from_content(content: &str) -> Option<Self> {
        [
            ("rules:", Self::Rules),
            ("timers:", Self::Timers),
            ("multiplier:", Self::Clock),
        ]
        .into_iter()
        .filter_map(|(marker, kind)| content.find(marker).map(|at| (at, kind)))
        .min_by_key(|(at, _)| *at)
        .map(|(_, kind)| kind)
    }
}

/// Parse each record separately so a bad shape only costs that record
fn parse_records<T: DeserializeOwned>(records: &[Box<RawValue>]) -> Vec<std::result::Result<T, Rejection>> {
    records
        .iter()
        .enumerate()
        .map(|(index, raw)| {
            raw.into_rust::<T>().map_err(|err| {
                let id = raw
                    .into_rust::<RecordHead>()
                    .map(|head| head.id)
                    .unwrap_or_default();
                let id = if id.is_empty() { format!("#{}", index) } else { id };
                Rejection::new(id, ConfigError::Malformed(err.to_string()))
            })
        })
        .collect()
}

/// Loader for RON content
pub struct Loader {
    report: LoadReport,
    rule_ids: IndexSet<DefId>,
    timer_ids: IndexSet<DefId>,
}

impl Loader {
    /// Create a new loader
    pub fn new() -> Self {
        Self {
            report: LoadReport::default(),
            rule_ids: IndexSet::new(),
            timer_ids: IndexSet::new(),
        }
    }

    /// Load a single RON file
    ///
    /// The kind comes from the file name, or from the content when the name
    /// says nothing.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        match DocumentKind::from_file_name(filename).or_else(|| DocumentKind::from_content(&content)) {
            Some(DocumentKind::Rules) => self.load_rules_str(&content),
            Some(DocumentKind::Timers) => self.load_timers_str(&content),
            Some(DocumentKind::Clock) => self.load_clock_str(&content),
            None => Err(Error::UnknownDocument(path.display().to_string())),
        }
    }

    /// Load rules from a RON string
    pub fn load_rules_str(&mut self, content: &str) -> Result<()> {
        let file: RuleFile = ron::from_str(content)?;
        let total = file.rules.len();
        let mut accepted = 0;
        for parsed in parse_records::<Rule>(&file.rules) {
            let rule = match parsed {
                Ok(rule) => rule,
                Err(rejection) => {
                    self.reject(rejection);
                    continue;
                }
            };
            let id = rule.id.clone();
            let checked = rule.validate().and_then(|()| {
                if self.rule_ids.contains(&id) {
                    Err(ConfigError::DuplicateDefinition(id.to_string()))
                } else {
                    Ok(())
                }
            });
            match checked {
                Ok(()) => {
                    self.rule_ids.insert(id);
                    self.report.rules.push(rule);
                    accepted += 1;
                }
                Err(reason) => self.reject(Rejection::new(id.to_string(), reason)),
            }
        }
        tracing::info!(accepted, rejected = total - accepted, "rule document loaded");
        Ok(())
    }

    /// Load timers from a RON string
    pub fn load_timers_str(&mut self, content: &str) -> Result<()> {
        let file: TimerFile = ron::from_str(content)?;
        let total = file.timers.len();
        let mut accepted = 0;
        for parsed in parse_records::<TimerRule>(&file.timers) {
            let timer = match parsed {
                Ok(timer) => timer,
                Err(rejection) => {
                    self.reject(rejection);
                    continue;
                }
            };
            let id = timer.id.clone();
            let checked = timer.validate().and_then(|()| {
                if self.timer_ids.contains(&id) {
                    Err(ConfigError::DuplicateDefinition(id.to_string()))
                } else {
                    Ok(())
                }
            });
            match checked {
                Ok(()) => {
                    self.timer_ids.insert(id);
                    self.report.timers.push(timer);
                    accepted += 1;
                }
                Err(reason) => self.reject(Rejection::new(id.to_string(), reason)),
            }
        }
        tracing::info!(accepted, rejected = total - accepted, "timer document loaded");
        Ok(())
    }

    /// Load clock configuration from a RON string
    ///
    /// An invalid multiplier fails the whole document.
    pub fn load_clock_str(&mut self, content: &str) -> Result<()> {
        let clock: ClockConfig = ron::from_str(content)?;
        clock.validate()?;
        tracing::info!(multiplier = clock.multiplier, start = %clock.start, "clock configured");
        self.report.clock = Some(clock);
        Ok(())
    }

    /// Load all RON files from a directory, recursing into subdirectories
    pub fn load_directory(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        if !path.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Not a directory: {:?}", path),
            )));
        }

        let mut entries = fs::read_dir(path)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        // Declaration order across files follows file names
        entries.sort();

        for file_path in entries {
            if file_path.extension().is_some_and(|e| e == "ron") {
                self.load_file(&file_path)?;
            } else if file_path.is_dir() {
                self.load_directory(&file_path)?;
            }
        }

        Ok(())
    }

    fn reject(&mut self, rejection: Rejection) {
        tracing::warn!(record = %rejection.record_id, reason = %rejection.reason, "record rejected");
        self.report.rejections.push(rejection);
    }

    /// Finish loading and return the report
    pub fn finish(self) -> LoadReport {
        self.report
    }

    /// Get the current report (for inspection during loading)
    pub fn report(&self) -> &LoadReport {
        &self.report
    }
}

impl Default for Loader {
    fn default() -> Self {
        Self::new()
    }
}
