//! Filesystem watches for the serve flow.
//!
//! Each rule owns its own notify watcher and worker thread. A trigger runs
//! its action to completion before the next one for the same rule is
//! handled; events queued meanwhile are drained and coalesced by path.
//! Rules that rebuild a whole artifact run once per drained batch instead
//! of once per path.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::copier::FileSet;
use crate::error::TaskError;

/// Callback run for each changed path of a rule
pub type WatchAction = Arc<dyn Fn(&Path) + Send + Sync>;

/// A named glob watch and what to do when it fires
pub struct WatchRule {
    pub name: &'static str,
    pub set: FileSet,
    pub action: WatchAction,
    /// Run the action once per batch, with the first changed path
    pub per_batch: bool,
}

impl WatchRule {
    /// A rule whose action handles one changed file at a time
    pub fn new(name: &'static str, set: FileSet, action: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        Self {
            name,
            set,
            action: Arc::new(action),
            per_batch: false,
        }
    }

    /// A rule whose action rebuilds from every file in the set, so any
    /// number of changes in one batch needs a single run
    pub fn batch(name: &'static str, set: FileSet, action: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        Self {
            per_batch: true,
            ..Self::new(name, set, action)
        }
    }
}

impl std::fmt::Debug for WatchRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRule")
            .field("name", &self.name)
            .field("base", &self.set.base())
            .field("per_batch", &self.per_batch)
            .finish()
    }
}

/// Active watch registrations; dropping it stops every watch
#[derive(Default)]
pub struct WatchSet {
    watchers: Vec<(&'static str, RecommendedWatcher)>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the rules currently watching
    pub fn names(&self) -> Vec<&'static str> {
        self.watchers.iter().map(|(name, _)| *name).collect()
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty()
    }

    /// Start watching a rule's base directory.
    ///
    /// A base that does not exist is skipped with a warning rather than
    /// failing, matching how missing sources copy nothing.
    pub fn add(&mut self, rule: WatchRule) -> Result<bool, TaskError> {
        let base = rule.set.base().to_path_buf();
        if !base.is_dir() {
            warn!(watch = rule.name, path = %base.display(), "watch base not found, skipping");
            return Ok(false);
        }

        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |ev| {
            let _ = tx.send(ev);
        })
        .map_err(|source| TaskError::Watch {
            path: base.clone(),
            source,
        })?;
        watcher
            .watch(&base, RecursiveMode::Recursive)
            .map_err(|source| TaskError::Watch {
                path: base.clone(),
                source,
            })?;

        let name = rule.name;
        thread::Builder::new()
            .name(format!("watch:{name}"))
            .spawn(move || run_rule(rule, rx))?;

        info!(watch = name, path = %base.display(), "watching");
        self.watchers.push((name, watcher));
        Ok(true)
    }
}

/// Whether an event kind can change file contents
fn is_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Paths of an event batch the rule cares about, deduplicated
pub fn changed_paths<'a>(set: &FileSet, events: impl IntoIterator<Item = &'a Event>) -> BTreeSet<PathBuf> {
    events
        .into_iter()
        .filter(|event| is_change(&event.kind))
        .flat_map(|event| event.paths.iter())
        .filter(|path| set.matches(path))
        .cloned()
        .collect()
}

fn run_rule(rule: WatchRule, rx: Receiver<notify::Result<Event>>) {
    while let Ok(first) = rx.recv() {
        let mut batch = Vec::new();
        for result in std::iter::once(first).chain(rx.try_iter()) {
            match result {
                Ok(event) => batch.push(event),
                Err(e) => warn!(watch = rule.name, error = %e, "watch error"),
            }
        }

        let paths = changed_paths(&rule.set, &batch);
        if rule.per_batch {
            if let Some(first) = paths.first() {
                debug!(watch = rule.name, path = %first.display(), changed = paths.len(), "changed");
                (rule.action)(first);
            }
            continue;
        }

        for path in paths {
            debug!(watch = rule.name, path = %path.display(), "changed");
            (rule.action)(&path);
        }
    }
    debug!(watch = rule.name, "watch stopped");
}
