//! Autosave policy: when to autosave and how many autosaves to keep.
//!
//! Two triggers feed the same gate. A recurring timer checks every
//! `interval_secs` and re-arms after each check whether or not it saved. A
//! level-change trigger fires `level_load_grace_secs` after a level finishes
//! loading, unless that level is excluded. Either one only produces a save
//! when `can_autosave` holds.
//!
//! The state is pure so it can be ticked from tests; `save_plugin` drives it
//! with real (unscaled) frame time.

use std::collections::BTreeSet;

use bevy::prelude::*;

use crate::metadata_cache::MetadataCache;
use crate::save_config::SaveConfig;
use crate::save_metadata::SaveMetadata;
use crate::save_store::delete_save;

// =============================================================================
// Configuration
// =============================================================================

#[derive(Resource, Debug, Clone)]
pub struct AutosaveConfig {
    pub enabled: bool,
    /// Seconds between timer checks.
    pub interval_secs: f32,
    /// No autosave within this many seconds of the previous one.
    pub min_interval_secs: f32,
    /// Delay between a level finishing loading and its autosave.
    pub level_load_grace_secs: f32,
    /// A player idle for longer than this is not autosaved.
    pub idle_threshold_secs: f32,
    /// Autosaves kept on disk; older ones are deleted after each autosave.
    pub retention_count: usize,
    pub autosave_on_level_change: bool,
    /// Levels that never trigger a level-change autosave.
    pub excluded_levels: BTreeSet<String>,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 300.0,
            min_interval_secs: 60.0,
            level_load_grace_secs: 5.0,
            idle_threshold_secs: 120.0,
            retention_count: 5,
            autosave_on_level_change: true,
            excluded_levels: BTreeSet::new(),
        }
    }
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutosaveTrigger {
    Timer,
    LevelChange { level: String },
}

#[derive(Debug, Clone)]
struct PendingLevel {
    level: String,
    remaining: f32,
}

#[derive(Resource, Debug, Clone, Default)]
pub struct AutosaveState {
    since_last: f32,
    timer: f32,
    in_progress: bool,
    pending_level: Option<PendingLevel>,
}

impl AutosaveState {
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn seconds_since_last(&self) -> f32 {
        self.since_last
    }

    pub fn can_autosave(&self, config: &AutosaveConfig, idle_secs: f32, is_loading: bool) -> bool {
        config.enabled
            && !self.in_progress
            && !is_loading
            && self.since_last >= config.min_interval_secs
            && idle_secs < config.idle_threshold_secs
    }

    /// Arm the level-change trigger.
    pub fn on_level_loaded(&mut self, level: &str, config: &AutosaveConfig) {
        if !config.autosave_on_level_change {
            return;
        }
        self.pending_level = Some(PendingLevel {
            level: level.to_string(),
            remaining: config.level_load_grace_secs,
        });
    }

    /// Advance by `dt` seconds. Returns the trigger to act on, if any.
    pub fn tick(
        &mut self,
        dt: f32,
        config: &AutosaveConfig,
        idle_secs: f32,
        is_loading: bool,
    ) -> Option<AutosaveTrigger> {
        self.since_last += dt;
        if !config.enabled {
            self.timer = 0.0;
            self.pending_level = None;
            return None;
        }
        self.timer += dt;

        if let Some(pending) = &mut self.pending_level {
            pending.remaining -= dt;
            if pending.remaining <= 0.0 {
                let level = std::mem::take(&mut pending.level);
                self.pending_level = None;
                if config.excluded_levels.contains(&level) {
                    debug!("Autosave: level '{level}' is excluded");
                } else if self.can_autosave(config, idle_secs, is_loading) {
                    return Some(AutosaveTrigger::LevelChange { level });
                } else {
                    debug!("Autosave: skipped level-change save for '{level}'");
                }
            }
        }

        if self.timer >= config.interval_secs {
            self.timer = 0.0;
            if self.can_autosave(config, idle_secs, is_loading) {
                return Some(AutosaveTrigger::Timer);
            }
        }
        None
    }

    pub fn begin(&mut self) {
        self.in_progress = true;
    }

    pub fn finish(&mut self, success: bool) {
        self.in_progress = false;
        if success {
            self.since_last = 0.0;
        }
    }
}

// =============================================================================
// Retention
// =============================================================================

/// Names of the autosaves beyond the newest `keep`.
pub fn select_evictions(autosaves: &[&SaveMetadata], keep: usize) -> Vec<String> {
    let mut sorted = autosaves.to_vec();
    sorted.sort_by(|a, b| b.save_timestamp.cmp(&a.save_timestamp));
    sorted
        .into_iter()
        .skip(keep)
        .map(|m| m.save_filename.clone())
        .collect()
}

/// Delete autosaves beyond `keep`, newest kept. Returns how many went.
pub fn prune_autosaves(config: &SaveConfig, cache: &mut MetadataCache, keep: usize) -> usize {
    let evict = select_evictions(&cache.autosaves(config), keep);
    let mut removed = 0;
    for name in evict {
        match delete_save(config, &name) {
            Ok(()) => {
                cache.remove(&name);
                removed += 1;
            }
            Err(e) => {
                warn!("Autosave retention: could not delete '{name}': {e}");
                cache.forget_if_deleted(config, &name);
            }
        }
    }
    removed
}
