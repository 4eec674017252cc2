// ---------------------------------------------------------------------------
// save_plugin – Bevy wiring for saving, loading and autosave
// ---------------------------------------------------------------------------
//
// Requests arrive as events, disk work runs through `SaveJobs`, and the
// results come back as `SaveCompleted` / `LoadCompleted`. A load freezes
// virtual time until every scene is restored.

use bevy::prelude::*;
use chrono::{Local, Utc};

use crate::autosave::{prune_autosaves, AutosaveConfig, AutosaveState, AutosaveTrigger};
use crate::bundle_io::encode_bundle;
use crate::metadata_cache::MetadataCache;
use crate::records::SceneName;
use crate::save_config::SaveConfig;
use crate::save_context::{ApplyReport, SaveSubsystem};
use crate::save_error::SaveError;
use crate::save_jobs::{JobKind, JobOutput, SaveJobs};
use crate::save_metadata::{MetadataFile, SaveMetadata, Screenshot};
use crate::save_store::{delete_save, unique_save_name};
use crate::scene_host::{MemorySceneHost, SceneHost};

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// The engine side the save subsystem talks to.
#[derive(Resource)]
pub struct SceneHostResource(pub Box<dyn SceneHost>);

impl Default for SceneHostResource {
    fn default() -> Self {
        Self(Box::new(MemorySceneHost::new()))
    }
}

/// Whether virtual time was already paused when the running load froze it.
#[derive(Resource, Default)]
struct PausedBeforeLoad(bool);

/// Fed by the game; idle players are not autosaved.
#[derive(Resource, Debug, Default, Clone, Copy)]
pub struct PlayerActivity {
    pub idle_seconds: f32,
}

/// Level name written into new metadata files.
#[derive(Resource, Debug, Default, Clone)]
pub struct CurrentLevel(pub Option<String>);

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[derive(Event, Debug, Clone, Default)]
pub struct SaveRequest {
    /// Bundle name; generated from the prefix and current time when `None`.
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub autosave: bool,
    pub screenshot: Option<Screenshot>,
}

impl SaveRequest {
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }

    pub fn autosave() -> Self {
        Self {
            autosave: true,
            ..Default::default()
        }
    }
}

#[derive(Event, Debug, Clone)]
pub struct LoadRequest {
    pub name: String,
}

#[derive(Event, Debug, Clone)]
pub struct DeleteSaveRequest {
    pub name: String,
}

/// A scene is about to unload; its entities still exist.
#[derive(Event, Debug, Clone)]
pub struct BeforeSceneSerializeState {
    pub scene: SceneName,
}

/// A scene's entities were loaded but not yet restored.
#[derive(Event, Debug, Clone)]
pub struct BeforeSceneRestoreState {
    pub scene: SceneName,
}

/// A scene is fully loaded; apply its records.
#[derive(Event, Debug, Clone)]
pub struct AfterSceneRestoreState {
    pub scene: SceneName,
}

#[derive(Event, Debug, Clone)]
pub struct LevelLoaded {
    pub level: String,
}

#[derive(Event, Debug, Clone)]
pub struct SaveCompleted {
    pub name: String,
    pub autosave: bool,
    pub error: Option<String>,
}

#[derive(Event, Debug, Clone)]
pub struct LoadCompleted {
    pub name: String,
    pub report: Option<ApplyReport>,
    pub error: Option<String>,
}

// ---------------------------------------------------------------------------
// Plugin
// ---------------------------------------------------------------------------

pub struct SavePlugin;

impl Plugin for SavePlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<SaveRequest>()
            .add_event::<LoadRequest>()
            .add_event::<DeleteSaveRequest>()
            .add_event::<BeforeSceneSerializeState>()
            .add_event::<BeforeSceneRestoreState>()
            .add_event::<AfterSceneRestoreState>()
            .add_event::<LevelLoaded>()
            .add_event::<SaveCompleted>()
            .add_event::<LoadCompleted>()
            .init_resource::<SaveConfig>()
            .init_resource::<AutosaveConfig>()
            .init_resource::<AutosaveState>()
            .init_resource::<SaveSubsystem>()
            .init_resource::<MetadataCache>()
            .init_resource::<SaveJobs>()
            .init_resource::<SceneHostResource>()
            .init_resource::<PlayerActivity>()
            .init_resource::<CurrentLevel>()
            .init_resource::<PausedBeforeLoad>();

        app.add_systems(Startup, refresh_metadata_cache);

        // Lifecycle before requests so a save issued in the same frame sees
        // the post-transition caches; jobs are polled last.
        app.add_systems(
            Update,
            (
                handle_scene_lifecycle,
                handle_level_loaded,
                tick_autosave,
                handle_save_requests,
                handle_load_requests,
                handle_delete_requests,
                poll_save_jobs,
            )
                .chain(),
        );
    }
}

// ---------------------------------------------------------------------------
// Systems
// ---------------------------------------------------------------------------

fn refresh_metadata_cache(config: Res<SaveConfig>, mut cache: ResMut<MetadataCache>) {
    let count = cache.refresh(&config);
    info!("Found {count} saves in {}", config.root.display());
}

fn handle_scene_lifecycle(
    mut subsystem: ResMut<SaveSubsystem>,
    host: Res<SceneHostResource>,
    mut serialize: EventReader<BeforeSceneSerializeState>,
    mut before_restore: EventReader<BeforeSceneRestoreState>,
    mut after_restore: EventReader<AfterSceneRestoreState>,
) {
    for event in serialize.read() {
        subsystem.on_before_serialize(&event.scene);
    }
    for event in before_restore.read() {
        subsystem.on_before_restore(&event.scene, host.0.as_ref());
    }
    for event in after_restore.read() {
        subsystem.on_after_restore(&event.scene, host.0.as_ref());
    }
}

fn handle_level_loaded(
    mut events: EventReader<LevelLoaded>,
    config: Res<AutosaveConfig>,
    mut state: ResMut<AutosaveState>,
    mut current: ResMut<CurrentLevel>,
) {
    for event in events.read() {
        current.0 = Some(event.level.clone());
        state.on_level_loaded(&event.level, &config);
    }
}

/// Uses real time so autosave keeps counting while the game is paused.
fn tick_autosave(
    time: Res<Time<Real>>,
    config: Res<AutosaveConfig>,
    activity: Res<PlayerActivity>,
    subsystem: Res<SaveSubsystem>,
    jobs: Res<SaveJobs>,
    mut state: ResMut<AutosaveState>,
    mut requests: EventWriter<SaveRequest>,
) {
    let loading = subsystem.is_loading() || jobs.is_loading();
    let Some(trigger) = state.tick(time.delta_secs(), &config, activity.idle_seconds, loading)
    else {
        return;
    };
    match trigger {
        AutosaveTrigger::Timer => debug!("Autosave: timer"),
        AutosaveTrigger::LevelChange { level } => debug!("Autosave: entered '{level}'"),
    }
    requests.send(SaveRequest::autosave());
}

#[allow(clippy::too_many_arguments)]
fn handle_save_requests(
    mut events: EventReader<SaveRequest>,
    mut subsystem: ResMut<SaveSubsystem>,
    host: Res<SceneHostResource>,
    config: Res<SaveConfig>,
    current: Res<CurrentLevel>,
    mut jobs: ResMut<SaveJobs>,
    mut autosave: ResMut<AutosaveState>,
    mut completed: EventWriter<SaveCompleted>,
) {
    for request in events.read() {
        if subsystem.is_loading() || jobs.is_loading() {
            warn!("Save request ignored: a load is in progress");
            continue;
        }
        if request.autosave && autosave.in_progress() {
            debug!("Autosave request ignored: one is already running");
            continue;
        }

        let prefix = if request.autosave {
            &config.autosave_prefix
        } else {
            &config.manual_prefix
        };
        let name = request
            .name
            .clone()
            .unwrap_or_else(|| unique_save_name(&config, prefix, Local::now()));

        let bundle = subsystem.capture_bundle(host.0.as_ref());
        let encoded = match encode_bundle(&bundle, &config.version, config.compress) {
            Ok(encoded) => encoded,
            Err(e) => {
                error!("Save '{name}' failed to encode: {e}");
                completed.send(SaveCompleted {
                    name,
                    autosave: request.autosave,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };

        let screenshot_png = match request.screenshot.as_ref().map(Screenshot::encode_png) {
            Some(Ok(png)) => png,
            Some(Err(e)) => {
                warn!("Save '{name}': screenshot dropped: {e}");
                Vec::new()
            }
            None => Vec::new(),
        };
        let display_name = request.display_name.as_deref().unwrap_or(&name);
        let level = current.0.as_deref().unwrap_or_default();
        let metadata = MetadataFile {
            metadata: SaveMetadata::new(&name, display_name, level, &config.version),
            screenshot_png,
        };

        debug!(
            "Save '{name}': {} records, {} bytes encoded",
            bundle.record_count(),
            encoded.total_bytes()
        );
        if request.autosave {
            autosave.begin();
        }
        jobs.spawn_save(&name, request.autosave, &config, encoded, metadata);
    }
}

fn handle_load_requests(
    mut events: EventReader<LoadRequest>,
    mut subsystem: ResMut<SaveSubsystem>,
    config: Res<SaveConfig>,
    mut jobs: ResMut<SaveJobs>,
    mut time: ResMut<Time<Virtual>>,
    mut paused_before: ResMut<PausedBeforeLoad>,
) {
    for request in events.read() {
        if subsystem.is_loading() || !jobs.is_empty() {
            warn!("Load of '{}' ignored: save system busy", request.name);
            continue;
        }
        subsystem.set_loading(true);
        paused_before.0 = time.is_paused();
        time.pause();
        jobs.spawn_load(&request.name, &config, subsystem.tracked_scenes());
    }
}

fn handle_delete_requests(
    mut events: EventReader<DeleteSaveRequest>,
    config: Res<SaveConfig>,
    mut cache: ResMut<MetadataCache>,
) {
    for request in events.read() {
        match delete_save(&config, &request.name) {
            Ok(()) => {
                cache.remove(&request.name);
            }
            Err(e) => {
                error!("Delete of '{}' failed: {e}", request.name);
                cache.forget_if_deleted(&config, &request.name);
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn poll_save_jobs(
    mut jobs: ResMut<SaveJobs>,
    mut subsystem: ResMut<SaveSubsystem>,
    host: Res<SceneHostResource>,
    config: Res<SaveConfig>,
    autosave_config: Res<AutosaveConfig>,
    mut autosave: ResMut<AutosaveState>,
    mut cache: ResMut<MetadataCache>,
    mut time: ResMut<Time<Virtual>>,
    paused_before: Res<PausedBeforeLoad>,
    mut saved: EventWriter<SaveCompleted>,
    mut loaded: EventWriter<LoadCompleted>,
) {
    for job in jobs.poll() {
        match (job.kind, job.result) {
            (JobKind::Save { name, autosave: auto }, result) => {
                let error = match result {
                    Ok(JobOutput::Saved(metadata)) => {
                        info!("Saved '{name}'");
                        cache.insert(metadata);
                        None
                    }
                    Ok(JobOutput::Loaded(_)) => None,
                    Err(e) => {
                        error!("Save '{name}' failed: {e}");
                        Some(e.to_string())
                    }
                };
                if auto {
                    autosave.finish(error.is_none());
                    let pruned =
                        prune_autosaves(&config, &mut cache, autosave_config.retention_count);
                    if pruned > 0 {
                        debug!("Autosave retention removed {pruned} saves");
                    }
                }
                saved.send(SaveCompleted {
                    name,
                    autosave: auto,
                    error,
                });
            }
            (JobKind::Load { name }, result) => {
                let outcome = match result {
                    Ok(JobOutput::Loaded(Some(bundle))) => {
                        Ok(subsystem.apply_bundle(bundle, host.0.as_ref()))
                    }
                    Ok(JobOutput::Loaded(None)) => Err(SaveError::NotFound(name.clone())),
                    Ok(JobOutput::Saved(_)) => Err(SaveError::NotFound(name.clone())),
                    Err(e) => Err(e),
                };
                subsystem.set_loading(false);
                if !paused_before.0 {
                    time.unpause();
                }

                match outcome {
                    Ok(report) => {
                        info!("Loaded '{name}'");
                        if let Err(e) =
                            cache.touch_last_loaded(&config, &name, Utc::now().timestamp())
                        {
                            warn!("Could not update last-loaded time of '{name}': {e}");
                        }
                        loaded.send(LoadCompleted {
                            name,
                            report: Some(report),
                            error: None,
                        });
                    }
                    Err(e) => {
                        error!("Load of '{name}' failed: {e}");
                        loaded.send(LoadCompleted {
                            name,
                            report: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }
    }
}
