//! Saveable types and helpers shared by the integration tests.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use save::records::PrefabRef;
use save::scene_host::MemorySceneHost;
use save::type_registry::reference::ObjectRef;
use save::{GameObject, SaveFields, SaveableEntity, SharedObject, UniqueId};

pub const BARREL_PREFAB: &str = "props/barrel";

#[derive(Default, SaveFields)]
pub struct Gate {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
    pub open: bool,
    pub code: String,
}

impl SaveableEntity for Gate {
    const TYPE_NAME: &'static str = "Gate";

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
}

/// Points at a gate in the same or another scene.
#[derive(Default, SaveFields)]
pub struct Lever {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
    pub pulled: bool,
    #[save(reference)]
    pub target: ObjectRef<Gate>,
}

impl SaveableEntity for Lever {
    const TYPE_NAME: &'static str = "Lever";

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
}

/// Spawned at runtime from `BARREL_PREFAB`.
#[derive(Default, SaveFields)]
pub struct Barrel {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
    pub fill: f32,
}

impl SaveableEntity for Barrel {
    const TYPE_NAME: &'static str = "Barrel";

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
    fn prefab(&self) -> Option<PrefabRef> {
        Some(PrefabRef::from(BARREL_PREFAB))
    }
}

/// One per game, lives in the manager scene.
#[derive(Default, SaveFields)]
pub struct Ledger {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
    pub coins: u32,
}

impl SaveableEntity for Ledger {
    const TYPE_NAME: &'static str = "Ledger";
    const SINGLETON: bool = true;

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
}

/// Scene-authored entity used by the fuzz test.
#[derive(Default, SaveFields)]
pub struct Lamp {
    #[save(skip)]
    pub uid: UniqueId,
    #[save(skip)]
    pub go: GameObject,
    pub level: u32,
}

impl SaveableEntity for Lamp {
    const TYPE_NAME: &'static str = "Lamp";

    fn unique_id(&self) -> &UniqueId {
        &self.uid
    }
    fn unique_id_mut(&mut self) -> &mut UniqueId {
        &mut self.uid
    }
    fn game_object(&self) -> &GameObject {
        &self.go
    }
    fn game_object_mut(&mut self) -> &mut GameObject {
        &mut self.go
    }
}

pub fn host(scenes: &[&str]) -> Arc<MemorySceneHost> {
    let mut host = MemorySceneHost::new();
    host.register_prefab(BARREL_PREFAB, || SharedObject::new(Barrel::default()));
    for scene in scenes {
        host.load_scene(*scene);
    }
    Arc::new(host)
}

pub fn gate(scene: &str, open: bool, code: &str) -> Gate {
    Gate {
        uid: UniqueId::generate(),
        go: GameObject::in_scene(scene),
        open,
        code: code.to_string(),
    }
}

pub fn barrel(scene: &str, fill: f32) -> Barrel {
    Barrel {
        uid: UniqueId::generate(),
        go: GameObject::in_scene(scene),
        fill,
    }
}

pub fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("scene_save_integration_{name}"));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Deterministic xorshift64 for reproducible fuzzing.
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Self(seed.max(1))
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: usize) -> usize {
        (self.next_u64() % n as u64) as usize
    }
}
