//! Mixer Group Routing
//!
//! Named output groups with per-group volume and mute. Sources are routed to
//! a group by name; the registry hands out stable [`GroupId`]s.

use ahash::AHashMap;

use crate::{PlatformError, PlatformResult};

/// Stable identifier of a mixer group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(u32);

impl GroupId {
    /// Index into the owning registry
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// One output group
#[derive(Debug, Clone)]
pub struct MixerGroup {
    pub name: String,
    /// Group volume (0.0 to 1.0)
    pub volume: f32,
    pub muted: bool,
}

impl MixerGroup {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            volume: 1.0,
            muted: false,
        }
    }

    /// Device-side attenuation for this group in decibels
    ///
    /// Muted or silent groups are floored at -80 dB.
    pub fn attenuation_db(&self) -> f32 {
        if self.muted || self.volume <= 0.0 {
            -80.0
        } else {
            self.volume.ln() * 20.0
        }
    }
}

/// Registry of mixer groups
///
/// Master, Music and Sound always exist; games register further groups by
/// name. Ids stay valid for the registry's lifetime.
#[derive(Debug)]
pub struct MixerGroups {
    groups: Vec<MixerGroup>,
    by_name: AHashMap<String, GroupId>,
}

impl MixerGroups {
    pub const MASTER: GroupId = GroupId(0);
    pub const MUSIC: GroupId = GroupId(1);
    pub const SOUND: GroupId = GroupId(2);

    pub fn new() -> Self {
        let mut groups = Self {
            groups: Vec::new(),
            by_name: AHashMap::new(),
        };
        groups.add_group("Master");
        groups.add_group("Music");
        groups.add_group("Sound");
        groups
    }

    /// Register a group, returning the existing id if the name is taken
    pub fn add_group(&mut self, name: impl Into<String>) -> GroupId {
        let name = name.into();
        if let Some(&id) = self.by_name.get(&name) {
            return id;
        }
        let id = GroupId(self.groups.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.groups.push(MixerGroup::new(name));
        id
    }

    /// Look up a group by name
    pub fn resolve(&self, name: &str) -> PlatformResult<GroupId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| PlatformError::GroupNotFound(name.to_string()))
    }

    pub fn group(&self, id: GroupId) -> &MixerGroup {
        &self.groups[id.index()]
    }

    pub fn volume(&self, id: GroupId) -> f32 {
        self.groups[id.index()].volume
    }

    pub fn set_volume(&mut self, id: GroupId, volume: f32) {
        self.groups[id.index()].volume = volume;
    }

    pub fn is_muted(&self, id: GroupId) -> bool {
        self.groups[id.index()].muted
    }

    pub fn set_muted(&mut self, id: GroupId, muted: bool) {
        self.groups[id.index()].muted = muted;
    }

    /// Names of all registered groups, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl Default for MixerGroups {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_groups() {
        let groups = MixerGroups::new();
        assert_eq!(groups.resolve("Master").unwrap(), MixerGroups::MASTER);
        assert_eq!(groups.resolve("Music").unwrap(), MixerGroups::MUSIC);
        assert_eq!(groups.resolve("Sound").unwrap(), MixerGroups::SOUND);
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_unknown_group_fails() {
        let groups = MixerGroups::new();
        let err = groups.resolve("Ambience").unwrap_err();
        assert!(matches!(err, PlatformError::GroupNotFound(name) if name == "Ambience"));
    }

    #[test]
    fn test_add_group_is_idempotent() {
        let mut groups = MixerGroups::new();
        let a = groups.add_group("Ambience");
        let b = groups.add_group("Ambience");
        assert_eq!(a, b);
        assert_eq!(groups.len(), 4);
        assert_eq!(groups.resolve("Ambience").unwrap(), a);
    }

    #[test]
    fn test_attenuation() {
        let mut groups = MixerGroups::new();
        // Full volume maps to 0 dB.
        assert_eq!(groups.group(MixerGroups::MASTER).attenuation_db(), 0.0);

        groups.set_muted(MixerGroups::MASTER, true);
        assert_eq!(groups.group(MixerGroups::MASTER).attenuation_db(), -80.0);

        groups.set_muted(MixerGroups::MASTER, false);
        groups.set_volume(MixerGroups::MASTER, 0.5);
        let db = groups.group(MixerGroups::MASTER).attenuation_db();
        assert!(db < 0.0 && db > -80.0);
    }
}
