//! ConfigState - Active Device Profile and Saved Profile Set
//!
//! The active profile is validated once, when it is accepted here; every
//! downstream consumer (channel command, cloud save) trusts it afterwards.
//! The saved set is a read-through view: it is only ever replaced by a fresh
//! snapshot pushed from the cloud gateway.

use crate::constants::SAVED_PROFILES_PREVIEW;
use crate::domain::profile::DeviceProfile;
use crate::error::{Error, Result};

/// Why a save cannot start right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveBlocked {
    NoActiveProfile,
    SaveInFlight,
    CloudUnreachable,
}

impl SaveBlocked {
    pub fn message(&self) -> &'static str {
        match self {
            SaveBlocked::NoActiveProfile => "No PLC configuration to save",
            SaveBlocked::SaveInFlight => "A save is already in progress",
            SaveBlocked::CloudUnreachable => "Cloud storage is unreachable",
        }
    }
}

/// State for device profiles
#[derive(Debug, Clone, Default)]
pub struct ConfigState {
    active: Option<DeviceProfile>,
    saved: Vec<DeviceProfile>,
    saving: bool,
    cloud_reachable: bool,
}

impl ConfigState {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Active Profile ====================

    /// Validate and adopt a profile as the session's active one
    pub fn activate(&mut self, profile: DeviceProfile) -> Result<&DeviceProfile> {
        profile.validate()?;
        Ok(&*self.active.insert(profile))
    }

    pub fn active(&self) -> Option<&DeviceProfile> {
        self.active.as_ref()
    }

    // ==================== Saving ====================

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    /// Check whether `begin_save` would succeed
    pub fn save_blocked(&self) -> Option<SaveBlocked> {
        if self.active.is_none() {
            Some(SaveBlocked::NoActiveProfile)
        } else if self.saving {
            Some(SaveBlocked::SaveInFlight)
        } else if !self.cloud_reachable {
            Some(SaveBlocked::CloudUnreachable)
        } else {
            None
        }
    }

    /// Mark a save as in flight and hand out the profile to persist
    pub fn begin_save(&mut self) -> Result<DeviceProfile> {
        if let Some(blocked) = self.save_blocked() {
            return Err(Error::Invalid {
                message: blocked.message().to_string(),
            });
        }
        self.saving = true;
        self.active.clone().ok_or_else(|| Error::Invalid {
            message: SaveBlocked::NoActiveProfile.message().to_string(),
        })
    }

    /// Clear the in-flight flag. On success the active profile adopts the
    /// persisted identity so later saves overwrite the same record, unless
    /// it was replaced by a different profile while the save was running.
    pub fn finish_save(&mut self, outcome: &Result<DeviceProfile, String>) {
        self.saving = false;
        let (Ok(persisted), Some(active)) = (outcome, self.active.as_mut()) else {
            return;
        };
        let same_record = active.id.is_none() || active.id == persisted.id;
        if same_record && active.same_settings(persisted) {
            active.id = persisted.id.clone();
            active.created_at = persisted.created_at;
        }
    }

    // ==================== Cloud View ====================

    pub fn cloud_reachable(&self) -> bool {
        self.cloud_reachable
    }

    pub fn set_cloud_reachable(&mut self, reachable: bool) {
        self.cloud_reachable = reachable;
    }

    /// Replace the saved set with a gateway snapshot (already newest first)
    pub fn replace_saved(&mut self, profiles: Vec<DeviceProfile>) {
        self.saved = profiles;
    }

    pub fn saved(&self) -> &[DeviceProfile] {
        &self.saved
    }

    /// The newest few saved profiles and how many more there are
    pub fn saved_preview(&self) -> (&[DeviceProfile], usize) {
        let shown = self.saved.len().min(SAVED_PROFILES_PREVIEW);
        (&self.saved[..shown], self.saved.len() - shown)
    }
}
