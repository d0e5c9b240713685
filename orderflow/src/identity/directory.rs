//! In-memory user directory.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::IdentityProvider;
use crate::core::{AreaId, UserId, UserRef};
use crate::graph::StageDef;

/// A directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryUser {
    /// Login and display name.
    pub user: UserRef,
    /// The role the user holds.
    #[serde(default)]
    pub role: Option<String>,
    /// The shop-floor area the user works in.
    #[serde(default)]
    pub area: Option<AreaId>,
    /// Administrator flag.
    #[serde(default)]
    pub admin: bool,
}

impl DirectoryUser {
    /// Creates an entry without role or area.
    pub fn new(login: impl Into<UserId>, name: impl Into<String>) -> Self {
        Self {
            user: UserRef::new(login, name),
            role: None,
            area: None,
            admin: false,
        }
    }

    /// Sets the role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Sets the area.
    #[must_use]
    pub fn with_area(mut self, area: u32) -> Self {
        self.area = Some(AreaId(area));
        self
    }

    /// Marks the user as an administrator.
    #[must_use]
    pub fn admin(mut self) -> Self {
        self.admin = true;
        self
    }
}

/// A directory of users keyed by login.
///
/// When several users hold a role, the first login in sort order is
/// responsible for its stages.
#[derive(Debug, Default)]
pub struct Directory {
    users: RwLock<BTreeMap<UserId, DirectoryUser>>,
}

impl Directory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user, replacing any entry with the same login.
    #[must_use]
    pub fn with_user(self, user: DirectoryUser) -> Self {
        self.insert(user);
        self
    }

    /// Adds or replaces a user.
    pub fn insert(&self, user: DirectoryUser) {
        self.users.write().insert(user.user.id.clone(), user);
    }

    /// Removes a user.
    pub fn remove(&self, login: &UserId) -> Option<DirectoryUser> {
        self.users.write().remove(login)
    }

    /// Returns the number of users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Returns true if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.read().is_empty()
    }
}

impl IdentityProvider for Directory {
    fn responsible_for(&self, stage: &StageDef) -> Option<UserRef> {
        let role = stage.role.as_deref()?;
        self.users
            .read()
            .values()
            .find(|u| u.role.as_deref() == Some(role))
            .map(|u| u.user.clone())
    }

    fn area_of(&self, user: &UserId) -> Option<AreaId> {
        self.users.read().get(user).and_then(|u| u.area)
    }

    fn is_admin(&self, user: &UserId) -> bool {
        self.users.read().get(user).is_some_and(|u| u.admin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Directory {
        Directory::new()
            .with_user(DirectoryUser::new("zed", "Zed").with_role("designer"))
            .with_user(DirectoryUser::new("amy", "Amy").with_role("designer"))
            .with_user(DirectoryUser::new("op", "Operator").with_area(3))
            .with_user(DirectoryUser::new("root", "Admin").admin())
    }

    #[test]
    fn test_responsible_for_picks_first_login() {
        let stage = StageDef::new(4, "SpecDev").with_role("designer");
        let user = directory().responsible_for(&stage).unwrap();
        assert_eq!(user.id, UserId::new("amy"));
    }

    #[test]
    fn test_roleless_stage_has_no_assignee() {
        assert!(directory().responsible_for(&StageDef::new(3, "DDDev")).is_none());
    }

    #[test]
    fn test_area_and_admin_lookups() {
        let dir = directory();

        assert_eq!(dir.area_of(&UserId::new("op")), Some(AreaId(3)));
        assert_eq!(dir.area_of(&UserId::new("amy")), None);
        assert!(dir.is_admin(&UserId::new("root")));
        assert!(!dir.is_admin(&UserId::new("nobody")));
    }

    #[test]
    fn test_remove_user() {
        let dir = directory();
        assert_eq!(dir.len(), 4);
        assert!(dir.remove(&UserId::new("amy")).is_some());
        assert_eq!(dir.len(), 3);
    }
}
