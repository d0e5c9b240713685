//! Identity and role resolution.
//!
//! The engine never stores users. It asks an [`IdentityProvider`] who is
//! responsible for a stage, which shop-floor area a user works in and
//! whether a user administers the system.

mod directory;

pub use directory::{Directory, DirectoryUser};

use crate::core::{AreaId, UserId, UserRef};
use crate::graph::StageDef;

/// Resolves users, roles and areas.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    /// Returns the user responsible for `stage`, or `None` if unresolved.
    fn responsible_for(&self, stage: &StageDef) -> Option<UserRef>;

    /// Returns the shop-floor area `user` works in.
    fn area_of(&self, user: &UserId) -> Option<AreaId>;

    /// Returns true if `user` may act on any stage.
    fn is_admin(&self, user: &UserId) -> bool;
}

/// The user an operation is performed on behalf of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    /// The acting user.
    pub user: UserId,
    /// Whether the user is an administrator.
    pub admin: bool,
}

impl Actor {
    /// Creates a non-admin actor.
    pub fn new(user: impl Into<UserId>) -> Self {
        Self {
            user: user.into(),
            admin: false,
        }
    }

    /// Creates an administrator.
    pub fn admin(user: impl Into<UserId>) -> Self {
        Self {
            user: user.into(),
            admin: true,
        }
    }

    /// Resolves an actor's admin flag through `identity`.
    pub fn resolve(identity: &dyn IdentityProvider, user: impl Into<UserId>) -> Self {
        let user = user.into();
        let admin = identity.is_admin(&user);
        Self { user, admin }
    }

    /// Returns true if the actor may act as `assignee`.
    #[must_use]
    pub fn may_act_as(&self, assignee: Option<&UserRef>) -> bool {
        self.admin || assignee.is_some_and(|a| a.id == self.user)
    }
}
