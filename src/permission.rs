//! Effective access of an actor on a routed transaction
use super::grant::{DirectorateId, PermissionType, Route, RoutingGrant, UserId};

/// Who is asking. Supplied by the session layer, never read from ambient state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingIdentity {
    pub user_id: UserId,
    pub directorate_id: Option<DirectorateId>,
}

impl ActingIdentity {
    pub fn new(user_id: UserId, directorate_id: Option<DirectorateId>) -> Self {
        Self {
            user_id,
            directorate_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessLevel {
    pub can_view: bool,
    pub can_comment: bool,
    pub can_edit: bool,
    pub is_approver: bool,
}

impl AccessLevel {
    fn from_level(level: Option<PermissionType>, is_approver: bool) -> Self {
        Self {
            can_view: level.is_some(),
            can_comment: level >= Some(PermissionType::Comment),
            can_edit: level >= Some(PermissionType::Edit),
            is_approver,
        }
    }
    /// Highest permission held, if any.
    pub fn level(&self) -> Option<PermissionType> {
        if self.can_edit {
            Some(PermissionType::Edit)
        } else if self.can_comment {
            Some(PermissionType::Comment)
        } else if self.can_view {
            Some(PermissionType::View)
        } else {
            None
        }
    }
}

/// Resolves the access an actor holds through a chain's grants.
///
/// Internal grants apply when they name the actor's user, external grants when
/// they name the actor's directorate. Inactive grants are ignored. The highest
/// permission wins and no applicable grant means no access at all.
pub fn resolve(grants: &[RoutingGrant], actor: &ActingIdentity) -> AccessLevel {
    let applicable = grants.iter().filter(|grant| grant.is_granted).filter(|grant| {
        match grant.route {
            Route::Internal { user, .. } => user == actor.user_id,
            Route::External { directorate, .. } => Some(directorate) == actor.directorate_id,
        }
    });

    let mut level = None;
    let mut is_approver = false;
    for grant in applicable {
        level = level.max(Some(grant.route.permission()));
        if let Route::Internal {
            is_approver: true, ..
        } = grant.route
        {
            is_approver = true;
        }
    }

    AccessLevel::from_level(level, is_approver)
}
