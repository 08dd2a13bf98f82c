//! Display names for routed actors.
//!
//! Users and directorates are opaque foreign keys here. The master-data
//! directory that owns them is a collaborator; the timeline only asks it for a
//! name and falls back to a generic label when it has none.

use super::grant::{DirectorateId, UserId};
use std::collections::HashMap;

pub trait Directory {
    fn user_name(&self, user: UserId) -> Option<String>;
    fn directorate_name(&self, directorate: DirectorateId) -> Option<String>;
}

/// Knows no names at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnnamedDirectory;

impl Directory for UnnamedDirectory {
    fn user_name(&self, _: UserId) -> Option<String> {
        None
    }
    fn directorate_name(&self, _: DirectorateId) -> Option<String> {
        None
    }
}

/// In-memory lookup, typically filled from a directory snapshot.
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    users: HashMap<UserId, String>,
    directorates: HashMap<DirectorateId, String>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_user(mut self, user: UserId, name: &str) -> Self {
        self.users.insert(user, name.to_string());
        self
    }
    pub fn with_directorate(mut self, directorate: DirectorateId, name: &str) -> Self {
        self.directorates.insert(directorate, name.to_string());
        self
    }
}

impl Directory for StaticDirectory {
    fn user_name(&self, user: UserId) -> Option<String> {
        self.users.get(&user).cloned()
    }
    fn directorate_name(&self, directorate: DirectorateId) -> Option<String> {
        self.directorates.get(&directorate).cloned()
    }
}
