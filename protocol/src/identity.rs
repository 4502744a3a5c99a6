use std::fmt;

use serde::Deserialize;
use serde::Serialize;

/// The effective user/group a console executes as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user: String,
    pub uid: u32,
    pub group: String,
    pub gid: u32,
}

impl Identity {
    pub fn new(user: impl Into<String>, uid: u32, group: impl Into<String>, gid: u32) -> Self {
        Self {
            user: user.into(),
            uid,
            group: group.into(),
            gid,
        }
    }

    /// Placeholder reported by a console that has not been allocated yet.
    pub fn unknown() -> Self {
        Self::new("unknown", u32::MAX, "unknown", u32::MAX)
    }

    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} ({}/{})",
            self.user, self.group, self.uid, self.gid
        )
    }
}
