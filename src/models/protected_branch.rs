use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AccessLevel;

/// Who may push to, or merge into, a protected branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchAccess {
    NoOne,
    Developers,
    Maintainers,
}

impl BranchAccess {
    pub fn as_i64(&self) -> i64 {
        match self {
            BranchAccess::NoOne => 0,
            BranchAccess::Developers => 30,
            BranchAccess::Maintainers => 40,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(BranchAccess::NoOne),
            30 => Some(BranchAccess::Developers),
            40 => Some(BranchAccess::Maintainers),
            _ => None,
        }
    }

    pub fn grants(&self, level: AccessLevel) -> bool {
        match self {
            BranchAccess::NoOne => false,
            BranchAccess::Developers => level >= AccessLevel::Developer,
            BranchAccess::Maintainers => level >= AccessLevel::Maintainer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedBranch {
    pub id: Uuid,
    pub project_id: Uuid,
    /// Branch name or wildcard pattern such as `release/*`.
    pub name: String,
    pub push_access: BranchAccess,
    pub merge_access: BranchAccess,
}

impl ProtectedBranch {
    /// Protection with the default levels: maintainers push and merge.
    pub fn new(project_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            name: name.into(),
            push_access: BranchAccess::Maintainers,
            merge_access: BranchAccess::Maintainers,
        }
    }

    pub fn no_one_can_push(project_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            push_access: BranchAccess::NoOne,
            ..Self::new(project_id, name)
        }
    }

    pub fn developers_can_push(project_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            push_access: BranchAccess::Developers,
            ..Self::new(project_id, name)
        }
    }

    pub fn developers_can_merge(project_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            merge_access: BranchAccess::Developers,
            ..Self::new(project_id, name)
        }
    }

    pub fn matches(&self, ref_name: &str) -> bool {
        if !self.name.contains('*') {
            return self.name == ref_name;
        }
        wildcard_match(&self.name, ref_name)
    }
}

// `*` matches any run of characters, including `/`.
fn wildcard_match(pattern: &str, candidate: &str) -> bool {
    let mut parts = pattern.split('*');
    let first = parts.next().unwrap_or_default();
    let Some(mut rest) = candidate.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(idx) => rest = &rest[idx + part.len()..],
            None => return false,
        }
    }

    rest.len() >= last.len() && rest.ends_with(last)
}
