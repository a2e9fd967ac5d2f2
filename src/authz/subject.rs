use std::fmt;

use uuid::Uuid;

/// The actor an authorization question is asked for.
///
/// Supplied by the session layer; the engine never authenticates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subject {
    Anonymous,
    User { id: Uuid, admin: bool },
}

impl Subject {
    pub fn anonymous() -> Self {
        Subject::Anonymous
    }

    pub fn user(id: Uuid) -> Self {
        Subject::User { id, admin: false }
    }

    pub fn admin(id: Uuid) -> Self {
        Subject::User { id, admin: true }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            Subject::Anonymous => None,
            Subject::User { id, .. } => Some(*id),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Subject::Anonymous)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Subject::User { admin: true, .. })
    }

    /// Identity used in condition cache keys.
    pub fn cache_key(&self) -> SubjectKey {
        match self {
            Subject::Anonymous => SubjectKey::Anonymous,
            Subject::User { id, admin } => SubjectKey::User { id: *id, admin: *admin },
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Anonymous => f.write_str("anonymous"),
            Subject::User { id, .. } => write!(f, "user:{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubjectKey {
    Anonymous,
    User { id: Uuid, admin: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_has_no_id() {
        let subject = Subject::anonymous();
        assert!(subject.is_anonymous());
        assert!(!subject.is_admin());
        assert_eq!(subject.id(), None);
        assert_eq!(subject.cache_key(), SubjectKey::Anonymous);
    }

    #[test]
    fn admin_flag_is_part_of_cache_identity() {
        let id = Uuid::new_v4();
        assert!(Subject::admin(id).is_admin());
        assert_ne!(Subject::admin(id).cache_key(), Subject::user(id).cache_key());
        assert_eq!(Subject::user(id).cache_key(), Subject::user(id).cache_key());
    }
}
