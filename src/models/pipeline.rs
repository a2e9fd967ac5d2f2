use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub project_id: Uuid,
    pub ref_name: String,
    /// User who triggered the pipeline, if any.
    pub user_id: Option<Uuid>,
}

impl Pipeline {
    pub fn new(project_id: Uuid, ref_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            ref_name: ref_name.into(),
            user_id: None,
        }
    }

    pub fn triggered_by(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}
