use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Pipeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub name: String,
    pub ref_name: String,
    pub user_id: Option<Uuid>,
}

impl Build {
    /// A build job inside `pipeline`, running on the pipeline's ref.
    pub fn new(pipeline: &Pipeline, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id: pipeline.id,
            name: name.into(),
            ref_name: pipeline.ref_name.clone(),
            user_id: pipeline.user_id,
        }
    }
}
