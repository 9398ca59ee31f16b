//! Typed job payload definitions.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Typed payloads for known job types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "job_type")]
pub enum JobPayload {
    /// Evaluate and possibly create an environment's tree checkpoint.
    #[serde(rename = "folder_tree_checkpoint")]
    CreateFolderTreeCheckpoint {
        /// Environment whose folder tree is snapshotted.
        env_id: Uuid,
    },
}

impl JobPayload {
    /// The job type string stored on the job row.
    pub fn job_type(&self) -> &'static str {
        match self {
            Self::CreateFolderTreeCheckpoint { .. } => "folder_tree_checkpoint",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_tagged_by_job_type() {
        let env_id = Uuid::new_v4();
        let payload = JobPayload::CreateFolderTreeCheckpoint { env_id };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["job_type"], payload.job_type());
        assert_eq!(value["env_id"], env_id.to_string());

        let back: JobPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
    }
}
