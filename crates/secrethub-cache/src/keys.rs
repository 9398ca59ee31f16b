//! Cache key builders for SecretHub cache entries.

use uuid::Uuid;

/// Prefix applied to all SecretHub cache keys.
const PREFIX: &str = "secrethub";

/// Cache key for the decrypted secret listing of one folder path.
pub fn project_secrets(project_id: Uuid, env_slug: &str, path: &str) -> String {
    format!("{PREFIX}:secrets:{project_id}:{env_slug}:{path}")
}

/// Pattern matching every secret cache entry of a project.
pub fn project_secrets_pattern(project_id: Uuid) -> String {
    format!("{PREFIX}:secrets:{project_id}:*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_pattern_covers_entries() {
        let project_id = Uuid::new_v4();
        let key = project_secrets(project_id, "prod", "/api");
        let pattern = project_secrets_pattern(project_id);
        assert!(key.starts_with(pattern.trim_end_matches('*')));

        let other = project_secrets(Uuid::new_v4(), "prod", "/api");
        assert!(!other.starts_with(pattern.trim_end_matches('*')));
    }
}
