//! Point-in-time versioning configuration.

use serde::{Deserialize, Serialize};

/// Tuning knobs for the folder commit log and its checkpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitConfig {
    /// A folder checkpoint is written once more than this many commits
    /// have accumulated since the previous one.
    #[serde(default = "default_checkpoint_window")]
    pub checkpoint_window: i64,
    /// A tree checkpoint is written once more than this many environment
    /// commits have accumulated since the previous one.
    #[serde(default = "default_tree_checkpoint_window")]
    pub tree_checkpoint_window: i64,
    /// Recursion bound for folder recreation and nested delete commits.
    #[serde(default = "default_max_folder_depth")]
    pub max_folder_depth: usize,
    /// Rows per batched insert of checkpoint or commit-change rows.
    #[serde(default = "default_batch_size")]
    pub checkpoint_batch_size: usize,
}

impl PitConfig {
    /// Configuration with explicit windows and default bounds.
    pub fn with_windows(checkpoint_window: i64, tree_checkpoint_window: i64) -> Self {
        Self {
            checkpoint_window,
            tree_checkpoint_window,
            ..Self::default()
        }
    }
}

impl Default for PitConfig {
    fn default() -> Self {
        Self {
            checkpoint_window: default_checkpoint_window(),
            tree_checkpoint_window: default_tree_checkpoint_window(),
            max_folder_depth: default_max_folder_depth(),
            checkpoint_batch_size: default_batch_size(),
        }
    }
}

fn default_checkpoint_window() -> i64 {
    100
}

fn default_tree_checkpoint_window() -> i64 {
    30
}

fn default_max_folder_depth() -> usize {
    20
}

fn default_batch_size() -> usize {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_table() {
        let config: PitConfig = serde_json::from_str("{}").expect("deserialize");
        assert_eq!(config.checkpoint_window, 100);
        assert_eq!(config.tree_checkpoint_window, 30);
        assert_eq!(config.max_folder_depth, 20);
        assert_eq!(config.checkpoint_batch_size, 500);
    }

    #[test]
    fn test_with_windows_keeps_bounds() {
        let config = PitConfig::with_windows(5, 10);
        assert_eq!(config.checkpoint_window, 5);
        assert_eq!(config.tree_checkpoint_window, 10);
        assert_eq!(config.max_folder_depth, 20);
    }
}
