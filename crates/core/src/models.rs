use crate::config::FolderConfig;
use crate::remap::{RemapRule, TimeLayout, TIME_GROUP};
use anyhow::{bail, Context};
use regex::Regex;
use std::path::PathBuf;
use std::time::SystemTime;

/// A watched folder with its patterns compiled. Built once from config and
/// never changed while its watcher runs.
#[derive(Debug, Clone)]
pub struct FolderTask {
    pub root: PathBuf,
    pub album_id: Option<String>,
    /// 0 walks the whole tree.
    pub max_depth: usize,
    pub file_patterns: Vec<Regex>,
    pub remap_rules: Vec<RemapRule>,
}

impl FolderTask {
    pub fn from_config(cfg: &FolderConfig) -> anyhow::Result<Self> {
        let cfg = cfg.revalidate();
        let root = PathBuf::from(cfg.path.unwrap_or_default());
        if root.as_os_str().is_empty() {
            bail!("folder entry has no path");
        }

        let file_patterns = cfg
            .file_patterns
            .unwrap_or_default()
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid file pattern {p:?}")))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut remap_rules = Vec::new();
        for rule in cfg.time_remappers.unwrap_or_default() {
            let pattern = Regex::new(&rule.pattern)
                .with_context(|| format!("invalid remap pattern {:?}", rule.pattern))?;
            if !pattern.capture_names().flatten().any(|n| n == TIME_GROUP) {
                bail!(
                    "remap pattern {:?} has no (?<{TIME_GROUP}>...) group",
                    rule.pattern
                );
            }
            let layout = TimeLayout::parse(&rule.layout)
                .with_context(|| format!("invalid remap layout {:?}", rule.layout))?;
            remap_rules.push(RemapRule { pattern, layout });
        }

        let album_id = cfg
            .album_id
            .filter(|a| !a.trim().is_empty());

        Ok(Self {
            root,
            album_id,
            max_depth: usize::try_from(cfg.max_depth.unwrap_or(0)).unwrap_or(0),
            file_patterns,
            remap_rules,
        })
    }

    /// True if any pattern matches anywhere in `name`.
    pub fn matches_file_name(&self, name: &str) -> bool {
        self.file_patterns.iter().any(|p| p.is_match(name))
    }
}

/// A settled file found by one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RemapRuleConfig;

    fn folder(patterns: &[&str]) -> FolderConfig {
        FolderConfig {
            path: Some("/pics".into()),
            file_patterns: Some(patterns.iter().map(|p| p.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn patterns_match_anywhere() {
        let task = FolderTask::from_config(&folder(&["VRChat"])).unwrap();
        assert!(task.matches_file_name("my_VRChat_shot.png"));
        assert!(!task.matches_file_name("screenshot.png"));
    }

    #[test]
    fn anchored_default_pattern_stays_anchored() {
        let task = FolderTask::from_config(&folder(&[])).unwrap();
        assert!(task.matches_file_name("VRChat_2023-05-01_12-30-00.000_1920x1080.png"));
        assert!(!task.matches_file_name("foo_VRChat_x.png"));
        assert!(!task.matches_file_name("VRChat_x.jpg"));
    }

    #[test]
    fn blank_album_is_none() {
        let mut cfg = folder(&["x"]);
        cfg.album_id = Some("   ".into());
        assert_eq!(FolderTask::from_config(&cfg).unwrap().album_id, None);
        cfg.album_id = Some("album-1".into());
        assert_eq!(
            FolderTask::from_config(&cfg).unwrap().album_id.as_deref(),
            Some("album-1")
        );
    }

    #[test]
    fn defaults_compile_vrchat_rules() {
        let task = FolderTask::from_config(&folder(&["x"])).unwrap();
        assert_eq!(task.remap_rules.len(), 2);
        assert_eq!(task.max_depth, 0);
    }

    #[test]
    fn bad_regex_fails_construction() {
        assert!(FolderTask::from_config(&folder(&["("])).is_err());
    }

    #[test]
    fn remap_rule_needs_time_group() {
        let mut cfg = folder(&["x"]);
        cfg.time_remappers = Some(vec![RemapRuleConfig {
            pattern: r"\d{4}".into(),
            layout: "yyyy".into(),
        }]);
        assert!(FolderTask::from_config(&cfg).is_err());
    }

    #[test]
    fn missing_path_fails_construction() {
        assert!(FolderTask::from_config(&FolderConfig::default()).is_err());
    }
}
