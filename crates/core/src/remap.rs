//! Rewrites file timestamps from a date embedded in the filename.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use filetime::FileTime;
use regex::Regex;
use std::path::Path;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{info, warn};

/// Name of the capture group carrying the timestamp token.
pub const TIME_GROUP: &str = "time";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("unsupported layout field {0:?}")]
    Unsupported(String),
    #[error("layout has no date fields")]
    Empty,
}

/// A date layout in `yyyy-MM-dd-HH-mm-ss-SSS` notation, compiled to a chrono
/// format string.
#[derive(Debug, Clone)]
pub struct TimeLayout {
    source: String,
    format: String,
    has_time: bool,
}

impl TimeLayout {
    pub fn parse(layout: &str) -> Result<Self, LayoutError> {
        let normalized = normalize_separators(layout);
        let mut format = String::new();
        let mut has_time = false;
        let mut has_fields = false;
        let chars: Vec<char> = normalized.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if !c.is_ascii_alphabetic() {
                if c == '%' {
                    format.push_str("%%");
                } else {
                    format.push(c);
                }
                i += 1;
                continue;
            }
            let run = chars[i..].iter().take_while(|&&x| x == c).count();
            let field: String = chars[i..i + run].iter().collect();
            let directive = match field.as_str() {
                "yyyy" => "%Y",
                "yy" => "%y",
                "MM" => "%m",
                "dd" => "%d",
                "HH" => "%H",
                "mm" => "%M",
                "ss" => "%S",
                "SSS" => "%3f",
                _ => return Err(LayoutError::Unsupported(field)),
            };
            has_time |= matches!(c, 'H' | 'm' | 's' | 'S');
            has_fields = true;
            format.push_str(directive);
            i += run;
        }
        if !has_fields {
            return Err(LayoutError::Empty);
        }
        Ok(Self {
            source: layout.to_string(),
            format,
            has_time,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Parses an already-normalized token. `None` when it does not fit.
    pub fn parse_token(&self, token: &str) -> Option<NaiveDateTime> {
        if self.has_time {
            NaiveDateTime::parse_from_str(token, &self.format).ok()
        } else {
            NaiveDate::parse_from_str(token, &self.format)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemapRule {
    pub pattern: Regex,
    pub layout: TimeLayout,
}

/// What a remap attempt did to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Remap {
    NoMatch,
    Unparsable { token: String },
    Applied(DateTime<Local>),
    WriteFailed(DateTime<Local>),
}

/// `.`, `_` and space all become `-`.
pub fn normalize_separators(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            '.' | '_' | ' ' => '-',
            c => c,
        })
        .collect()
}

/// First rule whose pattern matches `name` with a `time` capture, and the
/// normalized token it captured.
pub fn find_token<'r>(name: &str, rules: &'r [RemapRule]) -> Option<(&'r RemapRule, String)> {
    rules.iter().find_map(|rule| {
        let caps = rule.pattern.captures(name)?;
        let token = caps.name(TIME_GROUP)?;
        Some((rule, normalize_separators(token.as_str())))
    })
}

/// Resolves the embedded timestamp of `name` in local time.
pub fn resolve(name: &str, rules: &[RemapRule]) -> Result<Option<DateTime<Local>>, String> {
    let Some((rule, token)) = find_token(name, rules) else {
        return Ok(None);
    };
    rule.layout
        .parse_token(&token)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(Some)
        .ok_or(token)
}

/// Sets the access and modification times of `path` from its filename. Never
/// fails: a token that does not parse or a failed write leaves the file as is.
pub fn remap_timestamps(path: &Path, rules: &[RemapRule]) -> Remap {
    let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) else {
        return Remap::NoMatch;
    };
    let when = match resolve(&name, rules) {
        Ok(Some(when)) => when,
        Ok(None) => return Remap::NoMatch,
        Err(token) => {
            warn!(file = %name, token = %token, "failed to parse embedded timestamp");
            return Remap::Unparsable { token };
        }
    };

    let stamp = FileTime::from_system_time(SystemTime::from(when));
    match filetime::set_file_times(path, stamp, stamp) {
        Ok(()) => {
            info!(file = %name, to = %when.to_rfc3339(), "remapped timestamps");
            Remap::Applied(when)
        }
        Err(e) => {
            warn!(file = %name, error = %e, "failed to set file times");
            Remap::WriteFailed(when)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::fs;

    fn vrchat_rules() -> Vec<RemapRule> {
        crate::config::vrchat_remappers()
            .iter()
            .map(|r| RemapRule {
                pattern: Regex::new(&r.pattern).unwrap(),
                layout: TimeLayout::parse(&r.layout).unwrap(),
            })
            .collect()
    }

    #[test]
    fn layout_translates_to_chrono() {
        let layout = TimeLayout::parse("yyyy-MM-dd-HH-mm-ss-SSS").unwrap();
        assert_eq!(layout.format, "%Y-%m-%d-%H-%M-%S-%3f");
        assert!(layout.has_time);

        let dotted = TimeLayout::parse("yyyy.MM.dd").unwrap();
        assert_eq!(dotted.format, "%Y-%m-%d");
        assert!(!dotted.has_time);
    }

    #[test]
    fn layout_rejects_unknown_fields() {
        assert_eq!(
            TimeLayout::parse("yyyy-MMM-dd").unwrap_err(),
            LayoutError::Unsupported("MMM".into())
        );
        assert_eq!(TimeLayout::parse("--").unwrap_err(), LayoutError::Empty);
    }

    #[test]
    fn vrchat_name_with_millis_resolves() {
        let when = resolve("VRChat_2023-05-01_12-30-00.000_1920x1080.png", &vrchat_rules())
            .unwrap()
            .unwrap();
        let expected = Local
            .from_local_datetime(
                &NaiveDate::from_ymd_opt(2023, 5, 1)
                    .unwrap()
                    .and_hms_milli_opt(12, 30, 0, 0)
                    .unwrap(),
            )
            .earliest()
            .unwrap();
        assert_eq!(when, expected);
    }

    #[test]
    fn second_rule_covers_names_without_millis() {
        let when = resolve("VRChat_2022-01-31_23-59-58_1920x1080.png", &vrchat_rules())
            .unwrap()
            .unwrap();
        assert_eq!((when.hour(), when.minute(), when.second()), (23, 59, 58));
    }

    #[test]
    fn unparsable_token_is_reported_not_raised() {
        let err = resolve("VRChat_9999-99-99_99-99-99.999_1920x1080.png", &vrchat_rules())
            .unwrap_err();
        assert_eq!(err, "9999-99-99-99-99-99-999");
    }

    #[test]
    fn rule_without_time_group_is_skipped() {
        let rules = vec![
            RemapRule {
                pattern: Regex::new(r"VRChat").unwrap(),
                layout: TimeLayout::parse("yyyy").unwrap(),
            },
            RemapRule {
                pattern: Regex::new(r"(?<time>\d{4})").unwrap(),
                layout: TimeLayout::parse("yyyy").unwrap(),
            },
        ];
        let (rule, token) = find_token("VRChat_2020", &rules).unwrap();
        assert_eq!(token, "2020");
        assert_eq!(rule.pattern.as_str(), r"(?<time>\d{4})");
    }

    #[test]
    fn remap_sets_file_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VRChat_2023-05-01_12-30-00.000_1920x1080.png");
        fs::write(&path, b"png").unwrap();

        let result = remap_timestamps(&path, &vrchat_rules());
        let Remap::Applied(when) = result else {
            panic!("expected remap, got {result:?}");
        };
        let modified = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(DateTime::<Local>::from(modified), when);
    }

    #[test]
    fn bad_token_leaves_times_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("VRChat_9999-99-99_99-99-99.999_1920x1080.png");
        fs::write(&path, b"png").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();

        let result = remap_timestamps(&path, &vrchat_rules());
        assert!(matches!(result, Remap::Unparsable { .. }));
        assert_eq!(fs::metadata(&path).unwrap().modified().unwrap(), before);
    }

    #[test]
    fn no_rule_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("holiday.png");
        fs::write(&path, b"png").unwrap();
        assert_eq!(remap_timestamps(&path, &vrchat_rules()), Remap::NoMatch);
    }
}
