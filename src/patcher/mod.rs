//! Scheduled-task file patcher.
//!
//! `schtasks.exe /create` cannot express every setting the logon task
//! needs, so the setup program creates the task, lets this module rewrite
//! the generated XML in place, and then reloads it. `Patcher::patch()` reads
//! the file, applies a `PatchPlan` and writes it back in its original
//! encoding.
//!
//! The file lives under `%windir%\System32\Tasks`; a 32-bit host would be
//! redirected to `SysWOW64`, so redirection is disabled for the duration of
//! the call and restored on every exit path by `RedirectionGuard`.

mod document;
mod encoding;
mod rules;

pub use document::{Element, SubstitutionError, TaskDocument, MAX_SUBSTITUTION_PASSES};
pub use encoding::{decode, encode, DecodeError, DecodedText, TextEncoding};
pub use rules::{PatchPlan, PatchRule, RuleOutcome};

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::PatchConfig;
use crate::platform::{self, AccountLookup, FsRedirection};

// ---------------------------------------------------------------------------
// Errors and report
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is {size} bytes, limit is {limit}")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    /// The document had already been edited in memory; the file on disk may
    /// be truncated or untouched.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PatchError {
    /// True when the target file does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PatchError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// What a successful `patch()` did.
#[derive(Debug)]
pub struct PatchReport {
    pub outcomes: Vec<(PatchRule, RuleOutcome)>,
    /// False when every rule was skipped and the bytes written are identical.
    pub changed: bool,
    pub encoding: TextEncoding,
}

impl PatchReport {
    pub fn applied(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| *o == RuleOutcome::Applied)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Redirection guard
// ---------------------------------------------------------------------------

/// Keeps file-system redirection disabled while alive.
struct RedirectionGuard<'a> {
    redirection: &'a dyn FsRedirection,
    previous: Option<usize>,
}

impl<'a> RedirectionGuard<'a> {
    fn engage(redirection: &'a dyn FsRedirection) -> Self {
        let previous = redirection.disable();
        if previous.is_some() {
            log::debug!("patcher: file-system redirection disabled");
        }
        Self {
            redirection,
            previous,
        }
    }
}

impl Drop for RedirectionGuard<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            self.redirection.revert(previous);
            log::debug!("patcher: file-system redirection restored");
        }
    }
}

// ---------------------------------------------------------------------------
// Patcher
// ---------------------------------------------------------------------------

pub struct Patcher {
    config: PatchConfig,
    redirection: Box<dyn FsRedirection>,
    accounts: Box<dyn AccountLookup>,
}

impl Patcher {
    /// Creates a patcher backed by the current OS.
    pub fn new(config: PatchConfig) -> Self {
        Self::with_platform(config, platform::fs_redirection(), platform::account_lookup())
    }

    pub fn with_platform(
        config: PatchConfig,
        redirection: Box<dyn FsRedirection>,
        accounts: Box<dyn AccountLookup>,
    ) -> Self {
        Self {
            config,
            redirection,
            accounts,
        }
    }

    /// Display name of the local Users group, or the configured fallback.
    pub fn users_group(&self) -> String {
        self.accounts.users_group().unwrap_or_else(|| {
            log::debug!(
                "patcher: Users group lookup unavailable, using {}",
                self.config.fallback_group
            );
            self.config.fallback_group.clone()
        })
    }

    pub fn plan(&self) -> PatchPlan {
        PatchPlan::for_logon_task(&self.config, &self.users_group())
    }

    /// Rewrites the task file at `path` in place.
    pub fn patch(&self, path: &Path) -> Result<PatchReport, PatchError> {
        let _guard = RedirectionGuard::engage(self.redirection.as_ref());

        let bytes = self.read(path)?;
        let decoded = encoding::decode(&bytes).map_err(|source| PatchError::Decode {
            path: path.to_path_buf(),
            source,
        })?;

        let mut doc = TaskDocument::new(decoded.text);
        let outcomes = self.plan().apply(&mut doc);

        let out = encoding::encode(doc.as_str(), decoded.encoding, decoded.bom);
        let changed = out != bytes;
        std::fs::write(path, &out).map_err(|source| PatchError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        let report = PatchReport {
            outcomes,
            changed,
            encoding: decoded.encoding,
        };
        log::info!(
            "patcher: {} ({} of {} edits applied)",
            path.display(),
            report.applied(),
            report.outcomes.len()
        );
        Ok(report)
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>, PatchError> {
        let read_err = |source| PatchError::Read {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(read_err)?;
        let size = file.metadata().map_err(read_err)?.len();
        let limit = self.config.max_file_bytes;
        if size > limit {
            return Err(PatchError::TooLarge {
                path: path.to_path_buf(),
                size,
                limit,
            });
        }

        let mut bytes = Vec::with_capacity(size as usize);
        file.read_to_end(&mut bytes).map_err(read_err)?;
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{NoRedirection, StaticAccountLookup};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Abbreviated output of `schtasks /create /sc onlogon`.
    fn schtasks_xml() -> String {
        [
            r#"<?xml version="1.0" encoding="UTF-16"?>"#,
            r#"<Task version="1.2" xmlns="http://schemas.microsoft.com/windows/2004/02/mit/task">"#,
            "  <RegistrationInfo>",
            "    <Date>2021-03-01T12:00:00</Date>",
            r"    <Author>PC\someone</Author>",
            "  </RegistrationInfo>",
            "  <Principals>",
            r#"    <Principal id="Author">"#,
            r"      <UserId>PC\someone</UserId>",
            "      <LogonType>InteractiveToken</LogonType>",
            "      <RunLevel>LeastPrivilege</RunLevel>",
            "    </Principal>",
            "  </Principals>",
            "  <Settings>",
            "    <MultipleInstancesPolicy>IgnoreNew</MultipleInstancesPolicy>",
            "    <DisallowStartIfOnBatteries>true</DisallowStartIfOnBatteries>",
            "    <StopIfGoingOnBatteries>true</StopIfGoingOnBatteries>",
            "    <ExecutionTimeLimit>PT72H</ExecutionTimeLimit>",
            "    <IdleSettings>",
            "      <StopOnIdleEnd>true</StopOnIdleEnd>",
            "    </IdleSettings>",
            "  </Settings>",
            "</Task>",
            "",
        ]
        .join("\r\n")
    }

    #[derive(Default)]
    struct Calls {
        disabled: usize,
        reverted: Vec<usize>,
    }

    struct RecordingRedirection(Rc<RefCell<Calls>>);

    impl FsRedirection for RecordingRedirection {
        fn disable(&self) -> Option<usize> {
            self.0.borrow_mut().disabled += 1;
            Some(0xC0FFEE)
        }

        fn revert(&self, previous: usize) {
            self.0.borrow_mut().reverted.push(previous);
        }
    }

    fn patcher(config: PatchConfig, group: Option<&str>) -> Patcher {
        Patcher::with_platform(
            config,
            Box::new(NoRedirection),
            Box::new(StaticAccountLookup(group.map(String::from))),
        )
    }

    fn write_utf16(path: &Path, text: &str) {
        std::fs::write(path, encoding::encode(text, TextEncoding::Utf16Le, true)).unwrap();
    }

    fn read_utf16(path: &Path) -> String {
        let bytes = std::fs::read(path).unwrap();
        let decoded = encoding::decode(&bytes).unwrap();
        assert_eq!(decoded.encoding, TextEncoding::Utf16Le);
        assert!(decoded.bom);
        decoded.text
    }

    #[test]
    fn patches_minimal_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        write_utf16(
            &path,
            "<Author></Author>\n<UserId>X</UserId>\n<LogonType>Y</LogonType>\n",
        );

        let report = patcher(PatchConfig::default(), None).patch(&path).unwrap();
        assert!(report.changed);

        let text = read_utf16(&path);
        assert_eq!(
            text,
            "<Author>Sam Hocevar</Author>\n<GroupId>BUILTIN\\Users</GroupId>\n"
        );
    }

    #[test]
    fn patches_schtasks_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("WinCompose");
        write_utf16(&path, &schtasks_xml());

        patcher(PatchConfig::default(), Some(r"VORDEFINIERT\Benutzer"))
            .patch(&path)
            .unwrap();

        let doc = TaskDocument::new(read_utf16(&path));
        assert_eq!(doc.tag_value("Author"), Some("Sam Hocevar"));
        assert_eq!(doc.tag_value("GroupId"), Some(r"VORDEFINIERT\Benutzer"));
        assert_eq!(doc.tag_value("RunLevel"), Some("HighestAvailable"));
        assert_eq!(doc.tag_value("MultipleInstancesPolicy"), Some("Parallel"));
        assert_eq!(doc.tag_value("DisallowStartIfOnBatteries"), Some("false"));
        assert_eq!(doc.tag_value("StopIfGoingOnBatteries"), Some("false"));
        assert_eq!(doc.tag_value("StopOnIdleEnd"), Some("false"));
        // Left alone unless extended settings are enabled.
        assert_eq!(doc.tag_value("ExecutionTimeLimit"), Some("PT72H"));
        assert!(!doc.as_str().contains("UserId"));
        assert!(!doc.as_str().contains("LogonType"));
        assert!(doc.as_str().contains(
            "      <GroupId>VORDEFINIERT\\Benutzer</GroupId>\r\n      <RunLevel>"
        ));
    }

    #[test]
    fn extended_settings_lift_time_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        write_utf16(&path, &schtasks_xml());

        let config = PatchConfig {
            extended_settings: true,
            ..PatchConfig::default()
        };
        patcher(config, None).patch(&path).unwrap();

        let doc = TaskDocument::new(read_utf16(&path));
        assert_eq!(doc.tag_value("ExecutionTimeLimit"), Some("PT0S"));
    }

    #[test]
    fn second_run_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        write_utf16(&path, &schtasks_xml());

        let patcher = patcher(PatchConfig::default(), None);
        patcher.patch(&path).unwrap();
        let once = std::fs::read(&path).unwrap();

        let report = patcher.patch(&path).unwrap();
        assert!(!report.changed);
        assert_eq!(std::fs::read(&path).unwrap(), once);

        // The rename and the tag removal have nothing left to act on.
        let skipped: Vec<String> = report
            .outcomes
            .iter()
            .filter(|(_, o)| *o == RuleOutcome::Skipped)
            .map(|(r, _)| r.to_string())
            .collect();
        assert_eq!(
            skipped,
            [r#"replace "UserId" with "GroupId""#, "remove <LogonType>"]
        );
    }

    #[test]
    fn missing_file_is_reported_and_nothing_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.xml");

        let err = patcher(PatchConfig::default(), None)
            .patch(&path)
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(!path.exists());
    }

    #[test]
    fn redirection_is_restored_on_success() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        write_utf16(&path, &schtasks_xml());

        let calls = Rc::new(RefCell::new(Calls::default()));
        let patcher = Patcher::with_platform(
            PatchConfig::default(),
            Box::new(RecordingRedirection(calls.clone())),
            Box::new(StaticAccountLookup(None)),
        );
        patcher.patch(&path).unwrap();

        assert_eq!(calls.borrow().disabled, 1);
        assert_eq!(calls.borrow().reverted, [0xC0FFEE]);
    }

    #[test]
    fn redirection_is_restored_on_early_return() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Rc::new(RefCell::new(Calls::default()));
        let patcher = Patcher::with_platform(
            PatchConfig::default(),
            Box::new(RecordingRedirection(calls.clone())),
            Box::new(StaticAccountLookup(None)),
        );

        assert!(patcher.patch(&dir.path().join("absent.xml")).is_err());
        assert_eq!(calls.borrow().reverted, [0xC0FFEE]);
    }

    #[test]
    fn oversized_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        write_utf16(&path, &schtasks_xml());
        let before = std::fs::read(&path).unwrap();

        let config = PatchConfig {
            max_file_bytes: 64,
            ..PatchConfig::default()
        };
        let err = patcher(config, None).patch(&path).unwrap_err();

        assert!(matches!(err, PatchError::TooLarge { limit: 64, .. }));
        assert_eq!(std::fs::read(&path).unwrap(), before);
    }

    #[test]
    fn undecodable_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        std::fs::write(&path, [0xFF, 0xFE, b'<']).unwrap();

        let err = patcher(PatchConfig::default(), None)
            .patch(&path)
            .unwrap_err();
        assert!(matches!(err, PatchError::Decode { .. }));
        assert_eq!(std::fs::read(&path).unwrap(), [0xFF, 0xFE, b'<']);
    }

    #[test]
    fn utf8_file_stays_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("task.xml");
        std::fs::write(&path, "<RunLevel>LeastPrivilege</RunLevel>").unwrap();

        let report = patcher(PatchConfig::default(), None).patch(&path).unwrap();
        assert_eq!(report.encoding, TextEncoding::Utf8);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "<RunLevel>HighestAvailable</RunLevel>"
        );
    }

    #[test]
    fn users_group_falls_back_to_config() {
        let config = PatchConfig {
            fallback_group: r"BUILTIN\Utilisateurs".into(),
            ..PatchConfig::default()
        };
        assert_eq!(patcher(config, None).users_group(), r"BUILTIN\Utilisateurs");
        assert_eq!(
            patcher(PatchConfig::default(), Some(r"PC\Users")).users_group(),
            r"PC\Users"
        );
    }
}
