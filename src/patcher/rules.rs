//! The ordered edits applied to a task definition.

use std::fmt;

use super::document::TaskDocument;
use crate::config::PatchConfig;

/// One edit to a task document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatchRule {
    /// Rewrite the text of the first `tag` element.
    SetTag { tag: String, value: String },
    /// Replace every occurrence of `needle` until none remain.
    Substitute { needle: String, replacement: String },
    /// Clear and remove the first `tag` element, then any empty leftovers.
    RemoveTag { tag: String },
}

impl PatchRule {
    pub fn set(tag: &str, value: &str) -> Self {
        PatchRule::SetTag {
            tag: tag.into(),
            value: value.into(),
        }
    }

    pub fn substitute(needle: &str, replacement: &str) -> Self {
        PatchRule::Substitute {
            needle: needle.into(),
            replacement: replacement.into(),
        }
    }

    pub fn remove(tag: &str) -> Self {
        PatchRule::RemoveTag { tag: tag.into() }
    }

    /// Applies the rule. A rule that finds nothing to edit is skipped.
    pub fn apply(&self, doc: &mut TaskDocument) -> RuleOutcome {
        match self {
            PatchRule::SetTag { tag, value } => {
                if doc.tag_value(tag).is_none() {
                    RuleOutcome::Skipped
                } else {
                    doc.set_tag(tag, value);
                    RuleOutcome::Applied
                }
            }
            PatchRule::Substitute {
                needle,
                replacement,
            } => match doc.substitute(needle, replacement) {
                Ok(0) => RuleOutcome::Skipped,
                Ok(_) => RuleOutcome::Applied,
                Err(e) => RuleOutcome::Rejected(e.to_string()),
            },
            PatchRule::RemoveTag { tag } => {
                let first = doc.remove_element(tag);
                let leftovers = doc.remove_empty_elements(tag);
                if first || leftovers > 0 {
                    RuleOutcome::Applied
                } else {
                    RuleOutcome::Skipped
                }
            }
        }
    }
}

impl fmt::Display for PatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchRule::SetTag { tag, value } => write!(f, "set <{tag}> to {value:?}"),
            PatchRule::Substitute {
                needle,
                replacement,
            } => write!(f, "replace {needle:?} with {replacement:?}"),
            PatchRule::RemoveTag { tag } => write!(f, "remove <{tag}>"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleOutcome {
    Applied,
    /// Tag or pattern not present; document unchanged.
    Skipped,
    /// The rule itself is unsafe to run; document unchanged.
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Settings that `schtasks /create` has no switch for.
const EXTENDED_SETTINGS: &[(&str, &str)] = &[
    ("ExecutionTimeLimit", "PT0S"),
    ("StartWhenAvailable", "false"),
    ("RunOnlyIfNetworkAvailable", "false"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchPlan {
    rules: Vec<PatchRule>,
}

impl PatchPlan {
    pub fn new(rules: Vec<PatchRule>) -> Self {
        Self { rules }
    }

    /// The edits for a task created by `schtasks /create /sc onlogon`.
    ///
    /// The task must run as the local Users group rather than the installing
    /// user (SYSTEM cannot open GUI programs), so `UserId` becomes `GroupId`
    /// and `LogonType`, which only applies to a user principal, goes away.
    pub fn for_logon_task(config: &PatchConfig, users_group: &str) -> Self {
        let mut rules = vec![
            PatchRule::set("Author", &config.author),
            PatchRule::substitute("UserId", "GroupId"),
            PatchRule::set("GroupId", users_group),
            PatchRule::remove("LogonType"),
            PatchRule::set("RunLevel", &config.run_level),
            PatchRule::set("MultipleInstancesPolicy", &config.multiple_instances_policy),
            PatchRule::set("DisallowStartIfOnBatteries", "false"),
            PatchRule::set("StopIfGoingOnBatteries", "false"),
            PatchRule::set("StopOnIdleEnd", "false"),
        ];
        if config.extended_settings {
            rules.extend(EXTENDED_SETTINGS.iter().map(|(tag, value)| PatchRule::set(tag, value)));
        }
        rules.extend(
            config
                .extra_tags
                .iter()
                .map(|(tag, value)| PatchRule::set(tag, value)),
        );
        Self { rules }
    }

    pub fn rules(&self) -> &[PatchRule] {
        &self.rules
    }

    /// Runs every rule in order and reports what each one did.
    pub fn apply(&self, doc: &mut TaskDocument) -> Vec<(PatchRule, RuleOutcome)> {
        self.rules
            .iter()
            .map(|rule| {
                let outcome = rule.apply(doc);
                match &outcome {
                    RuleOutcome::Applied => log::debug!("patcher: {rule}"),
                    RuleOutcome::Skipped => log::debug!("patcher: {rule}: nothing to edit"),
                    RuleOutcome::Rejected(reason) => log::warn!("patcher: {rule}: {reason}"),
                }
                (rule.clone(), outcome)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
