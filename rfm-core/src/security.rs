// SPDX-License-Identifier: AGPL-3.0-or-later
//! Security policy
//!
//! Checks run in a fixed order and stop at the first denial:
//! read-only flag (writes only), system permission, authorization hook,
//! then extension and path restrictions.

use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::config::{ListPolicy, RestrictionRules, SecurityConfig};
use crate::error::{RfmError, RfmResult};
use crate::operations::Access;
use crate::{Item, VirtualPath};

/// Authorization callback supplied by the hosting application
pub trait AuthorizationHook: Send + Sync {
    fn is_allowed(&self, absolute_path: &str, access: Access) -> bool;
}

impl<F> AuthorizationHook for F
where
    F: Fn(&str, Access) -> bool + Send + Sync,
{
    fn is_allowed(&self, absolute_path: &str, access: Access) -> bool {
        self(absolute_path, access)
    }
}

struct ExtensionRules {
    policy: ListPolicy,
    ignore_case: bool,
    extensions: Vec<String>,
}

impl ExtensionRules {
    fn from_config(rules: &RestrictionRules) -> Self {
        let extensions = rules
            .restrictions
            .iter()
            .map(|ext| {
                let ext = ext.trim_start_matches('.');
                if rules.ignore_case { ext.to_lowercase() } else { ext.to_string() }
            })
            .collect();
        Self {
            policy: rules.policy,
            ignore_case: rules.ignore_case,
            extensions,
        }
    }

    fn allows(&self, extension: &str) -> bool {
        let listed = if self.ignore_case {
            let extension = extension.to_lowercase();
            self.extensions.iter().any(|e| *e == extension)
        } else {
            self.extensions.iter().any(|e| e == extension)
        };
        match self.policy {
            ListPolicy::AllowList => listed,
            ListPolicy::DisallowList => !listed,
        }
    }
}

struct PathRules {
    policy: ListPolicy,
    options: MatchOptions,
    patterns: Vec<Pattern>,
}

impl PathRules {
    fn from_config(rules: &RestrictionRules) -> RfmResult<Self> {
        let patterns = rules
            .restrictions
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| RfmError::Config(format!("invalid pattern {:?}: {}", p, e)))
            })
            .collect::<RfmResult<Vec<_>>>()?;
        Ok(Self {
            policy: rules.policy,
            options: MatchOptions {
                case_sensitive: !rules.ignore_case,
                require_literal_separator: false,
                require_literal_leading_dot: false,
            },
            patterns,
        })
    }

    fn allows(&self, relative: &str) -> bool {
        let listed = self
            .patterns
            .iter()
            .any(|p| p.matches_with(relative, self.options));
        match self.policy {
            ListPolicy::AllowList => listed,
            ListPolicy::DisallowList => !listed,
        }
    }
}

/// Immutable, process-wide security policy
pub struct SecurityPolicy {
    read_only: bool,
    extensions: ExtensionRules,
    paths: PathRules,
    /// Internal areas that are always hidden (e.g. the thumbnail root)
    hidden: Vec<VirtualPath>,
    hook: Option<Arc<dyn AuthorizationHook>>,
    summary: PolicySummary,
}

impl fmt::Debug for SecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityPolicy")
            .field("read_only", &self.read_only)
            .field("hidden", &self.hidden)
            .field("hook", &self.hook.is_some())
            .finish()
    }
}

impl SecurityPolicy {
    pub fn from_config(config: &SecurityConfig) -> RfmResult<Self> {
        Ok(Self {
            read_only: config.read_only,
            extensions: ExtensionRules::from_config(&config.extensions),
            paths: PathRules::from_config(&config.patterns)?,
            hidden: Vec::new(),
            hook: None,
            summary: PolicySummary {
                read_only: config.read_only,
                extensions: ExtensionSummary {
                    policy: config.extensions.policy,
                    ignore_case: config.extensions.ignore_case,
                    restrictions: config.extensions.restrictions.clone(),
                },
            },
        })
    }

    pub fn with_hook(mut self, hook: Arc<dyn AuthorizationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Forbid a folder and everything below it, whatever the configured patterns say.
    pub fn with_hidden(mut self, folder: VirtualPath) -> Self {
        self.hidden.push(folder);
        self
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    pub fn summary(&self) -> &PolicySummary {
        &self.summary
    }

    pub fn check_read(&self, item: &Item) -> RfmResult<()> {
        self.check_system(item, Access::Read)?;
        self.check_hook(item, Access::Read)
    }

    pub fn check_write(&self, item: &Item) -> RfmResult<()> {
        if self.read_only {
            return Err(RfmError::ReadOnly { path: item.relative_path() });
        }
        self.check_system(item, Access::Write)?;
        self.check_hook(item, Access::Write)
    }

    pub fn check_restrictions(&self, item: &Item) -> RfmResult<()> {
        if item.is_file() && !self.extensions.allows(item.extension()) {
            return Err(RfmError::ForbiddenExtension { path: item.relative_path() });
        }
        if self.hidden.iter().any(|h| item.path.starts_with(h)) {
            return Err(RfmError::ForbiddenPath { path: item.relative_path() });
        }
        if !self.paths.allows(&item.relative_path()) {
            return Err(RfmError::ForbiddenPath { path: item.relative_path() });
        }
        Ok(())
    }

    /// Permission check followed by the restriction check.
    pub fn authorize(&self, item: &Item, access: Access) -> RfmResult<()> {
        match access {
            Access::Read => self.check_read(item)?,
            Access::Write => self.check_write(item)?,
        }
        self.check_restrictions(item)
    }

    pub fn is_unrestricted(&self, item: &Item) -> bool {
        self.check_restrictions(item).is_ok()
    }

    pub fn is_readable(&self, item: &Item) -> bool {
        self.check_read(item).is_ok()
    }

    pub fn is_writable(&self, item: &Item) -> bool {
        self.check_write(item).is_ok()
    }

    fn check_system(&self, item: &Item, access: Access) -> RfmResult<()> {
        // Unknown access (missing items, stores that cannot tell) is left to the backend.
        let Some(system) = item.metadata.access else {
            return Ok(());
        };
        let granted = match access {
            Access::Read => system.read,
            Access::Write => system.write,
        };
        if granted {
            Ok(())
        } else {
            Err(RfmError::PermissionDenied { path: item.relative_path() })
        }
    }

    fn check_hook(&self, item: &Item, access: Access) -> RfmResult<()> {
        match &self.hook {
            Some(hook) if !hook.is_allowed(&item.absolute_path, access) => {
                Err(RfmError::NotAuthorized { path: item.relative_path() })
            }
            _ => Ok(()),
        }
    }
}

/// Sanitize a client-supplied file or folder name.
///
/// Path components are dropped, surrounding dots and control characters
/// trimmed, blanks and quotes replaced by `_`, and `_` runs collapsed.
pub fn normalize_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let trimmed = base.trim_matches(|c: char| c == '.' || c.is_control() || c.is_whitespace());

    let mut out = String::with_capacity(trimmed.len());
    for c in trimmed.chars() {
        let c = match c {
            c if c.is_whitespace() => '_',
            '"' | '\'' | '`' => '_',
            c if c.is_control() => continue,
            c => c,
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Policy facts exposed to the client by `initiate`
#[derive(Debug, Clone, Serialize)]
pub struct PolicySummary {
    pub read_only: bool,
    pub extensions: ExtensionSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExtensionSummary {
    pub policy: ListPolicy,
    pub ignore_case: bool,
    pub restrictions: Vec<String>,
}
