// src/core/navigator.rs

//! # Navigator
//!
//! Walks the operator from an account down to one instance and starts the
//! session. The walk is a small state machine:
//!
//! ```text
//! ACCOUNT -> ROLE -> REGION -> INSTANCE -> DONE
//!    ^        |  ^     |  ^       |
//!    +--back--+  +back-+  +-back--+ (or no instances)
//! ```
//!
//! Any cancellation goes to CANCELLED. [`transition`] is the whole table; the
//! driver in [`Navigator::run`] only produces events and applies it.
//!
//! Two fast paths sit in front of the walk: `--last` reconnects to the
//! remembered instance when it still exists, and `--resume` narrows the walk
//! to the remembered scope.

use crate::constants::{ALL_ACCOUNTS_OPTION, ALL_REGIONS_OPTION, ALL_ROLES_OPTION};
use crate::core::discovery::{DiscoveryPipeline, RoleFilter};
use crate::core::interfaces::{Choice, Chooser, ChooserError, SessionLauncher};
use crate::core::recent::RecentTargetStore;
use crate::core::settings::EffectiveConfig;
use crate::errors::{SwampError, SwampResult};
use crate::models::{
    Account, InstanceCandidate, LaunchTarget, Region, RecentInstance, RoleBinding, Scope,
    region_display_line,
};
use colored::*;
use log::{debug, warn};
use std::collections::HashSet;

// --- State Machine ---

/// A state of the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Account,
    Role,
    Region,
    Instance,
    Done,
    Cancelled,
}

/// What happened while a stage was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A candidate was chosen (by the operator or automatically).
    Selected,
    Back,
    Cancel,
    /// The stage had nothing to choose from.
    Empty,
}

/// The transition table.
///
/// `Back` at the root and every event at a terminal stage leave the stage
/// unchanged. An empty instance stage returns to the region stage.
pub fn transition(stage: Stage, event: Event) -> Stage {
    use Event::*;
    use Stage::*;
    match (stage, event) {
        (Done | Cancelled, _) => stage,
        (_, Cancel) => Cancelled,
        (Account, Selected) => Role,
        (Role, Selected) => Region,
        (Region, Selected) => Instance,
        (Instance, Selected) => Done,
        (Account, Back | Empty) => Account,
        (Role, Back | Empty) => Account,
        (Region, Back | Empty) => Role,
        (Instance, Back | Empty) => Region,
    }
}

// --- Options ---

/// How a navigation run is narrowed and which shortcuts it may take.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigatorOptions {
    /// The SSO profile; keys the recent targets.
    pub profile: String,
    pub account_filter: Option<String>,
    pub role_filter: RoleFilter,
    /// Regions to scan instead of listing them.
    pub regions: Vec<String>,
    pub running_only: bool,
    pub auto_select: bool,
    pub resume: bool,
    pub last: bool,
}

impl NavigatorOptions {
    pub fn from_config(config: &EffectiveConfig) -> Self {
        Self {
            profile: config.profile.value.clone(),
            account_filter: config.account.value.clone(),
            role_filter: config.role_filter(),
            regions: config.regions.value.clone(),
            running_only: !config.include_stopped.value,
            auto_select: config.auto_select.value,
            resume: config.resume.value,
            last: config.last.value,
        }
    }

    /// Narrows these options to `scope`, unless the operator already narrowed
    /// the walk. A role from the config file gives way to the remembered one.
    pub fn seeded_from(&self, scope: &Scope) -> Self {
        let explicit = self.account_filter.is_some()
            || matches!(self.role_filter, RoleFilter::Required(_))
            || !self.regions.is_empty();
        if explicit {
            return self.clone();
        }
        let mut seeded = self.clone();
        seeded.account_filter = Some(scope.account_id.clone());
        if !scope.role_name.is_empty() {
            seeded.role_filter = RoleFilter::Preferred(scope.role_name.clone());
        }
        if !scope.region.is_empty() {
            seeded.regions = vec![scope.region.clone()];
        }
        seeded
    }
}

/// Where a navigation run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Launched(LaunchTarget),
    Cancelled,
}

// --- Walk State ---

/// What has been listed and chosen so far.
#[derive(Debug, Default)]
struct Walk {
    chosen_accounts: Vec<Account>,
    /// Roles of `chosen_accounts`, kept while going back and forth below ROLE.
    roles: Option<(Vec<String>, Vec<RoleBinding>)>,
    /// One binding, or every listed one after "all roles".
    bindings: Vec<RoleBinding>,
    /// Regions of the first of `bindings`.
    regions: Option<(RoleBinding, Vec<Region>)>,
    chosen_regions: Vec<Region>,
    candidate: Option<InstanceCandidate>,
    auto_selected: HashSet<Stage>,
    /// Set once the walk has come back to the root; from then on it always prompts.
    returned_to_root: bool,
}

/// Outcome of showing a list of lines at one stage.
enum Pick<'a> {
    Line(&'a str),
    Back,
    Cancel,
}

// --- Navigator ---

/// Drives the walk with injected discovery, picker, launcher and recent store.
pub struct Navigator<'a> {
    pipeline: &'a DiscoveryPipeline,
    chooser: &'a dyn Chooser,
    launcher: &'a dyn SessionLauncher,
    recent: &'a RecentTargetStore,
    options: NavigatorOptions,
}

impl std::fmt::Debug for Navigator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Navigator")
            .field("pipeline", self.pipeline)
            .field("recent", self.recent)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Navigator<'a> {
    pub fn new(
        pipeline: &'a DiscoveryPipeline,
        chooser: &'a dyn Chooser,
        launcher: &'a dyn SessionLauncher,
        recent: &'a RecentTargetStore,
        options: NavigatorOptions,
    ) -> Self {
        Self {
            pipeline,
            chooser,
            launcher,
            recent,
            options,
        }
    }

    /// Runs the fast paths, then the interactive walk.
    pub fn run(&self) -> SwampResult<Outcome> {
        if self.options.last {
            if let Some(target) = self.reconnect_last() {
                return Ok(Outcome::Launched(target));
            }
        }

        let options = if self.options.resume {
            self.resumed_options()
        } else {
            self.options.clone()
        };
        self.navigate(&options)
    }

    fn resumed_options(&self) -> NavigatorOptions {
        let targets = match self.recent.load() {
            Ok(targets) => targets,
            Err(e) => {
                debug!("recent targets unavailable: {}", e);
                return self.options.clone();
            }
        };
        match targets.last_scope(&self.options.profile) {
            Some(scope) => {
                println!(
                    "{}",
                    format!(
                        "Resuming in account {} with role {} in {}.",
                        scope.account_id, scope.role_name, scope.region
                    )
                    .dimmed()
                );
                self.options.seeded_from(scope)
            }
            None => {
                debug!("no scope remembered for profile '{}'", self.options.profile);
                self.options.clone()
            }
        }
    }

    // --- Fast Path ---

    /// Reconnects to the remembered instance. Any failure, including a failed
    /// launch, returns `None` so the caller falls back to the walk.
    fn reconnect_last(&self) -> Option<LaunchTarget> {
        let targets = match self.recent.load() {
            Ok(targets) => targets,
            Err(e) => {
                debug!("recent targets unavailable: {}", e);
                return None;
            }
        };
        let Some((scope, instance)) = targets.last_instance(&self.options.profile) else {
            println!("{}", "No previous instance recorded for this profile.".yellow());
            return None;
        };

        let candidate = match self.revalidate(scope, instance) {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                println!(
                    "{}",
                    format!(
                        "Last instance {} is no longer available in {}; choose another.",
                        instance.instance_id, instance.region
                    )
                    .yellow()
                );
                return None;
            }
            Err(e) => {
                println!(
                    "{}",
                    format!("Could not check the last instance: {}", e).yellow()
                );
                return None;
            }
        };

        let target = LaunchTarget::from_candidate(candidate);
        println!("Reconnecting to {}", target.to_string().cyan());
        match self.launcher.start(&target) {
            Ok(()) => {
                self.remember(&target);
                Some(target)
            }
            Err(e) => {
                println!("{}", format!("{}; choose an instance instead.", e).yellow());
                None
            }
        }
    }

    /// The remembered instance as freshly discovered, if its region is still
    /// listed and the instance still shows up there.
    fn revalidate(
        &self,
        scope: &Scope,
        instance: &RecentInstance,
    ) -> SwampResult<Option<InstanceCandidate>> {
        let binding = scope.binding();
        let regions = self
            .pipeline
            .discover_regions(&binding, &self.options.regions)?;
        if !regions.contains(&instance.region) {
            debug!("region {} is no longer listed", instance.region);
            return Ok(None);
        }
        let found = self.pipeline.discover_instances(
            &[binding],
            std::slice::from_ref(&instance.region),
            self.options.running_only,
        )?;
        Ok(found
            .into_iter()
            .find(|c| c.instance_id == instance.instance_id))
    }

    // --- Interactive Walk ---

    fn navigate(&self, options: &NavigatorOptions) -> SwampResult<Outcome> {
        let mut walk = Walk::default();
        let mut stage = Stage::Account;
        loop {
            let event = match stage {
                Stage::Account => self.account_stage(&mut walk, options)?,
                Stage::Role => self.role_stage(&mut walk, options)?,
                Stage::Region => self.region_stage(&mut walk, options)?,
                Stage::Instance => self.instance_stage(&mut walk, options)?,
                Stage::Done => return self.launch(&mut walk).map(Outcome::Launched),
                Stage::Cancelled => return Ok(Outcome::Cancelled),
            };

            let mut next = transition(stage, event);
            if matches!(event, Event::Back | Event::Empty) {
                // Stages that were chosen automatically would just choose again.
                while next != Stage::Account && walk.auto_selected.contains(&next) {
                    next = transition(next, Event::Back);
                }
                if next == Stage::Account {
                    walk.returned_to_root = true;
                }
            }
            debug!("{:?} --{:?}--> {:?}", stage, event, next);
            stage = next;
        }
    }

    fn account_stage(&self, walk: &mut Walk, options: &NavigatorOptions) -> SwampResult<Event> {
        println!("Discovering accessible AWS accounts...");
        let accounts = self
            .pipeline
            .discover_accounts(options.account_filter.as_deref())?;

        let mut lines: Vec<String> = accounts.iter().map(Account::display_line).collect();
        if accounts.len() > 1 {
            lines.insert(0, ALL_ACCOUNTS_OPTION.to_string());
        }
        let auto = options.auto_select && !walk.returned_to_root;
        let line = match self.show(walk, Stage::Account, "account", &lines, "Select account", auto)? {
            Pick::Line(line) => line,
            Pick::Back => return Ok(Event::Back),
            Pick::Cancel => return Ok(Event::Cancel),
        };

        walk.chosen_accounts = if line == ALL_ACCOUNTS_OPTION {
            accounts
        } else {
            vec![find_by_line(&accounts, line, Account::display_line)?.clone()]
        };
        Ok(Event::Selected)
    }

    fn role_stage(&self, walk: &mut Walk, options: &NavigatorOptions) -> SwampResult<Event> {
        let ids: Vec<String> = walk.chosen_accounts.iter().map(|a| a.id.clone()).collect();
        let remembered = walk
            .roles
            .as_ref()
            .filter(|(cached, _)| *cached == ids)
            .map(|(_, roles)| roles.clone());
        let roles = match remembered {
            Some(roles) => roles,
            None => {
                println!(
                    "Discovering roles across {} account(s)...",
                    walk.chosen_accounts.len()
                );
                let roles = self
                    .pipeline
                    .discover_roles(&walk.chosen_accounts, &options.role_filter)?;
                walk.roles = Some((ids, roles.clone()));
                roles
            }
        };

        let mut lines: Vec<String> = roles.iter().map(RoleBinding::display_line).collect();
        if roles.len() > 1 {
            lines.insert(0, ALL_ROLES_OPTION.to_string());
        }
        let line = match self.show(walk, Stage::Role, "role", &lines, "Select role", options.auto_select)? {
            Pick::Line(line) => line,
            Pick::Back => return Ok(Event::Back),
            Pick::Cancel => return Ok(Event::Cancel),
        };
        walk.bindings = if line == ALL_ROLES_OPTION {
            roles
        } else {
            vec![find_by_line(&roles, line, RoleBinding::display_line)?.clone()]
        };
        Ok(Event::Selected)
    }

    fn region_stage(&self, walk: &mut Walk, options: &NavigatorOptions) -> SwampResult<Event> {
        // Regions are listed with the first binding; the rest share them.
        let binding = walk
            .bindings
            .first()
            .cloned()
            .ok_or_else(|| SwampError::EmptyStage("no role was selected".to_string()))?;
        let remembered = walk
            .regions
            .as_ref()
            .filter(|(cached, _)| *cached == binding)
            .map(|(_, regions)| regions.clone());
        let regions = match remembered {
            Some(regions) => regions,
            None => {
                let regions = self.pipeline.discover_regions(&binding, &options.regions)?;
                walk.regions = Some((binding, regions.clone()));
                regions
            }
        };

        let mut lines: Vec<String> = regions.iter().map(|r| region_display_line(r)).collect();
        if regions.len() > 1 {
            lines.insert(0, ALL_REGIONS_OPTION.to_string());
        }
        let line = match self.show(walk, Stage::Region, "region", &lines, "Select region", options.auto_select)? {
            Pick::Line(line) => line,
            Pick::Back => return Ok(Event::Back),
            Pick::Cancel => return Ok(Event::Cancel),
        };

        walk.chosen_regions = if line == ALL_REGIONS_OPTION {
            regions
        } else {
            vec![find_by_line(&regions, line, |r| region_display_line(r))?.clone()]
        };
        Ok(Event::Selected)
    }

    fn instance_stage(&self, walk: &mut Walk, options: &NavigatorOptions) -> SwampResult<Event> {
        if walk.bindings.is_empty() {
            return Err(SwampError::EmptyStage("no role was selected".to_string()));
        }
        println!(
            "Discovering instances for {} role(s) in {} region(s)...",
            walk.bindings.len(),
            walk.chosen_regions.len()
        );
        let candidates = self.pipeline.discover_instances(
            &walk.bindings,
            &walk.chosen_regions,
            options.running_only,
        )?;
        if candidates.is_empty() {
            println!(
                "{}",
                format!(
                    "No instances found in {}; choose another region.",
                    walk.chosen_regions.join(", ")
                )
                .yellow()
            );
            return Ok(Event::Empty);
        }

        let lines: Vec<String> = candidates.iter().map(|c| c.display_line.clone()).collect();
        let line = match self.show(walk, Stage::Instance, "instance", &lines, "Select EC2 instance", options.auto_select)? {
            Pick::Line(line) => line,
            Pick::Back => return Ok(Event::Back),
            Pick::Cancel => return Ok(Event::Cancel),
        };
        walk.candidate = Some(find_by_line(&candidates, line, |c| c.display_line.clone())?.clone());
        Ok(Event::Selected)
    }

    /// Shows `lines` for `stage`, or picks the only one when `auto` allows it.
    fn show<'l>(
        &self,
        walk: &mut Walk,
        stage: Stage,
        what: &str,
        lines: &'l [String],
        prompt: &str,
        auto: bool,
    ) -> SwampResult<Pick<'l>> {
        if auto {
            if let [only] = lines {
                println!("{}", format!("Auto-selected {}: {}", what, only).dimmed());
                walk.auto_selected.insert(stage);
                return Ok(Pick::Line(only.as_str()));
            }
        }
        walk.auto_selected.remove(&stage);

        let allow_back = stage != Stage::Account;
        match self.chooser.pick(lines, prompt, allow_back)? {
            Choice::Selected(selected) => lines
                .iter()
                .find(|l| **l == selected)
                .map(|l| Pick::Line(l.as_str()))
                .ok_or_else(|| ChooserError::UnknownSelection(selected).into()),
            Choice::Back => Ok(Pick::Back),
            Choice::Cancelled => Ok(Pick::Cancel),
        }
    }

    // --- Launch ---

    fn launch(&self, walk: &mut Walk) -> SwampResult<LaunchTarget> {
        let candidate = walk
            .candidate
            .take()
            .ok_or_else(|| SwampError::EmptyStage("no instance was selected".to_string()))?;
        let target = LaunchTarget::from_candidate(candidate);
        println!("Starting session on {}", target.to_string().cyan());
        self.launcher.start(&target)?;
        self.remember(&target);
        Ok(target)
    }

    fn remember(&self, target: &LaunchTarget) {
        if let Err(e) = self.recent.record(&self.options.profile, target) {
            warn!("could not remember the last target: {}", e);
        }
    }
}

fn find_by_line<'t, T>(
    items: &'t [T],
    line: &str,
    display: impl Fn(&T) -> String,
) -> SwampResult<&'t T> {
    items
        .iter()
        .find(|item| display(item) == line)
        .ok_or_else(|| ChooserError::UnknownSelection(line.to_string()).into())
}
