// src/core/discovery.rs

//! # Discovery Pipeline
//!
//! Resolves the access scope stage by stage: accounts, roles per account,
//! regions, and instances per `(role, region)` pair.
//!
//! Every remote call goes through the [`ScopeCache`] first. A fresh entry is
//! returned as is; a stale entry is returned immediately while a background
//! refresh is scheduled; a miss calls the [`RemoteDirectory`] and writes the
//! result back with the stage's TTL.
//!
//! The roles and instances stages fan out over a `rayon` pool sized by the
//! worker setting (see [`fan_out`]). A failing job is dropped from the results;
//! the stage only fails when a response could not be decoded or, for roles,
//! when no account could be listed at all.

use crate::core::cache::{CacheRead, ScopeCache, keys};
use crate::core::interfaces::{RemoteDirectory, RemoteError};
use crate::errors::{SwampError, SwampResult};
use crate::models::{Account, InstanceCandidate, Region, RoleBinding};
use log::{debug, info};
use rayon::{ThreadPoolBuilder, prelude::*};
use serde::{Serialize, de::DeserializeOwned};
use std::{collections::HashSet, sync::Arc, time::Duration};

/// Time-to-live of each cached stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTtls {
    pub accounts: Duration,
    pub roles: Duration,
    pub regions: Duration,
    pub instances: Duration,
}

/// Fixed inputs of a discovery run.
#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    /// The SSO profile; scopes every cache entry.
    pub profile: String,
    pub sso_region: String,
    /// Region used to enumerate regions.
    pub discovery_region: String,
    /// Include regions that are not enabled for the account.
    pub all_regions: bool,
    pub workers: usize,
    pub ttls: StageTtls,
}

/// How the role stage narrows its results.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RoleFilter {
    #[default]
    Any,
    /// From the config file: falls back to every role when nothing matches.
    Preferred(String),
    /// From the command line: nothing matching is an error.
    Required(String),
}

impl RoleFilter {
    /// The role name being filtered on, if any.
    pub fn role(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Preferred(role) | Self::Required(role) => Some(role.as_str()),
        }
    }
}

/// Runs discovery stages against a [`RemoteDirectory`] through a [`ScopeCache`].
pub struct DiscoveryPipeline {
    directory: Arc<dyn RemoteDirectory>,
    cache: Arc<ScopeCache>,
    settings: DiscoverySettings,
}

impl std::fmt::Debug for DiscoveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryPipeline")
            .field("cache", &self.cache)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl DiscoveryPipeline {
    pub fn new(
        directory: Arc<dyn RemoteDirectory>,
        cache: Arc<ScopeCache>,
        settings: DiscoverySettings,
    ) -> Self {
        Self {
            directory,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &DiscoverySettings {
        &self.settings
    }

    // --- Stages ---

    /// Lists the accounts, narrowed by `filter` (exact id or case-insensitive
    /// name substring).
    pub fn discover_accounts(&self, filter: Option<&str>) -> SwampResult<Vec<Account>> {
        let key = keys::accounts(&self.settings.profile, &self.settings.sso_region);
        let mut accounts = self.cached(key, self.settings.ttls.accounts, |directory| {
            directory.list_accounts()
        })?;
        if accounts.is_empty() {
            return Err(SwampError::EmptyStage(
                "no SSO accounts returned".to_string(),
            ));
        }

        if let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) {
            accounts = filter_accounts(accounts, filter);
            if accounts.is_empty() {
                return Err(SwampError::NoMatches {
                    what: "accounts",
                    filter: format!("--account={:?}", filter),
                });
            }
        }
        accounts.sort_by_cached_key(Account::display_line);
        Ok(accounts)
    }

    /// Lists the roles of every account in `accounts`, one job per account.
    pub fn discover_roles(
        &self,
        accounts: &[Account],
        filter: &RoleFilter,
    ) -> SwampResult<Vec<RoleBinding>> {
        if accounts.is_empty() {
            return Ok(Vec::new());
        }
        let results = fan_out(accounts.to_vec(), self.settings.workers, |account| {
            let key = keys::roles(
                &self.settings.profile,
                &self.settings.sso_region,
                &account.id,
            );
            let job_account = account.clone();
            self.cached(key, self.settings.ttls.roles, move |directory| {
                directory.list_roles(&job_account)
            })
            .map_err(|e| (account, e))
        });

        let mut bindings = Vec::new();
        let mut failures = Vec::new();
        let mut succeeded = 0usize;
        for result in results {
            match result {
                Ok(found) => {
                    succeeded += 1;
                    bindings.extend(found);
                }
                Err((account, e)) if e.is_decode() => {
                    return Err(SwampError::PartialDiscovery {
                        stage: "roles",
                        context: account_context(&account),
                        message: e.to_string(),
                    });
                }
                Err((account, e)) => {
                    debug!("roles of account {} skipped: {}", account.id, e);
                    failures.push((account, e));
                }
            }
        }
        if succeeded == 0 {
            if let Some((account, first)) = failures.first() {
                return Err(SwampError::PartialDiscovery {
                    stage: "roles",
                    context: account_context(account),
                    message: with_others(first, failures.len() - 1),
                });
            }
        }
        if bindings.is_empty() {
            return Err(SwampError::EmptyStage(
                "no account/role combinations were discovered".to_string(),
            ));
        }

        let mut bindings = apply_role_filter(bindings, filter)?;
        bindings.sort_by_cached_key(RoleBinding::display_line);
        bindings.dedup();
        Ok(bindings)
    }

    /// Resolves the regions to scan.
    ///
    /// An explicit list is deduplicated (first occurrence wins) without any
    /// remote call. Otherwise the regions reachable with `binding` are listed
    /// once and sorted.
    pub fn discover_regions(
        &self,
        binding: &RoleBinding,
        explicit: &[String],
    ) -> SwampResult<Vec<Region>> {
        let regions = if explicit.is_empty() {
            let key = keys::regions(
                &self.settings.profile,
                &binding.account_id,
                &binding.role_name,
                &self.settings.discovery_region,
                self.settings.all_regions,
            );
            let job_binding = binding.clone();
            let all_regions = self.settings.all_regions;
            let mut listed = self.cached(key, self.settings.ttls.regions, move |directory| {
                directory.list_regions(&job_binding, all_regions)
            })?;
            listed.sort();
            listed.dedup();
            listed
        } else {
            dedupe_regions(explicit)
        };

        if regions.is_empty() {
            return Err(SwampError::EmptyStage("no regions to scan".to_string()));
        }
        Ok(regions)
    }

    /// Lists instances for every `(binding, region)` pair.
    ///
    /// Jobs that fail are dropped; an undecodable response fails the stage.
    /// The result is sorted by display line.
    pub fn discover_instances(
        &self,
        targets: &[RoleBinding],
        regions: &[Region],
        running_only: bool,
    ) -> SwampResult<Vec<InstanceCandidate>> {
        let jobs: Vec<(RoleBinding, Region)> = targets
            .iter()
            .flat_map(|binding| {
                regions
                    .iter()
                    .map(move |region| (binding.clone(), region.clone()))
            })
            .collect();
        debug!("scanning {} role/region pairs", jobs.len());

        let results = fan_out(jobs, self.settings.workers, |(binding, region)| {
            let key = keys::instances(
                &self.settings.profile,
                &binding.account_id,
                &binding.role_name,
                &region,
                running_only,
            );
            let (job_binding, job_region) = (binding.clone(), region.clone());
            self.cached(key, self.settings.ttls.instances, move |directory| {
                directory.list_instances(&job_binding, &job_region, running_only)
            })
            .map_err(|e| (binding, region, e))
        });

        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for result in results {
            match result {
                Ok(found) => candidates.extend(
                    found
                        .into_iter()
                        .filter(|c| !c.instance_id.trim().is_empty()),
                ),
                Err((binding, region, e)) if e.is_decode() => {
                    return Err(SwampError::PartialDiscovery {
                        stage: "instances",
                        context: format!(
                            "account {} role {} in {}",
                            binding.account_id, binding.role_name, region
                        ),
                        message: e.to_string(),
                    });
                }
                Err((binding, region, e)) => debug!(
                    "instances of {}/{} in {} skipped: {}",
                    binding.account_id, binding.role_name, region, e
                ),
            }
        }
        candidates.sort_by(|a, b| a.display_line.cmp(&b.display_line));
        candidates.retain(|c| seen.insert((c.instance_id.clone(), c.profile_handle.clone())));
        Ok(candidates)
    }

    // --- Cache Plumbing ---

    /// Serves `key` from the cache, or calls `fetch` and stores its result.
    ///
    /// A stale hit is returned as is and `fetch` runs in the background
    /// instead, if a refresh permit is free.
    fn cached<T, F>(&self, key: String, ttl: Duration, fetch: F) -> Result<T, RemoteError>
    where
        T: Serialize + DeserializeOwned + 'static,
        F: FnOnce(&dyn RemoteDirectory) -> Result<T, RemoteError> + Send + 'static,
    {
        let profile = &self.settings.profile;
        match self.cache.read::<T>(profile, &key) {
            CacheRead::Fresh(value) => return Ok(value),
            CacheRead::Stale { value, age } => {
                let directory = Arc::clone(&self.directory);
                let cache = Arc::clone(&self.cache);
                let (profile, refresh_key) = (profile.clone(), key.clone());
                let scheduled = self.cache.refresh_async(move || {
                    let fresh = fetch(directory.as_ref())?;
                    cache.write(&profile, &refresh_key, ttl, &fresh)?;
                    Ok(())
                });
                debug!(
                    "serving '{}' from stale cache ({:?} old, refresh scheduled: {})",
                    key, age, scheduled
                );
                return Ok(value);
            }
            CacheRead::Miss => {}
        }

        let value = fetch(self.directory.as_ref())?;
        if let Err(e) = self.cache.write(profile, &key, ttl, &value) {
            debug!("cache write for '{}' skipped: {}", key, e);
        }
        Ok(value)
    }
}

// --- Fan-out ---

/// Runs `job` once per input on a dedicated pool of `workers` threads
/// (minimum one, never more than there are inputs).
///
/// Results come back in input order, so callers can report failures by the
/// index of the job that produced them. If the pool cannot be built the jobs
/// run on the calling thread.
pub fn fan_out<I, O, E, F>(inputs: Vec<I>, workers: usize, job: F) -> Vec<Result<O, E>>
where
    I: Send,
    O: Send,
    E: Send,
    F: Fn(I) -> Result<O, E> + Sync,
{
    let total = inputs.len();
    if total == 0 {
        return Vec::new();
    }
    let workers = workers.clamp(1, total);
    let pool = match ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("swamp-discovery-{}", i))
        .build()
    {
        Ok(pool) => pool,
        Err(e) => {
            debug!("could not build a pool of {} workers: {}", workers, e);
            return inputs.into_iter().map(&job).collect();
        }
    };
    log::trace!("fanning out {} jobs over {} workers", total, workers);
    pool.install(|| inputs.into_par_iter().map(&job).collect())
}

// --- Helpers ---

/// Keeps accounts whose id equals `filter` or whose name contains it.
pub fn filter_accounts(accounts: Vec<Account>, filter: &str) -> Vec<Account> {
    let needle = filter.trim().to_lowercase();
    if needle.is_empty() {
        return accounts;
    }
    accounts
        .into_iter()
        .filter(|a| a.id == needle || a.name.to_lowercase().contains(&needle))
        .collect()
}

fn apply_role_filter(
    bindings: Vec<RoleBinding>,
    filter: &RoleFilter,
) -> SwampResult<Vec<RoleBinding>> {
    let Some(role) = filter.role().map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(bindings);
    };
    let matching: Vec<RoleBinding> = bindings
        .iter()
        .filter(|b| b.role_name == role)
        .cloned()
        .collect();
    if !matching.is_empty() {
        return Ok(matching);
    }
    match filter {
        RoleFilter::Required(_) => Err(SwampError::NoMatches {
            what: "roles",
            filter: format!("--role={:?}", role),
        }),
        _ => {
            info!(
                "preferred role '{}' not available, showing every role",
                role
            );
            Ok(bindings)
        }
    }
}

/// Trims, drops blanks and removes repeats, keeping first-seen order.
pub fn dedupe_regions(regions: &[String]) -> Vec<Region> {
    let mut seen = HashSet::new();
    regions
        .iter()
        .map(|r| r.trim())
        .filter(|r| !r.is_empty() && seen.insert(r.to_string()))
        .map(str::to_string)
        .collect()
}

fn account_context(account: &Account) -> String {
    if account.name.trim().is_empty() {
        format!("account {}", account.id)
    } else {
        format!("account {} ({})", account.id, account.name)
    }
}

fn with_others(first: &RemoteError, others: usize) -> String {
    match others {
        0 => first.to_string(),
        1 => format!("{} (and 1 other failure)", first),
        n => format!("{} (and {} other failures)", first, n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::{CacheConfig, CacheMode};
    use crate::models::InstanceFacts;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Instant;
    use tempfile::TempDir;

    // --- Fakes ---

    #[derive(Default)]
    struct FakeDirectory {
        accounts: Vec<Account>,
        roles: HashMap<String, Result<Vec<String>, &'static str>>,
        regions: Vec<String>,
        instances: Mutex<HashMap<(String, String), Vec<&'static str>>>,
        undecodable_roles: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeDirectory {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RemoteDirectory for FakeDirectory {
        fn list_accounts(&self) -> Result<Vec<Account>, RemoteError> {
            self.record("accounts".to_string());
            Ok(self.accounts.clone())
        }

        fn list_roles(&self, account: &Account) -> Result<Vec<RoleBinding>, RemoteError> {
            self.record(format!("roles:{}", account.id));
            if self.undecodable_roles.as_deref() == Some(account.id.as_str()) {
                let source = serde_json::from_str::<u8>("{").unwrap_err();
                return Err(RemoteError::Decode {
                    operation: "list-account-roles".to_string(),
                    source,
                });
            }
            match self.roles.get(&account.id) {
                Some(Ok(names)) => Ok(names.iter().map(|n| RoleBinding::new(account, n)).collect()),
                Some(Err(message)) => Err(RemoteError::Transport {
                    operation: "list-account-roles".to_string(),
                    message: message.to_string(),
                }),
                None => Ok(Vec::new()),
            }
        }

        fn list_regions(
            &self,
            _binding: &RoleBinding,
            _all_regions: bool,
        ) -> Result<Vec<Region>, RemoteError> {
            self.record("regions".to_string());
            Ok(self.regions.clone())
        }

        fn list_instances(
            &self,
            binding: &RoleBinding,
            region: &str,
            running_only: bool,
        ) -> Result<Vec<InstanceCandidate>, RemoteError> {
            self.record(format!("instances:{}:{}", binding.account_id, region));
            let instances = self.instances.lock().unwrap();
            match instances.get(&(binding.account_id.clone(), region.to_string())) {
                Some(ids) => Ok(ids
                    .iter()
                    .map(|id| {
                        let facts = InstanceFacts {
                            instance_id: id.to_string(),
                            ..Default::default()
                        };
                        InstanceCandidate::new(binding, region, &facts, running_only)
                    })
                    .collect()),
                None => Err(RemoteError::Transport {
                    operation: "describe-instances".to_string(),
                    message: "UnauthorizedOperation".to_string(),
                }),
            }
        }
    }

    // --- Setup ---

    fn account(id: &str, name: &str) -> Account {
        Account {
            id: id.to_string(),
            name: name.to_string(),
            email: format!("{}@example.com", name),
        }
    }

    fn settings(workers: usize) -> DiscoverySettings {
        DiscoverySettings {
            profile: "dev".to_string(),
            sso_region: "eu-west-1".to_string(),
            discovery_region: "eu-west-1".to_string(),
            all_regions: false,
            workers,
            ttls: StageTtls {
                accounts: Duration::from_secs(60),
                roles: Duration::from_secs(60),
                regions: Duration::from_secs(60),
                instances: Duration::from_secs(60),
            },
        }
    }

    fn pipeline(directory: Arc<FakeDirectory>, cache: ScopeCache) -> DiscoveryPipeline {
        DiscoveryPipeline::new(directory, Arc::new(cache), settings(4))
    }

    fn three_accounts() -> FakeDirectory {
        let mut directory = FakeDirectory {
            accounts: vec![
                account("111", "alpha"),
                account("222", "bravo"),
                account("333", "charlie"),
            ],
            ..Default::default()
        };
        directory
            .roles
            .insert("111".to_string(), Ok(vec!["Admin".to_string()]));
        directory
            .roles
            .insert("222".to_string(), Err("AccessDenied"));
        directory.roles.insert(
            "333".to_string(),
            Ok(vec!["Admin".to_string(), "ReadOnly".to_string()]),
        );
        directory
    }

    // --- Tests ---

    #[test]
    fn test_fan_out_keeps_input_order_and_runs_every_job() {
        let inputs: Vec<u32> = (0..50).collect();
        let results = fan_out(inputs, 7, |n| if n % 5 == 0 { Err(n) } else { Ok(n * 2) });

        assert_eq!(results.len(), 50);
        for (n, result) in (0u32..).zip(results) {
            if n % 5 == 0 {
                assert_eq!(result, Err(n));
            } else {
                assert_eq!(result, Ok(n * 2));
            }
        }
    }

    #[test]
    fn test_fan_out_tolerates_zero_workers_and_no_jobs() {
        let results = fan_out(vec![1, 2, 3], 0, Ok::<_, ()>);
        assert_eq!(results, vec![Ok(1), Ok(2), Ok(3)]);

        let empty: Vec<Result<u8, ()>> = fan_out(Vec::new(), 4, Ok);
        assert!(empty.is_empty());
    }

    #[test]
    fn test_fan_out_never_exceeds_the_worker_count() {
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let results = fan_out((0..24).collect(), 3, |n: u32| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(5));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok::<_, ()>(n)
        });

        assert_eq!(results.len(), 24);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_roles_absorb_a_single_failed_account() {
        let directory = Arc::new(three_accounts());
        let pipeline = pipeline(Arc::clone(&directory), ScopeCache::disabled());

        let roles = pipeline
            .discover_roles(&directory.accounts, &RoleFilter::Any)
            .unwrap();

        let pairs: Vec<(&str, &str)> = roles
            .iter()
            .map(|b| (b.account_id.as_str(), b.role_name.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![("111", "Admin"), ("333", "Admin"), ("333", "ReadOnly")]
        );
    }

    #[test]
    fn test_roles_fail_when_every_account_fails() {
        let mut directory = three_accounts();
        for id in ["111", "222", "333"] {
            directory.roles.insert(id.to_string(), Err("AccessDenied"));
        }
        let directory = Arc::new(directory);
        let pipeline = pipeline(Arc::clone(&directory), ScopeCache::disabled());

        let err = pipeline
            .discover_roles(&directory.accounts, &RoleFilter::Any)
            .unwrap_err();

        // The lowest-index failure is the one reported.
        match err {
            SwampError::PartialDiscovery {
                stage,
                context,
                message,
            } => {
                assert_eq!(stage, "roles");
                assert_eq!(context, "account 111 (alpha)");
                assert!(message.contains("AccessDenied"));
                assert!(message.contains("and 2 other failures"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_roles_surface_decode_failures() {
        let mut directory = three_accounts();
        directory.undecodable_roles = Some("333".to_string());
        let directory = Arc::new(directory);
        let pipeline = pipeline(Arc::clone(&directory), ScopeCache::disabled());

        let err = pipeline
            .discover_roles(&directory.accounts, &RoleFilter::Any)
            .unwrap_err();
        assert!(matches!(err, SwampError::PartialDiscovery { stage: "roles", .. }));
    }

    #[test]
    fn test_role_filters_required_and_preferred() {
        let directory = Arc::new(three_accounts());
        let pipeline = pipeline(Arc::clone(&directory), ScopeCache::disabled());

        let read_only = pipeline
            .discover_roles(
                &directory.accounts,
                &RoleFilter::Required("ReadOnly".to_string()),
            )
            .unwrap();
        assert_eq!(read_only.len(), 1);

        let fallback = pipeline
            .discover_roles(
                &directory.accounts,
                &RoleFilter::Preferred("Billing".to_string()),
            )
            .unwrap();
        assert_eq!(fallback.len(), 3);

        let err = pipeline
            .discover_roles(
                &directory.accounts,
                &RoleFilter::Required("Billing".to_string()),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "no roles matched --role=\"Billing\"");
    }

    #[test]
    fn test_account_filter_by_id_and_name() {
        let directory = Arc::new(three_accounts());
        let pipeline = pipeline(directory, ScopeCache::disabled());

        let by_id = pipeline.discover_accounts(Some("222")).unwrap();
        assert_eq!(by_id.len(), 1);
        let by_name = pipeline.discover_accounts(Some("CHAR")).unwrap();
        assert_eq!(by_name.first().map(|a| a.id.as_str()), Some("333"));
        let everything = pipeline.discover_accounts(Some("  ")).unwrap();
        assert_eq!(everything.len(), 3);

        let err = pipeline.discover_accounts(Some("zulu")).unwrap_err();
        assert!(matches!(err, SwampError::NoMatches { what: "accounts", .. }));
    }

    #[test]
    fn test_explicit_regions_are_deduplicated_without_remote_calls() {
        let directory = Arc::new(FakeDirectory::default());
        let pipeline = pipeline(Arc::clone(&directory), ScopeCache::disabled());
        let explicit: Vec<String> = "us-east-1,us-east-1,eu-west-1"
            .split(',')
            .map(String::from)
            .collect();

        let regions = pipeline
            .discover_regions(&RoleBinding::default(), &explicit)
            .unwrap();

        assert_eq!(regions, vec!["us-east-1", "eu-west-1"]);
        assert!(directory.calls().is_empty());
    }

    #[test]
    fn test_listed_regions_are_sorted_and_cached() {
        let dir = TempDir::new().unwrap();
        let directory = Arc::new(FakeDirectory {
            regions: vec![
                "us-west-2".to_string(),
                "eu-west-1".to_string(),
                "ap-south-1".to_string(),
            ],
            ..Default::default()
        });
        let cache = ScopeCache::new(CacheConfig::new(dir.path(), CacheMode::Balanced));
        let pipeline = pipeline(Arc::clone(&directory), cache);
        let binding = RoleBinding::new(&account("111", "alpha"), "Admin");

        let first = pipeline.discover_regions(&binding, &[]).unwrap();
        let second = pipeline.discover_regions(&binding, &[]).unwrap();

        assert_eq!(first, vec!["ap-south-1", "eu-west-1", "us-west-2"]);
        assert_eq!(first, second);
        assert_eq!(directory.calls(), vec!["regions"]);
    }

    #[test]
    fn test_instances_drop_failed_pairs_and_sort() {
        let directory = FakeDirectory::default();
        {
            let mut instances = directory.instances.lock().unwrap();
            instances.insert(("111".to_string(), "eu-west-1".to_string()), vec!["i-b", "i-a"]);
            instances.insert(("111".to_string(), "us-east-1".to_string()), vec!["", "i-c"]);
        }
        let directory = Arc::new(directory);
        let pipeline = pipeline(Arc::clone(&directory), ScopeCache::disabled());
        let binding = RoleBinding::new(&account("111", "alpha"), "Admin");
        let other = RoleBinding::new(&account("222", "bravo"), "Admin");
        let regions = vec!["eu-west-1".to_string(), "us-east-1".to_string()];

        let found = pipeline
            .discover_instances(&[binding, other], &regions, true)
            .unwrap();

        let ids: Vec<&str> = found.iter().map(|c| c.instance_id.as_str()).collect();
        assert_eq!(ids, vec!["i-a", "i-b", "i-c"]);
        // Every pair was attempted, including the failing ones.
        assert_eq!(directory.calls().len(), 4);
    }

    #[test]
    fn test_stale_instances_are_served_then_refreshed() {
        let dir = TempDir::new().unwrap();
        let directory = FakeDirectory::default();
        let pair = ("111".to_string(), "eu-west-1".to_string());
        directory
            .instances
            .lock()
            .unwrap()
            .insert(pair.clone(), vec!["i-old"]);
        let directory = Arc::new(directory);
        let mut settings = settings(2);
        settings.ttls.instances = Duration::from_millis(20);
        let cache = Arc::new(ScopeCache::new(CacheConfig::new(
            dir.path(),
            CacheMode::Balanced,
        )));
        let pipeline = DiscoveryPipeline::new(
            Arc::clone(&directory) as Arc<dyn RemoteDirectory>,
            Arc::clone(&cache),
            settings,
        );
        let binding = RoleBinding::new(&account("111", "alpha"), "Admin");
        let regions = vec!["eu-west-1".to_string()];

        // --- Execute ---
        pipeline
            .discover_instances(std::slice::from_ref(&binding), &regions, true)
            .unwrap();
        directory
            .instances
            .lock()
            .unwrap()
            .insert(pair, vec!["i-new"]);
        thread::sleep(Duration::from_millis(50));
        let stale = pipeline
            .discover_instances(std::slice::from_ref(&binding), &regions, true)
            .unwrap();

        // --- Assert ---
        assert_eq!(stale.first().map(|c| c.instance_id.as_str()), Some("i-old"));
        let key = keys::instances("dev", "111", "Admin", "eu-west-1", true);
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let refreshed = match cache.read::<Vec<InstanceCandidate>>("dev", &key) {
                CacheRead::Fresh(v) | CacheRead::Stale { value: v, .. } => v,
                CacheRead::Miss => Vec::new(),
            };
            if refreshed.first().map(|c| c.instance_id.as_str()) == Some("i-new") {
                break;
            }
            assert!(Instant::now() < deadline, "background refresh never landed");
            thread::sleep(Duration::from_millis(10));
        }
    }
}
