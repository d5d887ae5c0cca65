// src/constants.rs

use std::time::Duration;

/// The name of the application directory under the user's config and cache dirs.
pub const APP_DIR: &str = "swamp";

/// The name of the user configuration file (inside `~/.config/swamp/`).
pub const CONFIG_FILENAME: &str = "config.toml";

/// The sub-directory of the cache dir that holds scope cache entries.
pub const SCOPE_CACHE_DIRNAME: &str = "scope";

/// The name of the file that remembers the last target per profile (inside the cache dir).
pub const RECENT_TARGETS_FILENAME: &str = "recent_targets.json";

/// Envelope version of scope cache entries. Bump when a payload shape changes.
pub const CACHE_SCHEMA_VERSION: u32 = 1;

/// Document version of the recent targets file.
pub const RECENT_TARGETS_VERSION: u32 = 1;

/// Maximum number of background cache refreshes in flight at any time.
pub const REFRESH_PERMITS: usize = 8;

pub const DEFAULT_WORKERS: usize = 12;
pub const DEFAULT_TTL_ACCOUNTS: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_TTL_ROLES: Duration = Duration::from_secs(6 * 60 * 60);
pub const DEFAULT_TTL_REGIONS: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_TTL_INSTANCES: Duration = Duration::from_secs(60);

/// Region used for SSO and discovery calls when the profile names none.
pub const FALLBACK_REGION: &str = "us-east-1";

/// Rendered in place of a missing field so display rows never collapse.
pub const ABSENT_FIELD: &str = "-";

/// Chooser line that requests navigation to the previous stage.
pub const BACK_OPTION: &str = "<- back";

/// Chooser line that widens the role stage to every listed account.
pub const ALL_ACCOUNTS_OPTION: &str = "* all accounts";

/// Chooser line that widens the instance stage to every listed role.
pub const ALL_ROLES_OPTION: &str = "* all roles";

/// Chooser line that widens the instance stage to every listed region.
pub const ALL_REGIONS_OPTION: &str = "* all regions";

/// Prefix of the generated AWS profiles written to the temporary config file.
pub const GENERATED_PROFILE_PREFIX: &str = "swamp";

/// Hex digits of the role-name digest appended to handles of sanitized role names.
pub const HANDLE_DIGEST_LEN: usize = 16;
