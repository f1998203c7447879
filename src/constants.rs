//! Global constants used throughout the deployer.
//!
//! Environment variable names, timeouts and other values shared across
//! modules are defined here so they are easy to find.

/// Default timeout of a single backend request, in seconds.
///
/// Composite services with many layers are slow to accept definition
/// changes, so this is deliberately generous.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// Environment variable holding the configuration file path.
pub const CONFIG_ENV_VAR: &str = "SOLDEPLOY_CONFIG";

/// Environment variable supplying the access token when the config has none.
pub const TOKEN_ENV_VAR: &str = "SOLDEPLOY_TOKEN";

/// Environment variable disabling progress bars when set to any value.
pub const NO_PROGRESS_ENV_VAR: &str = "SOLDEPLOY_NO_PROGRESS";

/// Cost units charged for one sub-part submission, before relationships.
pub const PART_BASE_COST: u64 = 1;

/// Cost units charged for creating one item.
pub const ITEM_CREATION_COST: u64 = 1;
