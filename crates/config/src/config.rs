use bitcoin::Network;
use serde::Deserialize;

/// Connection details for the local full node this indexer reads blocks from.
#[derive(Debug, Clone, Deserialize)]
pub struct BitcoindConfig {
    pub rpc_url: String,
    pub rpc_user: String,
    pub rpc_password: String,
    pub network: Network,
}

/// Credentials and addressing for the remote partitioned table store.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Table name prefix shared by all tables this indexer owns.
    pub storage_namespace: String,
    /// Subgrouping within the checkpoint table, so multiple indexer instances can
    /// share one storage account without clobbering each other's checkpoints.
    pub checkpoint_set_name: String,
    /// Toggles the credential path: true talks to an unauthenticated emulator
    /// endpoint, false signs requests with `account_name`/`account_key`.
    pub azure_emulator_used: bool,
    /// Credentials, required when `azure_emulator_used` is false.
    pub account_name: Option<String>,
    pub account_key: Option<String>,
    /// Emulator endpoint, required when `azure_emulator_used` is true.
    pub emulator_url: Option<String>,
}

/// The height range this run is responsible for, and checkpoint behavior within it.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Half-open indexing range: `from_height..to_height`.
    pub from_height: u64,
    pub to_height: u64,
    /// Rows-between-saves within a projection task.
    pub checkpoint_interval: u32,
    /// Start from `from_height` regardless of stored state; do not persist new
    /// checkpoints.
    pub ignore_checkpoints: bool,
    /// Reorg depth the chain view tolerates before giving up on `find_fork`.
    pub max_reorg_depth: u32,
}

/// Tuning for the indexing loop's batch size and the partitioned write scheduler.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Blocks processed per indexing-loop iteration.
    pub batch_size: u64,
    /// Worker pool "ready" capacity for the partitioned write scheduler.
    pub scheduler_ready: usize,
    /// Worker pool "queued" capacity for the partitioned write scheduler.
    pub scheduler_queue_cap: usize,
}

/// Exponential backoff tuning, shared by scheduler write retries and loop-level
/// batch-failure sleeps.
#[derive(Debug, Clone, Deserialize)]
pub struct BackoffConfig {
    pub backoff_base_ms: u64,
    pub backoff_multiplier: u64,
    pub backoff_multiplier_base: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 1500,
            backoff_multiplier: 15,
            backoff_multiplier_base: 10,
        }
    }
}

/// Per-loop retry/cadence knobs. Defaults preserve the original fixed-delay
/// behavior (10s indexing retry, 60s chain-sync cadence) as the *base* delay of
/// an exponential backoff, so a single failure behaves exactly as before while
/// repeated failures back off further.
#[derive(Debug, Clone, Deserialize)]
pub struct LoopConfig {
    pub indexing_retry_delay_secs: u64,
    pub chain_sync_interval_secs: u64,
    pub chain_sync_retry_delay_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            indexing_retry_delay_secs: 10,
            chain_sync_interval_secs: 60,
            chain_sync_retry_delay_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub bitcoind_rpc: BitcoindConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    #[serde(default = "default_scheduler")]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub backoff: BackoffConfig,
    #[serde(default)]
    pub loop_config: LoopConfig,
    /// Whether the optional smart-contract detail projection runs alongside the
    /// transactions stream.
    #[serde(default)]
    pub index_smart_contracts: bool,
}

fn default_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        batch_size: 100,
        scheduler_ready: 30,
        scheduler_queue_cap: 100,
    }
}

#[cfg(test)]
mod test {
    use crate::config::Config;

    #[test]
    fn test_config_load_minimal() {
        let config_str = r#"
            [bitcoind_rpc]
            rpc_url = "http://localhost:18332"
            rpc_user = "alpen"
            rpc_password = "alpen"
            network = "regtest"

            [storage]
            storage_namespace = "idx"
            checkpoint_set_name = "default"
            azure_emulator_used = true
            emulator_url = "http://127.0.0.1:10002/devstoreaccount1"

            [sync]
            from_height = 0
            to_height = 1000
            checkpoint_interval = 50
            ignore_checkpoints = false
            max_reorg_depth = 100
        "#;

        let config = toml::from_str::<Config>(config_str);
        assert!(
            config.is_ok(),
            "should be able to load minimal TOML config but got: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.scheduler.batch_size, 100);
        assert_eq!(config.scheduler.scheduler_ready, 30);
        assert_eq!(config.scheduler.scheduler_queue_cap, 100);
        assert_eq!(config.loop_config.indexing_retry_delay_secs, 10);
        assert_eq!(config.loop_config.chain_sync_interval_secs, 60);
        assert!(!config.index_smart_contracts);
    }

    #[test]
    fn test_config_load_full() {
        let config_str = r#"
            [bitcoind_rpc]
            rpc_url = "http://localhost:18332"
            rpc_user = "alpen"
            rpc_password = "alpen"
            network = "signet"

            [storage]
            storage_namespace = "idx"
            checkpoint_set_name = "primary"
            azure_emulator_used = false
            account_name = "myaccount"
            account_key = "c29tZWtleQ=="

            [sync]
            from_height = 200
            to_height = 500
            checkpoint_interval = 25
            ignore_checkpoints = true
            max_reorg_depth = 50

            [scheduler]
            batch_size = 200
            scheduler_ready = 10
            scheduler_queue_cap = 50

            [backoff]
            backoff_base_ms = 500
            backoff_multiplier = 2
            backoff_multiplier_base = 1

            [loop_config]
            indexing_retry_delay_secs = 5
            chain_sync_interval_secs = 30
            chain_sync_retry_delay_secs = 30

            index_smart_contracts = true
        "#;

        let config = toml::from_str::<Config>(config_str);
        assert!(
            config.is_ok(),
            "should be able to load full TOML config but got: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.sync.from_height, 200);
        assert!(config.sync.ignore_checkpoints);
        assert!(config.index_smart_contracts);
    }
}
