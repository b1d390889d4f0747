/// 每小时毫秒数
pub const MILLIS_PER_HOUR: i64 = 3_600_000;

/// 超过此时长仍未签退的会话被视为遗留会话（小时）
pub const DEFAULT_SIGN_OUT_THRESHOLD_HOURS: i64 = 8;

/// 开放会话扫描的固定分页大小
pub const DEFAULT_SCAN_PAGE_SIZE: usize = 1000;

/// 存储层单批次写入的硬性上限
pub const STORE_BATCH_HARD_LIMIT: usize = 500;

/// Per-batch staged write limit, kept safely below `STORE_BATCH_HARD_LIMIT`.
pub const DEFAULT_BATCH_OP_LIMIT: usize = 450;

/// Maximum in-flight history-sync jobs per flushed batch.
pub const DEFAULT_HISTORY_SYNC_CONCURRENCY: usize = 25;

/// `last_sign_out` value written when this job closes a session.
pub const SIGN_OUT_TAG_AUTO: &str = "auto";
