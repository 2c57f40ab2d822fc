//! Default values backing the configuration table in §6.
//! All are overridable through `Config` (see `config/mod.rs`).

/// Scheduler concurrency ceilings.
pub const DEFAULT_MAX_PARALLEL_JOBS: usize = 8;
pub const DEFAULT_MAX_PARALLEL_AGENTS_PER_JOB: usize = 6;

/// Per-agent-task and per-job deadlines.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 600; // 10 min
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 3600; // 60 min

/// Retry/backoff schedule: base 1s, factor 2, cap 60s, full jitter.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 1_000;
pub const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;
pub const DEFAULT_BACKOFF_CAP_MS: u64 = 60_000;

/// Grace period the scheduler waits for in-flight tasks after cancellation.
pub const DEFAULT_CANCEL_GRACE_PERIOD_SECS: u64 = 30;

/// Consensus defaults (§4.5).
pub const DEFAULT_MIN_AGREEMENT_COUNT: usize = 3;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_HIGH_THRESHOLD: f64 = 0.95;
pub const DEFAULT_MEDIUM_THRESHOLD: f64 = 0.7;
pub const DEFAULT_SIMILARITY_WEIGHT_FILE: f64 = 0.3;
pub const DEFAULT_SIMILARITY_WEIGHT_RULE: f64 = 0.3;
pub const DEFAULT_SIMILARITY_WEIGHT_TITLE: f64 = 0.3;
pub const DEFAULT_SIMILARITY_WEIGHT_LOCATION: f64 = 0.1;
pub const DEFAULT_CATEGORY_SEVERITY_BOOST: f64 = 0.1;
pub const DEFAULT_SAME_FILE_CLAMP_LINE_DELTA: i64 = 5;
pub const DEFAULT_CONSISTENCY_BONUS_ALPHA: f64 = 0.02;
pub const DEFAULT_CONSISTENCY_BONUS_MAX: f64 = 1.1;
pub const DEFAULT_FP_REDUCTION_BETA: f64 = 0.2;

/// ML calibration (§4.5 Step 4).
pub const DEFAULT_ENABLE_ML: bool = false;
pub const DEFAULT_ML_BLEND_WEIGHT: f64 = 0.5;
pub const DEFAULT_ML_LEARNING_RATE: f64 = 0.05;
pub const DEFAULT_ML_L2_LAMBDA: f64 = 0.01;

/// Platt scaling calibration (§4.5 Step 5).
pub const DEFAULT_ENABLE_CALIBRATION: bool = false;
pub const DEFAULT_MIN_CALIBRATION_SAMPLES: usize = 20;
pub const DEFAULT_CALIBRATION_MAX_AGE_DAYS: i64 = 90;
pub const CALIBRATION_SCORE_FLOOR: f64 = 0.01;
pub const CALIBRATION_SCORE_CEIL: f64 = 0.99;

/// Tool reliability tracker (§4.5 Step 6, §9).
pub const DEFAULT_RELIABILITY_DECAY_FACTOR: f64 = 0.95;
pub const DEFAULT_RELIABILITY_MIN_SAMPLES: usize = 1;

/// In-process queue / admission bookkeeping.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 10_000;
pub const DEFAULT_PRIORITY: u8 = 5;
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// How often the scheduler polls the queue when it is empty.
pub const QUEUE_POLL_INTERVAL_MS: u64 = 50;
