//local shortcuts

//third-party shortcuts
use serde::{Deserialize, Serialize};

//standard shortcuts
use std::env;
use std::time::Duration;

//-------------------------------------------------------------------------------------------------------------------

fn env_var<T: std::str::FromStr>(key: &str, default: T) -> T
{
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

//-------------------------------------------------------------------------------------------------------------------

/// Generic per-socket rolling-window rate limiter shape (spec §4.2, limiter 1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig
{
    pub window: Duration,
    pub max_messages: u32,
    /// Fraction of `max_messages` at which a `RATE_LIMIT_WARNING` may be emitted (at most once per quarter-window).
    pub warning_threshold: f32,
    pub violations_before_throttle: u32,
    pub violations_before_close: u32,
}

impl Default for RateLimitConfig
{
    fn default() -> Self
    {
        Self{
            window: Duration::from_secs(10),
            max_messages: 100,
            warning_threshold: 0.8,
            violations_before_throttle: 3,
            violations_before_close: 8,
        }
    }
}

impl RateLimitConfig
{
    pub fn from_env() -> Self
    {
        let default = Self::default();
        Self{
            window: Duration::from_millis(env_var("RATE_LIMIT_WINDOW_MS", default.window.as_millis() as u64)),
            max_messages: env_var("RATE_LIMIT_MAX_MESSAGES", default.max_messages),
            warning_threshold: env_var("RATE_LIMIT_WARNING_THRESHOLD", default.warning_threshold),
            violations_before_throttle: env_var(
                "RATE_LIMIT_VIOLATIONS_BEFORE_THROTTLE",
                default.violations_before_throttle,
            ),
            violations_before_close: env_var(
                "RATE_LIMIT_VIOLATIONS_BEFORE_CLOSE",
                default.violations_before_close,
            ),
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Fixed-window send-only limiter shape (spec §4.2, limiter 2). Applies only to MESSAGE_SEND / ROOM_MESSAGE and
/// never closes the socket.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SendLimitConfig
{
    pub window: Duration,
    pub max_messages: u32,
}

impl Default for SendLimitConfig
{
    fn default() -> Self
    {
        Self{ window: Duration::from_secs(5), max_messages: 60 }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Typing indicator limiter: sliding per-`(userId, roomId)` window, silent drop on violation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TypingLimitConfig
{
    pub window: Duration,
    pub max_events: u32,
}

impl Default for TypingLimitConfig
{
    fn default() -> Self
    {
        Self{ window: Duration::from_secs(2), max_events: 4 }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Per-user limiters applied by the router (spec §4.4), distinct from the per-socket limiters in the safety gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PerUserLimitConfig
{
    pub general_window: Duration,
    pub general_max: u32,
    /// Stricter window for sensitive room-admin actions (create/delete/set-role/remove/add).
    pub sensitive_window: Duration,
    pub sensitive_max: u32,
}

impl Default for PerUserLimitConfig
{
    fn default() -> Self
    {
        Self{
            general_window: Duration::from_secs(10),
            general_max: 200,
            sensitive_window: Duration::from_secs(60),
            sensitive_max: 20,
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Outbound flow-control thresholds (spec §4.2, "Outbound backpressure").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackpressureConfig
{
    pub buffered_amount_threshold: usize,
    pub pending_send_threshold: usize,
    pub max_queue_size: usize,
    pub max_queue_overflows: u32,
}

impl Default for BackpressureConfig
{
    fn default() -> Self
    {
        Self{
            buffered_amount_threshold: 1_000_000,
            pending_send_threshold: 256,
            max_queue_size: 1_000,
            max_queue_overflows: 5,
        }
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PayloadConfig
{
    pub max_size: usize,
    /// Per-socket violation count (oversized payload or malformed JSON) past which the safety gate stops
    /// FAILing and starts silently DROPping instead (spec §4.2, FAIL->DROP escalation).
    pub violations_before_drop: u32,
}

impl Default for PayloadConfig
{
    fn default() -> Self
    {
        Self{ max_size: 64 * 1024, violations_before_drop: 5 }
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HeartbeatConfig
{
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig
{
    fn default() -> Self
    {
        Self{ interval: Duration::from_secs(30), timeout: Duration::from_secs(60) }
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RoomsConfig
{
    pub auto_create: bool,
    pub auto_delete_empty: bool,
    pub max_rooms: usize,
    pub max_members_per_room: usize,
}

impl Default for RoomsConfig
{
    fn default() -> Self
    {
        Self{ auto_create: false, auto_delete_empty: true, max_rooms: 100_000, max_members_per_room: 5_000 }
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServerLimitsConfig
{
    pub max_connections: u32,
    pub shutdown_timeout: Duration,
}

impl Default for ServerLimitsConfig
{
    fn default() -> Self
    {
        Self{ max_connections: 100_000, shutdown_timeout: Duration::from_secs(3) }
    }
}

//-------------------------------------------------------------------------------------------------------------------

/// Deployment environment. Gates dev-only behavior such as query-param auth (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment
{
    Development,
    Production,
}

//-------------------------------------------------------------------------------------------------------------------

/// Root application configuration. Construct with [`AppConfig::from_env`] or [`AppConfig::default`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AppConfig
{
    pub environment: Environment,
    pub ws_path: &'static str,
    pub max_content_length: usize,
    pub max_sockets_per_session: usize,
    pub presence_offline_grace_ms: u64,
    pub allow_dev_query_auth: bool,
    pub replay_default_limit: usize,
    pub replay_max_limit: usize,
    pub replay_soft_timeout: Duration,
    pub db_failure_threshold_per_socket: u32,
    pub db_failure_window: Duration,

    pub rate_limit: RateLimitConfig,
    pub send_limit: SendLimitConfig,
    pub typing_limit: TypingLimitConfig,
    pub per_user_limit: PerUserLimitConfig,
    pub backpressure: BackpressureConfig,
    pub payload: PayloadConfig,
    pub heartbeat: HeartbeatConfig,
    pub rooms: RoomsConfig,
    pub server: ServerLimitsConfig,
}

impl Default for AppConfig
{
    fn default() -> Self
    {
        Self{
            environment: Environment::Development,
            ws_path: "/ws",
            max_content_length: 8_000,
            max_sockets_per_session: 3,
            presence_offline_grace_ms: 5_000,
            allow_dev_query_auth: true,
            replay_default_limit: 100,
            replay_max_limit: 500,
            replay_soft_timeout: Duration::from_secs(8),
            db_failure_threshold_per_socket: 10,
            db_failure_window: Duration::from_secs(60),

            rate_limit: RateLimitConfig::default(),
            send_limit: SendLimitConfig::default(),
            typing_limit: TypingLimitConfig::default(),
            per_user_limit: PerUserLimitConfig::default(),
            backpressure: BackpressureConfig::default(),
            payload: PayloadConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            rooms: RoomsConfig::default(),
            server: ServerLimitsConfig::default(),
        }
    }
}

impl AppConfig
{
    /// Loads config from environment variables, falling back to defaults. Called once at startup.
    pub fn from_env() -> Self
    {
        let mut config = Self::default();
        config.environment = match env::var("CHAT_ENVIRONMENT").as_deref()
        {
            Ok("production") => Environment::Production,
            _ => Environment::Development,
        };
        config.allow_dev_query_auth = config.environment != Environment::Production
            && env_var("CHAT_ALLOW_DEV_QUERY_AUTH", true);
        config.max_content_length = env_var("CHAT_MAX_CONTENT_LENGTH", config.max_content_length);
        config.max_sockets_per_session = env_var("CHAT_MAX_SOCKETS_PER_SESSION", config.max_sockets_per_session);
        config.presence_offline_grace_ms = env_var("CHAT_PRESENCE_OFFLINE_GRACE_MS", config.presence_offline_grace_ms);
        config.rate_limit = RateLimitConfig::from_env();
        config
    }
}

//-------------------------------------------------------------------------------------------------------------------
