//! Safety gate: the single choke point every inbound frame passes through before reaching the router
//! (spec §4.2, §4.4). Combines the payload size check, the generic per-socket rate limiter, and the send-only
//! limiter into one DROP / FAIL / ALLOW decision.

//local shortcuts
use crate::config::AppConfig;
use crate::error::{ErrorCode, ServiceError};
use crate::protocol::frame_type;
use crate::safety::rate_limiter::{FixedWindowLimiter, GenericRateLimiter, RateLimitOutcome};

//third-party shortcuts

//standard shortcuts
use std::time::Instant;

//-------------------------------------------------------------------------------------------------------------------

#[derive(Debug)]
pub enum GateDecision
{
    Allow,
    AllowWithWarning,
    /// Silently discarded: no NACK, no close (used for typing-indicator overflow elsewhere).
    Drop,
    Reject
    {
        error: ServiceError,
        retry_after_ms: Option<u64>,
        close_socket: bool,
    },
}

//-------------------------------------------------------------------------------------------------------------------

/// Per-socket safety state: one generic rate limiter plus one send-only limiter (spec §4.2).
pub struct SocketSafetyState
{
    generic: GenericRateLimiter,
    send: FixedWindowLimiter,
    /// Count of oversized-payload/malformed-frame violations on this socket; once it crosses
    /// `config.payload.violations_before_drop`, further violations of either kind are silently DROPped
    /// instead of FAILed (spec §4.2, FAIL->DROP escalation).
    violations: u32,
}

impl SocketSafetyState
{
    pub fn new(config: &AppConfig) -> Self
    {
        Self{
            generic: GenericRateLimiter::new(config.rate_limit),
            send: FixedWindowLimiter::from_send_config(config.send_limit),
            violations: 0,
        }
    }

    fn escalate(&mut self, config: &AppConfig, error: ServiceError) -> GateDecision
    {
        self.violations += 1;
        if self.violations > config.payload.violations_before_drop
        {
            GateDecision::Drop
        }
        else
        {
            GateDecision::Reject{ error, retry_after_ms: None, close_socket: false }
        }
    }

    /// Records a frame that failed to parse as JSON before it ever reached [`Self::check_inbound`] (the router
    /// can't determine a frame type for something that didn't parse, so this shares the same violation counter
    /// and escalation threshold instead of going through `check_inbound` itself).
    pub fn record_malformed(&mut self, config: &AppConfig) -> GateDecision
    {
        self.escalate(config, ServiceError::new(ErrorCode::InvalidPayload, "malformed frame"))
    }

    /// Checks an inbound frame against size, generic-rate, and send-rate limits, in that order.
    pub fn check_inbound(&mut self, frame_type: &str, payload_len: usize, config: &AppConfig) -> GateDecision
    {
        if payload_len > config.payload.max_size
        {
            let error = ServiceError::new(
                ErrorCode::ContentTooLong,
                format!("payload of {payload_len} bytes exceeds the {}-byte limit", config.payload.max_size),
            );
            return self.escalate(config, error);
        }

        let now = Instant::now();

        if !frame_type::NOISE_TYPES.contains(&frame_type)
        {
            match self.generic.check(now)
            {
                RateLimitOutcome::Allow => {}
                RateLimitOutcome::AllowWithWarning => return GateDecision::AllowWithWarning,
                RateLimitOutcome::Throttled{ retry_after } => {
                    return GateDecision::Reject{
                        error: ServiceError::new(ErrorCode::RateLimited, "socket is throttled"),
                        retry_after_ms: Some(retry_after.as_millis() as u64),
                        close_socket: false,
                    };
                }
                RateLimitOutcome::Violation{ should_close } => {
                    return GateDecision::Reject{
                        error: ServiceError::new(ErrorCode::RateLimited, "rate limit exceeded"),
                        retry_after_ms: None,
                        close_socket: should_close,
                    };
                }
            }
        }

        if matches!(frame_type, frame_type::MESSAGE_SEND | frame_type::ROOM_MESSAGE)
            && !self.send.try_count(now)
        {
            return GateDecision::Reject{
                error: ServiceError::new(ErrorCode::RateLimited, "send rate limit exceeded"),
                retry_after_ms: Some(self.send.retry_after(now).as_millis() as u64),
                close_socket: false,
            };
        }

        GateDecision::Allow
    }
}

//-------------------------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn oversized_payload_is_rejected_without_close()
    {
        let config = AppConfig{
            payload: crate::config::PayloadConfig{ max_size: 8, ..crate::config::PayloadConfig::default() },
            ..AppConfig::default()
        };
        let mut state = SocketSafetyState::new(&config);
        let decision = state.check_inbound(frame_type::MESSAGE_SEND, 9, &config);
        match decision
        {
            GateDecision::Reject{ error, close_socket, .. } =>
            {
                assert_eq!(error.code, ErrorCode::ContentTooLong);
                assert!(!close_socket);
            }
            other => panic!("expected Reject, got {other:?}"),
        }
    }

    #[test]
    fn repeated_violations_escalate_from_reject_to_drop()
    {
        let config = AppConfig{
            payload: crate::config::PayloadConfig{
                max_size: 8,
                violations_before_drop: 2,
                ..crate::config::PayloadConfig::default()
            },
            ..AppConfig::default()
        };
        let mut state = SocketSafetyState::new(&config);

        for _ in 0..2
        {
            assert!(matches!(state.check_inbound(frame_type::MESSAGE_SEND, 9, &config), GateDecision::Reject{ .. }));
        }
        assert!(matches!(state.check_inbound(frame_type::MESSAGE_SEND, 9, &config), GateDecision::Drop));
    }

    #[test]
    fn malformed_frames_share_the_same_violation_counter()
    {
        let config = AppConfig{
            payload: crate::config::PayloadConfig{ violations_before_drop: 1, ..crate::config::PayloadConfig::default() },
            ..AppConfig::default()
        };
        let mut state = SocketSafetyState::new(&config);

        assert!(matches!(state.record_malformed(&config), GateDecision::Reject{ .. }));
        assert!(matches!(state.record_malformed(&config), GateDecision::Drop));
    }

    #[test]
    fn noise_types_bypass_the_generic_limiter()
    {
        let config = AppConfig{
            rate_limit: crate::config::RateLimitConfig{ max_messages: 0, ..AppConfig::default().rate_limit },
            ..AppConfig::default()
        };
        let mut state = SocketSafetyState::new(&config);
        assert!(matches!(state.check_inbound(frame_type::PING, 2, &config), GateDecision::Allow));
    }
}

//-------------------------------------------------------------------------------------------------------------------
