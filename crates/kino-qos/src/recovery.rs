//! Recovery policy
//!
//! Chooses exactly one action per escalated error. Rules are evaluated in a
//! fixed order and the first rule returning an action wins. Every automatic
//! path is bounded by a counter; once a counter is capped the error falls
//! through to the modal rules.

use crate::classify::{ErrorClassifier, ErrorCode, ErrorRecord, ErrorSource, ErrorType};
use crate::metrics::RecoveryCounters;
use crate::player::{ModalType, PlaybackController};
use crate::types::QosConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Action chosen for one error
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Recorded only
    Ignore,
    /// Refetch content with a fresh token, resuming at the position
    RetryTokenExpired { resume_position: f64 },
    /// The streaming engine recovered by itself
    EngineRecovered,
    /// Swap to the alternate resource
    Fallback,
    /// Re-issue the source at the position
    Reload { position: f64 },
    /// Show the modal on the next buffer start
    DeferModal { modal: ModalType },
    ShowModal { modal: ModalType },
}

impl RecoveryAction {
    pub fn name(&self) -> &'static str {
        match self {
            RecoveryAction::Ignore => "ignore",
            RecoveryAction::RetryTokenExpired { .. } => "retry_token_expired",
            RecoveryAction::EngineRecovered => "engine_recovered",
            RecoveryAction::Fallback => "fallback",
            RecoveryAction::Reload { .. } => "reload",
            RecoveryAction::DeferModal { .. } => "defer_modal",
            RecoveryAction::ShowModal { .. } => "show_modal",
        }
    }

    /// Whether this action cancels a modal still waiting for a buffer start
    pub fn supersedes_deferred_modal(&self) -> bool {
        matches!(
            self,
            RecoveryAction::RetryTokenExpired { .. }
                | RecoveryAction::Fallback
                | RecoveryAction::Reload { .. }
                | RecoveryAction::ShowModal { .. }
        )
    }
}

/// Inputs of one recovery decision
#[derive(Debug, Clone, Copy)]
pub struct RecoveryContext<'a> {
    pub record: &'a ErrorRecord,
    pub config: &'a QosConfig,
    pub counters: RecoveryCounters,
    pub is_drm_resource: bool,
    pub has_fallback: bool,
    pub is_buffering: bool,
    /// Seconds buffered ahead of the playhead
    pub buffered_ahead_secs: f64,
    pub position: f64,
}

type RuleFn = fn(&RecoveryContext<'_>, &mut dyn PlaybackController) -> Option<RecoveryAction>;

/// Named recovery rule
#[derive(Clone, Copy)]
pub struct RecoveryRule {
    pub name: &'static str,
    apply: RuleFn,
}

impl RecoveryRule {
    fn new(name: &'static str, apply: RuleFn) -> Self {
        Self { name, apply }
    }
}

impl std::fmt::Debug for RecoveryRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryRule").field("name", &self.name).finish()
    }
}

/// Decision returned by [`RecoveryPolicy::decide`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    /// Rule that produced the action, `None` when the error was not escalated
    pub rule: Option<&'static str>,
    pub action: RecoveryAction,
}

fn token_expired(ctx: &RecoveryContext<'_>, _: &mut dyn PlaybackController) -> Option<RecoveryAction> {
    (ctx.record.code == ErrorCode::TokenExpired
        && ctx.counters.token_expired_retry_count < ctx.config.max_token_expired_retries)
        .then_some(RecoveryAction::RetryTokenExpired {
            resume_position: ctx.position,
        })
}

fn engine_recovery(ctx: &RecoveryContext<'_>, controller: &mut dyn PlaybackController) -> Option<RecoveryAction> {
    let record = ctx.record;
    if record.source != ErrorSource::Engine || !record.fatal || record.code.is_codec() {
        return None;
    }
    controller
        .try_engine_recovery(record)
        .then_some(RecoveryAction::EngineRecovered)
}

fn setup_error(ctx: &RecoveryContext<'_>, _: &mut dyn PlaybackController) -> Option<RecoveryAction> {
    (ctx.record.error_type == ErrorType::SetupError).then_some(RecoveryAction::ShowModal {
        modal: ModalType::SetupError,
    })
}

fn fallback_eligible(ctx: &RecoveryContext<'_>) -> bool {
    match ctx.record.code {
        _ if ctx.record.error_type == ErrorType::DrmError => ctx.is_drm_resource,
        ErrorCode::DecodeError | ErrorCode::SrcNotSupported => true,
        ErrorCode::InvalidCharacter => ctx.config.platform.invalid_character_recovery,
        ErrorCode::StartupStall => ctx.config.startup_stall_recovery,
        _ => false,
    }
}

fn fallback(ctx: &RecoveryContext<'_>, _: &mut dyn PlaybackController) -> Option<RecoveryAction> {
    (ctx.has_fallback && ctx.counters.fallback_count < ctx.config.max_fallbacks && fallback_eligible(ctx))
        .then_some(RecoveryAction::Fallback)
}

fn reload_eligible(ctx: &RecoveryContext<'_>) -> bool {
    let platform = &ctx.config.platform;
    match ctx.record.code {
        ErrorCode::DecodeError => platform.reload_on_decode_error,
        ErrorCode::InvalidCharacter => platform.invalid_character_recovery,
        ErrorCode::SrcNotSupported => platform.reload_on_src_not_supported,
        ErrorCode::StartupStall => ctx.config.startup_stall_recovery,
        _ => false,
    }
}

fn reload(ctx: &RecoveryContext<'_>, _: &mut dyn PlaybackController) -> Option<RecoveryAction> {
    (reload_eligible(ctx) && ctx.counters.reload_count < ctx.config.max_reloads).then_some(RecoveryAction::Reload {
        position: ctx.position,
    })
}

fn deferred_network_modal(ctx: &RecoveryContext<'_>, _: &mut dyn PlaybackController) -> Option<RecoveryAction> {
    (ctx.record.error_type == ErrorType::NetworkError
        && ctx.buffered_ahead_secs > ctx.config.depleted_buffer_secs
        && !ctx.is_buffering)
        .then_some(RecoveryAction::DeferModal {
            modal: ModalType::FatalError,
        })
}

fn final_modal(ctx: &RecoveryContext<'_>, _: &mut dyn PlaybackController) -> Option<RecoveryAction> {
    let modal = match (ctx.record.error_type, ctx.record.code) {
        (_, ErrorCode::HdcpOutputRestricted) => ModalType::HdcpError,
        (ErrorType::DrmError, _) => ModalType::DrmError,
        _ => ModalType::FatalError,
    };
    Some(RecoveryAction::ShowModal { modal })
}

/// Ordered recovery rules
#[derive(Debug, Clone)]
pub struct RecoveryPolicy {
    classifier: ErrorClassifier,
    rules: Vec<RecoveryRule>,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryPolicy {
    pub fn new() -> Self {
        Self {
            classifier: ErrorClassifier::new(),
            rules: vec![
                RecoveryRule::new("token_expired_retry", token_expired),
                RecoveryRule::new("engine_recovery", engine_recovery),
                RecoveryRule::new("setup_error", setup_error),
                RecoveryRule::new("fallback", fallback),
                RecoveryRule::new("reload", reload),
                RecoveryRule::new("deferred_network_modal", deferred_network_modal),
                RecoveryRule::new("final_modal", final_modal),
            ],
        }
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.rules.iter().map(|r| r.name)
    }

    /// Whether the error enters the rule chain at all
    pub fn escalates(&self, record: &ErrorRecord) -> bool {
        record.fatal || record.error_type == ErrorType::DrmError || self.classifier.is_unrecoverable_buffer_append(record)
    }

    /// Pick the action for a content error
    pub fn decide(&self, ctx: &RecoveryContext<'_>, controller: &mut dyn PlaybackController) -> Decision {
        if !self.escalates(ctx.record) {
            debug!(code = %ctx.record.code, "Non-fatal error recorded");
            return Decision {
                rule: None,
                action: RecoveryAction::Ignore,
            };
        }
        for rule in &self.rules {
            if let Some(action) = (rule.apply)(ctx, controller) {
                warn!(rule = rule.name, action = action.name(), code = %ctx.record.code, "Recovery decision");
                return Decision {
                    rule: Some(rule.name),
                    action,
                };
            }
        }
        // final_modal always matches
        Decision {
            rule: None,
            action: RecoveryAction::Ignore,
        }
    }

    /// Pick the action for an ad error
    pub fn decide_ad(&self, record: &ErrorRecord, config: &QosConfig) -> RecoveryAction {
        if record.fatal && config.surface_fatal_ad_errors {
            RecoveryAction::ShowModal {
                modal: ModalType::AdError,
            }
        } else {
            RecoveryAction::Ignore
        }
    }
}
