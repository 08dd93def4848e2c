//! Voice-join preconditions
//!
//! The command layer snapshots the caller's and the bot's voice state into a
//! [`VoiceContext`] and runs [`ensure_voice`] before touching a player.
//! Failures are user errors: surfaced verbatim, never retried.

use thiserror::Error;

/// Voice precondition failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VoiceError {
    #[error("Please join a voice channel first")]
    UserNotInVoice,

    #[error("Bot is not in a voice channel")]
    BotNotInVoice,

    #[error("Connect and Speak permissions are required in order to play music")]
    MissingVoicePermissions,

    #[error("User must be in the same voice channel as the bot ({bot_channel})")]
    UserInDifferentChannel { bot_channel: u64 },
}

/// Voice state relevant to one command invocation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoiceContext {
    /// Channel the invoking user is in
    pub user_channel: Option<u64>,
    /// Channel the bot is connected to in this guild
    pub bot_channel: Option<u64>,
    /// Bot permissions in the user's channel
    pub can_connect: bool,
    pub can_speak: bool,
}

/// What the command layer has to do after a successful check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceAction {
    /// Bot must join this channel
    Connect(u64),
    /// Bot already shares the user's channel
    AlreadyConnected(u64),
}

/// Check that the bot and the command author share a voice channel
///
/// With `should_connect`, a bot that is not connected yet is allowed through
/// (given permissions) and told to join the user's channel.
pub fn ensure_voice(ctx: &VoiceContext, should_connect: bool) -> Result<VoiceAction, VoiceError> {
    let user_channel = ctx.user_channel.ok_or(VoiceError::UserNotInVoice)?;

    match ctx.bot_channel {
        None => {
            if !should_connect {
                return Err(VoiceError::BotNotInVoice);
            }
            if !ctx.can_connect || !ctx.can_speak {
                return Err(VoiceError::MissingVoicePermissions);
            }
            Ok(VoiceAction::Connect(user_channel))
        }
        Some(bot_channel) if bot_channel != user_channel => {
            Err(VoiceError::UserInDifferentChannel { bot_channel })
        }
        Some(bot_channel) => Ok(VoiceAction::AlreadyConnected(bot_channel)),
    }
}
