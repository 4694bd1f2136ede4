//! # Command Vocabulary
//!
//! Commands this application sends to a node, and the registration outcomes
//! a node can answer with.
//!
//! ## Outbound Commands
//! ```text
//! ┌───────────┬──────────────────────────────────────────────────────────┐
//! │ category  │ action [arguments]                                       │
//! ├───────────┼──────────────────────────────────────────────────────────┤
//! │ network   │ ping · pong · isRegistrationPossible · register <role>   │
//! │ contents  │ get · put <manifest json>                                │
//! │ media     │ put <ext> <binary> · delete <id> · play [id] · stop      │
//! │           │ pause · forward · rewind · seek <pos> · sync <pos>       │
//! │ light     │ preset <id>                                              │
//! │ volume    │ mute · unmute · set <volume>                             │
//! └───────────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! Every argument travels as a text part except the media file itself.

use std::fmt;

use serde::{Deserialize, Serialize};
use station_core::{AppRole, DeviceMediaId};

use crate::codec::Part;

pub const CATEGORY_NETWORK: &str = "network";
pub const CATEGORY_CONTENTS: &str = "contents";
pub const CATEGORY_MEDIA: &str = "media";
pub const CATEGORY_SYSTEM: &str = "system";
pub const CATEGORY_LIGHT: &str = "light";
pub const CATEGORY_VOLUME: &str = "volume";

// =============================================================================
// Outbound Commands
// =============================================================================

/// A command addressed to one node.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Pong,
    IsRegistrationPossible,
    Register(AppRole),
    GetContents,
    PutContents(String),
    PutMedia { extension: String, data: Vec<u8> },
    DeleteMedia(DeviceMediaId),
    Play(Option<DeviceMediaId>),
    Stop,
    Pause,
    Forward,
    Rewind,
    Seek(f64),
    Sync(f64),
    LightPreset(u8),
    Mute,
    Unmute,
    SetVolume(u8),
}

impl Command {
    /// Parts of the frame carrying this command.
    pub fn to_parts(&self) -> Vec<Part> {
        let head = |category: &str, action: &str| vec![Part::text(category), Part::text(action)];
        let with = |category: &str, action: &str, arg: String| {
            vec![Part::text(category), Part::text(action), Part::Text(arg)]
        };

        match self {
            Command::Ping => head(CATEGORY_NETWORK, "ping"),
            Command::Pong => head(CATEGORY_NETWORK, "pong"),
            Command::IsRegistrationPossible => head(CATEGORY_NETWORK, "isRegistrationPossible"),
            Command::Register(role) => with(CATEGORY_NETWORK, "register", role.as_str().to_string()),
            Command::GetContents => head(CATEGORY_CONTENTS, "get"),
            Command::PutContents(json) => with(CATEGORY_CONTENTS, "put", json.clone()),
            Command::PutMedia { extension, data } => vec![
                Part::text(CATEGORY_MEDIA),
                Part::text("put"),
                Part::text(extension.as_str()),
                Part::Binary(data.clone()),
            ],
            Command::DeleteMedia(id) => with(CATEGORY_MEDIA, "delete", id.to_string()),
            Command::Play(None) => head(CATEGORY_MEDIA, "play"),
            Command::Play(Some(id)) => with(CATEGORY_MEDIA, "play", id.to_string()),
            Command::Stop => head(CATEGORY_MEDIA, "stop"),
            Command::Pause => head(CATEGORY_MEDIA, "pause"),
            Command::Forward => head(CATEGORY_MEDIA, "forward"),
            Command::Rewind => head(CATEGORY_MEDIA, "rewind"),
            Command::Seek(pos) => with(CATEGORY_MEDIA, "seek", pos.to_string()),
            Command::Sync(pos) => with(CATEGORY_MEDIA, "sync", pos.to_string()),
            Command::LightPreset(id) => with(CATEGORY_LIGHT, "preset", id.to_string()),
            Command::Mute => head(CATEGORY_VOLUME, "mute"),
            Command::Unmute => head(CATEGORY_VOLUME, "unmute"),
            Command::SetVolume(volume) => with(CATEGORY_VOLUME, "set", volume.to_string()),
        }
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "network ping",
            Command::Pong => "network pong",
            Command::IsRegistrationPossible => "network isRegistrationPossible",
            Command::Register(_) => "network register",
            Command::GetContents => "contents get",
            Command::PutContents(_) => "contents put",
            Command::PutMedia { .. } => "media put",
            Command::DeleteMedia(_) => "media delete",
            Command::Play(_) => "media play",
            Command::Stop => "media stop",
            Command::Pause => "media pause",
            Command::Forward => "media forward",
            Command::Rewind => "media rewind",
            Command::Seek(_) => "media seek",
            Command::Sync(_) => "media sync",
            Command::LightPreset(_) => "light preset",
            Command::Mute => "volume mute",
            Command::Unmute => "volume unmute",
            Command::SetVolume(_) => "volume set",
        }
    }
}

// =============================================================================
// Registration Outcome
// =============================================================================

/// What a node answered to `network register`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Session accepted.
    Accepted,
    /// Accepted, but another session holds the node.
    AcceptedBlocked,
    Rejected,
}

impl RegistrationOutcome {
    /// Parses the reply word; anything unknown counts as a rejection.
    pub fn from_reply(word: &str) -> Self {
        match word {
            "accepted" => RegistrationOutcome::Accepted,
            "accepted_block" => RegistrationOutcome::AcceptedBlocked,
            _ => RegistrationOutcome::Rejected,
        }
    }

    /// The `yes` / `yes_blocked` / `no` value the router resolves with.
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationOutcome::Accepted => "yes",
            RegistrationOutcome::AcceptedBlocked => "yes_blocked",
            RegistrationOutcome::Rejected => "no",
        }
    }
}

impl fmt::Display for RegistrationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode, encode};

    fn words(command: &Command) -> Vec<String> {
        command
            .to_parts()
            .iter()
            .filter_map(|p| p.as_text().map(str::to_string))
            .collect()
    }

    #[test]
    fn test_command_parts() {
        assert_eq!(words(&Command::Ping), ["network", "ping"]);
        assert_eq!(words(&Command::Register(AppRole::User)), ["network", "register", "user"]);
        assert_eq!(words(&Command::DeleteMedia(42)), ["media", "delete", "42"]);
        assert_eq!(words(&Command::Play(None)), ["media", "play"]);
        assert_eq!(words(&Command::Play(Some(3))), ["media", "play", "3"]);
        assert_eq!(words(&Command::Seek(12.5)), ["media", "seek", "12.5"]);
        assert_eq!(words(&Command::LightPreset(2)), ["light", "preset", "2"]);
        assert_eq!(words(&Command::SetVolume(80)), ["volume", "set", "80"]);
    }

    #[test]
    fn test_media_put_frame() {
        let command = Command::PutMedia {
            extension: "mp4".into(),
            data: vec![0, 1, 2, 3],
        };
        let parts = decode(&encode(&command.to_parts()).unwrap()).unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[2], Part::text("mp4"));
        assert_eq!(parts[3], Part::Binary(vec![0, 1, 2, 3]));
        assert_eq!(command.name(), "media put");
    }

    #[test]
    fn test_registration_outcome() {
        assert_eq!(RegistrationOutcome::from_reply("accepted"), RegistrationOutcome::Accepted);
        assert_eq!(
            RegistrationOutcome::from_reply("accepted_block"),
            RegistrationOutcome::AcceptedBlocked
        );
        assert_eq!(RegistrationOutcome::from_reply("rejected"), RegistrationOutcome::Rejected);
        assert_eq!(RegistrationOutcome::from_reply("maybe"), RegistrationOutcome::Rejected);
        assert_eq!(RegistrationOutcome::AcceptedBlocked.to_string(), "yes_blocked");
    }
}
