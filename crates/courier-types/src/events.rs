use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, UserProfile};

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Authenticate the connection. Must be the first frame; the server
    /// drops unidentified connections.
    Identify { token: String },

    /// Send a direct message to another user.
    SendMessage { receiver_id: Uuid, text: String },

    /// Typing indicator. Relayed, never persisted.
    Typing { receiver_id: Uuid, is_typing: bool },
}

/// Events pushed FROM server TO client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    /// Identification succeeded; the connection is registered.
    Ready { user_id: Uuid },

    /// Acknowledgment to the originating connection only.
    MessageSent { message: Message },

    /// A new message addressed to this user, with the sender's profile.
    ReceiveMessage {
        message: Message,
        sender: UserProfile,
    },

    /// A peer started or stopped typing.
    UserTyping { user_id: Uuid, is_typing: bool },

    /// A relayed send failed. Reported without closing the connection.
    MessageError { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_kebab_case_tags() {
        let cmd: ClientCommand = serde_json::from_str(
            r#"{"type":"send-message","data":{"receiver_id":"00000000-0000-0000-0000-000000000002","text":"hi"}}"#,
        )
        .unwrap();
        match cmd {
            ClientCommand::SendMessage { text, .. } => assert_eq!(text, "hi"),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn typing_event_round_trips() {
        let event = ServerEvent::UserTyping {
            user_id: Uuid::new_v4(),
            is_typing: true,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"user-typing""#));
        let back: ServerEvent = serde_json::from_str(&json).unwrap();
        match back {
            ServerEvent::UserTyping { is_typing, .. } => assert!(is_typing),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn unknown_command_is_rejected() {
        let err = serde_json::from_str::<ClientCommand>(r#"{"type":"subscribe","data":{}}"#);
        assert!(err.is_err());
    }
}
