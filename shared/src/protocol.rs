//! JSON messages carried inside text frames. Every message is an object
//! with a `type` discriminant.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::state::{MiniPlayer, PlayerView, StatePayload};
use crate::{HeldInput, SeatId};

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Join {
        #[serde(default)]
        nickname: String,
    },
    Input {
        payload: InputPayload,
    },
    Chat {
        message: String,
    },
    RequestPoints,
    RequestPointsAndPlayers,
    LeaveGame,
    BackToLobby,
}

/// Input body: the main game sends a key map, the mini-game client still
/// sends a list of held directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputPayload {
    Directions(Vec<String>),
    Held(HeldInput),
}

impl InputPayload {
    pub fn into_held(self) -> HeldInput {
        match self {
            InputPayload::Directions(directions) => HeldInput::from_directions(&directions),
            InputPayload::Held(held) => held,
        }
    }
}

/// Messages sent by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    PlayerId {
        id: SeatId,
    },
    PlayerCount {
        count: usize,
    },
    Error {
        message: String,
    },
    DuplicateNickname {
        message: String,
    },
    /// Seconds left on the lobby grace timer, `None` when it was reset.
    Lobby {
        time: Option<u32>,
    },
    LobbyFinished,
    Countdown {
        time: Option<u32>,
    },
    CountdownFinished,
    #[serde(rename = "startgame")]
    StartGame {
        payload: StatePayload,
    },
    #[serde(rename = "gamestate")]
    GameState {
        payload: StatePayload,
    },
    /// Mini-game positions keyed by seat.
    State {
        payload: BTreeMap<SeatId, MiniPlayer>,
    },
    Chat {
        nickname: String,
        #[serde(rename = "playerId")]
        player_id: SeatId,
        message: String,
    },
    #[serde(rename = "endgame")]
    EndGame {
        winner: Option<PlayerView>,
        points: BTreeMap<SeatId, u32>,
    },
    #[serde(rename = "back to lobby")]
    BackToLobby,
    Points {
        points: BTreeMap<SeatId, u32>,
        #[serde(skip_serializing_if = "Option::is_none")]
        players: Option<BTreeMap<SeatId, MiniPlayer>>,
    },
    LeaveConfirmed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_join_deserialization() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join","nickname":"Ann"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                nickname: "Ann".to_string()
            }
        );
    }

    #[test]
    fn test_join_without_nickname() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"join"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join {
                nickname: String::new()
            }
        );
    }

    #[test]
    fn test_input_key_map() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"input","payload":{"left":true,"right":false,"up":false,"down":true,"bomb":true}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Input { payload } => {
                let held = payload.into_held();
                assert!(held.left && held.down && held.bomb);
                assert!(!held.right && !held.up);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_input_direction_list() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"input","payload":["up","right"]}"#).unwrap();
        match msg {
            ClientMessage::Input { payload } => {
                let held = payload.into_held();
                assert!(held.up && held.right);
                assert!(!held.bomb);
            }
            _ => panic!("Unexpected message type"),
        }
    }

    #[test]
    fn test_unit_messages() {
        let cases = [
            (r#"{"type":"requestPoints"}"#, ClientMessage::RequestPoints),
            (
                r#"{"type":"requestPointsAndPlayers"}"#,
                ClientMessage::RequestPointsAndPlayers,
            ),
            (r#"{"type":"leaveGame"}"#, ClientMessage::LeaveGame),
            (r#"{"type":"backToLobby"}"#, ClientMessage::BackToLobby),
        ];
        for (raw, expected) in cases {
            let msg: ClientMessage = serde_json::from_str(raw).unwrap();
            assert_eq!(msg, expected);
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<ClientMessage, _> = serde_json::from_str(r#"{"type":"fly"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let cases = vec![
            (ServerMessage::PlayerId { id: 2 }, json!({"type": "playerId", "id": 2})),
            (
                ServerMessage::Lobby { time: None },
                json!({"type": "lobby", "time": null}),
            ),
            (
                ServerMessage::CountdownFinished,
                json!({"type": "countdownFinished"}),
            ),
            (ServerMessage::BackToLobby, json!({"type": "back to lobby"})),
            (
                ServerMessage::Chat {
                    nickname: "Ann".to_string(),
                    player_id: 1,
                    message: "hi".to_string(),
                },
                json!({"type": "chat", "nickname": "Ann", "playerId": 1, "message": "hi"}),
            ),
        ];

        for (msg, expected) in cases {
            let value: Value = serde_json::to_value(&msg).unwrap();
            assert_eq!(value, expected);
        }
    }

    #[test]
    fn test_points_serialize_as_plain_object() {
        let mut points = BTreeMap::new();
        points.insert(1, 2);
        points.insert(3, 0);
        let value = serde_json::to_value(ServerMessage::Points {
            points,
            players: None,
        })
        .unwrap();
        assert_eq!(value, json!({"type": "points", "points": {"1": 2, "3": 0}}));
    }

    #[test]
    fn test_gamestate_tag() {
        let value = serde_json::to_value(ServerMessage::GameState {
            payload: StatePayload::default(),
        })
        .unwrap();
        assert_eq!(value["type"], "gamestate");
        assert_eq!(value["payload"], json!({"level": 0}));
    }
}
