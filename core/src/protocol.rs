use serde::{Deserialize, Serialize};

use crate::{
    board::Coord,
    models::{Cell, GameParams},
};

#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "action")]
pub enum ClientMessage {
    #[serde(rename = "reveal")]
    Reveal { pos: Coord },
    #[serde(rename = "flag")]
    Flag { pos: Coord },
    #[serde(rename = "restart")]
    Restart { params: GameParams },
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct CellUpdate {
    pub pos: Coord,
    pub value: Cell,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "init")]
    Init {
        rows: usize,
        columns: usize,
        mines: usize,
        field: Vec<Vec<Cell>>,
    },
    #[serde(rename = "update")]
    Update {
        updates: Vec<CellUpdate>,
        won: bool,
        lost: bool,
        remaining_mines: usize,
        elapsed_ms: u64,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_parsing() {
        let message: ClientMessage =
            serde_json::from_str(r#"{"action":"reveal","pos":{"row":2,"col":7}}"#).unwrap();
        assert!(matches!(
            message,
            ClientMessage::Reveal {
                pos: Coord { row: 2, col: 7 }
            }
        ));

        let message: ClientMessage =
            serde_json::from_str(r#"{"action":"restart","params":{}}"#).unwrap();
        assert!(matches!(
            message,
            ClientMessage::Restart { params } if params == GameParams::default()
        ));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"mark"}"#).is_err());
    }

    #[test]
    fn test_update_message_shape() {
        let message = ServerMessage::Update {
            updates: vec![CellUpdate {
                pos: Coord { row: 0, col: 1 },
                value: Cell::Flagged,
            }],
            won: false,
            lost: false,
            remaining_mines: 9,
            elapsed_ms: 1500,
        };
        let json: serde_json::Value = serde_json::to_value(&message).unwrap();

        assert_eq!("update", json["type"]);
        assert_eq!("flagged", json["updates"][0]["value"]["state"]);
        assert_eq!(1, json["updates"][0]["pos"]["col"]);
        assert_eq!(9, json["remaining_mines"]);
    }
}
