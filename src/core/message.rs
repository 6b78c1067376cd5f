//! Wire codec for the feed protocol.
//!
//! Every frame is a UTF-8 JSON object `{"type": <tag>, "data": <body>}` (`payload` is accepted
//! in place of `data`). Inbound tags form a closed set; anything else is rejected here and
//! never reaches a subscriber.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sonic_rs::Value;
use thiserror::Error;

use super::frame::{WsFrame, into_ws_frame};
use super::types::{RealtimeError, RealtimeResult};

/// Category of inbound message subscribers register against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Odds,
    Injury,
    LineMovement,
    News,
    Prediction,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Odds,
        Topic::Injury,
        Topic::LineMovement,
        Topic::News,
        Topic::Prediction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Odds => "odds",
            Topic::Injury => "injury",
            Topic::LineMovement => "line_movement",
            Topic::News => "news",
            Topic::Prediction => "prediction",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == s)
            .ok_or_else(|| RealtimeError::InvalidState(format!("unknown topic {s}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OddsUpdate {
    pub event_id: String,
    pub sportsbook: String,
    pub market: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    pub odds: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_odds: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InjuryUpdate {
    pub player_id: String,
    pub player_name: String,
    pub team: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineMovement {
    pub event_id: String,
    pub sportsbook: String,
    pub market: String,
    pub previous_line: f64,
    pub current_line: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl LineMovement {
    pub fn delta(&self) -> f64 {
        self.current_line - self.previous_line
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakingNews {
    pub id: String,
    pub headline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_events: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionUpdate {
    pub event_id: String,
    pub market: String,
    pub predicted_value: f64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
}

/// A validated inbound feed message.
///
/// Serializes back to the canonical `{"type","data"}` wire shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum InboundMessage {
    OddsUpdate(OddsUpdate),
    InjuryUpdate(InjuryUpdate),
    LineMovement(LineMovement),
    BreakingNews(BreakingNews),
    PredictionUpdate(PredictionUpdate),
}

impl InboundMessage {
    pub fn topic(&self) -> Topic {
        match self {
            InboundMessage::OddsUpdate(_) => Topic::Odds,
            InboundMessage::InjuryUpdate(_) => Topic::Injury,
            InboundMessage::LineMovement(_) => Topic::LineMovement,
            InboundMessage::BreakingNews(_) => Topic::News,
            InboundMessage::PredictionUpdate(_) => Topic::Prediction,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::OddsUpdate(_) => "odds_update",
            InboundMessage::InjuryUpdate(_) => "injury_update",
            InboundMessage::LineMovement(_) => "line_movement",
            InboundMessage::BreakingNews(_) => "breaking_news",
            InboundMessage::PredictionUpdate(_) => "prediction_update",
        }
    }

    /// Semantic checks serde cannot express.
    fn guard(&self) -> Result<(), &'static str> {
        match self {
            InboundMessage::OddsUpdate(u) => {
                non_empty(&u.event_id, "eventId")?;
                non_empty(&u.market, "market")?;
                finite(u.odds, "odds")?;
                if let Some(prev) = u.previous_odds {
                    finite(prev, "previousOdds")?;
                }
            }
            InboundMessage::InjuryUpdate(u) => {
                non_empty(&u.player_id, "playerId")?;
                non_empty(&u.status, "status")?;
            }
            InboundMessage::LineMovement(u) => {
                non_empty(&u.event_id, "eventId")?;
                finite(u.previous_line, "previousLine")?;
                finite(u.current_line, "currentLine")?;
            }
            InboundMessage::BreakingNews(u) => {
                non_empty(&u.id, "id")?;
                non_empty(&u.headline, "headline")?;
            }
            InboundMessage::PredictionUpdate(u) => {
                non_empty(&u.event_id, "eventId")?;
                finite(u.predicted_value, "predictedValue")?;
                if !(0.0..=1.0).contains(&u.confidence) {
                    return Err("confidence outside [0, 1]");
                }
            }
        }
        Ok(())
    }

    pub fn to_frame(&self) -> RealtimeResult<WsFrame> {
        let bytes =
            sonic_rs::to_vec(self).map_err(|err| RealtimeError::ParseFailed(err.to_string()))?;
        Ok(into_ws_frame(bytes))
    }
}

fn non_empty(value: &str, field: &'static str) -> Result<(), &'static str> {
    if value.trim().is_empty() {
        return Err(field);
    }
    Ok(())
}

fn finite(value: f64, field: &'static str) -> Result<(), &'static str> {
    if !value.is_finite() {
        return Err(field);
    }
    Ok(())
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireFrame {
    OddsUpdate {
        #[serde(alias = "payload")]
        data: OddsUpdate,
    },
    InjuryUpdate {
        #[serde(alias = "payload")]
        data: InjuryUpdate,
    },
    LineMovement {
        #[serde(alias = "payload")]
        data: LineMovement,
    },
    BreakingNews {
        #[serde(alias = "payload")]
        data: BreakingNews,
    },
    PredictionUpdate {
        #[serde(alias = "payload")]
        data: PredictionUpdate,
    },
    Pong,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(InboundMessage),
    /// Application-level keepalive acknowledgement.
    HeartbeatAck,
}

#[derive(Debug, Error, PartialEq)]
pub enum DecodeError {
    #[error("invalid json frame: {0}")]
    Json(String),
    #[error("{kind} rejected: {reason}")]
    Rejected {
        kind: &'static str,
        reason: &'static str,
    },
}

/// Parse and validate one inbound text/binary payload.
pub fn decode_inbound(bytes: &[u8]) -> Result<Inbound, DecodeError> {
    let wire: WireFrame =
        sonic_rs::from_slice(bytes).map_err(|err| DecodeError::Json(err.to_string()))?;
    let message = match wire {
        WireFrame::OddsUpdate { data } => InboundMessage::OddsUpdate(data),
        WireFrame::InjuryUpdate { data } => InboundMessage::InjuryUpdate(data),
        WireFrame::LineMovement { data } => InboundMessage::LineMovement(data),
        WireFrame::BreakingNews { data } => InboundMessage::BreakingNews(data),
        WireFrame::PredictionUpdate { data } => InboundMessage::PredictionUpdate(data),
        WireFrame::Pong => return Ok(Inbound::HeartbeatAck),
    };
    message.guard().map_err(|reason| DecodeError::Rejected {
        kind: message.kind(),
        reason,
    })?;
    Ok(Inbound::Message(message))
}

/// Application payload written to the socket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Value,
}

impl OutboundMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Keepalive with an empty object body.
    pub fn ping() -> Self {
        Self::new("ping", sonic_rs::json!({}))
    }

    pub fn encode(&self) -> RealtimeResult<WsFrame> {
        let bytes =
            sonic_rs::to_vec(self).map_err(|err| RealtimeError::ParseFailed(err.to_string()))?;
        Ok(WsFrame::Text(bytes.into()))
    }
}
