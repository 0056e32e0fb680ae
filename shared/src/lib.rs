use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

pub const WORLD_WIDTH: f64 = 1600.0;
pub const WORLD_HEIGHT: f64 = 900.0;
/// Distance from the bottom edge of the world to the ground line.
pub const GROUND_OFFSET: f64 = 120.0;
pub const COIN_COUNT: usize = 20;

pub const DEFAULT_BUBBLE_RADIUS: f64 = 120.0;
pub const MIN_BUBBLE_RADIUS: f64 = 30.0;
pub const MAX_BUBBLE_RADIUS: f64 = 400.0;
pub const MAX_NAME_CHARS: usize = 32;
pub const MAX_CHAT_CHARS: usize = 500;

/// A coin can be picked up from strictly closer than this.
pub const PICKUP_RADIUS: f64 = 20.0;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct WorldBounds {
    pub w: f64,
    pub h: f64,
    #[serde(rename = "groundY")]
    pub ground_y: f64,
}

impl WorldBounds {
    pub fn new(w: f64, h: f64) -> Self {
        Self {
            w,
            h,
            ground_y: h - GROUND_OFFSET,
        }
    }

    pub fn center(&self) -> (f64, f64) {
        (self.w / 2.0, self.h / 2.0)
    }

    pub fn clamp_x(&self, x: f64) -> f64 {
        x.clamp(0.0, self.w)
    }

    pub fn clamp_y(&self, y: f64) -> f64 {
        y.clamp(0.0, self.h)
    }
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self::new(WORLD_WIDTH, WORLD_HEIGHT)
    }
}

/// Player fields exposed to clients in `state` broadcasts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerView {
    pub id: String,
    pub name: String,
    pub x: f64,
    pub y: f64,
    #[serde(rename = "bubbleRadius")]
    pub bubble_radius: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Coin {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub taken: bool,
}

impl Coin {
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            taken: false,
        }
    }

    pub fn distance_squared_to(&self, x: f64, y: f64) -> f64 {
        let dx = self.x - x;
        let dy = self.y - y;
        dx * dx + dy * dy
    }
}

/// Frames sent from the host to a client.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Welcome {
        id: String,
        world: WorldBounds,
        coins: Vec<Coin>,
    },
    State {
        /// Milliseconds since the Unix epoch.
        t: u64,
        players: Vec<PlayerView>,
        coins: Vec<Coin>,
    },
    Signal {
        from: String,
        data: Value,
    },
}

/// Frames sent from a client to the host.
///
/// Fields are kept as raw JSON values so that a field of the wrong type only
/// invalidates that field and never the whole message.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientMessage {
    Join {
        #[serde(default)]
        name: Option<Value>,
        #[serde(default)]
        x: Option<Value>,
        #[serde(default)]
        y: Option<Value>,
    },
    Update {
        #[serde(default)]
        x: Option<Value>,
        #[serde(default)]
        y: Option<Value>,
        #[serde(default, rename = "bubbleRadius")]
        bubble_radius: Option<Value>,
    },
    Collect {
        #[serde(default, rename = "coinId")]
        coin_id: Option<Value>,
    },
    Signal {
        #[serde(default)]
        to: Option<Value>,
        #[serde(default)]
        data: Value,
    },
    Chat {
        #[serde(default)]
        text: Option<Value>,
    },
}

impl ClientMessage {
    /// Parses a raw frame. Returns `None` for anything that is not a JSON
    /// object with a recognized `type`.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

/// The `data` field of a signal frame, borrowed exactly as the sender wrote it.
///
/// Returns `None` when the field is missing or `null`.
pub fn raw_signal_data(raw: &str) -> Option<&RawValue> {
    #[derive(Deserialize)]
    struct Inbound<'a> {
        #[serde(borrow, default)]
        data: Option<&'a RawValue>,
    }

    serde_json::from_str::<Inbound>(raw).ok()?.data
}

/// Encodes an outbound `signal` frame around an untouched payload.
pub fn encode_signal(from: &str, data: Option<&RawValue>) -> serde_json::Result<String> {
    #[derive(Serialize)]
    struct Outbound<'a> {
        #[serde(rename = "type")]
        kind: &'static str,
        from: &'a str,
        data: Option<&'a RawValue>,
    }

    serde_json::to_string(&Outbound {
        kind: "signal",
        from,
        data,
    })
}

/// Returns the value as a finite number, if it is one.
pub fn as_number(value: &Option<Value>) -> Option<f64> {
    value.as_ref()?.as_f64().filter(|n| n.is_finite())
}

pub fn as_text(value: &Option<Value>) -> Option<&str> {
    value.as_ref()?.as_str()
}

/// Truncates to at most `max` characters without splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
