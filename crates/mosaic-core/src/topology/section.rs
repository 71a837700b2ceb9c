//! Sections: rectangular regions of the canvas, optionally hosting an app.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::SectionId;

/// Content offset within a client frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offset {
    /// Horizontal offset.
    pub x: i64,
    /// Vertical offset.
    pub y: i64,
}

/// Geometry of a section on one physical client of a space.
///
/// Clients the section does not overlap carry an empty frame (`{}`).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientFrame {
    /// Left edge relative to the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i64>,
    /// Top edge relative to the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i64>,
    /// Visible width.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<i64>,
    /// Visible height.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<i64>,
    /// Content offset when the section starts before the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
}

impl ClientFrame {
    /// Whether the section does not appear on this client.
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none() && self.w.is_none() && self.h.is_none()
    }
}

/// Per-space list of client frames, indexed by client position.
pub type SpaceFrames = BTreeMap<String, Vec<ClientFrame>>;

/// An application deployed into a section.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct App {
    /// Base URL of the application.
    pub url: String,
    /// Serialized application state, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    /// Presentation extras such as `opacity`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl App {
    /// App at `url` with no state.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: None,
            extra: Map::new(),
        }
    }
}

/// A rectangular region of the logical canvas.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Stable slot id.
    pub id: SectionId,
    /// Client frames, normally for exactly one space.
    pub spaces: SpaceFrames,
    /// Deployed application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<App>,
}

impl Section {
    /// The space the section was authored in.
    pub fn space(&self) -> Option<&str> {
        self.spaces.keys().next().map(String::as_str)
    }

    /// URL of the deployed app.
    pub fn app_url(&self) -> Option<&str> {
        self.app.as_ref().map(|a| a.url.as_str())
    }
}
