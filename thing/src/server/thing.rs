//! Web Thing description and property names

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::storage::settings::ThingSettings;

pub const SNAPSHOT_HREF: &str = "/media/snapshot.jpg";

/// Properties exposed by the camera thing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Property {
    Snapshot,
    Resolution,
    Framerate,
    ExposureMode,
}

impl Property {
    pub const ALL: [Property; 4] = [
        Property::Snapshot,
        Property::Resolution,
        Property::Framerate,
        Property::ExposureMode,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Property::Snapshot => "snapshot",
            Property::Resolution => "resolution",
            Property::Framerate => "framerate",
            Property::ExposureMode => "exposureMode",
        }
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Property::Snapshot)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Property {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Property::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("Unknown property: {}", s))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Link {
    pub rel: String,
    pub href: String,
    #[serde(rename = "mediaType", skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl Link {
    fn new(rel: &str, href: &str) -> Self {
        Self {
            rel: rel.to_string(),
            href: href.to_string(),
            media_type: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PropertyDescription {
    #[serde(rename = "@type", skip_serializing_if = "Option::is_none")]
    pub semantic_type: Option<String>,
    pub title: String,
    #[serde(rename = "type")]
    pub value_type: String,
    #[serde(rename = "readOnly")]
    pub read_only: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    pub links: Vec<Link>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EventDescription {
    pub title: String,
    pub description: String,
}

/// Thing description served at `/`
#[derive(Debug, Clone, Serialize)]
pub struct ThingDescription {
    #[serde(rename = "@context")]
    pub context: String,
    pub id: String,
    pub title: String,
    #[serde(rename = "@type")]
    pub semantic_types: Vec<String>,
    pub description: String,
    pub properties: BTreeMap<String, PropertyDescription>,
    pub events: BTreeMap<String, EventDescription>,
    pub links: Vec<Link>,
}

impl ThingDescription {
    pub fn new(settings: &ThingSettings, snapshot_media_type: &str) -> Self {
        let mut properties = BTreeMap::new();
        for property in Property::ALL {
            properties.insert(
                property.name().to_string(),
                describe(property, snapshot_media_type),
            );
        }

        let mut events = BTreeMap::new();
        events.insert(
            "snapshot".to_string(),
            EventDescription {
                title: "Snapshot".to_string(),
                description: "A new still image was captured".to_string(),
            },
        );

        Self {
            context: "https://webthings.io/schemas/".to_string(),
            id: settings.id.clone(),
            title: settings.title.clone(),
            semantic_types: vec!["Camera".to_string()],
            description: settings.description.clone(),
            properties,
            events,
            links: vec![Link::new("properties", "/properties"), Link::new("events", "/events")],
        }
    }
}

fn describe(property: Property, snapshot_media_type: &str) -> PropertyDescription {
    let href = format!("/properties/{}", property.name());
    match property {
        Property::Snapshot => PropertyDescription {
            semantic_type: Some("ImageProperty".to_string()),
            title: "Snapshot".to_string(),
            value_type: "null".to_string(),
            read_only: true,
            description: Some("Most recent still image".to_string()),
            unit: None,
            minimum: None,
            links: vec![
                Link::new("property", &href),
                Link {
                    rel: "alternate".to_string(),
                    href: SNAPSHOT_HREF.to_string(),
                    media_type: Some(snapshot_media_type.to_string()),
                },
            ],
        },
        Property::Resolution => PropertyDescription {
            semantic_type: None,
            title: "Resolution".to_string(),
            value_type: "string".to_string(),
            read_only: false,
            description: Some("Capture size as WIDTHxHEIGHT".to_string()),
            unit: None,
            minimum: None,
            links: vec![Link::new("property", &href)],
        },
        Property::Framerate => PropertyDescription {
            semantic_type: None,
            title: "Frame rate".to_string(),
            value_type: "number".to_string(),
            read_only: false,
            description: None,
            unit: Some("frames per second".to_string()),
            minimum: Some(0.0),
            links: vec![Link::new("property", &href)],
        },
        Property::ExposureMode => PropertyDescription {
            semantic_type: None,
            title: "Exposure mode".to_string(),
            value_type: "string".to_string(),
            read_only: false,
            description: None,
            unit: None,
            minimum: None,
            links: vec![Link::new("property", &href)],
        },
    }
}
