use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum Geometry {
    Point {
        coordinates: [f64; 2], // (lng, lat)
    },
    LineString {
        coordinates: Vec<[f64; 2]>,
    },
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LocationType {
    Manhole,
    Pipe,
    Drain,
    Point,
}

impl LocationType {
    pub fn label(&self) -> &'static str {
        match self {
            LocationType::Manhole => "Put",
            LocationType::Pipe => "Streng",
            LocationType::Drain => "Kolk",
            LocationType::Point => "",
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct LocationProperties {
    pub id: i64,
    pub loc_type: LocationType,
    pub code: String,
    #[serde(default)]
    pub activity: Option<String>,
    #[serde(default)]
    pub complete: Option<bool>,
    #[serde(default)]
    pub planned_date: Option<NaiveDate>,
    #[serde(default)]
    pub not_part_of_project: bool,
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub work_impossible: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct RequestProperties {
    pub id: i64,
    pub req_type: u8,
    pub status: u8,
    #[serde(default)]
    pub motivation: String,
    /// Marks the pre-move half of a "move location" request pair.
    #[serde(default)]
    pub old: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeatureProperties {
    Location(LocationProperties),
    Request(RequestProperties),
}

impl FeatureProperties {
    pub fn object_type(&self) -> &'static str {
        match self {
            FeatureProperties::Location(_) => "location",
            FeatureProperties::Request(_) => "request",
        }
    }

    pub fn object_id(&self) -> i64 {
        match self {
            FeatureProperties::Location(p) => p.id,
            FeatureProperties::Request(p) => p.id,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Feature {
    pub geometry: Geometry,
    pub properties: FeatureProperties,
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct FeatureCollection {
    #[serde(default)]
    pub features: Vec<Feature>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Extent {
    /// Fallback view when the backend has nothing to show.
    pub fn fallback() -> Self {
        Extent {
            top: 53.0,
            bottom: 51.5,
            left: 4.5,
            right: 4.9,
        }
    }
}

/// Per-project feature sets as served by the backend: one collection per
/// activity, with change requests under the reserved "Aanvragen" key.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ProjectFeatures {
    #[serde(default)]
    pub activities: BTreeMap<String, FeatureCollection>,
    #[serde(default)]
    pub extent: Option<Extent>,
}

pub const REQUESTS_LAYER: &str = "Aanvragen";

/// Response of the backend's closest-feature search. An empty object
/// (no `html`) means nothing was found near the given point.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct ClosestResponse {
    #[serde(default)]
    pub html: Vec<String>,
    #[serde(default)]
    pub tab_titles: Vec<String>,
    #[serde(default, rename = "objIds")]
    pub obj_ids: Vec<i64>,
    #[serde(default)]
    pub latlng: Vec<[f64; 2]>, // (lat, lng)
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct UploadedFile {
    pub id: i64,
    pub filename: String,
    pub uploaded_by: String,
    pub uploaded_at: String,
    pub ready: bool,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_url: Option<String>,
    pub delete_url: String,
}

/// Deep-link input: a single feature of interest supplied by the caller
/// instead of a mouse click.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ObjectOfInterest {
    pub geometry: Geometry,
    pub properties: ObjectRef,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ObjectRef {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: i64,
}
