use chrono::NaiveDate;
use serde::Serialize;

use crate::legend::{build_legend, LegendModel, ObservedStyles};
use crate::models::{
    Extent, Feature, FeatureProperties, Geometry, LocationProperties, ProjectFeatures,
    RequestProperties, REQUESTS_LAYER,
};
use crate::status::{
    classify_location, request_style, request_type_label, REQUEST_TYPE_MOVE_LOCATION,
};
use crate::utils::sanitize_motivation;
use crate::views::html_escape;

/// Sideways nudge applied to location points, scaled by the index of
/// their activity, so markers from different activities on the same
/// coordinate stay individually clickable. Well below real-world
/// object separation (4e-6 deg is roughly 0.4 m).
const ACTIVITY_NUDGE_DEG: f64 = 4e-6;

/// Change requests sit close to the location they concern; 5e-7 deg is
/// approx 5.6 cm.
const REQUEST_NUDGE_DEG: f64 = 5e-7;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MarkerStyle {
    pub color: String,
    pub fill_color: String,
    pub fill_opacity: f64,
    pub weight: u32,
    pub radius: u32,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MarkerModel {
    Circle {
        lat: f64,
        lng: f64,
        style: MarkerStyle,
        tooltip: String,
        obj_type: String,
        obj_id: i64,
    },
    Square {
        lat: f64,
        lng: f64,
        style: MarkerStyle,
        tooltip: String,
        obj_type: String,
        obj_id: i64,
    },
    Line {
        points: Vec<[f64; 2]>, // (lat, lng)
        style: MarkerStyle,
        tooltip: String,
        obj_type: String,
        obj_id: i64,
    },
}

#[derive(Serialize, Debug, Clone)]
pub struct OverlayModel {
    pub name: String,
    pub markers: Vec<MarkerModel>,
}

#[derive(Debug, Clone)]
pub enum RenderedMap {
    Document {
        /// Overlays in paint order, back to front.
        layers: Vec<OverlayModel>,
        legend: LegendModel,
        extent: Extent,
    },
    /// Nothing to show; the page gets a placeholder instead of an empty
    /// interactive map.
    NoData { extent: Extent },
}

/// Build the full map document for one project. Pure apart from `today`,
/// which the caller fixes per render.
pub fn render(project: &ProjectFeatures, today: NaiveDate, requests_on_top: bool) -> RenderedMap {
    let extent = match (project.activities.is_empty(), project.extent) {
        (false, Some(extent)) => extent,
        _ => return RenderedMap::NoData {
            extent: Extent::fallback(),
        },
    };

    let mut observed = ObservedStyles::new();
    let mut layers = Vec::new();
    let mut request_layer = None;

    let mut activity_index = 0usize;
    for (name, collection) in &project.activities {
        if name == REQUESTS_LAYER {
            request_layer = Some(render_requests(collection, &mut observed));
            continue;
        }
        layers.push(render_activity(
            name,
            collection,
            today,
            activity_index,
            &mut observed,
        ));
        activity_index += 1;
    }

    if let Some(layer) = request_layer {
        // Request markers must not permanently obscure location markers
        // (or vice versa); configuration decides which side loses.
        if requests_on_top {
            layers.push(layer);
        } else {
            layers.insert(0, layer);
        }
    }

    RenderedMap::Document {
        layers,
        legend: build_legend(&observed),
        extent,
    }
}

/// Canvas rendering makes points under lines nearly unclickable, so
/// lines paint first.
fn geometry_rank(geometry: &Geometry) -> u8 {
    match geometry {
        Geometry::LineString { .. } => 0,
        Geometry::Point { .. } => 10,
    }
}

fn sorted_for_rendering(collection: &[Feature]) -> Vec<&Feature> {
    let mut features: Vec<&Feature> = collection.iter().collect();
    // sort_by_key is stable; equal ranks keep their original order.
    features.sort_by_key(|f| geometry_rank(&f.geometry));
    features
}

fn render_activity(
    name: &str,
    collection: &crate::models::FeatureCollection,
    today: NaiveDate,
    activity_index: usize,
    observed: &mut ObservedStyles,
) -> OverlayModel {
    let nudge = activity_index as f64 * ACTIVITY_NUDGE_DEG;
    let markers = sorted_for_rendering(&collection.features)
        .into_iter()
        .filter_map(|feature| match &feature.properties {
            FeatureProperties::Location(props) => {
                Some(location_marker(&feature.geometry, props, today, nudge, observed))
            }
            // A request feature inside an activity collection is a
            // backend mistake; skip it rather than mislabel it.
            FeatureProperties::Request(_) => None,
        })
        .collect();

    OverlayModel {
        name: name.to_string(),
        markers,
    }
}

fn location_marker(
    geometry: &Geometry,
    props: &LocationProperties,
    today: NaiveDate,
    nudge: f64,
    observed: &mut ObservedStyles,
) -> MarkerModel {
    let status = classify_location(props, today);
    observed.record_location(status);

    let style = MarkerStyle {
        color: status.color().to_string(),
        fill_color: status.color().to_string(),
        fill_opacity: status.fill_opacity(),
        weight: 1,
        radius: 4,
    };
    let tooltip = location_tooltip(props);

    match geometry {
        Geometry::Point { coordinates } => MarkerModel::Circle {
            lat: coordinates[1] + nudge,
            lng: coordinates[0] + nudge,
            style,
            tooltip,
            obj_type: "location".to_string(),
            obj_id: props.id,
        },
        Geometry::LineString { coordinates } => MarkerModel::Line {
            points: coordinates.iter().map(|c| [c[1], c[0]]).collect(),
            style: MarkerStyle {
                weight: 3,
                ..style
            },
            tooltip,
            obj_type: "location".to_string(),
            obj_id: props.id,
        },
    }
}

fn render_requests(
    collection: &crate::models::FeatureCollection,
    observed: &mut ObservedStyles,
) -> OverlayModel {
    let markers = collection
        .features
        .iter()
        .filter_map(|feature| match &feature.properties {
            FeatureProperties::Request(props) => {
                Some(request_marker(&feature.geometry, props, observed))
            }
            FeatureProperties::Location(_) => None,
        })
        .collect();

    OverlayModel {
        name: REQUESTS_LAYER.to_string(),
        markers,
    }
}

fn request_marker(
    geometry: &Geometry,
    props: &RequestProperties,
    observed: &mut ObservedStyles,
) -> MarkerModel {
    let base = request_style(props.status);
    observed.record_request_color(base.color);

    // The origin point of a move renders as an outline in the alternate
    // color, so both halves of the pair stay distinguishable.
    let is_old_move = props.old && props.req_type == REQUEST_TYPE_MOVE_LOCATION;
    let color = if is_old_move { base.alt_color } else { base.color };
    let style = MarkerStyle {
        color: color.to_string(),
        fill_color: color.to_string(),
        fill_opacity: if is_old_move { 0.0 } else { base.fill_opacity },
        weight: 3,
        radius: 4,
    };
    let tooltip = request_tooltip(props);

    match geometry {
        Geometry::Point { coordinates } => MarkerModel::Square {
            lat: coordinates[1] + REQUEST_NUDGE_DEG,
            lng: coordinates[0] + REQUEST_NUDGE_DEG,
            style,
            tooltip,
            obj_type: "request".to_string(),
            obj_id: props.id,
        },
        Geometry::LineString { coordinates } => MarkerModel::Line {
            points: coordinates.iter().map(|c| [c[1], c[0]]).collect(),
            style,
            tooltip,
            obj_type: "request".to_string(),
            obj_id: props.id,
        },
    }
}

fn location_tooltip(props: &LocationProperties) -> String {
    format!("{} {}", props.loc_type.label(), html_escape(&props.code))
        .trim_start()
        .to_string()
}

fn request_tooltip(props: &RequestProperties) -> String {
    let style = request_style(props.status);
    let mut tooltip = format!(
        "Aanvraag: {}<br>{}",
        request_type_label(props.req_type),
        style.label
    );
    let motivation = sanitize_motivation(&props.motivation);
    if !motivation.is_empty() {
        tooltip.push_str("<br>");
        tooltip.push_str(&html_escape(&motivation).replace('\n', "<br>"));
    }
    tooltip
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FeatureCollection, LocationType};
    use std::collections::BTreeMap;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 6, 15).unwrap()
    }

    fn point(lng: f64, lat: f64) -> Geometry {
        Geometry::Point {
            coordinates: [lng, lat],
        }
    }

    fn line() -> Geometry {
        Geometry::LineString {
            coordinates: vec![[4.5, 52.0], [4.6, 52.1]],
        }
    }

    fn location(id: i64, geometry: Geometry) -> Feature {
        Feature {
            geometry,
            properties: FeatureProperties::Location(LocationProperties {
                id,
                loc_type: LocationType::Manhole,
                code: format!("PUT-{id:03}"),
                activity: None,
                complete: Some(true),
                planned_date: None,
                not_part_of_project: false,
                new: false,
                work_impossible: false,
            }),
        }
    }

    fn request(id: i64, status: u8, req_type: u8, old: bool) -> Feature {
        Feature {
            geometry: point(4.5, 52.0),
            properties: FeatureProperties::Request(RequestProperties {
                id,
                req_type,
                status,
                motivation: String::new(),
                old,
            }),
        }
    }

    fn project(activities: Vec<(&str, Vec<Feature>)>) -> ProjectFeatures {
        ProjectFeatures {
            activities: activities
                .into_iter()
                .map(|(name, features)| (name.to_string(), FeatureCollection { features }))
                .collect::<BTreeMap<_, _>>(),
            extent: Some(Extent {
                top: 52.2,
                bottom: 51.9,
                left: 4.4,
                right: 4.7,
            }),
        }
    }

    fn marker_ids(layer: &OverlayModel) -> Vec<i64> {
        layer
            .markers
            .iter()
            .map(|m| match m {
                MarkerModel::Circle { obj_id, .. }
                | MarkerModel::Square { obj_id, .. }
                | MarkerModel::Line { obj_id, .. } => *obj_id,
            })
            .collect()
    }

    #[test]
    fn test_empty_project_is_no_data() {
        let rendered = render(&ProjectFeatures::default(), today(), false);
        match rendered {
            RenderedMap::NoData { extent } => assert_eq!(extent, Extent::fallback()),
            RenderedMap::Document { .. } => panic!("expected the no-data branch"),
        }
    }

    #[test]
    fn test_missing_extent_is_no_data() {
        let mut p = project(vec![("Riolering", vec![location(1, point(4.5, 52.0))])]);
        p.extent = None;
        assert!(matches!(
            render(&p, today(), false),
            RenderedMap::NoData { .. }
        ));
    }

    #[test]
    fn test_lines_render_before_points_stably() {
        let p = project(vec![(
            "Riolering",
            vec![
                location(1, point(4.5, 52.0)),
                location(2, line()),
                location(3, point(4.6, 52.0)),
                location(4, line()),
            ],
        )]);
        let RenderedMap::Document { layers, .. } = render(&p, today(), false) else {
            panic!("expected a document");
        };
        assert_eq!(marker_ids(&layers[0]), vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_activity_nudge_scales_with_index() {
        let p = project(vec![
            ("Eerste", vec![location(1, point(4.5, 52.0))]),
            ("Tweede", vec![location(2, point(4.5, 52.0))]),
        ]);
        let RenderedMap::Document { layers, .. } = render(&p, today(), false) else {
            panic!("expected a document");
        };
        let MarkerModel::Circle { lat: lat0, .. } = &layers[0].markers[0] else {
            panic!("expected a circle");
        };
        let MarkerModel::Circle { lat: lat1, .. } = &layers[1].markers[0] else {
            panic!("expected a circle");
        };
        assert_eq!(*lat0, 52.0);
        assert!((lat1 - 52.0 - ACTIVITY_NUDGE_DEG).abs() < 1e-12);
    }

    #[test]
    fn test_requests_layer_goes_to_the_back_by_default() {
        let p = project(vec![
            ("Riolering", vec![location(1, point(4.5, 52.0))]),
            (REQUESTS_LAYER, vec![request(9, 1, 1, false)]),
        ]);
        let RenderedMap::Document { layers, .. } = render(&p, today(), false) else {
            panic!("expected a document");
        };
        assert_eq!(layers[0].name, REQUESTS_LAYER);
        assert_eq!(layers[1].name, "Riolering");
    }

    #[test]
    fn test_requests_layer_on_top_when_configured() {
        let p = project(vec![
            ("Riolering", vec![location(1, point(4.5, 52.0))]),
            (REQUESTS_LAYER, vec![request(9, 1, 1, false)]),
        ]);
        let RenderedMap::Document { layers, .. } = render(&p, today(), true) else {
            panic!("expected a document");
        };
        assert_eq!(layers.last().unwrap().name, REQUESTS_LAYER);
    }

    #[test]
    fn test_legend_reflects_only_observed_statuses() {
        let mut incomplete = location(1, point(4.5, 52.0));
        if let FeatureProperties::Location(props) = &mut incomplete.properties {
            props.complete = Some(false);
        }
        let p = project(vec![("Riolering", vec![incomplete])]);
        let RenderedMap::Document { legend, .. } = render(&p, today(), false) else {
            panic!("expected a document");
        };
        let labels: Vec<&str> = legend.locations.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Niet (geheel) aanwezig en niet gepland"]);
        assert!(legend.requests.is_empty());
    }

    #[test]
    fn test_old_move_request_renders_as_outline() {
        let p = project(vec![(REQUESTS_LAYER, vec![request(9, 1, 2, true)])]);
        let RenderedMap::Document { layers, .. } = render(&p, today(), false) else {
            panic!("expected a document");
        };
        let MarkerModel::Square { style, .. } = &layers[0].markers[0] else {
            panic!("expected a square");
        };
        assert_eq!(style.fill_opacity, 0.0);
        assert_eq!(style.color, "#1d6f99");
    }

    #[test]
    fn test_request_tooltip_sanitizes_motivation() {
        let props = RequestProperties {
            id: 1,
            req_type: 1,
            status: 1,
            motivation: "deksel <kapot> & verzakt".to_string(),
            old: false,
        };
        let tooltip = request_tooltip(&props);
        assert!(tooltip.contains("Aanvraag: Locatiecode verwijderen"));
        assert!(tooltip.contains("deksel <br>kapot<br>"));
        assert!(!tooltip.contains("<kapot>"));
    }
}
