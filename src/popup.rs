use serde::Serialize;

use crate::models::{ClosestResponse, Geometry, ObjectOfInterest};

/// Parameters of one closest-feature search against the backend.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ClosestQuery {
    pub lat: f64,
    pub lng: f64,
    pub obj_type: Option<String>,
    pub obj_id: Option<i64>,
    /// Names of the overlays currently visible; scopes the backend
    /// search to what the user can actually see.
    pub overlays: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PopupTab {
    pub title: String,
    pub html: String,
    pub obj_id: Option<i64>,
    pub latlng: Option<[f64; 2]>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PopupView {
    NothingFound,
    Single {
        html: String,
        latlng: Option<[f64; 2]>,
    },
    Tabbed {
        tabs: Vec<PopupTab>,
        active: usize,
    },
}

/// Assemble the popup view from a backend response. One fragment renders
/// bare; several become tabs, initially opened on the tab whose object
/// was hovered before the click.
pub fn assemble(resp: &ClosestResponse, hover_id: Option<i64>) -> PopupView {
    if resp.html.is_empty() {
        return PopupView::NothingFound;
    }
    if resp.html.len() == 1 {
        return PopupView::Single {
            html: resp.html[0].clone(),
            latlng: resp.latlng.first().copied(),
        };
    }

    let tabs = resp
        .html
        .iter()
        .enumerate()
        .map(|(i, html)| PopupTab {
            title: localize_title(resp.tab_titles.get(i).map_or("", String::as_str)),
            html: html.clone(),
            obj_id: resp.obj_ids.get(i).copied(),
            latlng: resp.latlng.get(i).copied(),
        })
        .collect();

    let active = hover_id
        .and_then(|id| resp.obj_ids.iter().position(|&o| o == id))
        .unwrap_or(0);

    PopupView::Tabbed { tabs, active }
}

/// Backend tab titles carry raw location-type names.
fn localize_title(title: &str) -> String {
    title
        .replace("manhole", "Put")
        .replace("pipe", "Streng")
        .replace("drain", "Kolk")
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum PopupState {
    #[default]
    Idle,
    Querying {
        /// Hover hint captured when the query was issued.
        hint: Option<i64>,
    },
    Showing(PopupView),
}

/// Per-map-instance context: the hovered feature and the popup state.
/// One session per mounted map, so multiple maps never share state.
#[derive(Debug, Default)]
pub struct MapSession {
    hover: Option<(String, i64)>,
    state: PopupState,
}

impl MapSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hover_enter(&mut self, obj_type: &str, obj_id: i64) {
        self.hover = Some((obj_type.to_string(), obj_id));
    }

    pub fn hover_leave(&mut self) {
        self.hover = None;
    }

    pub fn state(&self) -> &PopupState {
        &self.state
    }

    /// Map click: build the closest-feature query, biased by the feature
    /// hovered at click time.
    pub fn click(&mut self, lat: f64, lng: f64, overlays: Vec<String>) -> ClosestQuery {
        let hint = self.hover.as_ref().map(|(_, id)| *id);
        self.state = PopupState::Querying { hint };
        ClosestQuery {
            lat,
            lng,
            obj_type: self.hover.as_ref().map(|(t, _)| t.clone()),
            obj_id: hint,
            overlays,
        }
    }

    /// Deep-link entry point: the caller supplies the feature instead of
    /// a mouse event; the query is otherwise the same.
    pub fn focus(&mut self, object: &ObjectOfInterest, overlays: Vec<String>) -> ClosestQuery {
        let [lng, lat] = first_coordinate(&object.geometry);
        self.state = PopupState::Querying {
            hint: Some(object.properties.id),
        };
        ClosestQuery {
            lat,
            lng,
            obj_type: Some(object.properties.object_type.clone()),
            obj_id: Some(object.properties.id),
            overlays,
        }
    }

    pub fn resolve(&mut self, resp: &ClosestResponse) -> &PopupView {
        let hint = match &self.state {
            PopupState::Querying { hint } => *hint,
            // A response without an outstanding query still renders; the
            // hover hint is simply absent.
            _ => None,
        };
        self.state = PopupState::Showing(assemble(resp, hint));
        match &self.state {
            PopupState::Showing(view) => view,
            _ => unreachable!(),
        }
    }

    /// Transport failure: drop back to idle, the map stays interactive.
    pub fn fail(&mut self) {
        self.state = PopupState::Idle;
    }
}

fn first_coordinate(geometry: &Geometry) -> [f64; 2] {
    match geometry {
        Geometry::Point { coordinates } => *coordinates,
        Geometry::LineString { coordinates } => coordinates.first().copied().unwrap_or([0.0, 0.0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObjectRef;

    fn response(n: usize) -> ClosestResponse {
        ClosestResponse {
            html: (0..n).map(|i| format!("<p>detail {i}</p>")).collect(),
            tab_titles: (0..n).map(|i| format!("manhole {i}")).collect(),
            obj_ids: (0..n as i64).map(|i| 100 + i).collect(),
            latlng: (0..n).map(|i| [52.0 + i as f64, 4.5]).collect(),
        }
    }

    #[test]
    fn test_empty_response_is_nothing_found() {
        assert_eq!(
            assemble(&ClosestResponse::default(), None),
            PopupView::NothingFound
        );
    }

    #[test]
    fn test_single_fragment_renders_without_tabs() {
        let view = assemble(&response(1), Some(100));
        assert_eq!(
            view,
            PopupView::Single {
                html: "<p>detail 0</p>".to_string(),
                latlng: Some([52.0, 4.5]),
            }
        );
    }

    #[test]
    fn test_multiple_fragments_render_as_tabs() {
        let PopupView::Tabbed { tabs, active } = assemble(&response(3), None) else {
            panic!("expected tabs");
        };
        assert_eq!(tabs.len(), 3);
        assert_eq!(active, 0);
        assert_eq!(tabs[1].title, "Put 1");
        assert_eq!(tabs[2].obj_id, Some(102));
    }

    #[test]
    fn test_hovered_object_selects_initial_tab() {
        let PopupView::Tabbed { active, .. } = assemble(&response(3), Some(101)) else {
            panic!("expected tabs");
        };
        assert_eq!(active, 1);
    }

    #[test]
    fn test_unknown_hover_falls_back_to_first_tab() {
        let PopupView::Tabbed { active, .. } = assemble(&response(3), Some(999)) else {
            panic!("expected tabs");
        };
        assert_eq!(active, 0);
    }

    #[test]
    fn test_click_captures_hover_hint() {
        let mut session = MapSession::new();
        session.hover_enter("location", 101);
        let query = session.click(52.0, 4.5, vec!["Riolering".to_string()]);
        assert_eq!(query.obj_type.as_deref(), Some("location"));
        assert_eq!(query.obj_id, Some(101));
        assert_eq!(query.overlays, vec!["Riolering".to_string()]);
        assert!(matches!(
            session.state(),
            PopupState::Querying { hint: Some(101) }
        ));

        let view = session.resolve(&response(3));
        assert!(matches!(view, PopupView::Tabbed { active: 1, .. }));
    }

    #[test]
    fn test_click_without_hover_has_no_hint() {
        let mut session = MapSession::new();
        session.hover_enter("location", 101);
        session.hover_leave();
        let query = session.click(52.0, 4.5, vec![]);
        assert_eq!(query.obj_id, None);
        assert_eq!(query.obj_type, None);
    }

    #[test]
    fn test_transport_failure_returns_to_idle() {
        let mut session = MapSession::new();
        session.click(52.0, 4.5, vec![]);
        session.fail();
        assert_eq!(*session.state(), PopupState::Idle);
    }

    #[test]
    fn test_focus_swaps_coordinates_and_carries_the_object() {
        let object = ObjectOfInterest {
            geometry: Geometry::Point {
                coordinates: [4.5, 52.0],
            },
            properties: ObjectRef {
                object_type: "location".to_string(),
                id: 101,
            },
        };
        let mut session = MapSession::new();
        let query = session.focus(&object, vec!["Riolering".to_string()]);
        assert_eq!(query.lat, 52.0);
        assert_eq!(query.lng, 4.5);
        assert_eq!(query.obj_id, Some(101));
        assert_eq!(query.obj_type.as_deref(), Some("location"));

        let view = session.resolve(&response(1));
        assert!(matches!(view, PopupView::Single { .. }));
    }
}
