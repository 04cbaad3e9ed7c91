use serde::Serialize;
use std::collections::BTreeSet;

use crate::status::{request_style, LocationStatus, REQUEST_STATUS_ACCEPTED, REQUEST_STATUS_OPEN};

/// Styles actually used while building the current map. Reset per build,
/// filled by the renderer, read once by `build_legend`. Owning it per
/// build keeps concurrent map builds from seeing each other's entries.
#[derive(Debug, Default)]
pub struct ObservedStyles {
    location_statuses: BTreeSet<LocationStatus>,
    request_colors: BTreeSet<&'static str>,
}

impl ObservedStyles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_location(&mut self, status: LocationStatus) {
        self.location_statuses.insert(status);
    }

    pub fn record_request_color(&mut self, color: &'static str) {
        self.request_colors.insert(color);
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct LegendRow {
    pub label: String,
    pub color: String,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct LegendModel {
    pub locations: Vec<LegendRow>,
    pub requests: Vec<LegendRow>,
}

/// Build the legend from what the render pass actually used. Statuses
/// that never appeared get no row.
pub fn build_legend(observed: &ObservedStyles) -> LegendModel {
    let locations = LocationStatus::ALL
        .iter()
        .filter(|status| observed.location_statuses.contains(status))
        .map(|status| LegendRow {
            label: status.label().to_string(),
            color: status.color().to_string(),
        })
        .collect();

    // Canonical request legend: the three refused-like statuses share a
    // color and collapse into one row.
    let canonical = [
        ("Open", request_style(REQUEST_STATUS_OPEN).color),
        ("Geaccepteerd", request_style(REQUEST_STATUS_ACCEPTED).color),
        (
            "Geweigerd / ingetrokken / ongeldig",
            request_style(crate::status::REQUEST_STATUS_REFUSED).color,
        ),
    ];
    let requests = canonical
        .iter()
        .filter(|(_, color)| observed.request_colors.contains(color))
        .map(|(label, color)| LegendRow {
            label: (*label).to_string(),
            color: (*color).to_string(),
        })
        .collect();

    LegendModel {
        locations,
        requests,
    }
}

/// Index of the next base-map provider, wrapping around the configured
/// list. The active tile layer is replaced; overlays are untouched.
pub fn next_provider(current: usize, count: usize) -> usize {
    if count == 0 {
        0
    } else {
        (current + 1) % count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legend_contains_only_observed_statuses() {
        let mut observed = ObservedStyles::new();
        observed.record_location(LocationStatus::Complete);
        observed.record_location(LocationStatus::Overdue);

        let legend = build_legend(&observed);
        let labels: Vec<&str> = legend.locations.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Compleet", "Gepland, datum verstreken"]
        );
        assert!(legend.requests.is_empty());
    }

    #[test]
    fn test_request_section_collapses_refused_group() {
        let mut observed = ObservedStyles::new();
        observed.record_request_color(request_style(4).color);

        let legend = build_legend(&observed);
        assert!(legend.locations.is_empty());
        assert_eq!(legend.requests.len(), 1);
        assert_eq!(legend.requests[0].label, "Geweigerd / ingetrokken / ongeldig");
    }

    #[test]
    fn test_request_rows_keep_canonical_order() {
        let mut observed = ObservedStyles::new();
        observed.record_request_color(request_style(5).color);
        observed.record_request_color(request_style(1).color);

        let legend = build_legend(&observed);
        let labels: Vec<&str> = legend.requests.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Open", "Geweigerd / ingetrokken / ongeldig"]);
    }

    #[test]
    fn test_empty_build_gives_empty_legend() {
        let legend = build_legend(&ObservedStyles::new());
        assert!(legend.locations.is_empty());
        assert!(legend.requests.is_empty());
    }

    #[test]
    fn test_provider_cycling_wraps() {
        assert_eq!(next_provider(0, 3), 1);
        assert_eq!(next_provider(2, 3), 0);
        assert_eq!(next_provider(0, 0), 0);
    }
}
