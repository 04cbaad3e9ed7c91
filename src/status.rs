use chrono::NaiveDate;

use crate::models::LocationProperties;

/// Semantic status of a location, derived from its properties at render
/// time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LocationStatus {
    Complete,
    Incomplete,
    SchedIncomplete,
    Overdue,
    NotProject,
    AutoNew,
    AutoSkipped,
    Unknown,
}

impl LocationStatus {
    pub fn color(&self) -> &'static str {
        match self {
            LocationStatus::Complete => "green",
            LocationStatus::Incomplete => "red",
            LocationStatus::SchedIncomplete => "black",
            LocationStatus::Overdue => "orange",
            LocationStatus::NotProject => "gray",
            LocationStatus::AutoNew => "#ababf8",
            LocationStatus::AutoSkipped => "#c36241",
            LocationStatus::Unknown => "#666666",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            LocationStatus::Complete => "Compleet",
            LocationStatus::Incomplete => "Niet (geheel) aanwezig en niet gepland",
            LocationStatus::SchedIncomplete => "Gepland, nog niet compleet",
            LocationStatus::Overdue => "Gepland, datum verstreken",
            LocationStatus::NotProject => "Geen onderdeel van werkzaamheden",
            LocationStatus::AutoNew => "Nieuw object (automatisch toegevoegd)",
            LocationStatus::AutoSkipped => "Overgeslagen (werk niet mogelijk)",
            LocationStatus::Unknown => "Status onbekend",
        }
    }

    pub fn fill_opacity(&self) -> f64 {
        match self {
            // De-emphasize objects outside the project scope.
            LocationStatus::NotProject => 0.4,
            _ => 0.8,
        }
    }

    /// Legend ordering; also the canonical iteration order.
    pub const ALL: [LocationStatus; 8] = [
        LocationStatus::Complete,
        LocationStatus::Incomplete,
        LocationStatus::SchedIncomplete,
        LocationStatus::Overdue,
        LocationStatus::NotProject,
        LocationStatus::AutoNew,
        LocationStatus::AutoSkipped,
        LocationStatus::Unknown,
    ];
}

/// Classify a location. Pure in its inputs: the same properties and the
/// same `today` always give the same status. `today` only matters for
/// the overdue boundary.
pub fn classify_location(props: &LocationProperties, today: NaiveDate) -> LocationStatus {
    let mut status = match (props.complete, props.planned_date) {
        (Some(true), _) => LocationStatus::Complete,
        (_, Some(planned)) => {
            if planned < today {
                LocationStatus::Overdue
            } else {
                LocationStatus::SchedIncomplete
            }
        }
        (Some(false), None) => LocationStatus::Incomplete,
        (None, None) => LocationStatus::Unknown,
    };

    // Automatically added objects show as such, unless a planned date or
    // completion already says more.
    if matches!(status, LocationStatus::Incomplete | LocationStatus::Unknown) && props.new {
        status = LocationStatus::AutoNew;
    }

    if props.work_impossible {
        status = LocationStatus::AutoSkipped;
    }

    // Final override: the object is not part of the project at all.
    if props.not_part_of_project {
        status = LocationStatus::NotProject;
    }

    status
}

/// Display style for a change request, looked up from its numeric
/// status. The alternate color marks the pre-move half of a move pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestStyle {
    pub label: &'static str,
    pub color: &'static str,
    pub alt_color: &'static str,
    pub fill_opacity: f64,
}

pub const REQUEST_STATUS_OPEN: u8 = 1;
pub const REQUEST_STATUS_ACCEPTED: u8 = 2;
pub const REQUEST_STATUS_REFUSED: u8 = 3;
pub const REQUEST_STATUS_WITHDRAWN: u8 = 4;
pub const REQUEST_STATUS_INVALID: u8 = 5;

pub const REQUEST_TYPE_REMOVE_CODE: u8 = 1;
pub const REQUEST_TYPE_MOVE_LOCATION: u8 = 2;
pub const REQUEST_TYPE_NEW_CODE: u8 = 3;

pub fn request_style(status: u8) -> RequestStyle {
    let (label, color, alt_color) = match status {
        REQUEST_STATUS_OPEN => ("Open", "#33aaff", "#1d6f99"),
        REQUEST_STATUS_ACCEPTED => ("Geaccepteerd", "#119cca", "#0b6a89"),
        REQUEST_STATUS_REFUSED => ("Geweigerd", "#c301fe", "#7a01a0"),
        REQUEST_STATUS_WITHDRAWN => ("Ingetrokken", "#c301fe", "#7a01a0"),
        // Anything out of range renders as an invalid request rather
        // than breaking the layer.
        _ => ("Ongeldig", "#c301fe", "#7a01a0"),
    };
    RequestStyle {
        label,
        color,
        alt_color,
        fill_opacity: 0.8,
    }
}

pub fn request_type_label(req_type: u8) -> &'static str {
    match req_type {
        REQUEST_TYPE_REMOVE_CODE => "Locatiecode verwijderen",
        REQUEST_TYPE_MOVE_LOCATION => "Locatie verplaatsen",
        REQUEST_TYPE_NEW_CODE => "Nieuwe locatiecode",
        _ => "Onbekende aanvraag",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LocationType;

    fn props() -> LocationProperties {
        LocationProperties {
            id: 1,
            loc_type: LocationType::Manhole,
            code: "PUT-001".into(),
            activity: None,
            complete: None,
            planned_date: None,
            not_part_of_project: false,
            new: false,
            work_impossible: false,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2019, 6, 15).unwrap()
    }

    #[test]
    fn test_complete_wins_over_planning_and_new() {
        let mut p = props();
        p.complete = Some(true);
        p.planned_date = NaiveDate::from_ymd_opt(2019, 1, 1);
        p.new = true;
        assert_eq!(classify_location(&p, today()), LocationStatus::Complete);
    }

    #[test]
    fn test_planned_date_in_past_is_overdue() {
        let mut p = props();
        p.planned_date = NaiveDate::from_ymd_opt(2019, 6, 14);
        assert_eq!(classify_location(&p, today()), LocationStatus::Overdue);
    }

    #[test]
    fn test_planned_date_today_or_future_is_scheduled() {
        let mut p = props();
        p.planned_date = Some(today());
        assert_eq!(
            classify_location(&p, today()),
            LocationStatus::SchedIncomplete
        );
        p.planned_date = NaiveDate::from_ymd_opt(2019, 7, 1);
        assert_eq!(
            classify_location(&p, today()),
            LocationStatus::SchedIncomplete
        );
    }

    #[test]
    fn test_planned_date_applies_when_explicitly_incomplete() {
        let mut p = props();
        p.complete = Some(false);
        p.planned_date = NaiveDate::from_ymd_opt(2019, 7, 1);
        assert_eq!(
            classify_location(&p, today()),
            LocationStatus::SchedIncomplete
        );
    }

    #[test]
    fn test_incomplete_without_planning() {
        let mut p = props();
        p.complete = Some(false);
        assert_eq!(classify_location(&p, today()), LocationStatus::Incomplete);
    }

    #[test]
    fn test_new_overrides_incomplete_and_unknown() {
        let mut p = props();
        p.new = true;
        assert_eq!(classify_location(&p, today()), LocationStatus::AutoNew);
        p.complete = Some(false);
        assert_eq!(classify_location(&p, today()), LocationStatus::AutoNew);
    }

    #[test]
    fn test_work_impossible_overrides_completion() {
        let mut p = props();
        p.complete = Some(true);
        p.work_impossible = true;
        assert_eq!(classify_location(&p, today()), LocationStatus::AutoSkipped);

        let mut p = props();
        p.complete = Some(false);
        p.work_impossible = true;
        assert_eq!(classify_location(&p, today()), LocationStatus::AutoSkipped);
    }

    #[test]
    fn test_not_part_of_project_is_final_override() {
        let mut p = props();
        p.complete = Some(true);
        p.work_impossible = true;
        p.new = true;
        p.not_part_of_project = true;
        assert_eq!(classify_location(&p, today()), LocationStatus::NotProject);
    }

    #[test]
    fn test_no_information_is_unknown() {
        assert_eq!(classify_location(&props(), today()), LocationStatus::Unknown);
    }

    #[test]
    fn test_request_style_lookup() {
        assert_eq!(request_style(1).label, "Open");
        assert_eq!(request_style(2).label, "Geaccepteerd");
        assert_eq!(request_style(3).color, request_style(5).color);
        assert_eq!(request_style(0).label, "Ongeldig");
        assert_eq!(request_style(9).label, "Ongeldig");
    }
}
