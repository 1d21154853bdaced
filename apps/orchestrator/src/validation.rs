//! Worker output validators (spec §4.3): structural checks that turn a raw
//! worker response into a domain payload, or reject it as
//! `ErrorKind::Validation` for the dispatcher's retry policy to handle.

use planner_core::contracts::{
    ClassifierResponse, NarratorResponse, ProjectorResponse, RawChartSpec, VisualizerResponse,
};
use planner_core::domain::{ChartSpec, ChartType, ChartsPayload, Milestone, NarrativePayload, ProjectionsPayload};
use planner_core::error::PlannerError;

/// Checks that `text` contains every required heading, case-insensitively,
/// in any order.
pub fn validate_narrative_headings(text: &str, required_headings: &[String]) -> Result<(), PlannerError> {
    let lower = text.to_lowercase();
    for heading in required_headings {
        if !lower.contains(&heading.to_lowercase()) {
            return Err(PlannerError::validation(format!(
                "narrative is missing required heading: {heading}"
            )));
        }
    }
    Ok(())
}

pub fn narrative_payload(response: NarratorResponse, quality_score: u8) -> NarrativePayload {
    NarrativePayload { text: response.text, quality_score }
}

fn parse_chart_type(raw: &str) -> Result<ChartType, PlannerError> {
    match raw {
        "pie" => Ok(ChartType::Pie),
        "donut" => Ok(ChartType::Donut),
        "bar" => Ok(ChartType::Bar),
        "horizontal_bar" => Ok(ChartType::HorizontalBar),
        "line" => Ok(ChartType::Line),
        other => Err(PlannerError::validation(format!("unknown chart type: {other}"))),
    }
}

/// Checks the chart count falls within `[min, max]` and every chart type is
/// one of the five recognized kinds.
pub fn validate_charts(
    response: VisualizerResponse,
    min: usize,
    max: usize,
) -> Result<ChartsPayload, PlannerError> {
    if response.charts.len() < min || response.charts.len() > max {
        return Err(PlannerError::validation(format!(
            "expected between {min} and {max} charts, got {}",
            response.charts.len()
        )));
    }

    let charts = response
        .charts
        .into_iter()
        .map(|raw: RawChartSpec| {
            Ok(ChartSpec {
                title: raw.title,
                chart_type: parse_chart_type(&raw.chart_type)?,
                data: raw.data,
            })
        })
        .collect::<Result<Vec<_>, PlannerError>>()?;

    Ok(ChartsPayload { charts })
}

/// Checks `success_probability` is a valid fraction and at least one
/// milestone was produced.
pub fn validate_projection(response: ProjectorResponse) -> Result<ProjectionsPayload, PlannerError> {
    if !(0.0..=1.0).contains(&response.success_probability) {
        return Err(PlannerError::validation(format!(
            "success_probability out of range: {}",
            response.success_probability
        )));
    }
    if response.milestones.is_empty() {
        return Err(PlannerError::validation("projection has no milestones"));
    }

    Ok(ProjectionsPayload {
        success_probability: response.success_probability,
        milestones: response
            .milestones
            .into_iter()
            .map(|m| Milestone { label: m.label, year: m.year, projected_value: m.projected_value })
            .collect(),
        narrative: response.narrative,
    })
}

/// Checks every returned allocation map is either empty or sums to 100
/// within tolerance (spec §3's `AllocationMap` invariant).
pub fn validate_classification(response: &ClassifierResponse) -> Result<(), PlannerError> {
    for item in &response.items {
        let asset_class = planner_core::domain::AllocationMap::new(item.asset_class_map.clone());
        let region = planner_core::domain::AllocationMap::new(item.region_map.clone());
        let sector = planner_core::domain::AllocationMap::new(item.sector_map.clone());
        if !asset_class.is_valid() || !region.is_valid() || !sector.is_valid() {
            return Err(PlannerError::validation(format!(
                "classifier returned an allocation map that doesn't sum to 100 for {}",
                item.symbol
            )));
        }
    }
    Ok(())
}
