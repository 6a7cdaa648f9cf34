// src/server/dashboard.rs
//
// Server-side first paint of the dashboard. The page then polls
// /traffic_data and /analytics_data to stay current.

use crate::analysis::TrafficState;
use crate::types::{Light, NUM_LANES};

const TEMPLATE: &str = include_str!("../../templates/index.html");

pub fn render(state: &TrafficState) -> String {
    let lanes: String = (0..NUM_LANES).map(|lane| lane_card(state, lane)).collect();

    TEMPLATE
        .replace("{{lanes}}", &lanes)
        .replace("{{timer}}", &state.current_timer.to_string())
        .replace("{{total}}", &state.total_vehicles.to_string())
        .replace("{{priority}}", &(state.priority_lane + 1).to_string())
}

fn lane_card(state: &TrafficState, lane: usize) -> String {
    let light = state.lights[lane];
    let class = match light {
        Light::Green => "green",
        Light::Red => "red",
    };

    format!(
        r#"
      <div class="lane" id="lane-{lane}">
        <h2>Lane {number}</h2>
        <img src="/video_feed/{lane}" alt="Lane {number} feed">
        <div class="light {class}" id="light-{lane}">{label}</div>
        <p>Vehicles: <span id="count-{lane}">{count}</span></p>
        <p>Green time: <span id="time-{lane}">{time}</span>s</p>
      </div>"#,
        lane = lane,
        number = lane + 1,
        class = class,
        label = light.as_str(),
        count = state.lane_counts[lane],
        time = state.signal_times[lane],
    )
}
