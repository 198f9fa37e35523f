// weather_summary - Daily weather summaries for a fixed set of cities
//
// Copyright 2022 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use serde::Serialize;

/// Temperature in celsius above which a city is reported by `/api/alerts`.
pub const DEFAULT_THRESHOLD: f64 = 35.0;

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Alert {
    pub city: String,
    pub message: String,
}

/// Return an alert if `celsius` strictly exceeds `threshold`.
pub fn check(city: &str, celsius: f64, threshold: f64) -> Option<Alert> {
    if celsius > threshold {
        Some(Alert {
            city: city.to_owned(),
            message: format!(
                "ALERT: {}'s temperature exceeds {}°C with {:.2}°C",
                city, threshold, celsius
            ),
        })
    } else {
        None
    }
}
