//! Weather transitions

use crate::events::{Cancellable, ChangeWeatherEvent, WorldEvent};
use crate::mediator::WorldMediator;
use crate::traits::WorldStorage;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;
use worldhook_types::{CauseChain, CauseValue};

/// Ticks per second of game time
const TICKS_PER_SECOND: u64 = 20;

/// World weather
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weather {
    /// No precipitation
    #[default]
    Clear,
    /// Rain
    Rain,
    /// Thunderstorm
    Thunder,
}

impl fmt::Display for Weather {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weather::Clear => write!(f, "clear"),
            Weather::Rain => write!(f, "rain"),
            Weather::Thunder => write!(f, "thunder"),
        }
    }
}

/// Weather bookkeeping of one world
#[derive(Clone, Debug, Default)]
pub struct WeatherClock {
    current: Weather,
    remaining: u64,
    previous: Weather,
    started_at: u64,
    world_time: u64,
}

impl WeatherClock {
    /// Current weather
    pub fn current(&self) -> Weather {
        self.current
    }

    /// Ticks left of the current weather
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Ticks since the current weather started
    pub fn running(&self) -> u64 {
        self.world_time.saturating_sub(self.started_at)
    }

    /// Total world time in ticks
    pub fn world_time(&self) -> u64 {
        self.world_time
    }

    fn set(&mut self, weather: Weather, duration: u64) {
        self.current = weather;
        self.remaining = duration;
    }

    fn advance(&mut self, ticks: u64) {
        self.world_time += ticks;
        self.remaining = self.remaining.saturating_sub(ticks);
    }
}

impl<S: WorldStorage> WorldMediator<S> {
    /// Weather bookkeeping
    pub fn weather(&self) -> &WeatherClock {
        &self.weather
    }

    /// Advance world time
    pub fn advance_time(&mut self, ticks: u64) {
        self.weather.advance(ticks);
    }

    /// Set the weather with a default duration
    ///
    /// Clear weather lasts a random 300 to 900 seconds; other weather lasts
    /// until the host picks a duration.
    pub fn set_weather(&mut self, weather: Weather) {
        let duration = match weather {
            Weather::Clear => rand::thread_rng().gen_range(300..900) * TICKS_PER_SECOND,
            Weather::Rain | Weather::Thunder => 0,
        };
        self.set_weather_for(weather, duration);
    }

    /// Set the weather for `duration` ticks
    pub fn set_weather_for(&mut self, weather: Weather, duration: u64) {
        self.weather.set(weather, duration);
    }

    /// Hook called after the host updated the weather
    ///
    /// A change with a positive remaining duration fires a cancelable
    /// [`ChangeWeatherEvent`]. Cancellation reverts to the previous weather;
    /// otherwise the listener's weather and duration are applied and the
    /// running clock restarts. Returns the weather in effect afterwards.
    pub fn update_weather(&mut self, weather: Weather, remaining: u64) -> Weather {
        self.weather.set(weather, remaining);
        let previous = self.weather.previous;
        if previous == weather || remaining == 0 {
            return self.weather.current;
        }

        let cause = CauseChain::source(CauseValue::World(self.world_id()));
        let mut event = ChangeWeatherEvent::new(cause, previous, weather, remaining);
        self.events.post(WorldEvent::ChangeWeather(&mut event));

        if event.is_cancelled() {
            info!(weather = %weather, previous = %previous, "Weather change cancelled");
            self.set_weather(previous);
        } else {
            self.set_weather_for(event.weather, event.duration);
            self.weather.previous = event.weather;
            self.weather.started_at = self.weather.world_time;
        }
        self.weather.current
    }
}
