//! Profile → duty translation with change detection

use std::collections::HashMap;

use tracing::{error, info};

use super::store::{Point, SpeedProfile};
use super::{CRITICAL_ENTER, CRITICAL_EXIT, FAN_FLOOR, PUMP_FLOOR};

/// A duty the controller decided to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedTarget {
    pub channel_id: i32,
    pub duty: u8,
    /// Pump mode byte from the curve band (Elite pumps)
    pub pump_mode: u8,
    pub is_pump: bool,
}

/// Linear interpolation over graph points sorted by temperature.
fn interpolate(points: &[Point], t: f64) -> Option<f64> {
    let first = points.first()?;
    let last = points.last()?;
    if t <= first.x {
        return Some(first.y);
    }
    if t >= last.x {
        return Some(last.y);
    }
    points.windows(2).find_map(|w| {
        let (a, b) = (w[0], w[1]);
        if t >= a.x && t <= b.x {
            if (b.x - a.x).abs() < f64::EPSILON {
                Some(b.y)
            } else {
                Some(a.y + (b.y - a.y) * (t - a.x) / (b.x - a.x))
            }
        } else {
            None
        }
    })
}

/// Duty (%) and pump mode for `profile` at `temp`, floors applied.
pub fn duty_for(profile: &SpeedProfile, temp: f64, is_pump: bool, graph: bool) -> (u8, u8) {
    let floor = if is_pump { PUMP_FLOOR } else { FAN_FLOOR };

    let (duty, mode) = if graph {
        let curve = profile
            .points
            .get(if is_pump { 0 } else { 1 })
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let duty = interpolate(curve, temp)
            .map(|d| d.round().clamp(f64::from(FAN_FLOOR), 100.0) as u8)
            .unwrap_or(floor);
        (duty, super::pump_mode::NORMAL)
    } else {
        let band = profile
            .profiles
            .iter()
            .find(|b| b.contains(temp))
            .or_else(|| {
                // Outside every band: clamp to the nearest end
                match profile.profiles.last() {
                    Some(last) if temp > last.max => Some(last),
                    _ => profile.profiles.first(),
                }
            });
        match band {
            Some(b) => (if is_pump { b.pump } else { b.fans }, b.mode),
            None => (floor, super::pump_mode::NORMAL),
        }
    };
    (duty.clamp(floor, 100), mode)
}

/// Emits a duty only when it differs from the last emission for that
/// channel.
#[derive(Debug, Default)]
pub struct Controller {
    graph: bool,
    last: HashMap<i32, String>,
}

impl Controller {
    pub fn new(graph: bool) -> Self {
        Self {
            graph,
            last: HashMap::new(),
        }
    }

    pub fn set_graph(&mut self, graph: bool) {
        if self.graph != graph {
            self.graph = graph;
            self.last.clear();
        }
    }

    /// Evaluate one channel; `None` when nothing changed.
    pub fn evaluate(
        &mut self,
        profile_name: &str,
        profile: &SpeedProfile,
        channel_id: i32,
        is_pump: bool,
        temp: f64,
    ) -> Option<SpeedTarget> {
        let (duty, pump_mode) = duty_for(profile, temp, is_pump, self.graph);
        let key = format!("{profile_name}-{channel_id}-{duty}-{pump_mode}");
        if self.last.get(&channel_id) == Some(&key) {
            return None;
        }
        self.last.insert(channel_id, key);
        Some(SpeedTarget {
            channel_id,
            duty,
            pump_mode,
            is_pump,
        })
    }

    /// Forget every emission so the next tick re-emits all channels.
    pub fn reset(&mut self) {
        self.last.clear();
    }

    /// Forget one channel, e.g. after a manual override or failed write.
    pub fn forget(&mut self, channel_id: i32) {
        self.last.remove(&channel_id);
    }
}

/// Critical liquid temperature state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticalTransition {
    Entered,
    Cleared,
}

/// Hysteresis around the critical liquid temperature.
#[derive(Debug, Default)]
pub struct CriticalGuard {
    active: bool,
}

impl CriticalGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed a liquid temperature; returns a transition when one occurs.
    pub fn update(&mut self, serial: &str, liquid: f64) -> Option<CriticalTransition> {
        if !self.active && liquid >= CRITICAL_ENTER {
            self.active = true;
            error!("{serial}: liquid temperature {liquid:.1} °C is critical, forcing protective profile");
            return Some(CriticalTransition::Entered);
        }
        if self.active && liquid < CRITICAL_EXIT {
            self.active = false;
            info!("{serial}: liquid temperature {liquid:.1} °C back to normal, restoring profile");
            return Some(CriticalTransition::Cleared);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speed::store::{defaults, CRITICAL_PROFILE};

    fn normal() -> SpeedProfile {
        defaults().remove("Normal").unwrap()
    }

    #[test]
    fn test_curve_band_lookup() {
        let p = normal();
        assert_eq!(duty_for(&p, 45.0, false, false), (40, 1));
        assert_eq!(duty_for(&p, 45.0, true, false), (70, 1));
        assert_eq!(duty_for(&p, 75.0, false, false), (85, 2));
        // above the last band max uses the last band
        assert_eq!(duty_for(&p, 250.0, false, false).0, 100);
    }

    #[test]
    fn test_floors() {
        let mut p = normal();
        for b in &mut p.profiles {
            b.fans = 5;
            b.pump = 10;
        }
        assert_eq!(duty_for(&p, 45.0, false, false).0, 20);
        assert_eq!(duty_for(&p, 45.0, true, false).0, 50);
    }

    #[test]
    fn test_graph_interpolates_fans_on_second_curve() {
        let mut p = normal();
        p.points = vec![
            vec![Point { x: 20.0, y: 60.0 }, Point { x: 80.0, y: 100.0 }],
            vec![Point { x: 20.0, y: 10.0 }, Point { x: 80.0, y: 70.0 }],
        ];
        assert_eq!(duty_for(&p, 50.0, false, true).0, 40);
        assert_eq!(duty_for(&p, 50.0, true, true).0, 80);
        // rounding then the [20, 100] clamp
        assert_eq!(duty_for(&p, 20.0, false, true).0, 20);
        assert_eq!(duty_for(&p, 50.4, false, true).0, 40);
    }

    #[test]
    fn test_change_detection() {
        let p = normal();
        let mut c = Controller::new(false);
        assert!(c.evaluate("Normal", &p, 1, false, 45.0).is_some());
        assert!(c.evaluate("Normal", &p, 1, false, 45.0).is_none());
        assert!(c.evaluate("Normal", &p, 1, false, 46.0).is_none());
        assert!(c.evaluate("Normal", &p, 1, false, 55.0).is_some());
        assert!(c.evaluate("Normal", &p, 2, false, 55.0).is_some());
        c.reset();
        assert!(c.evaluate("Normal", &p, 1, false, 55.0).is_some());
    }

    #[test]
    fn test_critical_profile_is_full_speed() {
        let p = defaults().remove(CRITICAL_PROFILE).unwrap();
        assert_eq!(duty_for(&p, 58.0, false, false), (100, 2));
        assert_eq!(duty_for(&p, 58.0, true, false), (100, 2));
    }

    #[test]
    fn test_critical_hysteresis() {
        let mut g = CriticalGuard::new();
        assert_eq!(g.update("S", 50.0), None);
        assert_eq!(g.update("S", 57.0), Some(CriticalTransition::Entered));
        assert_eq!(g.update("S", 60.0), None);
        assert_eq!(g.update("S", 55.0), None);
        assert_eq!(g.update("S", 52.0), None);
        assert_eq!(g.update("S", 51.9), Some(CriticalTransition::Cleared));
        assert_eq!(g.update("S", 51.0), None);
    }
}
