//! Line chart of one bound field.

use serde::{Deserialize, Serialize};

use crate::data::{DataValue, ValueMap};
use crate::extra_object::{ExtraObject, ExtraObjectCore, ExtraObjectParameter, ModelParameterBase};
use crate::scene_graph::ObjectKind;

fn default_capacity() -> usize {
    64
}

fn default_width() -> f32 {
    1.0
}

fn default_height() -> f32 {
    0.5
}

/// Fixed-capacity history of samples.
/// Samples are stored in a ring buffer, oldest samples are discarded when full.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueSeries {
    capacity: usize,
    samples: Vec<f64>,
    cursor: usize, // Write position in ring buffer
    count: usize,  // Number of valid samples (up to capacity)
}

impl ValueSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            samples: vec![0.0; capacity],
            cursor: 0,
            count: 0,
        }
    }

    pub fn push(&mut self, value: f64) {
        self.samples[self.cursor] = value;
        self.cursor = (self.cursor + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Samples from oldest to newest.
    pub fn ordered(&self) -> impl Iterator<Item = f64> + '_ {
        let start = if self.count < self.capacity {
            0
        } else {
            self.cursor
        };
        (0..self.count).map(move |i| self.samples[(start + i) % self.capacity])
    }

    pub fn latest(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        Some(self.samples[(self.cursor + self.capacity - 1) % self.capacity])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartParameter {
    #[serde(flatten)]
    pub base: ModelParameterBase,

    /// Bound field plotted by the chart.
    #[serde(default)]
    pub field: String,

    #[serde(default = "default_capacity")]
    pub capacity: usize,

    #[serde(default = "default_width")]
    pub width: f32,

    #[serde(default = "default_height")]
    pub height: f32,

    /// Fixed vertical range. Derived from the samples when absent.
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Default for ChartParameter {
    fn default() -> Self {
        Self {
            base: ModelParameterBase::default(),
            field: String::new(),
            capacity: default_capacity(),
            width: default_width(),
            height: default_height(),
            min: None,
            max: None,
        }
    }
}

pub struct ChartObject {
    core: ExtraObjectCore,
    parameter: ChartParameter,
    series: ValueSeries,
}

impl ChartObject {
    pub fn new(param: ExtraObjectParameter, parameter: ChartParameter) -> Self {
        let kind = ObjectKind::Panel {
            width: parameter.width,
            height: parameter.height,
        };
        let mut core = ExtraObjectCore::new(param, kind, &parameter.base);
        core.mark_loaded();
        Self {
            core,
            series: ValueSeries::new(parameter.capacity),
            parameter,
        }
    }

    pub fn series(&self) -> &ValueSeries {
        &self.series
    }

    /// Chart-space points, oldest first, spread over the panel size.
    pub fn points(&self) -> Vec<[f32; 2]> {
        let (min, max) = self.range();
        let span = if max > min { max - min } else { 1.0 };
        let steps = (self.series.len().max(2) - 1) as f32;
        self.series
            .ordered()
            .enumerate()
            .map(|(i, v)| {
                let x = i as f32 / steps * self.parameter.width;
                let y = ((v - min) / span) as f32 * self.parameter.height;
                [x, y]
            })
            .collect()
    }

    fn range(&self) -> (f64, f64) {
        let observed = self
            .series
            .ordered()
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
                None => Some((v, v)),
            })
            .unwrap_or((0.0, 1.0));
        (
            self.parameter.min.unwrap_or(observed.0),
            self.parameter.max.unwrap_or(observed.1),
        )
    }
}

impl ExtraObject for ChartObject {
    fn core(&self) -> &ExtraObjectCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ExtraObjectCore {
        &mut self.core
    }

    fn on_values_updated(&mut self, values: &ValueMap) {
        let sample = match values.get(&self.parameter.field) {
            Some(DataValue::Number(n)) => Some(*n),
            Some(DataValue::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            Some(DataValue::Text(s)) => s.trim().parse().ok(),
            None => None,
        };
        match sample {
            Some(value) => self.series.push(value),
            None => log::debug!(
                "Chart '{}' has no numeric '{}' in this update",
                self.core.name(),
                self.parameter.field
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::headless_parameter;

    #[test]
    fn test_series_ring_buffer() {
        let mut series = ValueSeries::new(3);
        series.push(1.0);
        series.push(2.0);
        assert_eq!(series.len(), 2);
        series.push(3.0);
        series.push(4.0);
        assert_eq!(series.len(), 3);
        assert_eq!(series.ordered().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(series.latest(), Some(4.0));

        series.clear();
        assert!(series.is_empty());
        assert_eq!(series.latest(), None);
    }

    #[test]
    fn test_chart_records_bound_field() {
        let parameter = ChartParameter {
            field: "temperature".to_string(),
            capacity: 4,
            width: 3.0,
            height: 1.0,
            ..ChartParameter::default()
        };
        let mut chart = ChartObject::new(headless_parameter("Trend"), parameter);

        for v in [10.0, 20.0, 30.0] {
            chart.update_values(ValueMap::from([(
                "temperature".to_string(),
                DataValue::Number(v),
            )]));
        }
        chart.update_values(ValueMap::from([(
            "pressure".to_string(),
            DataValue::Number(1.0),
        )]));

        assert_eq!(chart.series().len(), 3);
        let points = chart.points();
        assert_eq!(points[0], [0.0, 0.0]);
        assert_eq!(points[1], [1.5, 0.5]);
        assert_eq!(points[2], [3.0, 1.0]);
    }
}
