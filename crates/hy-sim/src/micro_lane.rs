//! Discrete lane payload.

use serde::{Deserialize, Serialize};

use hy_micro::Car;

/// Double-buffered car lists.
///
/// `current` is sorted by position, ascending.  During a step cars are
/// moved out of `current` and pushed into the `next` buffer of whichever
/// lane they end up on; [`MicroLane::swap`] merges the buffers once every
/// lane has finished.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MicroLane {
    pub current: Vec<Car>,
    pub next:    Vec<Car>,
}

impl MicroLane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cars(mut cars: Vec<Car>) -> Self {
        sort_cars(&mut cars);
        Self { current: cars, next: Vec::new() }
    }

    /// Resident plus pending cars.
    #[inline]
    pub fn len(&self) -> usize {
        self.current.len() + self.next.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.next.is_empty()
    }

    #[inline]
    pub fn occupied(&self) -> bool {
        !self.is_empty()
    }

    /// Make pending cars resident.
    pub fn swap(&mut self) {
        self.current.append(&mut self.next);
        sort_cars(&mut self.current);
    }

    /// Insert a car into `current`, keeping it sorted.
    pub fn insert(&mut self, car: Car) {
        let at = self.current.partition_point(|c| c.position <= car.position);
        self.current.insert(at, car);
    }

    /// Index in `current` of the first car strictly ahead of `position`.
    #[inline]
    pub fn first_ahead(&self, position: f64) -> usize {
        self.current.partition_point(|c| c.position <= position)
    }

    /// Smallest position among resident and pending cars.
    pub fn rearmost(&self) -> Option<&Car> {
        self.current
            .iter()
            .chain(self.next.iter())
            .min_by(|a, b| a.position.total_cmp(&b.position))
    }
}

/// Position order, ties broken by id so the order is reproducible.
pub(crate) fn sort_cars(cars: &mut [Car]) {
    cars.sort_by(|a, b| a.position.total_cmp(&b.position).then(a.id.cmp(&b.id)));
}
