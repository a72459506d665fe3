use heapless::Vec;

use crate::{unit::Unit, Application, SignalAdapter, State};

/// Identifies a peripheral unit, e.g. the index of an I2C block on the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct UnitId(pub u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegistryError {
    Full,
    Duplicate(UnitId),
    UnknownUnit(UnitId),
}

/// Type-erased view of a [`Unit`], so units of different capacities and
/// applications can share one table.
pub trait Service: Sync {
    fn service(&self) -> usize;

    fn state(&self) -> State;
}

impl<S, A, const N: usize> Service for Unit<S, A, N>
where
    S: SignalAdapter + Send,
    A: Application + Send,
{
    fn service(&self) -> usize {
        Unit::service(self)
    }

    fn state(&self) -> State {
        Unit::state(self)
    }
}

/// Fixed-size table from [`UnitId`] to unit, used by a shared interrupt
/// dispatcher to route an entry to the right unit.
pub struct Registry<'a, const UNITS: usize> {
    units: Vec<(UnitId, &'a dyn Service), UNITS>,
}

impl<'a, const UNITS: usize> Registry<'a, UNITS> {
    pub const fn new() -> Self {
        Self { units: Vec::new() }
    }

    pub fn register(&mut self, id: UnitId, unit: &'a dyn Service) -> Result<(), RegistryError> {
        if self.get(id).is_some() {
            return Err(RegistryError::Duplicate(id));
        }

        self.units
            .push((id, unit))
            .map_err(|_| RegistryError::Full)
    }

    pub fn get(&self, id: UnitId) -> Option<&'a dyn Service> {
        self.units
            .iter()
            .find(|(unit_id, _)| *unit_id == id)
            .map(|(_, unit)| *unit)
    }

    /// Serves the pending events of unit `id`.
    pub fn dispatch(&self, id: UnitId) -> Result<usize, RegistryError> {
        match self.get(id) {
            Some(unit) => Ok(unit.service()),
            None => {
                error!("i2c: interrupt for unregistered unit {}", id.0);
                Err(RegistryError::UnknownUnit(id))
            }
        }
    }

    /// Serves every registered unit, for polling-mode main loops.
    pub fn poll_all(&self) -> usize {
        self.units.iter().map(|(_, unit)| unit.service()).sum()
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> + '_ {
        self.units.iter().map(|(id, _)| *id)
    }
}

impl<'a, const UNITS: usize> Default for Registry<'a, UNITS> {
    fn default() -> Self {
        Self::new()
    }
}
