//! Deserialize and serialize engines
//!
//! A [`Mapper`] borrows a [`Registry`] for the duration of a call and applies
//! the declared field rules in registry order.

mod deserialize;
mod serialize;

use crate::registry::Registry;
use crate::types::MapperConfig;

/// Maps documents to instances and back using the rules of one registry
#[derive(Clone, Copy)]
pub struct Mapper<'r> {
    registry: &'r Registry,
    config: MapperConfig,
}

impl<'r> Mapper<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Mapper::with_config(registry, MapperConfig::default())
    }

    pub fn with_config(registry: &'r Registry, config: MapperConfig) -> Self {
        Mapper { registry, config }
    }

    pub fn registry(&self) -> &'r Registry {
        self.registry
    }

    pub fn config(&self) -> MapperConfig {
        self.config
    }
}
