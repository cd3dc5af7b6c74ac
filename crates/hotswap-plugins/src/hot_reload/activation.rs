//! Activation gate
//!
//! Decides, per top-level descriptor, whether an instance should be created
//! now, based on its `once` flag, its stage predicate and the current stage.

use super::instance::{ActivationGuardViolation, InstanceError};
use super::registry::{DescriptorId, DescriptorRegistry};
use hotswap_kernel::{ActivationMeta, Stage, StageContext, SynthesizedTypeId};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Gate verdict for one descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// `once` type that already fired
    Spent,
    /// Predicate does not hold in the current stage
    Dormant,
    Activate,
}

/// What happened to one top-level descriptor during a gate pass
#[derive(Debug)]
pub enum ActivationRecord {
    Created {
        descriptor: DescriptorId,
        source: String,
        type_id: SynthesizedTypeId,
        instance_id: String,
    },
    AlreadyAlive {
        descriptor: DescriptorId,
        source: String,
        type_id: SynthesizedTypeId,
    },
    Failed {
        descriptor: DescriptorId,
        source: String,
        type_id: SynthesizedTypeId,
        error: InstanceError,
    },
    Dormant {
        descriptor: DescriptorId,
        type_id: SynthesizedTypeId,
        stage: Stage,
    },
    Spent {
        descriptor: DescriptorId,
        type_id: SynthesizedTypeId,
    },
}

pub struct ActivationGate;

impl ActivationGate {
    pub fn decide(activation: &ActivationMeta, fired: bool, current: &Stage) -> GateDecision {
        if activation.once && fired {
            GateDecision::Spent
        } else if activation.predicate().evaluate(current) {
            GateDecision::Activate
        } else {
            GateDecision::Dormant
        }
    }

    /// Evaluate every top-level descriptor in registration order
    ///
    /// The stage is read once per top-level descriptor.
    pub fn run(registry: &mut DescriptorRegistry, stage: &dyn StageContext) -> Vec<ActivationRecord> {
        let mut records = Vec::new();

        for descriptor in registry.top_level_mut() {
            let Some(activation) = descriptor.activation().copied() else {
                continue;
            };
            let id = descriptor.id();
            let type_id = descriptor.type_id().clone();

            let current = stage.current_stage();
            match Self::decide(&activation, descriptor.fired(), &current) {
                GateDecision::Activate => {}
                GateDecision::Spent => {
                    debug!("{} fired before, once-only", type_id.name());
                    records.push(ActivationRecord::Spent {
                        descriptor: id,
                        type_id,
                    });
                    continue;
                }
                GateDecision::Dormant => {
                    debug!("{} waits for {:?}, stage is {}", type_id.name(), activation.startup, current);
                    records.push(ActivationRecord::Dormant {
                        descriptor: id,
                        type_id,
                        stage: current,
                    });
                    continue;
                }
            }

            let source = descriptor.source_name().to_string();
            let record = match descriptor.create_instance(&current) {
                Ok(instance) => {
                    info!("Created {} ({})", type_id, instance.instance_id());
                    ActivationRecord::Created {
                        descriptor: id,
                        source,
                        instance_id: instance.instance_id().to_string(),
                        type_id,
                    }
                }
                Err(InstanceError::Guard(ActivationGuardViolation::AlreadyAlive(_))) => {
                    ActivationRecord::AlreadyAlive {
                        descriptor: id,
                        source,
                        type_id,
                    }
                }
                Err(error) => {
                    error!("Failed to create {}: {}", type_id, error);
                    ActivationRecord::Failed {
                        descriptor: id,
                        source,
                        type_id,
                        error,
                    }
                }
            };
            records.push(record);
        }

        records
    }
}

/// Host stage shared between the host loop and the engine
#[derive(Debug, Clone, Default)]
pub struct SharedStage {
    inner: Arc<RwLock<Stage>>,
}

impl SharedStage {
    pub fn new(stage: Stage) -> Self {
        Self {
            inner: Arc::new(RwLock::new(stage)),
        }
    }

    /// Switch stage, returning the previous one
    pub fn set(&self, stage: Stage) -> Stage {
        std::mem::replace(&mut *self.inner.write(), stage)
    }

    pub fn get(&self) -> Stage {
        self.inner.read().clone()
    }
}

impl StageContext for SharedStage {
    fn current_stage(&self) -> Stage {
        self.get()
    }
}
