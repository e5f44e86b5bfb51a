//! The seam between the agent and the host simulation.
//!
//! The core never simulates anything itself. It reads the world through
//! [`GameQuery`] and acts on it through [`CommandSink`]. Hosts usually
//! buffer commands and apply them after the agent's turn; [`CommandBuffer`]
//! is that buffer.

use std::collections::BTreeSet;

use warden_types::{EntityId, EntityInfo, PlayerId, Position, Resources, TemplateId, UnitClass};

use crate::plan::TrainingMetadata;

/// Errors reported by the host when it refuses a command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// The entity named in the command does not exist (any more).
    #[error("unknown entity {0}")]
    UnknownEntity(EntityId),

    /// The host rejected the command.
    #[error("command rejected: {reason}")]
    Rejected {
        /// Why the host refused.
        reason: String,
    },
}

/// Read-only view of the game state.
pub trait GameQuery {
    /// The agent's current stockpile.
    fn resources(&self) -> Resources;

    /// Look up any entity, friendly or hostile.
    fn entity(&self, id: EntityId) -> Option<&EntityInfo>;

    /// All entities owned by `player`.
    fn entities_of(&self, player: PlayerId) -> Vec<&EntityInfo>;

    /// Class tags of a template, whether or not an instance exists.
    fn template_classes(&self, template: &TemplateId) -> BTreeSet<UnitClass>;

    /// Whether `position` lies inside `player`'s territory.
    fn is_own_territory(&self, player: PlayerId, position: Position) -> bool;

    /// Whether `position` is close to an army currently invading us.
    fn is_near_invading_army(&self, position: Position) -> bool;

    /// A valid placement for `template`, near `hint` when one is given.
    fn find_placement(&self, template: &TemplateId, hint: Option<Position>) -> Option<Position>;

    /// Entities owned by `player` that can currently produce `template`.
    fn producers_of(&self, player: PlayerId, template: &TemplateId) -> Vec<&EntityInfo> {
        self.entities_of(player)
            .into_iter()
            .filter(|e| e.can_produce(template))
            .collect()
    }
}

/// Where the agent sends its orders.
pub trait CommandSink {
    /// Queue `quantity` units of `template` at `producer`.
    fn train(
        &mut self,
        producer: EntityId,
        template: &TemplateId,
        quantity: u32,
        metadata: &TrainingMetadata,
    ) -> Result<(), CommandError>;

    /// Order `builder` to place `template` at `position`.
    fn build(
        &mut self,
        builder: EntityId,
        template: &TemplateId,
        position: Position,
        angle: f64,
    ) -> Result<(), CommandError>;

    /// Order `unit` to attack `target`, optionally capturing it.
    fn attack(
        &mut self,
        unit: EntityId,
        target: EntityId,
        allow_capture: bool,
    ) -> Result<(), CommandError>;

    /// Ask for `unit` to be ferried from one accessibility region to another.
    fn request_transport(
        &mut self,
        unit: EntityId,
        from_region: u32,
        to_region: u32,
    ) -> Result<(), CommandError>;
}

/// A recorded order.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// See [`CommandSink::train`].
    Train {
        /// Producing entity.
        producer: EntityId,
        /// Unit template.
        template: TemplateId,
        /// Batch size.
        quantity: u32,
        /// Metadata to attach to the trained units.
        metadata: TrainingMetadata,
    },
    /// See [`CommandSink::build`].
    Build {
        /// Building entity.
        builder: EntityId,
        /// Structure template.
        template: TemplateId,
        /// Placement.
        position: Position,
        /// Placement rotation in radians.
        angle: f64,
    },
    /// See [`CommandSink::attack`].
    Attack {
        /// Attacking unit.
        unit: EntityId,
        /// Target entity.
        target: EntityId,
        /// Whether capture is allowed.
        allow_capture: bool,
    },
    /// See [`CommandSink::request_transport`].
    Transport {
        /// Unit to ferry.
        unit: EntityId,
        /// Origin region.
        from_region: u32,
        /// Destination region.
        to_region: u32,
    },
}

/// A [`CommandSink`] that records every order for the host to apply later.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommandBuffer {
    /// Orders in issue order.
    commands: Vec<Command>,
}

impl CommandBuffer {
    /// An empty buffer.
    pub const fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Orders recorded so far.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Take every recorded order, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Command> {
        core::mem::take(&mut self.commands)
    }

    /// Number of recorded orders.
    pub const fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing has been recorded.
    pub const fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl CommandSink for CommandBuffer {
    fn train(
        &mut self,
        producer: EntityId,
        template: &TemplateId,
        quantity: u32,
        metadata: &TrainingMetadata,
    ) -> Result<(), CommandError> {
        self.commands.push(Command::Train {
            producer,
            template: template.clone(),
            quantity,
            metadata: metadata.clone(),
        });
        Ok(())
    }

    fn build(
        &mut self,
        builder: EntityId,
        template: &TemplateId,
        position: Position,
        angle: f64,
    ) -> Result<(), CommandError> {
        self.commands.push(Command::Build {
            builder,
            template: template.clone(),
            position,
            angle,
        });
        Ok(())
    }

    fn attack(
        &mut self,
        unit: EntityId,
        target: EntityId,
        allow_capture: bool,
    ) -> Result<(), CommandError> {
        self.commands.push(Command::Attack {
            unit,
            target,
            allow_capture,
        });
        Ok(())
    }

    fn request_transport(
        &mut self,
        unit: EntityId,
        from_region: u32,
        to_region: u32,
    ) -> Result<(), CommandError> {
        self.commands.push(Command::Transport {
            unit,
            from_region,
            to_region,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_records_in_order_and_drains() {
        let mut buffer = CommandBuffer::new();
        let _ = buffer.attack(EntityId(1), EntityId(9), false);
        let _ = buffer.request_transport(EntityId(2), 0, 1);
        assert_eq!(buffer.len(), 2);
        assert!(matches!(
            buffer.commands().first(),
            Some(Command::Attack { unit: EntityId(1), .. })
        ));

        let drained = buffer.drain();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
    }
}
