//! # Engine Context
//!
//! Owns one of each kernel subsystem and applies the startup configuration.
//! The context is deliberately thin: it wires things together and gets out
//! of the way - application code talks to the subsystems directly.

use karst_core::{
    message_queue, EntityWorld, MessageReceiver, MessageSender, ResourceManager, ResourceResult,
};

use crate::config::EngineConfig;

/// Top-level engine context: one resource manager, one entity world, one
/// message queue.
///
/// The context lives on the main thread. Worker threads get cloned
/// [`MessageSender`]s; everything else stays here.
pub struct Engine {
    config: EngineConfig,
    resources: ResourceManager,
    world: EntityWorld,
    sender: MessageSender,
    receiver: MessageReceiver,
}

impl Engine {
    /// Builds an engine context from `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let mut resources = ResourceManager::new();
        resources.set_target_state(config.resources.target_state.into());
        let (sender, receiver) = message_queue();

        Self {
            config,
            resources,
            world: EntityWorld::new(),
            sender,
            receiver,
        }
    }

    /// The configuration this engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The resource manager.
    #[must_use]
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Mutable access to the resource manager.
    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    /// The entity world.
    #[must_use]
    pub fn world(&self) -> &EntityWorld {
        &self.world
    }

    /// Mutable access to the entity world.
    pub fn world_mut(&mut self) -> &mut EntityWorld {
        &mut self.world
    }

    /// A producer endpoint for the engine's message queue; clone freely
    /// onto worker threads.
    #[must_use]
    pub fn message_sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// The consumer endpoint of the engine's message queue.
    pub fn messages(&mut self) -> &mut MessageReceiver {
        &mut self.receiver
    }

    /// Drives every registered resource to the configured target state,
    /// aborting on the first failure when `strict_loading` is set and
    /// logging-and-continuing otherwise.
    ///
    /// # Errors
    ///
    /// The first failing resource's error under strict loading.
    pub fn make_resources_ready(&mut self) -> ResourceResult<()> {
        self.resources
            .make_all_resources_target_state(self.config.resources.strict_loading)
    }
}
