pub mod stream_controller;
pub mod switch_coordinator;

pub use stream_controller::{ActiveStreamController, StreamOutcome, StreamPhase};
pub use switch_coordinator::{ConversationSwitchCoordinator, RenderedConversation, SwitchOutcome};

#[cfg(test)]
pub(crate) mod test_support;
